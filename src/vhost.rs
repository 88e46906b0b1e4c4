//! The virtual-host data model (spec.md §3 "Virtual host (VH)").

use crate::options::{FtpsClientAuth, RenegotiationPolicy, StaplingPolicy, TicketPolicy, TlsOptions, TlsRequiredPolicy, TlsUserName, VerifyMechanism, VerifyServer};
use std::path::PathBuf;

/// A stable, non-zero numeric identifier for a virtual host, used as the
/// TLS session-ID context so externally cached sessions cannot cross VHs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ServerId(pub std::num::NonZeroU32);

/// The on-disk locations of a virtual host's credential material, prior to
/// loading (see [`crate::tls::credentials`] for the loaded form).
#[derive(Debug, Clone, Default)]
pub struct CredentialPaths {
    /// RSA certificate/key pair.
    pub rsa: Option<(PathBuf, PathBuf)>,
    /// EC certificate/key pair.
    pub ec: Option<(PathBuf, PathBuf)>,
    /// DSA certificate/key pair. Recognized for configuration parity with
    /// the other slots; loading one always fails (see [`KeyKind::Dsa`](crate::tls::passphrase::KeyKind::Dsa)).
    pub dsa: Option<(PathBuf, PathBuf)>,
    /// PKCS12 bundle (cert + key in one file).
    pub pkcs12: Option<PathBuf>,
    /// Supplemental certificate chain to append after the leaf cert.
    pub chain: Option<PathBuf>,
    /// CA trust bundle file.
    pub ca_file: Option<PathBuf>,
    /// CA trust directory (hashed-cert-name layout).
    pub ca_path: Option<PathBuf>,
    /// Certificate revocation list file.
    pub crl_file: Option<PathBuf>,
    /// Certificate revocation list directory.
    pub crl_path: Option<PathBuf>,
    /// Diffie-Hellman parameter files, any size.
    pub dh_params: Vec<PathBuf>,
    /// Pre-shared-key file (must be `hex:`-prefixed per spec.md §4.2).
    pub psk_file: Option<PathBuf>,
}

/// A fully configured virtual host.
#[derive(Debug, Clone)]
pub struct VirtualHost {
    /// The stable server id used for session-ID-context scoping.
    pub sid: ServerId,
    /// The hostname this VH answers to for SNI/HOST reconciliation.
    pub server_name: String,
    /// Whether TLS is enabled at all on this VH.
    pub tls_enabled: bool,
    /// Credential file locations.
    pub credentials: CredentialPaths,
    /// The `TLSRequired` policy.
    pub tls_required: TlsRequiredPolicy,
    /// Mutual TLS mode.
    pub client_auth: FtpsClientAuth,
    /// Server-role-as-client verification mode (SSCN client mode).
    pub verify_server: VerifyServer,
    /// Maximum certificate chain depth accepted during verification.
    pub verify_depth: u32,
    /// Order in which CRL/OCSP checks run.
    pub verify_order: Vec<VerifyMechanism>,
    /// Certificate-derived username source, if any.
    pub tls_username: TlsUserName,
    /// The `TLSOptions` bitset.
    pub options: TlsOptions,
    /// Renegotiation policy.
    pub renegotiation: RenegotiationPolicy,
    /// Session ticket policy.
    pub tickets: TicketPolicy,
    /// OCSP stapling policy.
    pub stapling: StaplingPolicy,
}

impl VirtualHost {
    /// Builds a minimal virtual host with TLS disabled, sensible defaults
    /// otherwise. Callers enable and configure credentials explicitly.
    pub fn new(sid: ServerId, server_name: impl Into<String>) -> Self {
        VirtualHost {
            sid,
            server_name: server_name.into(),
            tls_enabled: false,
            credentials: CredentialPaths::default(),
            tls_required: TlsRequiredPolicy::default(),
            client_auth: FtpsClientAuth::default(),
            verify_server: VerifyServer::default(),
            verify_depth: 9,
            verify_order: vec![VerifyMechanism::Crl, VerifyMechanism::Ocsp],
            tls_username: TlsUserName::default(),
            options: TlsOptions::default(),
            renegotiation: RenegotiationPolicy::default(),
            tickets: TicketPolicy::default(),
            stapling: StaplingPolicy::default(),
        }
    }

    /// Case-insensitive match against an SNI or HOST-command hostname,
    /// per spec.md §4.8 step 4.
    pub fn matches_name(&self, name: &str) -> bool {
        self.server_name.eq_ignore_ascii_case(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_match_is_case_insensitive() {
        let vh = VirtualHost::new(ServerId(std::num::NonZeroU32::new(1).unwrap()), "Example.Com");
        assert!(vh.matches_name("example.com"));
        assert!(!vh.matches_name("other.com"));
    }
}
