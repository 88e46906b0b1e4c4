//! Semantic configuration option types for the FTPS security core.
//!
//! These are *not* a directive parser - reading `TLSRequired ctrl+data` out
//! of a config file is an external collaborator's job. What lives here is
//! the typed, validated shape that parser is expected to produce.

use std::fmt;

/// One axis of the `TLSRequired` policy: whether TLS is mandatory, merely
/// allowed, or (control/auth axes only) forbidden.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    /// TLS is mandatory on this axis.
    Required,
    /// TLS is permitted but not mandatory.
    Allowed,
    /// TLS is forbidden on this axis (only meaningful for the data axis,
    /// i.e. the source's `!data`).
    Forbidden,
}

/// The three independent `TLSRequired` axes (spec.md §4.10 / §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TlsRequiredPolicy {
    /// Whether the control channel must be secured.
    pub ctrl: Requirement,
    /// Whether data channels must be secured.
    pub data: Requirement,
    /// Whether USER/PASS/ACCT require a secured control channel first.
    pub auth: Requirement,
}

impl Default for TlsRequiredPolicy {
    fn default() -> Self {
        TlsRequiredPolicy {
            ctrl: Requirement::Allowed,
            data: Requirement::Allowed,
            auth: Requirement::Allowed,
        }
    }
}

impl TlsRequiredPolicy {
    /// The `TLSRequired off` policy: nothing is mandatory.
    pub fn off() -> Self {
        Self::default()
    }

    /// The `TLSRequired on` / `both` policy: ctrl and data both mandatory.
    pub fn both() -> Self {
        TlsRequiredPolicy {
            ctrl: Requirement::Required,
            data: Requirement::Required,
            auth: Requirement::Allowed,
        }
    }
}

/// The option for mutual TLS (client certificate authentication).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FtpsClientAuth {
    /// No client certificate is requested.
    #[default]
    Off,
    /// A client certificate is requested but the handshake proceeds
    /// without one; if sent, it is validated.
    Request,
    /// A client certificate is required; the handshake fails without one.
    Require,
}

/// The option for verifying the *server's* own identity, used when this
/// crate drives a client-role handshake (e.g. SSCN client mode).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VerifyServer {
    /// Do not verify.
    #[default]
    Off,
    /// Verify, including reverse-DNS confirmation of the peer's address.
    On,
    /// Verify, but skip reverse-DNS confirmation.
    NoReverseDns,
}

/// The order in which CRL and OCSP checks run during peer verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyMechanism {
    /// Check the certificate revocation list.
    Crl,
    /// Check OCSP.
    Ocsp,
}

/// Which X.509 attribute, if any, is compared to the requested username
/// for certificate-based login shortcuts.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TlsUserName {
    /// Do not derive a username from the certificate.
    #[default]
    None,
    /// Use the certificate's CommonName.
    CommonName,
    /// Use an RFC 822 (email) Subject Alternative Name.
    EmailSubjAltName,
    /// Use the value of a named custom OID.
    Oid(String),
}

bitflags::bitflags! {
    /// The `TLSOptions` bitset (spec.md §6).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct TlsOptions: u32 {
        /// Allow `.tlslogin`-based certificate-only authentication.
        const ALLOW_DOT_LOGIN              = 1 << 0;
        /// Allow per-user overrides of the ctrl TLSRequired axis.
        const ALLOW_PER_USER               = 1 << 1;
        /// Permit Diffie-Hellman parameters weaker than 2048 bits.
        const ALLOW_WEAK_DH                = 1 << 2;
        /// Lower the TLS security level to the library's weakest setting.
        const ALLOW_WEAK_SECURITY          = 1 << 3;
        /// Permit client-initiated renegotiations.
        const ALLOW_CLIENT_RENEGOTIATIONS  = 1 << 4;
        /// Emit extra diagnostic logging.
        const ENABLE_DIAGS                 = 1 << 5;
        /// Export peer certificate data into environment variables.
        const EXPORT_CERT_DATA             = 1 << 6;
        /// Ignore SNI entirely (never switch virtual hosts on it).
        const IGNORE_SNI                   = 1 << 7;
        /// Disable empty TLS record fragments.
        const NO_EMPTY_FRAGMENTS           = 1 << 8;
        /// Do not require data channels to reuse the control session.
        const NO_SESSION_REUSE_REQUIRED    = 1 << 9;
        /// Export the standard `TLS_*` environment variables.
        const STD_ENV_VARS                 = 1 << 10;
        /// Require a dNSName SAN match during peer verification.
        const DNS_NAME_REQUIRED            = 1 << 11;
        /// Require an iPAddress SAN match during peer verification.
        const IP_ADDRESS_REQUIRED          = 1 << 12;
        /// Require a CommonName match during peer verification.
        const COMMON_NAME_REQUIRED         = 1 << 13;
        /// Perform the TLS handshake immediately on accept (implicit FTPS).
        const USE_IMPLICIT_SSL             = 1 << 14;
        /// Disable automatic ECDH curve selection.
        const NO_AUTO_ECDH                 = 1 << 15;
    }
}

/// `TLSRenegotiate` policy: byte/command thresholds plus an overall timeout,
/// or entirely disabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenegotiationPolicy {
    /// Renegotiation is disabled (`TLSRenegotiate none`).
    None,
    /// Renegotiate after `ctrl_commands` control commands and/or
    /// `data_bytes` bytes of data traffic, failing the session if it does
    /// not complete within `timeout`.
    Enabled {
        /// Renegotiate the control channel every N commands, if set.
        ctrl_commands: Option<u64>,
        /// Renegotiate a data channel every K bytes, if set.
        data_bytes: Option<u64>,
        /// Whether a completed renegotiation is mandatory (vs best-effort).
        required: bool,
        /// Deadline for a renegotiation to complete.
        timeout: std::time::Duration,
    },
}

impl Default for RenegotiationPolicy {
    fn default() -> Self {
        RenegotiationPolicy::None
    }
}

/// `TLSSessionTicketKeys` policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TicketPolicy {
    /// Whether session tickets are issued at all.
    pub enabled: bool,
    /// Maximum age of a ticket key before it is evicted.
    pub max_age: std::time::Duration,
    /// Maximum number of ticket keys retained at once.
    pub max_count: usize,
}

impl Default for TicketPolicy {
    fn default() -> Self {
        TicketPolicy {
            enabled: true,
            max_age: std::time::Duration::from_secs(3600),
            max_count: 3,
        }
    }
}

/// `TLSStapling*` policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaplingPolicy {
    /// Whether OCSP stapling is attempted at all.
    pub enabled: bool,
    /// Explicit responder URL override; else the cert's AIA extension is used.
    pub responder: Option<String>,
    /// Timeout for the OCSP HTTP(S) exchange.
    pub timeout: std::time::Duration,
    /// Suppress the nonce extension in requests.
    pub no_nonce: bool,
    /// Do not verify responses (dangerous; diagnostics only).
    pub no_verify: bool,
    /// Do not fabricate a `tryLater` response when the responder is unreachable.
    pub no_fake_try_later: bool,
}

impl Default for StaplingPolicy {
    fn default() -> Self {
        StaplingPolicy {
            enabled: false,
            responder: None,
            timeout: std::time::Duration::from_secs(10),
            no_nonce: false,
            no_verify: false,
            no_fake_try_later: false,
        }
    }
}

/// Default handshake deadline (spec.md §4.7).
pub const DEFAULT_HANDSHAKE_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(300);
/// Default passphrase provider deadline (spec.md §4.1).
pub const DEFAULT_PROVIDER_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);
/// Default OCSP cache staleness for responses lacking `nextUpdate` (spec.md §4.6).
pub const DEFAULT_OCSP_NO_NEXT_UPDATE_STALE_AFTER: std::time::Duration = std::time::Duration::from_secs(3600);
/// Default OCSP cache staleness for non-successful responses (spec.md §4.6).
pub const DEFAULT_OCSP_ERROR_STALE_AFTER: std::time::Duration = std::time::Duration::from_secs(300);

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Requirement::Required => "required",
            Requirement::Allowed => "allowed",
            Requirement::Forbidden => "forbidden",
        })
    }
}
