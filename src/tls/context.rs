//! C3: TLS Context Builder (spec.md §4.3).
//!
//! Assembles a `rustls::ServerConfig` for a single virtual host. The steps
//! below are plain data on a builder in rustls, but are still applied in
//! the order spec.md §4.3 prescribes (cert/key, then client-auth verifier,
//! then ticketer, then cipher/version restrictions) so the result matches
//! what a callback-ordered OpenSSL-shaped config would have produced.

use crate::error::{FtpsError, FtpsErrorKind};
use crate::options::FtpsClientAuth;
use crate::tls::tickets::ControlChannelTickets;
use rustls::server::{ResolvesServerCert, StoresServerSessions, WebPkiClientVerifier};
use rustls::sign::CertifiedKey;
use rustls::{RootCertStore, ServerConfig};
use rustls_pki_types::CertificateRevocationListDer;
use std::sync::Arc;

/// Picks among several installed [`CertifiedKey`]s (e.g. one RSA, one EC)
/// the way spec.md §9's Open Question decision calls for: install both,
/// let the library's own cipher-suite-driven selection choose.
#[derive(Debug)]
pub struct MultiCertResolver {
    keys: Vec<Arc<CertifiedKey>>,
}

impl MultiCertResolver {
    /// Wraps a non-empty set of certified keys for this virtual host.
    pub fn new(keys: Vec<Arc<CertifiedKey>>) -> Self {
        MultiCertResolver { keys }
    }
}

impl ResolvesServerCert for MultiCertResolver {
    fn resolve(&self, client_hello: rustls::server::ClientHello<'_>) -> Option<Arc<CertifiedKey>> {
        let schemes = client_hello.signature_schemes();
        self.keys
            .iter()
            .find(|k| k.key.choose_scheme(schemes).is_some())
            .or_else(|| self.keys.first())
            .cloned()
    }
}

/// The inputs this module needs from C1/C2/C4/C5/C6/C11 to assemble one
/// virtual host's `ServerConfig`.
pub struct ContextInputs {
    /// One certified key per loaded credential bundle (RSA/EC/PKCS12).
    pub certified_keys: Vec<Arc<CertifiedKey>>,
    /// Trust anchors for client certificate verification, if mTLS is on.
    pub client_roots: Option<RootCertStore>,
    /// CRLs to check client certificates against (spec.md §4.3 step 7,
    /// §4.11), loaded by [`crate::tls::credentials::load_crls`].
    pub client_crls: Vec<CertificateRevocationListDer<'static>>,
    /// Mutual-TLS mode for this virtual host.
    pub client_auth: FtpsClientAuth,
    /// The process-wide session ticket machinery, adapted for this channel.
    pub tickets: Arc<ControlChannelTickets>,
    /// The session cache/storage implementation (C5).
    pub session_storage: Arc<dyn StoresServerSessions + Send + Sync>,
    /// ALPN protocols to advertise; spec.md mandates the single value "ftp"
    /// unless NPN/ALPN advertising is disabled.
    pub alpn_protocols: Vec<Vec<u8>>,
    /// Enabled protocol versions (spec.md §4.3 step 10).
    pub protocol_versions: Vec<&'static rustls::SupportedProtocolVersion>,
}

/// Builds a `ServerConfig` for one virtual host, in the order spec.md
/// §4.3 describes:
/// 1. base context with all versions initially unset until step 10,
/// 2. passphrase callback - handled ahead of this call, by C1/C2,
/// 3. CA trust material - `client_roots`,
/// 4-5. certs/keys/chain - `certified_keys`,
/// 6. cipher lists - governed by the crypto provider's suite list,
/// 7. CRLs - `with_crls` on the client verifier builder,
/// 8. ECDH curve policy - provider default (spec.md §9 Open Question area),
/// 9. ALPN,
/// 10. enabled protocol versions,
/// 11. renegotiation policy - enforced in the handshake engine (C7), not here,
/// 12. session tickets,
/// 13. OCSP stapling - stapled via each `CertifiedKey`'s `ocsp` field,
/// 14. peer verification.
pub fn build_server_config(inputs: ContextInputs) -> Result<ServerConfig, FtpsError> {
    if inputs.certified_keys.is_empty() {
        return Err(FtpsError::new(FtpsErrorKind::ConfigError));
    }

    let provider = Arc::new(default_provider());

    let client_verifier = match (&inputs.client_auth, &inputs.client_roots) {
        (FtpsClientAuth::Off, _) | (_, None) => WebPkiClientVerifier::no_client_auth(),
        (FtpsClientAuth::Require, Some(roots)) => WebPkiClientVerifier::builder(Arc::new(roots.clone()))
            .with_crls(inputs.client_crls.clone())
            .build()
            .map_err(|e| FtpsError::with_source(FtpsErrorKind::ConfigError, e))?,
        (FtpsClientAuth::Request, Some(roots)) => WebPkiClientVerifier::builder(Arc::new(roots.clone()))
            .with_crls(inputs.client_crls.clone())
            .allow_unauthenticated()
            .build()
            .map_err(|e| FtpsError::with_source(FtpsErrorKind::ConfigError, e))?,
    };

    let resolver: Arc<dyn ResolvesServerCert> = Arc::new(MultiCertResolver::new(inputs.certified_keys));

    let mut config = ServerConfig::builder_with_provider(provider)
        .with_protocol_versions(&inputs.protocol_versions)
        .map_err(FtpsError::from)?
        .with_client_cert_verifier(client_verifier)
        .with_cert_resolver(resolver);

    config.alpn_protocols = inputs.alpn_protocols;
    config.session_storage = inputs.session_storage;
    config.ticketer = inputs.tickets;

    Ok(config)
}

#[cfg(feature = "aws_lc_rs")]
fn default_provider() -> rustls::crypto::CryptoProvider {
    rustls::crypto::aws_lc_rs::default_provider()
}

#[cfg(all(feature = "ring", not(feature = "aws_lc_rs")))]
fn default_provider() -> rustls::crypto::CryptoProvider {
    rustls::crypto::ring::default_provider()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_credential_set() {
        let inputs = ContextInputs {
            certified_keys: vec![],
            client_roots: None,
            client_crls: vec![],
            client_auth: FtpsClientAuth::Off,
            tickets: Arc::new(ControlChannelTickets::new(Arc::new(crate::tls::tickets::TicketKeyRing::new(std::time::Duration::from_secs(60), 1)))),
            session_storage: Arc::new(rustls::server::NoServerSessionStorage {}),
            alpn_protocols: vec![b"ftp".to_vec()],
            protocol_versions: vec![&rustls::version::TLS13],
        };
        assert_eq!(build_server_config(inputs).unwrap_err().kind(), FtpsErrorKind::ConfigError);
    }
}
