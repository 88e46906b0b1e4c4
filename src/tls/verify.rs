//! C11: Peer Verification (spec.md §4.11).
//!
//! Chain/CRL/OCSP verification itself is delegated to rustls's
//! `WebPkiClientVerifier` (installed by C3); this module implements the
//! *post-chain* custom checks spec.md calls out - SAN/CN matching and the
//! `.tlslogin`/`TLSUserName` client-auth shortcuts - which have no rustls
//! equivalent.

use crate::options::{TlsUserName, VerifyMechanism};
use std::net::IpAddr;
use std::path::Path;

/// The outcome of a post-chain identity check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyOutcome {
    /// The check passed.
    Matched,
    /// The check ran but did not match.
    NotMatched,
    /// The check was not configured/required, so it did not run.
    Skipped,
}

/// A parsed view of the fields this module needs from a peer certificate.
/// Obtaining these from the raw `CertificateDer` is an external
/// collaborator's job (an X.509 parser); this type is the contract.
#[derive(Debug, Clone, Default)]
pub struct PeerCertFields {
    /// The certificate's CommonName, if present.
    pub common_name: Option<String>,
    /// dNSName Subject Alternative Names.
    pub dns_sans: Vec<String>,
    /// iPAddress Subject Alternative Names.
    pub ip_sans: Vec<IpAddr>,
    /// RFC 822 (email) Subject Alternative Names.
    pub email_sans: Vec<String>,
    /// Raw bytes of the leaf certificate, for byte-identical comparisons
    /// (spec.md §4.7: "data channel's peer cert must be byte-identical"
    /// to control's; §4.11: `.tlslogin` byte-equal match).
    pub der: Vec<u8>,
}

/// Checks the peer's dNSName SANs against `expected_name`, rejecting any
/// SAN containing an embedded NUL byte as a spoofing guard (spec.md §4.11).
pub fn check_dns_san(fields: &PeerCertFields, expected_name: &str, required: bool) -> VerifyOutcome {
    for san in &fields.dns_sans {
        if san.as_bytes().contains(&0) {
            return VerifyOutcome::NotMatched;
        }
    }
    if fields.dns_sans.iter().any(|s| s.eq_ignore_ascii_case(expected_name)) {
        return VerifyOutcome::Matched;
    }
    if required {
        VerifyOutcome::NotMatched
    } else {
        VerifyOutcome::Skipped
    }
}

/// Checks the peer's iPAddress SANs against `expected_ip`, handling
/// IPv4-mapped IPv6 addresses (spec.md §4.11).
pub fn check_ip_san(fields: &PeerCertFields, expected_ip: IpAddr, required: bool) -> VerifyOutcome {
    let normalized_expected = normalize(expected_ip);
    if fields.ip_sans.iter().any(|ip| normalize(*ip) == normalized_expected) {
        return VerifyOutcome::Matched;
    }
    if required {
        VerifyOutcome::NotMatched
    } else {
        VerifyOutcome::Skipped
    }
}

fn normalize(ip: IpAddr) -> IpAddr {
    match ip {
        IpAddr::V6(v6) => v6.to_ipv4_mapped().map(IpAddr::V4).unwrap_or(IpAddr::V6(v6)),
        v4 => v4,
    }
}

/// Checks the peer's CommonName against `expected`, case-insensitively
/// (spec.md §4.11).
pub fn check_common_name(fields: &PeerCertFields, expected: &str, required: bool) -> VerifyOutcome {
    match &fields.common_name {
        Some(cn) if cn.eq_ignore_ascii_case(expected) => VerifyOutcome::Matched,
        _ if required => VerifyOutcome::NotMatched,
        _ => VerifyOutcome::Skipped,
    }
}

/// Runs the configured verification mechanisms in order, short-circuiting
/// once one of them flags the cert unverified (spec.md §4.11: "the first
/// listed mechanism runs first; if it flags the cert unverified, the
/// second does not run").
pub fn run_verify_order(order: &[VerifyMechanism], mut crl_check: impl FnMut() -> bool, mut ocsp_check: impl FnMut() -> bool) -> bool {
    for mechanism in order {
        let ok = match mechanism {
            VerifyMechanism::Crl => crl_check(),
            VerifyMechanism::Ocsp => ocsp_check(),
        };
        if !ok {
            return false;
        }
    }
    true
}

/// Implements the `.tlslogin` shortcut: the presented client cert's DER
/// bytes are compared byte-equal against each certificate found in
/// `home_dir/.tlslogin` (spec.md §4.11).
pub fn tlslogin_matches(home_dir: &Path, presented_der: &[u8], home_certs: impl Iterator<Item = Vec<u8>>) -> bool {
    let _ = home_dir;
    home_certs.into_iter().any(|cert| cert == presented_der)
}

/// Derives a username from the peer certificate per the configured
/// `TLSUserName` option (spec.md §4.11).
pub fn derive_username(fields: &PeerCertFields, source: &TlsUserName, oid_lookup: impl Fn(&str) -> Option<String>) -> Option<String> {
    match source {
        TlsUserName::None => None,
        TlsUserName::CommonName => fields.common_name.clone(),
        TlsUserName::EmailSubjAltName => fields.email_sans.first().cloned(),
        TlsUserName::Oid(oid) => oid_lookup(oid),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields() -> PeerCertFields {
        PeerCertFields {
            common_name: Some("Alice Example".to_string()),
            dns_sans: vec!["client.example.com".to_string()],
            ip_sans: vec!["10.0.0.1".parse().unwrap()],
            email_sans: vec!["alice@example.com".to_string()],
            der: vec![1, 2, 3],
        }
    }

    #[test]
    fn dns_san_matches_case_insensitively() {
        assert_eq!(check_dns_san(&fields(), "Client.Example.COM", true), VerifyOutcome::Matched);
    }

    #[test]
    fn dns_san_rejects_embedded_nul() {
        let mut f = fields();
        f.dns_sans = vec!["evil.com\u{0}.example.com".to_string()];
        assert_eq!(check_dns_san(&f, "evil.com", true), VerifyOutcome::NotMatched);
    }

    #[test]
    fn dns_san_skipped_when_not_required_and_absent() {
        assert_eq!(check_dns_san(&fields(), "nomatch.example.com", false), VerifyOutcome::Skipped);
    }

    #[test]
    fn ipv4_mapped_ipv6_matches_ipv4_san() {
        let f = fields();
        let mapped: IpAddr = "::ffff:10.0.0.1".parse().unwrap();
        assert_eq!(check_ip_san(&f, mapped, true), VerifyOutcome::Matched);
    }

    #[test]
    fn verify_order_short_circuits() {
        let order = [VerifyMechanism::Crl, VerifyMechanism::Ocsp];
        let mut ocsp_called = false;
        let ok = run_verify_order(&order, || false, || {
            ocsp_called = true;
            true
        });
        assert!(!ok);
        assert!(!ocsp_called, "ocsp must not run once crl already failed");
    }

    #[test]
    fn tlslogin_requires_byte_equal_match() {
        let certs = vec![vec![9, 9, 9], vec![1, 2, 3]];
        assert!(tlslogin_matches(Path::new("/home/alice"), &[1, 2, 3], certs.into_iter()));
    }

    #[test]
    fn username_derivation_uses_configured_source() {
        let f = fields();
        assert_eq!(derive_username(&f, &TlsUserName::CommonName, |_| None), Some("Alice Example".to_string()));
        assert_eq!(derive_username(&f, &TlsUserName::EmailSubjAltName, |_| None), Some("alice@example.com".to_string()));
        assert_eq!(derive_username(&f, &TlsUserName::None, |_| None), None);
    }
}
