//! C8: SNI/HOST Reconciler (spec.md §4.8).

use crate::vhost::{ServerId, VirtualHost};
use std::net::IpAddr;

/// Fatal TLS alerts this reconciler can raise, matching the named alerts
/// in spec.md §4.8.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SniError {
    /// The SNI did not match a previously processed FTP `HOST` command.
    #[error("access_denied: SNI does not match HOST")]
    AccessDenied,
    /// No virtual host is configured for the SNI name.
    #[error("unrecognized_name: no virtual host configured")]
    UnrecognizedName,
    /// The matched virtual host has TLS disabled.
    #[error("handshake_failure: TLS disabled on matched virtual host")]
    HandshakeFailure,
    /// After a context swap, the already-negotiated protocol version is no
    /// longer enabled on the new virtual host's context.
    #[error("protocol_version: negotiated version not enabled on new virtual host")]
    ProtocolVersion,
}

/// Returns `true` if `name` parses as an IP literal, in which case SNI
/// carrying it must be ignored per RFC 6066 (spec.md §4.8 step 2).
pub fn is_ip_literal(name: &str) -> bool {
    name.parse::<IpAddr>().is_ok()
}

/// Reconciles a client-presented SNI name against a previously processed
/// FTP `HOST` command and the configured virtual hosts, implementing
/// spec.md §4.8 steps 1-4 (context rebuild and the preserved in-memory
/// session bridge are handled by the caller with [`crate::tls::context`]
/// and [`crate::tls::session_cache::RustlsSessionStore::bridge_put`]).
/// `default_vh` is the virtual host already bound for this listener before
/// SNI is considered; an IP-literal `sni` is ignored outright (step 2) and
/// resolves to it without consulting `host_command` or `vhosts` at all.
pub fn reconcile<'a>(sni: &str, host_command: Option<&str>, default_vh: &'a VirtualHost, mut vhosts: impl Iterator<Item = &'a VirtualHost>) -> Result<&'a VirtualHost, SniError> {
    if is_ip_literal(sni) {
        // RFC 6066 forbids IP literals in SNI; treat as absent and keep
        // whatever context is already active, with no alert.
        return Ok(default_vh);
    }

    if let Some(host) = host_command {
        if !is_ip_literal(host) && !host.eq_ignore_ascii_case(sni) {
            return Err(SniError::AccessDenied);
        }
    }

    let matched = vhosts.find(|vh| vh.matches_name(sni)).ok_or(SniError::UnrecognizedName)?;
    if !matched.tls_enabled {
        return Err(SniError::HandshakeFailure);
    }
    Ok(matched)
}

/// spec.md §4.8 step 6: after a context swap, the already-negotiated
/// protocol version must still be enabled on the new virtual host.
pub fn check_version_still_enabled(negotiated: &str, enabled_on_new_vh: &[&str]) -> Result<(), SniError> {
    if enabled_on_new_vh.iter().any(|v| *v == negotiated) {
        Ok(())
    } else {
        Err(SniError::ProtocolVersion)
    }
}

/// Data-connection handshakes ignore SNI entirely (spec.md §4.8 step 7);
/// the active virtual host is simply whatever the control channel resolved.
pub fn data_channel_vh(active: ServerId) -> ServerId {
    active
}
