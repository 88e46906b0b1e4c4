//! The per-channel and per-FTP-session TLS state (spec.md §3 "Session Handle").

use crate::controlchan::state::ControlChanState;
use crate::flags::SessionFlags;
use crate::vhost::ServerId;
use std::collections::HashMap;
use std::time::Instant;

/// Which FTP channel a [`ChannelSession`] belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    /// The persistent control connection.
    Ctrl,
    /// A short-lived data connection.
    Data,
}

/// The state of a single TLS handshake/session on one channel.
#[derive(Debug, Clone)]
pub struct ChannelSession {
    /// Which channel this is.
    pub channel: Channel,
    /// Negotiated protocol version string, set once the handshake completes.
    pub negotiated_version: Option<&'static str>,
    /// Negotiated cipher suite name, set once the handshake completes.
    pub negotiated_cipher: Option<String>,
    /// The 32 bytes of application data bound into a TLSv1.3 session
    /// ticket for cross-channel session-reuse proof (spec.md §4.7).
    pub session_ticket_appdata: Option<[u8; 32]>,
    /// Whether the TLS library reported this session as resumed.
    pub resumed: bool,
    /// SHA-1-ish opaque session identifier, used for pre-TLSv1.3 reuse checks.
    pub session_id: Option<Vec<u8>>,
}

impl ChannelSession {
    /// Creates a fresh, not-yet-negotiated channel session.
    pub fn new(channel: Channel) -> Self {
        ChannelSession {
            channel,
            negotiated_version: None,
            negotiated_cipher: None,
            session_ticket_appdata: None,
            resumed: false,
            session_id: None,
        }
    }

    /// Implements the session-reuse-from-control check (spec.md §4.7,
    /// Testable Property 2): either the plain session id matches, or (for
    /// TLSv1.3, where ids are empty) the ticket appdata matches.
    pub fn reused_from(&self, control: &ChannelSession) -> bool {
        if !self.resumed {
            return false;
        }
        match (&self.session_id, &control.session_id) {
            (Some(a), Some(b)) if !a.is_empty() && !b.is_empty() => a == b,
            _ => match (self.session_ticket_appdata, control.session_ticket_appdata) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            },
        }
    }
}

/// The FTP-session-wide TLS state: flags, the control channel's session,
/// SNI-resolved virtual host, peer identity, and session notes.
#[derive(Debug)]
pub struct TlsSessionState {
    /// The control channel's AUTH/CCC state.
    pub state: ControlChanState,
    /// The session flags bitset.
    pub flags: SessionFlags,
    /// The control channel's TLS session, once secured.
    pub ctrl: Option<ChannelSession>,
    /// The virtual host presently active for this session (may change on SNI).
    pub active_vh: Option<ServerId>,
    /// The peer identity resolved from a verified client certificate
    /// (e.g. CN, SAN, or custom-OID derived name).
    pub peer_identity: Option<String>,
    /// Whether SSCN is in client mode (server drives the data channel as a
    /// TLS client) rather than the default server mode.
    pub sscn_client_mode: bool,
    /// Session notes exposed to collaborators (spec.md §6).
    pub notes: HashMap<&'static str, String>,
    /// When the current renegotiation cycle last started, if one is in flight.
    pub renegotiation_started_at: Option<Instant>,
}

impl Default for TlsSessionState {
    fn default() -> Self {
        TlsSessionState {
            state: ControlChanState::default(),
            flags: SessionFlags::empty(),
            ctrl: None,
            active_vh: None,
            peer_identity: None,
            sscn_client_mode: false,
            notes: HashMap::new(),
            renegotiation_started_at: None,
        }
    }
}

impl TlsSessionState {
    /// Records the standard session notes once a control handshake completes
    /// (spec.md Testable Property 9: `TLS_CIPHER`/`TLS_PROTOCOL` must be set
    /// before the next command is dispatched).
    pub fn record_ctrl_handshake_notes(&mut self, version: &'static str, cipher: String, sni: Option<String>) {
        self.notes.insert("FTPS", "1".to_string());
        self.notes.insert("TLS_PROTOCOL", version.to_string());
        self.notes.insert("TLS_CIPHER", cipher);
        if let Some(sni) = sni {
            self.notes.insert("mod_tls.sni", sni);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_id_reuse_match() {
        let mut ctrl = ChannelSession::new(Channel::Ctrl);
        ctrl.session_id = Some(vec![1, 2, 3]);
        let mut data = ChannelSession::new(Channel::Data);
        data.resumed = true;
        data.session_id = Some(vec![1, 2, 3]);
        assert!(data.reused_from(&ctrl));
    }

    #[test]
    fn tls13_appdata_reuse_match() {
        let mut ctrl = ChannelSession::new(Channel::Ctrl);
        ctrl.session_ticket_appdata = Some([7u8; 32]);
        let mut data = ChannelSession::new(Channel::Data);
        data.resumed = true;
        data.session_ticket_appdata = Some([7u8; 32]);
        assert!(data.reused_from(&ctrl));
    }

    #[test]
    fn fresh_session_is_not_reused() {
        let ctrl = ChannelSession::new(Channel::Ctrl);
        let data = ChannelSession::new(Channel::Data);
        assert!(!data.reused_from(&ctrl));
    }

    #[test]
    fn notes_set_on_handshake_completion() {
        let mut s = TlsSessionState::default();
        s.record_ctrl_handshake_notes("TLSv1.3", "TLS13_AES_256_GCM_SHA384".to_string(), Some("example.com".to_string()));
        assert_eq!(s.notes.get("TLS_PROTOCOL").unwrap(), "TLSv1.3");
        assert_eq!(s.notes.get("FTPS").unwrap(), "1");
    }
}
