//! C10: FTPS Command State Machine (spec.md §4.10).
//!
//! Owns the AUTH/PBSZ/PROT/CCC/SSCN transition table and the `TLSRequired`
//! enforcement middleware. Full FTP command dispatch, authentication
//! backends and storage backends are external collaborators (spec.md §1
//! Non-goals) - this module only handles the commands that affect TLS
//! state, each implemented as its own `CommandHandler` behind a small
//! middleware chain.

pub mod commands;
pub mod enforcer;
pub mod error;
pub mod event;
pub mod handler;
pub mod login_gate;
pub mod middleware;
pub mod reply;
pub mod state;

use crate::session::TlsSessionState;
use crate::tls::handshake::HandshakeOutcome;
use state::ControlChanState;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Applies a completed control-channel handshake to the session (spec.md
/// Testable Property 9: `TLS_CIPHER`/`TLS_PROTOCOL` notes must be set
/// before the next command is dispatched).
pub async fn complete_control_handshake(session: &Arc<Mutex<TlsSessionState>>, outcome: HandshakeOutcome, sni: Option<String>) {
    let mut session = session.lock().await;
    session.flags.set_on_ctrl();
    session.state = ControlChanState::Secured;
    session.record_ctrl_handshake_notes(
        outcome.session.negotiated_version.unwrap_or("unknown"),
        outcome.session.negotiated_cipher.clone().unwrap_or_else(|| "unknown".to_string()),
        sni,
    );
    session.ctrl = Some(outcome.session);
}
