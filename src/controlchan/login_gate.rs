//! Gates commands that require the control channel to already satisfy the
//! TLS-before-auth policy (spec.md §4.10's `any | USER/PASS/ACCT` row),
//! distinct from login-state gating which belongs to the external
//! authentication collaborator.

use super::error::ControlChanError;
use super::event::{Command, Event};
use super::handler::CommandContext;
use super::middleware::ControlChanMiddleware;
use super::reply::{Reply, ReplyCode};
use async_trait::async_trait;

/// Rejects `AUTH`/`PBSZ`/`PROT`/`CCC` commands that arrive in a control
/// channel state where spec.md §4.10's transition table has no entry,
/// replying 503 rather than forwarding them to a handler that would have
/// to guess.
pub struct ProtocolSequenceGate<Next> {
    /// The next link in the chain.
    pub next: Next,
}

#[async_trait]
impl<Next: ControlChanMiddleware> ControlChanMiddleware for ProtocolSequenceGate<Next> {
    async fn handle(&mut self, ctx: &CommandContext, event: Event) -> Result<Reply, ControlChanError> {
        use crate::controlchan::state::ControlChanState;

        let state = ctx.session.lock().await.state;
        match (&state, &event) {
            (ControlChanState::Plain, Event::Command(Command::Pbsz(_))) | (ControlChanState::Plain, Event::Command(Command::Prot(_))) => Ok(Reply::new(ReplyCode::BadCommandSequence, "PBSZ/PROT require a secured control channel")),
            (ControlChanState::Secured, Event::Command(Command::Auth(_))) => Ok(Reply::new(ReplyCode::BadCommandSequence, "control channel is already secured")),
            // Testable Property 7: once CCC has cleared the channel, AUTH
            // is refused with 534 rather than the generic 503.
            (ControlChanState::Cleared, Event::Command(Command::Auth(_))) => Ok(Reply::new(ReplyCode::FtpsRequired, "control channel was cleared with CCC")),
            (ControlChanState::Cleared, Event::Command(Command::Ccc)) => Ok(Reply::new(ReplyCode::BadCommandSequence, "control channel is already cleared")),
            (ControlChanState::AwaitingAuth, Event::Command(_)) => Ok(Reply::new(ReplyCode::BadCommandSequence, "TLS handshake in progress")),
            _ => self.next.handle(ctx, event).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::TlsSessionState;
    use std::sync::Arc;
    use tokio::sync::{mpsc, Mutex};

    struct Terminal;

    #[async_trait]
    impl ControlChanMiddleware for Terminal {
        async fn handle(&mut self, _ctx: &CommandContext, _event: Event) -> Result<Reply, ControlChanError> {
            Ok(Reply::new(ReplyCode::CommandOkay, "terminal"))
        }
    }

    #[tokio::test]
    async fn pbsz_before_auth_is_rejected() {
        let (tx, _rx) = mpsc::channel(1);
        let ctx = CommandContext {
            session: Arc::new(Mutex::new(TlsSessionState::default())),
            tls_configured: true,
            is_anonymous: false,
            policy: Default::default(),
            actions: tx,
        };
        let mut gate = ProtocolSequenceGate { next: Terminal };
        let reply = gate.handle(&ctx, Event::Command(Command::Pbsz(0))).await.unwrap();
        assert!(matches!(reply, Reply::CodeAndMsg { code: ReplyCode::BadCommandSequence, .. }));
    }
}
