//! The RFC 2228 Clear Command Channel (`CCC`) command.

use crate::controlchan::error::ControlChanError;
use crate::controlchan::event::InternalMsg;
use crate::controlchan::handler::{CommandContext, CommandHandler};
use crate::controlchan::reply::{Reply, ReplyCode};
use crate::controlchan::state::ControlChanState;
use crate::options::Requirement;
use async_trait::async_trait;
use tracing::warn;

/// Handles `CCC`. Valid only from the `Secured` state (enforced by
/// [`crate::controlchan::login_gate::ProtocolSequenceGate`]) and only when
/// `TLSRequired ctrl` does not mandate TLS - spec.md §4.10's "`TLSRequired
/// ctrl ≠ required`; passes `<Limit>`" guard, interpreted here as "at most
/// one `CCC` per session" (see DESIGN.md).
pub struct Ccc;

#[async_trait]
impl CommandHandler for Ccc {
    async fn handle(&self, ctx: &CommandContext) -> Result<Reply, ControlChanError> {
        if ctx.policy.ctrl == Requirement::Required {
            return Ok(Reply::new(ReplyCode::FtpsRequired, "cannot downgrade: TLS enforced on the control channel"));
        }

        {
            let mut session = ctx.session.lock().await;
            session.state = ControlChanState::Cleared;
            session.flags.set_have_ccc();
        }

        #[cfg(feature = "prometheus")]
        crate::metrics::inc_ccc();

        // Reply is sent before the TLS shutdown itself runs (spec.md §6:
        // "issued before shutting down ctrl TLS").
        let actions = ctx.actions.clone();
        tokio::spawn(async move {
            if let Err(err) = actions.send(InternalMsg::PlaintextControlChannel).await {
                warn!(%err, "failed to signal control channel clear");
            }
        });

        Ok(Reply::new(ReplyCode::CommandOkay, "control channel cleared"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::TlsSessionState;
    use std::sync::Arc;
    use tokio::sync::{mpsc, Mutex};

    fn ctx(ctrl_required: bool) -> CommandContext {
        let (tx, _rx) = mpsc::channel(4);
        CommandContext {
            session: Arc::new(Mutex::new(TlsSessionState::default())),
            tls_configured: true,
            is_anonymous: false,
            policy: crate::options::TlsRequiredPolicy {
                ctrl: if ctrl_required { Requirement::Required } else { Requirement::Allowed },
                data: Requirement::Allowed,
                auth: Requirement::Allowed,
            },
            actions: tx,
        }
    }

    #[tokio::test]
    async fn ccc_transitions_to_cleared_when_allowed() {
        let ctx = ctx(false);
        let reply = Ccc.handle(&ctx).await.unwrap();
        assert!(matches!(reply, Reply::CodeAndMsg { code: ReplyCode::CommandOkay, .. }));
        assert_eq!(ctx.session.lock().await.state, ControlChanState::Cleared);
    }

    #[tokio::test]
    async fn ccc_refused_when_ctrl_tls_required() {
        let ctx = ctx(true);
        let reply = Ccc.handle(&ctx).await.unwrap();
        assert!(matches!(reply, Reply::CodeAndMsg { code: ReplyCode::FtpsRequired, .. }));
        assert_eq!(ctx.session.lock().await.state, ControlChanState::Plain);
    }
}
