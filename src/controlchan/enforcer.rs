//! `TLSRequired` enforcement middleware (spec.md §4.10): a control-channel
//! variant and a data-channel variant, each checking the relevant axis of
//! [`TlsRequiredPolicy`] against this crate's [`crate::flags::SessionFlags`]
//! bitset rather than a pair of plain booleans.

use super::error::ControlChanError;
use super::event::{Command, Event};
use super::handler::CommandContext;
use super::middleware::ControlChanMiddleware;
use super::reply::{Reply, ReplyCode};
use crate::options::Requirement;
use async_trait::async_trait;

/// Enforces the `ctrl` and `auth` axes of `TLSRequired` ahead of the next
/// middleware/handler in the chain.
pub struct FtpsControlChanEnforcerMiddleware<Next> {
    /// The next link in the chain.
    pub next: Next,
}

#[async_trait]
impl<Next: ControlChanMiddleware> ControlChanMiddleware for FtpsControlChanEnforcerMiddleware<Next> {
    async fn handle(&mut self, ctx: &CommandContext, event: Event) -> Result<Reply, ControlChanError> {
        let ctrl_secured = ctx.session.lock().await.flags.ctrl_is_secured();

        match &event {
            Event::Command(Command::User(_)) | Event::Command(Command::Pass(_)) | Event::Command(Command::Acct(_)) => {
                let required = ctx.policy.auth == Requirement::Required;
                let exempt = ctx.is_anonymous && ctx.policy.auth != Requirement::Required;
                if required && !ctrl_secured && !exempt {
                    return Ok(Reply::new(ReplyCode::ActionNotTaken, "TLS is required before authenticating"));
                }
                self.next.handle(ctx, event).await
            }
            Event::Command(Command::Ccc) if ctx.policy.ctrl == Requirement::Required => Ok(Reply::new(ReplyCode::FtpsRequired, "cannot downgrade: TLS enforced on the control channel")),
            _ => self.next.handle(ctx, event).await,
        }
    }
}

/// Enforces the `data` axis of `TLSRequired` ahead of data-channel setup.
pub struct FtpsDataChanEnforcerMiddleware<Next> {
    /// The next link in the chain.
    pub next: Next,
}

#[async_trait]
impl<Next: ControlChanMiddleware> ControlChanMiddleware for FtpsDataChanEnforcerMiddleware<Next> {
    async fn handle(&mut self, ctx: &CommandContext, event: Event) -> Result<Reply, ControlChanError> {
        match &event {
            Event::Command(Command::Pasv) | Event::Command(Command::DataTransfer) => {
                let data_required = ctx.policy.data == Requirement::Required;
                let needs_prot = ctx.session.lock().await.flags.contains(crate::flags::SessionFlags::NEED_DATA_PROT);
                if data_required && !needs_prot {
                    return Ok(Reply::new(ReplyCode::FtpsRequired, "a protected data connection is required"));
                }
                self.next.handle(ctx, event).await
            }
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

    fn ctx(policy_auth_required: bool) -> CommandContext {
        let (tx, _rx) = mpsc::channel(1);
        CommandContext {
            session: Arc::new(Mutex::new(TlsSessionState::default())),
            tls_configured: true,
            is_anonymous: false,
            policy: crate::options::TlsRequiredPolicy {
                ctrl: if policy_auth_required { Requirement::Required } else { Requirement::Allowed },
                data: Requirement::Allowed,
                auth: if policy_auth_required { Requirement::Required } else { Requirement::Allowed },
            },
            actions: tx,
        }
    }

    #[tokio::test]
    async fn rejects_user_without_tls_when_auth_required() {
        let mut mw = FtpsControlChanEnforcerMiddleware { next: Terminal };
        let reply = mw.handle(&ctx(true), Event::Command(Command::User("bob".into()))).await.unwrap();
        assert!(matches!(reply, Reply::CodeAndMsg { code: ReplyCode::ActionNotTaken, .. }));
    }

    #[tokio::test]
    async fn allows_user_when_tls_not_required() {
        let mut mw = FtpsControlChanEnforcerMiddleware { next: Terminal };
        let reply = mw.handle(&ctx(false), Event::Command(Command::User("bob".into()))).await.unwrap();
        assert!(matches!(reply, Reply::CodeAndMsg { code: ReplyCode::CommandOkay, .. }));
    }
}
