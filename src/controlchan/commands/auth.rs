//! The `AUTH` command (spec.md §4.10): requests that the control channel's
//! TLS handshake begin. A client decides separately, via `PBSZ`/`PROT`,
//! whether to secure data connections too.

use crate::controlchan::error::ControlChanError;
use crate::controlchan::event::{AuthParam, InternalMsg};
use crate::controlchan::handler::{CommandContext, CommandHandler};
use crate::controlchan::reply::{Reply, ReplyCode};
use crate::controlchan::state::ControlChanState;
use async_trait::async_trait;
use tracing::warn;

/// Handles `AUTH <param>`.
pub struct Auth {
    param: AuthParam,
}

impl Auth {
    /// Creates a handler for the given `AUTH` parameter.
    pub fn new(param: AuthParam) -> Self {
        Auth { param }
    }
}

#[async_trait]
impl CommandHandler for Auth {
    async fn handle(&self, ctx: &CommandContext) -> Result<Reply, ControlChanError> {
        match (ctx.tls_configured, self.param) {
            (true, AuthParam::Tls) | (true, AuthParam::TlsP) | (true, AuthParam::Ssl) => {
                ctx.session.lock().await.state = ControlChanState::AwaitingAuth;
                let actions = ctx.actions.clone();
                tokio::spawn(async move {
                    if let Err(err) = actions.send(InternalMsg::SecureControlChannel).await {
                        warn!(%err, "failed to signal control channel handshake");
                    }
                });
                Ok(Reply::new(ReplyCode::AuthOkayNoDataNeeded, "AUTH TLS OK, starting TLS handshake"))
            }
            (false, _) => Ok(Reply::new(ReplyCode::NoCertificateAvailable, "no certificate available")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::TlsSessionState;
    use std::sync::Arc;
    use tokio::sync::{mpsc, Mutex};

    fn ctx(tls_configured: bool) -> CommandContext {
        let (tx, _rx) = mpsc::channel(4);
        CommandContext {
            session: Arc::new(Mutex::new(TlsSessionState::default())),
            tls_configured,
            is_anonymous: false,
            policy: Default::default(),
            actions: tx,
        }
    }

    #[tokio::test]
    async fn auth_tls_moves_to_awaiting_auth_and_replies_234() {
        let ctx = ctx(true);
        let reply = Auth::new(AuthParam::Tls).handle(&ctx).await.unwrap();
        assert!(matches!(reply, Reply::CodeAndMsg { code: ReplyCode::AuthOkayNoDataNeeded, .. }));
        assert_eq!(ctx.session.lock().await.state, ControlChanState::AwaitingAuth);
    }

    #[tokio::test]
    async fn auth_without_credentials_reports_no_certificate() {
        let ctx = ctx(false);
        let reply = Auth::new(AuthParam::Tls).handle(&ctx).await.unwrap();
        assert!(matches!(reply, Reply::CodeAndMsg { code: ReplyCode::NoCertificateAvailable, .. }));
    }

    #[tokio::test]
    async fn auth_ssl_is_accepted_like_auth_tls() {
        let ctx = ctx(true);
        let reply = Auth::new(AuthParam::Ssl).handle(&ctx).await.unwrap();
        assert!(matches!(reply, Reply::CodeAndMsg { code: ReplyCode::AuthOkayNoDataNeeded, .. }));
        assert_eq!(ctx.session.lock().await.state, ControlChanState::AwaitingAuth);
    }
}
