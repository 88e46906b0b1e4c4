//! The RFC 2228 Data Channel Protection Level (`PROT`) command.

use crate::controlchan::error::{ControlChanError, ControlChanErrorKind};
use crate::controlchan::event::ProtParam;
use crate::controlchan::handler::{CommandContext, CommandHandler};
use crate::controlchan::reply::{Reply, ReplyCode};
use async_trait::async_trait;

/// Handles `PROT <param>`.
pub struct Prot {
    param: ProtParam,
}

impl Prot {
    /// Creates a handler for the given `PROT` parameter.
    pub fn new(param: ProtParam) -> Self {
        Prot { param }
    }
}

#[async_trait]
impl CommandHandler for Prot {
    async fn handle(&self, ctx: &CommandContext) -> Result<Reply, ControlChanError> {
        if !ctx.tls_configured {
            return Ok(Reply::new(ReplyCode::CommandNotImplemented, "TLS/SSL not configured"));
        }
        match self.param {
            ProtParam::Clear => {
                ctx.session
                    .lock()
                    .await
                    .flags
                    .set_need_data_prot(false)
                    .map_err(|_| ControlChanError::new(ControlChanErrorKind::InternalServerError))?;
                Ok(Reply::new(ReplyCode::CommandOkay, "PROT OK: data channel will be plaintext"))
            }
            ProtParam::Private => {
                ctx.session
                    .lock()
                    .await
                    .flags
                    .set_need_data_prot(true)
                    .map_err(|_| ControlChanError::new(ControlChanErrorKind::InternalServerError))?;
                Ok(Reply::new(ReplyCode::CommandOkay, "PROT OK: securing data channel"))
            }
            ProtParam::Safe | ProtParam::Confidential => Ok(Reply::new(ReplyCode::ProtLevelNotSupported, "PROT S/E not supported")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flags::SessionFlags;
    use crate::session::TlsSessionState;
    use std::sync::Arc;
    use tokio::sync::{mpsc, Mutex};

    fn ctx_secured() -> CommandContext {
        let mut session = TlsSessionState::default();
        session.flags.set_on_ctrl();
        let (tx, _rx) = mpsc::channel(1);
        CommandContext {
            session: Arc::new(Mutex::new(session)),
            tls_configured: true,
            is_anonymous: false,
            policy: Default::default(),
            actions: tx,
        }
    }

    #[tokio::test]
    async fn prot_private_sets_need_data_prot() {
        let ctx = ctx_secured();
        Prot::new(ProtParam::Private).handle(&ctx).await.unwrap();
        assert!(ctx.session.lock().await.flags.contains(SessionFlags::NEED_DATA_PROT));
    }

    #[tokio::test]
    async fn prot_clear_clears_need_data_prot() {
        let ctx = ctx_secured();
        Prot::new(ProtParam::Private).handle(&ctx).await.unwrap();
        Prot::new(ProtParam::Clear).handle(&ctx).await.unwrap();
        assert!(!ctx.session.lock().await.flags.contains(SessionFlags::NEED_DATA_PROT));
    }

    #[tokio::test]
    async fn prot_safe_is_unsupported() {
        let ctx = ctx_secured();
        let reply = Prot::new(ProtParam::Safe).handle(&ctx).await.unwrap();
        assert!(matches!(reply, Reply::CodeAndMsg { code: ReplyCode::ProtLevelNotSupported, .. }));
    }
}
