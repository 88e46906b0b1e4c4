//! `SSCN`: Set Secure Client Negotiation - toggles which side of a data
//! channel handshake this server plays (spec.md §4.9, §6).

use crate::controlchan::error::ControlChanError;
use crate::controlchan::event::SscnMode;
use crate::controlchan::handler::{CommandContext, CommandHandler};
use crate::controlchan::reply::{Reply, ReplyCode};
use async_trait::async_trait;

/// Handles `SSCN [ON|OFF]`.
pub struct Sscn {
    mode: SscnMode,
}

impl Sscn {
    /// Creates a handler for the given `SSCN` mode.
    pub fn new(mode: SscnMode) -> Self {
        Sscn { mode }
    }
}

#[async_trait]
impl CommandHandler for Sscn {
    async fn handle(&self, ctx: &CommandContext) -> Result<Reply, ControlChanError> {
        match self.mode {
            SscnMode::Query => {
                let client_mode = ctx.session.lock().await.sscn_client_mode;
                Ok(Reply::new(ReplyCode::CommandOkay, if client_mode { "SSCN ON" } else { "SSCN OFF" }))
            }
            SscnMode::Client => {
                ctx.session.lock().await.sscn_client_mode = true;
                Ok(Reply::new(ReplyCode::CommandOkay, "SSCN ON"))
            }
            SscnMode::Server => {
                ctx.session.lock().await.sscn_client_mode = false;
                Ok(Reply::new(ReplyCode::CommandOkay, "SSCN OFF"))
            }
        }
    }
}
