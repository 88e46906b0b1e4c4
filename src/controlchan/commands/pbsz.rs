//! Protection Buffer Size (spec.md §4.10).
//!
//! For FTP-TLS, which is a streaming protection mechanism, buffering is
//! meaningless; `PBSZ` is still compulsory before `PROT` (RFC 2228) but its
//! parameter is expected to be `0`. Per this crate's Open Question
//! decision (SPEC_FULL.md §9), a nonzero size still gets a `200` reply
//! rather than a rejection, since some clients (incorrectly) send one, but
//! it does not set `PBSZ_OK` and is logged at `warn`.

use crate::controlchan::error::ControlChanError;
use crate::controlchan::handler::{CommandContext, CommandHandler};
use crate::controlchan::reply::{Reply, ReplyCode};
use crate::flags::SessionFlags;
use async_trait::async_trait;
use tracing::warn;

/// Handles `PBSZ <size>`.
pub struct Pbsz {
    size: u64,
}

impl Pbsz {
    /// Creates a handler for the given protection buffer size.
    pub fn new(size: u64) -> Self {
        Pbsz { size }
    }
}

#[async_trait]
impl CommandHandler for Pbsz {
    async fn handle(&self, ctx: &CommandContext) -> Result<Reply, ControlChanError> {
        if self.size == 0 {
            ctx.session.lock().await.flags.insert(SessionFlags::PBSZ_OK);
        } else {
            warn!(size = self.size, "PBSZ received a nonzero size; PBSZ_OK not set");
        }
        Ok(Reply::new(ReplyCode::CommandOkay, "PBSZ OK"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::TlsSessionState;
    use std::sync::Arc;
    use tokio::sync::{mpsc, Mutex};

    #[tokio::test]
    async fn pbsz_zero_records_ok_flag() {
        let (tx, _rx) = mpsc::channel(1);
        let ctx = CommandContext {
            session: Arc::new(Mutex::new(TlsSessionState::default())),
            tls_configured: true,
            is_anonymous: false,
            policy: Default::default(),
            actions: tx,
        };
        let reply = Pbsz::new(0).handle(&ctx).await.unwrap();
        assert!(matches!(reply, Reply::CodeAndMsg { code: ReplyCode::CommandOkay, .. }));
        assert!(ctx.session.lock().await.flags.contains(SessionFlags::PBSZ_OK));
    }

    #[tokio::test]
    async fn pbsz_nonzero_is_still_accepted() {
        let (tx, _rx) = mpsc::channel(1);
        let ctx = CommandContext {
            session: Arc::new(Mutex::new(TlsSessionState::default())),
            tls_configured: true,
            is_anonymous: false,
            policy: Default::default(),
            actions: tx,
        };
        let reply = Pbsz::new(4096).handle(&ctx).await.unwrap();
        assert!(matches!(reply, Reply::CodeAndMsg { code: ReplyCode::CommandOkay, .. }));
        assert!(!ctx.session.lock().await.flags.contains(SessionFlags::PBSZ_OK));
    }
}
