//! The per-command handler contract (spec.md §4.10), generalized from the
//! teacher's `CommandHandler<Storage, User>` down to this crate's narrower
//! scope: no storage backend or generic user type, since both are external
//! collaborators (spec.md §1 Non-goals).

use super::error::ControlChanError;
use super::event::InternalMsg;
use super::reply::Reply;
use crate::options::TlsRequiredPolicy;
use crate::session::TlsSessionState;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

/// Everything a command handler needs to decide on a [`Reply`].
pub struct CommandContext {
    /// The FTP session's shared TLS state.
    pub session: Arc<Mutex<TlsSessionState>>,
    /// Whether this virtual host has certificates configured at all - AUTH
    /// rejects with 502 otherwise.
    pub tls_configured: bool,
    /// Whether the authenticated user is anonymous (exempts `TLSRequired
    /// Accounts`, spec.md §4.10).
    pub is_anonymous: bool,
    /// The effective `TLSRequired` policy for this virtual host.
    pub policy: TlsRequiredPolicy,
    /// Channel for requesting side effects outside this synchronous call
    /// (running the actual handshake, tearing TLS down on CCC).
    pub actions: mpsc::Sender<InternalMsg>,
}

/// Handles a single parsed command and produces a reply.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    /// Runs this handler against `ctx`.
    async fn handle(&self, ctx: &CommandContext) -> Result<Reply, ControlChanError>;
}
