//! The middleware chain control channel events flow through before
//! reaching a [`crate::controlchan::handler::CommandHandler`].

use super::error::ControlChanError;
use super::event::Event;
use super::handler::CommandContext;
use super::reply::Reply;
use async_trait::async_trait;

/// Intercepts control channel events, optionally short-circuiting them
/// with a [`Reply`] before they reach the next link in the chain.
#[async_trait]
pub trait ControlChanMiddleware: Send + Sync {
    /// Handles `event`, either replying directly or delegating onward.
    async fn handle(&mut self, ctx: &CommandContext, event: Event) -> Result<Reply, ControlChanError>;
}
