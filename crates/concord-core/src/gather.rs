//! Scatter-gather capability the dispatcher canvasses other participants with.
//!
//! The primitive itself lives outside this crate. Its contract: a `gather` on
//! a channel invokes the handler every *other* participant registered on that
//! channel, and resolves once exactly one reply per addressed participant has
//! arrived.

use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Channel for activation rounds.
pub const ACTIVATION_CHANNEL: &str = "guards:can-activate";
/// Channel for deactivation rounds.
pub const DEACTIVATION_CHANNEL: &str = "guards:can-deactivate";

/// Request broadcast in a round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckRequest {
    pub url: String,
}

impl CheckRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

/// One participant's answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckReply {
    pub participant: String,
    pub allowed: bool,
}

/// Every reply of a completed round.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatherResponse {
    pub replies: Vec<CheckReply>,
}

impl GatherResponse {
    /// True when nobody objected. An empty round is unanimous.
    pub fn unanimous(&self) -> bool {
        self.replies.iter().all(|r| r.allowed)
    }

    pub fn dissenters(&self) -> impl Iterator<Item = &str> {
        self.replies
            .iter()
            .filter(|r| !r.allowed)
            .map(|r| r.participant.as_str())
    }
}

/// Handler invoked when another participant gathers on a channel.
pub type CheckHandler = Arc<dyn Fn(CheckRequest) -> BoxFuture<'static, bool> + Send + Sync>;

/// A participant's handle on the scatter-gather primitive.
pub trait ScatterGather: Send + Sync {
    /// Name of the participant this handle belongs to.
    fn participant(&self) -> &str;

    /// Install this participant's handler for `channel`, replacing any previous one.
    fn register_handler(&self, channel: &str, handler: CheckHandler);

    /// Broadcast `request` on `channel` and collect one reply per other participant.
    fn gather(
        &self,
        channel: &str,
        request: CheckRequest,
    ) -> BoxFuture<'_, Result<GatherResponse, GatherError>>;

    /// Remove this participant's handler for `channel`.
    fn destroy(&self, channel: &str);
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum GatherError {
    #[error("scatter-gather primitive is gone (channel {channel})")]
    Disconnected { channel: String },
}
