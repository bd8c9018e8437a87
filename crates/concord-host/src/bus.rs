//! In-process scatter-gather primitive.
//!
//! Participants join the bus and get a [`BusClient`]. A gather on a channel
//! reaches the handler of every *other* participant registered on that
//! channel, each on its own task, and completes when every one of them has
//! replied. Rounds are numbered so they can be traced in the logs. A client
//! that has left the bus can no longer gather.

use concord_core::{
    CheckHandler, CheckReply, CheckRequest, GatherError, GatherResponse, ScatterGather,
};
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// Sequence number of one gather round, used to trace it in the logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RoundId(u64);

impl fmt::Display for RoundId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "round#{}", self.0)
    }
}

#[derive(Default)]
pub struct Bus {
    // channel -> participant -> handler
    handlers: Mutex<HashMap<String, BTreeMap<String, CheckHandler>>>,
    next_round: AtomicU64,
}

impl Bus {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn join(self: &Arc<Self>, participant: impl Into<String>) -> Arc<BusClient> {
        Arc::new(BusClient {
            bus: self.clone(),
            participant: participant.into(),
            left: AtomicBool::new(false),
        })
    }

    /// Participants currently answering on `channel`.
    pub fn listeners(&self, channel: &str) -> Vec<String> {
        let handlers = self.lock();
        handlers
            .get(channel)
            .map(|h| h.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, BTreeMap<String, CheckHandler>>> {
        self.handlers.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// One participant's handle on the bus.
pub struct BusClient {
    bus: Arc<Bus>,
    participant: String,
    left: AtomicBool,
}

impl BusClient {
    /// Drop every handler of this participant and refuse further rounds.
    pub fn leave(&self) {
        self.left.store(true, Ordering::SeqCst);
        let mut handlers = self.bus.lock();
        handlers.retain(|_, h| {
            h.remove(&self.participant);
            !h.is_empty()
        });
        tracing::debug!("{} left the bus", self.participant);
    }

    pub fn has_left(&self) -> bool {
        self.left.load(Ordering::SeqCst)
    }
}

impl ScatterGather for BusClient {
    fn participant(&self) -> &str {
        &self.participant
    }

    fn register_handler(&self, channel: &str, handler: CheckHandler) {
        let mut handlers = self.bus.lock();
        let previous = handlers
            .entry(channel.to_string())
            .or_default()
            .insert(self.participant.clone(), handler);
        if previous.is_some() {
            tracing::debug!("{} replaced its handler on {}", self.participant, channel);
        }
    }

    fn gather(
        &self,
        channel: &str,
        request: CheckRequest,
    ) -> BoxFuture<'_, Result<GatherResponse, GatherError>> {
        if self.has_left() {
            let channel = channel.to_string();
            return async move { Err(GatherError::Disconnected { channel }) }.boxed();
        }
        let round = RoundId(self.bus.next_round.fetch_add(1, Ordering::Relaxed));
        let targets: Vec<(String, CheckHandler)> = {
            let handlers = self.bus.lock();
            handlers
                .get(channel)
                .map(|h| {
                    h.iter()
                        .filter(|(name, _)| **name != self.participant)
                        .map(|(name, handler)| (name.clone(), handler.clone()))
                        .collect()
                })
                .unwrap_or_default()
        };
        let channel = channel.to_string();

        async move {
            tracing::debug!(
                "{} {} on {} for {} -> {:?}",
                self.participant,
                round,
                channel,
                request.url,
                targets.iter().map(|(name, _)| name).collect::<Vec<_>>()
            );

            let expected = targets.len();
            let (tx, mut rx) = mpsc::unbounded_channel::<CheckReply>();
            for (participant, handler) in targets {
                let tx = tx.clone();
                let request = request.clone();
                tokio::spawn(async move {
                    let allowed = handler(request).await;
                    let _ = tx.send(CheckReply {
                        participant,
                        allowed,
                    });
                });
            }
            drop(tx);

            let mut replies = Vec::with_capacity(expected);
            while replies.len() < expected {
                match rx.recv().await {
                    Some(reply) => replies.push(reply),
                    None => {
                        // A handler went away without replying. No reply
                        // means no agreement; the round never completes.
                        tracing::warn!(
                            "{}: {} of {} replies arrived before a handler was lost",
                            round,
                            replies.len(),
                            expected
                        );
                        futures_util::future::pending::<()>().await;
                    }
                }
            }

            tracing::debug!("{} complete with {} replies", round, replies.len());
            Ok(GatherResponse { replies })
        }
        .boxed()
    }

    fn destroy(&self, channel: &str) {
        let mut handlers = self.bus.lock();
        if let Some(h) = handlers.get_mut(channel) {
            h.remove(&self.participant);
            if h.is_empty() {
                handlers.remove(channel);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn answering(allowed: bool) -> CheckHandler {
        Arc::new(move |_: CheckRequest| async move { allowed }.boxed())
    }

    #[tokio::test]
    async fn gathers_from_everyone_else() {
        let bus = Bus::new();
        let shell = bus.join("shell");
        let orders = bus.join("orders");
        let cart = bus.join("cart");
        shell.register_handler("c", answering(true));
        orders.register_handler("c", answering(true));
        cart.register_handler("c", answering(false));

        let mut response = shell.gather("c", CheckRequest::new("/x")).await.unwrap();
        response.replies.sort_by(|a, b| a.participant.cmp(&b.participant));
        assert_eq!(
            response.replies,
            vec![
                CheckReply {
                    participant: "cart".into(),
                    allowed: false
                },
                CheckReply {
                    participant: "orders".into(),
                    allowed: true
                },
            ]
        );
    }

    #[tokio::test]
    async fn empty_channel_resolves_immediately() {
        let bus = Bus::new();
        let shell = bus.join("shell");
        let response = shell.gather("nobody", CheckRequest::new("/x")).await.unwrap();
        assert!(response.replies.is_empty());
        assert!(response.unanimous());
    }

    #[tokio::test]
    async fn destroy_removes_only_own_handler() {
        let bus = Bus::new();
        let a = bus.join("a");
        let b = bus.join("b");
        a.register_handler("c", answering(true));
        b.register_handler("c", answering(true));

        a.destroy("c");
        assert_eq!(bus.listeners("c"), vec!["b".to_string()]);
    }

    #[tokio::test]
    async fn left_client_is_disconnected() {
        let bus = Bus::new();
        let a = bus.join("a");
        let b = bus.join("b");
        a.register_handler("c", answering(true));
        a.register_handler("d", answering(true));
        b.register_handler("c", answering(true));

        a.leave();
        assert_eq!(bus.listeners("c"), vec!["b".to_string()]);
        assert!(bus.listeners("d").is_empty());

        let err = a.gather("c", CheckRequest::new("/x")).await.unwrap_err();
        assert!(matches!(err, GatherError::Disconnected { ref channel } if channel == "c"));

        let response = b.gather("c", CheckRequest::new("/x")).await.unwrap();
        assert!(response.replies.is_empty());
    }

    #[tokio::test]
    async fn silent_handler_stalls_round() {
        let bus = Bus::new();
        let a = bus.join("a");
        let b = bus.join("b");
        b.register_handler("c", Arc::new(|_: CheckRequest| futures_util::future::pending::<bool>().boxed()));

        let round = a.gather("c", CheckRequest::new("/x"));
        assert!(tokio::time::timeout(Duration::from_millis(50), round).await.is_err());
    }
}
