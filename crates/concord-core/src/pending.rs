//! In-flight "check yourself" requests, keyed by URL.
//!
//! A channel handler enqueues a ticket before forcing a navigation to a URL;
//! the dispatcher answers it when that navigation reaches a guard in check
//! mode. Tickets for the same URL are served oldest first, unless the
//! navigation carries its ticket in the state payload, in which case exactly
//! that ticket is answered.

use crate::state::NavigationState;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::oneshot;

/// Navigation state key a forced check navigation carries its ticket under.
pub const TICKET_KEY: &str = "guardCheckTicket";

/// Handle to one pending check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ticket(u64);

impl Ticket {
    pub fn id(self) -> u64 {
        self.0
    }

    /// Attach this ticket to a navigation state.
    pub fn attach(self, state: NavigationState) -> NavigationState {
        state.with_data(TICKET_KEY, self.0.into())
    }

    /// The ticket a navigation state carries, if any.
    pub fn from_state(state: &NavigationState) -> Option<Self> {
        state.data().get(TICKET_KEY)?.as_u64().map(Ticket)
    }
}

struct Waiter {
    ticket: Ticket,
    reply: oneshot::Sender<bool>,
}

#[derive(Default)]
pub struct PendingChecks {
    next_ticket: AtomicU64,
    entries: Mutex<HashMap<String, VecDeque<Waiter>>>,
}

impl PendingChecks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue a check for `url`. The receiver yields the verdict.
    pub fn insert(&self, url: &str) -> (Ticket, oneshot::Receiver<bool>) {
        let ticket = Ticket(self.next_ticket.fetch_add(1, Ordering::Relaxed));
        let (reply, rx) = oneshot::channel();

        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let queue = entries.entry(url.to_string()).or_default();
        if !queue.is_empty() {
            tracing::warn!(
                "concurrent guard check for {} ({} already pending), serving in arrival order",
                url,
                queue.len()
            );
        }
        queue.push_back(Waiter { ticket, reply });
        (ticket, rx)
    }

    /// Answer the oldest pending check for `url`.
    ///
    /// Returns false when nothing was waiting.
    pub fn resolve(&self, url: &str, verdict: bool) -> bool {
        let waiter = {
            let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
            let Some(queue) = entries.get_mut(url) else {
                return false;
            };
            let waiter = queue.pop_front();
            if queue.is_empty() {
                entries.remove(url);
            }
            waiter
        };

        match waiter {
            Some(waiter) => {
                if waiter.reply.send(verdict).is_err() {
                    tracing::debug!("check {:?} for {} was abandoned", waiter.ticket, url);
                }
                true
            }
            None => false,
        }
    }

    /// Answer a specific ticket if it is still pending.
    pub fn resolve_ticket(&self, url: &str, ticket: Ticket, verdict: bool) -> bool {
        let waiter = {
            let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
            let Some(queue) = entries.get_mut(url) else {
                return false;
            };
            let Some(pos) = queue.iter().position(|w| w.ticket == ticket) else {
                return false;
            };
            let waiter = queue.remove(pos);
            if queue.is_empty() {
                entries.remove(url);
            }
            waiter
        };

        match waiter {
            Some(waiter) => {
                let _ = waiter.reply.send(verdict);
                true
            }
            None => false,
        }
    }

    pub fn is_pending(&self, url: &str) -> bool {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.contains_key(url)
    }

    /// Number of pending checks across all URLs.
    pub fn len(&self) -> usize {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.values().map(VecDeque::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
