//! Router capability the protocol drives forced navigations through.

use crate::state::NavigationState;
use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};

/// Extras passed with a navigation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NavigateOptions {
    pub state: NavigationState,
    /// Run the navigation even if the router is already on this URL.
    pub force_even_if_same_url: bool,
}

impl NavigateOptions {
    pub fn with_state(state: NavigationState) -> Self {
        Self {
            state,
            force_even_if_same_url: false,
        }
    }

    pub fn forced(state: NavigationState) -> Self {
        Self {
            state,
            force_even_if_same_url: true,
        }
    }
}

/// How a navigation attempt ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum NavigationOutcome {
    /// The router moved to the URL.
    Committed { url: String },
    /// A guard denied; the router stayed where it was.
    Cancelled { url: String },
    /// A guard redirected; the router ended up at `to`.
    Redirected { from: String, to: String },
    /// Already on the URL and not forced.
    Skipped { url: String },
    /// No route here matches the URL.
    Unrouted { url: String },
}

impl NavigationOutcome {
    pub fn is_committed(&self) -> bool {
        matches!(
            self,
            NavigationOutcome::Committed { .. } | NavigationOutcome::Redirected { .. }
        )
    }
}

/// What the dispatcher needs from a participant's router.
pub trait Navigator: Send + Sync {
    /// State of the navigation currently in progress, if any.
    ///
    /// For guards and host code that run outside a [`GuardContext`]. The
    /// dispatcher itself classifies the state carried by the context it is
    /// handed and never calls this.
    ///
    /// [`GuardContext`]: crate::GuardContext
    fn current_navigation_state(&self) -> Option<NavigationState>;

    /// Start a navigation and wait for it to finish.
    fn navigate_to(
        &self,
        url: &str,
        options: NavigateOptions,
    ) -> BoxFuture<'static, Result<NavigationOutcome, NavigateError>>;
}

/// Router-side failure as seen through the capability.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{0}")]
pub struct NavigateError(pub String);
