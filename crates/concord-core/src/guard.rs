//! Guard results, the two combination rules, and the guard trait.

use crate::error::GuardError;
use crate::route::RouteSnapshot;
use crate::state::NavigationState;
use futures_util::future::{BoxFuture, try_join_all};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// An alternate destination returned by an activation guard.
///
/// Only meaningful to the participant that produced it; it never crosses the
/// protocol boundary.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Redirect(String);

impl Redirect {
    pub fn to(url: impl Into<String>) -> Self {
        Self(url.into())
    }

    pub fn url(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Redirect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Outcome of a single guard.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "to", rename_all = "snake_case")]
pub enum GuardResult {
    Allow,
    Deny,
    Redirect(Redirect),
}

impl GuardResult {
    pub fn redirect(url: impl Into<String>) -> Self {
        GuardResult::Redirect(Redirect::to(url))
    }

    pub fn is_allow(&self) -> bool {
        matches!(self, GuardResult::Allow)
    }
}

impl From<bool> for GuardResult {
    fn from(allowed: bool) -> Self {
        if allowed {
            GuardResult::Allow
        } else {
            GuardResult::Deny
        }
    }
}

impl fmt::Display for GuardResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GuardResult::Allow => f.write_str("allow"),
            GuardResult::Deny => f.write_str("deny"),
            GuardResult::Redirect(to) => write!(f, "redirect:{to}"),
        }
    }
}

/// `Deny` if any result denies, else the first redirect, else `Allow`.
///
/// Used while the redirect can still be honored locally.
pub fn combine_to_guard_result<I>(results: I) -> GuardResult
where
    I: IntoIterator<Item = GuardResult>,
{
    let mut first_redirect = None;
    for result in results {
        match result {
            GuardResult::Deny => return GuardResult::Deny,
            GuardResult::Redirect(to) if first_redirect.is_none() => first_redirect = Some(to),
            _ => {}
        }
    }
    first_redirect.map_or(GuardResult::Allow, GuardResult::Redirect)
}

/// `false` if any result denies or redirects, else `true`.
///
/// Used once the verdict has to be reported to another participant, where a
/// redirect cannot be expressed and degrades to denial.
pub fn combine_to_boolean<I>(results: I) -> bool
where
    I: IntoIterator<Item = GuardResult>,
{
    results.into_iter().all(|r| r.is_allow())
}

/// What a guard is asked about.
///
/// For activation `route` is the route being entered. For deactivation it is
/// the route being left, and `target_url` is where the navigation is headed.
#[derive(Debug, Clone)]
pub struct GuardContext {
    pub route: RouteSnapshot,
    pub target_url: String,
    pub state: NavigationState,
}

pub type GuardFuture<'a> = BoxFuture<'a, Result<GuardResult, GuardError>>;

/// A route guard. Activation and deactivation guards share this shape.
pub trait Guard: Send + Sync {
    fn check<'a>(&'a self, ctx: &'a GuardContext) -> GuardFuture<'a>;

    /// True for the coordination entry points installed by route wiring.
    fn is_coordinated(&self) -> bool {
        false
    }
}

/// Guard backed by an async closure.
pub struct FnGuard<F> {
    f: F,
}

impl<F, Fut> Guard for FnGuard<F>
where
    F: Fn(GuardContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<GuardResult, GuardError>> + Send + 'static,
{
    fn check<'a>(&'a self, ctx: &'a GuardContext) -> GuardFuture<'a> {
        Box::pin((self.f)(ctx.clone()))
    }
}

/// Wrap an async closure as a guard.
pub fn guard_fn<F, Fut>(f: F) -> Arc<dyn Guard>
where
    F: Fn(GuardContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<GuardResult, GuardError>> + Send + 'static,
{
    Arc::new(FnGuard { f })
}

/// A guard that always returns the same result.
pub fn fixed(result: GuardResult) -> Arc<dyn Guard> {
    guard_fn(move |_| {
        let result = result.clone();
        async move { Ok(result) }
    })
}

/// Run every guard in `guards` and wait for all of them.
///
/// The first guard error aborts the evaluation and is returned as-is.
pub async fn evaluate_all(
    guards: &[Arc<dyn Guard>],
    ctx: &GuardContext,
) -> Result<Vec<GuardResult>, GuardError> {
    try_join_all(guards.iter().map(|guard| guard.check(ctx))).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::route::RouteConfig;

    fn r(url: &str) -> GuardResult {
        GuardResult::redirect(url)
    }

    #[test]
    fn guard_result_deny_wins() {
        let results = vec![GuardResult::Allow, r("/login"), GuardResult::Deny];
        assert_eq!(combine_to_guard_result(results), GuardResult::Deny);
    }

    #[test]
    fn guard_result_first_redirect() {
        let results = vec![GuardResult::Allow, r("/a"), r("/b")];
        assert_eq!(combine_to_guard_result(results), r("/a"));
    }

    #[test]
    fn guard_result_allow() {
        assert_eq!(
            combine_to_guard_result(vec![GuardResult::Allow, GuardResult::Allow]),
            GuardResult::Allow
        );
        assert_eq!(combine_to_guard_result(Vec::new()), GuardResult::Allow);
    }

    #[test]
    fn boolean_redirect_is_denial() {
        assert!(!combine_to_boolean(vec![GuardResult::Allow, r("/login")]));
        assert!(!combine_to_boolean(vec![GuardResult::Deny]));
        assert!(combine_to_boolean(vec![GuardResult::Allow, GuardResult::Allow]));
        assert!(combine_to_boolean(Vec::new()));
    }

    #[test]
    fn combination_is_order_independent() {
        let a = vec![GuardResult::Allow, GuardResult::Deny, r("/x")];
        let mut b = a.clone();
        b.reverse();
        assert_eq!(combine_to_boolean(a.clone()), combine_to_boolean(b.clone()));
        assert_eq!(combine_to_guard_result(a), combine_to_guard_result(b));
    }

    #[test]
    fn redirect_wire_form() {
        let json = serde_json::to_value(r("/login")).unwrap();
        assert_eq!(json, serde_json::json!({ "type": "redirect", "to": "/login" }));
    }

    #[tokio::test]
    async fn evaluate_all_collects_in_order() {
        let route = RouteConfig::new("/orders/:id");
        let ctx = GuardContext {
            route: route.snapshot("/orders/1", Default::default()),
            target_url: "/orders/1".into(),
            state: NavigationState::unmarked(),
        };
        let guards = vec![fixed(GuardResult::Allow), fixed(GuardResult::Deny)];
        let results = evaluate_all(&guards, &ctx).await.unwrap();
        assert_eq!(results, vec![GuardResult::Allow, GuardResult::Deny]);
    }

    #[tokio::test]
    async fn evaluate_all_propagates_failure() {
        let route = RouteConfig::new("/orders");
        let ctx = GuardContext {
            route: route.snapshot("/orders", Default::default()),
            target_url: "/orders".into(),
            state: NavigationState::unmarked(),
        };
        let failing = guard_fn(|_| async { Err(GuardError::failed("session lookup failed")) });
        let guards = vec![fixed(GuardResult::Allow), failing];
        let err = evaluate_all(&guards, &ctx).await.unwrap_err();
        assert!(err.to_string().contains("session lookup failed"));
    }
}
