//! Per-participant router.
//!
//! Runs deactivation guards of the active route, matches the URL against its
//! route table, runs activation guards of the target, and commits. Guards are
//! opaque to the router; after instrumentation they are the dispatcher's
//! entry points.
//!
//! A router with no active route stands on a vacant route that carries the
//! table's coordinated deactivation entry, so it still takes part in
//! deactivation rounds. A navigation marked by another participant may name a
//! URL this router has no route for: checks then end `Unrouted`, and a sync
//! leaves the active route and follows the page to the URL.

use crate::document::HostDocument;
use concord_core::{
    Guard, GuardContext, GuardError, GuardResult, NavigateError, NavigateOptions, NavigationMode,
    NavigationOutcome, NavigationState, Navigator, Params, RouteConfig, RouteSnapshot, RunGuards,
};
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use serde::Serialize;
use std::sync::{Arc, Mutex, RwLock, Weak};

/// Redirect hops allowed before a navigation is abandoned.
const MAX_REDIRECTS: usize = 8;

#[derive(Debug, thiserror::Error)]
pub enum NavigationError {
    #[error("no route matches {url}")]
    NoMatch { url: String },
    #[error("too many redirects starting at {url}")]
    RedirectLoop { url: String },
    #[error(transparent)]
    Guard(#[from] GuardError),
}

/// One navigation attempt as the router saw it.
#[derive(Debug, Clone, Serialize)]
pub struct NavigationEvent {
    pub url: String,
    pub state: NavigationState,
    #[serde(flatten)]
    pub result: EventResult,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum EventResult {
    Finished(NavigationOutcome),
    Failed { error: String },
}

impl NavigationEvent {
    pub fn mode(&self) -> NavigationMode {
        self.state.mode()
    }
}

#[derive(Clone)]
struct ActiveRoute {
    route: RouteConfig,
    snapshot: RouteSnapshot,
}

#[derive(Default)]
struct RouterState {
    current_url: Option<String>,
    active: Option<ActiveRoute>,
    navigating: Option<NavigationState>,
    events: Vec<NavigationEvent>,
}

struct RouteTable {
    routes: Vec<RouteConfig>,
    vacant: RouteConfig,
}

impl RouteTable {
    fn new(routes: Vec<RouteConfig>) -> Self {
        let entry = routes
            .iter()
            .flat_map(|r| r.deactivation_guards())
            .find(|g| g.is_coordinated())
            .cloned();
        let vacant = match entry {
            Some(entry) => RouteConfig::new("").with_deactivation_guard(entry),
            None => RouteConfig::new(""),
        };
        Self { routes, vacant }
    }
}

enum Attempt {
    Done(NavigationOutcome),
    Redirect(String),
}

pub struct Router {
    me: Weak<Router>,
    participant: String,
    document: Arc<HostDocument>,
    routes: RwLock<RouteTable>,
    state: Mutex<RouterState>,
}

impl Router {
    pub fn new(participant: impl Into<String>, document: Arc<HostDocument>) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            participant: participant.into(),
            document,
            routes: RwLock::new(RouteTable::new(Vec::new())),
            state: Mutex::new(RouterState::default()),
        })
    }

    pub fn participant(&self) -> &str {
        &self.participant
    }

    /// Replace the route table.
    pub fn reset_config(&self, routes: Vec<RouteConfig>) {
        *self.routes.write().unwrap_or_else(|e| e.into_inner()) = RouteTable::new(routes);
    }

    pub fn current_url(&self) -> Option<String> {
        self.lock().current_url.clone()
    }

    pub fn active_route(&self) -> Option<RouteSnapshot> {
        self.lock().active.as_ref().map(|a| a.snapshot.clone())
    }

    /// Every navigation attempt so far, oldest first.
    pub fn events(&self) -> Vec<NavigationEvent> {
        self.lock().events.clone()
    }

    /// Navigate and wait until guards have decided.
    pub fn navigate(
        self: &Arc<Self>,
        url: impl Into<String>,
        options: NavigateOptions,
    ) -> BoxFuture<'static, Result<NavigationOutcome, NavigationError>> {
        let router = self.clone();
        let url = url.into();
        async move {
            let state = options.state.clone();
            let result = router.run(&url, options).await;

            let mut s = router.lock();
            s.navigating = None;
            s.events.push(NavigationEvent {
                url,
                state,
                result: match &result {
                    Ok(outcome) => EventResult::Finished(outcome.clone()),
                    Err(e) => EventResult::Failed {
                        error: e.to_string(),
                    },
                },
            });
            drop(s);
            result
        }
        .boxed()
    }

    async fn run(
        self: &Arc<Self>,
        url: &str,
        options: NavigateOptions,
    ) -> Result<NavigationOutcome, NavigationError> {
        let mut target = url.to_string();
        let mut options = options;

        for _ in 0..=MAX_REDIRECTS {
            match self.attempt(&target, &options).await? {
                Attempt::Done(NavigationOutcome::Committed { url: to }) if to != url => {
                    return Ok(NavigationOutcome::Redirected {
                        from: url.to_string(),
                        to,
                    });
                }
                Attempt::Done(outcome) => return Ok(outcome),
                Attempt::Redirect(to) => {
                    tracing::debug!("{}: {} redirected to {}", self.participant, target, to);
                    target = to;
                    options = NavigateOptions::with_state(NavigationState::unmarked());
                }
            }
        }

        Err(NavigationError::RedirectLoop {
            url: url.to_string(),
        })
    }

    async fn attempt(
        self: &Arc<Self>,
        url: &str,
        options: &NavigateOptions,
    ) -> Result<Attempt, NavigationError> {
        let (current_url, active) = {
            let s = self.lock();
            (s.current_url.clone(), s.active.clone())
        };
        let same_url = current_url.as_deref() == Some(url);
        if same_url && !options.force_even_if_same_url {
            return Ok(Attempt::Done(NavigationOutcome::Skipped {
                url: url.to_string(),
            }));
        }

        let mode = options.state.mode();
        let target = self.match_route(url);
        if target.is_none() && mode == NavigationMode::Unmarked {
            return Err(NavigationError::NoMatch {
                url: url.to_string(),
            });
        }
        self.lock().navigating = Some(options.state.clone());

        let run_guards = !same_url
            || target
                .as_ref()
                .is_none_or(|(route, _)| route.run_guards() == RunGuards::Always);

        if run_guards {
            let (leaving, from) = match active {
                Some(active) => (active.route, active.snapshot),
                None => {
                    let vacant = self.vacant();
                    let from = vacant.snapshot(current_url.unwrap_or_default(), Params::new());
                    (vacant, from)
                }
            };
            let ctx = GuardContext {
                route: from,
                target_url: url.to_string(),
                state: options.state.clone(),
            };
            if let Some(stop) = self.run_guards(leaving.deactivation_guards(), &ctx).await? {
                return Ok(stop);
            }
        }

        let Some((route, params)) = target else {
            return Ok(Attempt::Done(self.unrouted(url, mode)));
        };
        let snapshot = route.snapshot(url, params);

        if run_guards {
            let ctx = GuardContext {
                route: snapshot.clone(),
                target_url: url.to_string(),
                state: options.state.clone(),
            };
            if let Some(stop) = self.run_guards(route.activation_guards(), &ctx).await? {
                return Ok(stop);
            }
        }

        {
            let mut s = self.lock();
            s.current_url = Some(url.to_string());
            s.active = Some(ActiveRoute { route, snapshot });
        }
        tracing::info!("{}: navigated to {} ({})", self.participant, url, mode);

        if mode == NavigationMode::Unmarked {
            self.document.publish(&self.participant, url).await;
        }
        Ok(Attempt::Done(NavigationOutcome::Committed {
            url: url.to_string(),
        }))
    }

    /// A marked navigation to a URL no route here matches.
    fn unrouted(&self, url: &str, mode: NavigationMode) -> NavigationOutcome {
        if mode == NavigationMode::RouterSync {
            let mut s = self.lock();
            s.current_url = Some(url.to_string());
            s.active = None;
            tracing::info!("{}: no route for {}, left active route", self.participant, url);
        } else {
            tracing::debug!("{}: no route for {} ({})", self.participant, url, mode);
        }
        NavigationOutcome::Unrouted {
            url: url.to_string(),
        }
    }

    /// Run guards in order; the first non-allow result ends the navigation.
    async fn run_guards(
        &self,
        guards: &[Arc<dyn Guard>],
        ctx: &GuardContext,
    ) -> Result<Option<Attempt>, NavigationError> {
        for guard in guards {
            match guard.check(ctx).await? {
                GuardResult::Allow => {}
                GuardResult::Deny => {
                    tracing::debug!(
                        "{}: navigation to {} cancelled ({})",
                        self.participant,
                        ctx.target_url,
                        ctx.state.mode()
                    );
                    return Ok(Some(Attempt::Done(NavigationOutcome::Cancelled {
                        url: ctx.target_url.clone(),
                    })));
                }
                GuardResult::Redirect(to) => return Ok(Some(Attempt::Redirect(to.url().to_string()))),
            }
        }
        Ok(None)
    }

    fn match_route(&self, url: &str) -> Option<(RouteConfig, Params)> {
        let table = self.routes.read().unwrap_or_else(|e| e.into_inner());
        table
            .routes
            .iter()
            .find_map(|route| route.match_url(url).map(|params| (route.clone(), params)))
    }

    fn vacant(&self) -> RouteConfig {
        self.routes
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .vacant
            .clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RouterState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Navigator for Router {
    fn current_navigation_state(&self) -> Option<NavigationState> {
        self.lock().navigating.clone()
    }

    fn navigate_to(
        &self,
        url: &str,
        options: NavigateOptions,
    ) -> BoxFuture<'static, Result<NavigationOutcome, NavigateError>> {
        let router = self.me.upgrade();
        let url = url.to_string();
        async move {
            let router = router.ok_or_else(|| NavigateError("router dropped".into()))?;
            router
                .navigate(url, options)
                .await
                .map_err(|e| NavigateError(e.to_string()))
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use concord_core::{fixed, guard_fn};
    use std::sync::OnceLock;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn mounted(routes: Vec<RouteConfig>) -> Arc<Router> {
        let document = HostDocument::new();
        let router = Router::new("solo", document.clone());
        router.reset_config(routes);
        document.mount(&router);
        router
    }

    fn plain() -> NavigateOptions {
        NavigateOptions::default()
    }

    #[tokio::test]
    async fn commits_and_skips_same_url() {
        let router = mounted(vec![RouteConfig::new("/orders/:id")]);

        let outcome = router.navigate("/orders/1", plain()).await.unwrap();
        assert_eq!(outcome, NavigationOutcome::Committed { url: "/orders/1".into() });
        assert_eq!(router.current_url().as_deref(), Some("/orders/1"));
        assert_eq!(
            router.active_route().unwrap().params.get("id").map(String::as_str),
            Some("1")
        );

        let outcome = router.navigate("/orders/1", plain()).await.unwrap();
        assert!(matches!(outcome, NavigationOutcome::Skipped { .. }));
    }

    #[tokio::test]
    async fn unmatched_url_is_an_error() {
        let router = mounted(vec![RouteConfig::new("/orders")]);
        let err = router.navigate("/nowhere", plain()).await.unwrap_err();
        assert!(matches!(err, NavigationError::NoMatch { .. }));
        assert!(router.current_url().is_none());
        assert_eq!(router.events().len(), 1);
    }

    #[tokio::test]
    async fn unmatched_url_through_navigator_is_unrouted() {
        let router = mounted(vec![RouteConfig::new("/orders")]);
        let navigator: Arc<dyn Navigator> = router.clone();
        let outcome = navigator
            .navigate_to("/nowhere", NavigateOptions::forced(NavigationState::activation_check()))
            .await
            .unwrap();
        assert_eq!(outcome, NavigationOutcome::Unrouted { url: "/nowhere".into() });
    }

    #[tokio::test]
    async fn deactivation_check_asks_active_route_before_matching() {
        let router = mounted(vec![
            RouteConfig::new("/edit/:doc").with_deactivation_guard(fixed(GuardResult::Deny)),
        ]);
        router.navigate("/edit/1", plain()).await.unwrap();

        let outcome = router
            .navigate(
                "/home",
                NavigateOptions::forced(NavigationState::deactivation_check()),
            )
            .await
            .unwrap();
        assert_eq!(outcome, NavigationOutcome::Cancelled { url: "/home".into() });
        assert_eq!(router.current_url().as_deref(), Some("/edit/1"));
    }

    #[tokio::test]
    async fn sync_to_unmatched_url_leaves_active_route() {
        let router = mounted(vec![RouteConfig::new("/edit/:doc")]);
        router.navigate("/edit/1", plain()).await.unwrap();

        let outcome = router
            .navigate("/home", NavigateOptions::with_state(NavigationState::router_sync()))
            .await
            .unwrap();
        assert_eq!(outcome, NavigationOutcome::Unrouted { url: "/home".into() });
        assert_eq!(router.current_url().as_deref(), Some("/home"));
        assert!(router.active_route().is_none());
    }

    #[tokio::test]
    async fn navigation_state_visible_while_guards_run() {
        let seen = Arc::new(Mutex::new(None));
        let handle: Arc<OnceLock<Weak<Router>>> = Arc::new(OnceLock::new());
        let (record, lookup) = (seen.clone(), handle.clone());
        let router = mounted(vec![RouteConfig::new("/x").with_activation_guard(guard_fn(
            move |_| {
                let state = lookup
                    .get()
                    .and_then(Weak::upgrade)
                    .and_then(|r| r.current_navigation_state());
                *record.lock().unwrap() = state;
                async { Ok(GuardResult::Allow) }
            },
        ))]);
        handle.set(Arc::downgrade(&router)).unwrap();

        router
            .navigate("/x", NavigateOptions::with_state(NavigationState::router_sync()))
            .await
            .unwrap();
        let state = seen.lock().unwrap().clone().unwrap();
        assert_eq!(state.mode(), NavigationMode::RouterSync);
        assert!(router.current_navigation_state().is_none());
    }

    #[tokio::test]
    async fn deny_cancels() {
        let router = mounted(vec![
            RouteConfig::new("/a"),
            RouteConfig::new("/b").with_activation_guard(fixed(GuardResult::Deny)),
        ]);
        router.navigate("/a", plain()).await.unwrap();

        let outcome = router.navigate("/b", plain()).await.unwrap();
        assert_eq!(outcome, NavigationOutcome::Cancelled { url: "/b".into() });
        assert_eq!(router.current_url().as_deref(), Some("/a"));
    }

    #[tokio::test]
    async fn deactivation_runs_before_activation() {
        let activated = Arc::new(AtomicUsize::new(0));
        let counter = activated.clone();
        let router = mounted(vec![
            RouteConfig::new("/editor").with_deactivation_guard(fixed(GuardResult::Deny)),
            RouteConfig::new("/home").with_activation_guard(guard_fn(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Ok(GuardResult::Allow) }
            })),
        ]);
        router.navigate("/editor", plain()).await.unwrap();

        let outcome = router.navigate("/home", plain()).await.unwrap();
        assert!(matches!(outcome, NavigationOutcome::Cancelled { .. }));
        assert_eq!(activated.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn redirect_is_followed() {
        let router = mounted(vec![
            RouteConfig::new("/login"),
            RouteConfig::new("/account").with_activation_guard(fixed(GuardResult::redirect("/login"))),
        ]);

        let outcome = router.navigate("/account", plain()).await.unwrap();
        assert_eq!(
            outcome,
            NavigationOutcome::Redirected {
                from: "/account".into(),
                to: "/login".into()
            }
        );
        assert_eq!(router.current_url().as_deref(), Some("/login"));
    }

    #[tokio::test]
    async fn redirect_loop_is_bounded() {
        let router = mounted(vec![
            RouteConfig::new("/a").with_activation_guard(fixed(GuardResult::redirect("/b"))),
            RouteConfig::new("/b").with_activation_guard(fixed(GuardResult::redirect("/a"))),
        ]);

        let err = router.navigate("/a", plain()).await.unwrap_err();
        assert!(matches!(err, NavigationError::RedirectLoop { .. }));
    }

    #[tokio::test]
    async fn forced_same_url_reruns_guards_only_when_always() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let counting = guard_fn(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Ok(GuardResult::Allow) }
        });
        let router = mounted(vec![
            RouteConfig::new("/lazy").with_activation_guard(counting.clone()),
            RouteConfig::new("/eager")
                .with_activation_guard(counting)
                .with_run_guards(RunGuards::Always),
        ]);

        router.navigate("/lazy", plain()).await.unwrap();
        router
            .navigate("/lazy", NavigateOptions::forced(NavigationState::unmarked()))
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        router.navigate("/eager", plain()).await.unwrap();
        router
            .navigate("/eager", NavigateOptions::forced(NavigationState::unmarked()))
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn guard_failure_fails_navigation() {
        let router = mounted(vec![RouteConfig::new("/x").with_activation_guard(guard_fn(|_| async {
            Err(GuardError::failed("backend down"))
        }))]);

        let err = router.navigate("/x", plain()).await.unwrap_err();
        assert!(matches!(err, NavigationError::Guard(_)));
        assert!(router.current_url().is_none());
    }
}
