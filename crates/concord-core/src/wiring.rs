//! Route instrumentation run once at application startup.
//!
//! Every route ends up with the dispatcher's two entry points as its only
//! guards, and its own guards move into the dispatcher's registry.

use crate::dispatcher::GuardDispatcher;
use crate::error::ProtocolError;
use crate::guard::Guard;
use crate::registry::RouteGuards;
use crate::route::{RouteConfig, RunGuards};
use std::sync::Arc;

/// Instrument `routes` for coordinated guard evaluation.
///
/// Routes that declare no guards are instrumented as well, so a check
/// navigation landing on them still reaches a dispatcher and gets answered.
/// Routes without a configuration identity cannot key the registry; their
/// own guards are dropped with a warning and they coordinate as unguarded.
/// Running this twice over the same routes is harmless: entry points already
/// installed are recognised and guards are merged into existing entries.
pub fn instrument_routes(
    dispatcher: &Arc<GuardDispatcher>,
    routes: Vec<RouteConfig>,
) -> Result<Vec<RouteConfig>, ProtocolError> {
    let registry = dispatcher.registry()?;

    let routes = routes
        .into_iter()
        .map(|mut route| {
            let guards = RouteGuards {
                activation: own_guards(route.activation_guards()),
                deactivation: own_guards(route.deactivation_guards()),
            };
            match route.id() {
                Some(id) => registry.register(id, guards),
                None if guards.is_empty() => {}
                None => tracing::warn!(
                    "{}: route {} has no configuration identity, dropping its {} guards",
                    dispatcher.participant(),
                    route.path(),
                    guards.activation.len() + guards.deactivation.len()
                ),
            }
            route.set_guards(
                vec![dispatcher.activation_entry()],
                vec![dispatcher.deactivation_entry()],
            );
            // Check navigations can target the URL a router is already on.
            route.with_run_guards(RunGuards::Always)
        })
        .collect();
    Ok(routes)
}

fn own_guards(guards: &[Arc<dyn Guard>]) -> Vec<Arc<dyn Guard>> {
    guards
        .iter()
        .filter(|g| !g.is_coordinated())
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CoordinationConfig;
    use crate::gather::{CheckHandler, CheckRequest, GatherError, GatherResponse, ScatterGather};
    use crate::guard::{GuardResult, fixed};
    use crate::navigator::{NavigateError, NavigateOptions, NavigationOutcome, Navigator};
    use crate::state::NavigationState;
    use futures_util::future::BoxFuture;
    use std::sync::Weak;

    struct NoPeers;

    impl ScatterGather for NoPeers {
        fn participant(&self) -> &str {
            "solo"
        }

        fn register_handler(&self, _: &str, _: CheckHandler) {}

        fn gather(
            &self,
            _: &str,
            _: CheckRequest,
        ) -> BoxFuture<'_, Result<GatherResponse, GatherError>> {
            Box::pin(async { Ok(GatherResponse::default()) })
        }

        fn destroy(&self, _: &str) {}
    }

    struct NoRouter;

    impl Navigator for NoRouter {
        fn current_navigation_state(&self) -> Option<NavigationState> {
            None
        }

        fn navigate_to(
            &self,
            _: &str,
            _: NavigateOptions,
        ) -> BoxFuture<'static, Result<NavigationOutcome, NavigateError>> {
            Box::pin(async { Err(NavigateError("no router".into())) })
        }
    }

    fn dispatcher() -> Arc<GuardDispatcher> {
        let dispatcher = GuardDispatcher::new("solo", CoordinationConfig::default());
        dispatcher
            .activate(Arc::new(NoPeers), Weak::<NoRouter>::new())
            .unwrap();
        dispatcher
    }

    #[test]
    fn requires_activation() {
        let dispatcher = GuardDispatcher::new("solo", CoordinationConfig::default());
        let err = instrument_routes(&dispatcher, vec![RouteConfig::new("/a")]).unwrap_err();
        assert!(matches!(err, ProtocolError::NotActivated { .. }));
    }

    #[test]
    fn moves_guards_into_registry() {
        let dispatcher = dispatcher();
        let route = RouteConfig::new("/orders/:id")
            .with_activation_guard(fixed(GuardResult::Allow))
            .with_activation_guard(fixed(GuardResult::Deny))
            .with_deactivation_guard(fixed(GuardResult::Allow));
        let id = route.id().unwrap();

        let routes = instrument_routes(&dispatcher, vec![route]).unwrap();
        let route = &routes[0];

        assert_eq!(route.activation_guards().len(), 1);
        assert!(route.activation_guards()[0].is_coordinated());
        assert_eq!(route.deactivation_guards().len(), 1);
        assert!(route.deactivation_guards()[0].is_coordinated());
        assert_eq!(route.run_guards(), RunGuards::Always);

        let registry = dispatcher.registry().unwrap();
        assert_eq!(registry.activation_guards(id).len(), 2);
        assert_eq!(registry.deactivation_guards(id).len(), 1);
    }

    #[test]
    fn unguarded_routes_are_instrumented() {
        let dispatcher = dispatcher();
        let route = RouteConfig::new("/about");
        let id = route.id().unwrap();

        let routes = instrument_routes(&dispatcher, vec![route]).unwrap();
        assert!(routes[0].activation_guards()[0].is_coordinated());
        assert!(dispatcher.registry().unwrap().contains(id));
    }

    #[test]
    fn repeated_instrumentation_merges() {
        let dispatcher = dispatcher();
        let route = RouteConfig::new("/cart").with_activation_guard(fixed(GuardResult::Allow));
        let id = route.id().unwrap();

        let routes = instrument_routes(&dispatcher, vec![route]).unwrap();
        let again = routes[0]
            .clone()
            .with_activation_guard(fixed(GuardResult::Deny));
        let routes = instrument_routes(&dispatcher, vec![again]).unwrap();

        assert_eq!(routes[0].activation_guards().len(), 1);
        assert_eq!(dispatcher.registry().unwrap().activation_guards(id).len(), 2);
    }

    #[test]
    fn route_without_identity_still_coordinates() {
        let dispatcher = dispatcher();
        let route = RouteConfig::without_identity("/legacy").with_activation_guard(fixed(GuardResult::Deny));

        let routes = instrument_routes(&dispatcher, vec![route]).unwrap();
        let route = &routes[0];
        assert_eq!(route.activation_guards().len(), 1);
        assert!(route.activation_guards()[0].is_coordinated());
        assert!(route.deactivation_guards()[0].is_coordinated());
        assert_eq!(route.run_guards(), RunGuards::Always);
        assert!(dispatcher.registry().unwrap().is_empty());
    }
}
