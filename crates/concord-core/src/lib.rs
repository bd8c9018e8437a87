//! Core types for cross-application route guard coordination.
//!
//! Several independently loaded applications share one host page, each with
//! its own router and its own guards. A navigation may only proceed if every
//! application's guards agree. This crate provides the protocol: the
//! navigation-state markers, the guard dispatcher installed on every route,
//! and the bookkeeping that lets each participant answer "check yourself"
//! requests from the others. The router and the scatter-gather transport are
//! supplied by the host through the [`Navigator`] and [`ScatterGather`] traits.

mod config;
mod dispatcher;
mod error;
mod gather;
mod guard;
mod navigator;
mod pending;
mod registry;
mod route;
mod state;
mod wiring;

pub use config::{CoordinationConfig, TimeoutPolicy};
pub use dispatcher::{GuardDispatcher, Phase};
pub use error::{GuardError, ProtocolError};
pub use gather::{
    ACTIVATION_CHANNEL, CheckHandler, CheckReply, CheckRequest, DEACTIVATION_CHANNEL, GatherError,
    GatherResponse, ScatterGather,
};
pub use guard::{
    FnGuard, Guard, GuardContext, GuardFuture, GuardResult, Redirect, combine_to_boolean,
    combine_to_guard_result, evaluate_all, fixed, guard_fn,
};
pub use navigator::{NavigateError, NavigateOptions, NavigationOutcome, Navigator};
pub use pending::{PendingChecks, TICKET_KEY, Ticket};
pub use registry::{GuardRegistry, RouteGuards};
pub use route::{Params, RouteConfig, RouteId, RouteSnapshot, RunGuards};
pub use state::{
    ACTIVATION_CHECK_KEY, DEACTIVATION_CHECK_KEY, NavigationMode, NavigationState,
    ROUTER_SYNC_KEY, StateError, classify,
};
pub use wiring::instrument_routes;
