//! In-memory host page for concord participants.
//!
//! Provides what a browser shell would: one page-wide location, a router per
//! mounted application, and a scatter-gather bus between them. Used by the
//! `concord-sim` binary and the end-to-end protocol tests.

pub mod bus;
pub mod config;
pub mod document;
pub mod participant;
pub mod router;
pub mod sim;

pub use bus::{Bus, BusClient, RoundId};
pub use config::{ConfigError, HostConfig, ParticipantConfig, RouteSpec, StepConfig, Verdict};
pub use document::HostDocument;
pub use participant::Participant;
pub use router::{EventResult, NavigationError, NavigationEvent, Router};
pub use sim::{Simulation, StepReport};
