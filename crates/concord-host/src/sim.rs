//! Run a [`HostConfig`] against an in-process page.

use crate::bus::Bus;
use crate::config::HostConfig;
use crate::document::HostDocument;
use crate::participant::Participant;
use concord_core::{NavigationOutcome, ProtocolError};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

/// What one navigation step did to the page.
#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    pub participant: String,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<NavigationOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Page-wide URL after the step.
    pub location: Option<String>,
    /// Each participant's router URL after the step.
    pub routers: BTreeMap<String, Option<String>>,
}

pub struct Simulation {
    document: Arc<HostDocument>,
    bus: Arc<Bus>,
    participants: BTreeMap<String, Participant>,
}

impl Simulation {
    /// Mount every configured participant on a fresh page.
    pub fn new(config: &HostConfig) -> Result<Self, ProtocolError> {
        let document = HostDocument::new();
        let bus = Bus::new();
        let coordination = config.coordination.to_config();

        let mut participants = BTreeMap::new();
        for p in &config.participants {
            let routes = p.routes.iter().map(|r| r.to_route()).collect();
            let participant =
                Participant::mount(&p.name, &document, &bus, routes, coordination.clone())?;
            participants.insert(p.name.clone(), participant);
        }

        Ok(Self {
            document,
            bus,
            participants,
        })
    }

    pub fn document(&self) -> &Arc<HostDocument> {
        &self.document
    }

    pub fn bus(&self) -> &Arc<Bus> {
        &self.bus
    }

    pub fn participant(&self, name: &str) -> Option<&Participant> {
        self.participants.get(name)
    }

    /// Navigate `url` from `participant` and report where everyone ended up.
    pub async fn step(&self, participant: &str, url: &str) -> StepReport {
        let (outcome, error) = match self.participants.get(participant) {
            Some(p) => match p.navigate(url).await {
                Ok(outcome) => (Some(outcome), None),
                Err(e) => {
                    tracing::warn!("{} failed to navigate to {}: {}", participant, url, e);
                    (None, Some(e.to_string()))
                }
            },
            None => (None, Some(format!("unknown participant {participant}"))),
        };

        StepReport {
            participant: participant.to_string(),
            url: url.to_string(),
            outcome,
            error,
            location: self.document.location(),
            routers: self
                .participants
                .iter()
                .map(|(name, p)| (name.clone(), p.router().current_url()))
                .collect(),
        }
    }

    /// Run the configured steps in order.
    pub async fn run(&self, config: &HostConfig) -> Vec<StepReport> {
        let mut reports = Vec::with_capacity(config.steps.len());
        for step in &config.steps {
            reports.push(self.step(&step.participant, &step.url).await);
        }
        reports
    }
}
