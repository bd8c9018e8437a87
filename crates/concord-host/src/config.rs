//! TOML description of a host page: participants, their routes, and the
//! navigations to run.
//!
//! ```toml
//! [coordination]
//! gather_timeout_ms = 2000
//! on_timeout = "deny"
//!
//! [[participant]]
//! name = "orders"
//!
//! [[participant.route]]
//! path = "/orders/:id"
//! can_activate = ["allow"]
//! can_deactivate = ["deny"]
//!
//! [[step]]
//! participant = "shell"
//! url = "/orders/42"
//! ```

use concord_core::{CoordinationConfig, GuardResult, RouteConfig, RunGuards, TimeoutPolicy, fixed};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct HostConfig {
    #[serde(default)]
    pub coordination: CoordinationSection,
    #[serde(default, rename = "participant")]
    pub participants: Vec<ParticipantConfig>,
    #[serde(default, rename = "step")]
    pub steps: Vec<StepConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CoordinationSection {
    /// Omit to wait for every reply indefinitely.
    pub gather_timeout_ms: Option<u64>,
    #[serde(default)]
    pub on_timeout: TimeoutPolicy,
}

impl CoordinationSection {
    pub fn to_config(&self) -> CoordinationConfig {
        CoordinationConfig {
            gather_timeout: self.gather_timeout_ms.map(Duration::from_millis),
            on_timeout: self.on_timeout,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ParticipantConfig {
    pub name: String,
    #[serde(default, rename = "route")]
    pub routes: Vec<RouteSpec>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RouteSpec {
    pub path: String,
    #[serde(default)]
    pub can_activate: Vec<Verdict>,
    #[serde(default)]
    pub can_deactivate: Vec<Verdict>,
    #[serde(default)]
    pub run_guards: RunGuards,
}

impl RouteSpec {
    /// Build the route, with one fixed guard per declared verdict.
    pub fn to_route(&self) -> RouteConfig {
        let route = RouteConfig::new(&self.path).with_run_guards(self.run_guards);
        let route = self
            .can_activate
            .iter()
            .fold(route, |r, v| r.with_activation_guard(fixed(v.0.clone())));
        self.can_deactivate
            .iter()
            .fold(route, |r, v| r.with_deactivation_guard(fixed(v.0.clone())))
    }
}

/// A declarative guard: `allow`, `deny`, or `redirect:/path`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub struct Verdict(pub GuardResult);

impl FromStr for Verdict {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "allow" => Ok(Verdict(GuardResult::Allow)),
            "deny" => Ok(Verdict(GuardResult::Deny)),
            _ => match s.strip_prefix("redirect:") {
                Some(url) if !url.is_empty() => Ok(Verdict(GuardResult::redirect(url))),
                _ => Err(ConfigError::Invalid(format!(
                    "guard verdict must be allow, deny or redirect:<url>, got: {s}"
                ))),
            },
        }
    }
}

impl TryFrom<String> for Verdict {
    type Error = ConfigError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StepConfig {
    pub participant: String,
    pub url: String,
}

impl HostConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        text.parse()
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let mut names = HashSet::new();
        for p in &self.participants {
            if !names.insert(p.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "participant {} declared twice",
                    p.name
                )));
            }
        }
        for step in &self.steps {
            if !names.contains(step.participant.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "step navigates unknown participant {}",
                    step.participant
                )));
            }
        }
        Ok(())
    }
}

impl FromStr for HostConfig {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let config: HostConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("{0}")]
    Invalid(String),
}
