//! Route configuration and the snapshot guards are evaluated against.
//!
//! Path patterns use `/`-separated segments. A segment starting with `:`
//! captures a parameter; a trailing `**` matches any remainder.

use crate::guard::Guard;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_ROUTE_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a route configuration. Guards are registered under it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RouteId(u64);

impl RouteId {
    /// Allocate a fresh, process-unique identity.
    pub fn next() -> Self {
        Self(NEXT_ROUTE_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RouteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "route#{}", self.0)
    }
}

/// When guards re-run for a navigation that stays on the same route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunGuards {
    /// Only when the URL (and so the params) change.
    #[default]
    ParamsChange,
    /// On every navigation, including same-URL ones.
    Always,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
    Rest,
}

pub type Params = BTreeMap<String, String>;

/// A route declaration with its guards.
#[derive(Clone)]
pub struct RouteConfig {
    id: Option<RouteId>,
    path: String,
    segments: Vec<Segment>,
    can_activate: Vec<Arc<dyn Guard>>,
    can_deactivate: Vec<Arc<dyn Guard>>,
    run_guards: RunGuards,
}

impl RouteConfig {
    pub fn new(path: impl Into<String>) -> Self {
        let mut route = Self::without_identity(path);
        route.id = Some(RouteId::next());
        route
    }

    /// A route that cannot be keyed in a guard registry.
    pub fn without_identity(path: impl Into<String>) -> Self {
        let path = path.into();
        let segments = parse_pattern(&path);
        Self {
            id: None,
            path,
            segments,
            can_activate: Vec::new(),
            can_deactivate: Vec::new(),
            run_guards: RunGuards::default(),
        }
    }

    pub fn with_activation_guard(mut self, guard: Arc<dyn Guard>) -> Self {
        self.can_activate.push(guard);
        self
    }

    pub fn with_deactivation_guard(mut self, guard: Arc<dyn Guard>) -> Self {
        self.can_deactivate.push(guard);
        self
    }

    pub fn with_run_guards(mut self, run_guards: RunGuards) -> Self {
        self.run_guards = run_guards;
        self
    }

    pub fn id(&self) -> Option<RouteId> {
        self.id
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn run_guards(&self) -> RunGuards {
        self.run_guards
    }

    pub fn activation_guards(&self) -> &[Arc<dyn Guard>] {
        &self.can_activate
    }

    pub fn deactivation_guards(&self) -> &[Arc<dyn Guard>] {
        &self.can_deactivate
    }

    pub(crate) fn set_guards(
        &mut self,
        can_activate: Vec<Arc<dyn Guard>>,
        can_deactivate: Vec<Arc<dyn Guard>>,
    ) {
        self.can_activate = can_activate;
        self.can_deactivate = can_deactivate;
    }

    /// Match `url` against this route's pattern, returning captured params.
    pub fn match_url(&self, url: &str) -> Option<Params> {
        let parts: Vec<&str> = url_path(url).split('/').filter(|s| !s.is_empty()).collect();
        let mut params = Params::new();

        for (i, segment) in self.segments.iter().enumerate() {
            match segment {
                Segment::Rest => {
                    params.insert("**".to_string(), parts[i.min(parts.len())..].join("/"));
                    return Some(params);
                }
                Segment::Literal(lit) => {
                    if parts.get(i) != Some(&lit.as_str()) {
                        return None;
                    }
                }
                Segment::Param(name) => {
                    let value = parts.get(i)?;
                    params.insert(name.clone(), (*value).to_string());
                }
            }
        }

        (parts.len() == self.segments.len()).then_some(params)
    }

    pub fn snapshot(&self, url: impl Into<String>, params: Params) -> RouteSnapshot {
        RouteSnapshot {
            route_id: self.id,
            path: self.path.clone(),
            url: url.into(),
            params,
        }
    }
}

impl fmt::Debug for RouteConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteConfig")
            .field("id", &self.id)
            .field("path", &self.path)
            .field("can_activate", &self.can_activate.len())
            .field("can_deactivate", &self.can_deactivate.len())
            .field("run_guards", &self.run_guards)
            .finish()
    }
}

/// The route a guard is asked about, as matched for one navigation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteSnapshot {
    pub route_id: Option<RouteId>,
    pub path: String,
    pub url: String,
    #[serde(default)]
    pub params: Params,
}

fn parse_pattern(path: &str) -> Vec<Segment> {
    path.split('/')
        .filter(|s| !s.is_empty())
        .map(|s| {
            if s == "**" {
                Segment::Rest
            } else if let Some(name) = s.strip_prefix(':') {
                Segment::Param(name.to_string())
            } else {
                Segment::Literal(s.to_string())
            }
        })
        .collect()
}

/// The path part of a URL, without query or fragment.
fn url_path(url: &str) -> &str {
    let end = url.find(['?', '#']).unwrap_or(url.len());
    &url[..end]
}
