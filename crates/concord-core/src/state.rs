//! Navigation state payload.
//!
//! Every navigation attempt carries a state object. The protocol marks its own
//! navigations with exactly one of three flags:
//!
//! - `isRouterSync` - the final, already-agreed navigation
//! - `activateGuardCheckRequest` - evaluate activation guards, report, don't navigate
//! - `deactivateGuardCheckRequest` - same for the currently active route
//!
//! A payload with none of them is an ordinary navigation started locally.
//! Everything else in the payload belongs to the application and is carried
//! through untouched.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;

pub const ROUTER_SYNC_KEY: &str = "isRouterSync";
pub const ACTIVATION_CHECK_KEY: &str = "activateGuardCheckRequest";
pub const DEACTIVATION_CHECK_KEY: &str = "deactivateGuardCheckRequest";

const MARKER_KEYS: [&str; 3] = [ROUTER_SYNC_KEY, ACTIVATION_CHECK_KEY, DEACTIVATION_CHECK_KEY];

/// Protocol phase a navigation belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum NavigationMode {
    /// Locally initiated; this participant must canvas everyone else.
    #[default]
    Unmarked,
    /// Agreement was already reached; execute the navigation.
    RouterSync,
    /// Evaluate activation guards for the target and report the verdict.
    ActivationCheckRequested,
    /// Evaluate deactivation guards for the active route and report the verdict.
    DeactivationCheckRequested,
}

impl NavigationMode {
    /// Payload key that carries this mode, if any.
    pub fn marker_key(self) -> Option<&'static str> {
        match self {
            NavigationMode::Unmarked => None,
            NavigationMode::RouterSync => Some(ROUTER_SYNC_KEY),
            NavigationMode::ActivationCheckRequested => Some(ACTIVATION_CHECK_KEY),
            NavigationMode::DeactivationCheckRequested => Some(DEACTIVATION_CHECK_KEY),
        }
    }

    /// Whether this is one of the "please check yourself" modes.
    pub fn is_check(self) -> bool {
        matches!(
            self,
            NavigationMode::ActivationCheckRequested | NavigationMode::DeactivationCheckRequested
        )
    }

    fn from_marker_key(key: &str) -> Option<Self> {
        match key {
            ROUTER_SYNC_KEY => Some(NavigationMode::RouterSync),
            ACTIVATION_CHECK_KEY => Some(NavigationMode::ActivationCheckRequested),
            DEACTIVATION_CHECK_KEY => Some(NavigationMode::DeactivationCheckRequested),
            _ => None,
        }
    }
}

impl fmt::Display for NavigationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NavigationMode::Unmarked => "unmarked",
            NavigationMode::RouterSync => "router-sync",
            NavigationMode::ActivationCheckRequested => "activation-check",
            NavigationMode::DeactivationCheckRequested => "deactivation-check",
        };
        f.write_str(name)
    }
}

/// State attached to a single navigation attempt.
///
/// The mode is held as a tag, so a value can never carry two markers at once.
/// Conflicting markers can only show up in a decoded payload and are rejected
/// there.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NavigationState {
    mode: NavigationMode,
    data: Map<String, Value>,
}

impl NavigationState {
    /// A plain, locally initiated navigation.
    pub fn unmarked() -> Self {
        Self::default()
    }

    pub fn router_sync() -> Self {
        Self::with_mode(NavigationMode::RouterSync)
    }

    pub fn activation_check() -> Self {
        Self::with_mode(NavigationMode::ActivationCheckRequested)
    }

    pub fn deactivation_check() -> Self {
        Self::with_mode(NavigationMode::DeactivationCheckRequested)
    }

    pub fn with_mode(mode: NavigationMode) -> Self {
        Self {
            mode,
            data: Map::new(),
        }
    }

    /// Attach application data. Marker keys are reserved and ignored here.
    pub fn with_data(mut self, key: impl Into<String>, value: Value) -> Self {
        let key = key.into();
        if MARKER_KEYS.contains(&key.as_str()) {
            tracing::warn!("ignoring reserved navigation state key {}", key);
            return self;
        }
        self.data.insert(key, value);
        self
    }

    pub fn mode(&self) -> NavigationMode {
        self.mode
    }

    /// Application data carried alongside the marker.
    pub fn data(&self) -> &Map<String, Value> {
        &self.data
    }

    /// The flat JSON object this state is attached to a navigation as.
    pub fn to_payload(&self) -> Map<String, Value> {
        let mut payload = self.data.clone();
        if let Some(key) = self.mode.marker_key() {
            payload.insert(key.to_string(), Value::Bool(true));
        }
        payload
    }

    /// Decode a payload. Missing or `false` markers are unset.
    pub fn from_payload(mut payload: Map<String, Value>) -> Result<Self, StateError> {
        let mut mode = NavigationMode::Unmarked;
        for key in MARKER_KEYS {
            let Some(value) = payload.remove(key) else {
                continue;
            };
            let set = match value {
                Value::Bool(b) => b,
                Value::Null => false,
                other => {
                    return Err(StateError::InvalidMarker {
                        key: key.to_string(),
                        value: other,
                    });
                }
            };
            if !set {
                continue;
            }
            if mode != NavigationMode::Unmarked {
                return Err(StateError::ConflictingMarkers);
            }
            mode = NavigationMode::from_marker_key(key).unwrap_or_default();
        }
        Ok(Self {
            mode,
            data: payload,
        })
    }
}

/// Which protocol phase a navigation state belongs to.
pub fn classify(state: &NavigationState) -> NavigationMode {
    state.mode()
}

impl Serialize for NavigationState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_payload().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for NavigationState {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let payload = Map::<String, Value>::deserialize(deserializer)?;
        Self::from_payload(payload).map_err(serde::de::Error::custom)
    }
}

/// Error decoding a navigation state payload.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StateError {
    #[error("navigation state carries more than one protocol marker")]
    ConflictingMarkers,
    #[error("protocol marker {key} must be a boolean, got: {value}")]
    InvalidMarker { key: String, value: Value },
}
