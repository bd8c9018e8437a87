//! The host page shared by all participants.
//!
//! Owns the single page-wide location. When a participant commits a
//! navigation it started itself, the document replays it to every other
//! mounted router as an already-agreed `RouterSync` navigation.

use crate::router::Router;
use concord_core::{NavigateOptions, NavigationState};
use futures_util::future::join_all;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock, Weak};

#[derive(Default)]
struct DocumentState {
    location: Option<String>,
    history: Vec<String>,
    routers: BTreeMap<String, Weak<Router>>,
}

#[derive(Default)]
pub struct HostDocument {
    inner: RwLock<DocumentState>,
}

impl HostDocument {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn mount(&self, router: &Arc<Router>) {
        let mut s = self.write();
        if s
            .routers
            .insert(router.participant().to_string(), Arc::downgrade(router))
            .is_some()
        {
            tracing::warn!("{} was already mounted, replacing its router", router.participant());
        }
        tracing::info!("mounted {}", router.participant());
    }

    pub fn unmount(&self, participant: &str) -> bool {
        let removed = self.write().routers.remove(participant).is_some();
        if removed {
            tracing::info!("unmounted {}", participant);
        }
        removed
    }

    pub fn router(&self, participant: &str) -> Option<Arc<Router>> {
        self.read().routers.get(participant).and_then(Weak::upgrade)
    }

    pub fn participants(&self) -> Vec<String> {
        self.read().routers.keys().cloned().collect()
    }

    /// The page-wide URL.
    pub fn location(&self) -> Option<String> {
        self.read().location.clone()
    }

    pub fn history(&self) -> Vec<String> {
        self.read().history.clone()
    }

    /// Record an agreed navigation and bring every other router along.
    pub(crate) async fn publish(&self, from: &str, url: &str) {
        let others: Vec<Arc<Router>> = {
            let mut s = self.write();
            s.location = Some(url.to_string());
            s.history.push(url.to_string());
            s.routers
                .iter()
                .filter(|(name, _)| name.as_str() != from)
                .filter_map(|(_, router)| router.upgrade())
                .collect()
        };

        tracing::debug!("{} committed {}, syncing {} other routers", from, url, others.len());
        let syncs = others.iter().map(|router| {
            router.navigate(
                url,
                NavigateOptions::with_state(NavigationState::router_sync()),
            )
        });

        for (router, result) in others.iter().zip(join_all(syncs).await) {
            if let Err(e) = result {
                tracing::warn!("{} could not follow to {}: {}", router.participant(), url, e);
            }
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, DocumentState> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, DocumentState> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }
}
