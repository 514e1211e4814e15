//! Generic `Presence` trait: the host's live-component enumeration.
//!
//! The kernel never trusts its own registry to decide whether a component
//! still physically exists.  It asks a [`Presence`] implementation, which in
//! production is maintained by whoever spawns and stops components.

use std::collections::HashSet;
use std::sync::{Arc, RwLock};

/// Answers "does a component with this presence id exist right now?".
pub trait Presence: Send + Sync {
    fn is_present(&self, presence_id: &str) -> bool;
}

/// A presence set shared between the kernel and the component host.
///
/// Clones share the same underlying set.
#[derive(Clone, Debug, Default)]
pub struct SharedPresence {
    live: Arc<RwLock<HashSet<String>>>,
}

impl SharedPresence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `presence_id` as live.
    pub fn insert(&self, presence_id: impl Into<String>) {
        let mut live = self.live.write().unwrap_or_else(|e| e.into_inner());
        live.insert(presence_id.into());
    }

    /// Mark `presence_id` as gone.  No-ops if it was never live.
    pub fn remove(&self, presence_id: &str) {
        let mut live = self.live.write().unwrap_or_else(|e| e.into_inner());
        live.remove(presence_id);
    }

    /// Sorted copy of the live set.
    pub fn snapshot(&self) -> Vec<String> {
        let live = self.live.read().unwrap_or_else(|e| e.into_inner());
        let mut ids: Vec<String> = live.iter().cloned().collect();
        ids.sort();
        ids
    }
}

impl Presence for SharedPresence {
    fn is_present(&self, presence_id: &str) -> bool {
        let live = self.live.read().unwrap_or_else(|e| e.into_inner());
        live.contains(presence_id)
    }
}
