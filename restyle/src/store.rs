//! Session store: completed job outcomes keyed by caller identifier.
//!
//! Records exist only for jobs that reached terminal success. Each insert
//! swaps in a whole `Arc<JobOutcome>`, so a reader sees either nothing or a
//! complete outcome. Two jobs sharing an identifier race, last write wins.

use std::sync::Arc;

use dashmap::DashMap;

use crate::job::JobOutcome;

pub trait SessionStore: Send + Sync {
    /// Store an outcome, replacing any previous one for the same identifier.
    /// Returns the replaced outcome.
    fn insert(&self, outcome: JobOutcome) -> Option<Arc<JobOutcome>>;

    fn get(&self, identifier: &str) -> Option<Arc<JobOutcome>>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Process-lifetime store. Nothing is ever evicted.
#[derive(Default)]
pub struct MemorySessionStore {
    records: DashMap<String, Arc<JobOutcome>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemorySessionStore {
    fn insert(&self, outcome: JobOutcome) -> Option<Arc<JobOutcome>> {
        self.records
            .insert(outcome.identifier.clone(), Arc::new(outcome))
    }

    fn get(&self, identifier: &str) -> Option<Arc<JobOutcome>> {
        self.records
            .get(identifier)
            .map(|entry| Arc::clone(entry.value()))
    }

    fn len(&self) -> usize {
        self.records.len()
    }
}
