//! Time-to-live not-found cache

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::trace;

use super::NotFoundCache;
use crate::app::resource::{ConcreteResource, Location};
use crate::constants::nfc;

/// Not-found cache whose records expire after a fixed TTL
#[derive(Debug)]
pub struct ExpiringNotFoundCache {
    ttl: Duration,
    entries: Mutex<HashMap<ConcreteResource, Instant>>,
}

impl Default for ExpiringNotFoundCache {
    fn default() -> Self {
        Self::new(nfc::DEFAULT_TTL)
    }
}

impl ExpiringNotFoundCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Drop expired records, returning how many were removed
    pub fn sweep(&self) -> usize {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, expires| *expires > Instant::now());
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl NotFoundCache for ExpiringNotFoundCache {
    fn is_missing(&self, resource: &ConcreteResource) -> bool {
        let mut entries = self.entries.lock();
        match entries.get(resource) {
            Some(expires) if *expires > Instant::now() => true,
            Some(_) => {
                entries.remove(resource);
                false
            }
            None => false,
        }
    }

    fn add_missing(&self, resource: &ConcreteResource) {
        trace!("Marking {} missing for {:?}", resource, self.ttl);
        self.entries
            .lock()
            .insert(resource.clone(), Instant::now() + self.ttl);
    }

    fn clear_missing(&self, resource: &ConcreteResource) {
        self.entries.lock().remove(resource);
    }

    fn clear_all(&self) {
        self.entries.lock().clear();
    }

    fn missing_for_location(&self, location: &Location) -> Vec<ConcreteResource> {
        let now = Instant::now();
        let mut missing: Vec<ConcreteResource> = self
            .entries
            .lock()
            .iter()
            .filter(|(resource, expires)| **expires > now && **resource.location() == *location)
            .map(|(resource, _)| resource.clone())
            .collect();
        missing.sort_by(|a, b| a.path().cmp(b.path()));
        missing
    }
}
