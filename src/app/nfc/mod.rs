//! Not-found cache
//!
//! Records resources recently confirmed absent so that repeated lookups do
//! not hit the network again until the record expires. The engine only needs
//! [`NotFoundCache::is_missing`], [`NotFoundCache::add_missing`] and
//! [`NotFoundCache::clear_missing`]; expiry policy belongs to the
//! implementation.

pub mod expiring;

use std::fmt::Debug;

use crate::app::resource::{ConcreteResource, Location};

pub use expiring::ExpiringNotFoundCache;

/// Negative cache of absent resources
pub trait NotFoundCache: Send + Sync + Debug {
    fn is_missing(&self, resource: &ConcreteResource) -> bool;

    fn add_missing(&self, resource: &ConcreteResource);

    fn clear_missing(&self, resource: &ConcreteResource);

    /// Forget every record
    fn clear_all(&self) {}

    /// Resources currently recorded missing for `location`
    fn missing_for_location(&self, _location: &Location) -> Vec<ConcreteResource> {
        Vec::new()
    }
}

/// Never remembers anything
#[derive(Debug, Default)]
pub struct NoOpNotFoundCache;

impl NotFoundCache for NoOpNotFoundCache {
    fn is_missing(&self, _resource: &ConcreteResource) -> bool {
        false
    }

    fn add_missing(&self, _resource: &ConcreteResource) {}

    fn clear_missing(&self, _resource: &ConcreteResource) {}
}
