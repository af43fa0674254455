//! Identity cache of transfer handles
//!
//! The registry keeps a weak reference per resource. While any clone of a
//! handle is alive, asking for the same resource again returns that very
//! instance; once every clone is dropped the entry is purged lazily.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::trace;

use crate::app::cache::CacheProvider;
use crate::app::resource::ConcreteResource;

use super::decorator::TransferDecorator;
use super::handle::{Transfer, TransferInner};

/// Dead entries are swept once the map grows past this size
const PURGE_THRESHOLD: usize = 1024;

struct RegistryShared {
    provider: Arc<dyn CacheProvider>,
    decorators: Vec<Arc<dyn TransferDecorator>>,
    handles: Mutex<HashMap<ConcreteResource, Weak<TransferInner>>>,
}

/// Hands out identity-cached [`Transfer`] handles for one cache provider
#[derive(Clone)]
pub struct TransferRegistry {
    shared: Arc<RegistryShared>,
}

impl TransferRegistry {
    /// Registry without decorators
    pub fn new(provider: Arc<dyn CacheProvider>) -> Self {
        Self::with_decorators(provider, Vec::new())
    }

    /// Registry applying `decorators` in order
    pub fn with_decorators(
        provider: Arc<dyn CacheProvider>,
        decorators: Vec<Arc<dyn TransferDecorator>>,
    ) -> Self {
        Self {
            shared: Arc::new(RegistryShared {
                provider,
                decorators,
                handles: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn provider(&self) -> &Arc<dyn CacheProvider> {
        &self.shared.provider
    }

    pub fn decorators(&self) -> &[Arc<dyn TransferDecorator>] {
        &self.shared.decorators
    }

    /// Handle for `resource`, reusing the live instance if there is one
    pub fn get_transfer(&self, resource: &ConcreteResource) -> Transfer {
        let created = {
            let mut handles = self.shared.handles.lock();
            if let Some(inner) = handles.get(resource).and_then(Weak::upgrade) {
                return Transfer::from_inner(inner);
            }

            if handles.len() >= PURGE_THRESHOLD {
                handles.retain(|_, weak| weak.strong_count() > 0);
            }

            let inner = Arc::new(TransferInner {
                resource: resource.clone(),
                registry: self.clone(),
            });
            handles.insert(resource.clone(), Arc::downgrade(&inner));
            Transfer::from_inner(inner)
        };

        trace!("Created transfer handle for {}", resource);
        self.shared.provider.on_transfer_created(resource);
        created
    }

    /// Number of entries whose handle is still alive
    pub fn live_handles(&self) -> usize {
        self.shared
            .handles
            .lock()
            .values()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }
}

impl fmt::Debug for TransferRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransferRegistry")
            .field("provider", &self.shared.provider.name())
            .field("decorators", &self.shared.decorators.len())
            .finish()
    }
}
