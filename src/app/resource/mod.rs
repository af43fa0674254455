//! Resource model: what to fetch and from where
//!
//! - [`location`] - Endpoint descriptors with permissions and timeouts
//! - [`concrete`] - A single (location, path) item
//! - [`virtual_resource`] - Ordered fallback candidates

pub mod concrete;
pub mod location;
pub mod virtual_resource;

use std::fmt;

pub use concrete::{normalize_path, ConcreteResource};
pub use location::Location;
pub use virtual_resource::VirtualResource;

/// Either a single resource or an ordered list of fallback candidates
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Resource {
    Concrete(ConcreteResource),
    Virtual(VirtualResource),
}

impl Resource {
    /// Concrete candidates in precedence order
    pub fn candidates(&self) -> Vec<ConcreteResource> {
        match self {
            Resource::Concrete(resource) => vec![resource.clone()],
            Resource::Virtual(resource) => resource.to_vec(),
        }
    }
}

impl From<ConcreteResource> for Resource {
    fn from(resource: ConcreteResource) -> Self {
        Resource::Concrete(resource)
    }
}

impl From<VirtualResource> for Resource {
    fn from(resource: VirtualResource) -> Self {
        Resource::Virtual(resource)
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resource::Concrete(resource) => resource.fmt(f),
            Resource::Virtual(resource) => resource.fmt(f),
        }
    }
}
