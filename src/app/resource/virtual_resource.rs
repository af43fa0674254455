//! Ordered fallback lists of concrete resources

use std::fmt;
use std::sync::Arc;

use super::concrete::ConcreteResource;
use super::location::Location;

/// Ordered, de-duplicated sequence of candidate resources
///
/// The first candidate has the highest precedence; fallback resolution walks
/// the list in order and stops at the first hit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct VirtualResource {
    resources: Vec<ConcreteResource>,
}

impl VirtualResource {
    /// Build from candidates, dropping later duplicates
    pub fn new(candidates: impl IntoIterator<Item = ConcreteResource>) -> Self {
        let mut resources: Vec<ConcreteResource> = Vec::new();
        for candidate in candidates {
            if !resources.contains(&candidate) {
                resources.push(candidate);
            }
        }
        Self { resources }
    }

    /// Same `path` on every location, in location order
    pub fn from_locations(locations: &[Arc<Location>], path: &str) -> Self {
        Self::new(
            locations
                .iter()
                .map(|location| ConcreteResource::new(location.clone(), path)),
        )
    }

    /// Iterate candidates in precedence order
    pub fn iter(&self) -> std::slice::Iter<'_, ConcreteResource> {
        self.resources.iter()
    }

    /// Number of candidates
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    /// True when there are no candidates
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Highest-precedence candidate
    pub fn first(&self) -> Option<&ConcreteResource> {
        self.resources.first()
    }

    /// Flat copy of the candidates
    pub fn to_vec(&self) -> Vec<ConcreteResource> {
        self.resources.clone()
    }
}

impl IntoIterator for VirtualResource {
    type Item = ConcreteResource;
    type IntoIter = std::vec::IntoIter<ConcreteResource>;

    fn into_iter(self) -> Self::IntoIter {
        self.resources.into_iter()
    }
}

impl<'a> IntoIterator for &'a VirtualResource {
    type Item = &'a ConcreteResource;
    type IntoIter = std::slice::Iter<'a, ConcreteResource>;

    fn into_iter(self) -> Self::IntoIter {
        self.resources.iter()
    }
}

impl fmt::Display for VirtualResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self.resources.iter().map(|r| r.to_string()).collect();
        write!(f, "[{}]", names.join(", "))
    }
}
