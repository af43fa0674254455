//! Directory listing merge
//!
//! A listing is the union of three sources: the cached listing sidecar
//! (`.listing.txt`), whatever the cache currently holds below the directory,
//! and a fresh remote listing when the location allows downloading. A remote
//! failure degrades the result to the cached sources instead of failing.

use std::collections::BTreeSet;

use tracing::{debug, warn};

use crate::app::resource::{ConcreteResource, VirtualResource};
use crate::app::transfer::stream::{pipe, BytesReader};
use crate::constants::files::{DIRECTORY_MARKER, LISTING_FILE_NAME, RESERVED_NAMES};
use crate::errors::TransferResult;

use super::TransferManager;

fn is_reserved(name: &str) -> bool {
    let bare = name.trim_end_matches(DIRECTORY_MARKER);
    RESERVED_NAMES.contains(&bare) || bare.is_empty()
}

/// Collapse `x` and `x/` into `x/` and drop reserved names
fn finish_listing(entries: BTreeSet<String>) -> Vec<String> {
    entries
        .iter()
        .filter(|name| !is_reserved(name))
        .filter(|name| {
            name.ends_with(DIRECTORY_MARKER)
                || !entries.contains(&format!("{}{}", name, DIRECTORY_MARKER))
        })
        .cloned()
        .collect()
}

impl TransferManager {
    /// Names below the directory `resource`, directories suffixed with `/`
    pub async fn list(&self, resource: &ConcreteResource) -> TransferResult<Vec<String>> {
        let directory = self.get_cache_reference(resource);
        let mut entries = BTreeSet::new();

        let sidecar = directory.child(LISTING_FILE_NAME);
        if sidecar.exists().await? {
            let content = sidecar.read_to_vec().await?;
            for line in String::from_utf8_lossy(&content).lines() {
                let name = line.trim();
                if !name.is_empty() {
                    entries.insert(name.to_string());
                }
            }
        }

        for name in directory.list().await? {
            entries.insert(name);
        }

        if resource.allows_downloading() {
            if let Some(remote) = self.remote_listing(resource).await {
                if resource.allows_storing() && self.config().store_listings {
                    self.write_listing_sidecar(resource, &remote).await;
                }
                entries.extend(remote);
            }
        }

        // Sidecar and remote names may lack the marker for cached directories
        let mut marked = BTreeSet::new();
        for name in entries {
            if !name.ends_with(DIRECTORY_MARKER)
                && self
                    .get_cache_reference(&resource.child(&name))
                    .is_directory()
                    .await?
            {
                marked.insert(format!("{}{}", name, DIRECTORY_MARKER));
            } else {
                marked.insert(name);
            }
        }
        Ok(finish_listing(marked))
    }

    /// Union of the listings of every candidate
    pub async fn list_all(&self, resource: &VirtualResource) -> TransferResult<Vec<String>> {
        let mut entries = BTreeSet::new();
        for candidate in resource.iter() {
            match self.list(candidate).await {
                Ok(names) => entries.extend(names),
                Err(e) => warn!("Listing of {} failed: {}", candidate, e),
            }
        }
        Ok(finish_listing(entries))
    }

    async fn remote_listing(&self, resource: &ConcreteResource) -> Option<Vec<String>> {
        let transport = match self.transport_for(resource) {
            Ok(transport) => transport,
            Err(e) => {
                debug!("No remote listing for {}: {}", resource, e);
                return None;
            }
        };
        let result = self
            .inner
            .listings
            .list(resource, self.timeout_for(resource), transport, false)
            .await;
        match result {
            Ok(Some(listing)) => Some(listing.entries),
            Ok(None) => None,
            Err(e) => {
                warn!("Remote listing of {} failed, using cached entries: {}", resource, e);
                None
            }
        }
    }

    /// Persist a remote listing next to the cached directory content
    async fn write_listing_sidecar(&self, resource: &ConcreteResource, entries: &[String]) {
        let sidecar = resource.child(LISTING_FILE_NAME);
        let mut content = entries.join("\n");
        content.push('\n');

        let provider = self.inner.registry.provider();
        let written = async {
            let writer = provider.open_output(&sidecar).await?;
            pipe(&mut BytesReader::new(content.into_bytes()), writer).await
        }
        .await;
        if let Err(e) = written {
            warn!("Failed to store listing for {}: {}", resource, e);
        }
    }
}
