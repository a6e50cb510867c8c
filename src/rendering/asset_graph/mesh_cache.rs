use std::collections::HashMap;
use std::sync::{Arc, Weak};

use log::{trace, warn};

use crate::rendering::asset_graph::mesh_asset::{MeshAsset, MeshContents};
use crate::rendering::common::types::AssetId;

/// Captured before a mesh is generated in the background: which asset object the result is meant for and the
/// version it was derived from.
#[derive(Debug, Clone)]
pub struct GenerationTicket {
    pub id: AssetId,
    asset: Weak<MeshAsset>,
    pub version: u64,
    /// How many requested updates the generation stands for, when newer requests superseded older ones.
    pub updates: u64,
}

impl GenerationTicket {
    pub fn new(asset: &Arc<MeshAsset>) -> Self {
        Self {
            id: asset.id(),
            asset: Arc::downgrade(asset),
            version: asset.version(),
            updates: 1,
        }
    }

    /// The cache still maps the id to the very same object and nothing has replaced its contents since.
    pub fn is_current(&self, cache: &MeshCache) -> bool {
        cache.get(self.id).is_some_and(|current| {
            std::ptr::eq(Arc::as_ptr(&current), self.asset.as_ptr()) && current.version() == self.version
        })
    }
}

/// Maps asset ids to the mesh asset currently representing them.
#[derive(Debug, Default)]
pub struct MeshCache {
    meshes: HashMap<AssetId, Arc<MeshAsset>>,
}

impl MeshCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: AssetId) -> Option<Arc<MeshAsset>> {
        self.meshes.get(&id).cloned()
    }

    /// Never fails for a syntactically valid id: unknown ids get an empty placeholder, which later updates
    /// replace.
    pub fn get_or_placeholder(&mut self, id: AssetId) -> Arc<MeshAsset> {
        self.meshes
            .entry(id)
            .or_insert_with(|| {
                trace!("Creating placeholder for mesh {}", id);
                Arc::new(MeshAsset::placeholder(id))
            })
            .clone()
    }

    pub fn contains(&self, id: AssetId) -> bool {
        self.meshes.contains_key(&id)
    }

    pub fn insert(&mut self, asset: Arc<MeshAsset>) -> Option<Arc<MeshAsset>> {
        self.meshes.insert(asset.id(), asset)
    }

    pub fn remove(&mut self, id: AssetId) -> Option<Arc<MeshAsset>> {
        let removed = self.meshes.remove(&id);
        if let Some(asset) = &removed {
            asset.clear_derived();
        }
        removed
    }

    /// Commits a background generation result under the version guard. Stale results are dropped silently, the
    /// winner replaces the asset object with a successor that continues the version sequence.
    pub fn commit(&mut self, ticket: &GenerationTicket, contents: MeshContents) -> Option<Arc<MeshAsset>> {
        if !ticket.is_current(self) {
            trace!(
                "Discarding mesh {} generated from v{}, it has been replaced in the meantime",
                ticket.id,
                ticket.version
            );
            return None;
        }

        let Some(previous) = self.get(ticket.id) else {
            warn!("Mesh {} vanished while committing", ticket.id);
            return None;
        };

        let successor = Arc::new(MeshAsset::successor(&previous, contents, ticket.updates));
        self.insert(successor.clone());
        Some(successor)
    }

    pub fn len(&self) -> usize {
        self.meshes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.meshes.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = AssetId> + '_ {
        self.meshes.keys().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    pub fn stale_tickets_are_rejected() {
        let mut cache = MeshCache::new();
        let asset = cache.get_or_placeholder(AssetId(5));
        let ticket = GenerationTicket::new(&asset);

        // a synchronous update wins the race
        asset.replace(MeshContents::default());
        assert!(!ticket.is_current(&cache));
        assert!(cache.commit(&ticket, MeshContents::default()).is_none());
        assert_eq!(cache.get(AssetId(5)).map(|asset| asset.version()), Some(1));
    }

    #[test]
    pub fn replaced_identities_reject_tickets() {
        let mut cache = MeshCache::new();
        let asset = cache.get_or_placeholder(AssetId(5));
        let ticket = GenerationTicket::new(&asset);

        cache.remove(AssetId(5));
        cache.get_or_placeholder(AssetId(5));
        assert!(!ticket.is_current(&cache));
    }

    #[test]
    pub fn current_tickets_commit_a_successor() {
        let mut cache = MeshCache::new();
        let asset = cache.get_or_placeholder(AssetId(5));
        let ticket = GenerationTicket::new(&asset);

        let committed = cache.commit(&ticket, MeshContents::default()).expect("ticket is current");
        assert!(!Arc::ptr_eq(&committed, &asset));
        assert_eq!(committed.version(), 1);
        assert!(!ticket.is_current(&cache));
    }

    #[test]
    pub fn superseding_tickets_count_every_update() {
        let mut cache = MeshCache::new();
        let asset = cache.get_or_placeholder(AssetId(5));
        let mut ticket = GenerationTicket::new(&asset);
        ticket.updates = 3;

        let committed = cache.commit(&ticket, MeshContents::default()).expect("ticket is current");
        assert_eq!(committed.version(), 3);
    }
}
