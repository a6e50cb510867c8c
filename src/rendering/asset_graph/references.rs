use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::hash::Hash;

use hecs::Entity;
use log::{debug, trace, warn};

use crate::rendering::common::types::AssetId;

/// Something that uses an asset: a scene entity or a material (which uses textures).
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Consumer {
    Entity(Entity),
    Material(AssetId),
}

#[derive(Debug, Clone, PartialEq)]
pub enum AssetNotification {
    /// `reference_preserved` is set when the asset has been patched in place: a consumer holding on to the asset
    /// object doesn't need to fetch it again, but derived state (bounds, colliders) may still be stale.
    MeshOrMaterialChanged {
        consumer: Consumer,
        asset: AssetId,
        reference_preserved: bool,
    },
    /// All textures an observer cares about that changed during the last frame, delivered once.
    TexturesChanged {
        observer: Consumer,
        textures: Vec<AssetId>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConsistencyViolation {
    /// `asset` lists `consumer`, but the consumer doesn't list the asset (or the other way around).
    OneSidedReference { asset: AssetId, consumer: Consumer },
    OneSidedObserver { texture: AssetId, observer: Consumer },
}

/// Many to many relation between assets and their consumers. Both directions are stored so that either side can be
/// torn down without a scan; [`AssetReferenceGraph::check_consistency`] verifies that they agree.
#[derive(Debug, Default)]
pub struct AssetReferenceGraph {
    consumers_by_asset: HashMap<AssetId, HashSet<Consumer>>,
    assets_by_consumer: HashMap<Consumer, HashSet<AssetId>>,
    observers_by_texture: HashMap<AssetId, HashSet<Consumer>>,
    textures_by_observer: HashMap<Consumer, HashSet<AssetId>>,
    updated_textures: BTreeSet<AssetId>,
    notifications: Vec<AssetNotification>,
}

fn link<A, B>(forward: &mut HashMap<A, HashSet<B>>, backward: &mut HashMap<B, HashSet<A>>, a: A, b: B) -> bool
where
    A: Copy + Eq + Hash,
    B: Copy + Eq + Hash,
{
    backward.entry(b).or_default().insert(a);
    forward.entry(a).or_default().insert(b)
}

fn unlink<A, B>(forward: &mut HashMap<A, HashSet<B>>, backward: &mut HashMap<B, HashSet<A>>, a: A, b: B) -> bool
where
    A: Copy + Eq + Hash,
    B: Copy + Eq + Hash,
{
    let removed = remove_from(forward, a, &b);
    remove_from(backward, b, &a);
    removed
}

fn remove_from<K, V>(map: &mut HashMap<K, HashSet<V>>, key: K, value: &V) -> bool
where
    K: Eq + Hash,
    V: Eq + Hash,
{
    let Some(set) = map.get_mut(&key) else {
        return false;
    };

    let removed = set.remove(value);
    if set.is_empty() {
        map.remove(&key);
    }
    removed
}

impl AssetReferenceGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registering the same pair twice counts once. Returns whether the pair is new.
    pub fn register(&mut self, asset: AssetId, consumer: Consumer) -> bool {
        if !asset.is_valid() {
            return false;
        }

        link(
            &mut self.consumers_by_asset,
            &mut self.assets_by_consumer,
            asset,
            consumer,
        )
    }

    pub fn unregister(&mut self, asset: AssetId, consumer: Consumer) -> bool {
        if !asset.is_valid() {
            return false;
        }

        let removed = unlink(
            &mut self.consumers_by_asset,
            &mut self.assets_by_consumer,
            asset,
            consumer,
        );
        if !removed {
            debug!("{:?} was not registered as a consumer of {}", consumer, asset);
        }
        removed
    }

    pub fn reference_count(&self, asset: AssetId) -> usize {
        self.consumers_by_asset.get(&asset).map_or(0, HashSet::len)
    }

    pub fn consumers_of(&self, asset: AssetId) -> Vec<Consumer> {
        self.consumers_by_asset
            .get(&asset)
            .map(|consumers| consumers.iter().copied().collect::<BTreeSet<_>>().into_iter().collect())
            .unwrap_or_default()
    }

    pub fn assets_of(&self, consumer: Consumer) -> Vec<AssetId> {
        self.assets_by_consumer
            .get(&consumer)
            .map(|assets| assets.iter().copied().collect::<BTreeSet<_>>().into_iter().collect())
            .unwrap_or_default()
    }

    /// Queues a notification for every consumer of `asset`.
    pub fn notify_changed(&mut self, asset: AssetId, reference_preserved: bool) {
        if !asset.is_valid() {
            return;
        }

        for consumer in self.consumers_of(asset) {
            self.notifications
                .push(AssetNotification::MeshOrMaterialChanged {
                    consumer,
                    asset,
                    reference_preserved,
                });
        }
    }

    /// Forgets everything a consumer references and observes, e.g. when its entity is despawned.
    pub fn remove_consumer(&mut self, consumer: Consumer) {
        for asset in self.assets_of(consumer) {
            self.unregister(asset, consumer);
        }

        let textures = self
            .textures_by_observer
            .get(&consumer)
            .map(|textures| textures.iter().copied().collect::<Vec<_>>())
            .unwrap_or_default();
        for texture in textures {
            self.remove_texture_observer(texture, consumer);
        }
    }

    /// Drops the reference entry of a deleted asset. Consumers that still reference it are a consistency violation
    /// on their side, they are logged and returned.
    pub fn remove_asset(&mut self, asset: AssetId) -> Vec<Consumer> {
        let remaining = self.consumers_of(asset);
        if !remaining.is_empty() {
            warn!(
                "Asset {} has been deleted while still being referenced by {} consumer(s): {:?}",
                asset,
                remaining.len(),
                remaining
            );
        }

        for consumer in &remaining {
            self.unregister(asset, *consumer);
        }
        remaining
    }

    pub fn add_texture_observer(&mut self, texture: AssetId, observer: Consumer) -> bool {
        if !texture.is_valid() {
            return false;
        }

        link(
            &mut self.observers_by_texture,
            &mut self.textures_by_observer,
            texture,
            observer,
        )
    }

    pub fn remove_texture_observer(&mut self, texture: AssetId, observer: Consumer) -> bool {
        if !texture.is_valid() {
            return false;
        }

        unlink(
            &mut self.observers_by_texture,
            &mut self.textures_by_observer,
            texture,
            observer,
        )
    }

    /// Replaces the textures a material observes.
    pub fn set_material_textures(&mut self, material: AssetId, textures: &[AssetId]) {
        if !material.is_valid() {
            return;
        }

        let observer = Consumer::Material(material);
        let previous = self
            .textures_by_observer
            .get(&observer)
            .map(|textures| textures.iter().copied().collect::<Vec<_>>())
            .unwrap_or_default();
        for texture in previous {
            self.remove_texture_observer(texture, observer);
        }

        for &texture in textures {
            self.add_texture_observer(texture, observer);
        }
    }

    /// Remembers the texture until the next [`AssetReferenceGraph::flush_texture_updates`].
    pub fn texture_updated(&mut self, texture: AssetId) {
        if texture.is_valid() {
            self.updated_textures.insert(texture);
        }
    }

    /// Delivers the textures updated since the last flush, once per observer. Materials forward the change to
    /// everything that uses them.
    pub fn flush_texture_updates(&mut self) {
        if self.updated_textures.is_empty() {
            return;
        }

        let mut by_observer = BTreeMap::<Consumer, Vec<AssetId>>::new();
        for texture in std::mem::take(&mut self.updated_textures) {
            for &observer in self.observers_by_texture.get(&texture).into_iter().flatten() {
                by_observer.entry(observer).or_default().push(texture);
            }
        }

        trace!("Flushing texture updates to {} observer(s)", by_observer.len());
        for (observer, textures) in by_observer {
            self.notifications
                .push(AssetNotification::TexturesChanged { observer, textures });

            if let Consumer::Material(material) = observer {
                self.notify_changed(material, false);
            }
        }
    }

    pub fn drain_notifications(&mut self) -> Vec<AssetNotification> {
        std::mem::take(&mut self.notifications)
    }

    pub fn has_pending_notifications(&self) -> bool {
        !self.notifications.is_empty()
    }

    pub fn check_consistency(&self) -> Vec<ConsistencyViolation> {
        let mut violations = vec![];

        for (asset, consumers) in &self.consumers_by_asset {
            for consumer in consumers {
                let listed = self
                    .assets_by_consumer
                    .get(consumer)
                    .is_some_and(|assets| assets.contains(asset));
                if !listed {
                    violations.push(ConsistencyViolation::OneSidedReference {
                        asset: *asset,
                        consumer: *consumer,
                    });
                }
            }
        }

        for (consumer, assets) in &self.assets_by_consumer {
            for asset in assets {
                let listed = self
                    .consumers_by_asset
                    .get(asset)
                    .is_some_and(|consumers| consumers.contains(consumer));
                if !listed {
                    violations.push(ConsistencyViolation::OneSidedReference {
                        asset: *asset,
                        consumer: *consumer,
                    });
                }
            }
        }

        for (texture, observers) in &self.observers_by_texture {
            for observer in observers {
                let listed = self
                    .textures_by_observer
                    .get(observer)
                    .is_some_and(|textures| textures.contains(texture));
                if !listed {
                    violations.push(ConsistencyViolation::OneSidedObserver {
                        texture: *texture,
                        observer: *observer,
                    });
                }
            }
        }

        for (observer, textures) in &self.textures_by_observer {
            for texture in textures {
                let listed = self
                    .observers_by_texture
                    .get(texture)
                    .is_some_and(|observers| observers.contains(observer));
                if !listed {
                    violations.push(ConsistencyViolation::OneSidedObserver {
                        texture: *texture,
                        observer: *observer,
                    });
                }
            }
        }

        violations
    }
}
