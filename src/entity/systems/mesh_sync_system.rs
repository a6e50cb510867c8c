use std::collections::HashSet;

use hecs::{Entity, With, Without, World};
use itertools::Itertools;
use log::{debug, trace, warn};

use crate::entity::components::rendering::{
    BlendShapeWeights, DeformationDirty, JointTransforms, MeshCollider, MeshRenderer, RaycastBounds,
    RegisteredAssets,
};
use crate::entity::entity_tracker::EntityTracker;
use crate::rendering::application::MeshSubsystem;
use crate::rendering::asset_graph::references::{AssetNotification, Consumer};
use crate::rendering::deformation::DeformationError;

/// Keeps entities in sync with the assets they reference: registers new renderers, reacts to change notifications
/// and feeds weights and joint transforms into the deformation engine.
#[derive(Default)]
pub struct MeshSyncSystem {}

impl MeshSyncSystem {
    pub fn new() -> Self {
        Self::default()
    }

    #[profiling::function]
    pub fn update(&self, tracker: &EntityTracker, subsystem: &mut MeshSubsystem) {
        let mut world = tracker.world().write().expect("World Write Lock poisoned");

        self.register_new_renderers(&mut world, subsystem);
        self.reassign_changed_renderers(&mut world, subsystem);
        self.apply_notifications(&mut world, subsystem);
        self.request_deformations(&mut world, subsystem);
        self.update_deformed_bounds(&mut world, subsystem);
    }

    fn register_new_renderers(&self, world: &mut World, subsystem: &mut MeshSubsystem) {
        let fresh = world
            .query_mut::<Without<&MeshRenderer, &RegisteredAssets>>()
            .into_iter()
            .map(|(entity, renderer)| (entity, renderer.clone()))
            .collect_vec();

        for (entity, renderer) in fresh {
            let consumer = Consumer::Entity(entity);
            subsystem.register(renderer.mesh, consumer);
            for &material in &renderer.materials {
                subsystem.register(material, consumer);
            }

            let bounds = self.rebuild(entity, &renderer, subsystem);
            if world
                .insert(entity, (bounds, RegisteredAssets(renderer), DeformationDirty))
                .is_err()
            {
                warn!("{:?} vanished while registering", entity);
            }
        }
    }

    /// Moves the references of entities whose renderer changed since it was registered.
    fn reassign_changed_renderers(&self, world: &mut World, subsystem: &mut MeshSubsystem) {
        let changed = world
            .query_mut::<(&MeshRenderer, &RegisteredAssets)>()
            .into_iter()
            .filter(|(_, (renderer, registered))| **renderer != registered.0)
            .map(|(entity, (renderer, registered))| (entity, renderer.clone(), registered.0.clone()))
            .collect_vec();

        for (entity, renderer, previous) in changed {
            debug!(
                "{:?} switched from mesh {} to mesh {}",
                entity, previous.mesh, renderer.mesh
            );
            let consumer = Consumer::Entity(entity);
            subsystem.unregister(previous.mesh, consumer);
            for &material in &previous.materials {
                subsystem.unregister(material, consumer);
            }
            subsystem.register(renderer.mesh, consumer);
            for &material in &renderer.materials {
                subsystem.register(material, consumer);
            }

            let bounds = self.rebuild(entity, &renderer, subsystem);
            if world
                .insert(entity, (bounds, RegisteredAssets(renderer), DeformationDirty))
                .is_err()
            {
                warn!("{:?} vanished while reassigning", entity);
                continue;
            }
            if let Ok(mut collider) = world.get::<&mut MeshCollider>(entity) {
                collider.dirty = true;
            }
        }
    }

    /// Refreshes everything derived from the entity's mesh: the blended instance and the raycast bounds.
    fn rebuild(&self, entity: Entity, renderer: &MeshRenderer, subsystem: &mut MeshSubsystem) -> RaycastBounds {
        let asset = subsystem.get_mesh_asset(renderer.mesh);
        let contents = asset.contents();

        if contents.is_deformable() {
            match subsystem.create_instance(entity, renderer.mesh) {
                Ok(()) => trace!("Rebuilt the blended instance of {:?}", entity),
                Err(err) => warn!("{:?} can't be deformed: {}", entity, err),
            }
        } else if subsystem.destroy_instance(entity) {
            debug!("Mesh {} of {:?} isn't deformable anymore", renderer.mesh, entity);
        }

        if contents.part_count() > renderer.materials.len() {
            debug!(
                "Mesh {} has {} parts, but {:?} only assigns {} materials",
                renderer.mesh,
                contents.part_count(),
                entity,
                renderer.materials.len()
            );
        }

        RaycastBounds(contents.bounds())
    }

    fn apply_notifications(&self, world: &mut World, subsystem: &mut MeshSubsystem) {
        let mut changed_meshes = HashSet::new();

        for notification in subsystem.drain_notifications() {
            match notification {
                AssetNotification::MeshOrMaterialChanged {
                    consumer: Consumer::Entity(entity),
                    asset,
                    reference_preserved,
                } => {
                    let Ok(renderer) = world.get::<&MeshRenderer>(entity) else {
                        warn!("Dropping a notification for the despawned {:?}", entity);
                        continue;
                    };

                    if renderer.mesh == asset {
                        changed_meshes.insert(entity);
                    } else {
                        trace!(
                            "Material {} of {:?} changed (reference preserved: {})",
                            asset, entity, reference_preserved
                        );
                    }
                }
                AssetNotification::MeshOrMaterialChanged {
                    consumer: Consumer::Material(material),
                    asset,
                    ..
                } => {
                    trace!("Material {} got notified about {}", material, asset);
                }
                AssetNotification::TexturesChanged { observer, textures } => {
                    trace!("{:?} observed texture changes: {:?}", observer, textures);
                }
            }
        }

        for entity in changed_meshes {
            let Ok(renderer) = world.get::<&MeshRenderer>(entity).map(|renderer| MeshRenderer::clone(&renderer)) else {
                continue;
            };

            let bounds = self.rebuild(entity, &renderer, subsystem);
            if world.insert(entity, (bounds, DeformationDirty)).is_err() {
                continue;
            }
            if let Ok(mut collider) = world.get::<&mut MeshCollider>(entity) {
                collider.dirty = true;
            }
        }
    }

    /// Only entities marked [`DeformationDirty`] are submitted, an unchanged entity keeps its last output.
    fn request_deformations(&self, world: &mut World, subsystem: &mut MeshSubsystem) {
        let mut submitted = vec![];
        for (entity, (weights, transforms)) in
            world.query_mut::<With<(Option<&BlendShapeWeights>, Option<&JointTransforms>), &DeformationDirty>>()
        {
            submitted.push(entity);
            if weights.is_none() && transforms.is_none() {
                continue;
            }

            let weights = weights.map_or(&[][..], |weights| weights.0.as_slice());
            let transforms = transforms.map_or(&[][..], |transforms| transforms.0.as_slice());
            match subsystem.request_deformation(entity, weights, transforms, None) {
                Ok(()) | Err(DeformationError::UnknownInstance(_)) => {}
                Err(err) => warn!("Deforming {:?} failed: {}", entity, err),
            }
        }

        for entity in submitted {
            let _ = world.remove_one::<DeformationDirty>(entity);
        }
    }

    fn update_deformed_bounds(&self, world: &mut World, subsystem: &MeshSubsystem) {
        for (entity, bounds) in world.query_mut::<&mut RaycastBounds>() {
            if let Some(output) = subsystem.deformed_output(entity) {
                bounds.0 = output.bounds;
            }
        }
    }
}
