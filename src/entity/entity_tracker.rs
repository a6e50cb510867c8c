use std::sync::RwLock;

use glam::Affine3A;
use hecs::{Entity, World};
use log::{trace, warn};

use crate::entity::components::objects::Transform;
use crate::entity::components::rendering::{
    BlendShapeWeights, DeformationDirty, JointTransforms, MeshCollider, MeshRenderer,
};
use crate::physics::collider_factory::ShapeKind;
use crate::physics::collision_world::CollisionWorld;
use crate::rendering::application::MeshSubsystem;
use crate::rendering::asset_graph::references::Consumer;
use crate::rendering::common::types::AssetId;

#[derive(Default)]
pub struct EntityTracker {
    world: RwLock<World>,
}

impl EntityTracker {
    pub fn new() -> Self {
        EntityTracker::default()
    }

    pub fn world(&self) -> &RwLock<World> {
        &self.world
    }

    /// Spawns an entity drawing `mesh`. References are registered by the mesh sync system on its next update.
    pub fn spawn_mesh(&self, mesh: AssetId, materials: Vec<AssetId>, transform: Affine3A) -> Entity {
        let mut world = self.world.write().expect("World Write Lock poisoned");
        let entity = world.spawn((
            MeshRenderer { mesh, materials },
            Transform(transform),
        ));
        trace!("Spawned {:?} for mesh {}", entity, mesh);
        entity
    }

    pub fn add_collider(&self, entity: Entity, kind: ShapeKind) {
        let mut world = self.world.write().expect("World Write Lock poisoned");
        if world.insert_one(entity, MeshCollider::new(kind)).is_err() {
            warn!("Can't add a collider to {:?}, it has been despawned", entity);
        }
    }

    /// Points the entity at another mesh. The mesh sync system moves its references over on the next update.
    pub fn set_mesh(&self, entity: Entity, mesh: AssetId) {
        let mut world = self.world.write().expect("World Write Lock poisoned");
        match world.get::<&mut MeshRenderer>(entity) {
            Ok(mut renderer) => renderer.mesh = mesh,
            Err(_) => warn!("Can't assign mesh {} to {:?}, it doesn't render anything", mesh, entity),
        }
    }

    pub fn set_blend_shape_weights(&self, entity: Entity, weights: Vec<f32>) {
        let mut world = self.world.write().expect("World Write Lock poisoned");
        if world.insert(entity, (BlendShapeWeights(weights), DeformationDirty)).is_err() {
            warn!("Can't set blend shape weights of {:?}, it has been despawned", entity);
        }
    }

    pub fn set_joint_transforms(&self, entity: Entity, transforms: Vec<Affine3A>) {
        let mut world = self.world.write().expect("World Write Lock poisoned");
        if world.insert(entity, (JointTransforms(transforms), DeformationDirty)).is_err() {
            warn!("Can't set joint transforms of {:?}, it has been despawned", entity);
        }
    }

    /// Removes the entity together with everything it holds on to: references, its blended instance and its collider.
    pub fn despawn(&self, entity: Entity, subsystem: &mut MeshSubsystem, collisions: &mut CollisionWorld) {
        let mut world = self.world.write().expect("World Write Lock poisoned");

        if let Ok(collider) = world.get::<&MeshCollider>(entity) {
            if let Some(handle) = collider.handle {
                collisions.drop_collider(handle, true);
            }
        }

        subsystem.remove_consumer(Consumer::Entity(entity));
        subsystem.destroy_instance(entity);

        if world.despawn(entity).is_err() {
            warn!("{:?} has already been despawned", entity);
        }
    }
}
