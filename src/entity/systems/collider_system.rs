use futures::FutureExt;
use glam::Affine3A;
use log::{error, trace};

use crate::entity::components::objects::Transform;
use crate::entity::components::rendering::{MeshCollider, MeshRenderer};
use crate::entity::entity_tracker::EntityTracker;
use crate::physics::collider_factory::{ColliderFactory, ShapeError, ShapeKind};
use crate::physics::collision_world::CollisionWorld;
use crate::rendering::application::MeshSubsystem;

/// Regenerates the colliders of entities whose mesh changed, once per frame. Shapes are generated in the background
/// and only applied when they still match the current mesh version.
#[derive(Default)]
pub struct ColliderSystem {}

impl ColliderSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn end_frame(&self, tracker: &EntityTracker, subsystem: &mut MeshSubsystem, collisions: &mut CollisionWorld) {
        profiling::scope!("ColliderSystem::end_frame");
        let mut world = tracker.world().write().expect("World Write Lock poisoned");

        for (entity, (renderer, collider, transform)) in
            world.query_mut::<(&MeshRenderer, &mut MeshCollider, Option<&Transform>)>()
        {
            let asset = subsystem.get_mesh_asset(renderer.mesh);

            if collider.dirty {
                collider.dirty = false;
                let future = match collider.kind {
                    ShapeKind::ConvexHull => subsystem.convex_shape_async(renderer.mesh),
                    ShapeKind::StaticMesh => subsystem.static_shape_async(renderer.mesh),
                };
                collider.pending = Some((future, asset.version()));
            }

            let Some((future, version)) = collider.pending.take() else {
                continue;
            };

            if asset.version() != version {
                trace!("The mesh of {:?} changed while generating its shape, starting over", entity);
                collider.dirty = true;
                continue;
            }

            match future.clone().now_or_never() {
                None => collider.pending = Some((future, version)),
                Some(Ok(shape)) => {
                    let transform = transform.map_or(Affine3A::IDENTITY, |transform| transform.0);
                    let handle = collisions.replace_collider(collider.handle, ColliderFactory::collider(shape, &transform));
                    collider.handle = Some(handle);
                    trace!("Updated the collider of {:?}", entity);
                }
                Some(Err(ShapeError::Empty(_))) => {
                    if let Some(handle) = collider.handle.take() {
                        collisions.drop_collider(handle, true);
                    }
                }
                Some(Err(err)) => error!("Can't build the collider of {:?}: {}", entity, err),
            }
        }

        collisions.update_queries();
    }
}
