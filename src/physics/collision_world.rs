use glam::Vec3;
use rapier3d::prelude::*;

/// The colliders generated from mesh assets, queryable by raycasts. Nothing is simulated: bodies only exist so
/// colliders can be attached to entities.
pub struct CollisionWorld {
    island_manager: IslandManager,
    rigid_body_set: RigidBodySet,
    collider_set: ColliderSet,
    queries: QueryPipeline,
    queries_dirty: bool,
}

impl Default for CollisionWorld {
    fn default() -> Self {
        Self {
            island_manager: IslandManager::new(),
            rigid_body_set: RigidBodySet::new(),
            collider_set: ColliderSet::new(),
            queries: QueryPipeline::new(),
            queries_dirty: false,
        }
    }
}

impl CollisionWorld {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_collider(&mut self, collider: Collider) -> ColliderHandle {
        self.queries_dirty = true;
        self.collider_set.insert(collider)
    }

    /// Swaps the collider behind `previous` (if it is still alive) for `collider`.
    pub fn replace_collider(&mut self, previous: Option<ColliderHandle>, collider: Collider) -> ColliderHandle {
        if let Some(previous) = previous {
            self.drop_collider(previous, false);
        }
        self.insert_collider(collider)
    }

    pub fn drop_collider(&mut self, collider: ColliderHandle, wake_up: bool) -> bool {
        self.queries_dirty = true;
        self.collider_set
            .remove(
                collider,
                &mut self.island_manager,
                &mut self.rigid_body_set,
                wake_up,
            )
            .is_some()
    }

    pub fn collider(&self, handle: ColliderHandle) -> Option<&Collider> {
        self.collider_set.get(handle)
    }

    pub fn collider_count(&self) -> usize {
        self.collider_set.len()
    }

    /// Brings the query acceleration structure up to date, has to happen after colliders changed and before
    /// casting rays.
    pub fn update_queries(&mut self) {
        if self.queries_dirty {
            self.queries.update(&self.collider_set);
            self.queries_dirty = false;
        }
    }

    /// The closest collider hit by the ray and the distance along `direction` (which is expected to be normalized).
    pub fn cast_ray(&self, origin: Vec3, direction: Vec3, max_distance: f32) -> Option<(ColliderHandle, f32)> {
        let ray = Ray::new(point![origin.x, origin.y, origin.z], vector![direction.x, direction.y, direction.z]);
        self.queries.cast_ray(
            &self.rigid_body_set,
            &self.collider_set,
            &ray,
            max_distance,
            true,
            QueryFilter::default(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    pub fn replaced_colliders_are_removed() {
        let mut world = CollisionWorld::new();
        let first = world.insert_collider(ColliderBuilder::cuboid(0.5, 0.5, 0.5).build());
        let second = world.replace_collider(Some(first), ColliderBuilder::ball(1.0).build());

        assert!(world.collider(first).is_none());
        assert!(world.collider(second).is_some());
        assert_eq!(world.collider_count(), 1);
    }

    #[test]
    pub fn rays_hit_colliders_after_an_update() {
        let mut world = CollisionWorld::new();
        let handle = world.insert_collider(
            ColliderBuilder::cuboid(0.5, 0.5, 0.5)
                .translation(vector![0.0, 0.0, -5.0])
                .build(),
        );
        world.update_queries();

        let (hit, distance) = world
            .cast_ray(Vec3::ZERO, Vec3::NEG_Z, 100.0)
            .expect("the cube is in front of the ray");
        assert_eq!(hit, handle);
        assert!((distance - 4.5).abs() < 1e-4);
        assert!(world.cast_ray(Vec3::ZERO, Vec3::Z, 100.0).is_none());
    }
}
