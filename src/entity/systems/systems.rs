use std::time::Instant;

use log::debug;

use crate::entity::entity_tracker::EntityTracker;
use crate::entity::systems::collider_system::ColliderSystem;
use crate::entity::systems::mesh_sync_system::MeshSyncSystem;
use crate::physics::collision_world::CollisionWorld;
use crate::rendering::application::MeshSubsystem;

pub struct Systems {
    mesh_sync_system: MeshSyncSystem,
    collider_system: ColliderSystem,
}

impl Systems {
    pub fn new() -> Self {
        Self {
            mesh_sync_system: MeshSyncSystem::new(),
            collider_system: ColliderSystem::new(),
        }
    }

    /// One frame: commit background results and the texture changes of the frame, then sync the scene with them.
    pub fn update(&self, tracker: &EntityTracker, subsystem: &mut MeshSubsystem, collisions: &mut CollisionWorld) {
        let pre_systems = Instant::now();

        subsystem.pump();
        subsystem.end_frame();
        self.mesh_sync_system.update(tracker, subsystem);
        self.collider_system.end_frame(tracker, subsystem, collisions);

        let duration_systems = (Instant::now() - pre_systems).as_millis();
        if duration_systems > 6 {
            debug!("Systems update took too long: {:?} ms", duration_systems);
        }
    }
}

impl Default for Systems {
    fn default() -> Self {
        Self::new()
    }
}
