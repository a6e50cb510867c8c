pub mod collider_system;
pub mod mesh_sync_system;
pub mod systems;
