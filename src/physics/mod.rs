pub mod collider_factory;
pub mod collision_world;
