//! Keeps externally authored meshes (vertices, sub meshes, blend shapes and skins) synchronized with a scene:
//! importing them into render ready buffers, versioning them, deforming their instances and notifying whoever
//! depends on them.

pub mod demos;
pub mod entity;
pub mod physics;
pub mod rendering;
pub mod settings;
pub mod util;
