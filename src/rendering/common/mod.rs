/// Authoring data and the renderer disagree on handedness and texture space, the conversions live here.
pub mod coordinate_systems;
/// basic types (e.g. render mesh) to abstract away from both the authoring format and the render backend.
pub mod types;
pub mod vertex_layout;
