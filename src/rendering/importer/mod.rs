/// Authored meshes: validated snapshots in the authoring tool's coordinate system.
pub mod mesh_importer;
/// Meshes described as raw vertex streams.
pub mod native_importer;
