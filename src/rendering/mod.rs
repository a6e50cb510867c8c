//! Everything between an authored mesh and the vertices a renderer draws: importing into the canonical buffer
//! layout, the versioned mesh assets and their dependants, and the per instance deformation.

pub mod application;
pub mod asset_graph;
pub mod blend_shapes;
pub mod common;
pub mod deformation;
pub mod errors;
pub mod importer;
