use meshsync_authoring::AuthoringError;
use meshsync_authoring::native::{VertexAttribute, VertexFormat};
use thiserror::Error;

use crate::rendering::common::types::AssetId;
use crate::rendering::common::vertex_layout::LayoutError;
use crate::util::jobs::JobError;

/// Configuration errors: the data that has been handed to us can't be turned into a mesh.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MeshError {
    #[error(transparent)]
    Authoring(#[from] AuthoringError),

    #[error(transparent)]
    Layout(#[from] LayoutError),

    #[error("Vertex attribute {attribute:?} is stored as {dimension}x {format:?}, only 32 bit floats are supported")]
    UnsupportedFormat {
        attribute: VertexAttribute,
        format: VertexFormat,
        dimension: u8,
    },

    #[error("{0} is not a valid mesh id")]
    InvalidAssetId(AssetId),

    #[error("Generating the mesh failed: {0}")]
    Job(#[from] JobError),
}
