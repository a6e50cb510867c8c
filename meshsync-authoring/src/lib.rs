use thiserror::Error;

use crate::mesh::Topology;
use crate::native::{VertexAttribute, VertexFormat};

/// The highest amount of texture coordinate channels a mesh may carry.
pub const MAX_UV_CHANNELS: usize = 8;

/// Structural problems of an authoring snapshot. These are detected before any buffer is built, so a snapshot that
/// passes validation can be converted without further bounds checks on the authoring side.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AuthoringError {
    #[error("{attribute} has {actual} elements, but the mesh has {expected} vertices")]
    AttributeLengthMismatch {
        attribute: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Sub mesh {sub_mesh} uses the {topology:?} topology, only triangles are supported")]
    NonTriangleTopology { sub_mesh: usize, topology: Topology },

    #[error("Sub mesh {sub_mesh} has {index_count} indices, which is not a whole amount of triangles")]
    TruncatedTriangleList { sub_mesh: usize, index_count: u32 },

    #[error("Sub mesh {sub_mesh} spans indices {start}..{end}, but the index buffer only has {len}")]
    SubMeshOutOfRange {
        sub_mesh: usize,
        start: usize,
        end: usize,
        len: usize,
    },

    #[error("Sub mesh {sub_mesh} references vertex {vertex}, but the mesh only has {vertex_count} vertices")]
    IndexOutOfRange {
        sub_mesh: usize,
        vertex: u64,
        vertex_count: usize,
    },

    #[error("{count} texture coordinate channels exceed the supported maximum of {max}")]
    TooManyUvChannels { count: usize, max: usize },

    #[error("bones_per_vertex accounts for {expected} bone weights, but {actual} were supplied")]
    BoneWeightCountMismatch { expected: usize, actual: usize },

    #[error("Bone weights are present, but there are no bind poses")]
    MissingBindPoses,

    #[error("Vertex {vertex} references joint {joint}, but the skeleton only has {joint_count} joints")]
    JointIndexOutOfRange {
        vertex: usize,
        joint: u32,
        joint_count: usize,
    },

    #[error("Joint {joint} names {parent} as its parent, parents have to precede their children")]
    InvalidJointParent { joint: usize, parent: u32 },

    #[error("Blend shape \"{shape}\" frame {frame} has weight {weight}, frame weights have to ascend from above zero")]
    NonAscendingFrameWeights { shape: String, frame: usize, weight: f32 },

    #[error("Vertex attribute {attribute:?} with {dimension} components is outside of the supported range")]
    InvalidDimension { attribute: VertexAttribute, dimension: u8 },

    #[error("Vertex attribute {attribute:?} appears twice")]
    DuplicateAttribute { attribute: VertexAttribute },

    #[error("Vertex attribute {attribute:?} is stored as {format:?}, which cannot be converted")]
    UnsupportedFormat {
        attribute: VertexAttribute,
        format: VertexFormat,
    },

    #[error("Vertex stream {stream} holds {actual} bytes, but {expected} are required")]
    StreamTooShort {
        stream: usize,
        expected: usize,
        actual: usize,
    },

    #[error("The index data holds {actual} bytes, but {expected} are required")]
    IndexDataTooShort { expected: usize, actual: usize },
}

/// Snapshots of authored meshes, as delivered by the authoring tool.
pub mod mesh;
/// Low level, stream based mesh descriptions.
pub mod native;

#[cfg(test)]
mod tests;
