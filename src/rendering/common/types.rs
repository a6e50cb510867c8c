use std::fmt::{Debug, Display, Formatter};
use std::ops::Range;

use glam::{Mat4, Vec3};

use crate::rendering::common::vertex_layout::VertexAttributeLayout;

/// Stable identifier of an asset (mesh, material or texture), assigned by the authoring side.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct AssetId(pub u64);

impl AssetId {
    pub const INVALID: AssetId = AssetId(0);

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.0 != 0
    }
}

impl Display for AssetId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub const EMPTY: Aabb = Aabb {
        min: Vec3::splat(f32::INFINITY),
        max: Vec3::splat(f32::NEG_INFINITY),
    };

    pub fn from_points<'a, I: IntoIterator<Item = &'a Vec3>>(points: I) -> Self {
        points
            .into_iter()
            .fold(Aabb::EMPTY, |aabb, point| aabb.extended(*point))
    }

    #[inline]
    pub fn extended(&self, point: Vec3) -> Self {
        Aabb {
            min: self.min.min(point),
            max: self.max.max(point),
        }
    }

    pub fn union(&self, other: &Aabb) -> Self {
        Aabb {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.min.cmpgt(self.max).any()
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }
}

impl Default for Aabb {
    fn default() -> Self {
        Aabb::EMPTY
    }
}

/// A draw range of the index buffer, one per authored sub mesh.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct MeshPart {
    pub index_offset: u32,
    pub index_count: u32,
    pub material_index: u32,
    pub bounds: Aabb,
}

#[derive(Debug, Copy, Clone, PartialEq, Default)]
pub struct JointInfluence {
    pub joint_index: u32,
    pub weight: f32,
}

/// Every vertex has exactly `per_vertex` influences, unused slots carry joint 0 with a weight of 0.
#[derive(Clone, PartialEq, Default)]
pub struct JointInfluences {
    pub per_vertex: usize,
    pub influences: Vec<JointInfluence>,
}

impl JointInfluences {
    pub fn of_vertex(&self, vertex: usize) -> &[JointInfluence] {
        &self.influences[vertex * self.per_vertex..(vertex + 1) * self.per_vertex]
    }
}

impl Debug for JointInfluences {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{ per_vertex: {}, ", self.per_vertex)?;
        write!(f, "influences: [{}] }}", self.influences.len())
    }
}

/// Joints are ordered parents first, so a single forward pass can compose model space matrices.
#[derive(Clone, PartialEq, Default)]
pub struct Skeleton {
    pub parents: Vec<Option<usize>>,
    pub inverse_bind_poses: Vec<Mat4>,
}

impl Skeleton {
    pub fn joint_count(&self) -> usize {
        self.inverse_bind_poses.len()
    }
}

impl Debug for Skeleton {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{ joints: {} }}", self.inverse_bind_poses.len())
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SkinBinding {
    pub influences: JointInfluences,
    pub skeleton: Skeleton,
}

/// The render ready representation of a mesh: one byte buffer per layout slot, a triangle list index buffer (already
/// in the renderer's winding order) and the parts to draw.
#[derive(Clone, PartialEq, Default)]
pub struct RenderMesh {
    pub layout: VertexAttributeLayout,
    pub vertex_count: usize,
    pub vertex_buffers: Vec<Vec<u8>>,
    pub index_buffer: Vec<u32>,
    pub parts: Vec<MeshPart>,
}

impl RenderMesh {
    pub fn bounds(&self) -> Aabb {
        self.parts
            .iter()
            .fold(Aabb::EMPTY, |aabb, part| aabb.union(&part.bounds))
    }

    pub fn triangle_count(&self) -> usize {
        self.index_buffer.len() / 3
    }
}

impl Debug for RenderMesh {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{ layout: {:?}, ", self.layout)?;
        write!(f, "vertex_count: {}, ", self.vertex_count)?;
        write!(
            f,
            "vertex_buffers: {:?}, ",
            self.vertex_buffers.iter().map(Vec::len).collect::<Vec<_>>()
        )?;
        write!(f, "index_buffer: [{}], ", self.index_buffer.len())?;
        write!(f, "parts: {} }}", self.parts.len())
    }
}

/// Vertex ranges that the authoring side declared per sub mesh, only known for native meshes.
pub type VertexRanges = Vec<Range<u32>>;
