use std::fmt::{Debug, Formatter};

use glam::{Mat4, Vec2, Vec3, Vec4};

use crate::{AuthoringError, MAX_UV_CHANNELS};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub enum Topology {
    #[default]
    Triangles,
    Quads,
    Lines,
    LineStrip,
    Points,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct RawSubMesh {
    pub index_start: u32,
    pub index_count: u32,
    pub base_vertex: u32,
    pub topology: Topology,
}

#[derive(Clone, PartialEq)]
pub enum RawIndices {
    U16(Vec<u16>),
    U32(Vec<u32>),
}

impl Default for RawIndices {
    fn default() -> Self {
        RawIndices::U32(Vec::new())
    }
}

impl RawIndices {
    pub fn len(&self) -> usize {
        match self {
            RawIndices::U16(indices) => indices.len(),
            RawIndices::U32(indices) => indices.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn get(&self, position: usize) -> Option<u32> {
        match self {
            RawIndices::U16(indices) => indices.get(position).map(|&idx| idx as u32),
            RawIndices::U32(indices) => indices.get(position).copied(),
        }
    }
}

impl Debug for RawIndices {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            RawIndices::U16(indices) => write!(f, "U16([{}])", indices.len()),
            RawIndices::U32(indices) => write!(f, "U32([{}])", indices.len()),
        }
    }
}

/// One texture coordinate channel in the width it was authored with.
#[derive(Clone, PartialEq)]
pub enum RawTexCoords {
    Float2(Vec<Vec2>),
    Float3(Vec<Vec3>),
    Float4(Vec<Vec4>),
}

impl RawTexCoords {
    pub fn len(&self) -> usize {
        match self {
            RawTexCoords::Float2(uvs) => uvs.len(),
            RawTexCoords::Float3(uvs) => uvs.len(),
            RawTexCoords::Float4(uvs) => uvs.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dimension(&self) -> usize {
        match self {
            RawTexCoords::Float2(_) => 2,
            RawTexCoords::Float3(_) => 3,
            RawTexCoords::Float4(_) => 4,
        }
    }
}

impl Debug for RawTexCoords {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Float{}([{}])", self.dimension(), self.len())
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Default)]
pub struct RawBoneWeight {
    pub joint_index: u32,
    pub weight: f32,
}

#[derive(Clone, PartialEq, Default)]
pub struct RawBlendShapeFrame {
    pub weight: f32,
    pub delta_positions: Vec<Vec3>,
    /// May be empty, or shorter than the vertex count: missing entries are zero.
    pub delta_normals: Vec<Vec3>,
    pub delta_tangents: Vec<Vec3>,
}

impl Debug for RawBlendShapeFrame {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{ weight: {}, ", self.weight)?;
        write!(f, "delta_positions: [{}], ", self.delta_positions.len())?;
        write!(f, "delta_normals: [{}], ", self.delta_normals.len())?;
        write!(f, "delta_tangents: [{}] }}", self.delta_tangents.len())
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawBlendShape {
    pub name: String,
    pub frames: Vec<RawBlendShapeFrame>,
}

/// An immutable snapshot of an authored mesh. All vectors are in the authoring tool's coordinate system (left
/// handed, Y up) and indexed per vertex, except the index buffer, the sub meshes, the bone weights (which are
/// flattened according to `bones_per_vertex`) and the skeleton data.
#[derive(Clone, PartialEq, Default)]
pub struct RawMesh {
    pub positions: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    pub tangents: Vec<Vec4>,
    pub colors: Vec<[u8; 4]>,
    pub tex_coords: Vec<RawTexCoords>,
    pub indices: RawIndices,
    pub sub_meshes: Vec<RawSubMesh>,
    pub bones_per_vertex: Vec<u8>,
    pub bone_weights: Vec<RawBoneWeight>,
    pub bind_poses: Vec<Mat4>,
    /// Either empty (flat skeleton) or one entry per bind pose.
    pub joint_parents: Vec<Option<u32>>,
    pub blend_shapes: Vec<RawBlendShape>,
}

impl Debug for RawMesh {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{ positions: [{}], ", self.positions.len())?;
        write!(f, "normals: [{}], ", self.normals.len())?;
        write!(f, "tangents: [{}], ", self.tangents.len())?;
        write!(f, "colors: [{}], ", self.colors.len())?;
        write!(f, "tex_coords: {:?}, ", self.tex_coords)?;
        write!(f, "indices: {:?}, ", self.indices)?;
        write!(f, "sub_meshes: {}, ", self.sub_meshes.len())?;
        write!(f, "bone_weights: [{}], ", self.bone_weights.len())?;
        write!(f, "bind_poses: [{}], ", self.bind_poses.len())?;
        write!(f, "blend_shapes: {} }}", self.blend_shapes.len())
    }
}

impl RawMesh {
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn is_skinned(&self) -> bool {
        !self.bone_weights.is_empty()
    }

    pub fn validate(&self) -> Result<(), AuthoringError> {
        let vertex_count = self.vertex_count();

        check_length("normals", vertex_count, self.normals.len(), true)?;
        check_length("tangents", vertex_count, self.tangents.len(), true)?;
        check_length("colors", vertex_count, self.colors.len(), true)?;

        if self.tex_coords.len() > MAX_UV_CHANNELS {
            return Err(AuthoringError::TooManyUvChannels {
                count: self.tex_coords.len(),
                max: MAX_UV_CHANNELS,
            });
        }

        for channel in &self.tex_coords {
            check_length("tex_coords", vertex_count, channel.len(), false)?;
        }

        self.validate_sub_meshes()?;
        self.validate_skin()?;

        for shape in &self.blend_shapes {
            let mut previous_weight = 0.0;
            for (frame_index, frame) in shape.frames.iter().enumerate() {
                if frame.weight <= previous_weight || !frame.weight.is_finite() {
                    return Err(AuthoringError::NonAscendingFrameWeights {
                        shape: shape.name.clone(),
                        frame: frame_index,
                        weight: frame.weight,
                    });
                }
                previous_weight = frame.weight;
            }
        }

        Ok(())
    }

    fn validate_sub_meshes(&self) -> Result<(), AuthoringError> {
        let vertex_count = self.vertex_count();

        for (sub_mesh_index, sub_mesh) in self.sub_meshes.iter().enumerate() {
            if sub_mesh.topology != Topology::Triangles {
                return Err(AuthoringError::NonTriangleTopology {
                    sub_mesh: sub_mesh_index,
                    topology: sub_mesh.topology,
                });
            }

            if sub_mesh.index_count % 3 != 0 {
                return Err(AuthoringError::TruncatedTriangleList {
                    sub_mesh: sub_mesh_index,
                    index_count: sub_mesh.index_count,
                });
            }

            let start = sub_mesh.index_start as usize;
            let end = start + sub_mesh.index_count as usize;
            if end > self.indices.len() {
                return Err(AuthoringError::SubMeshOutOfRange {
                    sub_mesh: sub_mesh_index,
                    start,
                    end,
                    len: self.indices.len(),
                });
            }

            for position in start..end {
                let vertex = self.indices.get(position).unwrap_or_default() as u64 + sub_mesh.base_vertex as u64;
                if vertex >= vertex_count as u64 {
                    return Err(AuthoringError::IndexOutOfRange {
                        sub_mesh: sub_mesh_index,
                        vertex,
                        vertex_count,
                    });
                }
            }
        }

        Ok(())
    }

    fn validate_skin(&self) -> Result<(), AuthoringError> {
        if !self.bone_weights.is_empty() {
            check_length(
                "bones_per_vertex",
                self.vertex_count(),
                self.bones_per_vertex.len(),
                false,
            )?;

            let expected: usize = self
                .bones_per_vertex
                .iter()
                .map(|&count| count as usize)
                .sum();
            if expected != self.bone_weights.len() {
                return Err(AuthoringError::BoneWeightCountMismatch {
                    expected,
                    actual: self.bone_weights.len(),
                });
            }

            if self.bind_poses.is_empty() {
                return Err(AuthoringError::MissingBindPoses);
            }

            let mut weight_index = 0;
            for (vertex, &count) in self.bones_per_vertex.iter().enumerate() {
                for weight in &self.bone_weights[weight_index..weight_index + count as usize] {
                    if weight.joint_index as usize >= self.bind_poses.len() {
                        return Err(AuthoringError::JointIndexOutOfRange {
                            vertex,
                            joint: weight.joint_index,
                            joint_count: self.bind_poses.len(),
                        });
                    }
                }
                weight_index += count as usize;
            }
        }

        if !self.joint_parents.is_empty() {
            check_length(
                "joint_parents",
                self.bind_poses.len(),
                self.joint_parents.len(),
                false,
            )?;

            for (joint, parent) in self.joint_parents.iter().enumerate() {
                if let Some(parent) = *parent {
                    if parent as usize >= joint {
                        return Err(AuthoringError::InvalidJointParent { joint, parent });
                    }
                }
            }
        }

        Ok(())
    }
}

#[inline]
fn check_length(
    attribute: &'static str,
    expected: usize,
    actual: usize,
    may_be_empty: bool,
) -> Result<(), AuthoringError> {
    if actual == expected || (may_be_empty && actual == 0) {
        Ok(())
    } else {
        Err(AuthoringError::AttributeLengthMismatch {
            attribute,
            expected,
            actual,
        })
    }
}
