use bytemuck::{Pod, Zeroable};
use glam::{Vec3, Vec4};
use itertools::Itertools;

use crate::rendering::asset_graph::mesh_asset::MeshContents;
use crate::rendering::blend_shapes::BlendShapeSet;
use crate::rendering::common::types::Skeleton;
use crate::rendering::common::vertex_layout::{LayoutReader, VertexSemantic};
use crate::rendering::deformation::DeformationError;

/// Deltas with an L1 norm below this are not stored.
const ZERO_DELTA_EPSILON: f32 = 1e-6;

#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Default, Pod, Zeroable)]
pub struct BaseVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    /// w is the bitangent sign
    pub tangent: [f32; 4],
}

/// Follows the header of word offsets in the blend delta buffer.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Default, Pod, Zeroable)]
pub struct BlendDeltaRecord {
    /// Index into the flattened frames of all shapes.
    pub frame_index: i32,
    pub delta_position: [f32; 3],
    pub delta_normal: [f32; 3],
    pub delta_tangent: [f32; 3],
}

pub const BLEND_DELTA_RECORD_WORDS: usize = size_of::<BlendDeltaRecord>() / size_of::<u32>();

#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Default, Pod, Zeroable)]
pub struct PackedInfluence {
    pub joint_index: u32,
    pub weight: f32,
}

/// The normal matrix is a 3x3 matrix padded to 4x4, so both halves share the same stride on the GPU.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Default, Pod, Zeroable)]
pub struct JointPaletteEntry {
    pub model: [f32; 16],
    pub normal: [f32; 16],
}

#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Default, Pod, Zeroable)]
pub struct DeformedVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub tangent: [f32; 3],
    pub bitangent: [f32; 3],
}

/// Everything the deformation kernels need from a mesh, packed once per mesh version and shared by all instances.
pub struct DeformationInputs {
    pub vertex_count: usize,
    pub frame_count: usize,
    pub base_vertices: Vec<BaseVertex>,
    /// Header of `vertex_count + 1` offsets (in words, from the start of the buffer), then [`BlendDeltaRecord`]s.
    pub blend_deltas: Vec<u32>,
    pub influences_per_vertex: usize,
    pub influences: Vec<PackedInfluence>,
    pub skeleton: Option<Skeleton>,
}

impl std::fmt::Debug for DeformationInputs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{ vertex_count: {}, ", self.vertex_count)?;
        write!(f, "frame_count: {}, ", self.frame_count)?;
        write!(f, "blend_deltas: [{}], ", self.blend_deltas.len())?;
        write!(f, "influences: {}x{} }}", self.influences_per_vertex, self.vertex_count)
    }
}

impl DeformationInputs {
    pub fn build(contents: &MeshContents) -> Result<Self, DeformationError> {
        profiling::scope!("DeformationInputs::build");
        let render = &contents.render;
        let vertex_count = render.vertex_count;
        let reader = LayoutReader::new(&render.layout, vertex_count, &render.vertex_buffers)?;

        let positions = reader.read_all::<Vec3>(VertexSemantic::Position)?;
        let normals = reader.read_optional::<Vec3>(VertexSemantic::Normal)?;
        let tangents = reader.read_optional::<Vec3>(VertexSemantic::Tangent)?;
        let bitangents = reader.read_optional::<Vec3>(VertexSemantic::Bitangent)?;

        let base_vertices = (0..vertex_count)
            .map(|vertex| {
                let normal = normals.as_ref().map_or(Vec3::ZERO, |normals| normals[vertex]);
                let tangent = tangents.as_ref().map_or(Vec3::ZERO, |tangents| tangents[vertex]);
                let sign = match &bitangents {
                    Some(bitangents) => sign(normal.cross(tangent).dot(bitangents[vertex])),
                    None => 1.0,
                };

                BaseVertex {
                    position: positions[vertex].to_array(),
                    normal: normal.to_array(),
                    tangent: tangent.extend(sign).to_array(),
                }
            })
            .collect_vec();

        let (influences_per_vertex, influences, skeleton) = match &contents.skin {
            Some(skin) => (
                skin.influences.per_vertex,
                skin.influences
                    .influences
                    .iter()
                    .map(|influence| PackedInfluence {
                        joint_index: influence.joint_index,
                        weight: influence.weight,
                    })
                    .collect_vec(),
                Some(skin.skeleton.clone()),
            ),
            None => (0, vec![], None),
        };

        Ok(Self {
            vertex_count,
            frame_count: contents.blend_shapes.frame_count(),
            base_vertices,
            blend_deltas: pack_blend_deltas(&contents.blend_shapes, vertex_count),
            influences_per_vertex,
            influences,
            skeleton,
        })
    }

    pub fn is_skinned(&self) -> bool {
        self.skeleton.is_some() && self.influences_per_vertex > 0
    }

    pub fn joint_count(&self) -> usize {
        self.skeleton.as_ref().map_or(0, Skeleton::joint_count)
    }

    /// The blend delta records that affect `vertex`.
    pub fn deltas_of(&self, vertex: usize) -> &[BlendDeltaRecord] {
        let start = self.blend_deltas[vertex] as usize;
        let end = self.blend_deltas[vertex + 1] as usize;
        bytemuck::cast_slice(&self.blend_deltas[start..end])
    }

    pub fn influences_of(&self, vertex: usize) -> &[PackedInfluence] {
        let per_vertex = self.influences_per_vertex;
        &self.influences[vertex * per_vertex..(vertex + 1) * per_vertex]
    }
}

/// `signum`, but zero stays zero.
#[inline]
fn sign(value: f32) -> f32 {
    if value > 0.0 {
        1.0
    } else if value < 0.0 {
        -1.0
    } else {
        0.0
    }
}

#[inline]
fn is_zero_delta(delta: Vec3) -> bool {
    delta.abs().element_sum() < ZERO_DELTA_EPSILON
}

/// Packs the sparse deltas of every frame, grouped by vertex.
pub fn pack_blend_deltas(shapes: &BlendShapeSet, vertex_count: usize) -> Vec<u32> {
    let mut per_vertex = vec![Vec::<BlendDeltaRecord>::new(); vertex_count];

    for (frame_index, frame) in shapes.frames().enumerate() {
        let touched = frame
            .delta_positions
            .len()
            .max(frame.delta_normals.len())
            .max(frame.delta_tangents.len())
            .min(vertex_count);

        for (vertex, records) in per_vertex.iter_mut().enumerate().take(touched) {
            let (position, normal, tangent) = frame.delta(vertex);
            if is_zero_delta(position) && is_zero_delta(normal) && is_zero_delta(tangent) {
                continue;
            }

            records.push(BlendDeltaRecord {
                frame_index: frame_index as i32,
                delta_position: position.to_array(),
                delta_normal: normal.to_array(),
                delta_tangent: tangent.to_array(),
            });
        }
    }

    let header_len = vertex_count + 1;
    let record_count: usize = per_vertex.iter().map(Vec::len).sum();
    let mut words = Vec::with_capacity(header_len + record_count * BLEND_DELTA_RECORD_WORDS);

    let mut offset = header_len;
    words.push(offset as u32);
    for records in &per_vertex {
        offset += records.len() * BLEND_DELTA_RECORD_WORDS;
        words.push(offset as u32);
    }

    for records in &per_vertex {
        words.extend_from_slice(bytemuck::cast_slice::<BlendDeltaRecord, u32>(records.as_slice()));
    }

    words
}

impl DeformedVertex {
    pub fn new(position: Vec3, normal: Vec3, tangent: Vec4) -> Self {
        let tangent_xyz = tangent.truncate();
        Self {
            position: position.to_array(),
            normal: normal.to_array(),
            tangent: tangent_xyz.to_array(),
            bitangent: (normal.cross(tangent_xyz) * tangent.w).to_array(),
        }
    }

    pub fn position(&self) -> Vec3 {
        Vec3::from_array(self.position)
    }

    pub fn normal(&self) -> Vec3 {
        Vec3::from_array(self.normal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rendering::blend_shapes::{BlendShape, BlendShapeFrame};

    #[test]
    pub fn record_sizes_match_the_shader() {
        assert_eq!(size_of::<BaseVertex>(), 40);
        assert_eq!(size_of::<BlendDeltaRecord>(), 40);
        assert_eq!(BLEND_DELTA_RECORD_WORDS, 10);
        assert_eq!(size_of::<PackedInfluence>(), 8);
        assert_eq!(size_of::<JointPaletteEntry>(), 128);
        assert_eq!(size_of::<DeformedVertex>(), 48);
    }

    #[test]
    pub fn zero_deltas_are_omitted() {
        let shapes = BlendShapeSet {
            shapes: vec![
                BlendShape {
                    name: "a".to_string(),
                    frames: vec![BlendShapeFrame {
                        weight: 1.0,
                        delta_positions: vec![Vec3::ZERO, Vec3::X, Vec3::ZERO],
                        ..Default::default()
                    }],
                },
                BlendShape {
                    name: "b".to_string(),
                    frames: vec![BlendShapeFrame {
                        weight: 1.0,
                        delta_positions: vec![Vec3::ZERO, Vec3::ZERO, Vec3::ZERO],
                        delta_normals: vec![Vec3::ZERO, Vec3::Y],
                        ..Default::default()
                    }],
                },
            ],
        };

        let words = pack_blend_deltas(&shapes, 3);
        // header, then two records for vertex 1
        assert_eq!(&words[..4], &[4, 4, 24, 24]);
        assert_eq!(words.len(), 24);

        let records: &[BlendDeltaRecord] = bytemuck::cast_slice(&words[4..24]);
        assert_eq!(records[0].frame_index, 0);
        assert_eq!(records[0].delta_position, [1.0, 0.0, 0.0]);
        assert_eq!(records[1].frame_index, 1);
        assert_eq!(records[1].delta_normal, [0.0, 1.0, 0.0]);
    }

    #[test]
    pub fn sign_keeps_zero() {
        assert_eq!(sign(0.0), 0.0);
        assert_eq!(sign(-0.5), -1.0);
        assert_eq!(sign(3.0), 1.0);
    }
}
