use glam::{Vec2, Vec3, Vec4};
use itertools::Itertools;
use meshsync_authoring::mesh::{RawMesh, RawTexCoords};

use crate::rendering::asset_graph::mesh_asset::MeshContents;
use crate::rendering::blend_shapes::BlendShapeSet;
use crate::rendering::common::coordinate_systems;
use crate::rendering::common::types::{Aabb, JointInfluence, JointInfluences, MeshPart, RenderMesh, Skeleton, SkinBinding};
use crate::rendering::common::vertex_layout::{AttributeFormat, LayoutWriter, VertexAttributeLayout, VertexSemantic};
use crate::rendering::errors::MeshError;

/// The layout slot holding everything the deformation kernels write.
pub const DEFORMABLE_SLOT: usize = 0;
/// The layout slot holding color and texture coordinates, which deformation never touches.
pub const FIXED_SLOT: usize = 1;

/// Legacy exporters smuggle normals through the fourth texture coordinate channel
const NORMAL_FALLBACK_CHANNEL: usize = 3;
/// and bitangents through the third one.
const BITANGENT_FALLBACK_CHANNEL: usize = 2;

const FALLBACK_COLOR: Vec4 = Vec4::ONE;

enum UvChannel {
    Float2(Vec<Vec2>),
    Float3(Vec<Vec3>),
    Float4(Vec<Vec4>),
}

impl UvChannel {
    fn format(&self) -> AttributeFormat {
        match self {
            UvChannel::Float2(_) => AttributeFormat::Float2,
            UvChannel::Float3(_) => AttributeFormat::Float3,
            UvChannel::Float4(_) => AttributeFormat::Float4,
        }
    }
}

/// Builds the canonical render representation of authored meshes.
pub enum MeshImporter {}

impl MeshImporter {
    pub fn import(raw: &RawMesh) -> Result<MeshContents, MeshError> {
        profiling::scope!("MeshImporter::import");
        raw.validate()?;

        let vertex_count = raw.vertex_count();
        let positions = raw
            .positions
            .iter()
            .map(|&position| coordinate_systems::authoring_to_render(position))
            .collect_vec();

        let normal_fallback = raw.normals.is_empty() && Self::float3_channel(raw, NORMAL_FALLBACK_CHANNEL).is_some();
        let normals = if !raw.normals.is_empty() {
            Some(
                raw.normals
                    .iter()
                    .map(|&normal| coordinate_systems::authoring_to_render(normal))
                    .collect_vec(),
            )
        } else {
            Self::float3_channel(raw, NORMAL_FALLBACK_CHANNEL).cloned()
        };

        let bitangent_fallback =
            raw.tangents.is_empty() && Self::float3_channel(raw, BITANGENT_FALLBACK_CHANNEL).is_some();
        let (tangents, bitangents) = Self::tangent_frame(raw, normals.as_deref());

        let colors = if raw.colors.is_empty() {
            vec![FALLBACK_COLOR; vertex_count]
        } else {
            raw.colors
                .iter()
                .map(|color| Vec4::from_array(color.map(|channel| channel as f32 / 255.0)))
                .collect_vec()
        };

        let uv_channels = raw
            .tex_coords
            .iter()
            .enumerate()
            .filter(|(channel, _)| {
                !(normal_fallback && *channel == NORMAL_FALLBACK_CHANNEL)
                    && !(bitangent_fallback && *channel == BITANGENT_FALLBACK_CHANNEL)
            })
            .map(|(channel, uvs)| (channel, Self::convert_uvs(channel, uvs)))
            .collect_vec();

        let mut layout = VertexAttributeLayout::new();
        layout.push(DEFORMABLE_SLOT, VertexSemantic::Position, AttributeFormat::Float3);
        if normals.is_some() {
            layout.push(DEFORMABLE_SLOT, VertexSemantic::Normal, AttributeFormat::Float3);
        }
        if tangents.is_some() {
            layout.push(DEFORMABLE_SLOT, VertexSemantic::Tangent, AttributeFormat::Float3);
        }
        if bitangents.is_some() {
            layout.push(DEFORMABLE_SLOT, VertexSemantic::Bitangent, AttributeFormat::Float3);
        }
        layout.push(FIXED_SLOT, VertexSemantic::Color, AttributeFormat::Float4);
        for (channel, uvs) in &uv_channels {
            layout.push(FIXED_SLOT, VertexSemantic::TexCoord(*channel as u8), uvs.format());
        }

        let mut writer = LayoutWriter::new(&layout, vertex_count);
        writer.write_all(VertexSemantic::Position, &positions)?;
        if let Some(normals) = &normals {
            writer.write_all(VertexSemantic::Normal, normals)?;
        }
        if let Some(tangents) = &tangents {
            writer.write_all(VertexSemantic::Tangent, tangents)?;
        }
        if let Some(bitangents) = &bitangents {
            writer.write_all(VertexSemantic::Bitangent, bitangents)?;
        }
        writer.write_all(VertexSemantic::Color, &colors)?;
        for (channel, uvs) in &uv_channels {
            let semantic = VertexSemantic::TexCoord(*channel as u8);
            match uvs {
                UvChannel::Float2(uvs) => writer.write_all(semantic, uvs)?,
                UvChannel::Float3(uvs) => writer.write_all(semantic, uvs)?,
                UvChannel::Float4(uvs) => writer.write_all(semantic, uvs)?,
            }
        }
        let vertex_buffers = writer.finish();

        let (index_buffer, parts) = Self::index_buffer(raw, &positions);

        Ok(MeshContents {
            render: RenderMesh {
                layout,
                vertex_count,
                vertex_buffers,
                index_buffer,
                parts,
            },
            blend_shapes: BlendShapeSet::from_raw(&raw.blend_shapes),
            skin: Self::skin(raw),
            vertex_ranges: vec![],
            native_layout: None,
        })
    }

    fn float3_channel(raw: &RawMesh, channel: usize) -> Option<&Vec<Vec3>> {
        match raw.tex_coords.get(channel) {
            Some(RawTexCoords::Float3(values)) => Some(values),
            _ => None,
        }
    }

    fn tangent_frame(raw: &RawMesh, normals: Option<&[Vec3]>) -> (Option<Vec<Vec3>>, Option<Vec<Vec3>>) {
        if raw.tangents.is_empty() {
            return (
                None,
                Self::float3_channel(raw, BITANGENT_FALLBACK_CHANNEL).cloned(),
            );
        }

        let tangents = raw
            .tangents
            .iter()
            .map(|&tangent| coordinate_systems::authoring_to_render_tangent(tangent))
            .collect_vec();

        // Without normals, there is nothing to derive the bitangent from.
        let bitangents = normals.map(|normals| {
            tangents
                .iter()
                .zip(normals)
                .map(|(tangent, normal)| tangent.truncate().cross(*normal) * tangent.w)
                .collect_vec()
        });

        (
            Some(tangents.iter().map(|tangent| tangent.truncate()).collect_vec()),
            bitangents,
        )
    }

    fn convert_uvs(channel: usize, uvs: &RawTexCoords) -> UvChannel {
        // The first channel is always two dimensional, the others keep their width.
        if channel == 0 {
            let truncated = match uvs {
                RawTexCoords::Float2(uvs) => uvs.clone(),
                RawTexCoords::Float3(uvs) => uvs.iter().map(|uv| uv.truncate()).collect_vec(),
                RawTexCoords::Float4(uvs) => uvs.iter().map(|uv| uv.truncate().truncate()).collect_vec(),
            };

            return UvChannel::Float2(
                truncated
                    .into_iter()
                    .map(coordinate_systems::authoring_to_render_uv)
                    .collect_vec(),
            );
        }

        match uvs {
            RawTexCoords::Float2(uvs) => UvChannel::Float2(
                uvs.iter()
                    .map(|&uv| coordinate_systems::authoring_to_render_uv(uv))
                    .collect_vec(),
            ),
            RawTexCoords::Float3(uvs) => UvChannel::Float3(
                uvs.iter()
                    .map(|&uv| coordinate_systems::authoring_to_render_uv3(uv))
                    .collect_vec(),
            ),
            RawTexCoords::Float4(uvs) => UvChannel::Float4(
                uvs.iter()
                    .map(|&uv| coordinate_systems::authoring_to_render_uv4(uv))
                    .collect_vec(),
            ),
        }
    }

    fn index_buffer(raw: &RawMesh, positions: &[Vec3]) -> (Vec<u32>, Vec<MeshPart>) {
        let index_count = raw
            .sub_meshes
            .iter()
            .map(|sub_mesh| sub_mesh.index_count as usize)
            .sum();
        let mut indices = Vec::<u32>::with_capacity(index_count);
        let mut parts = Vec::with_capacity(raw.sub_meshes.len());

        for (material_index, sub_mesh) in raw.sub_meshes.iter().enumerate() {
            let index_offset = indices.len() as u32;
            let start = sub_mesh.index_start as usize;
            let mut bounds = Aabb::EMPTY;

            for first in (start..start + sub_mesh.index_count as usize).step_by(3) {
                let triangle = [0, 1, 2]
                    .map(|corner| raw.indices.get(first + corner).unwrap_or_default() + sub_mesh.base_vertex);

                for &vertex in &triangle {
                    bounds = bounds.extended(positions[vertex as usize]);
                }
                indices.extend_from_slice(&coordinate_systems::flip_winding(triangle));
            }

            parts.push(MeshPart {
                index_offset,
                index_count: sub_mesh.index_count,
                material_index: material_index as u32,
                bounds,
            });
        }

        (indices, parts)
    }

    fn skin(raw: &RawMesh) -> Option<SkinBinding> {
        if !raw.is_skinned() {
            return None;
        }

        let per_vertex = raw.bones_per_vertex.iter().copied().max().unwrap_or(0) as usize;
        let mut influences = Vec::with_capacity(per_vertex * raw.vertex_count());
        let mut cursor = 0;
        for &count in &raw.bones_per_vertex {
            let count = count as usize;
            influences.extend(
                raw.bone_weights[cursor..cursor + count]
                    .iter()
                    .map(|bone_weight| JointInfluence {
                        joint_index: bone_weight.joint_index,
                        weight: bone_weight.weight,
                    }),
            );
            // GPU records are fixed width, pad with joint 0 at zero weight
            influences.extend(itertools::repeat_n(JointInfluence::default(), per_vertex - count));
            cursor += count;
        }

        let parents = if raw.joint_parents.is_empty() {
            vec![None; raw.bind_poses.len()]
        } else {
            raw.joint_parents
                .iter()
                .map(|parent| parent.map(|parent| parent as usize))
                .collect_vec()
        };

        Some(SkinBinding {
            influences: JointInfluences {
                per_vertex,
                influences,
            },
            skeleton: Skeleton {
                parents,
                inverse_bind_poses: raw
                    .bind_poses
                    .iter()
                    .map(|&bind_pose| coordinate_systems::authoring_to_render_matrix(bind_pose))
                    .collect_vec(),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rendering::common::vertex_layout::LayoutReader;
    use glam::Mat4;
    use meshsync_authoring::AuthoringError;
    use meshsync_authoring::mesh::{RawBoneWeight, RawIndices, RawSubMesh, Topology};

    fn quad() -> RawMesh {
        RawMesh {
            positions: vec![
                Vec3::new(0.0, 0.0, 1.0),
                Vec3::new(1.0, 0.0, 1.0),
                Vec3::new(1.0, 1.0, 1.0),
                Vec3::new(0.0, 1.0, 1.0),
            ],
            indices: RawIndices::U16(vec![0, 1, 2, 0, 2, 3]),
            sub_meshes: vec![RawSubMesh {
                index_start: 0,
                index_count: 6,
                base_vertex: 0,
                topology: Topology::Triangles,
            }],
            ..Default::default()
        }
    }

    #[test]
    pub fn positions_and_winding_are_converted() -> Result<(), anyhow::Error> {
        let contents = MeshImporter::import(&quad())?;
        let render = &contents.render;

        assert_eq!(render.vertex_count, 4);
        assert_eq!(render.index_buffer, vec![0, 2, 1, 0, 3, 2]);
        assert_eq!(render.parts.len(), 1);
        assert_eq!(render.parts[0].bounds.min, Vec3::new(0.0, 0.0, -1.0));

        let reader = LayoutReader::new(&render.layout, 4, &render.vertex_buffers)?;
        assert_eq!(
            reader.read::<Vec3>(VertexSemantic::Position, 2)?,
            Vec3::new(1.0, 1.0, -1.0)
        );
        // No colors: every vertex still gets opaque white
        assert_eq!(reader.read::<Vec4>(VertexSemantic::Color, 3)?, Vec4::ONE);
        Ok(())
    }

    #[test]
    pub fn base_vertex_offsets_indices() -> Result<(), anyhow::Error> {
        let mut raw = quad();
        raw.indices = RawIndices::U32(vec![0, 1, 2]);
        raw.sub_meshes = vec![RawSubMesh {
            index_start: 0,
            index_count: 3,
            base_vertex: 1,
            topology: Topology::Triangles,
        }];

        let contents = MeshImporter::import(&raw)?;
        assert_eq!(contents.render.index_buffer, vec![1, 3, 2]);
        Ok(())
    }

    #[test]
    pub fn first_uv_channel_is_always_two_dimensional() -> Result<(), anyhow::Error> {
        let mut raw = quad();
        raw.tex_coords = vec![
            RawTexCoords::Float4(vec![Vec4::new(0.25, 0.25, 9.0, 9.0); 4]),
            RawTexCoords::Float3(vec![Vec3::new(0.5, 0.0, 2.0); 4]),
        ];

        let contents = MeshImporter::import(&raw)?;
        let layout = &contents.render.layout;
        assert_eq!(
            layout.attribute(VertexSemantic::TexCoord(0)).map(|attr| attr.format),
            Some(AttributeFormat::Float2)
        );
        assert_eq!(
            layout.attribute(VertexSemantic::TexCoord(1)).map(|attr| attr.format),
            Some(AttributeFormat::Float3)
        );
        assert_eq!(layout.uv_set_count(), 2);

        let reader = LayoutReader::new(layout, 4, &contents.render.vertex_buffers)?;
        assert_eq!(
            reader.read::<Vec2>(VertexSemantic::TexCoord(0), 0)?,
            Vec2::new(0.25, 0.75)
        );
        assert_eq!(
            reader.read::<Vec3>(VertexSemantic::TexCoord(1), 0)?,
            Vec3::new(0.5, 1.0, 2.0)
        );
        Ok(())
    }

    #[test]
    pub fn fourth_uv_channel_substitutes_missing_normals() -> Result<(), anyhow::Error> {
        let mut raw = quad();
        raw.tex_coords = vec![
            RawTexCoords::Float2(vec![Vec2::ZERO; 4]),
            RawTexCoords::Float2(vec![Vec2::ZERO; 4]),
            RawTexCoords::Float2(vec![Vec2::ZERO; 4]),
            RawTexCoords::Float3(vec![Vec3::Y; 4]),
        ];

        let contents = MeshImporter::import(&raw)?;
        let layout = &contents.render.layout;
        assert!(layout.contains(VertexSemantic::Normal));
        assert!(!layout.contains(VertexSemantic::TexCoord(3)));
        assert!(layout.contains(VertexSemantic::TexCoord(2)));

        let reader = LayoutReader::new(layout, 4, &contents.render.vertex_buffers)?;
        assert_eq!(reader.read::<Vec3>(VertexSemantic::Normal, 1)?, Vec3::Y);
        Ok(())
    }

    #[test]
    pub fn bitangents_follow_the_tangent_sign() -> Result<(), anyhow::Error> {
        let mut raw = quad();
        raw.normals = vec![Vec3::new(0.0, 0.0, -1.0); 4];
        raw.tangents = vec![Vec4::new(1.0, 0.0, 0.0, -1.0); 4];

        let contents = MeshImporter::import(&raw)?;
        let reader = LayoutReader::new(&contents.render.layout, 4, &contents.render.vertex_buffers)?;

        // converted normal is +Z, cross(+X, +Z) = -Y, flipped by w
        assert_eq!(reader.read::<Vec3>(VertexSemantic::Normal, 0)?, Vec3::Z);
        assert_eq!(reader.read::<Vec3>(VertexSemantic::Bitangent, 0)?, Vec3::Y);
        Ok(())
    }

    #[test]
    pub fn joint_influences_are_padded() -> Result<(), anyhow::Error> {
        let mut raw = quad();
        raw.bones_per_vertex = vec![1, 2, 0, 1];
        raw.bone_weights = vec![
            RawBoneWeight {
                joint_index: 1,
                weight: 1.0,
            },
            RawBoneWeight {
                joint_index: 0,
                weight: 0.75,
            },
            RawBoneWeight {
                joint_index: 1,
                weight: 0.25,
            },
            RawBoneWeight {
                joint_index: 1,
                weight: 1.0,
            },
        ];
        raw.bind_poses = vec![Mat4::IDENTITY, Mat4::from_translation(Vec3::new(0.0, 0.0, 2.0))];

        let contents = MeshImporter::import(&raw)?;
        let skin = contents.skin.expect("skinned");
        assert_eq!(skin.influences.per_vertex, 2);
        assert_eq!(skin.influences.influences.len(), 8);
        assert_eq!(
            skin.influences.of_vertex(0),
            &[
                JointInfluence {
                    joint_index: 1,
                    weight: 1.0
                },
                JointInfluence::default()
            ]
        );
        assert_eq!(skin.influences.of_vertex(2), &[JointInfluence::default(); 2]);
        assert_eq!(skin.skeleton.parents, vec![None, None]);
        assert_eq!(
            skin.skeleton.inverse_bind_poses[1],
            Mat4::from_translation(Vec3::new(0.0, 0.0, -2.0))
        );
        Ok(())
    }

    #[test]
    pub fn configuration_errors_are_reported() {
        let mut raw = quad();
        raw.sub_meshes[0].topology = Topology::Lines;
        assert_eq!(
            MeshImporter::import(&raw),
            Err(MeshError::Authoring(AuthoringError::NonTriangleTopology {
                sub_mesh: 0,
                topology: Topology::Lines
            }))
        );
    }
}
