use glam::{Vec3, Vec4};
use itertools::Itertools;
use meshsync_authoring::native::{NativeMesh, VertexAttribute, VertexAttributeDescriptor, VertexFormat};

use crate::rendering::asset_graph::mesh_asset::MeshContents;
use crate::rendering::common::coordinate_systems;
use crate::rendering::common::types::{Aabb, MeshPart, RenderMesh};
use crate::rendering::common::vertex_layout::{AttributeFormat, LayoutWriter, VertexAttributeLayout, VertexSemantic};
use crate::rendering::errors::MeshError;

/// What the renderer has to allocate for a native mesh, known before any vertex data has been copied.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NativeLayoutDescriptor {
    pub layout: VertexAttributeLayout,
    pub vertex_capacity: usize,
    pub index_capacity: usize,
}

/// Reads attribute streams the way the authoring engine stores them on the GPU. Every stream of the native mesh
/// becomes the layout slot with the same index.
pub enum NativeImporter {}

impl NativeImporter {
    pub fn describe(native: &NativeMesh) -> Result<NativeLayoutDescriptor, MeshError> {
        native.validate()?;

        let mut layout = VertexAttributeLayout::new();
        for descriptor in &native.attributes {
            let slot = descriptor.stream as usize;
            match descriptor.attribute {
                VertexAttribute::Position | VertexAttribute::Normal => {
                    Self::require_float(descriptor, Some(3))?;
                    let semantic = if descriptor.attribute == VertexAttribute::Position {
                        VertexSemantic::Position
                    } else {
                        VertexSemantic::Normal
                    };
                    layout.push(slot, semantic, AttributeFormat::Float3);
                }
                VertexAttribute::Tangent => {
                    Self::require_float(descriptor, Some(4))?;
                    // the handedness sign is consumed into an explicit bitangent
                    layout
                        .push(slot, VertexSemantic::Tangent, AttributeFormat::Float3)
                        .push(slot, VertexSemantic::Bitangent, AttributeFormat::Float3);
                }
                VertexAttribute::Color => {
                    Self::require_float(descriptor, None)?;
                    layout.push(slot, VertexSemantic::Color, Self::format_of(descriptor));
                }
                VertexAttribute::TexCoord(channel) => {
                    Self::require_float(descriptor, None)?;
                    layout.push(slot, VertexSemantic::TexCoord(channel), Self::format_of(descriptor));
                }
                VertexAttribute::BlendWeight | VertexAttribute::BlendIndices => {
                    log::trace!("Skipping native {:?} stream data", descriptor.attribute);
                }
            }
        }

        Ok(NativeLayoutDescriptor {
            layout,
            vertex_capacity: native.vertex_count as usize,
            index_capacity: native.index_capacity(),
        })
    }

    /// Copies all vertex and index data into the layout obtained from [`NativeImporter::describe`].
    pub fn import(native: &NativeMesh, descriptor: NativeLayoutDescriptor) -> Result<MeshContents, MeshError> {
        profiling::scope!("NativeImporter::import");
        let vertex_count = native.vertex_count as usize;
        let source_offsets = Self::source_offsets(native);
        let normal_source = native
            .attributes
            .iter()
            .zip(&source_offsets)
            .find(|(attr, _)| attr.attribute == VertexAttribute::Normal);

        let mut positions = Vec::with_capacity(vertex_count);
        let mut writer = LayoutWriter::new(&descriptor.layout, vertex_count);
        let mut components = [0.0f32; 4];

        for vertex in 0..vertex_count {
            for (attr, &offset) in native.attributes.iter().zip(&source_offsets) {
                let dimension = attr.dimension as usize;
                Self::read_components(native, attr, offset, vertex, &mut components);
                let values = &mut components[..dimension];

                match attr.attribute {
                    VertexAttribute::Position => {
                        let position = coordinate_systems::authoring_to_render(Vec3::from_slice(values));
                        positions.push(position);
                        writer.write(VertexSemantic::Position, vertex, position)?;
                    }
                    VertexAttribute::Normal => {
                        let normal = coordinate_systems::authoring_to_render(Vec3::from_slice(values));
                        writer.write(VertexSemantic::Normal, vertex, normal)?;
                    }
                    VertexAttribute::Tangent => {
                        let tangent = coordinate_systems::authoring_to_render_tangent(Vec4::from_slice(values));
                        let bitangent = match normal_source {
                            Some((normal_attr, &normal_offset)) => {
                                let mut normal = [0.0f32; 4];
                                Self::read_components(native, normal_attr, normal_offset, vertex, &mut normal);
                                let normal = coordinate_systems::authoring_to_render(Vec3::from_slice(&normal));
                                tangent.truncate().cross(normal) * tangent.w
                            }
                            None => Vec3::ZERO,
                        };
                        writer.write(VertexSemantic::Tangent, vertex, tangent.truncate())?;
                        writer.write(VertexSemantic::Bitangent, vertex, bitangent)?;
                    }
                    VertexAttribute::Color => {
                        writer.write_components(VertexSemantic::Color, vertex, values)?;
                    }
                    VertexAttribute::TexCoord(channel) => {
                        if dimension >= 2 {
                            values[1] = 1.0 - values[1];
                        }
                        writer.write_components(VertexSemantic::TexCoord(channel), vertex, values)?;
                    }
                    VertexAttribute::BlendWeight | VertexAttribute::BlendIndices => {}
                }
            }
        }

        let vertex_buffers = writer.finish();
        let (index_buffer, parts) = Self::index_buffer(native, descriptor.index_capacity, &positions);
        let vertex_ranges = native
            .sub_meshes
            .iter()
            .map(|sub_mesh| sub_mesh.first_vertex..sub_mesh.first_vertex + sub_mesh.vertex_count)
            .collect_vec();

        Ok(MeshContents {
            render: RenderMesh {
                layout: descriptor.layout.clone(),
                vertex_count,
                vertex_buffers,
                index_buffer,
                parts,
            },
            vertex_ranges,
            native_layout: Some(descriptor),
            ..Default::default()
        })
    }

    fn require_float(descriptor: &VertexAttributeDescriptor, dimension: Option<u8>) -> Result<(), MeshError> {
        let dimension_matches = dimension.is_none_or(|dimension| dimension == descriptor.dimension);
        if descriptor.format != VertexFormat::Float32 || !dimension_matches {
            return Err(MeshError::UnsupportedFormat {
                attribute: descriptor.attribute,
                format: descriptor.format,
                dimension: descriptor.dimension,
            });
        }
        Ok(())
    }

    fn format_of(descriptor: &VertexAttributeDescriptor) -> AttributeFormat {
        // validation guarantees 1..=4
        AttributeFormat::from_components(descriptor.dimension as usize).unwrap_or(AttributeFormat::Float4)
    }

    /// Byte offset of every attribute within its stream, attributes are tightly packed in declaration order.
    fn source_offsets(native: &NativeMesh) -> Vec<usize> {
        let mut stream_ends = vec![0usize; native.stream_count()];
        native
            .attributes
            .iter()
            .map(|attr| {
                let end = &mut stream_ends[attr.stream as usize];
                let offset = *end;
                *end += attr.size();
                offset
            })
            .collect()
    }

    fn read_components(
        native: &NativeMesh,
        attr: &VertexAttributeDescriptor,
        offset: usize,
        vertex: usize,
        out: &mut [f32; 4],
    ) {
        let stream = attr.stream as usize;
        let start = vertex * native.stream_stride(stream) + offset;
        let bytes = &native.streams[stream][start..start + attr.size()];
        for (value, chunk) in out.iter_mut().zip(bytes.chunks_exact(size_of::<f32>())) {
            *value = f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        }
    }

    /// Sub meshes keep their index offsets, so the buffer is sized to the largest index range end.
    fn index_buffer(native: &NativeMesh, index_capacity: usize, positions: &[Vec3]) -> (Vec<u32>, Vec<MeshPart>) {
        let mut indices = vec![0u32; index_capacity];
        let mut parts = Vec::with_capacity(native.sub_meshes.len());

        for (material_index, sub_mesh) in native.sub_meshes.iter().enumerate() {
            let start = sub_mesh.index_start as usize;
            let mut bounds = Aabb::EMPTY;

            for first in (start..start + sub_mesh.index_count as usize).step_by(3) {
                let triangle =
                    [0, 1, 2].map(|corner| native.index(first + corner).unwrap_or_default() + sub_mesh.base_vertex);
                for &vertex in &triangle {
                    if let Some(position) = positions.get(vertex as usize) {
                        bounds = bounds.extended(*position);
                    }
                }
                indices[first..first + 3].copy_from_slice(&coordinate_systems::flip_winding(triangle));
            }

            parts.push(MeshPart {
                index_offset: sub_mesh.index_start,
                index_count: sub_mesh.index_count,
                material_index: material_index as u32,
                bounds,
            });
        }

        (indices, parts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rendering::common::vertex_layout::LayoutReader;
    use glam::Vec2;
    use meshsync_authoring::mesh::Topology;
    use meshsync_authoring::native::{IndexFormat, NativeSubMesh};

    fn descriptor(attribute: VertexAttribute, dimension: u8, stream: u8) -> VertexAttributeDescriptor {
        VertexAttributeDescriptor {
            attribute,
            format: VertexFormat::Float32,
            dimension,
            stream,
        }
    }

    fn floats(values: &[f32]) -> Vec<u8> {
        values.iter().flat_map(|value| value.to_le_bytes()).collect()
    }

    /// One triangle: position and tangent interleaved in stream 0, normal and uv in stream 1.
    fn triangle() -> NativeMesh {
        NativeMesh {
            vertex_count: 3,
            attributes: vec![
                descriptor(VertexAttribute::Position, 3, 0),
                descriptor(VertexAttribute::Tangent, 4, 0),
                descriptor(VertexAttribute::Normal, 3, 1),
                descriptor(VertexAttribute::TexCoord(0), 2, 1),
            ],
            streams: vec![
                floats(&[
                    0.0, 0.0, 1.0, 1.0, 0.0, 0.0, 1.0, //
                    1.0, 0.0, 1.0, 1.0, 0.0, 0.0, 1.0, //
                    0.0, 1.0, 1.0, 1.0, 0.0, 0.0, 1.0,
                ]),
                floats(&[
                    0.0, 0.0, -1.0, 0.0, 0.0, //
                    0.0, 0.0, -1.0, 1.0, 0.0, //
                    0.0, 0.0, -1.0, 0.0, 1.0,
                ]),
            ],
            index_format: IndexFormat::U16,
            index_data: [7u16, 7, 7, 0, 1, 2]
                .iter()
                .flat_map(|index| index.to_le_bytes())
                .collect(),
            sub_meshes: vec![NativeSubMesh {
                index_start: 3,
                index_count: 3,
                base_vertex: 0,
                first_vertex: 0,
                vertex_count: 3,
                topology: Topology::Triangles,
            }],
        }
    }

    #[test]
    pub fn describe_reports_capacities() -> Result<(), anyhow::Error> {
        let descriptor = NativeImporter::describe(&triangle())?;
        assert_eq!(descriptor.vertex_capacity, 3);
        assert_eq!(descriptor.index_capacity, 6);
        assert_eq!(descriptor.layout.slot_count(), 2);
        // position, tangent and the derived bitangent
        assert_eq!(descriptor.layout.stride(0), 36);
        assert!(descriptor.layout.contains(VertexSemantic::Bitangent));
        Ok(())
    }

    #[test]
    pub fn streams_are_transferred() -> Result<(), anyhow::Error> {
        let native = triangle();
        let descriptor = NativeImporter::describe(&native)?;
        let contents = NativeImporter::import(&native, descriptor)?;
        let render = &contents.render;

        // offsets are kept, the winding is flipped
        assert_eq!(render.index_buffer, vec![0, 0, 0, 0, 2, 1]);
        assert_eq!(render.parts[0].index_offset, 3);
        assert_eq!(contents.vertex_ranges, vec![0..3]);
        assert!(contents.native_layout.is_some());

        let reader = LayoutReader::new(&render.layout, 3, &render.vertex_buffers)?;
        assert_eq!(reader.read::<Vec3>(VertexSemantic::Position, 1)?, Vec3::new(1.0, 0.0, -1.0));
        assert_eq!(reader.read::<Vec3>(VertexSemantic::Normal, 1)?, Vec3::Z);
        assert_eq!(reader.read::<Vec2>(VertexSemantic::TexCoord(0), 2)?, Vec2::new(0.0, 0.0));
        // cross(+X, +Z) = -Y
        assert_eq!(reader.read::<Vec3>(VertexSemantic::Bitangent, 0)?, Vec3::NEG_Y);
        Ok(())
    }

    #[test]
    pub fn non_float_attributes_are_rejected() {
        let mut native = triangle();
        native.attributes[3].format = VertexFormat::Float16;
        native.streams[1] = vec![0; 3 * 16];

        assert_eq!(
            NativeImporter::describe(&native),
            Err(MeshError::UnsupportedFormat {
                attribute: VertexAttribute::TexCoord(0),
                format: VertexFormat::Float16,
                dimension: 2,
            })
        );
    }
}
