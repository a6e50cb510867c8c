use std::fmt::{Debug, Formatter};

use crate::mesh::Topology;
use crate::{AuthoringError, MAX_UV_CHANNELS};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum VertexAttribute {
    Position,
    Normal,
    Tangent,
    Color,
    TexCoord(u8),
    BlendWeight,
    BlendIndices,
}

impl VertexAttribute {
    pub fn uv_index(&self) -> Option<usize> {
        match self {
            VertexAttribute::TexCoord(index) => Some(*index as usize),
            _ => None,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum VertexFormat {
    Float32,
    Float16,
    UNorm8,
    SNorm8,
    UNorm16,
    SNorm16,
    UInt8,
    SInt8,
    UInt16,
    SInt16,
    UInt32,
    SInt32,
}

impl VertexFormat {
    pub fn bytes_per_element(&self) -> usize {
        match self {
            VertexFormat::UNorm8 | VertexFormat::SNorm8 | VertexFormat::UInt8 | VertexFormat::SInt8 => 1,
            VertexFormat::Float16
            | VertexFormat::UNorm16
            | VertexFormat::SNorm16
            | VertexFormat::UInt16
            | VertexFormat::SInt16 => 2,
            VertexFormat::Float32 | VertexFormat::UInt32 | VertexFormat::SInt32 => 4,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct VertexAttributeDescriptor {
    pub attribute: VertexAttribute,
    pub format: VertexFormat,
    pub dimension: u8,
    pub stream: u8,
}

impl VertexAttributeDescriptor {
    pub fn size(&self) -> usize {
        self.format.bytes_per_element() * self.dimension as usize
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum IndexFormat {
    U16,
    #[default]
    U32,
}

impl IndexFormat {
    pub fn size(&self) -> usize {
        match self {
            IndexFormat::U16 => 2,
            IndexFormat::U32 => 4,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct NativeSubMesh {
    pub index_start: u32,
    pub index_count: u32,
    pub base_vertex: u32,
    pub first_vertex: u32,
    pub vertex_count: u32,
    pub topology: Topology,
}

/// A mesh as the engine keeps it in memory: interleaved vertex streams described by attribute descriptors. Within a
/// stream, attributes are tightly packed in descriptor order.
#[derive(Clone, PartialEq, Default)]
pub struct NativeMesh {
    pub vertex_count: u32,
    pub attributes: Vec<VertexAttributeDescriptor>,
    pub streams: Vec<Vec<u8>>,
    pub index_format: IndexFormat,
    pub index_data: Vec<u8>,
    pub sub_meshes: Vec<NativeSubMesh>,
}

impl Debug for NativeMesh {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{ vertex_count: {}, ", self.vertex_count)?;
        write!(f, "attributes: {:?}, ", self.attributes)?;
        write!(f, "streams: {:?}, ", self.streams.iter().map(Vec::len).collect::<Vec<_>>())?;
        write!(f, "index_format: {:?}, ", self.index_format)?;
        write!(f, "index_data: [{}], ", self.index_data.len())?;
        write!(f, "sub_meshes: {} }}", self.sub_meshes.len())
    }
}

impl NativeMesh {
    pub fn stream_count(&self) -> usize {
        self.attributes
            .iter()
            .map(|descriptor| descriptor.stream as usize + 1)
            .max()
            .unwrap_or(0)
    }

    pub fn stream_stride(&self, stream: usize) -> usize {
        self.attributes
            .iter()
            .filter(|descriptor| descriptor.stream as usize == stream)
            .map(VertexAttributeDescriptor::size)
            .sum()
    }

    /// The amount of indices that are required to serve all sub meshes.
    pub fn index_capacity(&self) -> usize {
        self.sub_meshes
            .iter()
            .map(|sub_mesh| (sub_mesh.index_start + sub_mesh.index_count) as usize)
            .max()
            .unwrap_or(0)
    }

    #[inline]
    pub fn index(&self, position: usize) -> Option<u32> {
        let size = self.index_format.size();
        let bytes = self.index_data.get(position * size..(position + 1) * size)?;
        match self.index_format {
            IndexFormat::U16 => Some(u16::from_le_bytes([bytes[0], bytes[1]]) as u32),
            IndexFormat::U32 => Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])),
        }
    }

    pub fn validate(&self) -> Result<(), AuthoringError> {
        for (position, descriptor) in self.attributes.iter().enumerate() {
            if self.attributes[..position]
                .iter()
                .any(|other| other.attribute == descriptor.attribute)
            {
                return Err(AuthoringError::DuplicateAttribute {
                    attribute: descriptor.attribute,
                });
            }

            if descriptor.dimension == 0 || descriptor.dimension > 4 {
                return Err(AuthoringError::InvalidDimension {
                    attribute: descriptor.attribute,
                    dimension: descriptor.dimension,
                });
            }

            if let Some(uv_index) = descriptor.attribute.uv_index() {
                if uv_index >= MAX_UV_CHANNELS {
                    return Err(AuthoringError::TooManyUvChannels {
                        count: uv_index + 1,
                        max: MAX_UV_CHANNELS,
                    });
                }
            }
        }

        for stream in 0..self.stream_count() {
            let expected = self.stream_stride(stream) * self.vertex_count as usize;
            let actual = self.streams.get(stream).map(Vec::len).unwrap_or(0);
            if actual < expected {
                return Err(AuthoringError::StreamTooShort {
                    stream,
                    expected,
                    actual,
                });
            }
        }

        let expected = self.index_capacity() * self.index_format.size();
        if self.index_data.len() < expected {
            return Err(AuthoringError::IndexDataTooShort {
                expected,
                actual: self.index_data.len(),
            });
        }

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
            for position in start..start + sub_mesh.index_count as usize {
                let vertex = self.index(position).unwrap_or_default() as u64 + sub_mesh.base_vertex as u64;
                if vertex >= self.vertex_count as u64 {
                    return Err(AuthoringError::IndexOutOfRange {
                        sub_mesh: sub_mesh_index,
                        vertex,
                        vertex_count: self.vertex_count as usize,
                    });
                }
            }
        }

        Ok(())
    }
}
