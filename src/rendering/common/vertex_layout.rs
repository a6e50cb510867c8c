use std::fmt::{Debug, Formatter};

use glam::{Vec2, Vec3, Vec4};
use thiserror::Error;

/// Declaration order is the canonical attribute order within a buffer slot.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum VertexSemantic {
    Position,
    Normal,
    Tangent,
    Bitangent,
    Color,
    TexCoord(u8),
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum AttributeFormat {
    Float,
    Float2,
    Float3,
    Float4,
}

impl AttributeFormat {
    pub fn from_components(components: usize) -> Option<Self> {
        match components {
            1 => Some(AttributeFormat::Float),
            2 => Some(AttributeFormat::Float2),
            3 => Some(AttributeFormat::Float3),
            4 => Some(AttributeFormat::Float4),
            _ => None,
        }
    }

    #[inline]
    pub fn components(&self) -> usize {
        match self {
            AttributeFormat::Float => 1,
            AttributeFormat::Float2 => 2,
            AttributeFormat::Float3 => 3,
            AttributeFormat::Float4 => 4,
        }
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.components() * size_of::<f32>()
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct AttributeLayout {
    pub semantic: VertexSemantic,
    pub format: AttributeFormat,
    pub slot: usize,
    pub offset: usize,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LayoutError {
    #[error("The layout has no {0:?} attribute")]
    MissingAttribute(VertexSemantic),

    #[error("{semantic:?} is laid out as {actual:?}, but was accessed as {expected:?}")]
    FormatMismatch {
        semantic: VertexSemantic,
        expected: AttributeFormat,
        actual: AttributeFormat,
    },

    #[error("Vertex {vertex} is out of range, the buffer holds {vertex_count} vertices")]
    VertexOutOfRange { vertex: usize, vertex_count: usize },

    #[error("Slot {slot} holds {actual} bytes, but {expected} are required")]
    BufferTooShort {
        slot: usize,
        expected: usize,
        actual: usize,
    },
}

/// Where every attribute lives: (semantic, format, slot, offset) plus the stride of each slot.
/// Attributes are appended to the end of their slot, so slots never contain gaps.
#[derive(Clone, PartialEq, Eq, Hash, Default)]
pub struct VertexAttributeLayout {
    attributes: Vec<AttributeLayout>,
    strides: Vec<usize>,
}

impl Debug for VertexAttributeLayout {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(
                self.attributes
                    .iter()
                    .map(|attr| (attr.semantic, attr.format, attr.slot, attr.offset)),
            )
            .finish()?;
        write!(f, " strides: {:?}", self.strides)
    }
}

impl VertexAttributeLayout {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, slot: usize, semantic: VertexSemantic, format: AttributeFormat) -> &mut Self {
        if self.strides.len() <= slot {
            self.strides.resize(slot + 1, 0);
        }

        self.attributes.push(AttributeLayout {
            semantic,
            format,
            slot,
            offset: self.strides[slot],
        });
        self.strides[slot] += format.size();
        self
    }

    pub fn attributes(&self) -> &[AttributeLayout] {
        &self.attributes
    }

    pub fn attribute(&self, semantic: VertexSemantic) -> Option<&AttributeLayout> {
        self.attributes
            .iter()
            .find(|attr| attr.semantic == semantic)
    }

    pub fn contains(&self, semantic: VertexSemantic) -> bool {
        self.attribute(semantic).is_some()
    }

    pub fn slot_count(&self) -> usize {
        self.strides.len()
    }

    pub fn stride(&self, slot: usize) -> usize {
        self.strides.get(slot).copied().unwrap_or(0)
    }

    pub fn buffer_len(&self, slot: usize, vertex_count: usize) -> usize {
        self.stride(slot) * vertex_count
    }

    /// The attributes of one slot, moved into another slot of a new layout. Used to share the fixed attribute
    /// buffer between a mesh and its deformed instances.
    pub fn extract_slot(&self, slot: usize, target_slot: usize, target: &mut VertexAttributeLayout) {
        for attr in self.attributes.iter().filter(|attr| attr.slot == slot) {
            target.push(target_slot, attr.semantic, attr.format);
        }
    }

    pub fn uv_set_count(&self) -> usize {
        self.attributes
            .iter()
            .filter_map(|attr| match attr.semantic {
                VertexSemantic::TexCoord(index) => Some(index as usize + 1),
                _ => None,
            })
            .max()
            .unwrap_or(0)
    }

    fn locate(&self, semantic: VertexSemantic, components: usize) -> Result<&AttributeLayout, LayoutError> {
        let attr = self
            .attribute(semantic)
            .ok_or(LayoutError::MissingAttribute(semantic))?;

        if attr.format.components() != components {
            return Err(LayoutError::FormatMismatch {
                semantic,
                expected: AttributeFormat::from_components(components).unwrap_or(AttributeFormat::Float4),
                actual: attr.format,
            });
        }

        Ok(attr)
    }
}

/// Values that can be stored in an attribute slot.
pub trait AttributeValue: Copy {
    const FORMAT: AttributeFormat;

    fn write_to(&self, target: &mut [f32]);
    fn read_from(source: &[f32]) -> Self;
}

impl AttributeValue for f32 {
    const FORMAT: AttributeFormat = AttributeFormat::Float;

    fn write_to(&self, target: &mut [f32]) {
        target[0] = *self;
    }

    fn read_from(source: &[f32]) -> Self {
        source[0]
    }
}

impl AttributeValue for Vec2 {
    const FORMAT: AttributeFormat = AttributeFormat::Float2;

    fn write_to(&self, target: &mut [f32]) {
        target.copy_from_slice(&self.to_array());
    }

    fn read_from(source: &[f32]) -> Self {
        Vec2::from_slice(source)
    }
}

impl AttributeValue for Vec3 {
    const FORMAT: AttributeFormat = AttributeFormat::Float3;

    fn write_to(&self, target: &mut [f32]) {
        target.copy_from_slice(&self.to_array());
    }

    fn read_from(source: &[f32]) -> Self {
        Vec3::from_slice(source)
    }
}

impl AttributeValue for Vec4 {
    const FORMAT: AttributeFormat = AttributeFormat::Float4;

    fn write_to(&self, target: &mut [f32]) {
        target.copy_from_slice(&self.to_array());
    }

    fn read_from(source: &[f32]) -> Self {
        Vec4::from_slice(source)
    }
}

/// Fills zero initialized slot buffers according to a layout. Every write is bounds checked against the vertex count
/// and the attribute's declared format.
pub struct LayoutWriter<'a> {
    layout: &'a VertexAttributeLayout,
    vertex_count: usize,
    buffers: Vec<Vec<f32>>,
}

impl<'a> LayoutWriter<'a> {
    pub fn new(layout: &'a VertexAttributeLayout, vertex_count: usize) -> Self {
        let buffers = (0..layout.slot_count())
            .map(|slot| vec![0.0; layout.buffer_len(slot, vertex_count) / size_of::<f32>()])
            .collect();

        Self {
            layout,
            vertex_count,
            buffers,
        }
    }

    pub fn write<V: AttributeValue>(
        &mut self,
        semantic: VertexSemantic,
        vertex: usize,
        value: V,
    ) -> Result<(), LayoutError> {
        let target = self.element_mut(semantic, vertex, V::FORMAT.components())?;
        value.write_to(target);
        Ok(())
    }

    pub fn write_all<V: AttributeValue>(&mut self, semantic: VertexSemantic, values: &[V]) -> Result<(), LayoutError> {
        if values.len() > self.vertex_count {
            return Err(LayoutError::VertexOutOfRange {
                vertex: values.len() - 1,
                vertex_count: self.vertex_count,
            });
        }

        for (vertex, value) in values.iter().enumerate() {
            self.write(semantic, vertex, *value)?;
        }
        Ok(())
    }

    /// Writes raw float components, which have to match the attribute's component count.
    pub fn write_components(
        &mut self,
        semantic: VertexSemantic,
        vertex: usize,
        components: &[f32],
    ) -> Result<(), LayoutError> {
        let target = self.element_mut(semantic, vertex, components.len())?;
        target.copy_from_slice(components);
        Ok(())
    }

    fn element_mut(
        &mut self,
        semantic: VertexSemantic,
        vertex: usize,
        components: usize,
    ) -> Result<&mut [f32], LayoutError> {
        if vertex >= self.vertex_count {
            return Err(LayoutError::VertexOutOfRange {
                vertex,
                vertex_count: self.vertex_count,
            });
        }

        let attr = self.layout.locate(semantic, components)?;
        let start = (attr.offset + vertex * self.layout.stride(attr.slot)) / size_of::<f32>();
        Ok(&mut self.buffers[attr.slot][start..start + components])
    }

    pub fn finish(self) -> Vec<Vec<u8>> {
        self.buffers
            .into_iter()
            .map(|buffer| bytemuck::cast_slice(&buffer).to_vec())
            .collect()
    }
}

/// Bounds checked, typed view onto slot buffers produced by a [`LayoutWriter`] (or anything else that follows the
/// layout).
pub struct LayoutReader<'a> {
    layout: &'a VertexAttributeLayout,
    vertex_count: usize,
    buffers: &'a [Vec<u8>],
}

impl<'a> LayoutReader<'a> {
    pub fn new(
        layout: &'a VertexAttributeLayout,
        vertex_count: usize,
        buffers: &'a [Vec<u8>],
    ) -> Result<Self, LayoutError> {
        for slot in 0..layout.slot_count() {
            let expected = layout.buffer_len(slot, vertex_count);
            let actual = buffers.get(slot).map(Vec::len).unwrap_or(0);
            if actual < expected {
                return Err(LayoutError::BufferTooShort {
                    slot,
                    expected,
                    actual,
                });
            }
        }

        Ok(Self {
            layout,
            vertex_count,
            buffers,
        })
    }

    pub fn read<V: AttributeValue>(&self, semantic: VertexSemantic, vertex: usize) -> Result<V, LayoutError> {
        if vertex >= self.vertex_count {
            return Err(LayoutError::VertexOutOfRange {
                vertex,
                vertex_count: self.vertex_count,
            });
        }

        let components = V::FORMAT.components();
        let attr = self.layout.locate(semantic, components)?;
        let start = attr.offset + vertex * self.layout.stride(attr.slot);
        let bytes = &self.buffers[attr.slot][start..start + components * size_of::<f32>()];

        let mut values = [0.0f32; 4];
        for (value, chunk) in values.iter_mut().zip(bytes.chunks_exact(size_of::<f32>())) {
            *value = f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        }
        Ok(V::read_from(&values[..components]))
    }

    pub fn read_all<V: AttributeValue>(&self, semantic: VertexSemantic) -> Result<Vec<V>, LayoutError> {
        (0..self.vertex_count)
            .map(|vertex| self.read(semantic, vertex))
            .collect()
    }

    /// Like [`LayoutReader::read_all`], but an absent attribute yields `None` instead of an error.
    pub fn read_optional<V: AttributeValue>(&self, semantic: VertexSemantic) -> Result<Option<Vec<V>>, LayoutError> {
        if !self.layout.contains(semantic) {
            return Ok(None);
        }
        self.read_all(semantic).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> VertexAttributeLayout {
        let mut layout = VertexAttributeLayout::new();
        layout
            .push(0, VertexSemantic::Position, AttributeFormat::Float3)
            .push(0, VertexSemantic::Normal, AttributeFormat::Float3)
            .push(1, VertexSemantic::Color, AttributeFormat::Float4)
            .push(1, VertexSemantic::TexCoord(0), AttributeFormat::Float2);
        layout
    }

    #[test]
    pub fn slots_are_packed_without_gaps() {
        let layout = layout();
        assert_eq!(layout.stride(0), 24);
        assert_eq!(layout.stride(1), 24);
        assert_eq!(layout.attribute(VertexSemantic::Normal).map(|a| a.offset), Some(12));
        assert_eq!(layout.attribute(VertexSemantic::TexCoord(0)).map(|a| a.offset), Some(16));
        assert_eq!(layout.uv_set_count(), 1);
    }

    #[test]
    pub fn write_then_read() -> Result<(), LayoutError> {
        let layout = layout();
        let mut writer = LayoutWriter::new(&layout, 2);
        writer.write(VertexSemantic::Position, 1, Vec3::new(1.0, 2.0, 3.0))?;
        writer.write(VertexSemantic::TexCoord(0), 1, Vec2::new(0.5, 0.25))?;
        let buffers = writer.finish();
        assert_eq!(buffers[0].len(), 48);

        let reader = LayoutReader::new(&layout, 2, &buffers)?;
        assert_eq!(reader.read::<Vec3>(VertexSemantic::Position, 1)?, Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(reader.read::<Vec3>(VertexSemantic::Normal, 1)?, Vec3::ZERO);
        assert_eq!(reader.read::<Vec2>(VertexSemantic::TexCoord(0), 1)?, Vec2::new(0.5, 0.25));
        assert_eq!(reader.read_optional::<Vec3>(VertexSemantic::Tangent)?, None);
        Ok(())
    }

    #[test]
    pub fn accesses_are_checked() {
        let layout = layout();
        let mut writer = LayoutWriter::new(&layout, 2);

        assert_eq!(
            writer.write(VertexSemantic::Position, 2, Vec3::ONE),
            Err(LayoutError::VertexOutOfRange {
                vertex: 2,
                vertex_count: 2
            })
        );
        assert_eq!(
            writer.write(VertexSemantic::Color, 0, Vec3::ONE),
            Err(LayoutError::FormatMismatch {
                semantic: VertexSemantic::Color,
                expected: AttributeFormat::Float3,
                actual: AttributeFormat::Float4
            })
        );
        assert_eq!(
            writer.write(VertexSemantic::Tangent, 0, Vec3::ONE),
            Err(LayoutError::MissingAttribute(VertexSemantic::Tangent))
        );

        let short = vec![vec![0u8; 24], vec![0u8; 48]];
        assert!(matches!(
            LayoutReader::new(&layout, 2, &short),
            Err(LayoutError::BufferTooShort { slot: 0, .. })
        ));
    }
}
