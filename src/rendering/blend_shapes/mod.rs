//! Blend shapes (morph targets) of a mesh. Every shape is a list of frames, every frame a full set of per vertex
//! deltas that reaches its full contribution at the frame's weight. The data is shared between all instances of a
//! mesh, the per instance state is just one weight per shape (see [`frame_weights`]).

use std::fmt::{Debug, Formatter};

use glam::Vec3;
use itertools::Itertools;
use meshsync_authoring::mesh::RawBlendShape;

use crate::rendering::common::coordinate_systems;

pub mod frame_weights;

#[derive(Clone, PartialEq, Default)]
pub struct BlendShapeFrame {
    pub weight: f32,
    pub delta_positions: Vec<Vec3>,
    pub delta_normals: Vec<Vec3>,
    pub delta_tangents: Vec<Vec3>,
}

impl BlendShapeFrame {
    /// Deltas past the end of an array are zero.
    #[inline]
    pub fn delta(&self, vertex: usize) -> (Vec3, Vec3, Vec3) {
        (
            self.delta_positions.get(vertex).copied().unwrap_or(Vec3::ZERO),
            self.delta_normals.get(vertex).copied().unwrap_or(Vec3::ZERO),
            self.delta_tangents.get(vertex).copied().unwrap_or(Vec3::ZERO),
        )
    }
}

impl Debug for BlendShapeFrame {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{ weight: {}, ", self.weight)?;
        write!(f, "delta_positions: [{}], ", self.delta_positions.len())?;
        write!(f, "delta_normals: [{}], ", self.delta_normals.len())?;
        write!(f, "delta_tangents: [{}] }}", self.delta_tangents.len())
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct BlendShape {
    pub name: String,
    /// Ascending by weight.
    pub frames: Vec<BlendShapeFrame>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct BlendShapeSet {
    pub shapes: Vec<BlendShape>,
}

impl BlendShapeSet {
    /// Converts validated authoring shapes into render space.
    pub fn from_raw(raw_shapes: &[RawBlendShape]) -> Self {
        let convert = |deltas: &Vec<Vec3>| {
            deltas
                .iter()
                .map(|&delta| coordinate_systems::authoring_to_render(delta))
                .collect_vec()
        };

        let shapes = raw_shapes
            .iter()
            .map(|shape| BlendShape {
                name: shape.name.clone(),
                frames: shape
                    .frames
                    .iter()
                    .map(|frame| BlendShapeFrame {
                        weight: frame.weight,
                        delta_positions: convert(&frame.delta_positions),
                        delta_normals: convert(&frame.delta_normals),
                        delta_tangents: convert(&frame.delta_tangents),
                    })
                    .collect(),
            })
            .collect();

        Self { shapes }
    }

    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty()
    }

    pub fn shape_count(&self) -> usize {
        self.shapes.len()
    }

    /// The frames of all shapes, flattened shape by shape. This is the indexing the packed GPU deltas use.
    pub fn frame_count(&self) -> usize {
        self.shapes.iter().map(|shape| shape.frames.len()).sum()
    }

    pub fn frames(&self) -> impl Iterator<Item = &BlendShapeFrame> {
        self.shapes.iter().flat_map(|shape| shape.frames.iter())
    }

    pub fn shape_index(&self, name: &str) -> Option<usize> {
        self.shapes.iter().position(|shape| shape.name == name)
    }
}
