use std::collections::HashMap;

use futures::future::{BoxFuture, Shared};
use glam::{Affine3A, Vec3};
use itertools::Itertools;
use log::trace;
use nalgebra::{Isometry3, Point3};
use rapier3d::geometry::{Collider, ColliderBuilder, MeshConverter, SharedShape};
use thiserror::Error;

use crate::rendering::asset_graph::mesh_asset::MeshContents;
use crate::rendering::common::vertex_layout::{LayoutError, LayoutReader, VertexSemantic};
use crate::util::jobs::JobError;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ShapeKind {
    ConvexHull,
    StaticMesh,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ShapeError {
    #[error("The mesh has no triangles to build a {0:?} from")]
    Empty(ShapeKind),

    #[error("Building the {kind:?} failed: {reason}")]
    Degenerate { kind: ShapeKind, reason: String },

    #[error(transparent)]
    Layout(#[from] LayoutError),

    #[error(transparent)]
    Job(#[from] JobError),
}

/// Every caller waiting for the same shape polls the same generation.
pub type ShapeFuture = Shared<BoxFuture<'static, Result<SharedShape, ShapeError>>>;

pub enum ColliderFactory {}

impl ColliderFactory {
    pub fn build_shape(contents: &MeshContents, kind: ShapeKind) -> Result<SharedShape, ShapeError> {
        profiling::scope!("ColliderFactory::build_shape");
        if contents.render.triangle_count() == 0 {
            return Err(ShapeError::Empty(kind));
        }

        let (vertices, indices) = Self::collision_geometry(contents)?;
        if indices.is_empty() {
            return Err(ShapeError::Empty(kind));
        }

        trace!(
            "Building {:?} from {} vertices and {} triangles",
            kind,
            vertices.len(),
            indices.len()
        );

        let converter = match kind {
            ShapeKind::ConvexHull => MeshConverter::ConvexHull,
            ShapeKind::StaticMesh => MeshConverter::TriMesh,
        };

        let (shape, _pose) = converter
            .convert(vertices, indices)
            .map_err(|err| ShapeError::Degenerate {
                kind,
                reason: format!("{:?}", err),
            })?;

        Ok(shape)
    }

    /// Positions and triangles of all parts. Vertices that only differ in their other attributes (uv seams, hard
    /// edges) are merged, which keeps hulls cheap and trimeshes watertight.
    fn collision_geometry(contents: &MeshContents) -> Result<(Vec<Point3<f32>>, Vec<[u32; 3]>), ShapeError> {
        let render = &contents.render;
        let reader = LayoutReader::new(&render.layout, render.vertex_count, &render.vertex_buffers)?;
        let positions = reader.read_all::<Vec3>(VertexSemantic::Position)?;

        let mut remap = Vec::with_capacity(positions.len());
        let mut unique = HashMap::<[u32; 3], u32>::with_capacity(positions.len());
        let mut vertices = Vec::with_capacity(positions.len());
        for position in &positions {
            let key = position.to_array().map(f32::to_bits);
            let index = *unique.entry(key).or_insert_with(|| {
                vertices.push(Point3::from(*position));
                vertices.len() as u32 - 1
            });
            remap.push(index);
        }

        let indices = render
            .parts
            .iter()
            .flat_map(|part| {
                let start = part.index_offset as usize;
                render.index_buffer[start..start + part.index_count as usize].iter()
            })
            .map(|&index| remap.get(index as usize).copied().unwrap_or_default())
            .tuples()
            .map(|(a, b, c)| [a, b, c])
            // merged vertices can collapse triangles
            .filter(|[a, b, c]| a != b && b != c && a != c)
            .collect_vec();

        Ok((vertices, indices))
    }

    pub fn collider(shape: SharedShape, transform: &Affine3A) -> Collider {
        let (_scale, rotation, translation) = transform.to_scale_rotation_translation();
        ColliderBuilder::new(shape)
            .position(Isometry3::from((translation, rotation)))
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rendering::importer::mesh_importer::MeshImporter;
    use meshsync_authoring::mesh::{RawIndices, RawMesh, RawSubMesh, Topology};

    /// A unit cube with split vertices per face, like an exporter would produce with hard normals.
    fn cube() -> RawMesh {
        let corners = [
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(1.0, 1.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
            Vec3::new(0.0, 0.0, 1.0),
            Vec3::new(1.0, 0.0, 1.0),
            Vec3::new(1.0, 1.0, 1.0),
            Vec3::new(0.0, 1.0, 1.0),
        ];
        let faces: [[usize; 4]; 6] = [
            [0, 3, 2, 1],
            [4, 5, 6, 7],
            [0, 1, 5, 4],
            [2, 3, 7, 6],
            [1, 2, 6, 5],
            [0, 4, 7, 3],
        ];

        let mut positions = vec![];
        let mut indices = vec![];
        for face in faces {
            let base = positions.len() as u32;
            positions.extend(face.map(|corner| corners[corner]));
            indices.extend([base, base + 1, base + 2, base, base + 2, base + 3]);
        }

        RawMesh {
            positions,
            sub_meshes: vec![RawSubMesh {
                index_start: 0,
                index_count: indices.len() as u32,
                base_vertex: 0,
                topology: Topology::Triangles,
            }],
            indices: RawIndices::U32(indices),
            ..Default::default()
        }
    }

    #[test]
    pub fn split_vertices_are_merged() -> Result<(), anyhow::Error> {
        let contents = MeshImporter::import(&cube())?;
        let (vertices, indices) = ColliderFactory::collision_geometry(&contents)?;
        assert_eq!(contents.render.vertex_count, 24);
        assert_eq!(vertices.len(), 8);
        assert_eq!(indices.len(), 12);
        Ok(())
    }

    #[test]
    pub fn convex_hull_of_a_cube() -> Result<(), anyhow::Error> {
        let contents = MeshImporter::import(&cube())?;
        let shape = ColliderFactory::build_shape(&contents, ShapeKind::ConvexHull)?;
        let aabb = shape.compute_local_aabb();
        assert!((aabb.maxs.x - aabb.mins.x - 1.0).abs() < 1e-5);
        assert!((aabb.maxs.z - aabb.mins.z - 1.0).abs() < 1e-5);
        Ok(())
    }

    #[test]
    pub fn empty_meshes_have_no_shape() {
        assert_eq!(
            ColliderFactory::build_shape(&MeshContents::default(), ShapeKind::StaticMesh).err(),
            Some(ShapeError::Empty(ShapeKind::StaticMesh))
        );
    }
}
