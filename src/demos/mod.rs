use std::f32::consts::PI;

use glam::{Affine3A, Mat4, Vec3, Vec4};
use itertools::Itertools;
use log::{info, warn};
use meshsync_authoring::mesh::{
    RawBlendShape, RawBlendShapeFrame, RawBoneWeight, RawIndices, RawMesh, RawSubMesh, RawTexCoords,
};

use crate::entity::components::rendering::RaycastBounds;
use crate::entity::entity_tracker::EntityTracker;
use crate::entity::systems::systems::Systems;
use crate::physics::collider_factory::ShapeKind;
use crate::physics::collision_world::CollisionWorld;
use crate::rendering::application::{MeshSource, MeshSubsystem};
use crate::rendering::common::types::AssetId;

pub const COLUMN_MESH: AssetId = AssetId(1);
pub const COLUMN_MATERIAL: AssetId = AssetId(100);
pub const COLUMN_TEXTURE: AssetId = AssetId(200);

const RINGS: usize = 8;
const SEGMENTS: usize = 12;
const HEIGHT: f32 = 4.0;

/// A closed-ish cylinder along Y, skinned to two stacked joints, with a two frame "bulge" blend shape.
pub fn column_mesh() -> RawMesh {
    let mut positions = vec![];
    let mut normals = vec![];
    let mut tangents = vec![];
    let mut uvs = vec![];
    let mut bones_per_vertex = vec![];
    let mut bone_weights = vec![];
    let mut bulge_half = vec![];
    let mut bulge_full = vec![];

    for ring in 0..=RINGS {
        let v = ring as f32 / RINGS as f32;
        let height = v * HEIGHT;
        // the middle of the column bulges the most
        let bulge = (v * PI).sin();

        for segment in 0..=SEGMENTS {
            let u = segment as f32 / SEGMENTS as f32;
            let angle = u * 2.0 * PI;
            let normal = Vec3::new(angle.cos(), 0.0, angle.sin());

            positions.push(normal * 0.5 + Vec3::Y * height);
            normals.push(normal);
            tangents.push(Vec4::new(-angle.sin(), 0.0, angle.cos(), 1.0));
            uvs.push(glam::Vec2::new(u, v));

            bones_per_vertex.push(2);
            bone_weights.push(RawBoneWeight {
                joint_index: 0,
                weight: 1.0 - v,
            });
            bone_weights.push(RawBoneWeight {
                joint_index: 1,
                weight: v,
            });

            bulge_half.push(normal * 0.2 * bulge);
            bulge_full.push(normal * 0.5 * bulge);
        }
    }

    let stride = (SEGMENTS + 1) as u32;
    let indices = (0..RINGS as u32)
        .cartesian_product(0..SEGMENTS as u32)
        .flat_map(|(ring, segment)| {
            let current = ring * stride + segment;
            let above = current + stride;
            [current, above, current + 1, current + 1, above, above + 1]
        })
        .collect_vec();

    RawMesh {
        positions,
        normals,
        tangents,
        tex_coords: vec![RawTexCoords::Float2(uvs)],
        sub_meshes: vec![RawSubMesh {
            index_start: 0,
            index_count: indices.len() as u32,
            ..Default::default()
        }],
        indices: RawIndices::U32(indices),
        bones_per_vertex,
        bone_weights,
        bind_poses: vec![
            Mat4::IDENTITY,
            Mat4::from_translation(Vec3::new(0.0, -HEIGHT * 0.5, 0.0)),
        ],
        joint_parents: vec![None, Some(0)],
        blend_shapes: vec![RawBlendShape {
            name: "bulge".to_string(),
            frames: vec![
                RawBlendShapeFrame {
                    weight: 0.5,
                    delta_positions: bulge_half,
                    ..Default::default()
                },
                RawBlendShapeFrame {
                    weight: 1.0,
                    delta_positions: bulge_full,
                    ..Default::default()
                },
            ],
        }],
        ..Default::default()
    }
}

/// Uploads the column, spawns a few instances of it and animates them for `frames` frames.
pub fn run(subsystem: &mut MeshSubsystem, frames: u32) {
    let tracker = EntityTracker::new();
    let systems = Systems::new();
    let mut collisions = CollisionWorld::new();

    if let Err(err) = subsystem.create_or_update_mesh(COLUMN_MESH, MeshSource::Authored(column_mesh())) {
        warn!("The demo mesh is broken: {}", err);
        return;
    }
    subsystem.set_material_textures(COLUMN_MATERIAL, &[COLUMN_TEXTURE]);

    let entities = (0..3)
        .map(|index| {
            let transform = Affine3A::from_translation(Vec3::new(index as f32 * 2.0, 0.0, 0.0));
            let entity = tracker.spawn_mesh(COLUMN_MESH, vec![COLUMN_MATERIAL], transform);
            tracker.add_collider(entity, ShapeKind::ConvexHull);
            entity
        })
        .collect_vec();

    for frame in 0..frames {
        let time = frame as f32 / 30.0;
        for (index, &entity) in entities.iter().enumerate() {
            let phase = time + index as f32;
            tracker.set_blend_shape_weights(entity, vec![phase.sin() * 0.5 + 0.5]);
            tracker.set_joint_transforms(
                entity,
                vec![
                    Affine3A::IDENTITY,
                    Affine3A::from_translation(Vec3::Y * HEIGHT * 0.5) * Affine3A::from_rotation_z(phase.cos() * 0.3),
                ],
            );
        }

        if frame % 20 == 10 {
            // an edit in the authoring tool
            subsystem.texture_updated(COLUMN_TEXTURE);
        }

        systems.update(&tracker, subsystem, &mut collisions);
    }

    let world = tracker.world().read().expect("World Read Lock poisoned");
    for &entity in &entities {
        if let Ok(bounds) = world.get::<&RaycastBounds>(entity) {
            info!(
                "{:?}: deformed bounds {:?} .. {:?}",
                entity, bounds.0.min, bounds.0.max
            );
        }
    }

    collisions.update_queries();
    match collisions.cast_ray(Vec3::new(0.0, HEIGHT * 0.5, -10.0), Vec3::Z, 100.0) {
        Some((collider, distance)) => info!("A ray hits {:?} after {:.3}", collider, distance),
        None => info!("A ray through the first column hits nothing, its collider isn't ready yet"),
    }
}
