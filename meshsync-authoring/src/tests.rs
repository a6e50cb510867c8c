use glam::{Mat4, Vec2, Vec3};

use crate::AuthoringError;
use crate::mesh::{RawBlendShape, RawBlendShapeFrame, RawBoneWeight, RawIndices, RawMesh, RawSubMesh, RawTexCoords, Topology};
use crate::native::{IndexFormat, NativeMesh, NativeSubMesh, VertexAttribute, VertexAttributeDescriptor, VertexFormat};

fn triangle() -> RawMesh {
    RawMesh {
        positions: vec![Vec3::ZERO, Vec3::X, Vec3::Y],
        indices: RawIndices::U16(vec![0, 1, 2]),
        sub_meshes: vec![RawSubMesh {
            index_start: 0,
            index_count: 3,
            base_vertex: 0,
            topology: Topology::Triangles,
        }],
        ..Default::default()
    }
}

#[test]
fn valid_triangle_passes() -> Result<(), anyhow::Error> {
    triangle().validate()?;
    Ok(())
}

#[test]
fn quads_are_rejected() {
    let mut mesh = triangle();
    mesh.sub_meshes[0].topology = Topology::Quads;
    assert_eq!(
        mesh.validate(),
        Err(AuthoringError::NonTriangleTopology {
            sub_mesh: 0,
            topology: Topology::Quads
        })
    );
}

#[test]
fn base_vertex_is_part_of_the_range_check() {
    let mut mesh = triangle();
    mesh.sub_meshes[0].base_vertex = 1;
    assert!(matches!(
        mesh.validate(),
        Err(AuthoringError::IndexOutOfRange { vertex: 3, .. })
    ));
}

#[test]
fn short_uv_channel_is_rejected() {
    let mut mesh = triangle();
    mesh.tex_coords.push(RawTexCoords::Float2(vec![Vec2::ZERO; 2]));
    assert!(matches!(
        mesh.validate(),
        Err(AuthoringError::AttributeLengthMismatch {
            attribute: "tex_coords",
            ..
        })
    ));
}

#[test]
fn joint_indices_are_checked_against_the_bind_poses() {
    let mut mesh = triangle();
    mesh.bones_per_vertex = vec![1, 1, 1];
    mesh.bone_weights = vec![
        RawBoneWeight {
            joint_index: 0,
            weight: 1.0,
        },
        RawBoneWeight {
            joint_index: 1,
            weight: 1.0,
        },
        RawBoneWeight {
            joint_index: 2,
            weight: 1.0,
        },
    ];
    mesh.bind_poses = vec![Mat4::IDENTITY; 2];

    assert_eq!(
        mesh.validate(),
        Err(AuthoringError::JointIndexOutOfRange {
            vertex: 2,
            joint: 2,
            joint_count: 2
        })
    );
}

#[test]
fn joint_parents_have_to_come_first() {
    let mut mesh = triangle();
    mesh.bind_poses = vec![Mat4::IDENTITY; 2];
    mesh.joint_parents = vec![Some(1), None];
    assert_eq!(
        mesh.validate(),
        Err(AuthoringError::InvalidJointParent { joint: 0, parent: 1 })
    );
}

#[test]
fn frame_weights_have_to_ascend() {
    let mut mesh = triangle();
    mesh.blend_shapes.push(RawBlendShape {
        name: "smile".to_string(),
        frames: vec![
            RawBlendShapeFrame {
                weight: 0.5,
                ..Default::default()
            },
            RawBlendShapeFrame {
                weight: 0.5,
                ..Default::default()
            },
        ],
    });

    assert!(matches!(
        mesh.validate(),
        Err(AuthoringError::NonAscendingFrameWeights { frame: 1, .. })
    ));
}

#[test]
fn native_streams_and_indices() -> Result<(), anyhow::Error> {
    let positions: Vec<u8> = [0.0f32, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0]
        .iter()
        .flat_map(|value| value.to_le_bytes())
        .collect();

    let mesh = NativeMesh {
        vertex_count: 3,
        attributes: vec![VertexAttributeDescriptor {
            attribute: VertexAttribute::Position,
            format: VertexFormat::Float32,
            dimension: 3,
            stream: 0,
        }],
        streams: vec![positions],
        index_format: IndexFormat::U16,
        index_data: [0u16, 1, 2].iter().flat_map(|idx| idx.to_le_bytes()).collect(),
        sub_meshes: vec![NativeSubMesh {
            index_start: 0,
            index_count: 3,
            base_vertex: 0,
            first_vertex: 0,
            vertex_count: 3,
            topology: Topology::Triangles,
        }],
    };

    mesh.validate()?;
    assert_eq!(mesh.stream_count(), 1);
    assert_eq!(mesh.stream_stride(0), 12);
    assert_eq!(mesh.index(2), Some(2));
    assert_eq!(mesh.index(3), None);
    Ok(())
}

#[test]
fn native_stream_too_short() {
    let mesh = NativeMesh {
        vertex_count: 2,
        attributes: vec![VertexAttributeDescriptor {
            attribute: VertexAttribute::Normal,
            format: VertexFormat::Float32,
            dimension: 3,
            stream: 1,
        }],
        streams: vec![vec![], vec![0; 12]],
        ..Default::default()
    };

    assert_eq!(
        mesh.validate(),
        Err(AuthoringError::StreamTooShort {
            stream: 1,
            expected: 24,
            actual: 12
        })
    );
}
