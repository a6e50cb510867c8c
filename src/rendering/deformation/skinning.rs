use glam::{Affine3A, Mat3, Mat4};
use itertools::Itertools;

use crate::rendering::common::types::Skeleton;
use crate::rendering::deformation::packing::JointPaletteEntry;

/// Composes the skinning matrix of every joint from the joints' local transforms. Joints without a transform use
/// identity. Parents precede their children, so the model space matrix of a parent is always known before its
/// children are visited.
pub fn compose_joint_palette(skeleton: &Skeleton, transforms: &[Affine3A]) -> Vec<JointPaletteEntry> {
    profiling::scope!("compose_joint_palette");
    let mut model_space = Vec::<Mat4>::with_capacity(skeleton.joint_count());

    for joint in 0..skeleton.joint_count() {
        let local = transforms
            .get(joint)
            .map(|&transform| Mat4::from(transform))
            .unwrap_or(Mat4::IDENTITY);

        let parent = skeleton.parents.get(joint).copied().flatten();
        let matrix = match parent {
            Some(parent) if parent < joint => model_space[parent] * local,
            _ => local,
        };
        model_space.push(matrix);
    }

    model_space
        .iter()
        .zip(&skeleton.inverse_bind_poses)
        .map(|(model, inverse_bind_pose)| {
            let skin = *model * *inverse_bind_pose;
            let normal = Mat3::from_mat4(skin).transpose().inverse();
            JointPaletteEntry {
                model: skin.to_cols_array(),
                normal: Mat4::from_mat3(normal).to_cols_array(),
            }
        })
        .collect_vec()
}
