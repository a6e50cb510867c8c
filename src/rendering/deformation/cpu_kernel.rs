use std::sync::Arc;

use glam::{Mat3, Mat4, Vec3, Vec4};

use crate::rendering::deformation::DeformationError;
use crate::rendering::deformation::kernel::{DeformationKernel, validate_dispatch};
use crate::rendering::deformation::packing::{DeformationInputs, DeformedVertex, JointPaletteEntry};

/// Reference implementation of both kernels, vertex by vertex, the same way the compute shader does it.
#[derive(Debug, Default)]
pub struct CpuDeformationKernel;

impl CpuDeformationKernel {
    fn blend(inputs: &DeformationInputs, frame_weights: &[f32], vertex: usize) -> (Vec3, Vec3, Vec4) {
        let base = &inputs.base_vertices[vertex];
        let mut position = Vec3::from_array(base.position);
        let mut normal = Vec3::from_array(base.normal);
        let mut tangent = Vec4::from_array(base.tangent);

        for record in inputs.deltas_of(vertex) {
            let Some(&factor) = frame_weights.get(record.frame_index as usize) else {
                continue;
            };
            position += factor * Vec3::from_array(record.delta_position);
            normal += factor * Vec3::from_array(record.delta_normal);
            tangent += (factor * Vec3::from_array(record.delta_tangent)).extend(0.0);
        }

        (position, normal, tangent)
    }

    fn skin(
        inputs: &DeformationInputs,
        palette: &[JointPaletteEntry],
        vertex: usize,
        (position, normal, tangent): (Vec3, Vec3, Vec4),
    ) -> (Vec3, Vec3, Vec4) {
        let mut skinned_position = Vec3::ZERO;
        let mut skinned_normal = Vec3::ZERO;
        let mut skinned_tangent = Vec3::ZERO;

        // The weights are used as they come, no renormalization
        for influence in inputs.influences_of(vertex) {
            let Some(entry) = palette.get(influence.joint_index as usize) else {
                continue;
            };
            let model = Mat4::from_cols_array(&entry.model);
            let normal_matrix = Mat3::from_mat4(Mat4::from_cols_array(&entry.normal));

            skinned_position += influence.weight * model.transform_point3(position);
            skinned_normal += influence.weight * (normal_matrix * normal);
            skinned_tangent += influence.weight * model.transform_vector3(tangent.truncate());
        }

        (skinned_position, skinned_normal, skinned_tangent.extend(tangent.w))
    }
}

impl DeformationKernel for CpuDeformationKernel {
    fn name(&self) -> &'static str {
        "cpu"
    }

    fn deform(
        &self,
        inputs: &Arc<DeformationInputs>,
        frame_weights: &[f32],
        palette: Option<&[JointPaletteEntry]>,
    ) -> Result<Vec<DeformedVertex>, DeformationError> {
        profiling::scope!("CpuDeformationKernel::deform");
        validate_dispatch(inputs, frame_weights, palette)?;

        let deformed = (0..inputs.vertex_count)
            .map(|vertex| {
                let blended = Self::blend(inputs, frame_weights, vertex);
                let (position, normal, tangent) = match palette {
                    Some(palette) if inputs.is_skinned() => Self::skin(inputs, palette, vertex, blended),
                    _ => blended,
                };
                DeformedVertex::new(position, normal, tangent)
            })
            .collect();

        Ok(deformed)
    }
}
