use std::sync::Arc;

use crate::rendering::deformation::DeformationError;
use crate::rendering::deformation::packing::{DeformationInputs, DeformedVertex, JointPaletteEntry};

/// A deformation backend. Implementations are called from background jobs and have to produce one
/// [`DeformedVertex`] per input vertex: the blended base vertex and, when a palette is given, the skinned result of
/// that.
pub trait DeformationKernel: Send + Sync {
    fn name(&self) -> &'static str;

    fn deform(
        &self,
        inputs: &Arc<DeformationInputs>,
        frame_weights: &[f32],
        palette: Option<&[JointPaletteEntry]>,
    ) -> Result<Vec<DeformedVertex>, DeformationError>;
}

/// The checks every backend runs before touching any buffers.
pub fn validate_dispatch(
    inputs: &DeformationInputs,
    frame_weights: &[f32],
    palette: Option<&[JointPaletteEntry]>,
) -> Result<(), DeformationError> {
    if frame_weights.len() != inputs.frame_count {
        return Err(DeformationError::FrameCountMismatch {
            expected: inputs.frame_count,
            actual: frame_weights.len(),
        });
    }

    if let Some(palette) = palette {
        if palette.len() != inputs.joint_count() {
            return Err(DeformationError::JointCountMismatch {
                expected: inputs.joint_count(),
                actual: palette.len(),
            });
        }
    }

    Ok(())
}
