//! Blend shape morphing and skeletal skinning of mesh instances. The packed inputs of a mesh ([`packing`]) are
//! shared by all its instances, every instance only contributes its frame weights and joint transforms. The work
//! itself is done by a [`kernel::DeformationKernel`], either on the CPU or as a wgpu compute shader, and scheduled by
//! the [`engine::DeformationEngine`] so that an instance never has more than one job in flight.

use thiserror::Error;

use crate::rendering::common::vertex_layout::LayoutError;
use crate::util::jobs::JobError;

pub mod cpu_kernel;
pub mod engine;
pub mod instance;
pub mod kernel;
pub mod packing;
pub mod skinning;
pub mod wgpu_kernel;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DeformationError {
    #[error("The mesh buffers can't be read: {0}")]
    Layout(#[from] LayoutError),

    #[error("Got {actual} frame weights, but the mesh has {expected} blend shape frames")]
    FrameCountMismatch { expected: usize, actual: usize },

    #[error("Got {actual} joint matrices, but the skeleton has {expected} joints")]
    JointCountMismatch { expected: usize, actual: usize },

    #[error("The mesh has neither blend shapes nor a skin")]
    NotDeformable,

    #[error("Entity {0:?} has no blended instance")]
    UnknownInstance(hecs::Entity),

    #[error("The deformation backend failed: {0}")]
    Backend(String),

    #[error(transparent)]
    Job(#[from] JobError),
}
