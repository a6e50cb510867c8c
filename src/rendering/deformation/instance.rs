use std::sync::Arc;

use arc_swap::ArcSwapOption;
use glam::Affine3A;
use hecs::Entity;

use crate::rendering::asset_graph::mesh_asset::{MeshAsset, MeshContents};
use crate::rendering::blend_shapes::frame_weights::compute_frame_weights;
use crate::rendering::common::types::Aabb;
use crate::rendering::deformation::DeformationError;
use crate::rendering::deformation::packing::{DeformationInputs, DeformedVertex, JointPaletteEntry};
use crate::rendering::deformation::skinning::compose_joint_palette;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum InstanceState {
    /// Nothing has been computed yet, the first update runs synchronously.
    Uninitialized,
    ReadyToProcess,
    Processing,
    /// Another update arrived while processing, it is dispatched as soon as the running job commits.
    UpdatePending,
}

/// The result of one deformation, as published to the renderer.
#[derive(Debug, Clone, PartialEq)]
pub struct DeformedOutput {
    pub asset_version: u64,
    pub frame_weights: Vec<f32>,
    pub vertices: Vec<DeformedVertex>,
    pub bounds: Aabb,
}

impl DeformedOutput {
    pub fn new(asset_version: u64, frame_weights: Vec<f32>, vertices: Vec<DeformedVertex>) -> Self {
        let bounds = vertices
            .iter()
            .fold(Aabb::EMPTY, |aabb, vertex| aabb.extended(vertex.position()));
        Self {
            asset_version,
            frame_weights,
            vertices,
            bounds,
        }
    }
}

pub type DeformationResult = Result<Arc<DeformedOutput>, DeformationError>;
pub type DeformationCallback = Box<dyn FnOnce(&DeformationResult) + Send>;

/// Everything a kernel needs for one dispatch, detached from the instance so it can be moved into a job.
pub struct DeformationJob {
    pub inputs: Arc<DeformationInputs>,
    pub asset_version: u64,
    pub frame_weights: Vec<f32>,
    pub palette: Option<Vec<JointPaletteEntry>>,
}

/// What the engine has to do after a request has been recorded.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RequestOutcome {
    RunSynchronously,
    Dispatch,
    Coalesced,
}

/// The per entity deformation state of a deformable mesh. The contents and packed inputs are a snapshot of one asset
/// version: frame weights are always computed against the same blend shapes the deltas were packed from.
pub struct BlendedInstance {
    entity: Entity,
    generation: u64,
    asset: Arc<MeshAsset>,
    version: u64,
    contents: Arc<MeshContents>,
    inputs: Arc<DeformationInputs>,
    state: InstanceState,
    weights: Vec<f32>,
    transforms: Vec<Affine3A>,
    output: ArcSwapOption<DeformedOutput>,
    in_flight: Vec<DeformationCallback>,
    pending: Vec<DeformationCallback>,
}

impl std::fmt::Debug for BlendedInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlendedInstance")
            .field("entity", &self.entity)
            .field("generation", &self.generation)
            .field("mesh", &self.asset.id())
            .field("version", &self.version)
            .field("state", &self.state)
            .finish()
    }
}

impl BlendedInstance {
    pub fn new(entity: Entity, generation: u64, asset: Arc<MeshAsset>) -> Result<Self, DeformationError> {
        let version = asset.version();
        let contents = asset.contents();
        let inputs = asset.deformation_inputs()?;
        Ok(Self {
            entity,
            generation,
            asset,
            version,
            contents,
            inputs,
            state: InstanceState::Uninitialized,
            weights: vec![],
            transforms: vec![],
            output: ArcSwapOption::empty(),
            in_flight: vec![],
            pending: vec![],
        })
    }

    pub fn entity(&self) -> Entity {
        self.entity
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn state(&self) -> InstanceState {
        self.state
    }

    pub fn asset(&self) -> &Arc<MeshAsset> {
        &self.asset
    }

    /// The asset version the packed inputs have been derived from.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// The asset has been replaced since this instance was built.
    pub fn is_stale(&self) -> bool {
        self.asset.version() != self.version
    }

    pub fn output(&self) -> Option<Arc<DeformedOutput>> {
        self.output.load_full()
    }

    pub fn has_job_in_flight(&self) -> bool {
        matches!(
            self.state,
            InstanceState::Processing | InstanceState::UpdatePending
        )
    }

    /// Records the latest inputs. Earlier inputs that have not been dispatched yet are superseded.
    pub fn request(
        &mut self,
        weights: &[f32],
        transforms: &[Affine3A],
        callback: Option<DeformationCallback>,
    ) -> RequestOutcome {
        self.weights.clear();
        self.weights.extend_from_slice(weights);
        self.transforms.clear();
        self.transforms.extend_from_slice(transforms);
        self.pending.extend(callback);

        match self.state {
            InstanceState::Uninitialized => RequestOutcome::RunSynchronously,
            InstanceState::ReadyToProcess => {
                self.start_processing();
                RequestOutcome::Dispatch
            }
            InstanceState::Processing | InstanceState::UpdatePending => {
                self.state = InstanceState::UpdatePending;
                RequestOutcome::Coalesced
            }
        }
    }

    fn start_processing(&mut self) {
        self.state = InstanceState::Processing;
        self.in_flight.append(&mut self.pending);
    }

    /// Snapshot of the latest inputs.
    pub fn job(&self) -> DeformationJob {
        let mut frame_weights = Vec::new();
        compute_frame_weights(&self.contents.blend_shapes, &self.weights, &mut frame_weights);

        let palette = self
            .inputs
            .skeleton
            .as_ref()
            .map(|skeleton| compose_joint_palette(skeleton, &self.transforms));

        DeformationJob {
            inputs: self.inputs.clone(),
            asset_version: self.version,
            frame_weights,
            palette,
        }
    }

    /// Commits the result of the synchronous first update and returns the callbacks to invoke with it.
    pub fn complete_synchronously(&mut self, result: &DeformationResult) -> Vec<DeformationCallback> {
        self.in_flight.append(&mut self.pending);
        self.state = InstanceState::ReadyToProcess;
        self.commit(result)
    }

    /// Commits the result of the job in flight. Returns the callbacks to invoke and whether the latest inputs have to
    /// be dispatched right away.
    pub fn complete(&mut self, result: &DeformationResult) -> (Vec<DeformationCallback>, bool) {
        let callbacks = self.commit(result);
        let redispatch = self.state == InstanceState::UpdatePending;
        if redispatch {
            self.start_processing();
        } else {
            self.state = InstanceState::ReadyToProcess;
        }
        (callbacks, redispatch)
    }

    fn commit(&mut self, result: &DeformationResult) -> Vec<DeformationCallback> {
        if let Ok(output) = result {
            self.output.store(Some(output.clone()));
        }
        std::mem::take(&mut self.in_flight)
    }

    /// Callbacks that never got a result, for when the instance goes away.
    pub fn take_callbacks(&mut self) -> Vec<DeformationCallback> {
        let mut callbacks = std::mem::take(&mut self.in_flight);
        callbacks.append(&mut self.pending);
        callbacks
    }
}
