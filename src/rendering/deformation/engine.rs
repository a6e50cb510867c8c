use std::collections::HashMap;
use std::sync::Arc;

use glam::Affine3A;
use hecs::Entity;
use log::{debug, error, trace};

use crate::rendering::asset_graph::mesh_asset::MeshAsset;
use crate::rendering::common::types::AssetId;
use crate::rendering::deformation::DeformationError;
use crate::rendering::deformation::instance::{
    BlendedInstance, DeformationCallback, DeformationJob, DeformationResult, DeformedOutput, InstanceState,
    RequestOutcome,
};
use crate::rendering::deformation::kernel::DeformationKernel;
use crate::util::jobs::{CompletionQueue, JobExecutor};

struct DeformationCompletion {
    entity: Entity,
    generation: u64,
    result: DeformationResult,
}

fn run_job(kernel: &dyn DeformationKernel, job: DeformationJob) -> DeformationResult {
    let vertices = kernel.deform(&job.inputs, &job.frame_weights, job.palette.as_deref())?;
    Ok(Arc::new(DeformedOutput::new(
        job.asset_version,
        job.frame_weights,
        vertices,
    )))
}

fn invoke(callbacks: Vec<DeformationCallback>, result: &DeformationResult) {
    for callback in callbacks {
        callback(result);
    }
}

/// Owns the blended instances of all entities and schedules their deformation jobs.
pub struct DeformationEngine {
    kernel: Arc<dyn DeformationKernel>,
    executor: JobExecutor,
    instances: HashMap<Entity, BlendedInstance>,
    completions: CompletionQueue<DeformationCompletion>,
    next_generation: u64,
    in_flight: usize,
}

impl DeformationEngine {
    pub fn new(kernel: Arc<dyn DeformationKernel>, executor: JobExecutor) -> Self {
        debug!("Deforming with the {} kernel", kernel.name());
        Self {
            kernel,
            executor,
            instances: HashMap::new(),
            completions: CompletionQueue::new(),
            next_generation: 0,
            in_flight: 0,
        }
    }

    pub fn kernel_name(&self) -> &'static str {
        self.kernel.name()
    }

    /// (Re)builds the instance of `entity` from the current version of `asset`. A job still running for a previous
    /// instance of the entity is discarded when it completes.
    pub fn create_instance(&mut self, entity: Entity, asset: Arc<MeshAsset>) -> Result<(), DeformationError> {
        self.next_generation += 1;
        let instance = BlendedInstance::new(entity, self.next_generation, asset)?;
        trace!("Created {:?}", instance);

        if let Some(mut previous) = self.instances.insert(entity, instance) {
            Self::drop_instance(&mut previous);
        }
        Ok(())
    }

    pub fn destroy_instance(&mut self, entity: Entity) -> bool {
        match self.instances.remove(&entity) {
            Some(mut instance) => {
                Self::drop_instance(&mut instance);
                true
            }
            None => false,
        }
    }

    fn drop_instance(instance: &mut BlendedInstance) {
        let callbacks = instance.take_callbacks();
        if !callbacks.is_empty() {
            let result = Err(DeformationError::UnknownInstance(instance.entity()));
            invoke(callbacks, &result);
        }
    }

    pub fn instance(&self, entity: Entity) -> Option<&BlendedInstance> {
        self.instances.get(&entity)
    }

    pub fn output(&self, entity: Entity) -> Option<Arc<DeformedOutput>> {
        self.instances
            .get(&entity)
            .and_then(BlendedInstance::output)
    }

    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }

    /// Entities whose instance was built from the mesh `id`.
    pub fn instances_of(&self, id: AssetId) -> Vec<Entity> {
        self.instances
            .values()
            .filter(|instance| instance.asset().id() == id)
            .map(BlendedInstance::entity)
            .collect()
    }

    /// Jobs that have been dispatched but not committed yet, including those of destroyed instances.
    pub fn jobs_in_flight(&self) -> usize {
        self.in_flight
    }

    /// Queues a deformation with the given shape weights and joint transforms. The very first update of an instance
    /// completes before this returns, later ones are dispatched to the executor and committed by [`Self::pump`].
    /// While a job is running, further requests are coalesced into a single follow up job with the latest inputs.
    pub fn request_deformation(
        &mut self,
        entity: Entity,
        weights: &[f32],
        transforms: &[Affine3A],
        on_complete: Option<DeformationCallback>,
    ) -> Result<(), DeformationError> {
        profiling::scope!("DeformationEngine::request_deformation");
        let stale_asset = match self.instances.get(&entity) {
            None => return Err(DeformationError::UnknownInstance(entity)),
            Some(instance) if instance.is_stale() && !instance.has_job_in_flight() => Some(instance.asset().clone()),
            Some(_) => None,
        };

        // The mesh has been replaced in place, the packed inputs have to follow before anything is computed.
        if let Some(asset) = stale_asset {
            debug!("Rebuilding the instance of {:?}, mesh {} is at v{} now", entity, asset.id(), asset.version());
            self.create_instance(entity, asset)?;
        }

        let Some(instance) = self.instances.get_mut(&entity) else {
            return Err(DeformationError::UnknownInstance(entity));
        };

        match instance.request(weights, transforms, on_complete) {
            RequestOutcome::RunSynchronously => {
                let result = run_job(self.kernel.as_ref(), instance.job());
                if let Err(err) = &result {
                    error!("Deforming {:?} failed: {}", entity, err);
                }
                let callbacks = instance.complete_synchronously(&result);
                invoke(callbacks, &result);
            }
            RequestOutcome::Dispatch => {
                let job = instance.job();
                let generation = instance.generation();
                self.dispatch(entity, generation, job);
            }
            RequestOutcome::Coalesced => {
                trace!("Coalescing the deformation of {:?}", entity);
            }
        }

        Ok(())
    }

    fn dispatch(&mut self, entity: Entity, generation: u64, job: DeformationJob) {
        self.in_flight += 1;
        let kernel = self.kernel.clone();
        self.executor.spawn(
            self.completions.sender(),
            move || DeformationCompletion {
                entity,
                generation,
                result: run_job(kernel.as_ref(), job),
            },
            move |err| DeformationCompletion {
                entity,
                generation,
                result: Err(err.into()),
            },
        );
    }

    /// Commits every finished job. Returns the amount of committed results.
    pub fn pump(&mut self) -> usize {
        profiling::scope!("DeformationEngine::pump");
        let mut committed = 0;
        while let Some(completion) = self.completions.try_next() {
            if self.commit(completion) {
                committed += 1;
            }
        }
        committed
    }

    /// Waits until no job is in flight anymore, committing results as they arrive.
    pub async fn settle(&mut self) {
        while self.in_flight > 0 {
            match self.completions.next().await {
                Some(completion) => {
                    self.commit(completion);
                }
                None => break,
            }
        }
    }

    fn commit(&mut self, completion: DeformationCompletion) -> bool {
        self.in_flight = self.in_flight.saturating_sub(1);
        let DeformationCompletion {
            entity,
            generation,
            result,
        } = completion;

        let Some(instance) = self
            .instances
            .get_mut(&entity)
            .filter(|instance| instance.generation() == generation)
        else {
            trace!("Discarding the deformation of {:?}, its instance is gone", entity);
            return false;
        };

        if let Err(err) = &result {
            error!("Deforming {:?} failed: {}", entity, err);
        }

        let (callbacks, redispatch) = instance.complete(&result);
        if redispatch {
            debug_assert_eq!(instance.state(), InstanceState::Processing);
            let job = instance.job();
            self.dispatch(entity, generation, job);
        }

        invoke(callbacks, &result);
        true
    }
}
