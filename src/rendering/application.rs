use std::collections::HashMap;
use std::sync::Arc;

use glam::Affine3A;
use hecs::Entity;
use log::{debug, error, trace, warn};
use meshsync_authoring::mesh::RawMesh;
use meshsync_authoring::native::NativeMesh;
use rapier3d::geometry::SharedShape;

use crate::physics::collider_factory::{ShapeError, ShapeFuture, ShapeKind};
use crate::rendering::asset_graph::mesh_asset::{MeshAsset, MeshContents};
use crate::rendering::asset_graph::mesh_cache::{GenerationTicket, MeshCache};
use crate::rendering::asset_graph::references::{AssetNotification, AssetReferenceGraph, Consumer};
use crate::rendering::common::types::AssetId;
use crate::rendering::deformation::DeformationError;
use crate::rendering::deformation::engine::DeformationEngine;
use crate::rendering::deformation::instance::{DeformationCallback, DeformedOutput};
use crate::rendering::deformation::kernel::DeformationKernel;
use crate::rendering::errors::MeshError;
use crate::rendering::importer::mesh_importer::MeshImporter;
use crate::rendering::importer::native_importer::{NativeImporter, NativeLayoutDescriptor};
use crate::settings::RuntimeFlags;
use crate::util::jobs::{CompletionQueue, JobExecutor};

/// Where the data of a mesh comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum MeshSource {
    Authored(RawMesh),
    Native(NativeMesh),
}

/// A validated source, ready to be imported off the main thread.
enum ImportJob {
    Authored(RawMesh),
    Native(NativeMesh, NativeLayoutDescriptor),
}

impl ImportJob {
    fn prepare(source: MeshSource) -> Result<Self, MeshError> {
        match source {
            MeshSource::Authored(raw) => {
                raw.validate()?;
                Ok(ImportJob::Authored(raw))
            }
            MeshSource::Native(native) => {
                let descriptor = NativeImporter::describe(&native)?;
                Ok(ImportJob::Native(native, descriptor))
            }
        }
    }

    fn run(self) -> Result<MeshContents, MeshError> {
        match self {
            ImportJob::Authored(raw) => MeshImporter::import(&raw),
            ImportJob::Native(native, descriptor) => NativeImporter::import(&native, descriptor),
        }
    }
}

struct GenerationCompletion {
    ticket: GenerationTicket,
    request: u64,
    result: Result<MeshContents, MeshError>,
}

/// The background generations requested for one mesh that haven't been committed yet. Only the latest request may
/// commit, and it does so for all of them.
#[derive(Debug, Copy, Clone, Default)]
struct PendingGenerations {
    latest: u64,
    updates: u64,
}

/// The entry point of the crate: owns the mesh cache, the reference graph and the deformation engine. Everything
/// here is meant to be called from the main thread, background work is committed by [`MeshSubsystem::pump`].
pub struct MeshSubsystem {
    flags: RuntimeFlags,
    executor: JobExecutor,
    meshes: MeshCache,
    references: AssetReferenceGraph,
    deformation: DeformationEngine,
    generations: CompletionQueue<GenerationCompletion>,
    generations_in_flight: usize,
    pending: HashMap<AssetId, PendingGenerations>,
    next_request: u64,
}

impl MeshSubsystem {
    pub fn new(flags: RuntimeFlags, executor: JobExecutor, kernel: Arc<dyn DeformationKernel>) -> Self {
        debug!("Starting the mesh subsystem with {:?} on {:?}", flags, executor);
        Self {
            flags,
            deformation: DeformationEngine::new(kernel, executor.clone()),
            executor,
            meshes: MeshCache::new(),
            references: AssetReferenceGraph::new(),
            generations: CompletionQueue::new(),
            generations_in_flight: 0,
            pending: HashMap::new(),
            next_request: 0,
        }
    }

    pub fn flags(&self) -> RuntimeFlags {
        self.flags
    }

    pub fn executor(&self) -> &JobExecutor {
        &self.executor
    }

    pub fn meshes(&self) -> &MeshCache {
        &self.meshes
    }

    pub fn references(&self) -> &AssetReferenceGraph {
        &self.references
    }

    pub fn deformation(&self) -> &DeformationEngine {
        &self.deformation
    }

    /// Inserts or replaces the mesh `id`. Structural problems are reported right away. Authored meshes, synchronous
    /// updates and native meshes that keep their layout and capacities are imported in place. Other native meshes
    /// are generated in the background and committed by [`Self::pump`] as a new asset object; when several of them
    /// are requested before a commit, the latest one wins and the version still advances once per update.
    pub fn create_or_update_mesh(&mut self, id: AssetId, source: MeshSource) -> Result<(), MeshError> {
        profiling::scope!("MeshSubsystem::create_or_update_mesh");
        if !id.is_valid() {
            warn!("Ignoring an update for the invalid mesh id {}", id);
            return Err(MeshError::InvalidAssetId(id));
        }

        if matches!(&source, MeshSource::Native(native) if native.vertex_count == 0) {
            self.pending.remove(&id);
            let version = self.meshes.get_or_placeholder(id).replace(MeshContents::default());
            debug!("Mesh {} has no vertices anymore (v{})", id, version);
            self.references.notify_changed(id, true);
            return Ok(());
        }

        let job = match ImportJob::prepare(source) {
            Ok(job) => job,
            Err(err) => return Err(self.fail(id, err)),
        };

        let asset = self.meshes.get_or_placeholder(id);
        let in_place = match &job {
            ImportJob::Native(_, descriptor) => asset.contents().native_layout.as_ref() == Some(descriptor),
            ImportJob::Authored(_) => true,
        };

        if self.flags.update_meshes_synchronously || in_place {
            // supersedes whatever is still being generated, those tickets fail the version check now
            self.pending.remove(&id);
            let contents = match job.run() {
                Ok(contents) => contents,
                Err(err) => return Err(self.fail(id, err)),
            };
            let version = asset.replace(contents);
            trace!("Updated mesh {} in place to v{}", id, version);
            self.references.notify_changed(id, true);
            return Ok(());
        }

        let ticket = GenerationTicket::new(&asset);
        self.next_request += 1;
        let request = self.next_request;
        let pending = self.pending.entry(id).or_default();
        pending.latest = request;
        pending.updates += 1;
        trace!(
            "Generating mesh {} from v{} ({} update(s) pending)",
            id, ticket.version, pending.updates
        );

        self.generations_in_flight += 1;
        let aborted_ticket = ticket.clone();
        self.executor.spawn(
            self.generations.sender(),
            move || GenerationCompletion {
                ticket,
                request,
                result: job.run(),
            },
            move |err| GenerationCompletion {
                ticket: aborted_ticket,
                request,
                result: Err(err.into()),
            },
        );
        Ok(())
    }

    /// Applies the configuration error policy: panic, or an empty fallback mesh and a notification.
    fn fail(&mut self, id: AssetId, err: MeshError) -> MeshError {
        if self.flags.abort_on_error {
            panic!("Mesh {} can't be imported: {}", id, err);
        }

        error!("Mesh {} can't be imported, falling back to an empty mesh: {}", id, err);
        self.pending.remove(&id);
        self.meshes
            .get_or_placeholder(id)
            .replace(MeshContents::default());
        self.references.notify_changed(id, true);
        err
    }

    /// The current asset object for `id`, a placeholder if the mesh hasn't arrived yet.
    pub fn get_mesh_asset(&mut self, id: AssetId) -> Arc<MeshAsset> {
        if !id.is_valid() {
            warn!("Requested the invalid mesh id {}", id);
        }
        self.meshes.get_or_placeholder(id)
    }

    /// Drops the mesh from the cache. Consumers that still reference it are logged and detached. Returns them.
    pub fn delete_mesh(&mut self, id: AssetId) -> Vec<Consumer> {
        self.pending.remove(&id);
        if self.meshes.remove(id).is_none() {
            debug!("Deleting mesh {}, which isn't cached", id);
        }
        self.references.remove_asset(id)
    }

    pub fn register(&mut self, asset: AssetId, consumer: Consumer) -> bool {
        self.references.register(asset, consumer)
    }

    pub fn unregister(&mut self, asset: AssetId, consumer: Consumer) -> bool {
        self.references.unregister(asset, consumer)
    }

    pub fn notify_changed(&mut self, asset: AssetId, reference_preserved: bool) {
        self.references.notify_changed(asset, reference_preserved);
    }

    /// Drops every reference and observer registration of `consumer`.
    pub fn remove_consumer(&mut self, consumer: Consumer) {
        self.references.remove_consumer(consumer);
    }

    /// Builds the blended instance of `entity` from the current version of `mesh`.
    pub fn create_instance(&mut self, entity: Entity, mesh: AssetId) -> Result<(), DeformationError> {
        let asset = self.meshes.get_or_placeholder(mesh);
        self.deformation.create_instance(entity, asset)
    }

    pub fn destroy_instance(&mut self, entity: Entity) -> bool {
        self.deformation.destroy_instance(entity)
    }

    pub fn request_deformation(
        &mut self,
        entity: Entity,
        weights: &[f32],
        transforms: &[Affine3A],
        on_complete: Option<DeformationCallback>,
    ) -> Result<(), DeformationError> {
        self.deformation
            .request_deformation(entity, weights, transforms, on_complete)
    }

    pub fn deformed_output(&self, entity: Entity) -> Option<Arc<DeformedOutput>> {
        self.deformation.output(entity)
    }

    pub fn texture_updated(&mut self, texture: AssetId) {
        self.references.texture_updated(texture);
    }

    pub fn add_texture_observer(&mut self, texture: AssetId, observer: Consumer) -> bool {
        self.references.add_texture_observer(texture, observer)
    }

    pub fn remove_texture_observer(&mut self, texture: AssetId, observer: Consumer) -> bool {
        self.references.remove_texture_observer(texture, observer)
    }

    pub fn set_material_textures(&mut self, material: AssetId, textures: &[AssetId]) {
        self.references.set_material_textures(material, textures);
    }

    /// Commits every finished mesh generation and deformation. Returns the amount of committed results.
    pub fn pump(&mut self) -> usize {
        profiling::scope!("MeshSubsystem::pump");
        let mut committed = 0;
        while let Some(completion) = self.generations.try_next() {
            if self.commit_generation(completion) {
                committed += 1;
            }
        }
        committed + self.deformation.pump()
    }

    /// Waits for all background work to finish, committing results as they arrive.
    pub async fn settle(&mut self) {
        while self.generations_in_flight > 0 {
            match self.generations.next().await {
                Some(completion) => {
                    self.commit_generation(completion);
                }
                None => break,
            }
        }
        self.deformation.settle().await;
    }

    fn commit_generation(&mut self, completion: GenerationCompletion) -> bool {
        self.generations_in_flight = self.generations_in_flight.saturating_sub(1);
        let GenerationCompletion {
            mut ticket,
            request,
            result,
        } = completion;
        let id = ticket.id;

        match self.pending.get(&id) {
            Some(pending) if pending.latest == request => ticket.updates = pending.updates,
            _ => {
                trace!("Discarding a generation of mesh {}, a newer update superseded it", id);
                return false;
            }
        }
        self.pending.remove(&id);

        let contents = match result {
            Ok(contents) => contents,
            Err(err) => {
                if !ticket.is_current(&self.meshes) {
                    trace!("Ignoring the failed generation of mesh {}, it has been replaced", id);
                    return false;
                }
                self.fail(id, err);
                return false;
            }
        };

        match self.meshes.commit(&ticket, contents) {
            Some(asset) => {
                debug!("Committed mesh {} v{}", id, asset.version());
                self.references.notify_changed(id, false);
                true
            }
            None => false,
        }
    }

    /// Flushes the texture changes of this frame into notifications. Debug builds also verify the reference graph.
    pub fn end_frame(&mut self) {
        profiling::scope!("MeshSubsystem::end_frame");
        self.references.flush_texture_updates();

        if cfg!(debug_assertions) {
            for violation in self.references.check_consistency() {
                warn!("Reference graph is inconsistent: {:?}", violation);
            }
        }
    }

    pub fn drain_notifications(&mut self) -> Vec<AssetNotification> {
        self.references.drain_notifications()
    }

    pub fn convex_shape(&mut self, id: AssetId) -> Result<SharedShape, ShapeError> {
        self.meshes.get_or_placeholder(id).convex_shape()
    }

    pub fn convex_shape_async(&mut self, id: AssetId) -> ShapeFuture {
        self.meshes
            .get_or_placeholder(id)
            .shape_async(ShapeKind::ConvexHull, &self.executor)
    }

    pub fn static_shape_async(&mut self, id: AssetId) -> ShapeFuture {
        self.meshes
            .get_or_placeholder(id)
            .shape_async(ShapeKind::StaticMesh, &self.executor)
    }
}
