use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use arc_swap::{ArcSwap, ArcSwapOption};
use futures::FutureExt;
use log::trace;
use rapier3d::geometry::SharedShape;

use crate::physics::collider_factory::{ColliderFactory, ShapeError, ShapeFuture, ShapeKind};
use crate::rendering::blend_shapes::BlendShapeSet;
use crate::rendering::common::types::{Aabb, AssetId, RenderMesh, SkinBinding, VertexRanges};
use crate::rendering::deformation::DeformationError;
use crate::rendering::deformation::packing::DeformationInputs;
use crate::rendering::importer::native_importer::NativeLayoutDescriptor;
use crate::util::jobs::JobExecutor;

/// The immutable result of importing one version of a mesh.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MeshContents {
    pub render: RenderMesh,
    pub blend_shapes: BlendShapeSet,
    pub skin: Option<SkinBinding>,
    pub vertex_ranges: VertexRanges,
    /// Only set for meshes that have been ingested from native streams, used to decide whether the allocation of
    /// the previous version can be reused.
    pub native_layout: Option<NativeLayoutDescriptor>,
}

impl MeshContents {
    /// Instances of this mesh need a deformation pass.
    pub fn is_deformable(&self) -> bool {
        !self.blend_shapes.is_empty() || self.skin.is_some()
    }

    pub fn vertex_count(&self) -> usize {
        self.render.vertex_count
    }

    pub fn index_count(&self) -> usize {
        self.render.index_buffer.len()
    }

    pub fn blend_shape_frame_count(&self) -> usize {
        self.blend_shapes.frame_count()
    }

    pub fn joint_influences_per_vertex(&self) -> usize {
        self.skin
            .as_ref()
            .map_or(0, |skin| skin.influences.per_vertex)
    }

    pub fn joint_count(&self) -> usize {
        self.skin
            .as_ref()
            .map_or(0, |skin| skin.skeleton.joint_count())
    }

    pub fn uv_set_count(&self) -> usize {
        self.render.layout.uv_set_count()
    }

    pub fn part_count(&self) -> usize {
        self.render.parts.len()
    }

    pub fn bounds(&self) -> Aabb {
        self.render.bounds()
    }
}

#[derive(Default)]
struct ShapeFutures {
    convex_hull: Option<ShapeFuture>,
    static_mesh: Option<ShapeFuture>,
}

impl ShapeFutures {
    fn slot(&mut self, kind: ShapeKind) -> &mut Option<ShapeFuture> {
        match kind {
            ShapeKind::ConvexHull => &mut self.convex_hull,
            ShapeKind::StaticMesh => &mut self.static_mesh,
        }
    }
}

/// A mesh as the rest of the scene sees it: a stable identity (this object, behind an `Arc`) whose contents may be
/// replaced in place. Everything derived from the contents (collision shapes, packed deformation inputs) is cached
/// here and dropped whenever the version changes.
pub struct MeshAsset {
    id: AssetId,
    version: AtomicU64,
    contents: ArcSwap<MeshContents>,
    convex_shape: ArcSwapOption<SharedShape>,
    deformation_inputs: ArcSwapOption<DeformationInputs>,
    shape_futures: Mutex<ShapeFutures>,
}

impl std::fmt::Debug for MeshAsset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MeshAsset")
            .field("id", &self.id)
            .field("version", &self.version())
            .field("contents", &self.contents.load_full())
            .finish()
    }
}

impl MeshAsset {
    pub fn new(id: AssetId, contents: MeshContents) -> Self {
        Self::with_version(id, 0, contents)
    }

    /// The asset handed out for ids that have been referenced before their data arrived.
    pub fn placeholder(id: AssetId) -> Self {
        Self::new(id, MeshContents::default())
    }

    /// A new identity that replaces `previous` in the cache, continuing its version sequence. `updates` is the amount
    /// of content updates the new contents stand for, each of them counts as one version.
    pub fn successor(previous: &MeshAsset, contents: MeshContents, updates: u64) -> Self {
        Self::with_version(previous.id, previous.version() + updates.max(1), contents)
    }

    fn with_version(id: AssetId, version: u64, contents: MeshContents) -> Self {
        Self {
            id,
            version: AtomicU64::new(version),
            contents: ArcSwap::from_pointee(contents),
            convex_shape: ArcSwapOption::empty(),
            deformation_inputs: ArcSwapOption::empty(),
            shape_futures: Mutex::new(ShapeFutures::default()),
        }
    }

    pub fn id(&self) -> AssetId {
        self.id
    }

    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    pub fn contents(&self) -> Arc<MeshContents> {
        self.contents.load_full()
    }

    /// Replaces the contents while keeping the identity. Derived caches are cleared before the version is bumped,
    /// so anyone observing the new version never sees stale shapes.
    pub fn replace(&self, contents: MeshContents) -> u64 {
        self.contents.store(Arc::new(contents));
        self.clear_derived();
        self.version.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Drops everything derived from the contents, as happens on deletion.
    pub fn clear_derived(&self) {
        self.convex_shape.store(None);
        self.deformation_inputs.store(None);
        let mut futures = self.shape_futures.lock().expect("Shape Futures Lock");
        *futures = ShapeFutures::default();
    }

    pub fn is_deformable(&self) -> bool {
        self.contents.load().is_deformable()
    }

    /// The packed kernel inputs of the current version, built on first use.
    pub fn deformation_inputs(&self) -> Result<Arc<DeformationInputs>, DeformationError> {
        if let Some(inputs) = self.deformation_inputs.load_full() {
            return Ok(inputs);
        }

        let contents = self.contents();
        if !contents.is_deformable() {
            return Err(DeformationError::NotDeformable);
        }

        let inputs = Arc::new(DeformationInputs::build(&contents)?);
        self.deformation_inputs.store(Some(inputs.clone()));
        Ok(inputs)
    }

    /// Builds the convex hull on the calling thread, cached until the next version change.
    pub fn convex_shape(&self) -> Result<SharedShape, ShapeError> {
        if let Some(shape) = self.convex_shape.load_full() {
            return Ok(shape.as_ref().clone());
        }

        let version = self.version();
        let shape = ColliderFactory::build_shape(&self.contents(), ShapeKind::ConvexHull)?;
        if self.version() == version {
            self.convex_shape.store(Some(Arc::new(shape.clone())));
        }
        Ok(shape)
    }

    /// Starts generating the shape in the background, unless a generation for the current version is already
    /// running, in which case its future is shared.
    pub fn shape_async(&self, kind: ShapeKind, executor: &JobExecutor) -> ShapeFuture {
        let mut futures = self.shape_futures.lock().expect("Shape Futures Lock");
        let slot = futures.slot(kind);
        if let Some(future) = slot {
            return future.clone();
        }

        trace!("Generating {:?} for mesh {} v{}", kind, self.id, self.version());
        let contents = self.contents();
        let job = executor.run(move || ColliderFactory::build_shape(&contents, kind));
        let future = async move {
            match job.await {
                Ok(result) => result,
                Err(err) => Err(ShapeError::from(err)),
            }
        }
        .boxed()
        .shared();
        *slot = Some(future.clone());
        future
    }
}
