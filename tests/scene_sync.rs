use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use glam::{Affine3A, Vec3};
use meshsync::entity::components::rendering::{MeshCollider, RaycastBounds};
use meshsync::entity::entity_tracker::EntityTracker;
use meshsync::entity::systems::systems::Systems;
use meshsync::physics::collider_factory::ShapeKind;
use meshsync::physics::collision_world::CollisionWorld;
use meshsync::rendering::application::{MeshSource, MeshSubsystem};
use meshsync::rendering::asset_graph::references::{AssetNotification, Consumer};
use meshsync::rendering::common::types::AssetId;
use meshsync::rendering::deformation::DeformationError;
use meshsync::rendering::deformation::cpu_kernel::CpuDeformationKernel;
use meshsync::rendering::deformation::kernel::DeformationKernel;
use meshsync::rendering::deformation::packing::{DeformationInputs, DeformedVertex, JointPaletteEntry};
use meshsync::settings::RuntimeFlags;
use meshsync::util::jobs::JobExecutor;
use meshsync_authoring::mesh::{RawBlendShape, RawBlendShapeFrame, RawIndices, RawMesh, RawSubMesh};

const MESH: AssetId = AssetId(21);
const OTHER_MESH: AssetId = AssetId(22);

fn raising_quad(height: f32) -> RawMesh {
    RawMesh {
        positions: vec![
            Vec3::ZERO,
            Vec3::X,
            Vec3::new(1.0, height, 0.0),
            Vec3::new(0.0, height, 0.0),
        ],
        indices: RawIndices::U16(vec![0, 1, 2, 0, 2, 3]),
        sub_meshes: vec![RawSubMesh {
            index_start: 0,
            index_count: 6,
            ..Default::default()
        }],
        blend_shapes: vec![RawBlendShape {
            name: "raise".to_string(),
            frames: vec![RawBlendShapeFrame {
                weight: 1.0,
                delta_positions: vec![Vec3::ZERO, Vec3::ZERO, Vec3::Y, Vec3::Y],
                ..Default::default()
            }],
        }],
        ..Default::default()
    }
}

/// The CPU kernel, counting its dispatches.
#[derive(Default)]
struct CountingKernel {
    dispatches: AtomicUsize,
}

impl DeformationKernel for CountingKernel {
    fn name(&self) -> &'static str {
        "Counting"
    }

    fn deform(
        &self,
        inputs: &Arc<DeformationInputs>,
        frame_weights: &[f32],
        palette: Option<&[JointPaletteEntry]>,
    ) -> Result<Vec<DeformedVertex>, DeformationError> {
        self.dispatches.fetch_add(1, Ordering::SeqCst);
        CpuDeformationKernel.deform(inputs, frame_weights, palette)
    }
}

struct Scene {
    tracker: EntityTracker,
    systems: Systems,
    subsystem: MeshSubsystem,
    collisions: CollisionWorld,
}

impl Scene {
    fn new() -> Self {
        Self::with_kernel(Arc::new(CpuDeformationKernel))
    }

    fn with_kernel(kernel: Arc<dyn DeformationKernel>) -> Self {
        let flags = RuntimeFlags {
            abort_on_error: false,
            update_meshes_synchronously: false,
        };
        Self {
            tracker: EntityTracker::new(),
            systems: Systems::new(),
            subsystem: MeshSubsystem::new(flags, JobExecutor::Inline, kernel),
            collisions: CollisionWorld::new(),
        }
    }

    fn frame(&mut self) {
        self.systems
            .update(&self.tracker, &mut self.subsystem, &mut self.collisions);
    }

    fn bounds(&self, entity: hecs::Entity) -> RaycastBounds {
        let world = self.tracker.world().read().expect("World Read Lock poisoned");
        *world.get::<&RaycastBounds>(entity).expect("registered")
    }
}

#[test]
fn entities_follow_their_mesh() -> Result<(), anyhow::Error> {
    let mut scene = Scene::new();
    scene
        .subsystem
        .create_or_update_mesh(MESH, MeshSource::Authored(raising_quad(1.0)))?;

    let entity = scene.tracker.spawn_mesh(MESH, vec![AssetId(100)], Affine3A::IDENTITY);
    scene.tracker.add_collider(entity, ShapeKind::StaticMesh);
    scene.tracker.set_blend_shape_weights(entity, vec![1.0]);
    scene.frame();

    assert_eq!(
        scene.subsystem.references().assets_of(Consumer::Entity(entity)),
        vec![MESH, AssetId(100)]
    );
    assert!((scene.bounds(entity).0.max.y - 2.0).abs() < 1e-6);
    assert_eq!(scene.collisions.collider_count(), 1);

    // a taller quad, the entity rebuilds from the notification
    scene
        .subsystem
        .create_or_update_mesh(MESH, MeshSource::Authored(raising_quad(3.0)))?;
    scene.frame();

    let current = scene.subsystem.get_mesh_asset(MESH).version();
    let instance = scene.subsystem.deformation().instance(entity).expect("deformable");
    assert_eq!(instance.version(), current);
    assert!((scene.bounds(entity).0.max.y - 4.0).abs() < 1e-6);
    assert_eq!(scene.collisions.collider_count(), 1);

    {
        let world = scene.tracker.world().read().expect("World Read Lock poisoned");
        let collider = world.get::<&MeshCollider>(entity).expect("collider");
        assert!(!collider.dirty);
        assert!(collider.handle.is_some());
    }

    scene
        .tracker
        .despawn(entity, &mut scene.subsystem, &mut scene.collisions);
    assert_eq!(scene.collisions.collider_count(), 0);
    assert_eq!(scene.subsystem.references().reference_count(MESH), 0);
    assert_eq!(scene.subsystem.deformation().instance_count(), 0);
    Ok(())
}

#[test]
fn texture_edits_reach_materials_once_per_frame() {
    let mut scene = Scene::new();
    let material = AssetId(100);
    scene.subsystem.set_material_textures(material, &[AssetId(200), AssetId(201)]);

    scene.subsystem.texture_updated(AssetId(200));
    scene.subsystem.texture_updated(AssetId(201));
    scene.subsystem.texture_updated(AssetId(200));
    scene.subsystem.end_frame();

    assert_eq!(
        scene.subsystem.drain_notifications(),
        vec![AssetNotification::TexturesChanged {
            observer: Consumer::Material(material),
            textures: vec![AssetId(200), AssetId(201)],
        }]
    );
    scene.subsystem.end_frame();
    assert!(scene.subsystem.drain_notifications().is_empty());
}

#[test]
fn idle_frames_dispatch_nothing() -> Result<(), anyhow::Error> {
    let kernel = Arc::new(CountingKernel::default());
    let mut scene = Scene::with_kernel(kernel.clone());
    scene
        .subsystem
        .create_or_update_mesh(MESH, MeshSource::Authored(raising_quad(1.0)))?;

    let entity = scene.tracker.spawn_mesh(MESH, vec![], Affine3A::IDENTITY);
    scene.tracker.set_blend_shape_weights(entity, vec![0.5]);
    scene.frame();
    assert_eq!(kernel.dispatches.load(Ordering::SeqCst), 1);

    scene.frame();
    scene.frame();
    assert_eq!(kernel.dispatches.load(Ordering::SeqCst), 1);

    scene.tracker.set_blend_shape_weights(entity, vec![1.0]);
    scene.frame();
    // committed by the next frame, which has nothing new to submit
    scene.frame();
    assert_eq!(kernel.dispatches.load(Ordering::SeqCst), 2);
    assert!((scene.bounds(entity).0.max.y - 2.0).abs() < 1e-6);
    Ok(())
}

#[test]
fn reassigned_meshes_move_their_references() -> Result<(), anyhow::Error> {
    let mut scene = Scene::new();
    let material = AssetId(100);
    scene
        .subsystem
        .create_or_update_mesh(MESH, MeshSource::Authored(raising_quad(1.0)))?;
    scene
        .subsystem
        .create_or_update_mesh(OTHER_MESH, MeshSource::Authored(raising_quad(3.0)))?;

    let entity = scene.tracker.spawn_mesh(MESH, vec![material], Affine3A::IDENTITY);
    scene.tracker.set_blend_shape_weights(entity, vec![1.0]);
    scene.frame();
    assert!((scene.bounds(entity).0.max.y - 2.0).abs() < 1e-6);

    scene.tracker.set_mesh(entity, OTHER_MESH);
    scene.frame();

    assert_eq!(
        scene.subsystem.references().assets_of(Consumer::Entity(entity)),
        vec![OTHER_MESH, material]
    );
    assert_eq!(scene.subsystem.references().reference_count(MESH), 0);
    assert_eq!(scene.subsystem.references().reference_count(OTHER_MESH), 1);
    let instance = scene.subsystem.deformation().instance(entity).expect("deformable");
    assert_eq!(instance.asset().id(), OTHER_MESH);
    assert!((scene.bounds(entity).0.max.y - 4.0).abs() < 1e-6);

    // edits of the old mesh don't reach the entity anymore
    scene
        .subsystem
        .create_or_update_mesh(MESH, MeshSource::Authored(raising_quad(7.0)))?;
    scene.frame();
    assert!((scene.bounds(entity).0.max.y - 4.0).abs() < 1e-6);
    Ok(())
}
