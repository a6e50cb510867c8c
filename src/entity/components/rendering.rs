use glam::Affine3A;
use rapier3d::geometry::ColliderHandle;

use crate::physics::collider_factory::{ShapeFuture, ShapeKind};
use crate::rendering::common::types::{Aabb, AssetId};

/// Draws a mesh asset with one material per part.
#[derive(Debug, Clone, PartialEq)]
pub struct MeshRenderer {
    pub mesh: AssetId,
    pub materials: Vec<AssetId>,
}

/// The renderer as the mesh sync system registered it with the reference graph. Differs from the [`MeshRenderer`]
/// after the entity has been pointed at another mesh or other materials.
#[derive(Debug, Clone, PartialEq)]
pub struct RegisteredAssets(pub MeshRenderer);

/// Set when weights, joint transforms or the instance changed since the last deformation request.
#[derive(Debug, Copy, Clone, Default)]
pub struct DeformationDirty;

/// Local space bounds used for picking, either of the undeformed mesh or of the latest deformation.
#[derive(Debug, Copy, Clone, PartialEq, Default)]
pub struct RaycastBounds(pub Aabb);

/// One weight per blend shape of the mesh, missing weights count as zero.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BlendShapeWeights(pub Vec<f32>);

/// Local transforms of the skeleton's joints, missing joints stay at identity.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct JointTransforms(pub Vec<Affine3A>);

/// A collider derived from the entity's mesh. Marked dirty whenever the mesh changes and rebuilt at the end of the
/// frame.
pub struct MeshCollider {
    pub kind: ShapeKind,
    pub handle: Option<ColliderHandle>,
    pub dirty: bool,
    /// The shape being generated and the mesh version it is generated from.
    pub pending: Option<(ShapeFuture, u64)>,
}

impl MeshCollider {
    pub fn new(kind: ShapeKind) -> Self {
        Self {
            kind,
            handle: None,
            dirty: true,
            pending: None,
        }
    }
}
