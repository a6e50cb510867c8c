//! This module keeps track of which mesh object currently represents an asset id and who depends on it.
//!
//! A [`mesh_asset::MeshAsset`] is shared behind an [`std::sync::Arc`]. Whoever holds the Arc holds a
//! stable identity: synchronous updates replace the contents in place and bump the version, so consumers
//! can keep their handle and only have to look at the version (an opaque token) to notice changes.
//!
//! Background generation is different: the result is computed from a snapshot and only committed if the
//! [`mesh_cache::MeshCache`] still maps the id to the very same object at the very same version it was
//! started from (see [`mesh_cache::GenerationTicket`]). Otherwise the result is simply dropped, there is
//! no cancellation. A committed result becomes a new object, which continues the version sequence of the
//! one it replaces.
//!
//! Who uses which asset is recorded in the [`references::AssetReferenceGraph`], which also aggregates
//! texture changes over a frame and turns them into notifications for the scene.
//!
//! Note: Derived data (packed deformation inputs, collision shapes) lives on the asset itself and is
//! dropped together with the contents it was derived from.

pub mod mesh_asset;
pub mod mesh_cache;
pub mod references;
