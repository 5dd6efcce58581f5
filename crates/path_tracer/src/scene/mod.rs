//! Scene management
//!
//! The scene side of the tracer: an object registry with parent/child links
//! and an explicit index of sphere primitives, plus the discovery policy the
//! marshaler uses to pick which spheres are rendered.

pub mod registry;
pub mod sphere;

use serde::{Serialize, Deserialize};

pub use registry::{ObjectKey, SceneError, SceneObject, SceneRegistry};
pub use sphere::{SphereComponent, SurfaceMaterial, MATERIAL_CHANNELS};

/// Which objects the marshaler considers when collecting spheres
///
/// The two policies render different scenes when spheres are parented
/// outside the container, so the choice is explicit configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum DiscoveryScope {
    /// Every registered sphere that is active in the hierarchy
    #[default]
    Global,
    /// Active direct children of the named container object
    ///
    /// Every active child must carry the sphere capability.
    ChildrenOf {
        /// Name of the container object
        container: String,
    },
}
