//! # Path Tracer
//!
//! Per-frame orchestration of a progressive sphere path tracer.
//!
//! ## Features
//!
//! - **Viewport Projection**: camera intrinsics to near-plane ray parameters
//! - **Scene Marshaling**: live sphere primitives packed into a fixed,
//!   16-byte aligned record layout for the shading program
//! - **Progressive Accumulation**: per-viewpoint running average with
//!   edge-triggered reset and two interchangeable blend strategies
//! - **Scoped Device Buffers**: the per-frame sphere buffer is released
//!   exactly once on every exit path
//! - **Configuration**: one TOML/RON document selects discovery scope,
//!   record layout and blend strategy
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use path_tracer::prelude::*;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut scene = SceneRegistry::new();
//!     scene.spawn_sphere(
//!         "Ball",
//!         Transform::from_position_scale(Vec3::new(0.0, 0.0, -5.0), 2.0),
//!         SphereComponent::new(SurfaceMaterial::diffuse(0.8, 0.2, 0.2)),
//!     );
//!
//!     let config = TracerConfig::default().with_progressive(true);
//!     let program: Box<dyn ShadingProgram> = Box::new(CpuShadingProgram::new());
//!     let mut orchestrator = RenderOrchestrator::new(config, HostDevice::new(), Some(program))?;
//!
//!     let source = Image::new(320, 180);
//!     let mut target = Image::new(320, 180);
//!     let camera = CameraIntrinsics::for_target(60.0, 320, 180, 0.1, CameraPose::default())?;
//!     for _ in 0..16 {
//!         let request = FrameRequest {
//!             viewpoint: ViewpointId(0),
//!             kind: ViewpointKind::Primary,
//!             camera,
//!             source: &source,
//!         };
//!         orchestrator.render_frame(&scene, request, &mut target)?;
//!     }
//!     target.save_png("render.png")?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

pub mod config;
pub mod core;
pub mod foundation;
pub mod render;
pub mod scene;

/// Common imports for tracer users
pub mod prelude {
    pub use crate::{
        config::{Config, ConfigError},
        core::config::TracerConfig,
        foundation::math::{CameraPose, Transform, Vec3, Vec4},
        render::{
            BlendStrategy, CameraIntrinsics, CpuShadingProgram, FrameOutcome, FrameRequest, HostDevice, Image,
            RecordLayout, RenderError, RenderOrchestrator, RenderPath, RenderResult, ShadingDevice,
            ShadingProgram, ViewpointId, ViewpointKind,
        },
        scene::{DiscoveryScope, ObjectKey, SceneRegistry, SphereComponent, SurfaceMaterial},
    };
}
