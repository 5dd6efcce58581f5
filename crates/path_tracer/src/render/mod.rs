//! # Rendering System
//!
//! Per-frame orchestration of the progressive sphere path tracer.
//!
//! ## Architecture
//!
//! The rendering system is split along the stages of one frame:
//! - **Viewport**: camera intrinsics to near-plane ray-generation parameters
//! - **Marshal**: live sphere primitives to a fixed-layout byte buffer
//! - **Shading**: the seam to the external shading program and its device
//! - **Accumulation**: per-viewpoint running average across frames
//! - **Orchestrator**: sequences the stages and owns per-frame resources
//!
//! The shading program itself is external. [`cpu_program::CpuShadingProgram`]
//! implements the same contract in software for tests and the demo app.

pub mod accumulation;
pub mod cpu_program;
pub mod image;
pub mod marshal;
pub mod orchestrator;
pub mod shading;
pub mod viewport;


use thiserror::Error;

use crate::config::ConfigError;

pub use accumulation::{AccumulationEngine, AccumulationPhase, AccumulationState, BlendStrategy};
pub use cpu_program::CpuShadingProgram;
pub use self::image::Image;
pub use marshal::{MarshalError, RecordLayout, SceneBuffer, SceneMarshaler, SpherePrimitive};
pub use orchestrator::{FrameOutcome, FrameRequest, RenderOrchestrator, RenderPath, ViewpointId, ViewpointKind};
pub use shading::{BufferHandle, DeviceBuffer, DeviceError, HostDevice, ShadingDevice, ShadingParams, ShadingProgram};
pub use viewport::{compute_viewport, CameraIntrinsics, Ray, ViewportError, ViewportParams};

/// High-level rendering error types
///
/// Wraps the error of whichever frame stage failed. Every variant is a
/// configuration or resource problem; the orchestrator still writes the
/// destination image (as a pass-through copy) before surfacing it.
#[derive(Error, Debug)]
pub enum RenderError {
    /// Camera intrinsics cannot produce finite ray-generation parameters
    #[error("Viewport error: {0}")]
    Viewport(#[from] ViewportError),

    /// Scene could not be serialized for the shading program
    #[error("Marshal error: {0}")]
    Marshal(#[from] MarshalError),

    /// Settings changed between frames are out of range
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Device buffer allocation or release failed
    #[error("Device error: {0}")]
    Device(#[from] DeviceError),

    /// The shading program reported a failure
    #[error("Shading failed: {0}")]
    ShadingFailed(String),

    /// Two images that must match in size do not
    #[error("Image size mismatch: expected {expected:?}, got {actual:?}")]
    SizeMismatch {
        /// Expected (width, height)
        expected: (u32, u32),
        /// Actual (width, height)
        actual: (u32, u32),
    },

    /// Writing an image to disk failed
    #[error("Image output failed: {0}")]
    Output(String),
}

/// Result type for rendering operations
pub type RenderResult<T> = Result<T, RenderError>;
