//! # Core Module
//!
//! Shared abstractions used by every subsystem of the tracer.
//!
//! ## Organization
//!
//! - **Config**: Unified configuration for rendering, discovery and accumulation

pub mod config;

// Re-export commonly used config types
pub use config::{
    TracerConfig,
    RenderSettings,
    SceneSettings,
    AccumulationSettings,
    ShaderSettings,
    Config,
    ConfigError,
};
