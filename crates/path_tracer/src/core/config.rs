//! # Tracer Configuration
//!
//! All knobs of the progressive tracer live in one serializable structure so
//! that the discovery policy, record layout and blend strategy are explicit
//! configuration rather than separate code paths.
//!
//! ## Configuration Categories
//!
//! - **Render Settings**: per-frame shading parameters (bounces, samples,
//!   progressive mode, preview viewpoints)
//! - **Scene Settings**: primitive discovery scope and record layout
//! - **Accumulation Settings**: blend strategy
//! - **Shader Settings**: identity of the paired shading program

use serde::{Serialize, Deserialize};

pub use crate::config::{Config, ConfigError};
use crate::render::accumulation::BlendStrategy;
use crate::render::marshal::RecordLayout;
use crate::scene::DiscoveryScope;

/// Per-frame parameters forwarded to the shading program
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderSettings {
    /// Maximum number of bounces per path
    pub max_bounces: u32,
    /// Samples per pixel per frame (must be at least 1)
    pub samples_per_pixel: u32,
    /// Accumulate successive frames into a running average
    pub progressive: bool,
    /// Let the shading program draw its environment background
    pub use_background: bool,
    /// Seed offset forwarded to the shading program
    pub time: i32,
    /// Also shade secondary (preview) viewpoints instead of passing them through
    pub render_in_preview: bool,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            max_bounces: 3,
            samples_per_pixel: 2,
            progressive: false,
            use_background: true,
            time: 0,
            render_in_preview: false,
        }
    }
}

impl RenderSettings {
    /// Check the values the shading program relies on
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.samples_per_pixel == 0 {
            return Err(ConfigError::Invalid("samples_per_pixel must be at least 1".to_string()));
        }
        Ok(())
    }
}

/// Scene discovery and serialization settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SceneSettings {
    /// Which objects are considered when collecting primitives
    pub discovery: DiscoveryScope,
    /// Record layout expected by the paired shading program
    pub layout: RecordLayout,
}

/// Accumulation settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AccumulationSettings {
    /// How new samples are combined with the running average
    pub strategy: BlendStrategy,
}

/// # Shader Configuration
///
/// Names the shading program the marshaled layout and parameter set are
/// paired with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShaderSettings {
    /// Name of the paired shading program
    pub program: String,
}

impl Default for ShaderSettings {
    fn default() -> Self {
        Self {
            program: "sphere_pathtracer".to_string(),
        }
    }
}

/// Complete tracer configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct TracerConfig {
    /// Shading parameters
    pub render: RenderSettings,
    /// Discovery and layout
    pub scene: SceneSettings,
    /// Accumulation strategy
    pub accumulation: AccumulationSettings,
    /// Paired shading program
    pub shader: ShaderSettings,
}

impl Config for TracerConfig {}

impl TracerConfig {
    /// Builder pattern: Toggle progressive accumulation
    pub fn with_progressive(mut self, progressive: bool) -> Self {
        self.render.progressive = progressive;
        self
    }

    /// Builder pattern: Set discovery scope
    pub fn with_discovery(mut self, discovery: DiscoveryScope) -> Self {
        self.scene.discovery = discovery;
        self
    }

    /// Builder pattern: Set record layout
    pub fn with_layout(mut self, layout: RecordLayout) -> Self {
        self.scene.layout = layout;
        self
    }

    /// Builder pattern: Set blend strategy
    pub fn with_strategy(mut self, strategy: BlendStrategy) -> Self {
        self.accumulation.strategy = strategy;
        self
    }

    /// Validate value ranges that serde cannot express
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.render.validate()?;
        if let DiscoveryScope::ChildrenOf { container } = &self.scene.discovery {
            if container.trim().is_empty() {
                return Err(ConfigError::Invalid("discovery container name is empty".to_string()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TracerConfig::default();
        assert_eq!(config.render.max_bounces, 3);
        assert_eq!(config.render.samples_per_pixel, 2);
        assert!(!config.render.progressive);
        assert!(config.render.use_background);
        assert_eq!(config.scene.discovery, DiscoveryScope::Global);
        assert_eq!(config.scene.layout, RecordLayout::WithRoughness);
        assert_eq!(config.accumulation.strategy, BlendStrategy::FrameStacking);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_partial_toml() {
        let toml = r#"
            [render]
            samples_per_pixel = 8
            progressive = true

            [scene]
            layout = "Basic"

            [scene.discovery.ChildrenOf]
            container = "Spheres"

            [accumulation]
            strategy = "ExternalHistory"
        "#;

        let config = TracerConfig::from_toml_str(toml).expect("valid toml");
        assert_eq!(config.render.samples_per_pixel, 8);
        assert!(config.render.progressive);
        assert_eq!(config.render.max_bounces, 3);
        assert_eq!(config.scene.layout, RecordLayout::Basic);
        assert_eq!(
            config.scene.discovery,
            DiscoveryScope::ChildrenOf { container: "Spheres".to_string() }
        );
        assert_eq!(config.accumulation.strategy, BlendStrategy::ExternalHistory);
    }

    #[test]
    fn test_validate_rejects_zero_samples() {
        let mut config = TracerConfig::default();
        config.render.samples_per_pixel = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_validate_rejects_empty_container() {
        let config = TracerConfig::default()
            .with_discovery(DiscoveryScope::ChildrenOf { container: "  ".to_string() });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_save_and_load_ron() {
        let path = std::env::temp_dir().join(format!("path_tracer_config_{}.ron", std::process::id()));
        let config = TracerConfig::default()
            .with_progressive(true)
            .with_strategy(BlendStrategy::ExternalHistory);

        config.save_to_file(&path).expect("save");
        let loaded = TracerConfig::load_from_file(&path).expect("load");
        let _ = std::fs::remove_file(&path);

        assert_eq!(loaded, config);
    }

    #[test]
    fn test_unsupported_extension() {
        let result = TracerConfig::load_from_file("tracer.yaml");
        assert!(matches!(result, Err(ConfigError::UnsupportedFormat(_))));
    }
}
