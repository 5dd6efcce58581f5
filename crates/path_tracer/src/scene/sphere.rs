//! Sphere capability and surface material
//!
//! A scene object becomes a renderable sphere by carrying a [`SphereComponent`].
//! The component only holds material data; position and radius are read live
//! from the owning object's world transform every frame.

use serde::{Serialize, Deserialize};

use crate::foundation::math::{Vec3, Vec4};

/// Number of channels in the full material vector (including roughness)
pub const MATERIAL_CHANNELS: usize = 9;

/// Surface material of a sphere primitive
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SurfaceMaterial {
    /// Base color (RGBA)
    pub color: Vec4,
    /// Emission color (RGB)
    pub emission_color: Vec3,
    /// Emission strength multiplier
    pub emission_strength: f32,
    /// Surface roughness in `[0, 1]`; only marshaled by layouts that carry it
    pub roughness: f32,
}

impl Default for SurfaceMaterial {
    fn default() -> Self {
        Self {
            color: Vec4::new(1.0, 1.0, 1.0, 1.0),
            emission_color: Vec3::zeros(),
            emission_strength: 0.0,
            roughness: 0.0,
        }
    }
}

impl SurfaceMaterial {
    /// Opaque, non-emissive material with the given RGB color
    pub fn diffuse(r: f32, g: f32, b: f32) -> Self {
        Self {
            color: Vec4::new(r, g, b, 1.0),
            ..Default::default()
        }
    }

    /// Emissive material (white base color)
    pub fn emissive(emission_color: Vec3, strength: f32) -> Self {
        Self {
            emission_color,
            emission_strength: strength,
            ..Default::default()
        }
    }

    /// Builder pattern: Set roughness (clamped to `[0, 1]`)
    pub fn with_roughness(mut self, roughness: f32) -> Self {
        self.roughness = roughness.clamp(0.0, 1.0);
        self
    }

    /// Fixed-order material vector
    ///
    /// `{r, g, b, a, emission_r, emission_g, emission_b, emission_strength, roughness}`.
    /// Layouts without roughness consume only the first eight channels.
    pub fn channels(&self) -> [f32; MATERIAL_CHANNELS] {
        [
            self.color.x,
            self.color.y,
            self.color.z,
            self.color.w,
            self.emission_color.x,
            self.emission_color.y,
            self.emission_color.z,
            self.emission_strength,
            self.roughness,
        ]
    }

    /// Rebuild a material from its channel vector
    pub fn from_channels(channels: &[f32; MATERIAL_CHANNELS]) -> Self {
        Self {
            color: Vec4::new(channels[0], channels[1], channels[2], channels[3]),
            emission_color: Vec3::new(channels[4], channels[5], channels[6]),
            emission_strength: channels[7],
            roughness: channels[8],
        }
    }

    /// Emitted radiance (emission color scaled by strength)
    pub fn emitted(&self) -> Vec3 {
        self.emission_color * self.emission_strength
    }
}

/// Marks a scene object as a sphere primitive
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SphereComponent {
    /// Material read by the marshaler each frame
    pub material: SurfaceMaterial,
}

impl SphereComponent {
    /// Create a sphere component with the given material
    pub fn new(material: SurfaceMaterial) -> Self {
        Self { material }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_order() {
        let material = SurfaceMaterial {
            color: Vec4::new(0.1, 0.2, 0.3, 0.4),
            emission_color: Vec3::new(0.5, 0.6, 0.7),
            emission_strength: 2.0,
            roughness: 0.25,
        };
        assert_eq!(material.channels(), [0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 2.0, 0.25]);
        assert_eq!(SurfaceMaterial::from_channels(&material.channels()), material);
    }

    #[test]
    fn test_roughness_is_clamped() {
        assert_eq!(SurfaceMaterial::default().with_roughness(3.0).roughness, 1.0);
        assert_eq!(SurfaceMaterial::default().with_roughness(-1.0).roughness, 0.0);
    }
}
