//! Math utilities and types
//!
//! Provides the fundamental math types used by the tracer: vector and matrix
//! aliases over nalgebra, a TRS transform for scene objects, and the
//! right/up/forward camera pose used for ray generation.

pub use nalgebra::{
    Vector3, Vector4,
    Matrix4,
    Quaternion,
    Unit,
};

/// 3D vector type
pub type Vec3 = Vector3<f32>;

/// 4D vector type
pub type Vec4 = Vector4<f32>;

/// 4x4 matrix type
pub type Mat4 = Matrix4<f32>;

/// Quaternion type for rotations
pub type Quat = Unit<Quaternion<f32>>;

/// Transform representing position, rotation, and scale
#[derive(Debug, Clone, PartialEq)]
pub struct Transform {
    /// Position in 3D space
    pub position: Vec3,

    /// Rotation quaternion
    pub rotation: Quat,

    /// Scale factors
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::zeros(),
            rotation: Quat::identity(),
            scale: Vec3::new(1.0, 1.0, 1.0),
        }
    }
}

impl Transform {
    /// Create a new identity transform
    pub fn identity() -> Self {
        Self::default()
    }

    /// Create a transform with only position
    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }

    /// Create a transform with a position and a uniform scale
    pub fn from_position_scale(position: Vec3, scale: f32) -> Self {
        Self {
            position,
            scale: Vec3::new(scale, scale, scale),
            ..Default::default()
        }
    }

    /// Builder pattern: Set rotation
    pub fn with_rotation(mut self, rotation: Quat) -> Self {
        self.rotation = rotation;
        self
    }

    /// Builder pattern: Set non-uniform scale
    pub fn with_scale(mut self, scale: Vec3) -> Self {
        self.scale = scale;
        self
    }

    /// Convert to a transformation matrix (TRS order)
    pub fn to_matrix(&self) -> Mat4 {
        Mat4::new_translation(&self.position)
            * self.rotation.to_homogeneous()
            * Mat4::new_nonuniform_scaling(&self.scale)
    }

    /// Combine this (parent) transform with a child transform
    ///
    /// The result maps the child's local space directly into this transform's
    /// parent space.
    pub fn combine(&self, other: &Transform) -> Transform {
        Transform {
            position: self.position + self.rotation * (self.scale.component_mul(&other.position)),
            rotation: self.rotation * other.rotation,
            scale: self.scale.component_mul(&other.scale),
        }
    }

    /// Whether all three scale factors are equal within `epsilon`
    pub fn has_uniform_scale(&self, epsilon: f32) -> bool {
        (self.scale.x - self.scale.y).abs() <= epsilon && (self.scale.x - self.scale.z).abs() <= epsilon
    }
}

/// World-space camera pose expressed as an orthonormal right/up/forward basis
///
/// Camera-local coordinates map to world space as
/// `position + right * x + up * y + forward * z`, so the near plane sits at
/// local `z = near`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraPose {
    /// Camera position in world space
    pub position: Vec3,
    /// Local +X axis in world space
    pub right: Vec3,
    /// Local +Y axis in world space
    pub up: Vec3,
    /// Local +Z axis (view direction) in world space
    pub forward: Vec3,
}

impl CameraPose {
    /// Build a pose at `position` looking towards `target`
    ///
    /// `up` does not need to be perpendicular to the view direction; the basis
    /// is re-orthonormalised. Returns `None` when the view direction is zero
    /// or parallel to `up`.
    pub fn look_at(position: Vec3, target: Vec3, up: Vec3) -> Option<Self> {
        let forward = (target - position).try_normalize(f32::EPSILON)?;
        let right = forward.cross(&up).try_normalize(f32::EPSILON)?;
        let up = right.cross(&forward);
        Some(Self { position, right, up, forward })
    }

    /// Camera-local to world matrix (columns: right, up, forward, position)
    pub fn local_to_world(&self) -> Mat4 {
        Mat4::new(
            self.right.x, self.up.x, self.forward.x, self.position.x,
            self.right.y, self.up.y, self.forward.y, self.position.y,
            self.right.z, self.up.z, self.forward.z, self.position.z,
            0.0, 0.0, 0.0, 1.0,
        )
    }

    /// Map a camera-local point into world space
    pub fn to_world(&self, local: Vec3) -> Vec3 {
        self.position + self.right * local.x + self.up * local.y + self.forward * local.z
    }
}

impl Default for CameraPose {
    /// Camera at the origin looking down -Z with +Y up
    fn default() -> Self {
        Self {
            position: Vec3::zeros(),
            right: Vec3::new(1.0, 0.0, 0.0),
            up: Vec3::new(0.0, 1.0, 0.0),
            forward: Vec3::new(0.0, 0.0, -1.0),
        }
    }
}

/// Math constants
pub mod constants {
    /// Pi constant
    pub const PI: f32 = std::f32::consts::PI;

    /// Degrees to radians conversion factor
    pub const DEG_TO_RAD: f32 = PI / 180.0;

    /// Radians to degrees conversion factor
    pub const RAD_TO_DEG: f32 = 180.0 / PI;
}

/// Math utility functions
pub mod utils {
    use super::constants;

    /// Convert degrees to radians
    pub fn deg_to_rad(degrees: f32) -> f32 {
        degrees * constants::DEG_TO_RAD
    }

    /// Convert radians to degrees
    pub fn rad_to_deg(radians: f32) -> f32 {
        radians * constants::RAD_TO_DEG
    }

    /// Linear interpolation
    pub fn lerp(a: f32, b: f32, t: f32) -> f32 {
        a + (b - a) * t
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_default_pose_looks_down_negative_z() {
        let pose = CameraPose::default();
        let world = pose.to_world(Vec3::new(0.0, 0.0, 1.0));
        assert_relative_eq!(world, Vec3::new(0.0, 0.0, -1.0));
    }

    #[test]
    fn test_look_at_matches_default_basis() {
        let pose = CameraPose::look_at(Vec3::zeros(), Vec3::new(0.0, 0.0, -5.0), Vec3::y())
            .expect("valid look-at");
        assert_relative_eq!(pose.right, Vec3::x(), epsilon = 1e-6);
        assert_relative_eq!(pose.up, Vec3::y(), epsilon = 1e-6);
        assert_relative_eq!(pose.forward, -Vec3::z(), epsilon = 1e-6);
    }

    #[test]
    fn test_look_at_rejects_degenerate_direction() {
        assert!(CameraPose::look_at(Vec3::zeros(), Vec3::zeros(), Vec3::y()).is_none());
        assert!(CameraPose::look_at(Vec3::zeros(), Vec3::new(0.0, 3.0, 0.0), Vec3::y()).is_none());
    }

    #[test]
    fn test_local_to_world_matches_to_world() {
        let pose = CameraPose::look_at(Vec3::new(1.0, 2.0, 3.0), Vec3::new(4.0, 0.0, -1.0), Vec3::y())
            .expect("valid look-at");
        let local = Vec3::new(0.3, -0.2, 0.1);
        let via_matrix = pose.local_to_world().transform_point(&local.into());
        assert_relative_eq!(via_matrix.coords, pose.to_world(local), epsilon = 1e-5);
    }

    #[test]
    fn test_combine_applies_parent_scale_and_offset() {
        let parent = Transform::from_position_scale(Vec3::new(1.0, 0.0, 0.0), 2.0);
        let child = Transform::from_position_scale(Vec3::new(0.0, 1.0, 0.0), 0.5);
        let world = parent.combine(&child);
        assert_relative_eq!(world.position, Vec3::new(1.0, 2.0, 0.0));
        assert_relative_eq!(world.scale, Vec3::new(1.0, 1.0, 1.0));
    }

    #[test]
    fn test_deg_to_rad() {
        assert_relative_eq!(utils::deg_to_rad(180.0), constants::PI);
        assert_relative_eq!(utils::rad_to_deg(constants::PI), 180.0);
    }
}
