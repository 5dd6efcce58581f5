//! # Viewport Projection
//!
//! Derives the near-plane extents the shading program uses to generate one
//! primary ray per pixel. Together with the camera-to-world matrix, the
//! [`ViewportParams`] fully determine each ray's origin and direction.
//!
//! ## Mathematical Implementation
//! ```text
//! plane_height = 2 * near * tan(fov / 2)
//! plane_width  = plane_height * aspect
//! ```
//!
//! Intrinsics are re-validated every frame because zoom and window resizes
//! change them; degenerate values are rejected instead of letting NaN or
//! infinity reach the shading program.

use crate::foundation::math::{utils, CameraPose, Vec3};

/// Degenerate camera parameters
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq)]
pub enum ViewportError {
    /// Vertical field of view outside the open interval (0°, 180°)
    #[error("Field of view must be in (0, 180) degrees, got {0}")]
    InvalidFieldOfView(f32),

    /// Aspect ratio not strictly positive and finite
    #[error("Aspect ratio must be positive and finite, got {0}")]
    InvalidAspect(f32),

    /// Near-clip distance not strictly positive and finite
    #[error("Near clip distance must be positive and finite, got {0}")]
    InvalidNearClip(f32),

    /// Target has no pixels along one axis
    #[error("Viewport has zero pixel size ({width}x{height})")]
    ZeroPixelSize {
        /// Pixel width
        width: u32,
        /// Pixel height
        height: u32,
    },
}

/// Camera intrinsics and pose for one frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraIntrinsics {
    /// Vertical field of view in degrees
    pub fov_degrees: f32,
    /// Width / height
    pub aspect: f32,
    /// Distance to the near clipping plane
    pub near_clip: f32,
    /// World-space position and orientation
    pub pose: CameraPose,
}

impl CameraIntrinsics {
    /// Create intrinsics from an explicit aspect ratio
    pub fn new(fov_degrees: f32, aspect: f32, near_clip: f32, pose: CameraPose) -> Self {
        Self {
            fov_degrees,
            aspect,
            near_clip,
            pose,
        }
    }

    /// Create intrinsics with the aspect ratio of a pixel target
    ///
    /// Rejects targets with zero width or height, which would otherwise
    /// produce a zero or infinite aspect ratio.
    pub fn for_target(
        fov_degrees: f32,
        width: u32,
        height: u32,
        near_clip: f32,
        pose: CameraPose,
    ) -> Result<Self, ViewportError> {
        if width == 0 || height == 0 {
            return Err(ViewportError::ZeroPixelSize { width, height });
        }
        Ok(Self::new(fov_degrees, width as f32 / height as f32, near_clip, pose))
    }

    /// World-space ray through normalised screen coordinates
    ///
    /// `(0, 0)` is the bottom-left corner of the near plane, `(1, 1)` the
    /// top-right. The ray starts at the camera position.
    pub fn ray_through(&self, viewport: &ViewportParams, tx: f32, ty: f32) -> Ray {
        let target = self.pose.to_world(viewport.local_point(tx, ty));
        let origin = self.pose.position;
        Ray {
            origin,
            direction: (target - origin).normalize(),
        }
    }
}

/// Near-plane extents consumed by the shading program
///
/// `plane_width` and `plane_height` are the full extents of the near plane
/// (the shader centres them on the view axis).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewportParams {
    /// Full width of the near plane in world units
    pub plane_width: f32,
    /// Full height of the near plane in world units
    pub plane_height: f32,
    /// Distance from the camera to the near plane
    pub near_clip: f32,
}

impl ViewportParams {
    /// Camera-local point on the near plane for normalised screen coordinates
    pub fn local_point(&self, tx: f32, ty: f32) -> Vec3 {
        Vec3::new(
            utils::lerp(-self.plane_width * 0.5, self.plane_width * 0.5, tx),
            utils::lerp(-self.plane_height * 0.5, self.plane_height * 0.5, ty),
            self.near_clip,
        )
    }
}

/// World-space ray
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    /// Ray origin
    pub origin: Vec3,
    /// Unit direction
    pub direction: Vec3,
}

impl Ray {
    /// Point at parameter `t` along the ray
    pub fn at(&self, t: f32) -> Vec3 {
        self.origin + self.direction * t
    }
}

/// Compute ray-generation parameters from camera intrinsics
///
/// Pure; holds no state between calls.
pub fn compute_viewport(intrinsics: &CameraIntrinsics) -> Result<ViewportParams, ViewportError> {
    let CameraIntrinsics { fov_degrees, aspect, near_clip, .. } = *intrinsics;

    if !(fov_degrees > 0.0 && fov_degrees < 180.0) {
        return Err(ViewportError::InvalidFieldOfView(fov_degrees));
    }
    if !(aspect > 0.0 && aspect.is_finite()) {
        return Err(ViewportError::InvalidAspect(aspect));
    }
    if !(near_clip > 0.0 && near_clip.is_finite()) {
        return Err(ViewportError::InvalidNearClip(near_clip));
    }

    let plane_height = near_clip * (utils::deg_to_rad(fov_degrees) * 0.5).tan() * 2.0;
    let plane_width = plane_height * aspect;

    if !(plane_width.is_finite() && plane_height.is_finite()) {
        return Err(ViewportError::InvalidNearClip(near_clip));
    }

    log::trace!("Viewport {}x{} at near {}", plane_width, plane_height, near_clip);
    Ok(ViewportParams {
        plane_width,
        plane_height,
        near_clip,
    })
}
