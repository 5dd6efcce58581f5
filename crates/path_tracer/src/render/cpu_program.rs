//! Software shading program
//!
//! Implements the [`ShadingProgram`] contract on the host: it reads the
//! sphere buffer back through the same record layout the GPU program uses,
//! traces one jittered primary ray per sample and shades the nearest hit with
//! base color, a single directional light and emission. When handed a
//! previous frame it blends into it with the frame index as weight, the way
//! the paired GPU program does under the external-history strategy.
//!
//! It is not a light-transport simulation. It exists so the orchestration
//! can be driven end to end without a GPU.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::accumulation::incremental_mean;
use super::image::Image;
use super::marshal::{SceneBuffer, SpherePrimitive};
use super::shading::{BufferHandle, DeviceError, ShadingDevice, ShadingParams, ShadingProgram};
use super::viewport::Ray;
use super::{RenderError, RenderResult};
use crate::foundation::math::{Mat4, Vec3, Vec4};

const HIT_EPSILON: f32 = 1e-4;

/// Host implementation of the sphere shading program
#[derive(Debug, Clone)]
pub struct CpuShadingProgram {
    light_direction: Vec3,
    ambient: f32,
    horizon_color: Vec3,
    zenith_color: Vec3,
}

impl Default for CpuShadingProgram {
    fn default() -> Self {
        Self {
            light_direction: Vec3::new(0.4, 1.0, 0.6).normalize(),
            ambient: 0.15,
            horizon_color: Vec3::new(1.0, 1.0, 1.0),
            zenith_color: Vec3::new(0.45, 0.65, 1.0),
        }
    }
}

impl CpuShadingProgram {
    /// Create the program with its default light and sky
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder pattern: Set the direction towards the light
    pub fn with_light_direction(mut self, direction: Vec3) -> Self {
        if let Some(unit) = direction.try_normalize(f32::EPSILON) {
            self.light_direction = unit;
        }
        self
    }

    /// Builder pattern: Set the ambient term in `[0, 1]`
    pub fn with_ambient(mut self, ambient: f32) -> Self {
        self.ambient = ambient.clamp(0.0, 1.0);
        self
    }

    /// Radiance for a ray that leaves the scene
    pub fn background(&self, direction: &Vec3, use_background: bool) -> Vec3 {
        if !use_background {
            return Vec3::zeros();
        }
        let t = 0.5 * (direction.y + 1.0);
        self.horizon_color.lerp(&self.zenith_color, t.clamp(0.0, 1.0))
    }

    fn trace(&self, ray: &Ray, spheres: &[SpherePrimitive], params: &ShadingParams) -> Vec3 {
        let Some((t, sphere)) = nearest_hit(&ray.origin, &ray.direction, spheres) else {
            return self.background(&ray.direction, params.use_background);
        };

        let emitted = sphere.material.emitted();
        if params.max_bounces == 0 {
            return emitted;
        }

        let normal = (ray.at(t) - sphere.position).normalize();
        let diffuse = normal.dot(&self.light_direction).max(0.0);
        let shade = self.ambient + (1.0 - self.ambient) * diffuse;
        let base = sphere.material.color.xyz();
        base * shade + emitted
    }
}

impl ShadingProgram for CpuShadingProgram {
    fn name(&self) -> &str {
        "cpu_reference"
    }

    fn dispatch(
        &self,
        device: &dyn ShadingDevice,
        spheres: BufferHandle,
        params: &ShadingParams,
        history: Option<&Image>,
        target: &mut Image,
    ) -> RenderResult<()> {
        let bytes = device
            .buffer_contents(spheres)
            .ok_or(DeviceError::UnknownBuffer(spheres))?;
        let primitives = SceneBuffer::decode(bytes, params.layout)?;
        if primitives.len() != params.sphere_count as usize {
            return Err(RenderError::ShadingFailed(format!(
                "sphere count {} does not match buffer with {} records",
                params.sphere_count,
                primitives.len()
            )));
        }
        if let Some(history) = history {
            target.ensure_same_size(history)?;
        }

        let blend = params.progressive && history.is_some();
        let samples = params.samples_per_pixel.max(1);
        let seed = params.seed.wrapping_add(i64::from(params.time) as u64);
        let mut rng = StdRng::seed_from_u64(seed);

        let origin = transform_point(&params.camera_to_world, &Vec3::zeros());
        let (width, height) = target.dimensions();

        for y in 0..height {
            for x in 0..width {
                let mut radiance = Vec3::zeros();
                for _ in 0..samples {
                    let tx = (x as f32 + rng.gen::<f32>()) / width as f32;
                    let ty = (y as f32 + rng.gen::<f32>()) / height as f32;
                    let local = params.viewport.local_point(tx, ty);
                    let direction = (transform_point(&params.camera_to_world, &local) - origin).normalize();
                    radiance += self.trace(&Ray { origin, direction }, &primitives, params);
                }
                radiance /= samples as f32;

                let sample = [radiance.x, radiance.y, radiance.z, 1.0];
                let color = match history.and_then(|h| h.pixel(x, y)) {
                    Some(previous) if blend => {
                        let mut out = previous;
                        for (o, s) in out.iter_mut().zip(sample) {
                            *o = incremental_mean(*o, s, params.frame_index);
                        }
                        out
                    }
                    _ => sample,
                };
                target.set_pixel(x, y, color);
            }
        }

        log::trace!(
            "{} shaded {}x{} with {} spheres (frame {})",
            self.name(),
            width,
            height,
            primitives.len(),
            params.frame_index
        );
        Ok(())
    }
}

fn transform_point(matrix: &Mat4, point: &Vec3) -> Vec3 {
    let p = matrix * Vec4::new(point.x, point.y, point.z, 1.0);
    Vec3::new(p.x, p.y, p.z)
}

/// Nearest intersection in front of the ray origin
fn nearest_hit<'a>(
    origin: &Vec3,
    direction: &Vec3,
    spheres: &'a [SpherePrimitive],
) -> Option<(f32, &'a SpherePrimitive)> {
    spheres
        .iter()
        .filter_map(|sphere| intersect(origin, direction, sphere).map(|t| (t, sphere)))
        .min_by(|a, b| a.0.total_cmp(&b.0))
}

fn intersect(origin: &Vec3, direction: &Vec3, sphere: &SpherePrimitive) -> Option<f32> {
    let oc = origin - sphere.position;
    let b = oc.dot(direction);
    let c = oc.norm_squared() - sphere.radius * sphere.radius;
    let discriminant = b * b - c;
    if discriminant < 0.0 {
        return None;
    }
    let root = discriminant.sqrt();
    [-b - root, -b + root].into_iter().find(|&t| t > HIT_EPSILON)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::marshal::RecordLayout;
    use crate::render::shading::HostDevice;
    use crate::render::viewport::{compute_viewport, CameraIntrinsics};
    use crate::foundation::math::CameraPose;
    use crate::scene::SurfaceMaterial;
    use approx::assert_relative_eq;

    fn params(sphere_count: u32, layout: RecordLayout) -> ShadingParams {
        let camera = CameraIntrinsics::new(60.0, 1.0, 0.1, CameraPose::default());
        ShadingParams {
            camera_to_world: camera.pose.local_to_world(),
            viewport: compute_viewport(&camera).unwrap(),
            frame_index: 0,
            seed: 7,
            time: 0,
            max_bounces: 3,
            samples_per_pixel: 1,
            progressive: false,
            use_background: true,
            sphere_count,
            layout,
        }
    }

    fn upload(device: &mut HostDevice, spheres: &[SpherePrimitive], layout: RecordLayout) -> BufferHandle {
        let buffer = SceneBuffer::serialize(spheres, layout);
        device.create_buffer(buffer.as_bytes(), buffer.stride()).unwrap()
    }

    fn red_sphere_ahead() -> SpherePrimitive {
        SpherePrimitive {
            position: Vec3::new(0.0, 0.0, -5.0),
            radius: 1.0,
            material: SurfaceMaterial::diffuse(1.0, 0.0, 0.0),
        }
    }

    #[test]
    fn test_empty_scene_without_background_is_black() {
        let mut device = HostDevice::new();
        let handle = upload(&mut device, &[], RecordLayout::Basic);
        let mut p = params(0, RecordLayout::Basic);
        p.use_background = false;

        let mut target = Image::filled(8, 6, [9.0; 4]);
        CpuShadingProgram::new().dispatch(&device, handle, &p, None, &mut target).unwrap();
        assert!(target.pixels().iter().all(|px| *px == [0.0, 0.0, 0.0, 1.0]));
    }

    #[test]
    fn test_empty_scene_shows_sky_gradient() {
        let mut device = HostDevice::new();
        let handle = upload(&mut device, &[], RecordLayout::WithRoughness);

        let mut target = Image::new(4, 16);
        CpuShadingProgram::new()
            .dispatch(&device, handle, &params(0, RecordLayout::WithRoughness), None, &mut target)
            .unwrap();

        let bottom = target.pixel(0, 0).unwrap();
        let top = target.pixel(0, 15).unwrap();
        assert!(top[0] < bottom[0], "zenith is bluer than the horizon");
        assert_relative_eq!(top[3], 1.0);
    }

    #[test]
    fn test_sphere_ahead_covers_center() {
        let mut device = HostDevice::new();
        let handle = upload(&mut device, &[red_sphere_ahead()], RecordLayout::Basic);
        let program = CpuShadingProgram::new().with_light_direction(Vec3::new(0.0, 0.0, 1.0));

        let mut target = Image::new(9, 9);
        program.dispatch(&device, handle, &params(1, RecordLayout::Basic), None, &mut target).unwrap();

        let center = target.pixel(4, 4).unwrap();
        assert!(center[0] > 0.9);
        assert_relative_eq!(center[1], 0.0);
        assert_relative_eq!(center[2], 0.0);
    }

    #[test]
    fn test_zero_bounces_shows_only_emission() {
        let mut device = HostDevice::new();
        let mut sphere = red_sphere_ahead();
        sphere.material = SurfaceMaterial::emissive(Vec3::new(0.0, 1.0, 0.0), 2.0);
        let handle = upload(&mut device, &[sphere], RecordLayout::WithRoughness);
        let mut p = params(1, RecordLayout::WithRoughness);
        p.max_bounces = 0;

        let mut target = Image::new(9, 9);
        CpuShadingProgram::new().dispatch(&device, handle, &p, None, &mut target).unwrap();
        assert_eq!(target.pixel(4, 4), Some([0.0, 2.0, 0.0, 1.0]));
    }

    #[test]
    fn test_history_blend_uses_frame_index() {
        let mut device = HostDevice::new();
        let handle = upload(&mut device, &[], RecordLayout::Basic);
        let mut p = params(0, RecordLayout::Basic);
        p.use_background = false;
        p.progressive = true;
        p.frame_index = 3;

        let history = Image::filled(2, 2, [1.0; 4]);
        let mut target = Image::new(2, 2);
        CpuShadingProgram::new().dispatch(&device, handle, &p, Some(&history), &mut target).unwrap();

        // black sample folded into a white average of three frames
        let px = target.pixel(1, 1).unwrap();
        assert_relative_eq!(px[0], 0.75);
        assert_relative_eq!(px[3], 1.0);
    }

    #[test]
    fn test_same_seed_is_deterministic() {
        let mut device = HostDevice::new();
        let handle = upload(&mut device, &[red_sphere_ahead()], RecordLayout::Basic);
        let mut p = params(1, RecordLayout::Basic);
        p.samples_per_pixel = 4;
        let program = CpuShadingProgram::new();

        let mut first = Image::new(6, 6);
        let mut second = Image::new(6, 6);
        program.dispatch(&device, handle, &p, None, &mut first).unwrap();
        program.dispatch(&device, handle, &p, None, &mut second).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_count_mismatch_is_rejected() {
        let mut device = HostDevice::new();
        let handle = upload(&mut device, &[red_sphere_ahead()], RecordLayout::Basic);
        let mut target = Image::new(2, 2);
        let result = CpuShadingProgram::new().dispatch(&device, handle, &params(2, RecordLayout::Basic), None, &mut target);
        assert!(matches!(result, Err(RenderError::ShadingFailed(_))));
    }

    #[test]
    fn test_released_buffer_is_rejected() {
        let mut device = HostDevice::new();
        let handle = upload(&mut device, &[], RecordLayout::Basic);
        device.release_buffer(handle).unwrap();
        let mut target = Image::new(2, 2);
        let result = CpuShadingProgram::new().dispatch(&device, handle, &params(0, RecordLayout::Basic), None, &mut target);
        assert!(matches!(result, Err(RenderError::Device(DeviceError::UnknownBuffer(_)))));
    }

    #[test]
    fn test_full_ambient_ignores_light_direction() {
        let mut device = HostDevice::new();
        let handle = upload(&mut device, &[red_sphere_ahead()], RecordLayout::Basic);
        let program = CpuShadingProgram::new()
            .with_light_direction(Vec3::new(0.0, 0.0, -1.0))
            .with_ambient(2.0);
        assert_relative_eq!(program.ambient, 1.0);

        let mut target = Image::new(9, 9);
        program.dispatch(&device, handle, &params(1, RecordLayout::Basic), None, &mut target).unwrap();
        assert_relative_eq!(target.pixel(4, 4).unwrap()[0], 1.0);
    }
}
