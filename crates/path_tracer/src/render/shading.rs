//! Shading program seam
//!
//! The shading program is external code (normally GPU-executed) that turns a
//! sphere buffer and camera parameters into an image. This module defines
//! the contract the orchestrator relies on:
//!
//! - [`ShadingDevice`]: allocates and releases the per-frame sphere buffer
//! - [`DeviceBuffer`]: scoped ownership of one allocation, released on drop
//! - [`ShadingParams`]: the per-frame parameter block
//! - [`ShadingProgram`]: the dispatch entry point
//!
//! Parameter names and order follow the paired program version and must
//! match it exactly.

use slotmap::{new_key_type, SlotMap};

use super::image::Image;
use super::marshal::{RecordLayout, SceneBuffer};
use super::viewport::ViewportParams;
use super::RenderResult;
use crate::foundation::math::Mat4;

new_key_type! {
    /// Handle to a buffer allocated on a [`ShadingDevice`]
    pub struct BufferHandle;
}

/// Device-side buffer errors
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    /// The device could not allocate the buffer
    #[error("Buffer allocation of {bytes} bytes failed: {reason}")]
    AllocationFailed {
        /// Requested size
        bytes: usize,
        /// Device-specific reason
        reason: String,
    },

    /// The handle is not a live allocation (double release or foreign handle)
    #[error("Unknown or already released buffer {0:?}")]
    UnknownBuffer(BufferHandle),
}

/// Structured-buffer allocator used for the per-frame sphere buffer
pub trait ShadingDevice {
    /// Allocate a buffer and upload `bytes` into it
    ///
    /// `stride` is the record size the program will index with; zero-length
    /// uploads must be accepted.
    fn create_buffer(&mut self, bytes: &[u8], stride: usize) -> Result<BufferHandle, DeviceError>;

    /// Release a buffer previously returned by [`ShadingDevice::create_buffer`]
    fn release_buffer(&mut self, handle: BufferHandle) -> Result<(), DeviceError>;

    /// Read back the contents of a live buffer
    fn buffer_contents(&self, handle: BufferHandle) -> Option<&[u8]>;
}

/// Scoped ownership of one device allocation
///
/// Created only by a successful upload, so release is tied to the
/// allocation itself: it happens exactly once, when the guard drops, on every
/// exit path of the frame.
pub struct DeviceBuffer<'d, D: ShadingDevice + ?Sized> {
    device: &'d mut D,
    handle: BufferHandle,
    count: usize,
    layout: RecordLayout,
}

impl<'d, D: ShadingDevice + ?Sized> DeviceBuffer<'d, D> {
    /// Upload a scene buffer to the device
    pub fn upload(device: &'d mut D, scene: &SceneBuffer) -> Result<Self, DeviceError> {
        let handle = device.create_buffer(scene.as_bytes(), scene.stride())?;
        log::trace!("Allocated sphere buffer {:?} ({} records)", handle, scene.count());
        Ok(Self {
            device,
            handle,
            count: scene.count(),
            layout: scene.layout(),
        })
    }

    /// Handle to pass to the shading program
    pub fn handle(&self) -> BufferHandle {
        self.handle
    }

    /// Number of records in the buffer
    pub fn count(&self) -> usize {
        self.count
    }

    /// Record layout of the buffer
    pub fn layout(&self) -> RecordLayout {
        self.layout
    }

    /// Shared access to the device for dispatch
    pub fn device(&self) -> &D {
        &*self.device
    }
}

impl<D: ShadingDevice + ?Sized> Drop for DeviceBuffer<'_, D> {
    fn drop(&mut self) {
        match self.device.release_buffer(self.handle) {
            Ok(()) => log::trace!("Released sphere buffer {:?}", self.handle),
            Err(e) => log::error!("Failed to release sphere buffer: {}", e),
        }
    }
}

/// Per-frame parameter block for the shading program
#[derive(Debug, Clone, PartialEq)]
pub struct ShadingParams {
    /// Camera local-to-world matrix (`CamLocalToWorldMatrix`)
    pub camera_to_world: Mat4,
    /// Near-plane extents (`ViewParams`)
    pub viewport: ViewportParams,
    /// Accumulation index used as blend weight (`Frame`)
    pub frame_index: u32,
    /// Monotonic per-viewpoint frame counter for random streams
    pub seed: u64,
    /// Seed offset from configuration (`Time`)
    pub time: i32,
    /// Maximum bounces per path (`MaxBounces`)
    pub max_bounces: u32,
    /// Samples per pixel (`SamplesPerPixel`), at least 1
    pub samples_per_pixel: u32,
    /// Progressive mode (`UseProgressiveRendering`)
    pub progressive: bool,
    /// Environment background (`UseBackground`)
    pub use_background: bool,
    /// Number of records in the sphere buffer (`NumSpheres`)
    pub sphere_count: u32,
    /// Record layout of the sphere buffer
    pub layout: RecordLayout,
}

impl ShadingParams {
    /// Progressive flag as the shader's integer switch
    pub fn progressive_flag(&self) -> i32 {
        i32::from(self.progressive)
    }

    /// Background flag as the shader's integer switch
    pub fn background_flag(&self) -> i32 {
        i32::from(self.use_background)
    }
}

/// External shading program
pub trait ShadingProgram {
    /// Name used in logs and configuration
    fn name(&self) -> &str;

    /// Shade one image
    ///
    /// `history` is the previous accumulated image when the program is
    /// expected to blend; `target` is fully overwritten and already has the
    /// output dimensions.
    fn dispatch(
        &self,
        device: &dyn ShadingDevice,
        spheres: BufferHandle,
        params: &ShadingParams,
        history: Option<&Image>,
        target: &mut Image,
    ) -> RenderResult<()>;
}

/// Host-memory implementation of [`ShadingDevice`]
///
/// Backs the CPU reference program and keeps allocation counters so buffer
/// lifecycles can be checked.
#[derive(Debug, Default)]
pub struct HostDevice {
    buffers: SlotMap<BufferHandle, Vec<u8>>,
    allocations: u64,
    releases: u64,
}

impl HostDevice {
    /// Create a device with no live buffers
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffers currently allocated
    pub fn live_buffers(&self) -> usize {
        self.buffers.len()
    }

    /// Total successful allocations
    pub fn allocations(&self) -> u64 {
        self.allocations
    }

    /// Total successful releases
    pub fn releases(&self) -> u64 {
        self.releases
    }
}

impl ShadingDevice for HostDevice {
    fn create_buffer(&mut self, bytes: &[u8], stride: usize) -> Result<BufferHandle, DeviceError> {
        if stride == 0 || bytes.len() % stride != 0 {
            return Err(DeviceError::AllocationFailed {
                bytes: bytes.len(),
                reason: format!("length is not a multiple of stride {stride}"),
            });
        }
        self.allocations += 1;
        Ok(self.buffers.insert(bytes.to_vec()))
    }

    fn release_buffer(&mut self, handle: BufferHandle) -> Result<(), DeviceError> {
        self.buffers
            .remove(handle)
            .map(|_| self.releases += 1)
            .ok_or(DeviceError::UnknownBuffer(handle))
    }

    fn buffer_contents(&self, handle: BufferHandle) -> Option<&[u8]> {
        self.buffers.get(handle).map(Vec::as_slice)
    }
}
