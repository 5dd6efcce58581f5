//! # Render Orchestrator
//!
//! Entry point invoked once per viewpoint per displayed frame. It decides
//! whether the viewpoint is shaded or passed through, then sequences the
//! frame:
//!
//! ```text
//! viewport -> marshal -> upload -> dispatch -> accumulate -> blit
//! ```
//!
//! ## Ownership
//!
//! Every viewpoint owns its own [`AccumulationEngine`], created on first use
//! and looked up by [`ViewpointId`] and [`ViewpointKind`] on each call, so a
//! preview sharing an id with a primary camera never advances its count. The sphere buffer is a
//! [`DeviceBuffer`] scoped to one frame, so it is released exactly once on
//! every exit path and never outlives the call.
//!
//! ## Failure Handling
//!
//! The destination image is always fully written. When any stage fails the
//! source image is copied through before the error is returned; a missing
//! shading program degrades every viewpoint to pass-through.

use std::collections::HashMap;

use super::accumulation::{AccumulationEngine, AccumulationState};
use super::image::Image;
use super::marshal::SceneMarshaler;
use super::shading::{DeviceBuffer, HostDevice, ShadingDevice, ShadingParams, ShadingProgram};
use super::viewport::{compute_viewport, CameraIntrinsics, ViewportError};
use super::{RenderError, RenderResult};
use crate::config::ConfigError;
use crate::core::config::{RenderSettings, TracerConfig};
use crate::scene::SceneRegistry;

/// Stable identity of a camera across frames
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ViewpointId(pub u64);

/// Role of a viewpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViewpointKind {
    /// The live camera
    Primary,
    /// Secondary editor or preview camera
    Preview,
}

/// Path taken for one viewpoint on one frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderPath {
    /// Source copied to the destination unmodified
    PassThrough,
    /// Scene shaded and folded into the viewpoint's accumulation
    ShadeAndAccumulate,
}

/// One host frame callback
#[derive(Debug, Clone, Copy)]
pub struct FrameRequest<'a> {
    /// Which camera is rendering
    pub viewpoint: ViewpointId,
    /// Primary or preview
    pub kind: ViewpointKind,
    /// Camera intrinsics and pose for this frame
    pub camera: CameraIntrinsics,
    /// Image the host rendered before the tracer runs
    pub source: &'a Image,
}

/// Summary of one rendered frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameOutcome {
    /// Path taken
    pub path: RenderPath,
    /// Accumulation index used as blend weight, when shaded
    pub frame_index: Option<u32>,
    /// Spheres marshaled this frame
    pub sphere_count: usize,
}

impl FrameOutcome {
    fn pass_through() -> Self {
        Self {
            path: RenderPath::PassThrough,
            frame_index: None,
            sphere_count: 0,
        }
    }
}

/// Per-frame driver of the progressive tracer
pub struct RenderOrchestrator<D: ShadingDevice = HostDevice> {
    config: TracerConfig,
    marshaler: SceneMarshaler,
    device: D,
    program: Option<Box<dyn ShadingProgram>>,
    viewpoints: HashMap<(ViewpointId, ViewpointKind), AccumulationEngine>,
}

impl<D: ShadingDevice> RenderOrchestrator<D> {
    /// Validate the configuration and set up the orchestrator
    ///
    /// A missing program is reported here, once, and leaves every viewpoint
    /// on the pass-through path until [`Self::set_program`] supplies one.
    pub fn new(
        config: TracerConfig,
        device: D,
        program: Option<Box<dyn ShadingProgram>>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let marshaler = SceneMarshaler::new(config.scene.discovery.clone(), config.scene.layout);
        match &program {
            Some(program) => log::info!(
                "Render orchestrator ready: program '{}' (paired with '{}'), {:?} layout, {:?}",
                program.name(),
                config.shader.program,
                config.scene.layout,
                config.accumulation.strategy
            ),
            None => log::error!(
                "Shading program '{}' is not available; all viewpoints will pass through",
                config.shader.program
            ),
        }

        Ok(Self {
            config,
            marshaler,
            device,
            program,
            viewpoints: HashMap::new(),
        })
    }

    /// Install or replace the shading program
    pub fn set_program(&mut self, program: Box<dyn ShadingProgram>) {
        log::info!("Shading program set to '{}'", program.name());
        self.program = Some(program);
    }

    /// Whether a shading program is available
    pub fn has_program(&self) -> bool {
        self.program.is_some()
    }

    /// Active configuration
    pub fn config(&self) -> &TracerConfig {
        &self.config
    }

    /// Per-frame render settings, adjustable between frames
    ///
    /// Toggling `progressive` here takes effect on the next frame with the
    /// usual edge-triggered reset. Values are re-checked before every shaded
    /// frame; out-of-range settings fail the frame with [`RenderError::Config`].
    pub fn render_settings_mut(&mut self) -> &mut RenderSettings {
        &mut self.config.render
    }

    /// Shading device
    pub fn device(&self) -> &D {
        &self.device
    }

    /// Accumulation state of a viewpoint, if it has been shaded before
    pub fn accumulation_state(&self, viewpoint: ViewpointId, kind: ViewpointKind) -> Option<&AccumulationState> {
        self.viewpoints.get(&(viewpoint, kind)).map(AccumulationEngine::state)
    }

    /// Latest accumulated image of a viewpoint
    pub fn accumulated_image(&self, viewpoint: ViewpointId, kind: ViewpointKind) -> Option<&Image> {
        self.viewpoints.get(&(viewpoint, kind)).and_then(AccumulationEngine::output)
    }

    /// Drop all state of a viewpoint (camera destroyed)
    pub fn forget_viewpoint(&mut self, viewpoint: ViewpointId, kind: ViewpointKind) -> bool {
        self.viewpoints.remove(&(viewpoint, kind)).is_some()
    }

    /// Number of viewpoints with accumulation state
    pub fn viewpoint_count(&self) -> usize {
        self.viewpoints.len()
    }

    /// Path a viewpoint of the given kind takes this frame
    pub fn select_path(&self, kind: ViewpointKind) -> RenderPath {
        if self.program.is_none() {
            return RenderPath::PassThrough;
        }
        match kind {
            ViewpointKind::Primary => RenderPath::ShadeAndAccumulate,
            ViewpointKind::Preview if self.config.render.render_in_preview => RenderPath::ShadeAndAccumulate,
            ViewpointKind::Preview => RenderPath::PassThrough,
        }
    }

    /// Render one frame for one viewpoint into `target`
    ///
    /// `target` keeps its dimensions and is always fully written, with the
    /// source copied through when the frame cannot be shaded.
    pub fn render_frame(
        &mut self,
        scene: &SceneRegistry,
        request: FrameRequest<'_>,
        target: &mut Image,
    ) -> RenderResult<FrameOutcome> {
        match self.select_path(request.kind) {
            RenderPath::PassThrough => {
                target.blit_from(request.source);
                Ok(FrameOutcome::pass_through())
            }
            RenderPath::ShadeAndAccumulate => match self.shade(scene, &request, target) {
                Ok(outcome) => Ok(outcome),
                Err(e) => {
                    log::warn!("Viewpoint {:?} fell back to pass-through: {}", request.viewpoint, e);
                    target.blit_from(request.source);
                    Err(e)
                }
            },
        }
    }

    fn shade(&mut self, scene: &SceneRegistry, request: &FrameRequest<'_>, target: &mut Image) -> RenderResult<FrameOutcome> {
        let (width, height) = target.dimensions();
        if width == 0 || height == 0 {
            return Err(ViewportError::ZeroPixelSize { width, height }.into());
        }
        self.config.render.validate()?;

        let viewport = compute_viewport(&request.camera)?;
        let buffer = self.marshaler.marshal(scene)?;
        let sphere_count = u32::try_from(buffer.count())
            .map_err(|_| RenderError::ShadingFailed(format!("{} spheres exceed the program's index range", buffer.count())))?;

        let program = self
            .program
            .as_deref()
            .ok_or_else(|| RenderError::ShadingFailed("no shading program".to_string()))?;

        let strategy = self.config.accumulation.strategy;
        let engine = self.viewpoints.entry((request.viewpoint, request.kind)).or_insert_with(|| {
            log::debug!("New accumulation state for {:?} viewpoint {:?}", request.kind, request.viewpoint);
            AccumulationEngine::new(strategy)
        });

        let settings = &self.config.render;
        let frame_index = engine.begin_frame(settings.progressive, width, height);
        let params = ShadingParams {
            camera_to_world: request.camera.pose.local_to_world(),
            viewport,
            frame_index,
            seed: engine.state().total_frames(),
            time: settings.time,
            max_bounces: settings.max_bounces,
            samples_per_pixel: settings.samples_per_pixel,
            progressive: settings.progressive,
            use_background: settings.use_background,
            sphere_count,
            layout: buffer.layout(),
        };

        let mut shaded = Image::new(width, height);
        {
            let spheres = DeviceBuffer::upload(&mut self.device, &buffer)?;
            program.dispatch(
                spheres.device(),
                spheres.handle(),
                &params,
                engine.history_for_dispatch(),
                &mut shaded,
            )?;
        }

        let output = engine.accumulate(&shaded)?;
        target.blit_from(output);

        log::trace!(
            "Viewpoint {:?} frame {} ({} spheres, {}x{})",
            request.viewpoint,
            frame_index,
            buffer.count(),
            width,
            height
        );
        Ok(FrameOutcome {
            path: RenderPath::ShadeAndAccumulate,
            frame_index: Some(frame_index),
            sphere_count: buffer.count(),
        })
    }
}
