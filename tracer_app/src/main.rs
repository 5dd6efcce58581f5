//! Progressive path tracer demo
//!
//! Builds a small sphere scene under a `Spheres` container, accumulates a
//! number of progressive frames through the render orchestrator with the CPU
//! shading program, and writes the converged image to a PNG.
//!
//! Usage: `tracer_demo [config.toml|config.ron] [frames] [output.png]`

use path_tracer::foundation::logging;
use path_tracer::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const WIDTH: u32 = 480;
const HEIGHT: u32 = 270;
const DEFAULT_FRAMES: u32 = 32;
const DEFAULT_OUTPUT: &str = "tracer_output.png";

struct TracerDemoApp {
    scene: SceneRegistry,
    orchestrator: RenderOrchestrator,
    camera: CameraIntrinsics,
    source: Image,
    target: Image,
}

impl TracerDemoApp {
    fn new(config: TracerConfig) -> Result<Self, Box<dyn std::error::Error>> {
        log::info!("Building demo scene...");
        let scene = build_scene();
        log::info!("Scene has {} objects, {} spheres", scene.len(), scene.sphere_count());

        let program: Box<dyn ShadingProgram> = Box::new(CpuShadingProgram::new());
        let orchestrator = RenderOrchestrator::new(config, HostDevice::new(), Some(program))?;

        let pose = CameraPose::look_at(
            Vec3::new(0.0, 2.0, 6.0),
            Vec3::new(0.0, 0.5, -2.0),
            Vec3::new(0.0, 1.0, 0.0),
        )
        .ok_or("camera basis is degenerate")?;
        let camera = CameraIntrinsics::for_target(50.0, WIDTH, HEIGHT, 0.1, pose)?;

        Ok(Self {
            scene,
            orchestrator,
            camera,
            source: Image::filled(WIDTH, HEIGHT, [0.1, 0.1, 0.1, 1.0]),
            target: Image::new(WIDTH, HEIGHT),
        })
    }

    fn run(&mut self, frames: u32) -> RenderResult<()> {
        log::info!("Accumulating {} frames at {}x{}", frames, WIDTH, HEIGHT);
        for frame in 0..frames {
            let request = FrameRequest {
                viewpoint: ViewpointId(0),
                kind: ViewpointKind::Primary,
                camera: self.camera,
                source: &self.source,
            };
            let outcome = self.orchestrator.render_frame(&self.scene, request, &mut self.target)?;
            log::debug!("Frame {}: {:?}", frame, outcome);
        }

        if let Some(state) = self.orchestrator.accumulation_state(ViewpointId(0), ViewpointKind::Primary) {
            log::info!(
                "Accumulated {} samples over {} frames",
                state.frame_index(),
                state.total_frames()
            );
        }
        Ok(())
    }
}

/// Ground, a light and a ring of small random spheres, all under `Spheres`
fn build_scene() -> SceneRegistry {
    let mut scene = SceneRegistry::new();
    let container = scene.spawn("Spheres", Transform::identity());
    let mut rng = StdRng::seed_from_u64(42);

    let add = |scene: &mut SceneRegistry, name: String, position: Vec3, diameter: f32, material: SurfaceMaterial| {
        match scene.spawn_child(container, name, Transform::from_position_scale(position, diameter)) {
            Ok(key) => {
                if let Err(e) = scene.attach_sphere(key, SphereComponent::new(material)) {
                    log::warn!("Could not attach sphere: {}", e);
                }
            }
            Err(e) => log::warn!("Could not spawn sphere: {}", e),
        }
    };

    add(
        &mut scene,
        "Ground".to_string(),
        Vec3::new(0.0, -100.0, -2.0),
        200.0,
        SurfaceMaterial::diffuse(0.6, 0.6, 0.6).with_roughness(1.0),
    );
    add(
        &mut scene,
        "Light".to_string(),
        Vec3::new(-3.0, 4.0, -4.0),
        2.0,
        SurfaceMaterial::emissive(Vec3::new(1.0, 0.9, 0.7), 3.0),
    );
    add(
        &mut scene,
        "Center".to_string(),
        Vec3::new(0.0, 1.0, -2.0),
        2.0,
        SurfaceMaterial::diffuse(0.9, 0.3, 0.2).with_roughness(0.2),
    );

    for i in 0..8 {
        let angle = i as f32 / 8.0 * std::f32::consts::TAU;
        let position = Vec3::new(angle.cos() * 2.8, 0.35, -2.0 + angle.sin() * 2.8);
        let material = SurfaceMaterial::diffuse(rng.gen(), rng.gen(), rng.gen()).with_roughness(rng.gen());
        add(&mut scene, format!("Satellite{i}"), position, 0.7, material);
    }

    scene
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init();
    log::info!("Starting progressive path tracer demo");

    let mut args = std::env::args().skip(1);
    let config = match args.next() {
        Some(path) => {
            log::info!("Loading configuration from {}", path);
            TracerConfig::load_from_file(&path)?
        }
        None => TracerConfig::default()
            .with_progressive(true)
            .with_discovery(DiscoveryScope::ChildrenOf {
                container: "Spheres".to_string(),
            }),
    };
    let frames = match args.next() {
        Some(value) => value.parse()?,
        None => DEFAULT_FRAMES,
    };
    let output = args.next().unwrap_or_else(|| DEFAULT_OUTPUT.to_string());

    let mut app = TracerDemoApp::new(config)?;
    match app.run(frames) {
        Ok(()) => {
            app.target.save_png(&output)?;
            log::info!("Path tracer demo completed successfully");
            Ok(())
        }
        Err(e) => {
            log::error!("Path tracer demo failed: {:?}", e);
            Err(e.into())
        }
    }
}
