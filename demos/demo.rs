//! Forward+ demo scene
//!
//! Run with:
//!   cargo run --example demo
//!   cargo run --example demo -- --lights 512 --no-vsync
//!   cargo run --example demo -- --headless 120
//!   cargo run --example demo -- --offscreen 60
//!
//! Controls:
//!   H        - Toggle tile heatmap
//!   L        - Toggle light wireframes
//!   S        - Toggle shadows
//!   P        - Toggle depth pre-pass
//!   C        - Toggle light culling (forces the all-lights fallback)
//!   B        - Toggle back-face culling
//!   F        - Flip front-face winding
//!   [ / ]    - Decrease / increase shadow bias
//!   Space    - Pause animation
//!   Escape   - Exit

use bevy_ecs::prelude::*;
use clap::Parser;
use forward_plus::backend::types::FrontFace;
use forward_plus::debug::SHADOW_BIAS_RANGE;
use forward_plus::resources::{GpuMaterial, GpuMesh, Material, Mesh};
use forward_plus::scene::{extract_lights, Transform};
use forward_plus::{
    AmbientLight, BackendResult, Camera, DebugSettings, DirectionalLight, GraphicsBackend,
    MeshDraw, PointLight, RecordingBackend, Renderer, RendererConfig, SpotLight, WgpuBackend,
};
use glam::{Mat4, Quat, Vec3, Vec4};
use std::sync::Arc;
use std::time::Instant;
use winit::{
    dpi::PhysicalSize,
    event::{ElementState, Event, KeyEvent, WindowEvent},
    event_loop::{ControlFlow, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::WindowBuilder,
};

#[derive(Parser, Debug)]
#[command(name = "demo", about = "Tiled Forward+ renderer demo")]
struct Args {
    /// Number of animated point lights
    #[arg(long, default_value_t = 256)]
    lights: usize,

    /// Present without waiting for vertical sync
    #[arg(long)]
    no_vsync: bool,

    /// Record this many frames without a device and print the statistics
    #[arg(long, value_name = "FRAMES")]
    headless: Option<u32>,

    /// Render this many frames on the GPU into an offscreen target
    #[arg(long, value_name = "FRAMES")]
    offscreen: Option<u32>,

    #[arg(long, default_value_t = 1280)]
    width: u32,

    #[arg(long, default_value_t = 720)]
    height: u32,
}

/// Marker for the lights that circle the scene
#[derive(Component)]
struct Orbit {
    radius: f32,
    speed: f32,
    phase: f32,
    height: f32,
}

struct SceneObject {
    mesh: usize,
    material: usize,
    transform: Mat4,
}

struct Scene {
    world: World,
    meshes: Vec<GpuMesh>,
    materials: Vec<GpuMaterial>,
    objects: Vec<SceneObject>,
    camera: Camera,
}

impl Scene {
    fn build<B: GraphicsBackend>(renderer: &mut Renderer<B>, light_count: usize) -> BackendResult<Self> {
        let meshes = vec![
            renderer.upload_mesh(&Mesh::plane(40.0, 40.0, 4))?,
            renderer.upload_mesh(&Mesh::sphere(32, 16))?,
            renderer.upload_mesh(&Mesh::cube())?,
        ];
        let materials = vec![
            renderer.create_material(
                &Material::new("Ground")
                    .with_base_color(Vec4::new(0.6, 0.6, 0.6, 1.0))
                    .with_roughness(0.9),
            )?,
            renderer.create_material(
                &Material::new("Gold")
                    .with_base_color(Vec4::new(1.0, 0.78, 0.34, 1.0))
                    .with_metallic(1.0)
                    .with_roughness(0.3),
            )?,
            renderer.create_material(
                &Material::new("Plastic")
                    .with_base_color(Vec4::new(0.2, 0.4, 0.9, 1.0))
                    .with_roughness(0.5),
            )?,
        ];

        let mut objects = vec![SceneObject {
            mesh: 0,
            material: 0,
            transform: Mat4::IDENTITY,
        }];
        for x in -3..=3 {
            for z in -3..=3 {
                let sphere = (x + z) % 2 == 0;
                let position = Vec3::new(x as f32 * 4.0, 1.0, z as f32 * 4.0);
                objects.push(SceneObject {
                    mesh: if sphere { 1 } else { 2 },
                    material: if sphere { 1 } else { 2 },
                    transform: Mat4::from_translation(position),
                });
            }
        }

        let mut world = World::new();
        world.insert_resource(AmbientLight {
            color: Vec3::ONE,
            intensity: 0.03,
        });
        world.spawn(DirectionalLight::new(
            Vec3::new(-0.4, -1.0, -0.3),
            Vec3::new(1.0, 0.95, 0.85),
            1.5,
        ));
        for (i, color) in [Vec3::new(1.0, 0.3, 0.2), Vec3::new(0.2, 0.6, 1.0)].into_iter().enumerate() {
            let position = Vec3::new(if i == 0 { -8.0 } else { 8.0 }, 8.0, 0.0);
            let direction = (Vec3::ZERO - position).normalize();
            world.spawn((
                SpotLight::new(Vec3::NEG_Y, color, 30.0, 25.0, 20f32.to_radians(), 30f32.to_radians()),
                Transform::aimed(position, direction),
            ));
        }
        for i in 0..light_count {
            let t = i as f32 / light_count.max(1) as f32;
            let hue = Vec3::new(
                (t * 6.283).sin() * 0.5 + 0.5,
                (t * 6.283 + 2.094).sin() * 0.5 + 0.5,
                (t * 6.283 + 4.189).sin() * 0.5 + 0.5,
            );
            world.spawn((
                PointLight::new(hue, 4.0, 3.0),
                Transform::default(),
                Orbit {
                    radius: 2.0 + 16.0 * ((i * 7919) % 1000) as f32 / 1000.0,
                    speed: 0.2 + 0.3 * ((i * 104_729) % 100) as f32 / 100.0,
                    phase: t * std::f32::consts::TAU * 13.0,
                    height: 0.5 + 2.0 * ((i * 31) % 10) as f32 / 10.0,
                },
            ));
        }

        Ok(Self {
            world,
            meshes,
            materials,
            objects,
            camera: Camera::new(Vec3::new(0.0, 14.0, 24.0), Vec3::ZERO),
        })
    }

    fn animate(&mut self, time: f32) {
        let mut query = self.world.query::<(&Orbit, &mut Transform)>();
        for (orbit, mut transform) in query.iter_mut(&mut self.world) {
            let angle = orbit.phase + time * orbit.speed;
            transform.position = Vec3::new(angle.cos() * orbit.radius, orbit.height, angle.sin() * orbit.radius);
        }

        let angle = time * 0.1;
        self.camera.position = Quat::from_rotation_y(angle) * Vec3::new(0.0, 14.0, 24.0);
    }

    fn draws(&self) -> Vec<MeshDraw<'_>> {
        self.objects
            .iter()
            .map(|object| MeshDraw {
                mesh: &self.meshes[object.mesh],
                material: &self.materials[object.material],
                transform: object.transform,
            })
            .collect()
    }
}

/// Run one frame; returns false when it was skipped
fn render_frame<B: GraphicsBackend>(
    renderer: &mut Renderer<B>,
    scene: &mut Scene,
    settings: &DebugSettings,
    time: f32,
) -> BackendResult<bool> {
    let Some(frame) = renderer.begin_frame()? else {
        return Ok(false);
    };
    scene.animate(time);
    let lights = extract_lights(&mut scene.world);
    renderer.update_uniforms(&frame, &scene.camera, &lights, time);
    let draws = scene.draws();
    renderer.draw_scene(&frame, &draws, settings)?;
    renderer.end_frame(frame)?;
    Ok(true)
}

fn run_fixed<B: GraphicsBackend>(backend: B, args: &Args, frames: u32) -> Result<(), Box<dyn std::error::Error>> {
    let mut renderer = Renderer::new(backend, RendererConfig::default())?;
    let mut scene = Scene::build(&mut renderer, args.lights)?;
    let settings = DebugSettings::default();

    let mut rendered = 0;
    for i in 0..frames {
        if render_frame(&mut renderer, &mut scene, &settings, i as f32 / 60.0)? {
            rendered += 1;
        }
    }
    renderer.wait_idle()?;

    let stats = renderer.stats();
    println!("Rendered {rendered}/{frames} frames");
    println!(
        "  lights: {} uploaded, {} dropped, {} spot shadows",
        stats.lights_uploaded, stats.lights_dropped, stats.spot_shadows
    );
    println!(
        "  wireframes: {} vertices, {} dropped",
        stats.line_vertices, stats.line_vertices_dropped
    );

    let tiles = renderer.read_tile_lights()?;
    if let Some(max) = tiles.iter().map(|t| t.count).max() {
        let total: u64 = tiles.iter().map(|t| t.count as u64).sum();
        println!(
            "  tiles: {}, max {} lights, mean {:.1}",
            tiles.len(),
            max,
            total as f64 / tiles.len() as f64
        );
    }
    Ok(())
}

fn toggle(settings: &mut DebugSettings, key: KeyCode) -> bool {
    match key {
        KeyCode::KeyH => settings.show_heatmap = !settings.show_heatmap,
        KeyCode::KeyL => settings.show_light_wireframes = !settings.show_light_wireframes,
        KeyCode::KeyS => settings.shadows_enabled = !settings.shadows_enabled,
        KeyCode::KeyP => settings.skip_depth_prepass = !settings.skip_depth_prepass,
        KeyCode::KeyC => settings.disable_light_culling = !settings.disable_light_culling,
        KeyCode::KeyB => settings.disable_backface_culling = !settings.disable_backface_culling,
        KeyCode::KeyF => {
            settings.front_face = match settings.front_face {
                FrontFace::Ccw => FrontFace::Cw,
                FrontFace::Cw => FrontFace::Ccw,
            }
        }
        KeyCode::BracketLeft | KeyCode::BracketRight => {
            let step = if key == KeyCode::BracketLeft { -0.001 } else { 0.001 };
            settings.shadow_bias = (settings.shadow_bias + step)
                .clamp(*SHADOW_BIAS_RANGE.start(), *SHADOW_BIAS_RANGE.end());
        }
        _ => return false,
    }
    true
}

fn run_windowed(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let event_loop = EventLoop::new()?;
    let window = Arc::new(
        WindowBuilder::new()
            .with_title("Forward+ Demo")
            .with_inner_size(PhysicalSize::new(args.width, args.height))
            .build(&event_loop)?,
    );

    let config = RendererConfig::default().with_vsync(!args.no_vsync);
    let backend = WgpuBackend::new(Arc::clone(&window), config.vsync)?;
    let mut renderer = Renderer::new(backend, config)?;
    let mut scene = Scene::build(&mut renderer, args.lights)?;
    let mut settings = DebugSettings::default();

    let start = Instant::now();
    let mut paused_at: Option<f32> = None;
    let mut time_offset = 0.0f32;
    let mut last_report = Instant::now();
    let mut frames_since_report = 0u32;

    event_loop.run(move |event, elwt| {
        elwt.set_control_flow(ControlFlow::Poll);
        match event {
            Event::WindowEvent { event, .. } => match event {
                WindowEvent::CloseRequested => elwt.exit(),
                WindowEvent::Resized(size) => {
                    if let Err(e) = renderer.resize(size.width, size.height) {
                        log::error!("Resize failed: {e}");
                        elwt.exit();
                    }
                }
                WindowEvent::KeyboardInput {
                    event:
                        KeyEvent {
                            physical_key: PhysicalKey::Code(key),
                            state: ElementState::Pressed,
                            repeat: false,
                            ..
                        },
                    ..
                } => match key {
                    KeyCode::Escape => elwt.exit(),
                    KeyCode::Space => {
                        let now = start.elapsed().as_secs_f32();
                        paused_at = match paused_at {
                            Some(at) => {
                                time_offset += now - at;
                                None
                            }
                            None => Some(now),
                        };
                    }
                    _ => {
                        if toggle(&mut settings, key) {
                            log::info!("{settings:?}");
                        }
                    }
                },
                WindowEvent::RedrawRequested => {
                    let time = paused_at.unwrap_or_else(|| start.elapsed().as_secs_f32()) - time_offset;
                    match render_frame(&mut renderer, &mut scene, &settings, time) {
                        Ok(true) => frames_since_report += 1,
                        Ok(false) => {}
                        Err(e) => {
                            log::error!("Frame failed: {e}");
                            elwt.exit();
                        }
                    }

                    if last_report.elapsed().as_secs_f32() >= 1.0 {
                        let stats = renderer.stats();
                        window.set_title(&format!(
                            "Forward+ Demo - {} fps, {} lights, {} tiles",
                            frames_since_report, stats.lights_uploaded, stats.tile_count
                        ));
                        frames_since_report = 0;
                        last_report = Instant::now();
                    }
                }
                _ => {}
            },
            Event::AboutToWait => window.request_redraw(),
            _ => {}
        }
    })?;
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    if let Some(frames) = args.headless {
        return run_fixed(RecordingBackend::new(args.width, args.height), &args, frames);
    }
    if let Some(frames) = args.offscreen {
        return run_fixed(WgpuBackend::new_headless(args.width, args.height)?, &args, frames);
    }
    run_windowed(&args)
}
