//! Shared setup for the renderer integration tests.
//!
//! Everything runs on [`RecordingBackend`], so no GPU is needed: the tests
//! inspect the recorded command stream and the bytes written to buffers.

#![allow(dead_code)]

use forward_plus::backend::{Barrier, Command};
use forward_plus::resources::{GpuMaterial, GpuMesh, Material, Mesh};
use forward_plus::{
    Camera, DebugSettings, DirectionalLight, LightSet, MeshDraw, PointLight, RecordingBackend,
    Renderer, RendererConfig, SpotLight,
};
use glam::{Mat4, Vec3};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A renderer with a ground plane and one cube uploaded
pub struct TestContext {
    pub renderer: Renderer<RecordingBackend>,
    pub meshes: Vec<GpuMesh>,
    pub material: GpuMaterial,
    pub camera: Camera,
}

impl TestContext {
    pub fn new(width: u32, height: u32) -> Self {
        Self::with_config(width, height, RendererConfig::default())
    }

    pub fn with_config(width: u32, height: u32, config: RendererConfig) -> Self {
        init_logging();
        let mut renderer =
            Renderer::new(RecordingBackend::new(width, height), config).expect("renderer");
        let meshes = vec![
            renderer.upload_mesh(&Mesh::plane(20.0, 20.0, 1)).expect("plane"),
            renderer.upload_mesh(&Mesh::cube()).expect("cube"),
        ];
        let material = renderer
            .create_material(&Material::new("Test"))
            .expect("material");
        Self {
            renderer,
            meshes,
            material,
            camera: Camera::new(Vec3::new(0.0, 6.0, 10.0), Vec3::ZERO),
        }
    }

    /// Run one full frame; returns false when `begin_frame` skipped it
    pub fn frame(&mut self, lights: &LightSet, settings: &DebugSettings) -> bool {
        let Some(frame) = self.renderer.begin_frame().expect("begin_frame") else {
            return false;
        };
        self.renderer
            .update_uniforms(&frame, &self.camera, lights, frame.index() as f32);
        let draws = scene_draws(&self.meshes, &self.material);
        self.renderer
            .draw_scene(&frame, &draws, settings)
            .expect("draw_scene");
        self.renderer.end_frame(frame).expect("end_frame");
        true
    }

    pub fn last_frame(&self) -> Vec<Command> {
        self.renderer
            .backend()
            .last_frame()
            .map(<[Command]>::to_vec)
            .unwrap_or_default()
    }
}

/// The context's plane on the ground and its cube resting on it
pub fn scene_draws<'a>(meshes: &'a [GpuMesh], material: &'a GpuMaterial) -> Vec<MeshDraw<'a>> {
    vec![
        MeshDraw {
            mesh: &meshes[0],
            material,
            transform: Mat4::IDENTITY,
        },
        MeshDraw {
            mesh: &meshes[1],
            material,
            transform: Mat4::from_translation(Vec3::new(0.0, 1.0, 0.0)),
        },
    ]
}

/// A sun, a few point lights and two spots
pub fn mixed_lights() -> LightSet {
    let mut lights = LightSet::new();
    lights.add_directional(DirectionalLight::default());
    for i in 0..4 {
        lights.add_point(
            Vec3::new(i as f32 * 2.0 - 3.0, 1.0, 0.0),
            PointLight::new(Vec3::ONE, 2.0, 4.0),
        );
    }
    lights.add_spot(Vec3::new(0.0, 5.0, 0.0), SpotLight::default());
    lights.add_spot(
        Vec3::new(3.0, 5.0, 0.0),
        SpotLight::new(Vec3::NEG_Y, Vec3::X, 3.0, 8.0, 0.3, 0.5),
    );
    lights
}

/// Labels of every pass in a frame, in recording order
pub fn pass_labels(commands: &[Command]) -> Vec<String> {
    commands
        .iter()
        .filter_map(Command::pass_label)
        .map(str::to_string)
        .collect()
}

/// Index of the first pass whose label starts with `prefix`
pub fn pass_position(commands: &[Command], prefix: &str) -> Option<usize> {
    commands
        .iter()
        .position(|c| c.pass_label().is_some_and(|l| l.starts_with(prefix)))
}

/// Barriers recorded directly before the pass starting with `prefix`
pub fn barriers_before(commands: &[Command], prefix: &str) -> Vec<Barrier> {
    let Some(position) = pass_position(commands, prefix) else {
        return Vec::new();
    };
    commands[..position]
        .iter()
        .rev()
        .take_while(|c| matches!(c, Command::Barrier(_)))
        .flat_map(|c| match c {
            Command::Barrier(barriers) => barriers.clone(),
            _ => Vec::new(),
        })
        .collect()
}

/// Commands between the start of a pass and its end
pub fn pass_commands<'a>(commands: &'a [Command], prefix: &str) -> &'a [Command] {
    let Some(start) = pass_position(commands, prefix) else {
        return &[];
    };
    let end = commands[start..]
        .iter()
        .position(|c| matches!(c, Command::EndRenderPass | Command::EndComputePass))
        .map(|offset| start + offset)
        .unwrap_or(commands.len());
    &commands[start..=end.min(commands.len() - 1)]
}
