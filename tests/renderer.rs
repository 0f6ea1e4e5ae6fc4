//! Frame-level behavior of the renderer, checked on the recorded command stream.

mod common;

use common::{
    barriers_before, mixed_lights, pass_commands, pass_labels, pass_position, scene_draws,
    TestContext,
};
use forward_plus::backend::{
    BackendError, Command, LoadOp, PipelineStages, TextureLayout,
};
use forward_plus::pipeline::resource_names::{DEPTH, TILES};
use forward_plus::cpu::{cull_tiles, DepthBuffer};
use forward_plus::resources::Mesh;
use forward_plus::scene::FrameUniforms;
use forward_plus::tiling::TileLightList;
use forward_plus::{
    DebugSettings, GraphicsBackend, LightSet, PointLight, RecordingBackend, Renderer, RendererConfig, MAX_LIGHTS,
};
use glam::Vec3;
use rstest::rstest;

const DEPTH_TESTS: PipelineStages = PipelineStages::EARLY_FRAGMENT_TESTS
    .union(PipelineStages::LATE_FRAGMENT_TESTS);

fn uploaded_frame_uniforms(ctx: &TestContext, slot: usize) -> FrameUniforms {
    let resources = ctx.renderer.slot_resources(slot).expect("slot");
    let bytes = ctx
        .renderer
        .backend()
        .buffer_data(resources.frame_uniforms)
        .expect("frame uniforms");
    bytemuck::pod_read_unaligned(&bytes[..std::mem::size_of::<FrameUniforms>()])
}

#[test]
fn passes_run_in_frame_order() {
    let mut ctx = TestContext::new(320, 240);
    let settings = DebugSettings {
        show_heatmap: true,
        ..Default::default()
    };
    assert!(ctx.frame(&mixed_lights(), &settings));

    let labels = pass_labels(&ctx.last_frame());
    assert_eq!(
        labels,
        [
            "Depth Prepass",
            "Light Culling",
            "Shadow Directional",
            "Shadow Spot(0)",
            "Shadow Spot(1)",
            "Shading",
            "Tile Heatmap",
            "Light Wireframes",
        ]
    );
}

#[test]
fn depth_is_made_visible_to_culling() {
    let mut ctx = TestContext::new(320, 240);
    ctx.frame(&mixed_lights(), &DebugSettings::default());

    let barriers = barriers_before(&ctx.last_frame(), "Light Culling");
    let depth = barriers
        .iter()
        .find(|b| b.covers(DEPTH, DEPTH_TESTS, PipelineStages::COMPUTE_SHADER))
        .expect("depth barrier before culling");
    assert_eq!(depth.old_layout, TextureLayout::DepthStencilAttachment);
    assert_eq!(depth.new_layout, TextureLayout::ShaderReadOnly);
}

#[test]
fn tiles_and_depth_are_ready_for_shading() {
    let mut ctx = TestContext::new(320, 240);
    ctx.frame(&mixed_lights(), &DebugSettings::default());

    let barriers = barriers_before(&ctx.last_frame(), "Shading");
    assert!(barriers
        .iter()
        .any(|b| b.covers(TILES, PipelineStages::COMPUTE_SHADER, PipelineStages::FRAGMENT_SHADER)));

    let depth = barriers
        .iter()
        .find(|b| b.resource == DEPTH)
        .expect("depth transition before shading");
    assert_eq!(depth.old_layout, TextureLayout::ShaderReadOnly);
    assert_eq!(depth.new_layout, TextureLayout::DepthStencilReadOnly);
    assert!(depth.is_layout_transition());
}

#[rstest]
#[case(320, 240)]
#[case(1280, 720)]
#[case(17, 33)]
fn culling_dispatches_one_group_per_tile(#[case] width: u32, #[case] height: u32) {
    let mut ctx = TestContext::new(width, height);
    ctx.frame(&mixed_lights(), &DebugSettings::default());

    let grid = ctx.renderer.grid();
    assert_eq!(grid.tiles_x, width.div_ceil(16));
    assert_eq!(grid.tiles_y, height.div_ceil(16));

    let commands = ctx.last_frame();
    let culling = pass_commands(&commands, "Light Culling");
    assert!(culling.contains(&Command::Dispatch {
        x: grid.tiles_x,
        y: grid.tiles_y,
        z: 1
    }));
}

#[test]
fn disabled_culling_clears_every_tile() {
    let mut ctx = TestContext::new(320, 240);
    let settings = DebugSettings {
        disable_light_culling: true,
        ..Default::default()
    };
    ctx.frame(&mixed_lights(), &settings);

    let commands = ctx.last_frame();
    let culling = pass_commands(&commands, "Light Culling");
    let pipeline = culling
        .iter()
        .find_map(|c| match c {
            Command::SetComputePipeline(p) => Some(*p),
            _ => None,
        })
        .expect("compute pipeline");
    let label = ctx
        .renderer
        .backend()
        .compute_pipeline_label(pipeline)
        .expect("label");
    assert!(label.contains("cs_clear"), "{label}");

    let tiles = ctx.renderer.grid().tile_count();
    assert!(culling.contains(&Command::Dispatch {
        x: tiles.div_ceil(64),
        y: 1,
        z: 1
    }));
}

#[test]
fn skipped_prepass_still_clears_depth() {
    let mut ctx = TestContext::new(320, 240);
    let settings = DebugSettings {
        skip_depth_prepass: true,
        ..Default::default()
    };
    ctx.frame(&mixed_lights(), &settings);

    let commands = ctx.last_frame();
    let prepass = pass_commands(&commands, "Depth Prepass");
    match &prepass[0] {
        Command::BeginRenderPass { depth, color, .. } => {
            assert!(color.is_empty());
            let (_, load) = depth.expect("depth attachment");
            assert!(matches!(load, LoadOp::Clear(_)));
        }
        other => panic!("unexpected {other:?}"),
    }
    assert!(!prepass
        .iter()
        .any(|c| matches!(c, Command::DrawIndexed { .. })));

    // Shading picks the depth-writing variant instead
    let shading = pass_commands(&commands, "Shading");
    let pipeline = shading
        .iter()
        .find_map(|c| match c {
            Command::SetRenderPipeline(p) => Some(*p),
            _ => None,
        })
        .expect("shading pipeline");
    let label = ctx
        .renderer
        .backend()
        .render_pipeline_label(pipeline)
        .expect("label");
    assert!(label.contains("depth_write=true"), "{label}");
}

#[test]
fn prepass_draws_every_object() {
    let mut ctx = TestContext::new(320, 240);
    ctx.frame(&mixed_lights(), &DebugSettings::default());

    let commands = ctx.last_frame();
    let draws = pass_commands(&commands, "Depth Prepass")
        .iter()
        .filter(|c| matches!(c, Command::DrawIndexed { .. }))
        .count();
    assert_eq!(draws, 2);
}

#[test]
fn shading_clears_color_and_loads_depth() {
    let mut ctx = TestContext::new(320, 240);
    ctx.frame(&mixed_lights(), &DebugSettings::default());

    let commands = ctx.last_frame();
    match &pass_commands(&commands, "Shading")[0] {
        Command::BeginRenderPass { color, depth, .. } => {
            assert!(matches!(color[0].1, LoadOp::Clear(_)));
            assert_eq!(depth.map(|(_, load)| load), Some(LoadOp::Load));
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn disabled_shadows_render_no_maps() {
    let mut ctx = TestContext::new(320, 240);
    let settings = DebugSettings {
        shadows_enabled: false,
        ..Default::default()
    };
    ctx.frame(&mixed_lights(), &settings);

    assert_eq!(pass_position(&ctx.last_frame(), "Shadow "), None);
    assert_eq!(ctx.renderer.stats().spot_shadows, 0);
}

#[test]
fn only_four_spots_get_shadow_maps() {
    let mut ctx = TestContext::new(320, 240);
    let mut lights = LightSet::new();
    for i in 0..6 {
        lights.add_spot(Vec3::new(i as f32, 5.0, 0.0), Default::default());
    }
    ctx.frame(&lights, &DebugSettings::default());

    let labels = pass_labels(&ctx.last_frame());
    let shadow_passes = labels.iter().filter(|l| l.starts_with("Shadow ")).count();
    assert_eq!(shadow_passes, 4);
    assert_eq!(ctx.renderer.stats().spot_shadows, 4);
}

#[test]
fn light_cap_drops_the_excess() {
    let mut ctx = TestContext::new(320, 240);
    let mut lights = LightSet::new();
    for i in 0..(MAX_LIGHTS + 1) {
        lights.add_point(Vec3::new(i as f32 * 0.1, 1.0, 0.0), PointLight::default());
    }
    ctx.frame(&lights, &DebugSettings::default());

    let stats = ctx.renderer.stats();
    assert_eq!(stats.lights_uploaded, MAX_LIGHTS);
    assert_eq!(stats.lights_dropped, 1);
    assert_eq!(uploaded_frame_uniforms(&ctx, 0).light_count, MAX_LIGHTS as u32);
}

#[test]
fn frame_uniforms_follow_the_viewport() {
    let mut ctx = TestContext::new(100, 50);
    ctx.frame(&mixed_lights(), &DebugSettings::default());

    let uniforms = uploaded_frame_uniforms(&ctx, 0);
    assert_eq!((uniforms.screen_width, uniforms.screen_height), (100, 50));
    assert_eq!((uniforms.tile_count_x, uniforms.tile_count_y), (7, 4));
    assert_eq!(uniforms.tile_size, 16);
    assert_eq!(uniforms.light_count, 7);
}

#[test]
fn frames_alternate_slots_and_wait_on_reuse() {
    let mut ctx = TestContext::new(64, 64);
    let lights = mixed_lights();
    let settings = DebugSettings::default();

    let mut slots = Vec::new();
    for _ in 0..4 {
        let frame = ctx.renderer.begin_frame().expect("begin").expect("frame");
        slots.push(frame.slot());
        ctx.renderer.update_uniforms(&frame, &ctx.camera, &lights, 0.0);
        let draws = scene_draws(&ctx.meshes, &ctx.material);
        ctx.renderer.draw_scene(&frame, &draws, &settings).expect("draw");
        ctx.renderer.end_frame(frame).expect("end");
    }

    assert_eq!(slots, [0, 1, 0, 1]);
    // The first use of each slot has nothing to wait for
    assert_eq!(ctx.renderer.backend().waited_fences().len(), 2);

    let first = ctx.renderer.slot_resources(0).expect("slot 0");
    let second = ctx.renderer.slot_resources(1).expect("slot 1");
    assert_ne!(first.lights, second.lights);
    assert_ne!(first.tiles, second.tiles);
    assert_ne!(first.frame_uniforms, second.frame_uniforms);
}

#[rstest]
#[case(BackendError::SurfaceOutdated)]
#[case(BackendError::SurfaceLost)]
fn outdated_surface_resizes_and_retries(#[case] error: BackendError) {
    let mut ctx = TestContext::new(320, 240);
    ctx.renderer.backend_mut().fail_next_acquire(error);

    assert!(!ctx.frame(&mixed_lights(), &DebugSettings::default()));
    assert_eq!(ctx.renderer.backend().resizes(), [(320, 240)]);
    assert!(ctx.renderer.backend().submitted_frames().is_empty());

    assert!(ctx.frame(&mixed_lights(), &DebugSettings::default()));
    assert_eq!(ctx.renderer.backend().submitted_frames().len(), 1);
}

#[test]
fn acquire_timeout_skips_without_resizing() {
    let mut ctx = TestContext::new(320, 240);
    ctx.renderer
        .backend_mut()
        .fail_next_acquire(BackendError::SurfaceTimeout);

    assert!(!ctx.frame(&mixed_lights(), &DebugSettings::default()));
    assert!(ctx.renderer.backend().resizes().is_empty());
    assert!(ctx.frame(&mixed_lights(), &DebugSettings::default()));
}

#[test]
fn other_acquire_errors_propagate() {
    let mut ctx = TestContext::new(320, 240);
    ctx.renderer
        .backend_mut()
        .fail_next_acquire(BackendError::DeviceLost);
    assert!(matches!(
        ctx.renderer.begin_frame(),
        Err(BackendError::DeviceLost)
    ));
}

fn live_objects(backend: &RecordingBackend) -> [usize; 4] {
    [
        backend.buffer_count(),
        backend.texture_count(),
        backend.view_count(),
        backend.bind_group_count(),
    ]
}

#[test]
fn resize_rebuilds_tiles() {
    let mut ctx = TestContext::new(320, 240);
    ctx.frame(&mixed_lights(), &DebugSettings::default());
    let before = live_objects(ctx.renderer.backend());

    ctx.renderer.resize(640, 480).expect("resize");
    let grid = ctx.renderer.grid();
    assert_eq!((grid.tiles_x, grid.tiles_y), (40, 30));
    assert_eq!(live_objects(ctx.renderer.backend()), before);

    ctx.frame(&mixed_lights(), &DebugSettings::default());
    assert_eq!(uploaded_frame_uniforms(&ctx, 1).screen_width, 640);
}

#[test]
fn repeated_resizes_release_what_they_replace() {
    let mut ctx = TestContext::new(320, 240);
    ctx.frame(&mixed_lights(), &DebugSettings::default());
    let before = live_objects(ctx.renderer.backend());

    // A window drag: a new size every frame
    for step in 1..=8u32 {
        ctx.renderer.resize(320 + step * 7, 240 + step * 3).expect("resize");
        ctx.frame(&mixed_lights(), &DebugSettings::default());
    }
    assert_eq!(live_objects(ctx.renderer.backend()), before);
}

#[test]
fn growing_object_buffer_replaces_its_bind_group() {
    let mut ctx = TestContext::new(64, 64);
    ctx.frame(&mixed_lights(), &DebugSettings::default());
    let before = live_objects(ctx.renderer.backend());

    let many: Vec<_> = (0..forward_plus::frame::INITIAL_OBJECT_CAPACITY + 1)
        .map(|i| forward_plus::MeshDraw {
            mesh: &ctx.meshes[1],
            material: &ctx.material,
            transform: glam::Mat4::from_translation(Vec3::new(i as f32, 0.0, 0.0)),
        })
        .collect();
    let frame = ctx.renderer.begin_frame().expect("begin").expect("frame");
    ctx.renderer.update_uniforms(&frame, &ctx.camera, &mixed_lights(), 0.0);
    ctx.renderer
        .draw_scene(&frame, &many, &DebugSettings::default())
        .expect("draw");
    ctx.renderer.end_frame(frame).expect("end");

    let grown = ctx.renderer.slot_resources(1).expect("slot 1");
    assert!(grown.object_capacity > forward_plus::frame::INITIAL_OBJECT_CAPACITY);
    assert_eq!(live_objects(ctx.renderer.backend()), before);
}

#[test]
fn outdated_present_retires_the_slot_before_rebuilding() {
    let mut ctx = TestContext::new(320, 240);
    ctx.renderer
        .backend_mut()
        .fail_next_present(BackendError::SurfaceOutdated);

    assert!(ctx.frame(&mixed_lights(), &DebugSettings::default()));
    assert_eq!(ctx.renderer.backend().resizes(), [(320, 240)]);
    // The rebuild waited on the frame that failed to present
    assert_eq!(ctx.renderer.backend().waited_fences().len(), 1);
    assert!(ctx.renderer.frames().is_idle());
    assert_eq!(ctx.renderer.frames().slot(), 1);
}

#[test]
fn failed_present_still_leaves_a_fence() {
    let mut ctx = TestContext::new(320, 240);
    ctx.renderer
        .backend_mut()
        .fail_next_present(BackendError::Device("lost queue".into()));

    let frame = ctx.renderer.begin_frame().expect("begin").expect("frame");
    ctx.renderer.update_uniforms(&frame, &ctx.camera, &mixed_lights(), 0.0);
    let draws = scene_draws(&ctx.meshes, &ctx.material);
    ctx.renderer
        .draw_scene(&frame, &draws, &DebugSettings::default())
        .expect("draw");
    assert!(matches!(
        ctx.renderer.end_frame(frame),
        Err(BackendError::Device(_))
    ));
    assert!(!ctx.renderer.frames().is_idle());

    ctx.renderer.wait_idle().expect("wait");
    assert_eq!(ctx.renderer.backend().waited_fences().len(), 1);
}

/// What the culling pass computes for the context's scene, on the CPU
fn reference_tiles(ctx: &TestContext, slot: usize, lights: &LightSet) -> Vec<TileLightList> {
    let frame = uploaded_frame_uniforms(ctx, slot);
    let mut depth = DepthBuffer::new(frame.screen_width, frame.screen_height);
    let view_proj = frame.proj * frame.view;
    for (mesh, draw) in [Mesh::plane(20.0, 20.0, 1), Mesh::cube()]
        .iter()
        .zip(scene_draws(&ctx.meshes, &ctx.material))
    {
        let positions: Vec<Vec3> = mesh.vertices.iter().map(|v| v.position).collect();
        depth.draw_mesh(view_proj, draw.transform, &positions, &mesh.indices);
    }
    cull_tiles(&frame, &lights.pack().lights, &depth)
}

#[test]
fn tile_readback_returns_the_culled_lists() {
    let mut ctx = TestContext::new(320, 240);
    let lights = mixed_lights();
    ctx.frame(&lights, &DebugSettings::default());

    // Stand in for the compute pass: fill slot 0's tiles with the CPU result
    let expected = reference_tiles(&ctx, 0, &lights);
    assert_eq!(expected.len(), 20 * 15);
    assert!(expected.iter().any(|t| t.count > 0));
    let tiles = ctx.renderer.slot_resources(0).expect("slot 0").tiles;
    ctx.renderer
        .backend_mut()
        .write_buffer(tiles, 0, bytemuck::cast_slice(&expected));

    let read = ctx.renderer.read_tile_lights().expect("readback");
    assert_eq!(read.len(), expected.len());
    for (got, want) in read.iter().zip(&expected) {
        assert_eq!(got.count, want.count);
        assert_eq!(got.lights(), want.lights());
        assert!(got.count as usize <= forward_plus::MAX_LIGHTS_PER_TILE);
    }

    ctx.renderer.resize(640, 480).expect("resize");
    ctx.frame(&lights, &DebugSettings::default());
    assert_eq!(ctx.renderer.read_tile_lights().expect("readback").len(), 40 * 30);
}

#[test]
fn zero_sized_resize_is_ignored() {
    let mut ctx = TestContext::new(320, 240);
    ctx.renderer.resize(0, 240).expect("resize");
    assert_eq!(ctx.renderer.grid().width, 320);
    assert!(ctx.renderer.backend().resizes().is_empty());
}

#[test]
fn wireframes_respect_the_byte_budget() {
    // Room for 100 line vertices
    let config = RendererConfig::default().with_debug_line_budget(24 * 100);
    let mut ctx = TestContext::with_config(320, 240, config);
    let mut lights = LightSet::new();
    for i in 0..8 {
        lights.add_point(Vec3::new(i as f32, 1.0, 0.0), PointLight::default());
    }
    ctx.frame(&lights, &DebugSettings::default());

    let stats = ctx.renderer.stats();
    assert!(stats.line_vertices <= 100);
    assert!(stats.line_vertices_dropped > 0);

    let commands = ctx.last_frame();
    let wireframes = pass_commands(&commands, "Light Wireframes");
    assert!(wireframes.contains(&Command::Draw {
        vertices: 0..stats.line_vertices as u32,
        instances: 0..1
    }));
}

#[test]
fn hidden_wireframes_skip_the_pass() {
    let mut ctx = TestContext::new(320, 240);
    let settings = DebugSettings {
        show_light_wireframes: false,
        ..Default::default()
    };
    ctx.frame(&mixed_lights(), &settings);
    assert_eq!(pass_position(&ctx.last_frame(), "Light Wireframes"), None);
}

#[test]
fn heatmap_draws_a_full_screen_triangle_over_shading() {
    let mut ctx = TestContext::new(320, 240);
    let settings = DebugSettings {
        show_heatmap: true,
        ..Default::default()
    };
    ctx.frame(&mixed_lights(), &settings);

    let commands = ctx.last_frame();
    let heatmap = pass_commands(&commands, "Tile Heatmap");
    match &heatmap[0] {
        Command::BeginRenderPass { color, depth, .. } => {
            assert_eq!(color[0].1, LoadOp::Load);
            assert!(depth.is_none());
        }
        other => panic!("unexpected {other:?}"),
    }
    assert!(heatmap.contains(&Command::Draw {
        vertices: 0..3,
        instances: 0..1
    }));
    assert!(pass_position(&commands, "Tile Heatmap") > pass_position(&commands, "Shading"));
}

#[test]
fn zero_frames_in_flight_is_rejected() {
    let config = RendererConfig::default().with_frames_in_flight(0);
    assert!(Renderer::new(RecordingBackend::new(64, 64), config).is_err());
}

#[test]
fn empty_mesh_is_rejected() {
    let mut ctx = TestContext::new(64, 64);
    let empty = forward_plus::resources::Mesh::new("Empty");
    assert!(matches!(
        ctx.renderer.upload_mesh(&empty),
        Err(BackendError::BufferCreationFailed(_))
    ));
}

#[test]
fn many_draws_grow_the_object_buffer() {
    let mut ctx = TestContext::new(64, 64);
    let lights = mixed_lights();
    let frame = ctx.renderer.begin_frame().expect("begin").expect("frame");
    ctx.renderer.update_uniforms(&frame, &ctx.camera, &lights, 0.0);

    let template = scene_draws(&ctx.meshes, &ctx.material)[1];
    let draws = vec![template; 100];
    ctx.renderer
        .draw_scene(&frame, &draws, &DebugSettings::default())
        .expect("draw");
    ctx.renderer.end_frame(frame).expect("end");

    let resources = ctx.renderer.slot_resources(0).expect("slot");
    assert_eq!(resources.object_capacity, 128);
    let commands = ctx.last_frame();
    let shading_draws = pass_commands(&commands, "Shading")
        .iter()
        .filter(|c| matches!(c, Command::DrawIndexed { .. }))
        .count();
    assert_eq!(shading_draws, 100);
}
