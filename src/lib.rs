//! Forward+ - a tiled forward renderer on wgpu
//!
//! Each frame renders opaque depth, culls lights per 16x16 screen tile in a
//! compute pass, renders shadow maps for one directional and up to four spot
//! lights, then shades every fragment with only the lights of its tile.
//!
//! # Features
//! - Render graph with declared resource usage and a derived barrier plan
//! - Compute light culling into fixed-capacity per-tile light lists
//! - Cook-Torrance PBR shading with 3x3 PCF shadows and Reinhard tone mapping
//! - Tile heatmap and light wireframe overlays driven by [`DebugSettings`]
//! - Frames in flight with per-slot resources
//! - A recording backend for device-free testing, plus CPU reference versions
//!   of culling, shading and shadow filtering in [`cpu`]
//!
//! # Frame loop
//!
//! ```ignore
//! let mut renderer = Renderer::new(WgpuBackend::new(window, true)?, RendererConfig::default())?;
//! loop {
//!     let Some(frame) = renderer.begin_frame()? else { continue };
//!     renderer.update_uniforms(&frame, &camera, &lights, time);
//!     renderer.draw_scene(&frame, &draws, &settings)?;
//!     renderer.end_frame(frame)?;
//! }
//! ```

pub mod backend;
pub mod cpu;
pub mod debug;
pub mod debug_lines;
pub mod frame;
pub mod pipeline;
pub mod render_graph;
pub mod renderer;
pub mod resources;
pub mod scene;
pub mod shadow;
pub mod tiling;

pub use backend::{BackendError, BackendResult, GraphicsBackend, RecordingBackend, WgpuBackend};
pub use debug::DebugSettings;
pub use renderer::{Frame, FrameStats, MeshDraw, Renderer, RendererConfig};
pub use scene::{AmbientLight, Camera, DirectionalLight, Light, LightSet, PointLight, SpotLight};

/// Edge length of a culling tile in pixels
pub const TILE_SIZE: u32 = 16;

/// Capacity of one tile's light list; further lights are dropped
pub const MAX_LIGHTS_PER_TILE: usize = 256;

/// Lights uploaded per frame; the rest of a larger set is dropped
pub const MAX_LIGHTS: usize = 1024;

/// Spot lights that can own a shadow map
pub const MAX_SPOT_SHADOWS: usize = 4;

/// Shadow views per frame: one directional plus the spot maps
pub const MAX_SHADOW_VIEWS: usize = 1 + MAX_SPOT_SHADOWS;

pub const MAX_FRAMES_IN_FLIGHT: usize = 2;

/// Tile light count shown as full red in the heatmap
pub const HEATMAP_MAX_LIGHTS: u32 = 32;
