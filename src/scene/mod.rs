//! Scene data consumed by the renderer each frame

mod camera;
mod extract;
mod light;
mod transform;
mod uniforms;

pub use camera::*;
pub use extract::*;
pub use light::*;
pub use transform::*;
pub use uniforms::*;
