//! Scene geometry and surface descriptions, plus their GPU-resident forms

mod material;
mod mesh;
mod texture;

pub use material::*;
pub use mesh::*;
pub use texture::*;
