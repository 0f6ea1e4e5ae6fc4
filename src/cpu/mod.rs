//! CPU reference versions of the GPU stages
//!
//! These follow the WGSL in [`crate::pipeline`] operation for operation so the
//! culling, shading and shadow contracts can be checked without a device.
//! Nothing here runs during normal rendering.

pub mod culling;
pub mod raster;
pub mod shading;
pub mod shadow;

pub use culling::{bounding_sphere, cull_tiles, TileFrustum};
pub use raster::DepthBuffer;
pub use shading::{shade_fragment, SurfacePoint};
pub use shadow::pcf;
