//! Render Graph System
//!
//! Passes declare which resources they read and write. Compiling the graph
//! yields a deterministic execution order and the barriers that have to sit
//! between passes, which the executor hands to the backend before each pass.

pub mod barrier;
pub mod executor;
pub mod graph;
pub mod pass;
pub mod resource;

pub use barrier::*;
pub use executor::*;
pub use graph::*;
pub use pass::*;
pub use resource::*;
