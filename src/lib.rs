//! chunklod - streaming chunked-LOD quadtree terrain core

pub mod core;
pub mod math;
pub mod format;
pub mod chunk;
pub mod render;
pub mod streaming;
pub mod tree;
