//! Quadtree chunk records and their streamed payloads

pub mod record;
pub mod data;

pub use record::{ChunkId, ChunkRecord, Direction, LoadRetry, Lod, Neighbor, RETRY_BASE_FRAMES, RETRY_MAX_DOUBLINGS};
pub use data::{ChunkData, ChunkTexture, DrawPath, MeshVertex, VERTEX_HALF_SPAN};
