//! The boundary between the LOD controller and whatever fetches chunk data.
//!
//! The controller issues fire-and-forget requests. Finished loads come back
//! through [`ChunkLoader::poll_completed`], which the tree drains at the start
//! of every update. The tree owns resident data from then on and frees it
//! itself on unload; `request_unload` only tells the loader to drop any work
//! still in flight for that chunk.

use std::sync::Arc;

use crate::chunk::{ChunkData, ChunkId, ChunkRecord, ChunkTexture};

/// Everything a loader needs to locate one chunk's payload and texture tile.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ChunkRequest {
    pub id: ChunkId,
    pub label: i32,
    pub level: u8,
    pub x: u16,
    pub z: u16,
    pub data_file_position: u32,
}

impl ChunkRequest {
    pub fn for_record(id: ChunkId, record: &ChunkRecord) -> Self {
        Self {
            id,
            label: record.label,
            level: record.level,
            x: record.x,
            z: record.z,
            data_file_position: record.data_file_position,
        }
    }
}

/// Geometry or texture.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PayloadKind {
    Geometry,
    Texture,
}

/// A finished request.
#[derive(Debug)]
pub enum Delivery {
    Data(ChunkId, Box<ChunkData>),
    Texture(ChunkId, Arc<ChunkTexture>),
    Failed {
        chunk: ChunkId,
        kind: PayloadKind,
        reason: String,
    },
}

impl Delivery {
    pub fn chunk(&self) -> ChunkId {
        match self {
            Delivery::Data(id, _) | Delivery::Texture(id, _) => *id,
            Delivery::Failed { chunk, .. } => *chunk,
        }
    }

    pub fn kind(&self) -> PayloadKind {
        match self {
            Delivery::Data(..) => PayloadKind::Geometry,
            Delivery::Texture(..) => PayloadKind::Texture,
            Delivery::Failed { kind, .. } => *kind,
        }
    }
}

/// Request sink consumed by the LOD controller.
pub trait ChunkLoader {
    /// Fetch a chunk's geometry. Higher priority goes first.
    fn request_load(&mut self, chunk: ChunkRequest, priority: f32);

    /// The tree is releasing this chunk's geometry; abandon any pending load.
    fn request_unload(&mut self, chunk: ChunkRequest);

    fn request_load_texture(&mut self, chunk: ChunkRequest);

    fn request_unload_texture(&mut self, chunk: ChunkRequest);

    /// Drain finished requests (non-blocking).
    fn poll_completed(&mut self) -> Vec<Delivery>;
}
