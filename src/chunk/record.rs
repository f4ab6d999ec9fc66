//! Quadtree node metadata and arena handles.

use std::sync::Arc;

use crate::chunk::data::{ChunkData, ChunkTexture};
use crate::math::Aabb;
use crate::math::frustum::CullResult;

/// Dense index of a chunk inside the tree's arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkId(pub u32);

impl ChunkId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Cardinal neighbor slots, in file order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    /// +x
    East = 0,
    /// -z
    North = 1,
    /// -x
    West = 2,
    /// +z
    South = 3,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::East,
        Direction::North,
        Direction::West,
        Direction::South,
    ];

    /// Grid step (dx, dz) towards this neighbor.
    pub fn offset(self) -> (i32, i32) {
        match self {
            Direction::East => (1, 0),
            Direction::North => (0, -1),
            Direction::West => (-1, 0),
            Direction::South => (0, 1),
        }
    }
}

/// Neighbor link: the label stored in the file plus the resolved handle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Neighbor {
    pub label: i32,
    pub chunk: Option<ChunkId>,
}

impl Neighbor {
    pub const NONE: Neighbor = Neighbor { label: -1, chunk: None };
}

/// Packed LOD value: tree level in the high byte, morph fraction in the low
/// byte. Low byte 0 looks like the parent, 255 is full detail.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Lod(pub u16);

impl Lod {
    pub fn new(level: u8, morph: u8) -> Self {
        Lod(((level as u16) << 8) | morph as u16)
    }

    /// LOD at the coarse end of `level`.
    pub fn base(level: u8) -> Self {
        Lod::new(level, 0)
    }

    pub fn level(self) -> u8 {
        (self.0 >> 8) as u8
    }

    pub fn morph(self) -> u8 {
        (self.0 & 0x00FF) as u8
    }

    /// Lowest encodable value at this level.
    pub fn floor(self) -> u16 {
        self.0 & 0xFF00
    }

    /// Highest encodable value at this level.
    pub fn ceil(self) -> u16 {
        self.0 | 0x00FF
    }

    /// Clamp a desired value into the range this level can encode.
    pub fn clamped(self, desired: u16) -> Lod {
        Lod(desired.clamp(self.floor(), self.ceil()))
    }

    /// Vertex blend towards the parent surface: 1.0 at the coarse end of
    /// the level, 0.0 at full detail.
    pub fn morph_factor(self) -> f32 {
        1.0 - self.morph() as f32 / 255.0
    }
}

/// Frames to wait before re-requesting after the first failed load.
pub const RETRY_BASE_FRAMES: u64 = 8;

/// The retry delay doubles per consecutive failure up to this many times.
pub const RETRY_MAX_DOUBLINGS: u32 = 5;

/// Backoff state for a payload whose last load failed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LoadRetry {
    pub failures: u32,
    /// First update frame at which the payload may be requested again
    pub next_frame: u64,
}

impl LoadRetry {
    pub fn ready(&self, frame: u64) -> bool {
        frame >= self.next_frame
    }

    /// Record a failure seen during `frame` and push the next attempt back.
    pub fn fail(&mut self, frame: u64) {
        let doublings = self.failures.min(RETRY_MAX_DOUBLINGS);
        self.failures = self.failures.saturating_add(1);
        self.next_frame = frame + (RETRY_BASE_FRAMES << doublings);
    }

    pub fn reset(&mut self) {
        *self = LoadRetry::default();
    }
}

/// One quadtree node. Metadata lives for the whole tree; `data` and `texture`
/// come and go with streaming.
#[derive(Debug)]
pub struct ChunkRecord {
    pub label: i32,
    pub level: u8,
    pub x: u16,
    pub z: u16,

    pub parent: Option<ChunkId>,
    pub children: Option<[ChunkId; 4]>,
    pub neighbors: [Neighbor; 4],

    pub min_y: i16,
    pub max_y: i16,
    /// Bounding box in the tree's local frame
    pub bounds: Aabb,

    pub data: Option<Box<ChunkData>>,
    pub texture: Option<Arc<ChunkTexture>>,
    pub data_file_position: u32,
    pub vertex_count: u16,

    pub lod: Lod,
    pub split: bool,

    pub(crate) load_pending: bool,
    pub(crate) texture_pending: bool,
    pub(crate) load_retry: LoadRetry,
    pub(crate) texture_retry: LoadRetry,
    pub(crate) cull: CullResult,
}

impl ChunkRecord {
    pub fn new(label: i32, level: u8, x: u16, z: u16) -> Self {
        Self {
            label,
            level,
            x,
            z,
            parent: None,
            children: None,
            neighbors: [Neighbor::NONE; 4],
            min_y: 0,
            max_y: 0,
            bounds: Aabb::default(),
            data: None,
            texture: None,
            data_file_position: 0,
            vertex_count: 0,
            lod: Lod::base(level),
            split: false,
            load_pending: false,
            texture_pending: false,
            load_retry: LoadRetry::default(),
            texture_retry: LoadRetry::default(),
            cull: CullResult::ALL_PLANES,
        }
    }

    pub fn has_children(&self) -> bool {
        self.children.is_some()
    }

    pub fn has_resident_data(&self) -> bool {
        self.data.is_some()
    }

    pub fn has_texture(&self) -> bool {
        self.texture.is_some()
    }

    pub fn is_culled(&self) -> bool {
        self.cull.culled
    }

    pub fn is_load_pending(&self) -> bool {
        self.load_pending
    }

    /// Consecutive failed geometry loads since the last success.
    pub fn load_failures(&self) -> u32 {
        self.load_retry.failures
    }

    pub fn neighbor(&self, direction: Direction) -> Option<ChunkId> {
        self.neighbors[direction as usize].chunk
    }
}
