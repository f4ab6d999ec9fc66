//! Loader that reads on the calling thread.
//!
//! Handy for tools and tests: requests are served immediately and handed
//! back on the next poll, so splits still happen one update later.

use std::io::{Read, Seek};
use std::sync::Arc;

use crate::chunk::ChunkTexture;
use crate::format::{read_chunk_data, ChunkFile};
use crate::streaming::loader::{ChunkLoader, ChunkRequest, Delivery, PayloadKind};
use crate::streaming::texture::TextureSource;

pub struct BlockingLoader<R> {
    file: ChunkFile<R>,
    textures: Option<Arc<dyn TextureSource>>,
    completed: Vec<Delivery>,
    loads_served: usize,
}

impl<R: Read + Seek> BlockingLoader<R> {
    pub fn new(file: ChunkFile<R>) -> Self {
        Self {
            file,
            textures: None,
            completed: Vec::new(),
            loads_served: 0,
        }
    }

    pub fn with_textures(mut self, textures: Arc<dyn TextureSource>) -> Self {
        self.textures = Some(textures);
        self
    }

    /// Total geometry and texture loads performed.
    pub fn loads_served(&self) -> usize {
        self.loads_served
    }

    fn discard(&mut self, chunk: ChunkRequest, kind: PayloadKind) {
        self.completed.retain(|d| !(d.chunk() == chunk.id && d.kind() == kind));
    }
}

impl<R: Read + Seek> ChunkLoader for BlockingLoader<R> {
    fn request_load(&mut self, chunk: ChunkRequest, _priority: f32) {
        self.loads_served += 1;
        let delivery = match read_chunk_data(&mut self.file, chunk.data_file_position, chunk.label) {
            Ok(data) => Delivery::Data(chunk.id, Box::new(data)),
            Err(e) => Delivery::Failed {
                chunk: chunk.id,
                kind: PayloadKind::Geometry,
                reason: e.to_string(),
            },
        };
        self.completed.push(delivery);
    }

    fn request_unload(&mut self, chunk: ChunkRequest) {
        self.discard(chunk, PayloadKind::Geometry);
    }

    fn request_load_texture(&mut self, chunk: ChunkRequest) {
        let Some(textures) = &self.textures else {
            return;
        };
        self.loads_served += 1;
        let delivery = match textures.load_tile(chunk.level, chunk.x, chunk.z) {
            Ok(image) => Delivery::Texture(chunk.id, Arc::new(ChunkTexture::new(image))),
            Err(e) => Delivery::Failed {
                chunk: chunk.id,
                kind: PayloadKind::Texture,
                reason: e.to_string(),
            },
        };
        self.completed.push(delivery);
    }

    fn request_unload_texture(&mut self, chunk: ChunkRequest) {
        self.discard(chunk, PayloadKind::Texture);
    }

    fn poll_completed(&mut self) -> Vec<Delivery> {
        std::mem::take(&mut self.completed)
    }
}
