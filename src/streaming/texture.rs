//! Narrow view of the external texture quadtree.

use std::path::PathBuf;

use image::RgbaImage;

use crate::core::error::Error;
use crate::core::types::Result;

/// Source of per-chunk texture tiles, addressed by quadtree position.
///
/// Called from loader worker threads.
pub trait TextureSource: Send + Sync {
    /// Number of texture quadtree levels. Chunks at or below this depth
    /// inherit an ancestor's texture.
    fn depth(&self) -> u32;

    /// Tile edge length in texels.
    fn tile_size(&self) -> u32;

    fn load_tile(&self, level: u8, x: u16, z: u16) -> Result<RgbaImage>;
}

/// Tiles stored as PNG files under `<root>/<level>/<x>_<z>.png`.
#[derive(Clone, Debug)]
pub struct TileDirectory {
    root: PathBuf,
    depth: u32,
    tile_size: u32,
}

impl TileDirectory {
    pub fn new(root: impl Into<PathBuf>, depth: u32, tile_size: u32) -> Self {
        Self { root: root.into(), depth, tile_size }
    }

    pub fn tile_path(&self, level: u8, x: u16, z: u16) -> PathBuf {
        self.root.join(level.to_string()).join(format!("{}_{}.png", x, z))
    }
}

impl TextureSource for TileDirectory {
    fn depth(&self) -> u32 {
        self.depth
    }

    fn tile_size(&self) -> u32 {
        self.tile_size
    }

    fn load_tile(&self, level: u8, x: u16, z: u16) -> Result<RgbaImage> {
        let path = self.tile_path(level, x, z);
        let image = image::open(&path)
            .map_err(|e| Error::Streaming(format!("{}: {}", path.display(), e)))?
            .to_rgba8();
        if image.width() != self.tile_size || image.height() != self.tile_size {
            return Err(Error::Streaming(format!(
                "{}: expected {}x{} tile, got {}x{}",
                path.display(),
                self.tile_size,
                self.tile_size,
                image.width(),
                image.height()
            )));
        }
        Ok(image)
    }
}
