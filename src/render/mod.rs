//! Rendering interface for the terrain core

pub mod terrain;

pub use terrain::{
    ChunkDraw, RenderCapabilities, RenderOptions, RenderState, TerrainRenderer, TexGen,
};
