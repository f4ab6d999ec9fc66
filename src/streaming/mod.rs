//! Chunk streaming: the loader boundary, loaders and residency accounting

pub mod budget;
pub mod loader;
pub mod texture;
pub mod blocking_loader;
pub mod async_loader;

pub use budget::{ResidencyBudget, EVICT_PRESSURE};
pub use loader::{ChunkLoader, ChunkRequest, Delivery, PayloadKind};
pub use texture::{TextureSource, TileDirectory};
pub use blocking_loader::BlockingLoader;
pub use async_loader::{LoaderConfig, StreamingLoader};
