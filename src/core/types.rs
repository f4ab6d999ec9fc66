//! Core type aliases and re-exports

pub use glam::{
    Vec3, Vec4,
    Mat4,
    DVec2, DVec3,
};

/// Standard Result type for the terrain core
pub type Result<T> = std::result::Result<T, crate::core::error::Error>;
