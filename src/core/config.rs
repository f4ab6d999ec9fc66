//! Terrain configuration, loadable from JSON.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::error::Error;
use crate::core::types::Result;
use crate::render::RenderOptions;
use crate::streaming::{LoaderConfig, ResidencyBudget};
use crate::tree::ChunkLodTree;

/// Host-facing settings for a terrain tree.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerrainConfig {
    /// Maximum tolerated geometric error in screen pixels
    pub max_pixel_error: f32,
    /// Maximum tolerated texel size in screen pixels
    pub max_texel_size: f32,
    /// Viewport width in pixels
    pub screen_width: f32,
    /// Horizontal field of view in degrees
    pub horizontal_fov_degrees: f32,
    /// Cell size of the relocatable origin lattice (world units)
    pub lattice_width: f64,
    /// Enable vertex morphing between LOD levels
    pub morph: bool,
    /// Enable chunk textures
    pub textures: bool,
    /// Resident geometry budget in megabytes
    pub geometry_budget_mb: usize,
    /// Resident texture budget in megabytes
    pub texture_budget_mb: usize,
    /// Maximum number of chunk reads in flight
    pub max_concurrent_loads: usize,
}

impl Default for TerrainConfig {
    fn default() -> Self {
        Self {
            max_pixel_error: 5.0,
            max_texel_size: 1.0,
            screen_width: 1024.0,
            horizontal_fov_degrees: 90.0,
            lattice_width: 1000.0,
            morph: true,
            textures: true,
            geometry_budget_mb: 256,
            texture_budget_mb: 512,
            max_concurrent_loads: 4,
        }
    }
}

impl TerrainConfig {
    /// Load from a JSON file. Missing fields fall back to defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&json)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Save to a JSON file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| Error::Config(e.to_string()))?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Reject values that would make the LOD thresholds meaningless.
    pub fn validate(&self) -> Result<()> {
        if !(self.max_pixel_error > 0.0) {
            return Err(Error::Config("max_pixel_error must be positive".into()));
        }
        if !(self.max_texel_size > 0.0) {
            return Err(Error::Config("max_texel_size must be positive".into()));
        }
        if !(self.screen_width > 0.0) {
            return Err(Error::Config("screen_width must be positive".into()));
        }
        if !(self.horizontal_fov_degrees > 0.0 && self.horizontal_fov_degrees < 180.0) {
            return Err(Error::Config("horizontal_fov_degrees must be in (0, 180)".into()));
        }
        if !(self.lattice_width > 0.0) {
            return Err(Error::Config("lattice_width must be positive".into()));
        }
        if self.max_concurrent_loads == 0 {
            return Err(Error::Config("max_concurrent_loads must be at least 1".into()));
        }
        Ok(())
    }

    /// Push camera, quality, lattice and budget settings into a tree.
    pub fn apply_to(&self, tree: &mut ChunkLodTree) {
        tree.set_camera_parameters(self.screen_width, self.horizontal_fov_degrees);
        tree.set_quality(self.max_pixel_error, self.max_texel_size);
        tree.set_lattice_width(self.lattice_width);
        tree.set_budget(self.budget());
    }

    pub fn render_options(&self) -> RenderOptions {
        RenderOptions {
            morph: self.morph,
            textures: self.textures,
        }
    }

    pub fn budget(&self) -> ResidencyBudget {
        ResidencyBudget::new(self.geometry_budget_mb, self.texture_budget_mb)
    }

    pub fn loader_config(&self) -> LoaderConfig {
        LoaderConfig {
            max_concurrent: self.max_concurrent_loads,
            ..Default::default()
        }
    }
}
