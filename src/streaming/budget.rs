//! Residency budget for streamed chunk geometry and textures
//!
//! Tracks how many bytes of chunk geometry and chunk textures are resident.
//! The LOD controller consults the pressure metrics before evicting
//! low-priority subtrees.

/// Pressure above which eviction kicks in.
pub const EVICT_PRESSURE: f32 = 0.9;

/// Resident-bytes budget for chunk geometry and chunk textures.
#[derive(Clone, Debug, PartialEq)]
pub struct ResidencyBudget {
    /// Maximum resident geometry (bytes)
    geometry_budget_bytes: usize,
    /// Maximum resident textures (bytes)
    texture_budget_bytes: usize,
    /// Currently resident geometry (bytes)
    geometry_used_bytes: usize,
    /// Currently resident textures (bytes)
    texture_used_bytes: usize,
}

impl Default for ResidencyBudget {
    fn default() -> Self {
        Self::new(256, 512)
    }
}

impl ResidencyBudget {
    /// Create a new budget
    ///
    /// # Arguments
    /// * `geometry_budget_mb` - Maximum resident geometry in megabytes
    /// * `texture_budget_mb` - Maximum resident textures in megabytes
    pub fn new(geometry_budget_mb: usize, texture_budget_mb: usize) -> Self {
        Self::from_bytes(geometry_budget_mb * 1024 * 1024, texture_budget_mb * 1024 * 1024)
    }

    pub fn from_bytes(geometry_budget_bytes: usize, texture_budget_bytes: usize) -> Self {
        Self {
            geometry_budget_bytes,
            texture_budget_bytes,
            geometry_used_bytes: 0,
            texture_used_bytes: 0,
        }
    }

    /// Keep current usage but take new limits.
    pub fn with_limits_of(&self, other: &ResidencyBudget) -> Self {
        Self {
            geometry_budget_bytes: other.geometry_budget_bytes,
            texture_budget_bytes: other.texture_budget_bytes,
            ..self.clone()
        }
    }

    // --- Tracking methods ---

    pub fn add_geometry(&mut self, bytes: usize) {
        self.geometry_used_bytes = self.geometry_used_bytes.saturating_add(bytes);
    }

    pub fn remove_geometry(&mut self, bytes: usize) {
        self.geometry_used_bytes = self.geometry_used_bytes.saturating_sub(bytes);
    }

    pub fn add_texture(&mut self, bytes: usize) {
        self.texture_used_bytes = self.texture_used_bytes.saturating_add(bytes);
    }

    pub fn remove_texture(&mut self, bytes: usize) {
        self.texture_used_bytes = self.texture_used_bytes.saturating_sub(bytes);
    }

    // --- Query methods ---

    pub fn geometry_used(&self) -> usize {
        self.geometry_used_bytes
    }

    pub fn texture_used(&self) -> usize {
        self.texture_used_bytes
    }

    /// Geometry pressure (0.0 to 1.0+). Above 1.0 is over budget.
    pub fn geometry_pressure(&self) -> f32 {
        if self.geometry_budget_bytes == 0 {
            return 0.0;
        }
        self.geometry_used_bytes as f32 / self.geometry_budget_bytes as f32
    }

    /// Texture pressure (0.0 to 1.0+). Above 1.0 is over budget.
    pub fn texture_pressure(&self) -> f32 {
        if self.texture_budget_bytes == 0 {
            return 0.0;
        }
        self.texture_used_bytes as f32 / self.texture_budget_bytes as f32
    }

    // --- Decision methods ---

    /// Whether low-priority geometry should be released.
    pub fn should_evict_geometry(&self) -> bool {
        self.geometry_pressure() > EVICT_PRESSURE
    }

    /// Whether low-priority textures should be released.
    pub fn should_evict_textures(&self) -> bool {
        self.texture_pressure() > EVICT_PRESSURE
    }
}
