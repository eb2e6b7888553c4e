//! Host capability snapshot, used to gate default quality and selection.

use serde::{Deserialize, Serialize};

/// Coarse capability tier derived from a `SystemProfile`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SystemTier {
    S,
    A,
    B,
    C,
    D,
}

/// Minimal GPU descriptor; presence alone is enough to influence tier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GpuDescriptor {
    pub name: String,
    pub vram_mb: u32,
}

/// Snapshot of the host the engine is running on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemProfile {
    pub logical_cores: u32,
    pub physical_cores: u32,
    pub ram_gib: u32,
    pub gpu: Option<GpuDescriptor>,
}

impl SystemProfile {
    /// Derive the coarse tier from core/RAM/GPU figures.
    ///
    /// There is no single authoritative thresholding scheme in the source
    /// spec beyond naming the five tiers; this uses RAM and core count as
    /// the primary signals and a discrete GPU as a tie-breaker upward,
    /// matching how `SystemProfile` consumers (the pre-generation
    /// validator and the selection engine) only need a coarse ordering.
    pub fn tier(&self) -> SystemTier {
        let gpu_boost = self.gpu.is_some();
        match (self.ram_gib, self.logical_cores, gpu_boost) {
            (ram, cores, true) if ram >= 32 && cores >= 16 => SystemTier::S,
            (ram, cores, _) if ram >= 32 && cores >= 16 => SystemTier::A,
            (ram, cores, true) if ram >= 16 && cores >= 8 => SystemTier::A,
            (ram, cores, _) if ram >= 16 && cores >= 8 => SystemTier::B,
            (ram, cores, _) if ram >= 8 && cores >= 4 => SystemTier::C,
            _ => SystemTier::D,
        }
    }
}
