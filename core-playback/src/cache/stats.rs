//! Cache statistics and monitoring

use serde::{Deserialize, Serialize};

/// Snapshot of the track cache's occupancy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Number of tracks in the index
    pub total_tracks: usize,

    /// Sum of the indexed file sizes
    pub total_bytes: u64,

    /// Configured byte budget
    pub budget_bytes: u64,
}

impl CacheStats {
    /// Calculate cache usage as a percentage of the budget.
    pub fn usage_percentage(&self) -> f64 {
        if self.budget_bytes == 0 {
            return 0.0;
        }

        (self.total_bytes as f64 / self.budget_bytes as f64) * 100.0
    }

    /// Returns true if the cache is near capacity (>90%).
    pub fn is_near_capacity(&self) -> bool {
        self.usage_percentage() > 90.0
    }

    /// Bytes left before the next insert starts evicting.
    pub fn remaining_bytes(&self) -> u64 {
        self.budget_bytes.saturating_sub(self.total_bytes)
    }

    /// Returns average bytes per track.
    pub fn average_track_size(&self) -> u64 {
        if self.total_tracks == 0 {
            0
        } else {
            self.total_bytes / self.total_tracks as u64
        }
    }
}
