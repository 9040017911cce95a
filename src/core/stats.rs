use serde::{Serialize, Deserialize};
use crate::core::error::Result;
use crate::index::system::IndexStats;

/// Partition statistics for monitoring
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartitionStats {
    pub suffix: String,
    pub entry_count: u64,
    pub next_id: u64,

    // Index metrics
    pub system_indices: Vec<IndexStats>,
    pub presence: IndexStats,
    pub user_indices: Vec<IndexStats>,
}

impl PartitionStats {
    pub fn total_tuples(&self) -> u64 {
        self.system_indices
            .iter()
            .chain(self.user_indices.iter())
            .chain(std::iter::once(&self.presence))
            .map(|s| s.tuples)
            .sum()
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
