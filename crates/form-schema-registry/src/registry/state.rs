//! Registry state management
//!
//! Lifecycle flags of a registry instance and the statistics it reports.

use crate::cache::CacheStats;
use crate::metrics::MetricsSnapshot;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Registry state
#[derive(Debug, Clone)]
pub struct RegistryState {
    /// Whether the registry finished construction
    pub initialized: bool,

    /// Outcome of the last health probe
    pub healthy: bool,

    /// Last health check timestamp
    pub last_health_check: Option<DateTime<Utc>>,

    /// Whether `shutdown` ran
    pub shut_down: bool,
}

impl RegistryState {
    /// Create a new registry state
    pub fn new() -> Self {
        Self {
            initialized: false,
            healthy: false,
            last_health_check: None,
            shut_down: false,
        }
    }

    /// Mark the registry as initialized
    pub fn mark_initialized(&mut self) {
        self.initialized = true;
    }

    /// Update health status
    pub fn update_health(&mut self, healthy: bool) {
        self.healthy = healthy;
        self.last_health_check = Some(Utc::now());
    }

    /// Mark the registry as shut down
    pub fn mark_shut_down(&mut self) {
        self.shut_down = true;
        self.healthy = false;
    }
}

impl Default for RegistryState {
    fn default() -> Self {
        Self::new()
    }
}

/// Registry statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryStats {
    /// Storage backend name
    pub backend: String,

    /// Live schemas in storage
    pub total_schemas: u64,

    /// Archived versions across all schemas
    pub total_versions: u64,

    /// Bytes of current records
    pub total_size_bytes: u64,

    /// In-process cache statistics, when a cache keeps any
    pub cache: Option<CacheStats>,

    /// Operation metrics
    pub metrics: MetricsSnapshot,

    /// When the statistics were gathered
    pub collected_at: DateTime<Utc>,
}

impl RegistryStats {
    /// Average size of a current record in bytes
    pub fn avg_schema_size_bytes(&self) -> u64 {
        if self.total_schemas == 0 {
            0
        } else {
            self.total_size_bytes / self.total_schemas
        }
    }
}
