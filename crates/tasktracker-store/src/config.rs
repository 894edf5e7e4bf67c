//! In-memory store configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// In-memory store configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryStoreConfig {
    /// Simulated latency of every open, in milliseconds
    #[serde(default)]
    pub open_latency_ms: u64,
    /// Simulated latency of every write, in milliseconds
    #[serde(default)]
    pub write_latency_ms: u64,
}

impl MemoryStoreConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With open latency
    #[inline]
    #[must_use]
    pub fn with_open_latency(mut self, latency: Duration) -> Self {
        self.open_latency_ms = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// With write latency
    #[inline]
    #[must_use]
    pub fn with_write_latency(mut self, latency: Duration) -> Self {
        self.write_latency_ms = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Open latency as a duration
    #[inline]
    #[must_use]
    pub fn open_latency(&self) -> Duration {
        Duration::from_millis(self.open_latency_ms)
    }

    /// Write latency as a duration
    #[inline]
    #[must_use]
    pub fn write_latency(&self) -> Duration {
        Duration::from_millis(self.write_latency_ms)
    }
}

impl Default for MemoryStoreConfig {
    fn default() -> Self {
        Self {
            open_latency_ms: 0,
            write_latency_ms: 0,
        }
    }
}
