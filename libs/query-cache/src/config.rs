use std::time::Duration;

#[derive(Debug, Clone, serde::Deserialize)]
pub struct QueryCacheConfig {
    /// Freshness window applied when a read does not pick its own
    #[serde(default = "default_stale_time_ms")]
    pub stale_time_ms: u64,
    /// How long an unobserved entry survives before garbage collection
    #[serde(default = "default_gc_time_ms")]
    pub gc_time_ms: u64,
}

fn default_stale_time_ms() -> u64 { 0 }
fn default_gc_time_ms() -> u64 { 5 * 60 * 1000 }

impl Default for QueryCacheConfig {
    fn default() -> Self {
        Self {
            stale_time_ms: default_stale_time_ms(),
            gc_time_ms: default_gc_time_ms(),
        }
    }
}

impl QueryCacheConfig {
    pub fn stale_time(&self) -> Duration {
        Duration::from_millis(self.stale_time_ms)
    }

    pub fn gc_time(&self) -> Duration { Duration::from_millis(self.gc_time_ms) }
}
