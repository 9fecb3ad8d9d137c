use std::env;

/// Caching knobs for [`crate::RemotePagedModel`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelConfig {
    /// Rows fetched when a single uncached row is looked up; also the
    /// default viewport before the grid asks for one.
    pub block_size: usize,
    /// Upper bound on cached rows; the rows farthest from the last requested
    /// window are dropped first.
    pub max_cached_rows: usize,
}

impl ModelConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let block_size = env::var("DBTORIA_BLOCK_SIZE")
            .ok()
            .and_then(|v| v.parse().ok())
            .filter(|v: &usize| *v > 0)
            .unwrap_or(defaults.block_size);
        let max_cached_rows = env::var("DBTORIA_MAX_CACHED_ROWS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.max_cached_rows)
            .max(block_size);
        Self {
            block_size,
            max_cached_rows,
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            block_size: 50,
            max_cached_rows: 750,
        }
    }
}
