//! Parallel processing utilities for surface reconstruction
//!
//! Reconstruction runs its data-parallel loops on a configurable thread pool.
//! Without explicit initialization a pool with default settings is created on
//! first use.

use gridcrate_core::{Error, Result};
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::sync::{Arc, Mutex, OnceLock};
use tracing::warn;

static GLOBAL_THREAD_POOL: OnceLock<Arc<ThreadPool>> = OnceLock::new();
/// Set once a custom pool is installed; the lazily built pool uses the default
static THREAD_POOL_CONFIG: Mutex<Option<ThreadPoolConfig>> = Mutex::new(None);

/// Thread pool configuration for parallel processing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadPoolConfig {
    /// Number of threads to use (None = one per core)
    pub num_threads: Option<usize>,
    /// Thread stack size in bytes
    pub stack_size: Option<usize>,
    /// Thread name prefix
    pub thread_name_prefix: String,
    /// Enable parallel processing (can be disabled for debugging)
    pub enabled: bool,
    /// Inputs shorter than this are processed sequentially
    pub min_chunk_size: usize,
}

impl ThreadPoolConfig {
    /// Set number of threads
    pub fn with_threads(mut self, num_threads: usize) -> Self {
        self.num_threads = Some(num_threads);
        self
    }

    /// Set stack size
    pub fn with_stack_size(mut self, stack_size: usize) -> Self {
        self.stack_size = Some(stack_size);
        self
    }

    /// Enable or disable parallel processing
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_min_chunk_size(mut self, min_chunk_size: usize) -> Self {
        self.min_chunk_size = min_chunk_size;
        self
    }
}

impl Default for ThreadPoolConfig {
    fn default() -> Self {
        Self {
            num_threads: None,
            stack_size: None,
            thread_name_prefix: "gridcrate-recon".to_string(),
            enabled: true,
            min_chunk_size: 100,
        }
    }
}

fn build_pool(config: &ThreadPoolConfig) -> Result<ThreadPool> {
    let mut builder = ThreadPoolBuilder::new();

    if let Some(num_threads) = config.num_threads {
        builder = builder.num_threads(num_threads);
    }

    if let Some(stack_size) = config.stack_size {
        builder = builder.stack_size(stack_size);
    }

    if !config.thread_name_prefix.is_empty() {
        let prefix = config.thread_name_prefix.clone();
        builder = builder.thread_name(move |index| format!("{}-{}", prefix, index));
    }

    builder
        .build()
        .map_err(|e| Error::Algorithm(format!("Failed to create thread pool: {}", e)))
}

/// Initialize the reconstruction thread pool with a custom configuration.
///
/// Has no effect once the pool exists.
pub fn init_thread_pool(config: ThreadPoolConfig) -> Result<()> {
    if GLOBAL_THREAD_POOL.get().is_some() {
        return Ok(());
    }

    let pool = build_pool(&config)?;
    GLOBAL_THREAD_POOL
        .set(Arc::new(pool))
        .map_err(|_| Error::Algorithm("Thread pool already initialized".to_string()))?;

    if let Ok(mut global_config) = THREAD_POOL_CONFIG.lock() {
        *global_config = Some(config);
    }
    Ok(())
}

/// The reconstruction thread pool, created with defaults if needed.
///
/// `None` if the default pool cannot be built; callers then run on the
/// current thread.
pub fn thread_pool() -> Option<Arc<ThreadPool>> {
    if let Some(pool) = GLOBAL_THREAD_POOL.get() {
        return Some(Arc::clone(pool));
    }

    match build_pool(&ThreadPoolConfig::default()) {
        Ok(pool) => Some(Arc::clone(GLOBAL_THREAD_POOL.get_or_init(|| Arc::new(pool)))),
        Err(e) => {
            warn!("{}, running sequentially", e);
            None
        }
    }
}

/// Configuration of the pool [`thread_pool`] returns
pub fn get_config() -> ThreadPoolConfig {
    THREAD_POOL_CONFIG
        .lock()
        .ok()
        .and_then(|config| config.clone())
        .unwrap_or_default()
}

/// Check if parallel processing is enabled
pub fn is_parallel_enabled() -> bool {
    get_config().enabled
}

/// Execute an operation on the reconstruction thread pool
pub fn execute_parallel<F, R>(op: F) -> R
where
    F: FnOnce() -> R + Send,
    R: Send,
{
    match thread_pool() {
        Some(pool) if is_parallel_enabled() => pool.install(op),
        _ => op(),
    }
}

/// Map `f` over `data`, in parallel for inputs of at least `min_chunk_size`
pub fn parallel_map<T, U, F>(data: &[T], f: F) -> Vec<U>
where
    T: Sync,
    U: Send,
    F: Fn(&T) -> U + Sync + Send,
{
    if !is_parallel_enabled() || data.len() < get_config().min_chunk_size {
        return data.iter().map(f).collect();
    }

    execute_parallel(|| data.par_iter().map(f).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thread_pool_config() {
        let config = ThreadPoolConfig::default()
            .with_threads(4)
            .with_stack_size(16 * 1024 * 1024)
            .with_enabled(true)
            .with_min_chunk_size(10);

        assert_eq!(config.num_threads, Some(4));
        assert_eq!(config.stack_size, Some(16 * 1024 * 1024));
        assert_eq!(config.thread_name_prefix, "gridcrate-recon");
        assert_eq!(config.min_chunk_size, 10);
        assert!(config.enabled);
    }

    #[test]
    fn test_default_pool_matches_reported_config() {
        assert_eq!(get_config(), ThreadPoolConfig::default());

        let pool = thread_pool().unwrap();
        let name = pool.install(|| std::thread::current().name().map(str::to_owned));
        assert_eq!(get_config(), ThreadPoolConfig::default());
        assert!(name.unwrap().starts_with(&get_config().thread_name_prefix));
    }

    #[test]
    fn test_parallel_map() {
        let data = vec![1, 2, 3, 4, 5];
        let result = parallel_map(&data, |x| x * 2);
        assert_eq!(result, vec![2, 4, 6, 8, 10]);
    }

    #[test]
    fn test_parallel_map_keeps_order_on_large_input() {
        let data: Vec<usize> = (0..10_000).collect();
        let result = parallel_map(&data, |x| x + 1);
        assert!(result.iter().enumerate().all(|(i, &x)| x == i + 1));
    }
}
