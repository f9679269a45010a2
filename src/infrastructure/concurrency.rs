//! Worker pool for per-entity rendering.
//! Defaults to half the cores so the rasterizer processes have room.

use anyhow::{Context, Result};
use tracing::info;

/// Worker count for `jobs`, or half the cores (minimum 1) when unset.
pub fn worker_count(jobs: Option<usize>) -> usize {
    match jobs {
        Some(n) => n.max(1),
        None => std::cmp::max(1, num_cpus::get() / 2),
    }
}

/// Build a local rayon pool for batch rendering.
pub fn build_render_pool(jobs: Option<usize>) -> Result<rayon::ThreadPool> {
    let workers = worker_count(jobs);
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .thread_name(|i| format!("callflow-render-{}", i))
        .build()
        .context("Failed to build render thread pool")?;

    info!(workers, cores = num_cpus::get(), "initialized render pool");
    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_count() {
        assert_eq!(worker_count(Some(3)), 3);
        assert_eq!(worker_count(Some(0)), 1);
        assert!(worker_count(None) >= 1);
    }

    #[test]
    fn test_build_render_pool() {
        let pool = build_render_pool(Some(2)).unwrap();
        assert_eq!(pool.current_num_threads(), 2);
    }
}
