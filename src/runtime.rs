use log::{info, warn};
use rayon::{ThreadPool, ThreadPoolBuildError, ThreadPoolBuilder};
use std::sync::Once;

struct ThreadConfig {
    count: usize,
    source: String,
}

const ENV_HINTS: [&str; 6] = [
    "PLACEAGG_THREADS",
    "RAYON_NUM_THREADS",
    "SLURM_CPUS_PER_TASK",
    "SLURM_CPUS_ON_NODE",
    "PBS_NP",
    "OMP_NUM_THREADS",
];

fn parse_env_threads(keys: &[&str]) -> Option<ThreadConfig> {
    for &key in keys {
        if let Ok(v) = std::env::var(key) {
            if let Ok(val) = v.trim().parse::<usize>() {
                if val > 0 {
                    return Some(ThreadConfig {
                        count: val,
                        source: key.to_string(),
                    });
                }
            }
        }
    }
    None
}

fn detect_thread_config(requested: Option<usize>) -> ThreadConfig {
    if let Some(count) = requested.filter(|&n| n > 0) {
        return ThreadConfig {
            count,
            source: "--threads".to_string(),
        };
    }
    if let Some(cfg) = parse_env_threads(&ENV_HINTS) {
        return cfg;
    }

    ThreadConfig {
        count: available_threads(),
        source: "available_parallelism".to_string(),
    }
}

/// Hardware parallelism, at least 1.
pub fn available_threads() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .max(1)
}

/// Sizes the global rayon pool once per process.
///
/// An explicit `requested` count wins over the environment hints.
pub fn configure_thread_pool(requested: Option<usize>) {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let cfg = detect_thread_config(requested);
        match ThreadPoolBuilder::new()
            .num_threads(cfg.count)
            .thread_name(|i| format!("placeagg-worker-{i}"))
            .build_global()
        {
            Ok(_) => {
                info!("[threads] rayon pool = {} threads (hint: {})", cfg.count, cfg.source);
            }
            Err(err) => {
                warn!("[threads] failed to configure rayon pool ({err}); continuing with default");
            }
        }
    });
}

/// Dedicated pool with exactly `threads` workers (0 means hardware parallelism).
pub fn build_pool(threads: usize) -> Result<ThreadPool, ThreadPoolBuildError> {
    let count = if threads == 0 { available_threads() } else { threads };
    ThreadPoolBuilder::new()
        .num_threads(count)
        .thread_name(|i| format!("placeagg-pool-{i}"))
        .build()
}
