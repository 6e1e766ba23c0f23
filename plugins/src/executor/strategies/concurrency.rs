use std::sync::Mutex;
use std::time::{Duration, Instant};

use flowpilot_core::api::{ConcurrencyConfig, ConcurrencyContext, ConcurrencyStrategyPlugin};

const REFRESH_INTERVAL: Duration = Duration::from_secs(1);

/// Host load as seen by the adaptive strategy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HostLoad {
    pub cpu_count: usize,
    /// Average over all cores, 0..=100.
    pub cpu_usage: f32,
}

/// Cached `sysinfo` reader; refreshes at most once per second.
struct LoadSampler {
    sys: sysinfo::System,
    last_refresh: Instant,
    cached: HostLoad,
}

impl LoadSampler {
    fn new() -> Self {
        let mut sys = sysinfo::System::new();
        sys.refresh_cpu();
        let cached = Self::read(&sys);
        Self {
            sys,
            last_refresh: Instant::now(),
            cached,
        }
    }

    fn read(sys: &sysinfo::System) -> HostLoad {
        let cpu_count = sys.cpus().len().max(1);
        let cpu_usage = sys.cpus().iter().map(|c| c.cpu_usage()).sum::<f32>() / cpu_count as f32;
        HostLoad {
            cpu_count,
            cpu_usage,
        }
    }

    fn get(&mut self) -> HostLoad {
        if self.last_refresh.elapsed() > REFRESH_INTERVAL {
            self.sys.refresh_cpu();
            self.cached = Self::read(&self.sys);
            self.last_refresh = Instant::now();
        }
        self.cached
    }
}

/// Scales the dispatch limit with CPU load: halves it above the high threshold,
/// doubles it below the low one.
pub struct AdaptiveConcurrencyPlugin {
    config: ConcurrencyConfig,
    sampler: Mutex<LoadSampler>,
}

impl AdaptiveConcurrencyPlugin {
    pub fn new(config: ConcurrencyConfig) -> Self {
        Self {
            config,
            sampler: Mutex::new(LoadSampler::new()),
        }
    }

    pub fn limit_for(&self, load: HostLoad, base: usize) -> usize {
        let cfg = &self.config;
        let min = cfg.min_concurrency.max(1);
        let max = cfg.max_concurrency.max(min);
        let mut desired = cfg.base_concurrency.clamp(min, max);

        if load.cpu_usage >= cfg.cpu_threshold_high {
            desired = (desired / 2).max(min);
        } else if load.cpu_usage <= cfg.cpu_threshold_low {
            desired = desired.saturating_mul(2).min(max);
        }

        desired.min(base.max(1)).min(load.cpu_count.max(1) * 4)
    }
}

impl ConcurrencyStrategyPlugin for AdaptiveConcurrencyPlugin {
    fn name(&self) -> &str {
        "adaptive"
    }

    fn calculate_concurrency(&self, context: &ConcurrencyContext) -> usize {
        let load = match self.sampler.lock() {
            Ok(mut sampler) => sampler.get(),
            Err(poisoned) => poisoned.into_inner().get(),
        };
        let limit = self.limit_for(load, context.base_concurrency);
        tracing::trace!(
            target: "flowpilot.concurrency",
            flow_id = %context.flow_id,
            cpu_usage = load.cpu_usage,
            active = context.active_tasks,
            ready = context.ready_tasks,
            limit
        );
        limit
    }
}

pub struct FixedConcurrencyPlugin {
    fixed: usize,
}

impl FixedConcurrencyPlugin {
    pub fn new(fixed: usize) -> Self {
        Self { fixed }
    }
}

impl ConcurrencyStrategyPlugin for FixedConcurrencyPlugin {
    fn name(&self) -> &str {
        "fixed"
    }

    fn calculate_concurrency(&self, _context: &ConcurrencyContext) -> usize {
        self.fixed.max(1)
    }
}
