//! Hybrid connection monitoring.
//!
//! Pool events update a per-account cache immediately. Two periodic sweeps
//! back that up: the health sweep reconciles the cache with the registry and
//! catches failures no event reported, the performance sweep aggregates
//! latency and traffic counters.
//!
//! ```text
//! PoolRegistry ──PoolEvent──▶ listener ──▶ ConnectionCache ──MonitorEvent──▶ subscribers
//!       ▲                                        ▲
//!       └──── health sweep (default 5 min) ──────┘
//!             performance sweep (default 30 s)
//! ```

mod cache;
mod events;
mod report;


use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::Utc;
use parking_lot::RwLock;
use tracing::{debug, info, warn};
use warmpool_types::{ConnectionState, HealthCheckReport, MonitorConfig, PerformanceSnapshot};

use crate::events::{EventBus, EventReceiver};
use crate::pool::PoolEvent;
use crate::registry::PoolRegistry;
use crate::timers::TimerRegistry;

use cache::ConnectionCache;

pub use events::MonitorEvent;
pub use report::MonitoringReport;

const LISTENER: &str = "pool-event-listener";
const HEALTH_SWEEP: &str = "health-sweep";
const PERFORMANCE_SWEEP: &str = "performance-sweep";

pub struct HybridMonitor {
    registry: Arc<PoolRegistry>,
    config: MonitorConfig,
    cache: ConnectionCache,
    events: EventBus<MonitorEvent>,
    timers: TimerRegistry,
    running: AtomicBool,
    /// Registry generation the cache was built against
    seen_generation: AtomicU64,
    last_health_check: RwLock<Option<HealthCheckReport>>,
    last_performance: RwLock<Option<PerformanceSnapshot>>,
}

impl HybridMonitor {
    pub fn new(registry: Arc<PoolRegistry>, config: MonitorConfig) -> Arc<Self> {
        let events = EventBus::with_capacity(config.event_capacity);
        let seen_generation = AtomicU64::new(registry.generation());
        Arc::new(Self {
            registry,
            config,
            cache: ConnectionCache::default(),
            events,
            timers: TimerRegistry::new(),
            running: AtomicBool::new(false),
            seen_generation,
            last_health_check: RwLock::new(None),
            last_performance: RwLock::new(None),
        })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Attach to the registry's pool events and start both sweeps.
    ///
    /// Returns false if already running.
    pub fn start(self: &Arc<Self>) -> bool {
        if self.running.swap(true, Ordering::SeqCst) {
            debug!("Monitor already running");
            return false;
        }

        // Subscribe before seeding so nothing falls between the two.
        let receiver = self.registry.subscribe();
        self.observe_reset();
        self.seed_from_registry();

        self.timers.spawn_task(LISTENER, listen(Arc::downgrade(self), receiver));

        let weak = Arc::downgrade(self);
        self.timers.spawn_interval(HEALTH_SWEEP, self.config.health_check_interval(), move || {
            let weak = weak.clone();
            async move {
                if let Some(monitor) = weak.upgrade() {
                    monitor.run_health_check();
                }
            }
        });

        let weak = Arc::downgrade(self);
        self.timers.spawn_interval(PERFORMANCE_SWEEP, self.config.performance_interval(), move || {
            let weak = weak.clone();
            async move {
                if let Some(monitor) = weak.upgrade() {
                    monitor.run_performance_sweep();
                }
            }
        });

        info!(
            health_interval_secs = self.config.health_check_interval_secs,
            performance_interval_secs = self.config.performance_interval_secs,
            accounts = self.cache.len(),
            "Hybrid monitor started"
        );
        true
    }

    /// Cancel both sweeps and detach from pool events. Safe when not running.
    pub fn stop(&self) -> bool {
        if !self.running.swap(false, Ordering::SeqCst) {
            return false;
        }
        let cancelled = self.timers.cancel_all();
        info!(cancelled_timers = cancelled, "Hybrid monitor stopped");
        true
    }

    pub fn active_timers(&self) -> Vec<String> {
        self.timers.active()
    }

    pub fn subscribe(&self) -> EventReceiver<MonitorEvent> {
        self.events.subscribe()
    }

    /// Fold a pool event into the cache and re-emit the coarse events.
    pub fn handle_pool_event(&self, event: &PoolEvent) {
        for emitted in self.cache.apply(event, self.config.critical_error_threshold) {
            match &emitted {
                MonitorEvent::ConnectionCritical { account_id, consecutive_errors, last_error } => {
                    warn!(
                        account_id = %account_id,
                        consecutive_errors,
                        last_error = ?last_error,
                        "Connection critical: consecutive error threshold reached"
                    );
                },
                MonitorEvent::ConnectionLost { account_id, role } => {
                    debug!(account_id = %account_id, role = %role, "Connection lost");
                },
                MonitorEvent::ConnectionRecovered { account_id, role } => {
                    info!(account_id = %account_id, role = %role, "Connection recovered");
                },
                _ => {},
            }
            self.events.emit(emitted);
        }
    }

    /// Read-only sweep over every pool. Reconciles the cache and raises
    /// `health:degraded` when too many pools have no healthy slot.
    pub fn run_health_check(&self) -> HealthCheckReport {
        self.observe_reset();
        let report = self.registry.perform_health_check();

        let threshold = self.config.critical_error_threshold;
        for status in self.registry.get_all_status().pools {
            if let Some(drift) = self.cache.reconcile(&status, threshold) {
                debug!(account_id = %status.account_id, "Health sweep corrected cached state");
                self.events.emit(drift);
            }
        }

        let unhealthy_ratio = report.unhealthy_ratio();
        if unhealthy_ratio > self.config.degraded_ratio {
            warn!(
                unhealthy = report.unhealthy,
                total = report.total,
                unhealthy_ratio,
                threshold = self.config.degraded_ratio,
                "Pool health degraded"
            );
            self.events.emit(MonitorEvent::HealthDegraded { unhealthy_ratio, report: report.clone() });
        } else {
            info!(healthy = report.healthy, total = report.total, "Health sweep complete");
        }

        *self.last_health_check.write() = Some(report.clone());
        report
    }

    /// Aggregate latency, connection counts and traffic across pools.
    pub fn run_performance_sweep(&self) -> PerformanceSnapshot {
        let pools = self.registry.pools();
        let stats = self.registry.stats();

        let latencies: Vec<Duration> = pools.iter().filter_map(|p| p.avg_latency()).collect();
        let avg_latency_ms = (!latencies.is_empty()).then(|| {
            let total: Duration = latencies.iter().sum();
            (total / latencies.len() as u32).as_secs_f64() * 1000.0
        });

        let snapshot = PerformanceSnapshot {
            total_pools: pools.len(),
            total_connections: pools.iter().map(|p| p.total_slots()).sum(),
            healthy_connections: pools.iter().map(|p| p.healthy_slots()).sum(),
            avg_latency_ms,
            total_requests: stats.total_requests,
            total_errors: stats.total_errors,
            total_failovers: stats.total_failovers,
            taken_at: Utc::now(),
        };
        debug!(
            pools = snapshot.total_pools,
            healthy_connections = snapshot.healthy_connections,
            avg_latency_ms = ?snapshot.avg_latency_ms,
            "Performance sweep complete"
        );

        *self.last_performance.write() = Some(snapshot.clone());
        snapshot
    }

    pub fn get_connection_state(&self, account_id: &str) -> Option<ConnectionState> {
        self.cache.get(account_id)
    }

    pub fn get_monitoring_report(&self) -> MonitoringReport {
        self.observe_reset();
        let connections = self.cache.snapshot();
        MonitoringReport {
            is_running: self.is_running(),
            config: self.config.clone(),
            summary: report::summarize(&connections),
            connections,
            last_health_check: self.last_health_check.read().clone(),
            performance: self.last_performance.read().clone(),
            active_timers: self.timers.active(),
            generated_at: Utc::now(),
        }
    }

    /// Drop every cached entry. The next event or sweep rebuilds them.
    pub fn clear_cache(&self) {
        self.cache.clear();
        debug!("Monitor cache cleared");
    }

    /// Drop the cache if the registry was reset since it was built.
    fn observe_reset(&self) {
        let current = self.registry.generation();
        if self.seen_generation.swap(current, Ordering::SeqCst) == current {
            return;
        }
        let dropped = self.cache.len();
        self.cache.clear();
        info!(dropped, generation = current, "Registry was reset, monitor cache cleared");
    }

    fn seed_from_registry(&self) {
        let threshold = self.config.critical_error_threshold;
        for status in self.registry.get_all_status().pools {
            self.cache.reconcile(&status, threshold);
        }
    }
}

async fn listen(monitor: Weak<HybridMonitor>, mut receiver: EventReceiver<PoolEvent>) {
    while let Some(event) = receiver.recv().await {
        let Some(monitor) = monitor.upgrade() else {
            break;
        };
        monitor.handle_pool_event(&event);
    }
    debug!("Pool event listener finished");
}
