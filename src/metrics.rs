//! Prediction counters and latency statistics for the churn service.

use crate::types::{Industry, RiskLevel};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};
use tracing::info;

/// Metrics collector shared by every request handler
pub struct ServiceMetrics {
    /// Total predictions served, across all endpoints
    pub predictions_served: AtomicU64,
    /// Batch requests handled
    pub batches_processed: AtomicU64,
    /// Customers aggregated and scored by batch requests
    pub customers_accepted: AtomicU64,
    /// Customers dropped by batch aggregation
    pub customers_rejected: AtomicU64,
    /// Predictions by risk tier
    predictions_by_risk: RwLock<HashMap<RiskLevel, u64>>,
    /// Predictions by industry
    predictions_by_industry: RwLock<HashMap<Industry, u64>>,
    /// Request latencies (in microseconds)
    latencies: RwLock<Vec<u64>>,
    start_time: Instant,
}

impl ServiceMetrics {
    pub fn new() -> Self {
        Self {
            predictions_served: AtomicU64::new(0),
            batches_processed: AtomicU64::new(0),
            customers_accepted: AtomicU64::new(0),
            customers_rejected: AtomicU64::new(0),
            predictions_by_risk: RwLock::new(HashMap::new()),
            predictions_by_industry: RwLock::new(HashMap::new()),
            latencies: RwLock::new(Vec::with_capacity(1000)),
            start_time: Instant::now(),
        }
    }

    /// Record one scored customer or feature set
    pub fn record_prediction(&self, industry: Industry, risk: RiskLevel) {
        self.predictions_served.fetch_add(1, Ordering::Relaxed);

        let mut by_risk = self
            .predictions_by_risk
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        *by_risk.entry(risk).or_insert(0) += 1;
        drop(by_risk);

        let mut by_industry = self
            .predictions_by_industry
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        *by_industry.entry(industry).or_insert(0) += 1;
    }

    /// Record the aggregation outcome of one batch request
    pub fn record_batch(&self, accepted: usize, rejected: usize) {
        self.batches_processed.fetch_add(1, Ordering::Relaxed);
        self.customers_accepted
            .fetch_add(accepted as u64, Ordering::Relaxed);
        self.customers_rejected
            .fetch_add(rejected as u64, Ordering::Relaxed);
    }

    /// Record request latency
    pub fn record_latency(&self, elapsed: Duration) {
        let mut times = self.latencies.write().unwrap_or_else(PoisonError::into_inner);
        times.push(elapsed.as_micros() as u64);
        // Keep only last 10000
        if times.len() > 10000 {
            times.drain(0..5000);
        }
    }

    pub fn latency_stats(&self) -> LatencyStats {
        let times = self.latencies.read().unwrap_or_else(PoisonError::into_inner);
        if times.is_empty() {
            return LatencyStats::default();
        }

        let mut sorted: Vec<u64> = times.clone();
        sorted.sort_unstable();

        let count = sorted.len();
        let sum: u64 = sorted.iter().sum();
        let at = |q: f64| sorted[((count as f64 * q) as usize).min(count - 1)];

        LatencyStats {
            count: count as u64,
            mean_us: sum / count as u64,
            p50_us: at(0.50),
            p95_us: at(0.95),
            p99_us: at(0.99),
            max_us: sorted[count - 1],
        }
    }

    pub fn predictions_by_risk(&self) -> HashMap<RiskLevel, u64> {
        self.predictions_by_risk
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn predictions_by_industry(&self) -> HashMap<Industry, u64> {
        self.predictions_by_industry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Point-in-time counters for the health endpoint
    pub fn snapshot(&self) -> MetricsSnapshot {
        let by_risk = self.predictions_by_risk();
        let count = |level: RiskLevel| by_risk.get(&level).copied().unwrap_or(0);

        MetricsSnapshot {
            uptime_secs: self.uptime().as_secs(),
            predictions_served: self.predictions_served.load(Ordering::Relaxed),
            batches_processed: self.batches_processed.load(Ordering::Relaxed),
            customers_accepted: self.customers_accepted.load(Ordering::Relaxed),
            customers_rejected: self.customers_rejected.load(Ordering::Relaxed),
            low_risk: count(RiskLevel::Low),
            medium_risk: count(RiskLevel::Medium),
            high_risk: count(RiskLevel::High),
        }
    }

    /// Log summary statistics
    pub fn print_summary(&self) {
        let snapshot = self.snapshot();
        let latency = self.latency_stats();

        info!(
            predictions = snapshot.predictions_served,
            batches = snapshot.batches_processed,
            accepted = snapshot.customers_accepted,
            rejected = snapshot.customers_rejected,
            low = snapshot.low_risk,
            medium = snapshot.medium_risk,
            high = snapshot.high_risk,
            "Prediction summary"
        );
        if latency.count > 0 {
            info!(
                requests = latency.count,
                mean_us = latency.mean_us,
                p50_us = latency.p50_us,
                p95_us = latency.p95_us,
                p99_us = latency.p99_us,
                max_us = latency.max_us,
                "Request latency"
            );
        }
        for (industry, count) in self.predictions_by_industry() {
            info!(industry = %industry, predictions = count, "Predictions by industry");
        }
    }
}

impl Default for ServiceMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Request latency statistics
#[derive(Debug, Default, Clone, Serialize)]
pub struct LatencyStats {
    pub count: u64,
    pub mean_us: u64,
    pub p50_us: u64,
    pub p95_us: u64,
    pub p99_us: u64,
    pub max_us: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub uptime_secs: u64,
    pub predictions_served: u64,
    pub batches_processed: u64,
    pub customers_accepted: u64,
    pub customers_rejected: u64,
    pub low_risk: u64,
    pub medium_risk: u64,
    pub high_risk: u64,
}

/// Periodic summary logger
pub struct MetricsReporter {
    metrics: Arc<ServiceMetrics>,
    interval_secs: u64,
}

impl MetricsReporter {
    pub fn new(metrics: Arc<ServiceMetrics>, interval_secs: u64) -> Self {
        Self {
            metrics,
            interval_secs,
        }
    }

    /// Start the periodic reporting task
    pub async fn start(self) {
        let mut interval = tokio::time::interval(Duration::from_secs(self.interval_secs.max(1)));
        // First tick completes immediately
        interval.tick().await;
        loop {
            interval.tick().await;
            self.metrics.print_summary();
        }
    }
}
