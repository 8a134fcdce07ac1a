//! SPDX-FileCopyrightText: © 2025 Cory Parent <goedelsoup+orasi@goedelsoup.io>
//! SPDX-License-Identifier: Apache-2.0
//!

//! Metrics for the Schema Registry
//!
//! The collector keeps in-process counters and latency histograms that the
//! registry exposes as a [`MetricsSnapshot`]. With the `metrics` feature the
//! same samples are also exported through the `metrics` facade.

use crate::error::SchemaRegistryResult;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::{Duration, Instant};

#[cfg(feature = "metrics")]
use metrics::{counter, gauge, histogram};

#[cfg(not(feature = "metrics"))]
macro_rules! counter {
    ($name:expr, $value:expr $(, $label:expr => $label_value:expr)*) => {
        // No-op when metrics feature is disabled
        let _ = &$value;
    };
}

#[cfg(not(feature = "metrics"))]
macro_rules! gauge {
    ($name:expr, $value:expr $(, $label:expr => $label_value:expr)*) => {
        // No-op when metrics feature is disabled
        let _ = &$value;
    };
}

#[cfg(not(feature = "metrics"))]
macro_rules! histogram {
    ($name:expr, $value:expr $(, $label:expr => $label_value:expr)*) => {
        // No-op when metrics feature is disabled
        let _ = &$value;
    };
}

/// Upper bounds of the latency buckets in milliseconds; one more bucket
/// collects everything slower
pub const LATENCY_BUCKETS_MS: [u64; 7] = [1, 5, 10, 50, 100, 500, 1000];

const BUCKET_COUNT: usize = LATENCY_BUCKETS_MS.len() + 1;

#[derive(Debug, Default, Clone)]
struct OperationStats {
    count: u64,
    errors: u64,
    total_nanos: u64,
    max_nanos: u64,
    buckets: [u64; BUCKET_COUNT],
}

impl OperationStats {
    fn record(&mut self, elapsed: Duration, success: bool) {
        let nanos = u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX);
        self.count += 1;
        if !success {
            self.errors += 1;
        }
        self.total_nanos = self.total_nanos.saturating_add(nanos);
        self.max_nanos = self.max_nanos.max(nanos);

        let millis = elapsed.as_millis();
        let bucket = LATENCY_BUCKETS_MS
            .iter()
            .position(|bound| millis <= u128::from(*bound))
            .unwrap_or(LATENCY_BUCKETS_MS.len());
        self.buckets[bucket] += 1;
    }

    fn snapshot(&self) -> OperationSnapshot {
        let mean_ms = if self.count == 0 {
            0.0
        } else {
            self.total_nanos as f64 / self.count as f64 / 1_000_000.0
        };

        let histogram = LATENCY_BUCKETS_MS
            .iter()
            .map(|bound| format!("le_{}ms", bound))
            .chain(std::iter::once("inf".to_string()))
            .zip(self.buckets.iter().copied())
            .collect();

        OperationSnapshot {
            count: self.count,
            errors: self.errors,
            mean_ms,
            max_ms: self.max_nanos as f64 / 1_000_000.0,
            histogram,
        }
    }
}

/// Point-in-time view of one operation's samples
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationSnapshot {
    pub count: u64,
    pub errors: u64,
    pub mean_ms: f64,
    pub max_ms: f64,
    /// Bucket label to sample count, fastest first
    pub histogram: Vec<(String, u64)>,
}

/// Point-in-time view of the registry metrics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub schema_count: i64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub cache_hit_ratio: f64,
    pub operations: BTreeMap<String, OperationSnapshot>,
}

/// Metrics collector for the schema registry
pub struct MetricsCollector {
    /// Whether samples are recorded at all
    enabled: bool,

    /// Live schemas as seen by this registry
    schema_count: AtomicI64,

    cache_hits: AtomicU64,
    cache_misses: AtomicU64,

    /// Samples per operation name
    operations: DashMap<&'static str, OperationStats>,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new(true)
    }
}

impl MetricsCollector {
    /// Create a new metrics collector
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            schema_count: AtomicI64::new(0),
            cache_hits: AtomicU64::new(0),
            cache_misses: AtomicU64::new(0),
            operations: DashMap::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Run `fut`, recording its latency and outcome under `operation`
    pub async fn time<T, F>(&self, operation: &'static str, fut: F) -> SchemaRegistryResult<T>
    where
        F: Future<Output = SchemaRegistryResult<T>>,
    {
        if !self.enabled {
            return fut.await;
        }

        let started = Instant::now();
        let result = fut.await;
        self.record_operation(operation, started.elapsed(), result.is_ok());
        result
    }

    /// Record one operation sample
    pub fn record_operation(&self, operation: &'static str, elapsed: Duration, success: bool) {
        if !self.enabled {
            return;
        }

        self.operations
            .entry(operation)
            .or_default()
            .record(elapsed, success);

        counter!("schema_registry.operations", 1, "operation" => operation);
        if !success {
            counter!("schema_registry.operation_errors", 1, "operation" => operation);
        }
        histogram!(
            "schema_registry.operation_duration_ms",
            elapsed.as_secs_f64() * 1000.0,
            "operation" => operation
        );
    }

    /// Record a cache hit
    pub fn record_cache_hit(&self) {
        if self.enabled {
            self.cache_hits.fetch_add(1, Ordering::Relaxed);
            counter!("schema_registry.cache.hits", 1);
        }
    }

    /// Record a cache miss
    pub fn record_cache_miss(&self) {
        if self.enabled {
            self.cache_misses.fetch_add(1, Ordering::Relaxed);
            counter!("schema_registry.cache.misses", 1);
        }
    }

    /// Overwrite the schema count, used when it is recomputed from storage
    pub fn set_schema_count(&self, count: i64) {
        self.schema_count.store(count, Ordering::Relaxed);
        gauge!("schema_registry.schemas.total", count as f64);
    }

    pub fn increment_schema_count(&self) {
        let count = self.schema_count.fetch_add(1, Ordering::Relaxed) + 1;
        gauge!("schema_registry.schemas.total", count as f64);
    }

    pub fn decrement_schema_count(&self) {
        let count = self.schema_count.fetch_sub(1, Ordering::Relaxed) - 1;
        gauge!("schema_registry.schemas.total", count as f64);
    }

    /// Current values
    pub fn snapshot(&self) -> MetricsSnapshot {
        let cache_hits = self.cache_hits.load(Ordering::Relaxed);
        let cache_misses = self.cache_misses.load(Ordering::Relaxed);
        let lookups = cache_hits + cache_misses;

        let operations = self
            .operations
            .iter()
            .map(|entry| (entry.key().to_string(), entry.value().snapshot()))
            .collect();

        MetricsSnapshot {
            schema_count: self.schema_count.load(Ordering::Relaxed).max(0),
            cache_hits,
            cache_misses,
            cache_hit_ratio: if lookups == 0 {
                0.0
            } else {
                cache_hits as f64 / lookups as f64
            },
            operations,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SchemaRegistryError;

    #[tokio::test]
    async fn test_time_records_success_and_failure() {
        let metrics = MetricsCollector::new(true);

        let ok: SchemaRegistryResult<u32> = metrics.time("get", async { Ok(1) }).await;
        assert_eq!(ok.unwrap(), 1);
        let err: SchemaRegistryResult<u32> = metrics
            .time("get", async { Err(SchemaRegistryError::storage("down")) })
            .await;
        assert!(err.is_err());

        let snapshot = metrics.snapshot();
        let get = &snapshot.operations["get"];
        assert_eq!(get.count, 2);
        assert_eq!(get.errors, 1);
        assert_eq!(get.histogram.len(), LATENCY_BUCKETS_MS.len() + 1);
        assert_eq!(get.histogram.iter().map(|(_, n)| n).sum::<u64>(), 2);
    }

    #[test]
    fn test_latency_buckets() {
        let metrics = MetricsCollector::new(true);
        metrics.record_operation("list", Duration::from_micros(300), true);
        metrics.record_operation("list", Duration::from_millis(40), true);
        metrics.record_operation("list", Duration::from_secs(3), true);

        let list = &metrics.snapshot().operations["list"];
        assert_eq!(list.histogram[0], ("le_1ms".to_string(), 1));
        assert_eq!(list.histogram[3], ("le_50ms".to_string(), 1));
        assert_eq!(list.histogram[7], ("inf".to_string(), 1));
        assert!(list.max_ms >= 3000.0);
    }

    #[test]
    fn test_cache_ratio_and_schema_count() {
        let metrics = MetricsCollector::new(true);
        metrics.record_cache_hit();
        metrics.record_cache_hit();
        metrics.record_cache_hit();
        metrics.record_cache_miss();
        metrics.set_schema_count(4);
        metrics.increment_schema_count();
        metrics.decrement_schema_count();
        metrics.decrement_schema_count();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.cache_hits, 3);
        assert_eq!(snapshot.cache_misses, 1);
        assert!((snapshot.cache_hit_ratio - 0.75).abs() < f64::EPSILON);
        assert_eq!(snapshot.schema_count, 3);
    }

    #[tokio::test]
    async fn test_disabled_collector_records_nothing() {
        let metrics = MetricsCollector::new(false);
        let _ = metrics.time("get", async { Ok::<_, SchemaRegistryError>(()) }).await;
        metrics.record_cache_hit();

        let snapshot = metrics.snapshot();
        assert!(snapshot.operations.is_empty());
        assert_eq!(snapshot.cache_hits, 0);
    }
}
