//! Rejection counters for operational visibility
//!
//! Threshold rejections are expected, frequent outcomes rather than errors,
//! so they never raise; instead each rejection path fires a counter through a
//! [`MetricsSink`]. The sink is fire and forget: the detector never reads a
//! value back. Hosts plug in their own backend; [`CounterMetrics`] is an
//! in-process implementation suitable for tests and dashboards.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Why a candidate region was dropped after its pattern had been confirmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionReason {
    /// Cumulative offender duration under `total_duration_threshold`.
    BelowDurationThreshold,
    /// db share of offender time under `min_percentage_of_db_spans`.
    BelowDbSpanPercentage,
    /// No common ancestor within `max_allowable_depth`, or the ancestor id
    /// did not resolve to a span in the event.
    NoCommonParentSpan,
    /// No accumulated span carried a usable db query for evidence.
    NoQualifyingDbSpan,
}

impl RejectionReason {
    /// Stable counter key for metrics backends.
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectionReason::BelowDurationThreshold => "below_duration_threshold",
            RejectionReason::BelowDbSpanPercentage => "below_db_span_percentage",
            RejectionReason::NoCommonParentSpan => "no_parent_span",
            RejectionReason::NoQualifyingDbSpan => "no_db_span",
        }
    }
}

/// Fire-and-forget counter sink.
pub trait MetricsSink {
    /// Record one rejection. Must not block or fail.
    fn incr(&self, reason: RejectionReason);
}

/// Sink that drops every counter. The default when a host does not care.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn incr(&self, _reason: RejectionReason) {}
}

/// In-process atomic counters, one per rejection reason.
#[derive(Debug, Default)]
pub struct CounterMetrics {
    below_duration_threshold: AtomicU64,
    below_db_span_percentage: AtomicU64,
    no_parent_span: AtomicU64,
    no_db_span: AtomicU64,
}

/// Point-in-time copy of all counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct MetricsSnapshot {
    pub below_duration_threshold: u64,
    pub below_db_span_percentage: u64,
    pub no_parent_span: u64,
    pub no_db_span: u64,
}

impl CounterMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy out all counter values.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            below_duration_threshold: self.below_duration_threshold.load(Ordering::Relaxed),
            below_db_span_percentage: self.below_db_span_percentage.load(Ordering::Relaxed),
            no_parent_span: self.no_parent_span.load(Ordering::Relaxed),
            no_db_span: self.no_db_span.load(Ordering::Relaxed),
        }
    }
}

impl MetricsSink for CounterMetrics {
    fn incr(&self, reason: RejectionReason) {
        let counter = match reason {
            RejectionReason::BelowDurationThreshold => &self.below_duration_threshold,
            RejectionReason::BelowDbSpanPercentage => &self.below_db_span_percentage,
            RejectionReason::NoCommonParentSpan => &self.no_parent_span,
            RejectionReason::NoQualifyingDbSpan => &self.no_db_span,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}
