//! Span and event input records
//!
//! This module defines the span schema consumed by the detector. Spans arrive
//! from an upstream collaborator that has already parsed the transaction
//! event payload, so every field except the timestamps is optional: a span
//! with a missing `op` or `description` is still a valid input and simply
//! participates less in matching.
//!
//! # Design Principles
//!
//! 1. **Immutable inputs:** the detector never mutates a span, only reads
//!    fields and clones records into its window buffers
//! 2. **String identifiers:** span ids are free-form strings as delivered by
//!    the event payload, not fixed-width binary ids
//! 3. **Second-precision floats:** `start_timestamp`/`end_timestamp` are
//!    numeric seconds; duration helpers convert to milliseconds, the unit all
//!    duration thresholds use

use serde::{Deserialize, Serialize};

/// One unit of traced work inside a transaction event.
///
/// # Example
///
/// ```
/// use mnplusone::span::Span;
///
/// let span = Span {
///     span_id: Some("a".to_string()),
///     parent_span_id: Some("root".to_string()),
///     op: Some("db".to_string()),
///     description: Some("SELECT * FROM users WHERE id = %s".to_string()),
///     hash: Some("abc123".to_string()),
///     start_timestamp: 0.0,
///     end_timestamp: 0.1,
/// };
///
/// assert_eq!(span.duration_ms(), 100.0);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Span {
    /// Span identifier, unique within the event. May be absent.
    #[serde(default)]
    pub span_id: Option<String>,

    /// Identifier of the structurally enclosing span. May be absent.
    #[serde(default)]
    pub parent_span_id: Option<String>,

    /// Operation category (e.g. `"db"`, `"db.redis"`, `"http.client"`,
    /// `"default"`). Absent is treated as empty.
    #[serde(default)]
    pub op: Option<String>,

    /// Free-text description of the operation. Absent is treated as empty.
    #[serde(default)]
    pub description: Option<String>,

    /// Content hash distinguishing semantically different operations that
    /// share the same `op`. Used for db spans.
    #[serde(default)]
    pub hash: Option<String>,

    /// Start time in seconds.
    pub start_timestamp: f64,

    /// End time in seconds.
    pub end_timestamp: f64,
}

impl Span {
    /// Create a new span record.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        span_id: Option<String>,
        parent_span_id: Option<String>,
        op: Option<String>,
        description: Option<String>,
        hash: Option<String>,
        start_timestamp: f64,
        end_timestamp: f64,
    ) -> Self {
        Self {
            span_id,
            parent_span_id,
            op,
            description,
            hash,
            start_timestamp,
            end_timestamp,
        }
    }

    /// Span duration in milliseconds. Negative durations clamp to zero.
    pub fn duration_ms(&self) -> f64 {
        ((self.end_timestamp - self.start_timestamp) * 1000.0).max(0.0)
    }
}

/// Read-only transaction event context.
///
/// The detector reads two things from the event: the transaction name for
/// evidence labeling, and the full span list for resolving an ancestor id
/// back to a span record. It never parses raw payloads itself.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Event {
    /// Transaction name, used in evidence. Defaults to empty when absent.
    #[serde(default)]
    pub transaction: Option<String>,

    /// All spans of the event, in original trace order.
    #[serde(default)]
    pub spans: Vec<Span>,
}

impl Event {
    /// Build an event from a transaction name and its spans.
    pub fn new(transaction: Option<String>, spans: Vec<Span>) -> Self {
        Self { transaction, spans }
    }

    /// Transaction name, or empty string when unset.
    pub fn transaction_name(&self) -> &str {
        self.transaction.as_deref().unwrap_or("")
    }

    /// Resolve a span id to its record by scanning the event's span list.
    ///
    /// Linear scan; this runs once per emitted problem, not per visited span.
    pub fn span_by_id(&self, span_id: &str) -> Option<&Span> {
        self.spans
            .iter()
            .find(|span| span.span_id.as_deref() == Some(span_id))
    }
}

/// Total covered time of a set of spans, in milliseconds.
///
/// Overlapping spans are merged before summing, so concurrent work is not
/// double counted: two fully overlapping 100ms spans contribute 100ms, not
/// 200ms. Spans with a non-positive duration contribute nothing.
///
/// # Example
///
/// ```
/// use mnplusone::span::{total_span_time, Span};
///
/// let a = Span { start_timestamp: 0.0, end_timestamp: 0.1, ..Default::default() };
/// let b = Span { start_timestamp: 0.05, end_timestamp: 0.2, ..Default::default() };
///
/// // [0.0, 0.1] and [0.05, 0.2] merge into [0.0, 0.2] = 200ms
/// assert_eq!(total_span_time([&a, &b]), 200.0);
/// ```
pub fn total_span_time<'a>(spans: impl IntoIterator<Item = &'a Span>) -> f64 {
    let mut intervals: Vec<(f64, f64)> = spans
        .into_iter()
        .map(|span| (span.start_timestamp, span.end_timestamp))
        .filter(|(start, end)| end > start)
        .collect();

    intervals.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

    let mut total_seconds = 0.0;
    let mut current: Option<(f64, f64)> = None;

    for (start, end) in intervals {
        current = match current {
            // Overlapping or touching interval extends the current one
            Some((cur_start, cur_end)) if start <= cur_end => Some((cur_start, cur_end.max(end))),
            Some((cur_start, cur_end)) => {
                total_seconds += cur_end - cur_start;
                Some((start, end))
            }
            None => Some((start, end)),
        };
    }

    if let Some((cur_start, cur_end)) = current {
        total_seconds += cur_end - cur_start;
    }

    total_seconds * 1000.0
}
