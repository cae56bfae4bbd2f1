//! Human-readable evidence rendering for emitted problems
//!
//! Evidence travels with every problem so downstream grouping and
//! notification layers can describe the pattern without re-reading the event.

use crate::span::Span;
use serde::Serialize;

/// Placeholder when a span offers nothing renderable.
const NO_VALUE: &str = "no value";

/// Render a span as an evidence string.
///
/// Uses `"op - description"` when both are present, falls back to whichever
/// one exists, and `"no value"` when neither does. With `include_op` false
/// the op prefix is dropped, which is the compact form used for pattern
/// listings and for filtering out uninformative connection spans.
pub fn span_evidence_value(span: Option<&Span>, include_op: bool) -> String {
    let Some(span) = span else {
        return NO_VALUE.to_string();
    };

    let op = span.op.as_deref().filter(|value| !value.is_empty());
    let description = span
        .description
        .as_deref()
        .filter(|value| !value.is_empty());

    match (op, description) {
        (None, None) => NO_VALUE.to_string(),
        (None, Some(description)) => description.to_string(),
        (Some(op), None) => op.to_string(),
        (Some(op), Some(description)) => {
            if include_op {
                format!("{} - {}", op, description)
            } else {
                description.to_string()
            }
        }
    }
}

/// Body text for the "Offending Spans" notification entry.
pub fn notification_attachment_body(op: Option<&str>, description: Option<&str>) -> String {
    let op = op.filter(|value| !value.is_empty());
    let description = description.filter(|value| !value.is_empty());

    match (op, description) {
        (Some(op), Some(description)) => format!("{} - {}", op, description),
        (None, Some(description)) => description.to_string(),
        (Some(op), None) => op.to_string(),
        (None, None) => String::new(),
    }
}

/// Structured evidence payload attached to a problem.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvidenceData {
    pub op: String,
    pub parent_span_ids: Vec<String>,
    pub cause_span_ids: Vec<String>,
    pub offender_span_ids: Vec<String>,
    /// Transaction name of the event, empty when unset.
    pub transaction_name: String,
    /// Rendering of the common ancestor span.
    pub parent_span: String,
    /// Rendering of each span in the reference pattern.
    pub pattern_spans: Vec<String>,
    /// Same as `pattern_spans` but without the op prefix.
    pub pattern_spans_compact: Vec<String>,
    pub num_offender_spans: usize,
    pub pattern_size: usize,
    pub num_pattern_repetitions: usize,
}

/// One display entry for notification surfaces.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IssueEvidence {
    pub name: String,
    pub value: String,
    /// Important entries are surfaced prominently in UI.
    pub important: bool,
}
