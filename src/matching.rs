//! Span equivalence and pattern validity predicates
//!
//! Two spans are "equivalent" when they would fill the same slot in a
//! repeating pattern. The rules depend on the operation category:
//!
//! - `"default"` op spans match on description, since auto-instrumented
//!   spans in that bucket carry no useful hash
//! - `db*` op spans match on content hash, which survives parameter
//!   differences between otherwise identical queries
//! - every other category (http, resource, ...) matches on op alone
//!
//! `is_valid_pattern` then guards against two degenerate candidates: a run of
//! identical spans (no MN+1 shape, just an N+1) and a run with no database
//! work worth reporting.

use crate::span::Span;

/// First-span descriptions that must not anchor a pattern. These
/// serialization boundary spans appear at the edge of every ORM call batch
/// and produce false pattern starts.
const PATTERN_BOUNDARY_DESCRIPTIONS: [&str; 2] =
    ["prisma:client:serialize", "prisma:engine:serialize"];

/// Decide whether two spans occupy the same slot of a repeating pattern.
///
/// Symmetric and total: any two spans can be compared, and missing fields
/// degrade to "no match" rather than erroring. Structural position and span
/// ids are never inspected.
pub fn equivalent(a: &Span, b: &Span) -> bool {
    let op_a = a.op.as_deref().unwrap_or("");
    let op_b = b.op.as_deref().unwrap_or("");

    if op_a.is_empty() || op_b.is_empty() || op_a != op_b {
        return false;
    }

    if op_a == "default" {
        a.description.as_deref().unwrap_or("") == b.description.as_deref().unwrap_or("")
    } else if op_a.starts_with("db") {
        a.hash == b.hash
    } else {
        // Same non-db, non-default op is enough (http.client, resource.*, ...)
        true
    }
}

/// True if the span has a db op at all. Used when partitioning offenders
/// into cause spans and when computing the db time percentage.
pub fn is_db_op(span: &Span) -> bool {
    span.op.as_deref().unwrap_or("").starts_with("db")
}

/// True if the span carries a database query complete enough to serve as
/// problem evidence: a db op that is not a redis call, with a non-empty
/// description that was not truncated by the SDK (truncation leaves a
/// trailing `"..."`).
pub fn has_complete_db_query(span: &Span) -> bool {
    let op = span.op.as_deref().unwrap_or("");
    let description = span.description.as_deref().unwrap_or("");

    op.starts_with("db")
        && !op.starts_with("db.redis")
        && !description.is_empty()
        && !description.ends_with("...")
}

/// Decide whether a candidate slice of the lookback window is a pattern
/// worth confirming.
///
/// Requires both a reportable db span and at least one span not equivalent
/// to the pattern's first span, and rejects candidates anchored on a
/// serialization boundary span. Returns early as soon as both requirements
/// are met.
pub fn is_valid_pattern(pattern: &[Span]) -> bool {
    let Some(first) = pattern.first() else {
        return false;
    };

    if PATTERN_BOUNDARY_DESCRIPTIONS.contains(&first.description.as_deref().unwrap_or("")) {
        return false;
    }

    let mut found_db_op = false;
    let mut found_different_span = false;

    for span in pattern {
        found_db_op = found_db_op || has_complete_db_query(span);
        found_different_span = found_different_span || !equivalent(first, span);
        if found_db_op && found_different_span {
            return true;
        }
    }

    false
}
