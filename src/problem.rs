//! Performance problem records and fingerprinting
//!
//! A [`PerformanceProblem`] is the detector's only output: a value object
//! created once inside the state machine and never mutated. The fingerprint
//! must be stable across events so the downstream issue platform can group
//! repeated occurrences of the same pattern; it hashes the triple of the
//! common ancestor's op and hash plus the representative db span's hash with
//! SHA-1. The digest is for stability and collision avoidance, not security.

use crate::evidence::{EvidenceData, IssueEvidence};
use serde::Serialize;
use sha1::{Digest, Sha1};

/// Problem category tag, mirroring the issue platform's group taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ProblemType {
    /// Repeating MN+1 database query pattern.
    MnPlusOneDbQueries,
}

impl ProblemType {
    /// Numeric group type id used in fingerprints and occurrence payloads.
    pub fn type_id(&self) -> u32 {
        match self {
            ProblemType::MnPlusOneDbQueries => 1011,
        }
    }

    pub fn slug(&self) -> &'static str {
        match self {
            ProblemType::MnPlusOneDbQueries => "performance_m_n_plus_one_db_queries",
        }
    }
}

/// Deterministic fingerprint for a detected pattern.
///
/// Format: `1-<type_id>-<sha1 hex of parent_op + parent_hash + db_hash>`.
/// Two events producing the same triple yield the same fingerprint; changing
/// any component changes it.
///
/// # Example
///
/// ```
/// use mnplusone::problem::{problem_fingerprint, ProblemType};
///
/// let fp = problem_fingerprint(ProblemType::MnPlusOneDbQueries, "http.server", "p1", "q1");
/// assert!(fp.starts_with("1-1011-"));
/// assert_eq!(fp, problem_fingerprint(ProblemType::MnPlusOneDbQueries, "http.server", "p1", "q1"));
/// ```
pub fn problem_fingerprint(
    problem_type: ProblemType,
    parent_op: &str,
    parent_hash: &str,
    db_hash: &str,
) -> String {
    let mut hasher = Sha1::new();
    hasher.update(parent_op.as_bytes());
    hasher.update(parent_hash.as_bytes());
    hasher.update(db_hash.as_bytes());
    format!(
        "1-{}-{}",
        problem_type.type_id(),
        hex::encode(hasher.finalize())
    )
}

/// A confirmed performance problem, ready for the host's collection callback.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceProblem {
    /// Stable grouping fingerprint.
    pub fingerprint: String,

    /// Offending operation category. Always `"db"` for this detector.
    pub op: String,

    /// Description of the representative db span.
    pub description: String,

    pub problem_type: ProblemType,

    /// The common ancestor of all offender spans (singleton list).
    pub parent_span_ids: Vec<String>,

    /// db-op spans among the offenders, in trace order.
    pub cause_span_ids: Vec<String>,

    /// Every span in the confirmed repeating region, in trace order.
    pub offender_span_ids: Vec<String>,

    pub evidence_data: EvidenceData,

    pub evidence_display: Vec<IssueEvidence>,
}
