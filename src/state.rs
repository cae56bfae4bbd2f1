//! Detection state machine
//!
//! The detector moves between two phases while streaming spans:
//!
//! - **Searching** keeps a bounded lookback window of recent spans. When an
//!   incoming span is equivalent to a buffered one, the slice from that
//!   buffered span to the end of the window becomes a candidate pattern; a
//!   valid candidate confirms the pattern and switches to Continuing.
//! - **Continuing** matches each incoming span against the next slot of the
//!   confirmed pattern, wrapping around at the end. The first mismatch breaks
//!   the pattern: the accumulated region is evaluated for problem emission
//!   and detection drops back to Searching, seeded with the trailing spans so
//!   no context is lost at the boundary.
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │ Searching                                                      │
//! │   window: [http, db(h1), http, db(h2)]   incoming: db(h1)      │
//! │                  └────── candidate ──┘                         │
//! │   candidate valid → Continuing(pattern=[db(h1), http, db(h2)]) │
//! └───────────────────────────────────────────────────────────────┘
//!                          │ mismatch after k repeats
//!                          ▼
//! ┌───────────────────────────────────────────────────────────────┐
//! │ maybe_performance_problem()                                    │
//! │   repetitions → duration → db share → ancestor → evidence      │
//! │   any gate fails: counter, no emission                         │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! Exactly one state value is live at a time. The parent-pointer map moves
//! into each successor state on transition, which keeps ancestor lookups
//! available for spans seen arbitrarily long ago without sharing mutable
//! state.

use crate::ancestor::find_common_parent_span;
use crate::evidence::{
    notification_attachment_body, span_evidence_value, EvidenceData, IssueEvidence,
};
use crate::matching::{equivalent, is_db_op, is_valid_pattern};
use crate::metrics::{MetricsSink, RejectionReason};
use crate::problem::{problem_fingerprint, PerformanceProblem, ProblemType};
use crate::settings::DetectorSettings;
use crate::span::{total_span_time, Event, Span};
use std::collections::{HashMap, VecDeque};
use tracing::debug;

/// Read-only collaborators threaded through every transition.
pub struct DetectionContext<'a> {
    pub settings: &'a DetectorSettings,
    pub event: &'a Event,
    pub metrics: &'a dyn MetricsSink,
}

/// Current phase of one detection run.
pub enum State {
    Searching(Searching),
    Continuing(Continuing),
}

impl State {
    /// Initial state: empty window, empty parent map.
    pub fn new() -> Self {
        State::Searching(Searching {
            recent_spans: VecDeque::new(),
            parent_map: HashMap::new(),
        })
    }

    /// Feed one span. Consumes the state and returns its successor plus a
    /// problem when a broken pattern cleared every emission gate.
    pub fn next(self, span: &Span, ctx: &DetectionContext) -> (State, Option<PerformanceProblem>) {
        match self {
            State::Searching(searching) => searching.next(span, ctx),
            State::Continuing(continuing) => continuing.next(span, ctx),
        }
    }

    /// Final transition after the last span. Only a Continuing state can
    /// still hold an unreported region.
    pub fn finish(&self, ctx: &DetectionContext) -> Option<PerformanceProblem> {
        match self {
            State::Searching(_) => None,
            State::Continuing(continuing) => continuing.maybe_performance_problem(ctx),
        }
    }
}

impl Default for State {
    fn default() -> Self {
        Self::new()
    }
}

fn record_parent(parent_map: &mut HashMap<String, String>, span: &Span) {
    if let (Some(span_id), Some(parent_span_id)) = (&span.span_id, &span.parent_span_id) {
        // Write-once: each span id is visited exactly once per run
        parent_map
            .entry(span_id.clone())
            .or_insert_with(|| parent_span_id.clone());
    }
}

/// Lookback phase: no pattern confirmed yet.
pub struct Searching {
    recent_spans: VecDeque<Span>,
    parent_map: HashMap<String, String>,
}

impl Searching {
    /// Rebuild a Searching state from carried-over context after a pattern
    /// break. Spans beyond the window capacity are evicted oldest-first.
    fn seeded(spans: VecDeque<Span>, parent_map: HashMap<String, String>, capacity: usize) -> Self {
        let mut recent_spans = spans;
        while recent_spans.len() > capacity {
            recent_spans.pop_front();
        }
        Self {
            recent_spans,
            parent_map,
        }
    }

    fn next(mut self, span: &Span, ctx: &DetectionContext) -> (State, Option<PerformanceProblem>) {
        record_parent(&mut self.parent_map, span);

        // A pattern needs at least two prior spans to be detectable
        if self.recent_spans.len() >= 2 {
            let mut confirmed: Option<Vec<Span>> = None;
            let buffered = self.recent_spans.make_contiguous();
            // The newest buffered span is excluded: a match there is a plain
            // N+1, not an MN+1. Oldest-first scan prefers the longest
            // candidate.
            for start in 0..buffered.len() - 1 {
                if equivalent(&buffered[start], span) {
                    let candidate = &buffered[start..];
                    if is_valid_pattern(candidate) {
                        confirmed = Some(candidate.to_vec());
                        break;
                    }
                }
            }

            if let Some(pattern) = confirmed {
                debug!(pattern_size = pattern.len(), "pattern confirmed");
                return (
                    State::Continuing(Continuing::begin(pattern, span.clone(), self.parent_map)),
                    None,
                );
            }
        }

        self.push_span(span, ctx.settings.max_sequence_length);
        (State::Searching(self), None)
    }

    fn push_span(&mut self, span: &Span, capacity: usize) {
        while self.recent_spans.len() >= capacity {
            self.recent_spans.pop_front();
        }
        self.recent_spans.push_back(span.clone());
    }
}

/// Confirmation phase: a pattern is repeating.
pub struct Continuing {
    /// Fixed reference sequence the stream is matched against.
    pattern: Vec<Span>,
    /// Pattern plus every matched repeat so far, in arrival order.
    spans: Vec<Span>,
    /// Next pattern slot to match, wrapping at `pattern.len()`.
    pattern_index: usize,
    parent_map: HashMap<String, String>,
}

impl Continuing {
    /// Enter the confirmation phase. `first_repeat` already matched slot 0,
    /// so matching resumes at slot 1.
    fn begin(pattern: Vec<Span>, first_repeat: Span, parent_map: HashMap<String, String>) -> Self {
        let mut spans = pattern.clone();
        spans.push(first_repeat);
        Self {
            pattern,
            spans,
            pattern_index: 1,
            parent_map,
        }
    }

    fn next(mut self, span: &Span, ctx: &DetectionContext) -> (State, Option<PerformanceProblem>) {
        record_parent(&mut self.parent_map, span);

        if equivalent(&self.pattern[self.pattern_index], span) {
            self.spans.push(span.clone());
            self.pattern_index = (self.pattern_index + 1) % self.pattern.len();
            return (State::Continuing(self), None);
        }

        // Pattern broken: evaluate what accumulated, then resume searching
        // with the trailing context so a pattern starting near the break is
        // still detectable.
        debug!(
            accumulated = self.spans.len(),
            pattern_size = self.pattern.len(),
            "pattern broken"
        );
        let problem = self.maybe_performance_problem(ctx);

        let tail_start = self.spans.len().saturating_sub(self.pattern.len());
        let mut seed: VecDeque<Span> = self.spans[tail_start..].iter().cloned().collect();
        seed.push_back(span.clone());

        (
            State::Searching(Searching::seeded(
                seed,
                self.parent_map,
                ctx.settings.max_sequence_length,
            )),
            problem,
        )
    }

    /// Evaluate the accumulated region against every emission gate.
    ///
    /// Gate order: repetition count, total duration, db time share, common
    /// ancestor, representative db span. All rejections are silent `None`
    /// outcomes with a counter; none of them is an error.
    fn maybe_performance_problem(&self, ctx: &DetectionContext) -> Option<PerformanceProblem> {
        let pattern_size = self.pattern.len();
        let times_occurred = self.spans.len() / pattern_size;
        if times_occurred < ctx.settings.minimum_occurrences_of_pattern {
            return None;
        }

        // Truncate any trailing partial repeat
        let offender_span_count = pattern_size * times_occurred;
        let offender_spans = &self.spans[..offender_span_count];

        let total_spans_duration = total_span_time(offender_spans);
        if total_spans_duration < ctx.settings.total_duration_threshold {
            ctx.metrics.incr(RejectionReason::BelowDurationThreshold);
            debug!(total_spans_duration, "region below duration threshold");
            return None;
        }

        let total_db_duration =
            total_span_time(offender_spans.iter().filter(|span| is_db_op(span)));
        let db_share = if total_spans_duration > 0.0 {
            total_db_duration / total_spans_duration
        } else {
            0.0
        };
        if db_share < ctx.settings.min_percentage_of_db_spans {
            ctx.metrics.incr(RejectionReason::BelowDbSpanPercentage);
            debug!(db_share, "region below db span percentage");
            return None;
        }

        let Some(parent_span) = find_common_parent_span(
            offender_spans,
            &self.parent_map,
            ctx.event,
            ctx.settings.max_allowable_depth,
        ) else {
            ctx.metrics.incr(RejectionReason::NoCommonParentSpan);
            return None;
        };

        let Some(db_span) = self.first_relevant_db_span() else {
            ctx.metrics.incr(RejectionReason::NoQualifyingDbSpan);
            return None;
        };

        Some(self.build_problem(parent_span, db_span, offender_spans, times_occurred, ctx))
    }

    /// First accumulated db span whose compact evidence value is not the
    /// uninformative connection-setup marker.
    fn first_relevant_db_span(&self) -> Option<&Span> {
        self.spans.iter().find(|span| {
            is_db_op(span) && span_evidence_value(Some(span), false) != "prisma:engine:connection"
        })
    }

    fn build_problem(
        &self,
        parent_span: &Span,
        db_span: &Span,
        offender_spans: &[Span],
        times_occurred: usize,
        ctx: &DetectionContext,
    ) -> PerformanceProblem {
        let parent_op = parent_span.op.as_deref().unwrap_or("");
        let parent_hash = parent_span.hash.as_deref().unwrap_or("");
        let db_hash = db_span.hash.as_deref().unwrap_or("");
        let fingerprint = problem_fingerprint(
            ProblemType::MnPlusOneDbQueries,
            parent_op,
            parent_hash,
            db_hash,
        );

        let parent_span_ids: Vec<String> = parent_span.span_id.iter().cloned().collect();
        let cause_span_ids: Vec<String> = offender_spans
            .iter()
            .filter(|span| is_db_op(span))
            .filter_map(|span| span.span_id.clone())
            .collect();
        let offender_span_ids: Vec<String> = offender_spans
            .iter()
            .filter_map(|span| span.span_id.clone())
            .collect();

        let evidence_data = EvidenceData {
            op: "db".to_string(),
            parent_span_ids: parent_span_ids.clone(),
            cause_span_ids: cause_span_ids.clone(),
            offender_span_ids: offender_span_ids.clone(),
            transaction_name: ctx.event.transaction_name().to_string(),
            parent_span: span_evidence_value(Some(parent_span), true),
            pattern_spans: self
                .pattern
                .iter()
                .map(|span| span_evidence_value(Some(span), true))
                .collect(),
            pattern_spans_compact: self
                .pattern
                .iter()
                .map(|span| span_evidence_value(Some(span), false))
                .collect(),
            num_offender_spans: offender_spans.len(),
            pattern_size: self.pattern.len(),
            num_pattern_repetitions: times_occurred,
        };

        let evidence_display = vec![IssueEvidence {
            name: "Offending Spans".to_string(),
            value: notification_attachment_body(
                db_span.op.as_deref(),
                db_span.description.as_deref(),
            ),
            important: true,
        }];

        PerformanceProblem {
            fingerprint,
            op: "db".to_string(),
            description: db_span.description.clone().unwrap_or_default(),
            problem_type: ProblemType::MnPlusOneDbQueries,
            parent_span_ids,
            cause_span_ids,
            offender_span_ids,
            evidence_data,
            evidence_display,
        }
    }
}
