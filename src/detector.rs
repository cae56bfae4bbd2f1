//! Streaming MN+1 detector facade
//!
//! One detector instance processes exactly one event's span sequence, in the
//! order the host feeds it. The instance exclusively owns its state and
//! parent map, so hosts that process many events concurrently construct one
//! detector per event and never share instances. Abandoning a detector
//! mid-stream is always safe: it holds no handles and does no background
//! work.
//!
//! # Example
//!
//! ```
//! use mnplusone::detector::MnPlusOneDbSpanDetector;
//! use mnplusone::settings::DetectorSettings;
//! use mnplusone::span::{Event, Span};
//!
//! let parent = Span {
//!     span_id: Some("root".to_string()),
//!     op: Some("http.server".to_string()),
//!     description: Some("GET /users".to_string()),
//!     hash: Some("root-hash".to_string()),
//!     start_timestamp: 0.0,
//!     end_timestamp: 10.0,
//!     ..Default::default()
//! };
//! let mut spans = vec![parent];
//! for i in 0..6 {
//!     let base = i as f64;
//!     spans.push(Span {
//!         span_id: Some(format!("db{}", i)),
//!         parent_span_id: Some("root".to_string()),
//!         op: Some("db".to_string()),
//!         description: Some("SELECT * FROM users WHERE id = %s".to_string()),
//!         hash: Some("q1".to_string()),
//!         start_timestamp: base,
//!         end_timestamp: base + 0.2,
//!         ..Default::default()
//!     });
//!     spans.push(Span {
//!         span_id: Some(format!("http{}", i)),
//!         parent_span_id: Some("root".to_string()),
//!         op: Some("http.client".to_string()),
//!         description: Some("GET /avatar".to_string()),
//!         start_timestamp: base + 0.4,
//!         end_timestamp: base + 0.6,
//!         ..Default::default()
//!     });
//! }
//! let event = Event::new(Some("/users".to_string()), spans);
//!
//! let mut detector = MnPlusOneDbSpanDetector::new(&event, DetectorSettings::default());
//! for span in &event.spans {
//!     detector.visit_span(span);
//! }
//! detector.on_complete();
//!
//! assert_eq!(detector.stored_problems().len(), 1);
//! ```

use crate::metrics::{MetricsSink, NoopMetrics};
use crate::problem::PerformanceProblem;
use crate::settings::DetectorSettings;
use crate::span::{Event, Span};
use crate::state::{DetectionContext, State};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Streaming detector for MN+1 database query patterns.
pub struct MnPlusOneDbSpanDetector<'e> {
    settings: DetectorSettings,
    event: &'e Event,
    metrics: Arc<dyn MetricsSink>,
    state: Option<State>,
    stored_problems: HashMap<String, PerformanceProblem>,
}

impl<'e> MnPlusOneDbSpanDetector<'e> {
    /// Build a detector for one event, dropping all rejection counters.
    pub fn new(event: &'e Event, settings: DetectorSettings) -> Self {
        Self::with_metrics(event, settings, Arc::new(NoopMetrics))
    }

    /// Build a detector that reports rejection counters to `metrics`.
    pub fn with_metrics(
        event: &'e Event,
        settings: DetectorSettings,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        Self {
            settings,
            event,
            metrics,
            state: Some(State::new()),
            stored_problems: HashMap::new(),
        }
    }

    /// Feed the next span of the event, in original trace order.
    ///
    /// Never panics on malformed span data: absent fields degrade to empty
    /// values during matching.
    pub fn visit_span(&mut self, span: &Span) {
        let ctx = DetectionContext {
            settings: &self.settings,
            event: self.event,
            metrics: &*self.metrics,
        };
        let state = self.state.take().unwrap_or_default();
        let (next_state, problem) = state.next(span, &ctx);
        self.state = Some(next_state);
        if let Some(problem) = problem {
            self.store(problem);
        }
    }

    /// Signal end of input. Must be called once after the last span so a
    /// still-repeating pattern at stream end is evaluated.
    pub fn on_complete(&mut self) {
        let ctx = DetectionContext {
            settings: &self.settings,
            event: self.event,
            metrics: &*self.metrics,
        };
        let problem = self.state.as_ref().and_then(|state| state.finish(&ctx));
        if let Some(problem) = problem {
            self.store(problem);
        }
    }

    fn store(&mut self, problem: PerformanceProblem) {
        debug!(fingerprint = %problem.fingerprint, "storing performance problem");
        // Last write per fingerprint wins
        self.stored_problems
            .insert(problem.fingerprint.clone(), problem);
    }

    /// Per-project creation gate.
    pub fn is_creation_allowed_for_project(&self) -> bool {
        self.settings.detection_enabled
    }

    /// Organization-level gating happens upstream; always allowed here.
    pub fn is_creation_allowed_for_organization(&self) -> bool {
        true
    }

    /// Problems collected so far, keyed by fingerprint.
    pub fn stored_problems(&self) -> &HashMap<String, PerformanceProblem> {
        &self.stored_problems
    }

    pub fn settings(&self) -> &DetectorSettings {
        &self.settings
    }

    /// Consume the detector, returning problems sorted by fingerprint.
    pub fn into_problems(self) -> Vec<PerformanceProblem> {
        let mut problems: Vec<PerformanceProblem> =
            self.stored_problems.into_values().collect();
        problems.sort_by(|a, b| a.fingerprint.cmp(&b.fingerprint));
        problems
    }
}

/// Run the detector over every span of `event` and return the problems
/// sorted by fingerprint. Returns nothing when problem creation is disabled
/// for the project.
pub fn detect_mn_plus_one_problems(
    event: &Event,
    settings: DetectorSettings,
) -> Vec<PerformanceProblem> {
    let mut detector = MnPlusOneDbSpanDetector::new(event, settings);
    if !detector.is_creation_allowed_for_project() {
        return Vec::new();
    }
    for span in &event.spans {
        detector.visit_span(span);
    }
    detector.on_complete();
    detector.into_problems()
}
