//! Detector visit-cost benchmark
//!
//! Measures the per-span cost of streaming an event through the detector.
//! The hot path is `visit_span`, which must stay cheap enough to run inline
//! in an event-processing pipeline: the lookback scan is bounded by
//! `max_sequence_length`, so cost should be flat as traces grow.
//!
//! # Run Instructions
//!
//! ```bash
//! cargo bench --bench detector_overhead
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use mnplusone::detector::MnPlusOneDbSpanDetector;
use mnplusone::settings::DetectorSettings;
use mnplusone::span::{Event, Span};

/// Build an event with `repeats` repetitions of a db+http pattern under one
/// shared parent.
fn repeating_event(repeats: usize) -> Event {
    let mut spans = vec![Span {
        span_id: Some("root".to_string()),
        op: Some("http.server".to_string()),
        description: Some("GET /bench".to_string()),
        hash: Some("root-hash".to_string()),
        start_timestamp: 0.0,
        end_timestamp: repeats as f64,
        ..Default::default()
    }];
    for i in 0..repeats {
        let base = i as f64;
        spans.push(Span {
            span_id: Some(format!("d{}", i)),
            parent_span_id: Some("root".to_string()),
            op: Some("db".to_string()),
            description: Some("SELECT * FROM items WHERE id = %s".to_string()),
            hash: Some("q1".to_string()),
            start_timestamp: base,
            end_timestamp: base + 0.2,
        });
        spans.push(Span {
            span_id: Some(format!("w{}", i)),
            parent_span_id: Some("root".to_string()),
            op: Some("http.client".to_string()),
            description: Some("GET /thumbnail".to_string()),
            hash: None,
            start_timestamp: base + 0.4,
            end_timestamp: base + 0.6,
        });
    }
    Event::new(Some("/bench".to_string()), spans)
}

/// Event where nothing repeats, keeping the detector in its lookback phase
/// the whole time (the worst case for the window scan).
fn distinct_event(count: usize) -> Event {
    let spans = (0..count)
        .map(|i| Span {
            span_id: Some(format!("s{}", i)),
            parent_span_id: Some("root".to_string()),
            op: Some("db".to_string()),
            description: Some(format!("SELECT {} FROM t", i)),
            hash: Some(format!("h{}", i)),
            start_timestamp: i as f64,
            end_timestamp: i as f64 + 0.1,
        })
        .collect();
    Event::new(None, spans)
}

fn run_detector(event: &Event) -> usize {
    let mut detector = MnPlusOneDbSpanDetector::new(event, DetectorSettings::default());
    for span in &event.spans {
        detector.visit_span(span);
    }
    detector.on_complete();
    detector.stored_problems().len()
}

fn bench_repeating_pattern(c: &mut Criterion) {
    let mut group = c.benchmark_group("repeating_pattern");
    for repeats in [10, 100, 1000] {
        let event = repeating_event(repeats);
        group.bench_with_input(
            BenchmarkId::from_parameter(repeats),
            &event,
            |b, event| b.iter(|| run_detector(black_box(event))),
        );
    }
    group.finish();
}

fn bench_distinct_spans(c: &mut Criterion) {
    let mut group = c.benchmark_group("distinct_spans");
    for count in [100, 1000] {
        let event = distinct_event(count);
        group.bench_with_input(BenchmarkId::from_parameter(count), &event, |b, event| {
            b.iter(|| run_detector(black_box(event)))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_repeating_pattern, bench_distinct_spans);
criterion_main!(benches);
