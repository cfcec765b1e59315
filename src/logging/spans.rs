//! Structured spans for hierarchical logging
//!
//! One span per registered pair and one per pipeline stage, each tagged with
//! the correlation id of the stitching run.

use std::time::Instant;
use tracing::{field, span, Level, Span};
use uuid::Uuid;

use crate::optimization::TileKey;

/// Span for the registration of one tile pair
pub struct RegistrationSpan {
    span: Span,
    start_time: Instant,
}

impl RegistrationSpan {
    pub fn new(first: TileKey, second: TileKey, correlation_id: Option<Uuid>) -> Self {
        let span = span!(
            Level::DEBUG,
            "pair_registration",
            first_tile = first.id,
            first_timepoint = first.timepoint,
            second_tile = second.id,
            second_timepoint = second.timepoint,
            correlation_id = field::Empty,
            shift = field::Empty,
            cross_correlation = field::Empty,
            phase_correlation = field::Empty,
            execution_time_ms = field::Empty
        );
        if let Some(corr_id) = correlation_id {
            span.record("correlation_id", field::display(corr_id));
        }

        Self {
            span,
            start_time: Instant::now(),
        }
    }

    /// Record the accepted shift
    pub fn record_result(&self, shift: &[f32], cross_correlation: f32, phase_correlation: f32) {
        let duration = self.start_time.elapsed();
        self.span.record("shift", field::debug(shift));
        self.span.record("cross_correlation", cross_correlation);
        self.span.record("phase_correlation", phase_correlation);
        self.span.record("execution_time_ms", duration.as_millis() as f64);

        tracing::debug!(
            parent: &self.span,
            shift = ?shift,
            cross_correlation = cross_correlation,
            phase_correlation = phase_correlation,
            execution_time_ms = duration.as_millis(),
            "Pair registered"
        );
    }

    /// Record that the pair was left out of the optimization
    pub fn record_skipped(&self, reason: &str) {
        tracing::warn!(parent: &self.span, reason = reason, "Pair skipped");
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    pub fn enter(&self) -> tracing::span::Entered<'_> {
        self.span.enter()
    }
}

/// Span for pipeline stage execution
pub struct PipelineSpan {
    span: Span,
    start_time: Instant,
}

impl PipelineSpan {
    /// Create a new pipeline stage span
    pub fn new(stage_name: &str, correlation_id: Option<Uuid>) -> Self {
        let span = span!(
            Level::INFO,
            "pipeline_stage",
            stage = stage_name,
            correlation_id = field::Empty,
            input_type = field::Empty,
            input_count = field::Empty,
            output_type = field::Empty,
            success = field::Empty,
            execution_time_ms = field::Empty
        );
        if let Some(corr_id) = correlation_id {
            span.record("correlation_id", field::display(corr_id));
        }

        Self {
            span,
            start_time: Instant::now(),
        }
    }

    /// Record stage input metadata
    pub fn record_input(&self, input_type: &str, input_count: usize) {
        self.span.record("input_type", input_type);
        self.span.record("input_count", input_count);
        tracing::debug!(
            parent: &self.span,
            input_type = input_type,
            input_count = input_count,
            "Pipeline stage input recorded"
        );
    }

    /// Record stage completion
    pub fn record_completion(&self, output_type: &str, success: bool) {
        let duration = self.start_time.elapsed();
        self.span.record("output_type", output_type);
        self.span.record("success", success);
        self.span.record("execution_time_ms", duration.as_millis() as f64);

        tracing::info!(
            parent: &self.span,
            output_type = output_type,
            success = success,
            execution_time_ms = duration.as_millis(),
            "Pipeline stage completed"
        );
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    pub fn enter(&self) -> tracing::span::Entered<'_> {
        self.span.enter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[traced_test]
    #[test]
    fn test_registration_span() {
        let span = RegistrationSpan::new(
            TileKey::new(1, 1),
            TileKey::new(2, 1),
            Some(Uuid::new_v4()),
        );

        let _enter = span.enter();
        span.record_result(&[12.5, -8.0], 0.93, 0.41);
        span.record_skipped("overlap too small");

        assert!(logs_contain("Pair skipped"));
    }

    #[traced_test]
    #[test]
    fn test_pipeline_span() {
        let span = PipelineSpan::new("optimize", Some(Uuid::new_v4()));

        let _enter = span.enter();
        span.record_input("compare_pairs", 4);
        span.record_completion("tile_models", true);

        assert!(logs_contain("Pipeline stage completed"));
    }
}
