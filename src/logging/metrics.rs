//! Run metrics for stitching jobs
//!
//! Stage timings plus the registration and optimization figures a user checks
//! after a run: how many pairs registered, how strongly, and how often the
//! optimizer had to drop a link. A collector is owned by the caller and handed
//! to the pipeline explicitly.

use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use uuid::Uuid;

/// One timed pipeline stage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageTiming {
    pub stage: String,
    pub duration_ms: f64,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub correlation_id: Option<Uuid>,
}

/// Summary of every run of one stage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageStats {
    pub stage: String,
    pub runs: usize,
    pub total_ms: f64,
    pub mean_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
}

/// Pairwise registration and global optimization figures
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistrationQuality {
    /// Pairs handed to registration.
    pub pairs: usize,
    /// Pairs that produced a shift.
    pub registered: usize,
    /// Registered pairs still valid after the optimization.
    pub accepted: usize,
    pub mean_cross_correlation: Option<f64>,
    pub min_cross_correlation: Option<f64>,
    /// Links dropped by the optimizer as outliers.
    pub restarts: usize,
    pub optimizer_runs: usize,
}

#[derive(Default)]
struct Recorded {
    timings: Vec<StageTiming>,
    cross_correlations: Vec<f32>,
    pairs: usize,
    accepted: usize,
    restarts: usize,
    optimizer_runs: usize,
}

/// Thread-safe metrics collector
pub struct MetricsCollector {
    recorded: Mutex<Recorded>,
    enabled: bool,
}

impl MetricsCollector {
    pub fn new(enabled: bool) -> Self {
        Self {
            recorded: Mutex::new(Recorded::default()),
            enabled,
        }
    }

    fn with_recorded(&self, update: impl FnOnce(&mut Recorded)) {
        if !self.enabled {
            return;
        }
        if let Ok(mut recorded) = self.recorded.lock() {
            update(&mut recorded);
        }
    }

    pub fn record_stage(&self, stage: &str, duration: Duration, correlation_id: Option<Uuid>) {
        self.with_recorded(|r| {
            r.timings.push(StageTiming {
                stage: stage.to_string(),
                duration_ms: duration.as_secs_f64() * 1000.0,
                timestamp: chrono::Utc::now(),
                correlation_id,
            })
        });
    }

    /// One registered pair; `None` when no shift could be computed.
    pub fn record_pair(&self, cross_correlation: Option<f32>) {
        self.with_recorded(|r| {
            r.pairs += 1;
            r.cross_correlations.extend(cross_correlation);
        });
    }

    pub fn record_optimization(&self, accepted: usize, restarts: usize) {
        self.with_recorded(|r| {
            r.accepted += accepted;
            r.restarts += restarts;
            r.optimizer_runs += 1;
        });
    }

    /// Timings of one stage, in recording order
    pub fn timings(&self, stage: &str) -> Vec<StageTiming> {
        match self.recorded.lock() {
            Ok(recorded) => recorded.timings.iter().filter(|t| t.stage == stage).cloned().collect(),
            Err(_) => Vec::new(),
        }
    }

    pub fn stage_stats(&self, stage: &str) -> Option<StageStats> {
        let durations: Vec<f64> = self.timings(stage).iter().map(|t| t.duration_ms).collect();
        if durations.is_empty() {
            return None;
        }

        let total: f64 = durations.iter().sum();
        Some(StageStats {
            stage: stage.to_string(),
            runs: durations.len(),
            total_ms: total,
            mean_ms: total / durations.len() as f64,
            min_ms: durations.iter().copied().fold(f64::INFINITY, f64::min),
            max_ms: durations.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        })
    }

    /// Statistics for every recorded stage, in the order stages first ran
    pub fn all_stage_stats(&self) -> Vec<StageStats> {
        let mut stages: Vec<String> = Vec::new();
        if let Ok(recorded) = self.recorded.lock() {
            for timing in &recorded.timings {
                if !stages.contains(&timing.stage) {
                    stages.push(timing.stage.clone());
                }
            }
        }
        stages.iter().filter_map(|stage| self.stage_stats(stage)).collect()
    }

    pub fn registration_quality(&self) -> RegistrationQuality {
        let recorded = match self.recorded.lock() {
            Ok(recorded) => recorded,
            Err(_) => return RegistrationQuality::default(),
        };

        let values = &recorded.cross_correlations;
        let mean = (!values.is_empty())
            .then(|| values.iter().map(|&r| r as f64).sum::<f64>() / values.len() as f64);
        let min = values.iter().map(|&r| r as f64).reduce(f64::min);

        RegistrationQuality {
            pairs: recorded.pairs,
            registered: values.len(),
            accepted: recorded.accepted,
            mean_cross_correlation: mean,
            min_cross_correlation: min,
            restarts: recorded.restarts,
            optimizer_runs: recorded.optimizer_runs,
        }
    }
}

/// Times one pipeline stage and reports it to a collector on `stop`
pub struct StageTimer {
    start: Instant,
    stage: &'static str,
    correlation_id: Option<Uuid>,
    collector: Arc<MetricsCollector>,
}

impl StageTimer {
    pub fn start(stage: &'static str, correlation_id: Option<Uuid>, collector: Arc<MetricsCollector>) -> Self {
        Self {
            start: Instant::now(),
            stage,
            correlation_id,
            collector,
        }
    }

    pub fn stop(self) -> Duration {
        let duration = self.start.elapsed();
        self.collector.record_stage(self.stage, duration, self.correlation_id);

        tracing::debug!(
            stage = self.stage,
            duration_ms = duration.as_millis(),
            correlation_id = ?self.correlation_id,
            "Stage completed"
        );

        duration
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_stage_stats() {
        let collector = MetricsCollector::new(true);
        collector.record_stage("pairwise", Duration::from_millis(100), None);
        collector.record_stage("pairwise", Duration::from_millis(200), None);
        collector.record_stage("fuse", Duration::from_millis(40), None);

        let stats = collector.stage_stats("pairwise").unwrap();
        assert_eq!(stats.runs, 2);
        assert!((stats.mean_ms - 150.0).abs() < 1.0);
        assert!((stats.total_ms - 300.0).abs() < 1.0);
        assert!(stats.min_ms < stats.max_ms);
        assert!(collector.stage_stats("optimize").is_none());

        let all: Vec<String> = collector.all_stage_stats().into_iter().map(|s| s.stage).collect();
        assert_eq!(all, vec!["pairwise", "fuse"]);
    }

    #[test]
    fn test_timer_records_stage() {
        let collector = Arc::new(MetricsCollector::new(true));
        let correlation_id = Uuid::new_v4();

        let timer = StageTimer::start("fuse", Some(correlation_id), Arc::clone(&collector));
        thread::sleep(Duration::from_millis(10));
        let duration = timer.stop();

        assert!(duration >= Duration::from_millis(10));
        let timings = collector.timings("fuse");
        assert_eq!(timings.len(), 1);
        assert_eq!(timings[0].correlation_id, Some(correlation_id));
    }

    #[test]
    fn test_registration_quality() {
        let collector = MetricsCollector::new(true);
        collector.record_pair(Some(0.9));
        collector.record_pair(Some(0.5));
        collector.record_pair(None);
        collector.record_optimization(1, 1);

        let quality = collector.registration_quality();
        assert_eq!(quality.pairs, 3);
        assert_eq!(quality.registered, 2);
        assert_eq!(quality.accepted, 1);
        assert_eq!(quality.restarts, 1);
        assert_eq!(quality.optimizer_runs, 1);
        assert!((quality.mean_cross_correlation.unwrap() - 0.7).abs() < 1e-6);
        assert!((quality.min_cross_correlation.unwrap() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_disabled_collector() {
        let collector = MetricsCollector::new(false);
        collector.record_stage("fuse", Duration::from_millis(100), None);
        collector.record_pair(Some(0.8));

        assert!(collector.all_stage_stats().is_empty());
        assert_eq!(collector.registration_quality(), RegistrationQuality::default());
    }
}
