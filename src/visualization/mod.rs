//! Console output for stitching results.

use crate::analysis::PositionErrorSummary;
use crate::logging::MetricsCollector;
use crate::pipeline::{PairReport, StitchingOutcome, TilePlacement};

fn format_vector<T: std::fmt::Display>(values: &[T]) -> String {
    let parts: Vec<String> = values.iter().map(|v| format!("{:.2}", v)).collect();
    format!("({})", parts.join(", "))
}

pub fn print_placements(placements: &[TilePlacement]) {
    println!("\n=== Tile Positions ===");
    println!("{:<8} {:<10} {:<30}", "Tile", "Timepoint", "Translation");
    println!("{}", "-".repeat(50));
    for placement in placements {
        println!(
            "{:<8} {:<10} {:<30}",
            placement.key.id,
            placement.key.timepoint,
            format_vector(&placement.translation)
        );
    }
}

pub fn print_pairs(pairs: &[PairReport]) {
    println!("\n=== Pairwise Registration ===");
    println!(
        "{:<14} {:<14} {:<24} {:<8} {:<8} {:<6}",
        "First", "Second", "Shift", "R", "Phase", "Valid"
    );
    println!("{}", "-".repeat(78));
    for pair in pairs {
        println!(
            "{:<14} {:<14} {:<24} {:<8.3} {:<8.3} {:<6}",
            pair.first.to_string(),
            pair.second.to_string(),
            format_vector(&pair.shift),
            pair.cross_correlation,
            pair.phase_correlation,
            if pair.valid { "yes" } else { "no" }
        );
    }
}

pub fn print_outcome(outcome: &StitchingOutcome) {
    print_pairs(&outcome.pairs);
    print_placements(&outcome.placements);

    if let Some(optimization) = &outcome.optimization {
        println!("\n=== Global Optimization ===");
        println!("Status: {:?}", optimization.status);
        println!(
            "Average error: {:.3}, max error: {:.3}, iterations: {}, removed links: {}",
            optimization.average_error,
            optimization.max_error,
            optimization.iterations,
            optimization.restarts()
        );
    }

    if let Some(bounds) = &outcome.fused_bounds {
        println!("\nFused image: size {:?} at offset {}", bounds.size, format_vector(&bounds.offset));
    }
}

pub fn print_position_errors(summary: &PositionErrorSummary, tolerance: f64) {
    println!("\n=== Position Errors ===");
    println!("Mean error: {:.3} px", summary.mean_error);
    println!("Max error:  {:.3} px", summary.max_error);
    println!(
        "Within {:.1} px: {}/{}",
        tolerance,
        summary.within_tolerance,
        summary.errors.len() + summary.missing
    );
    if summary.missing > 0 {
        println!("Not placed: {}", summary.missing);
    }
}

pub fn print_performance(metrics: &MetricsCollector) {
    let quality = metrics.registration_quality();
    if quality.pairs > 0 {
        println!("\n=== Registration ===");
        println!("Pairs: {} registered of {}", quality.registered, quality.pairs);
        if let (Some(mean), Some(min)) = (quality.mean_cross_correlation, quality.min_cross_correlation) {
            println!("Cross-correlation: mean {:.3}, min {:.3}", mean, min);
        }
        if quality.optimizer_runs > 0 {
            println!("Accepted: {}, dropped as outliers: {}", quality.accepted, quality.restarts);
        }
    }

    let stats = metrics.all_stage_stats();
    if stats.is_empty() {
        return;
    }
    println!("\n=== Timing ===");
    println!("{:<12} {:<8} {:<12} {:<12}", "Stage", "Runs", "Mean (ms)", "Max (ms)");
    println!("{}", "-".repeat(46));
    for stat in &stats {
        println!("{:<12} {:<8} {:<12.2} {:<12.2}", stat.stage, stat.runs, stat.mean_ms, stat.max_ms);
    }
}
