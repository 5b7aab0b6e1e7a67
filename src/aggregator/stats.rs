use std::collections::BTreeMap;

use crate::models::{AggregateStats, VerdictResult};

/// A verdict counts as suspicious when the service flags it or its
/// confidence is strictly above the alert threshold.
pub fn is_suspicious(result: &VerdictResult, threshold: f64) -> bool {
    result.is_anomalous || result.confidence > threshold
}

/// Recomputes everything from scratch over `results`.
pub fn compute_stats<'a, I>(results: I, threshold: f64) -> AggregateStats
where
    I: IntoIterator<Item = &'a VerdictResult>,
{
    let mut total_frames = 0usize;
    let mut suspicious_frames = 0usize;
    let mut confidence_sum = 0.0;
    let mut max_confidence: f64 = 0.0;
    let mut method_totals: BTreeMap<String, (f64, usize)> = BTreeMap::new();

    for result in results {
        total_frames += 1;
        if is_suspicious(result, threshold) {
            suspicious_frames += 1;
        }
        confidence_sum += result.confidence;
        max_confidence = max_confidence.max(result.confidence);

        for (method, score) in &result.method_scores {
            let entry = method_totals.entry(method.clone()).or_insert((0.0, 0));
            entry.0 += score;
            entry.1 += 1;
        }
    }

    let average_confidence = if total_frames > 0 {
        confidence_sum / total_frames as f64
    } else {
        0.0
    };

    AggregateStats {
        total_frames,
        suspicious_frames,
        average_confidence,
        max_confidence,
        method_averages: method_totals
            .into_iter()
            .map(|(method, (sum, count))| (method, sum / count as f64))
            .collect(),
    }
}
