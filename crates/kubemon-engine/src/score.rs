/* Copyright (C) 2025 Pedro Henrique / phkaiser13
 *
 * File: crates/kubemon-engine/src/score.rs
 *
 * Score aggregation (spec §4.3): `raw` is the plain healthy-fraction,
 * `weighted` folds in each check's criticality weight, `confidence` is the
 * mean of per-result confidences. `overall` takes the worst status across
 * all checks, relying on `HealthStatus`'s declared total order.
 *
 * SPDX-License-Identifier: Apache-2.0
 */

use kubemon_types::{Criticality, HealthStatus, Score};

pub fn overall_status<'a>(checks: impl Iterator<Item = &'a HealthStatus>) -> HealthStatus {
    checks.copied().max().unwrap_or(HealthStatus::Unknown)
}

/// `weighted_inputs` pairs each result's status/confidence with the
/// criticality of the check that produced it, resolved by the caller from
/// the registry at snapshot time (a result whose check has since been
/// unregistered still contributes at `Criticality::Low`).
pub fn aggregate(weighted_inputs: &[(Criticality, HealthStatus, f64)]) -> Score {
    if weighted_inputs.is_empty() {
        return Score { raw: 0.0, weighted: 0.0, confidence: 1.0 };
    }

    let healthy_count = weighted_inputs.iter().filter(|(_, status, _)| *status == HealthStatus::Healthy).count();
    let raw = 100.0 * healthy_count as f64 / weighted_inputs.len() as f64;

    let weight_sum: f64 = weighted_inputs.iter().map(|(c, _, _)| c.weight() as f64).sum();
    let weighted = if weight_sum > 0.0 {
        100.0
            * weighted_inputs
                .iter()
                .map(|(c, status, _)| c.weight() as f64 * status.score())
                .sum::<f64>()
            / weight_sum
    } else {
        raw
    };

    let confidence =
        weighted_inputs.iter().map(|(_, _, confidence)| confidence).sum::<f64>() / weighted_inputs.len() as f64;

    Score { raw, weighted, confidence }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_healthy_high_criticality_check_scores_100() {
        let inputs = vec![(Criticality::High, HealthStatus::Healthy, 1.0)];
        let score = aggregate(&inputs);
        assert_eq!(score.raw, 100.0);
        assert_eq!(score.weighted, 100.0);
        assert_eq!(score.confidence, 1.0);
    }

    #[test]
    fn weighted_score_favors_higher_criticality_failures() {
        // One critical (weight 8) unhealthy check and one low (weight 1)
        // healthy check: weighted should be much worse than raw (50%).
        let inputs = vec![
            (Criticality::Critical, HealthStatus::Unhealthy, 1.0),
            (Criticality::Low, HealthStatus::Healthy, 1.0),
        ];
        let score = aggregate(&inputs);
        assert_eq!(score.raw, 50.0);
        assert!(score.weighted < 20.0);
    }

    #[test]
    fn overall_status_is_the_worst_of_the_set() {
        let statuses = vec![HealthStatus::Healthy, HealthStatus::Degraded];
        assert_eq!(overall_status(statuses.iter()), HealthStatus::Degraded);
    }
}
