//! Confidence calibration - ECE and threshold drift
//!
//! Tracks predicted confidence against user acceptance per decision
//! type. Expected Calibration Error buckets predictions into 20% bands
//! and averages |mean predicted - acceptance rate| over non-empty
//! buckets. Thresholds drift by 0.05 when acceptance leaves the
//! configured bands: consistently accepted recommendations earn fewer
//! checkpoints, consistently rejected ones earn more.

use std::collections::HashMap;

use tracing::{debug, info};

use crate::domain::DecisionType;

/// Acceptance band above which a threshold relaxes
const HIGH_ACCEPTANCE: f32 = 0.9;

/// Acceptance band below which a threshold tightens
const LOW_ACCEPTANCE: f32 = 0.6;

/// Threshold adjustment step
const THRESHOLD_STEP: f32 = 0.05;

/// Clamp range for adjusted thresholds
const THRESHOLD_RANGE: (f32, f32) = (0.5, 0.95);

/// Minimum observations before a threshold moves
const MIN_OBSERVATIONS: usize = 10;

/// One predicted-vs-accepted observation
#[derive(Debug, Clone, Copy)]
struct Observation {
    predicted: f32,
    accepted: bool,
}

/// Per-decision-type calibration state
#[derive(Debug, Default)]
pub struct Calibrator {
    observations: HashMap<DecisionType, Vec<Observation>>,
    threshold_overrides: HashMap<DecisionType, f32>,
}

impl Calibrator {
    /// Create an empty calibrator
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one observation
    pub fn record(&mut self, decision_type: DecisionType, predicted: f32, accepted: bool) {
        debug!(%decision_type, predicted, accepted, "Calibrator::record: called");
        self.observations
            .entry(decision_type)
            .or_default()
            .push(Observation { predicted, accepted });
        self.maybe_adjust(decision_type);
    }

    /// Current threshold for a decision type (default unless drifted)
    pub fn threshold(&self, decision_type: DecisionType) -> f32 {
        self.threshold_overrides
            .get(&decision_type)
            .copied()
            .unwrap_or_else(|| decision_type.default_threshold())
    }

    /// Expected Calibration Error over 20% buckets for a decision type
    pub fn ece(&self, decision_type: DecisionType) -> Option<f32> {
        let observations = self.observations.get(&decision_type)?;
        if observations.is_empty() {
            return None;
        }

        let mut buckets: [Vec<&Observation>; 5] = Default::default();
        for obs in observations {
            let index = ((obs.predicted / 0.2) as usize).min(4);
            buckets[index].push(obs);
        }

        let mut error_sum = 0.0;
        let mut bucket_count = 0;
        for bucket in &buckets {
            if bucket.is_empty() {
                continue;
            }
            let mean_predicted = bucket.iter().map(|o| o.predicted).sum::<f32>() / bucket.len() as f32;
            let acceptance = bucket.iter().filter(|o| o.accepted).count() as f32 / bucket.len() as f32;
            error_sum += (mean_predicted - acceptance).abs();
            bucket_count += 1;
        }

        let ece = error_sum / bucket_count as f32;
        debug!(%decision_type, ece, "Calibrator::ece: computed");
        Some(ece)
    }

    /// Acceptance rate for a decision type
    pub fn acceptance_rate(&self, decision_type: DecisionType) -> Option<f32> {
        let observations = self.observations.get(&decision_type)?;
        if observations.is_empty() {
            return None;
        }
        Some(observations.iter().filter(|o| o.accepted).count() as f32 / observations.len() as f32)
    }

    /// Drift the threshold when acceptance leaves the bands
    fn maybe_adjust(&mut self, decision_type: DecisionType) {
        let Some(observations) = self.observations.get(&decision_type) else {
            return;
        };
        if observations.len() < MIN_OBSERVATIONS {
            return;
        }
        let acceptance = observations.iter().filter(|o| o.accepted).count() as f32 / observations.len() as f32;
        let current = self.threshold(decision_type);

        let adjusted = if acceptance > HIGH_ACCEPTANCE {
            // Recommendations keep landing: checkpoint less
            current - THRESHOLD_STEP
        } else if acceptance < LOW_ACCEPTANCE {
            // Recommendations keep missing: checkpoint more
            current + THRESHOLD_STEP
        } else {
            return;
        };

        let clamped = adjusted.clamp(THRESHOLD_RANGE.0, THRESHOLD_RANGE.1);
        if (clamped - current).abs() > f32::EPSILON {
            info!(%decision_type, from = current, to = clamped, acceptance, "Calibrator: threshold drifted");
            self.threshold_overrides.insert(decision_type, clamped);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_thresholds() {
        let calibrator = Calibrator::new();
        assert_eq!(calibrator.threshold(DecisionType::Plan), 0.70);
        assert_eq!(calibrator.threshold(DecisionType::Execution), 0.90);
    }

    #[test]
    fn test_high_acceptance_relaxes_threshold() {
        let mut calibrator = Calibrator::new();
        for _ in 0..12 {
            calibrator.record(DecisionType::Plan, 0.8, true);
        }
        assert!(calibrator.threshold(DecisionType::Plan) < 0.70);
    }

    #[test]
    fn test_low_acceptance_tightens_threshold() {
        let mut calibrator = Calibrator::new();
        for i in 0..12 {
            calibrator.record(DecisionType::Strategy, 0.8, i % 2 == 0);
        }
        // 50% acceptance < 0.6: tighter
        assert!(calibrator.threshold(DecisionType::Strategy) > 0.70);
    }

    #[test]
    fn test_threshold_is_clamped() {
        let mut calibrator = Calibrator::new();
        for _ in 0..200 {
            calibrator.record(DecisionType::Execution, 0.95, true);
        }
        assert!(calibrator.threshold(DecisionType::Execution) >= 0.5);
    }

    #[test]
    fn test_ece_perfect_calibration() {
        let mut calibrator = Calibrator::new();
        // Predicted 0.9, accepted 90% of the time
        for i in 0..10 {
            calibrator.record(DecisionType::Plan, 0.9, i != 0);
        }
        let ece = calibrator.ece(DecisionType::Plan).unwrap();
        assert!(ece < 0.05, "ece was {}", ece);
    }

    #[test]
    fn test_ece_miscalibration() {
        let mut calibrator = Calibrator::new();
        // Predicted 0.9 but never accepted
        for _ in 0..5 {
            calibrator.record(DecisionType::Parameter, 0.9, false);
        }
        let ece = calibrator.ece(DecisionType::Parameter).unwrap();
        assert!(ece > 0.8, "ece was {}", ece);
    }

    #[test]
    fn test_ece_none_without_data() {
        let calibrator = Calibrator::new();
        assert!(calibrator.ece(DecisionType::Plan).is_none());
    }

    #[test]
    fn test_few_observations_do_not_drift() {
        let mut calibrator = Calibrator::new();
        for _ in 0..5 {
            calibrator.record(DecisionType::Plan, 0.9, true);
        }
        assert_eq!(calibrator.threshold(DecisionType::Plan), 0.70);
    }
}
