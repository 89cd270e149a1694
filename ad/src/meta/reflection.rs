//! Meta-reflection - scoring a reflection against the observed outcome
//!
//! After an iteration executes, the reflection that drove it is graded:
//! how far off the progress prediction was, whether the confidence was
//! calibrated, and whether the assessment itself held up. The scores
//! feed back into subsequent reflection prompts as the self-critique.

use serde::Serialize;
use tracing::debug;

use crate::domain::{Assessment, Reflection};

/// Bound on retained meta-reflection scores
pub const META_RING_LEN: usize = 10;

/// What actually happened in an iteration, as the scorer sees it
#[derive(Debug, Clone)]
pub struct ObservedOutcome {
    /// Deterministic actual progress [0,100]
    pub actual_progress: f32,

    /// Whether the iteration's plan succeeded
    pub succeeded: bool,

    /// Whether the session terminated this iteration
    pub terminal: bool,
}

/// Graded critique of one reflection
#[derive(Debug, Clone, Serialize)]
pub struct ReflectionScore {
    /// Iteration the reflection belonged to
    pub iteration: u32,

    /// |predicted - actual| progress, in points
    pub progress_error: f32,

    /// Calibration error per the overconfident/underconfident bands
    pub confidence_error: f32,

    /// Whether the assessment matched what happened
    pub assessment_correct: bool,

    /// 0.4 * progress + 0.3 * confidence + 0.3 * assessment
    pub overall_accuracy: f32,
}

/// Overconfidence boundary
const HIGH_CONFIDENCE: f32 = 0.7;

/// Underconfidence boundary
const LOW_CONFIDENCE: f32 = 0.4;

/// Score one reflection against its observed outcome
pub fn score_reflection(reflection: &Reflection, observed: &ObservedOutcome) -> ReflectionScore {
    debug!(iteration = reflection.iteration, "score_reflection: called");

    let progress_error = (reflection.predicted_progress - observed.actual_progress).abs();

    let confidence_error = if reflection.confidence >= HIGH_CONFIDENCE && !observed.succeeded {
        0.8
    } else if reflection.confidence <= LOW_CONFIDENCE && observed.succeeded {
        0.3
    } else {
        0.1
    };

    let assessment_correct = match reflection.assessment {
        Assessment::Complete => observed.terminal && observed.succeeded,
        Assessment::Continue => observed.succeeded || !observed.terminal,
        Assessment::Stuck => !observed.succeeded,
        Assessment::NeedsClarification => true,
    };

    let progress_component = 1.0 - (progress_error / 100.0).min(1.0);
    let confidence_component = 1.0 - confidence_error;
    let assessment_component = if assessment_correct { 1.0 } else { 0.0 };
    let overall_accuracy = 0.4 * progress_component + 0.3 * confidence_component + 0.3 * assessment_component;

    debug!(
        progress_error,
        confidence_error,
        assessment_correct,
        overall_accuracy,
        "score_reflection: computed"
    );

    ReflectionScore {
        iteration: reflection.iteration,
        progress_error,
        confidence_error,
        assessment_correct,
        overall_accuracy,
    }
}

/// Bounded ring of reflection scores
#[derive(Debug, Default)]
pub struct MetaReflectionTrack {
    scores: Vec<ReflectionScore>,
}

impl MetaReflectionTrack {
    /// Append a score, evicting the oldest beyond the bound
    pub fn push(&mut self, score: ReflectionScore) {
        self.scores.push(score);
        if self.scores.len() > META_RING_LEN {
            self.scores.remove(0);
        }
    }

    /// Latest score
    pub fn latest(&self) -> Option<&ReflectionScore> {
        self.scores.last()
    }

    /// Mean overall accuracy over the retained window
    pub fn mean_accuracy(&self) -> Option<f32> {
        if self.scores.is_empty() {
            return None;
        }
        Some(self.scores.iter().map(|s| s.overall_accuracy).sum::<f32>() / self.scores.len() as f32)
    }

    /// Render the latest critique for the reflection prompt
    pub fn critique_for_prompt(&self) -> String {
        match self.latest() {
            Some(score) => format!(
                "Previous reflection was off by {:.0} progress points, confidence error {:.1}, assessment {}; overall accuracy {:.2}",
                score.progress_error,
                score.confidence_error,
                if score.assessment_correct { "correct" } else { "wrong" },
                score.overall_accuracy,
            ),
            None => "(no prior reflection to critique)".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reflection(progress: f32, confidence: f32, assessment: Assessment) -> Reflection {
        Reflection {
            iteration: 1,
            assessment,
            predicted_progress: progress,
            confidence,
            reasoning: String::new(),
            next_action: "x".to_string(),
            questions: vec![],
            degraded: false,
        }
    }

    #[test]
    fn test_overconfident_failure() {
        let score = score_reflection(
            &reflection(80.0, 0.9, Assessment::Continue),
            &ObservedOutcome {
                actual_progress: 20.0,
                succeeded: false,
                terminal: false,
            },
        );
        assert_eq!(score.confidence_error, 0.8);
        assert_eq!(score.progress_error, 60.0);
    }

    #[test]
    fn test_underconfident_success() {
        let score = score_reflection(
            &reflection(30.0, 0.2, Assessment::Continue),
            &ObservedOutcome {
                actual_progress: 35.0,
                succeeded: true,
                terminal: false,
            },
        );
        assert_eq!(score.confidence_error, 0.3);
        assert!(score.assessment_correct);
    }

    #[test]
    fn test_well_calibrated() {
        let score = score_reflection(
            &reflection(50.0, 0.6, Assessment::Continue),
            &ObservedOutcome {
                actual_progress: 52.0,
                succeeded: true,
                terminal: false,
            },
        );
        assert_eq!(score.confidence_error, 0.1);
        // 0.4 * 0.98 + 0.3 * 0.9 + 0.3 * 1.0 = 0.962
        assert!((score.overall_accuracy - 0.962).abs() < 1e-3);
    }

    #[test]
    fn test_complete_assessment_needs_terminal_success() {
        let score = score_reflection(
            &reflection(100.0, 0.9, Assessment::Complete),
            &ObservedOutcome {
                actual_progress: 40.0,
                succeeded: false,
                terminal: false,
            },
        );
        assert!(!score.assessment_correct);
    }

    #[test]
    fn test_ring_is_bounded() {
        let mut track = MetaReflectionTrack::default();
        for i in 0..15 {
            track.push(ReflectionScore {
                iteration: i,
                progress_error: 0.0,
                confidence_error: 0.1,
                assessment_correct: true,
                overall_accuracy: 0.9,
            });
        }
        assert!(track.mean_accuracy().unwrap() > 0.8);
        assert_eq!(track.latest().unwrap().iteration, 14);
    }

    #[test]
    fn test_critique_rendering() {
        let mut track = MetaReflectionTrack::default();
        assert!(track.critique_for_prompt().contains("no prior"));
        track.push(ReflectionScore {
            iteration: 1,
            progress_error: 12.0,
            confidence_error: 0.1,
            assessment_correct: true,
            overall_accuracy: 0.9,
        });
        assert!(track.critique_for_prompt().contains("12"));
    }
}
