//! Meta-cognition layer
//!
//! The session watching itself: reflections graded against observed
//! outcomes, plans graded against their executions, confidence factors
//! weighted per decision type, and calibration drifting the checkpoint
//! thresholds over time.

mod calibration;
mod confidence;
mod planning;
mod reflection;

pub use calibration::Calibrator;
pub use confidence::{ConfidenceFactors, FactorWeights, score_confidence};
pub use planning::score_planning;
pub use reflection::{META_RING_LEN, MetaReflectionTrack, ObservedOutcome, ReflectionScore, score_reflection};
