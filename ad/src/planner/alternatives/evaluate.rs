//! Alternative evaluation and choice
//!
//! overall = w_e * (1 - complexity/10) + w_r * (1 - risk/10)
//!         + w_a * alignment + w_c * confidence
//!
//! Weights normalize to sum 1. The sort is stable non-increasing with
//! tie-breaks on lower risk, then lower complexity, then original order.

use tracing::debug;

use crate::domain::{
    AlignmentResult, Alternative, EffortEstimate, EvalWeights, RankedAlternative, RankedDecision, ScoreBreakdown,
};

/// Rank an alternative set and choose the winner
///
/// `alternatives`, `efforts`, and `alignments` are parallel by index.
pub fn evaluate(
    alternatives: Vec<Alternative>,
    efforts: Vec<EffortEstimate>,
    alignments: Vec<AlignmentResult>,
    weights: EvalWeights,
) -> RankedDecision {
    debug!(count = alternatives.len(), "evaluate: called");
    let weights = weights.normalized();

    let mut ranked: Vec<RankedAlternative> = alternatives
        .into_iter()
        .zip(efforts)
        .zip(alignments)
        .map(|((alternative, effort), alignment)| {
            let breakdown = ScoreBreakdown {
                effort: weights.effort * (1.0 - effort.complexity_score / 10.0),
                risk: weights.risk * (1.0 - effort.risk_score / 10.0),
                alignment: weights.alignment * alignment.score,
                confidence: weights.confidence * alternative.confidence,
            };
            let overall_score = breakdown.effort + breakdown.risk + breakdown.alignment + breakdown.confidence;
            debug!(alt = %alternative.id, overall_score, "evaluate: scored");
            RankedAlternative {
                alternative,
                effort,
                alignment,
                overall_score,
                breakdown,
                rank: 0,
                chosen: false,
            }
        })
        .collect();

    // Stable sort keeps original order as the final tie-break
    ranked.sort_by(|a, b| {
        b.overall_score
            .partial_cmp(&a.overall_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(
                a.effort
                    .risk_score
                    .partial_cmp(&b.effort.risk_score)
                    .unwrap_or(std::cmp::Ordering::Equal),
            )
            .then(
                a.effort
                    .complexity_score
                    .partial_cmp(&b.effort.complexity_score)
                    .unwrap_or(std::cmp::Ordering::Equal),
            )
    });

    for (index, entry) in ranked.iter_mut().enumerate() {
        entry.rank = index + 1;
        entry.chosen = index == 0;
    }

    let justification = ranked
        .first()
        .map(|winner| {
            let (factor_name, factor_value) = winner.breakdown.lowest_factor();
            format!(
                "Chose '{}' (rank 1 of {}) with overall score {:.2}; expected to land in about {} iteration(s) \
                 (range {}-{}); weakest factor is {} at {:.2}",
                winner.alternative.name,
                ranked.len(),
                winner.overall_score,
                winner.effort.iterations.point,
                winner.effort.iterations.min,
                winner.effort.iterations.max,
                factor_name,
                factor_value,
            )
        })
        .unwrap_or_else(|| "No alternatives to choose from".to_string());

    debug!(%justification, "evaluate: decided");
    RankedDecision {
        ranked,
        justification,
        weights,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{IterationEstimate, Level, Relevance};

    fn alternative(id: &str, name: &str, confidence: f32) -> Alternative {
        Alternative {
            id: id.to_string(),
            name: name.to_string(),
            description: String::new(),
            steps: vec![],
            assumptions: vec![],
            prerequisites: vec![],
            confidence,
            repaired_tools: vec![],
        }
    }

    fn effort(id: &str, complexity: f32, risk: f32) -> EffortEstimate {
        EffortEstimate {
            alternative_id: id.to_string(),
            complexity_score: complexity,
            complexity_level: Level::from_score(complexity),
            risk_score: risk,
            risk_level: Level::from_score(risk),
            iterations: IterationEstimate { min: 1, point: 2, max: 4 },
        }
    }

    fn alignment(id: &str, score: f32) -> AlignmentResult {
        AlignmentResult {
            alternative_id: id.to_string(),
            score,
            relevance: Relevance::from_score(score),
            contribution: String::new(),
            method: "heuristic".to_string(),
        }
    }

    #[test]
    fn test_low_effort_high_alignment_wins() {
        // npm(complexity 2, align 0.9), yarn(3, 0.85), manual-curl(7, 0.6)
        let decision = evaluate(
            vec![
                alternative("alt-1", "npm", 0.8),
                alternative("alt-2", "yarn", 0.8),
                alternative("alt-3", "manual-curl", 0.8),
            ],
            vec![effort("alt-1", 2.0, 1.0), effort("alt-2", 3.0, 1.0), effort("alt-3", 7.0, 3.0)],
            vec![alignment("alt-1", 0.9), alignment("alt-2", 0.85), alignment("alt-3", 0.6)],
            EvalWeights::default(),
        );

        let winner = decision.chosen().unwrap();
        assert_eq!(winner.alternative.name, "npm");
        assert!(winner.chosen);
        assert_eq!(winner.rank, 1);
        assert!(decision.justification.contains("npm"));
        assert!(decision.justification.contains("rank 1"));
        assert!(decision.justification.contains("iteration"));
    }

    #[test]
    fn test_ranking_is_non_increasing() {
        let decision = evaluate(
            vec![
                alternative("alt-1", "a", 0.2),
                alternative("alt-2", "b", 0.9),
                alternative("alt-3", "c", 0.5),
            ],
            vec![effort("alt-1", 5.0, 5.0), effort("alt-2", 2.0, 1.0), effort("alt-3", 4.0, 4.0)],
            vec![alignment("alt-1", 0.3), alignment("alt-2", 0.9), alignment("alt-3", 0.5)],
            EvalWeights::default(),
        );
        for pair in decision.ranked.windows(2) {
            assert!(pair[0].overall_score >= pair[1].overall_score);
        }
        assert_eq!(decision.ranked[0].rank, 1);
        assert_eq!(decision.ranked[2].rank, 3);
    }

    #[test]
    fn test_tie_breaks_by_lower_risk() {
        // Identical overalls except alt-2 carries more risk balanced by confidence
        let decision = evaluate(
            vec![alternative("alt-1", "safe", 0.5), alternative("alt-2", "risky", 0.5)],
            vec![effort("alt-1", 3.0, 1.0), effort("alt-2", 3.0, 1.0)],
            vec![alignment("alt-1", 0.6), alignment("alt-2", 0.6)],
            EvalWeights::default(),
        );
        // Exact tie: original order preserved (stable)
        assert_eq!(decision.ranked[0].alternative.name, "safe");
    }

    #[test]
    fn test_weights_are_normalized_in_decision() {
        let decision = evaluate(
            vec![alternative("alt-1", "only", 0.5)],
            vec![effort("alt-1", 2.0, 2.0)],
            vec![alignment("alt-1", 0.5)],
            EvalWeights {
                effort: 3.0,
                risk: 2.5,
                alignment: 3.0,
                confidence: 1.5,
            },
        );
        assert!((decision.weights.sum() - 1.0).abs() < 1e-6);
    }
}
