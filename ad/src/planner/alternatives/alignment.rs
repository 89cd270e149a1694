//! Alignment checking for alternatives
//!
//! Rates how much an alternative contributes to the task goal, either by
//! an LLM rating or by the heuristic: keyword overlap with the goal,
//! action-verb matching, and a bonus for satisfied prerequisites.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::domain::{AlignmentResult, Alternative, Relevance};
use crate::llm::{ChatRequest, LlmClient, Message};

/// Action verbs that signal the alternative does what the goal asks
const ACTION_VERBS: [&str; 14] = [
    "install", "clone", "build", "test", "run", "create", "write", "read", "fix", "refactor", "document", "fetch",
    "list", "analyze",
];

/// Checks alignment, via LLM when available
pub struct AlignmentChecker {
    llm: Option<Arc<dyn LlmClient>>,
}

impl AlignmentChecker {
    /// Heuristic-only checker
    pub fn heuristic() -> Self {
        debug!("AlignmentChecker::heuristic: called");
        Self { llm: None }
    }

    /// LLM-backed checker with heuristic fallback
    pub fn with_llm(llm: Arc<dyn LlmClient>) -> Self {
        debug!("AlignmentChecker::with_llm: called");
        Self { llm: Some(llm) }
    }

    /// Rate one alternative against the goal
    pub async fn check(&self, goal: &str, alternative: &Alternative) -> AlignmentResult {
        debug!(alt = %alternative.id, "AlignmentChecker::check: called");
        if let Some(llm) = &self.llm {
            match self.check_with_llm(llm, goal, alternative).await {
                Some(result) => return result,
                None => {
                    warn!(alt = %alternative.id, "AlignmentChecker::check: LLM rating failed, using heuristic");
                }
            }
        }
        heuristic_alignment(goal, alternative)
    }

    async fn check_with_llm(
        &self,
        llm: &Arc<dyn LlmClient>,
        goal: &str,
        alternative: &Alternative,
    ) -> Option<AlignmentResult> {
        let prompt = format!(
            "Goal: {}\nApproach: {} - {}\nSteps:\n{}\n\n\
             Rate how much this approach contributes to the goal as JSON: \
             {{\"score\": 0.0 to 1.0, \"contribution\": \"one sentence\"}}",
            goal,
            alternative.name,
            alternative.description,
            alternative
                .steps
                .iter()
                .map(|s| format!("- {} ({})", s.description, s.tool))
                .collect::<Vec<_>>()
                .join("\n"),
        );

        let request = ChatRequest::new("You rate goal alignment for an autonomous agent. Be strict.")
            .with_message(Message::user(prompt))
            .expecting_json()
            .with_max_tokens(256);

        let response = llm.chat(request).await.ok()?;
        let value = response.output.as_json()?;
        let score = (value.get("score")?.as_f64()? as f32).clamp(0.0, 1.0);

        Some(AlignmentResult {
            alternative_id: alternative.id.clone(),
            score,
            relevance: Relevance::from_score(score),
            contribution: value.get("contribution").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
            method: "llm".to_string(),
        })
    }
}

/// The heuristic rating
pub fn heuristic_alignment(goal: &str, alternative: &Alternative) -> AlignmentResult {
    debug!(alt = %alternative.id, "heuristic_alignment: called");
    let goal_terms = terms(goal);
    let alt_text = format!(
        "{} {} {}",
        alternative.name,
        alternative.description,
        alternative.steps.iter().map(|s| s.description.as_str()).collect::<Vec<_>>().join(" ")
    );
    let alt_terms = terms(&alt_text);

    // Keyword overlap: what fraction of the goal's terms the approach mentions
    let overlap = if goal_terms.is_empty() {
        0.0
    } else {
        goal_terms.intersection(&alt_terms).count() as f32 / goal_terms.len() as f32
    };

    // Action-verb match: goal and approach share a verb of intent
    let verb_match = ACTION_VERBS
        .iter()
        .any(|verb| goal_terms.contains(*verb) && alt_terms.contains(*verb));

    // Prerequisite bonus: approaches that declare no unmet prerequisites
    let prerequisite_bonus = if alternative.prerequisites.is_empty() { 0.1 } else { 0.0 };

    let score = (overlap * 0.6 + if verb_match { 0.3 } else { 0.0 } + prerequisite_bonus).clamp(0.0, 1.0);

    let contribution = if score >= 0.7 {
        format!("Directly advances the goal via {}", alternative.name)
    } else if score >= 0.4 {
        format!("Partially advances the goal via {}", alternative.name)
    } else {
        format!("Weak connection between {} and the goal", alternative.name)
    };

    AlignmentResult {
        alternative_id: alternative.id.clone(),
        score,
        relevance: Relevance::from_score(score),
        contribution,
        method: "heuristic".to_string(),
    }
}

fn terms(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() >= 3)
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::AlternativeStep;
    use crate::llm::ChatResponse;
    use crate::llm::client::mock::MockLlmClient;

    fn alternative(name: &str, description: &str) -> Alternative {
        Alternative {
            id: "alt-1".to_string(),
            name: name.to_string(),
            description: description.to_string(),
            steps: vec![AlternativeStep {
                tool: "run_bash".to_string(),
                args: serde_json::json!({}),
                description: description.to_string(),
                expected_outcome: String::new(),
            }],
            assumptions: vec![],
            prerequisites: vec![],
            confidence: 0.5,
            repaired_tools: vec![],
        }
    }

    #[test]
    fn test_matching_alternative_scores_high() {
        let result = heuristic_alignment(
            "install dependencies with npm",
            &alternative("npm-install", "install the project dependencies with npm install"),
        );
        assert!(result.score >= 0.7, "score was {}", result.score);
        assert_eq!(result.relevance, Relevance::High);
        assert_eq!(result.method, "heuristic");
    }

    #[test]
    fn test_unrelated_alternative_scores_low() {
        let result = heuristic_alignment(
            "install dependencies with npm",
            &alternative("curl-manual", "manually download archives over curl"),
        );
        assert!(result.score < 0.4, "score was {}", result.score);
        assert_eq!(result.relevance, Relevance::Low);
    }

    #[tokio::test]
    async fn test_llm_rating() {
        let llm = Arc::new(MockLlmClient::new(vec![ChatResponse::json(
            serde_json::json!({"score": 0.9, "contribution": "installs exactly what the goal asks"}),
        )]));
        let checker = AlignmentChecker::with_llm(llm);
        let result = checker.check("install dependencies", &alternative("npm", "npm install")).await;
        assert_eq!(result.method, "llm");
        assert!((result.score - 0.9).abs() < 1e-6);
        assert_eq!(result.relevance, Relevance::High);
    }

    #[tokio::test]
    async fn test_llm_failure_falls_back() {
        let llm = Arc::new(MockLlmClient::new(vec![]));
        let checker = AlignmentChecker::with_llm(llm);
        let result = checker.check("install dependencies", &alternative("npm", "install dependencies")).await;
        assert_eq!(result.method, "heuristic");
    }
}
