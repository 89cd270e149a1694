//! Alternative generation
//!
//! 3-5 candidate approaches per action. The LLM path conditions on the
//! goal, recent failures, similar episodes, and tool recommendations; a
//! heuristic rule table stands in when the LLM fails. Generated steps
//! must reference registered tools - out-of-registry references are
//! replaced with `echo` and flagged rather than rejected.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::domain::{Alternative, AlternativeStep};
use crate::llm::{ChatRequest, LlmClient, Message};

/// Minimum alternatives in a set
pub const MIN_ALTERNATIVES: usize = 3;

/// Maximum alternatives in a set
pub const MAX_ALTERNATIVES: usize = 5;

/// Diversity floor: unique tool sequences / alternatives
const MIN_DIVERSITY: f32 = 0.5;

/// Inputs to one generation pass
#[derive(Debug, Clone)]
pub struct GenerateContext {
    /// Overall task goal
    pub goal: String,

    /// The action alternatives are generated for
    pub next_action: String,

    /// Registered tool names
    pub available_tools: Vec<String>,

    /// Recent failure summaries
    pub recent_failures: Vec<String>,

    /// Summaries of the nearest past episodes
    pub similar_episodes: Vec<String>,

    /// Tool-effectiveness hints from memory
    pub tool_recommendations: Vec<String>,
}

/// How a set of alternatives was produced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationMethod {
    LlmWithHistoricalContext,
    HeuristicFallback,
}

/// A generated alternative set
#[derive(Debug, Clone)]
pub struct GeneratedSet {
    pub alternatives: Vec<Alternative>,
    pub method: GenerationMethod,
}

/// Generates alternative sets, via LLM when available
pub struct AlternativeGenerator {
    llm: Option<Arc<dyn LlmClient>>,
}

impl AlternativeGenerator {
    /// Heuristic-only generator
    pub fn heuristic() -> Self {
        debug!("AlternativeGenerator::heuristic: called");
        Self { llm: None }
    }

    /// LLM-backed generator with heuristic fallback
    pub fn with_llm(llm: Arc<dyn LlmClient>) -> Self {
        debug!("AlternativeGenerator::with_llm: called");
        Self { llm: Some(llm) }
    }

    /// Generate 3-5 alternatives for the action
    pub async fn generate(&self, ctx: &GenerateContext) -> GeneratedSet {
        debug!(action = %ctx.next_action, "AlternativeGenerator::generate: called");
        if let Some(llm) = &self.llm {
            // One retry when the set lacks diversity
            for attempt in 0..2 {
                match self.generate_with_llm(llm, ctx, attempt > 0).await {
                    Some(mut alternatives) => {
                        repair_tool_references(&mut alternatives, &ctx.available_tools);
                        if diversity(&alternatives) >= MIN_DIVERSITY {
                            debug!(count = alternatives.len(), attempt, "AlternativeGenerator::generate: LLM set accepted");
                            return GeneratedSet {
                                alternatives,
                                method: GenerationMethod::LlmWithHistoricalContext,
                            };
                        }
                        warn!(attempt, "AlternativeGenerator::generate: set lacks diversity, retrying");
                    }
                    None => {
                        warn!(attempt, "AlternativeGenerator::generate: LLM generation failed");
                        break;
                    }
                }
            }
        }

        debug!("AlternativeGenerator::generate: using heuristic fallback");
        GeneratedSet {
            alternatives: heuristic_alternatives(ctx),
            method: GenerationMethod::HeuristicFallback,
        }
    }

    async fn generate_with_llm(
        &self,
        llm: &Arc<dyn LlmClient>,
        ctx: &GenerateContext,
        ask_for_diversity: bool,
    ) -> Option<Vec<Alternative>> {
        let diversity_note = if ask_for_diversity {
            "\nThe previous set was too similar - make the approaches structurally different from each other."
        } else {
            ""
        };
        let prompt = format!(
            "Goal: {}\nNext action: {}\nAvailable tools:\n{}\nRecent failures:\n{}\nSimilar past episodes:\n{}\nTool recommendations:\n{}\n\n\
             Propose 3 to 5 distinct approaches as JSON: {{\"alternatives\": [{{\"name\": \"...\", \"description\": \"...\", \
             \"steps\": [{{\"tool\": \"...\", \"args\": {{}}, \"description\": \"...\", \"expected_outcome\": \"...\"}}], \
             \"assumptions\": [], \"prerequisites\": [], \"confidence\": 0.0}}]}}{}",
            ctx.goal,
            ctx.next_action,
            ctx.available_tools.join(", "),
            bulleted(&ctx.recent_failures),
            bulleted(&ctx.similar_episodes),
            bulleted(&ctx.tool_recommendations),
            diversity_note,
        );

        let request = ChatRequest::new("You generate alternative execution approaches for an autonomous agent. Use only the listed tools.")
            .with_message(Message::user(prompt))
            .expecting_json()
            .with_max_tokens(2048);

        let response = llm.chat(request).await.ok()?;
        let value = response.output.as_json()?;
        let raw = value.get("alternatives")?.as_array()?;

        let mut alternatives = Vec::new();
        for (index, item) in raw.iter().take(MAX_ALTERNATIVES).enumerate() {
            let steps = item
                .get("steps")
                .and_then(|s| s.as_array())
                .map(|steps| {
                    steps
                        .iter()
                        .filter_map(|step| {
                            Some(AlternativeStep {
                                tool: step.get("tool")?.as_str()?.to_string(),
                                args: step.get("args").cloned().unwrap_or(serde_json::json!({})),
                                description: step.get("description").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
                                expected_outcome: step
                                    .get("expected_outcome")
                                    .and_then(|v| v.as_str())
                                    .unwrap_or_default()
                                    .to_string(),
                            })
                        })
                        .collect::<Vec<_>>()
                })
                .unwrap_or_default();
            if steps.is_empty() {
                continue;
            }
            alternatives.push(Alternative {
                id: format!("alt-{}", index + 1),
                name: item.get("name").and_then(|v| v.as_str()).unwrap_or("unnamed").to_string(),
                description: item.get("description").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
                steps,
                assumptions: string_list(item.get("assumptions")),
                prerequisites: string_list(item.get("prerequisites")),
                confidence: (item.get("confidence").and_then(|v| v.as_f64()).unwrap_or(0.5) as f32).clamp(0.0, 1.0),
                repaired_tools: Vec::new(),
            });
        }

        if alternatives.len() >= MIN_ALTERNATIVES {
            Some(alternatives)
        } else {
            None
        }
    }
}

/// Replace out-of-registry tool references with `echo`, flagging each
pub fn repair_tool_references(alternatives: &mut [Alternative], available: &[String]) {
    for alternative in alternatives.iter_mut() {
        for step in alternative.steps.iter_mut() {
            if !available.iter().any(|t| t == &step.tool) {
                debug!(alt = %alternative.id, bad_tool = %step.tool, "repair_tool_references: replacing with echo");
                alternative.repaired_tools.push(step.tool.clone());
                step.args = serde_json::json!({
                    "message": format!("unavailable tool '{}' was requested: {}", step.tool, step.description)
                });
                step.tool = "echo".to_string();
            }
        }
    }
}

/// Unique tool sequences / alternatives
pub fn diversity(alternatives: &[Alternative]) -> f32 {
    if alternatives.is_empty() {
        return 0.0;
    }
    let unique: HashSet<String> = alternatives.iter().map(|a| a.tool_signature()).collect();
    unique.len() as f32 / alternatives.len() as f32
}

/// Curated rule table: pattern-match the action into three plausible variants
pub fn heuristic_alternatives(ctx: &GenerateContext) -> Vec<Alternative> {
    debug!(action = %ctx.next_action, "heuristic_alternatives: called");
    let action = ctx.next_action.to_lowercase();
    let has_bash = ctx.available_tools.iter().any(|t| t == "run_bash");

    // Primary: run the action's obvious command when bash exists
    let primary_tool = if has_bash { "run_bash" } else { "echo" };
    let primary_args = if has_bash {
        serde_json::json!({"command": guess_command(&action, &ctx.next_action)})
    } else {
        serde_json::json!({"message": ctx.next_action})
    };

    let mut alternatives = vec![
        Alternative {
            id: "alt-1".to_string(),
            name: "direct-command".to_string(),
            description: format!("Carry out the action directly: {}", ctx.next_action),
            steps: vec![AlternativeStep {
                tool: primary_tool.to_string(),
                args: primary_args,
                description: ctx.next_action.clone(),
                expected_outcome: "the action's primary effect".to_string(),
            }],
            assumptions: vec!["the obvious command exists in the environment".to_string()],
            prerequisites: vec![],
            confidence: 0.55,
            repaired_tools: vec![],
        },
        Alternative {
            id: "alt-2".to_string(),
            name: "inspect-first".to_string(),
            description: "Inspect the workspace before acting".to_string(),
            steps: vec![
                AlternativeStep {
                    tool: pick_tool(&ctx.available_tools, "read_dir"),
                    args: serde_json::json!({"path": "."}),
                    description: "list the workspace".to_string(),
                    expected_outcome: "current workspace contents".to_string(),
                },
                AlternativeStep {
                    tool: primary_tool.to_string(),
                    args: serde_json::json!({"command": guess_command(&action, &ctx.next_action)}),
                    description: ctx.next_action.clone(),
                    expected_outcome: "the action's primary effect".to_string(),
                },
            ],
            assumptions: vec![],
            prerequisites: vec![],
            confidence: 0.5,
            repaired_tools: vec![],
        },
        Alternative {
            id: "alt-3".to_string(),
            name: "minimal-diagnostic".to_string(),
            description: "Probe the environment with a no-op before committing".to_string(),
            steps: vec![AlternativeStep {
                tool: "echo".to_string(),
                args: serde_json::json!({"message": format!("probing before: {}", ctx.next_action)}),
                description: "minimal no-op diagnostic".to_string(),
                expected_outcome: "confirmation the loop is healthy".to_string(),
            }],
            assumptions: vec![],
            prerequisites: vec![],
            confidence: 0.3,
            repaired_tools: vec![],
        },
    ];

    repair_tool_references(&mut alternatives, &ctx.available_tools);
    alternatives
}

/// Crude action-to-command guess for the heuristic path
fn guess_command(action_lower: &str, action: &str) -> String {
    if action_lower.contains("install") && action_lower.contains("npm") {
        "npm install".to_string()
    } else if action_lower.contains("test") {
        "npm test 2>/dev/null || cargo test 2>/dev/null || make test".to_string()
    } else if action_lower.contains("clone") {
        // Pull the URL out of the action when present
        action
            .split_whitespace()
            .find(|w| w.starts_with("http"))
            .map(|url| format!("git clone {}", url))
            .unwrap_or_else(|| "git clone".to_string())
    } else {
        format!("echo {:?}", action)
    }
}

fn pick_tool(available: &[String], preferred: &str) -> String {
    if available.iter().any(|t| t == preferred) {
        preferred.to_string()
    } else {
        "echo".to_string()
    }
}

fn string_list(value: Option<&serde_json::Value>) -> Vec<String> {
    value
        .and_then(|v| v.as_array())
        .map(|arr| arr.iter().filter_map(|v| v.as_str().map(String::from)).collect())
        .unwrap_or_default()
}

fn bulleted(items: &[String]) -> String {
    if items.is_empty() {
        "(none)".to_string()
    } else {
        items.iter().map(|i| format!("- {}", i)).collect::<Vec<_>>().join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ChatResponse;
    use crate::llm::client::mock::MockLlmClient;

    fn ctx() -> GenerateContext {
        GenerateContext {
            goal: "Install dependencies".to_string(),
            next_action: "install dependencies with npm".to_string(),
            available_tools: vec!["run_bash".to_string(), "read_dir".to_string(), "echo".to_string()],
            recent_failures: vec![],
            similar_episodes: vec![],
            tool_recommendations: vec![],
        }
    }

    fn llm_set(names_and_tools: &[(&str, &str)]) -> serde_json::Value {
        serde_json::json!({
            "alternatives": names_and_tools.iter().map(|(name, tool)| serde_json::json!({
                "name": name,
                "description": format!("use {}", name),
                "steps": [{"tool": tool, "args": {"command": "x"}, "description": "step", "expected_outcome": "done"}],
                "assumptions": [],
                "prerequisites": [],
                "confidence": 0.8,
            })).collect::<Vec<_>>(),
        })
    }

    #[tokio::test]
    async fn test_heuristic_fallback_yields_three() {
        let generator = AlternativeGenerator::heuristic();
        let set = generator.generate(&ctx()).await;
        assert_eq!(set.method, GenerationMethod::HeuristicFallback);
        assert!(set.alternatives.len() >= MIN_ALTERNATIVES);
        for alternative in &set.alternatives {
            assert!(!alternative.steps.is_empty());
        }
    }

    #[tokio::test]
    async fn test_llm_generation() {
        let llm = Arc::new(MockLlmClient::new(vec![ChatResponse::json(llm_set(&[
            ("npm", "run_bash"),
            ("inspect", "read_dir"),
            ("noop", "echo"),
        ]))]));
        let generator = AlternativeGenerator::with_llm(llm);
        let set = generator.generate(&ctx()).await;
        assert_eq!(set.method, GenerationMethod::LlmWithHistoricalContext);
        assert_eq!(set.alternatives.len(), 3);
        assert_eq!(set.alternatives[0].id, "alt-1");
    }

    #[tokio::test]
    async fn test_invalid_tool_replaced_with_echo() {
        let llm = Arc::new(MockLlmClient::new(vec![ChatResponse::json(llm_set(&[
            ("magic", "teleport"),
            ("inspect", "read_dir"),
            ("bash", "run_bash"),
        ]))]));
        let generator = AlternativeGenerator::with_llm(llm);
        let set = generator.generate(&ctx()).await;
        let magic = &set.alternatives[0];
        assert_eq!(magic.steps[0].tool, "echo");
        assert_eq!(magic.repaired_tools, vec!["teleport".to_string()]);
    }

    #[tokio::test]
    async fn test_low_diversity_retries_once() {
        // First set: all identical signatures; second set: diverse
        let llm = Arc::new(MockLlmClient::new(vec![
            ChatResponse::json(llm_set(&[("a", "run_bash"), ("b", "run_bash"), ("c", "run_bash"), ("d", "run_bash")])),
            ChatResponse::json(llm_set(&[("a", "run_bash"), ("b", "read_dir"), ("c", "echo")])),
        ]));
        let generator = AlternativeGenerator::with_llm(llm.clone());
        let set = generator.generate(&ctx()).await;
        assert_eq!(set.method, GenerationMethod::LlmWithHistoricalContext);
        assert_eq!(llm.call_count(), 2);
        assert!(diversity(&set.alternatives) >= MIN_DIVERSITY);
    }

    #[test]
    fn test_diversity_metric() {
        let ctx = ctx();
        let alternatives = heuristic_alternatives(&ctx);
        assert!(diversity(&alternatives) > 0.5);
        assert_eq!(diversity(&[]), 0.0);
    }
}
