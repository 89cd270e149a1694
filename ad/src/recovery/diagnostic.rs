//! Diagnostic reflector - layered why-chains for failures
//!
//! Produces a five-layer "why" chain from proximate cause to root, plus
//! the machine-friendly summary the recovery planner consumes. The LLM
//! path and the rule table produce the same shape; the rule table is
//! also the fallback when the LLM is unavailable or returns garbage.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::domain::{Diagnosis, ErrorCategory, RawError, RootCause};
use crate::llm::{ChatRequest, LlmClient, Message};

/// Produces diagnoses, via LLM when available
pub struct DiagnosticReflector {
    llm: Option<Arc<dyn LlmClient>>,
}

impl DiagnosticReflector {
    /// Rule-table-only reflector
    pub fn heuristic() -> Self {
        debug!("DiagnosticReflector::heuristic: called");
        Self { llm: None }
    }

    /// LLM-backed reflector with rule-table fallback
    pub fn with_llm(llm: Arc<dyn LlmClient>) -> Self {
        debug!("DiagnosticReflector::with_llm: called");
        Self { llm: Some(llm) }
    }

    /// Diagnose one classified failure
    pub async fn diagnose(
        &self,
        tool: Option<&str>,
        error: &RawError,
        category: ErrorCategory,
        recent_context: &str,
    ) -> Diagnosis {
        debug!(?tool, %category, "DiagnosticReflector::diagnose: called");
        if let Some(llm) = &self.llm {
            match self.diagnose_with_llm(llm, tool, error, category, recent_context).await {
                Some(diagnosis) => return diagnosis,
                None => {
                    warn!(%category, "DiagnosticReflector::diagnose: LLM diagnosis failed, using rule table");
                }
            }
        }
        rule_table_diagnosis(tool, error, category)
    }

    async fn diagnose_with_llm(
        &self,
        llm: &Arc<dyn LlmClient>,
        tool: Option<&str>,
        error: &RawError,
        category: ErrorCategory,
        recent_context: &str,
    ) -> Option<Diagnosis> {
        let prompt = format!(
            "A tool invocation failed.\n\
             Tool: {}\n\
             Error category: {}\n\
             Error message: {}\n\
             Recent context:\n{}\n\n\
             Produce a layered diagnosis as JSON: {{\"why_chain\": [up to 5 strings, proximate cause first, root cause last], \
             \"root_cause\": {{\"category\": \"<taxonomy name>\", \"description\": \"...\"}}, \
             \"suggested_direction\": \"...\"}}",
            tool.unwrap_or("unknown"),
            category,
            error.message,
            recent_context,
        );

        let request = ChatRequest::new("You diagnose tool failures for an autonomous agent. Be concrete and brief.")
            .with_message(Message::user(prompt))
            .expecting_json()
            .with_max_tokens(1024);

        let response = llm.chat(request).await.ok()?;
        let value = response.output.as_json()?;

        let why_chain: Vec<String> = value
            .get("why_chain")?
            .as_array()?
            .iter()
            .filter_map(|v| v.as_str().map(String::from))
            .take(Diagnosis::MAX_WHY_DEPTH)
            .collect();
        if why_chain.is_empty() {
            return None;
        }

        let root = value.get("root_cause")?;
        let root_category = root
            .get("category")
            .and_then(|v| v.as_str())
            .and_then(parse_category)
            .unwrap_or(category);

        Some(Diagnosis {
            category,
            root_cause: RootCause {
                category: root_category,
                description: root.get("description").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
            },
            suggested_direction: value
                .get("suggested_direction")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
            why_chain,
        })
    }
}

/// Parse a taxonomy name back to a category
fn parse_category(name: &str) -> Option<ErrorCategory> {
    serde_json::from_value(serde_json::Value::String(name.to_string())).ok()
}

/// Rule-table diagnosis: fixed five-layer chains per category
pub fn rule_table_diagnosis(tool: Option<&str>, error: &RawError, category: ErrorCategory) -> Diagnosis {
    debug!(%category, "rule_table_diagnosis: called");
    let tool = tool.unwrap_or("the tool");
    let (why_chain, root_description, direction) = match category {
        ErrorCategory::CommandNotFound => (
            vec![
                format!("{} reported the command was not found (exit 127)", tool),
                "The shell searched PATH and found no matching executable".to_string(),
                "The program the command belongs to is not installed in this workspace".to_string(),
                "The environment was provisioned without this dependency".to_string(),
                "The task assumed a tool the sandbox does not provide by default".to_string(),
            ],
            "Required program is not installed".to_string(),
            "Install the missing program via the available package manager, then retry the command".to_string(),
        ),
        ErrorCategory::PermissionDenied => (
            vec![
                format!("{} was denied access to the target path", tool),
                "The path is outside the workspace or lacks permissions".to_string(),
                "Sandbox policy confines all file operations to the workspace root".to_string(),
                "The plan referenced a path the policy can never allow".to_string(),
                "The action needs rethinking to operate on workspace-relative paths".to_string(),
            ],
            "Operation outside the permitted workspace".to_string(),
            "Rewrite the step to use a path inside the workspace".to_string(),
        ),
        ErrorCategory::FileNotFound => (
            vec![
                format!("{} could not find the target file", tool),
                "The path does not exist in the workspace".to_string(),
                "A prior step expected to create it but did not, or the name is wrong".to_string(),
                "The plan assumed workspace state that was never established".to_string(),
                "Prerequisite steps were missing from the plan".to_string(),
            ],
            "Expected file does not exist".to_string(),
            "List the directory to locate the right path, or create the file first".to_string(),
        ),
        ErrorCategory::Timeout => (
            vec![
                format!("{} did not finish within its deadline", tool),
                "The operation ran longer than the step timeout".to_string(),
                "The workload is larger or slower than the plan assumed".to_string(),
                "No intermediate checkpoint bounds the operation's size".to_string(),
                "The step needs a longer budget or a smaller scope".to_string(),
            ],
            "Operation exceeded its time budget".to_string(),
            "Retry with a longer timeout or split the operation into smaller steps".to_string(),
        ),
        ErrorCategory::ToolNotFound => (
            vec![
                "The invocation named a tool outside the registry".to_string(),
                "The plan referenced a capability this executor does not provide".to_string(),
                "Planning listed tools from assumptions instead of the registry".to_string(),
                "The generator hallucinated a tool name".to_string(),
                "Plans must be constrained to the enumerated tool set".to_string(),
            ],
            "Plan referenced an unregistered tool".to_string(),
            "Re-plan using only the registered tools".to_string(),
        ),
        ErrorCategory::Network => (
            vec![
                format!("{} failed to reach the remote host", tool),
                "The connection was refused, reset, or never established".to_string(),
                "The host is down, unreachable, or the address is wrong".to_string(),
                "Network access from the sandbox may be restricted".to_string(),
                "The step depends on external availability the plan cannot control".to_string(),
            ],
            "Remote endpoint unreachable".to_string(),
            "Verify the address and retry with backoff".to_string(),
        ),
        ErrorCategory::Auth => (
            vec![
                format!("{} was rejected with an authorization error", tool),
                "The request lacked valid credentials".to_string(),
                "No credential for this endpoint is configured in the environment".to_string(),
                "The task requires access that was never granted".to_string(),
                "Credentials must be provisioned outside the session".to_string(),
            ],
            "Missing or invalid credentials".to_string(),
            "Use an unauthenticated alternative or surface the credential need".to_string(),
        ),
        ErrorCategory::ResourceBusy => (
            vec![
                format!("{} found the resource locked or busy", tool),
                "Another process holds the resource".to_string(),
                "Concurrent activity contends for the same file or lock".to_string(),
                "The plan did not serialize access to the shared resource".to_string(),
                "Waiting and retrying usually clears transient contention".to_string(),
            ],
            "Resource held by another process".to_string(),
            "Wait briefly and retry the operation".to_string(),
        ),
        ErrorCategory::OutOfMemory => (
            vec![
                format!("{} failed allocating memory", tool),
                "The operation's working set exceeded available memory".to_string(),
                "The input is larger than the plan assumed".to_string(),
                "Nothing bounds the operation's memory footprint".to_string(),
                "The work needs chunking into smaller pieces".to_string(),
            ],
            "Operation exceeded available memory".to_string(),
            "Process the input in smaller chunks".to_string(),
        ),
        ErrorCategory::RateLimit => (
            vec![
                format!("{} was throttled by the remote service", tool),
                "Requests exceeded the service's rate limit".to_string(),
                "The plan issued requests faster than the quota allows".to_string(),
                "No pacing was built into the step sequence".to_string(),
                "Backoff then retry respects the quota".to_string(),
            ],
            "Remote rate limit exceeded".to_string(),
            "Wait for the limit window and retry".to_string(),
        ),
        ErrorCategory::InvalidArgs => (
            vec![
                format!("{} rejected its arguments", tool),
                "The arguments failed the tool's input validation".to_string(),
                "The plan produced arguments that do not match the tool's schema".to_string(),
                "Planning did not check arguments against the declared schema".to_string(),
                "Steps must carry schema-valid arguments".to_string(),
            ],
            "Arguments do not match the tool schema".to_string(),
            "Re-plan the step with schema-valid arguments".to_string(),
        ),
        ErrorCategory::DependencyMissing => (
            vec![
                format!("{} failed importing a dependency", tool),
                "A required module or package is not installed".to_string(),
                "The project's dependencies were never installed in this workspace".to_string(),
                "Setup steps were skipped before running the code".to_string(),
                "Dependency installation must precede execution".to_string(),
            ],
            "Project dependency not installed".to_string(),
            "Install the project's dependencies, then retry".to_string(),
        ),
        ErrorCategory::Syntax => (
            vec![
                format!("{} hit a parse error", tool),
                "The source or input does not parse".to_string(),
                "A recent edit introduced invalid syntax".to_string(),
                "The change was not validated before execution".to_string(),
                "Edits need a parse check before running".to_string(),
            ],
            "Invalid syntax in source or input".to_string(),
            "Read the parse error location and fix the syntax".to_string(),
        ),
        ErrorCategory::Unknown => (
            vec![
                format!("{} failed: {}", tool, error.message),
                "The failure matches no known pattern".to_string(),
                "The error surface gives too little structure to classify".to_string(),
                "More diagnostic output is needed".to_string(),
                "A minimal probe should narrow the cause".to_string(),
            ],
            "Unclassified failure".to_string(),
            "Run a minimal diagnostic step to gather more signal".to_string(),
        ),
    };

    Diagnosis {
        category,
        why_chain,
        root_cause: RootCause {
            category,
            description: root_description,
        },
        suggested_direction: direction,
    }
}
