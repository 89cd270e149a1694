//! Recovery planner - category to ranked executable strategies
//!
//! Every strategy's steps run through the normal tool executor; nothing
//! here bypasses the plan machinery. Initial confidences are heuristic;
//! the pattern learner adjusts them from history.

use serde_json::json;
use tracing::debug;

use crate::domain::{Diagnosis, ErrorCategory, PlanStep, RecoveryPlan, RecoveryStrategy};

/// Build a recovery plan for a diagnosed failure
pub fn plan_recovery(diagnosis: &Diagnosis, failing_command: Option<&str>) -> RecoveryPlan {
    debug!(category = %diagnosis.category, "plan_recovery: called");
    let (primary, fallbacks) = strategies_for(diagnosis.category, failing_command);
    RecoveryPlan {
        category: diagnosis.category,
        primary,
        fallbacks,
        historical_success_rate: None,
    }
}

/// The curated strategy table
fn strategies_for(category: ErrorCategory, failing_command: Option<&str>) -> (RecoveryStrategy, Vec<RecoveryStrategy>) {
    let command = failing_command.unwrap_or("");
    match category {
        ErrorCategory::CommandNotFound | ErrorCategory::DependencyMissing => {
            let program = missing_program(command).unwrap_or_else(|| "the missing program".to_string());
            let primary = RecoveryStrategy::new("install-dependency", 0.65)
                .with_step(PlanStep::new(
                    "run_bash",
                    json!({"command": "command -v apt-get && echo apt || command -v apk && echo apk || command -v brew && echo brew || echo none"}),
                    "detect the available package manager",
                ))
                .with_step(PlanStep::new(
                    "run_bash",
                    json!({"command": format!("apt-get install -y {prog} 2>/dev/null || apk add {prog} 2>/dev/null || brew install {prog}", prog = program)}),
                    format!("install {}", program),
                ))
                .with_step(
                    PlanStep::new(
                        "run_bash",
                        json!({"command": format!("command -v {}", program)}),
                        "confirm the program is now on PATH",
                    )
                    .with_expected_outcome("path of the installed program"),
                );
            let fallbacks = vec![
                RecoveryStrategy::new("use-alternative-command", 0.45).with_step(PlanStep::new(
                    "echo",
                    json!({"message": "identify an equivalent command already present in the workspace"}),
                    "note the substitution to try",
                )),
                RecoveryStrategy::new("check-path", 0.35).with_step(PlanStep::new(
                    "run_bash",
                    json!({"command": "echo $PATH && ls /usr/local/bin /usr/bin 2>/dev/null | head -50"}),
                    "inspect PATH for a misplaced binary",
                )),
            ];
            (primary, fallbacks)
        }
        ErrorCategory::FileNotFound => {
            let primary = RecoveryStrategy::new("locate-missing-file", 0.6)
                .with_step(PlanStep::new("read_dir", json!({"path": "."}), "list the workspace root"))
                .with_step(PlanStep::new(
                    "run_bash",
                    json!({"command": "find . -maxdepth 3 -type f | head -50"}),
                    "search nearby for the expected file",
                ));
            let fallbacks = vec![RecoveryStrategy::new("create-missing-file", 0.4).with_step(PlanStep::new(
                "echo",
                json!({"message": "create the file from known content before retrying"}),
                "note the creation step",
            ))];
            (primary, fallbacks)
        }
        ErrorCategory::PermissionDenied => {
            let primary = RecoveryStrategy::new("use-workspace-path", 0.65).with_step(PlanStep::new(
                "echo",
                json!({"message": "rewrite the step to target a path inside the workspace"}),
                "plan the path substitution",
            ));
            let fallbacks = vec![RecoveryStrategy::new("inspect-permissions", 0.35).with_step(PlanStep::new(
                "run_bash",
                json!({"command": "ls -la ."}),
                "inspect workspace permissions",
            ))];
            (primary, fallbacks)
        }
        ErrorCategory::Timeout => {
            let primary = RecoveryStrategy::new("retry-with-longer-timeout", 0.6).with_step(
                PlanStep::new(
                    "run_bash",
                    json!({"command": command, "timeout_ms": 120_000}),
                    "retry the command with a larger budget",
                )
                .with_error_handling("abort"),
            );
            let fallbacks = vec![RecoveryStrategy::new("split-into-smaller-steps", 0.45).with_step(PlanStep::new(
                "echo",
                json!({"message": "break the operation into smaller pieces"}),
                "note the decomposition",
            ))];
            (primary, fallbacks)
        }
        ErrorCategory::Network | ErrorCategory::RateLimit | ErrorCategory::ResourceBusy => {
            let primary = RecoveryStrategy::new("wait-and-retry", 0.6)
                .with_step(PlanStep::new("run_bash", json!({"command": "sleep 5"}), "back off briefly"))
                .with_step(PlanStep::new("run_bash", json!({"command": command}), "retry the failed command"));
            let fallbacks = vec![RecoveryStrategy::new("check-connectivity", 0.35).with_step(PlanStep::new(
                "run_bash",
                json!({"command": "ping -c 1 -W 2 1.1.1.1 || echo offline"}),
                "probe basic connectivity",
            ))];
            (primary, fallbacks)
        }
        ErrorCategory::ToolNotFound => {
            let primary = RecoveryStrategy::new("replan-with-registered-tools", 0.7).with_step(PlanStep::new(
                "echo",
                json!({"message": "re-plan using only tools from the registry"}),
                "note the re-planning constraint",
            ));
            (primary, vec![])
        }
        ErrorCategory::InvalidArgs => {
            let primary = RecoveryStrategy::new("fix-arguments", 0.6).with_step(PlanStep::new(
                "echo",
                json!({"message": "rebuild the step arguments against the tool schema"}),
                "note the argument fix",
            ));
            (primary, vec![])
        }
        ErrorCategory::Syntax => {
            let primary = RecoveryStrategy::new("fix-syntax", 0.55).with_step(PlanStep::new(
                "run_bash",
                json!({"command": command}),
                "re-run to capture the parse error location",
            ));
            (primary, vec![])
        }
        ErrorCategory::OutOfMemory => {
            let primary = RecoveryStrategy::new("chunk-the-work", 0.5).with_step(PlanStep::new(
                "echo",
                json!({"message": "process the input in smaller chunks"}),
                "note the chunking approach",
            ));
            (primary, vec![])
        }
        ErrorCategory::Auth => {
            let primary = RecoveryStrategy::new("use-unauthenticated-alternative", 0.4).with_step(PlanStep::new(
                "echo",
                json!({"message": "switch to a public endpoint or surface the credential need"}),
                "note the alternative",
            ));
            (primary, vec![])
        }
        ErrorCategory::Unknown => {
            let primary = RecoveryStrategy::new("minimal-diagnostic", 0.35)
                .with_step(PlanStep::new("run_bash", json!({"command": "pwd && ls -la"}), "probe the workspace state"))
                .with_step(PlanStep::new("echo", json!({"message": "gathering more signal"}), "note the probe"));
            (primary, vec![])
        }
    }
}

/// Guess the missing program name from a failing shell command
fn missing_program(command: &str) -> Option<String> {
    let first = command.split_whitespace().next()?;
    if first.is_empty() {
        None
    } else {
        Some(first.to_string())
    }
}
