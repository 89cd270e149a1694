//! SessionEngine - drives one task to a terminal outcome
//!
//! Per-iteration sequence: heartbeat, reflection, meta-reflection of the
//! previous iteration, planning (direct or via alternatives), confidence
//! check with checkpoint suspension, step execution, verification,
//! outcome binding, diagnosis and recovery on failure, planning
//! feedback, stuck detection, persistence. Cancellation is honored at
//! every step boundary; clarification pauses the session without
//! terminating it.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, info, warn};

use agentmemory::{EpisodeDraft, MemoryStores, RecoveryCounts, RecoveryOutcome, SearchOptions, SessionMemoryRecord};

use crate::checkpoint::{CheckpointManager, CheckpointWait};
use crate::config::Config;
use crate::domain::{
    ActionHistoryEntry, Artifact, Assessment, Checkpoint, CheckpointOption, DecisionType, ErrorCategory, FailureInfo,
    InstructionPlan, PlanStep, RawError, RecoveryStrategy, Reflection, RiskLevel, Session, SessionOutcome,
};
use crate::events::{Actor, ContextEvent, ContextLog};
use crate::llm::{ChatRequest, LlmClient, Message, TokenUsage};
use crate::meta::{
    Calibrator, ConfidenceFactors, MetaReflectionTrack, ObservedOutcome, score_confidence, score_planning,
    score_reflection,
};
use crate::planner::{
    AlternativePlanner, EffortContext, GenerateContext, GenerationMethod, PlanContext, TaskPlanner, decision_to_plan,
};
use crate::progress::ProgressTracker;
use crate::prompts;
use crate::recovery::{DiagnosticReflector, MAX_RECOVERY_CYCLES_PER_ITERATION, PatternLearner, classify, plan_recovery};
use crate::taskgen::{AutoApprovalPolicy, TaskGenManager};
use crate::tools::{ToolContext, ToolExecutor, ToolInvocation, ToolResult};

/// Retries for a failed reflection request (beyond the first attempt)
const REFLECTION_RETRIES: u32 = 2;

/// Base backoff between reflection retries
const REFLECTION_BACKOFF: Duration = Duration::from_millis(250);

/// Word-overlap ratio above which two actions count as near-identical
const DUPLICATE_OVERLAP: f32 = 0.8;

/// Hard errors the engine surfaces from `run`
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Session aborted by external cancellation")]
    Aborted,

    #[error("LLM unavailable during reflection: {0}")]
    LlmUnavailable(String),
}

/// Terminal summary handed back to the caller
#[derive(Debug, Clone, serde::Serialize)]
pub struct SessionReport {
    pub session_id: String,
    pub outcome: SessionOutcome,
    pub reason: Option<String>,
    pub iterations: u32,
    pub progress: f32,
    pub artifacts: Vec<Artifact>,
    pub summary: String,
    /// Last three next-actions, for stuck reports
    pub last_actions: Vec<String>,
    /// Error categories seen, for stuck reports
    pub failure_categories: Vec<String>,
    /// Open questions, when paused for clarification
    pub questions: Vec<String>,
}

/// What one iteration told the loop to do next
enum IterationFlow {
    Continue,
    Terminal,
    Paused,
}

/// Result of executing a plan
struct ExecutionSummary {
    steps_total: usize,
    steps_succeeded: usize,
    tools_used: Vec<String>,
    artifacts: Vec<Artifact>,
    outputs: Vec<String>,
    /// First unhandled failure: (raw error, failing shell command if any)
    failure: Option<(RawError, Option<String>)>,
    cancelled: bool,
}

impl ExecutionSummary {
    fn succeeded(&self) -> bool {
        self.failure.is_none() && !self.cancelled
    }
}

/// Drives one session
pub struct SessionEngine {
    session: Session,
    config: Config,
    llm: Arc<dyn LlmClient>,
    tools: Arc<ToolExecutor>,
    memory: Arc<MemoryStores>,
    progress: ProgressTracker,
    log: Arc<ContextLog>,
    checkpoints: Arc<CheckpointManager>,
    task_planner: TaskPlanner,
    alternative_planner: AlternativePlanner,
    diagnostic: DiagnosticReflector,
    taskgen: Arc<TaskGenManager>,
    meta_track: MetaReflectionTrack,
    calibrator: Calibrator,
    workspace: PathBuf,
    cancel: Arc<AtomicBool>,

    /// Reflection and observed outcome of the previous iteration
    previous: Option<(Reflection, ObservedOutcome)>,

    /// Recovery plan scheduled for the next iteration (skips reflection once)
    pending_recovery: Option<(InstructionPlan, ErrorCategory, String)>,

    /// Consecutive stuck iterations
    stuck_iterations: u32,

    /// Whether the one-shot different-approach override already fired
    forced_different_used: bool,

    /// Force the next planning pass onto a different approach
    force_different_next: bool,

    /// Consecutive recoveries on the same category
    recovery_streak: Option<(ErrorCategory, u32)>,

    /// The recovery this iteration is executing, for outcome binding
    executing_recovery: Option<(ErrorCategory, String)>,

    /// Hashes of (tool, args, result) observations already seen;
    /// repeats do not count as state changes
    seen_observations: std::collections::HashSet<u64>,

    /// Recovery pipeline runs in the current iteration
    recovery_cycles_this_iteration: u32,

    recoveries_attempted: u32,
    recoveries_succeeded: u32,
    repetitive_actions_seen: bool,
    episode_written: bool,
    terminal_reason: Option<String>,

    /// Clarification delivered while paused, consumed on resume
    clarification: Option<String>,

    token_usage_total: TokenUsage,
}

impl SessionEngine {
    /// Create an engine for one task
    pub fn new(
        task: impl Into<String>,
        config: Config,
        llm: Arc<dyn LlmClient>,
        memory: Arc<MemoryStores>,
        workspace: PathBuf,
    ) -> std::io::Result<Self> {
        let session = Session::new(task, config.max_iterations, config.stuck_threshold);
        debug!(session_id = %session.id, task_type = %session.task_type, "SessionEngine::new: called");

        let events_dir = workspace.join(".agentdaemon").join("events");
        let log = Arc::new(ContextLog::new(events_dir, session.id.clone())?);
        let checkpoints = Arc::new(CheckpointManager::new(memory.clone()));

        let task_planner = TaskPlanner::with_llm(llm.clone())
            .with_timeout(Duration::from_millis(config.planning.timeout_ms))
            .with_cache_ttl(Duration::from_secs(config.planning.cache_ttl_secs))
            .with_toggles(config.planning.fallback_enabled, config.planning.cache_enabled);

        let taskgen = Arc::new(
            TaskGenManager::new(
                session.id.clone(),
                AutoApprovalPolicy {
                    enabled: config.taskgen.auto_approve_enabled,
                    min_confidence: config.taskgen.auto_approve_min_confidence,
                    trusted_analyzers: config.taskgen.trusted_analyzers.clone(),
                },
            )
            .with_log(log.clone())
            .with_batch_max(config.taskgen.batch_max),
        );

        Ok(Self {
            progress: ProgressTracker::new(config.stuck_threshold),
            alternative_planner: AlternativePlanner::with_llm(llm.clone()),
            diagnostic: DiagnosticReflector::with_llm(llm.clone()),
            taskgen,
            task_planner,
            meta_track: MetaReflectionTrack::default(),
            calibrator: Calibrator::new(),
            tools: Arc::new(ToolExecutor::standard()),
            session,
            config,
            llm,
            memory,
            log,
            checkpoints,
            workspace,
            cancel: Arc::new(AtomicBool::new(false)),
            previous: None,
            pending_recovery: None,
            stuck_iterations: 0,
            forced_different_used: false,
            force_different_next: false,
            recovery_streak: None,
            executing_recovery: None,
            seen_observations: std::collections::HashSet::new(),
            recovery_cycles_this_iteration: 0,
            recoveries_attempted: 0,
            recoveries_succeeded: 0,
            repetitive_actions_seen: false,
            episode_written: false,
            terminal_reason: None,
            clarification: None,
            token_usage_total: TokenUsage::default(),
        })
    }

    /// Builder: replace the tool executor (custom registries, tests)
    pub fn with_tools(mut self, tools: ToolExecutor) -> Self {
        debug!(session_id = %self.session.id, "with_tools: called");
        self.tools = Arc::new(tools);
        self
    }

    /// Builder: share a checkpoint manager (so callers can resolve)
    pub fn with_checkpoint_manager(mut self, checkpoints: Arc<CheckpointManager>) -> Self {
        debug!(session_id = %self.session.id, "with_checkpoint_manager: called");
        self.checkpoints = checkpoints;
        self
    }

    /// The session id
    pub fn session_id(&self) -> &str {
        &self.session.id
    }

    /// The session state (read-only)
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// The context log for this session
    pub fn context_log(&self) -> Arc<ContextLog> {
        self.log.clone()
    }

    /// The checkpoint manager, so callers can resolve suspensions
    pub fn checkpoint_manager(&self) -> Arc<CheckpointManager> {
        self.checkpoints.clone()
    }

    /// Handle external code can flip to cancel the session
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        self.cancel.clone()
    }

    /// Task card manager bound to this session's telemetry
    pub fn taskgen(&self) -> Arc<TaskGenManager> {
        self.taskgen.clone()
    }

    /// Record user feedback, enforcing the rating requirement when set
    pub fn record_feedback(&self, record: agentmemory::FeedbackRecord) -> eyre::Result<()> {
        debug!(session_id = %self.session.id, id = %record.id, "record_feedback: called");
        if self.config.feedback.require_rating && record.rating.is_none() {
            eyre::bail!("feedback requires a rating");
        }
        self.memory.feedback.record(&record)?;
        Ok(())
    }

    /// Deliver a clarification while the session is paused
    pub fn provide_clarification(&mut self, text: impl Into<String>) {
        let text = text.into();
        debug!(session_id = %self.session.id, "provide_clarification: called");
        self.clarification = Some(text);
    }

    /// Run the session to a terminal outcome (or a clarification pause)
    pub async fn run(&mut self) -> Result<SessionReport, SessionError> {
        info!(
            session_id = %self.session.id,
            task_type = %self.session.task_type,
            max_iterations = self.session.max_iterations,
            "Starting session"
        );
        let started = std::time::Instant::now();

        // Resume from a clarification pause
        if self.session.outcome == SessionOutcome::NeedsClarification {
            match self.clarification.take() {
                Some(text) => self.consume_clarification(text),
                None => {
                    debug!(session_id = %self.session.id, "run: still awaiting clarification");
                    return Ok(self.report());
                }
            }
        }

        while self.session.outcome == SessionOutcome::Running {
            if self.cancel.load(Ordering::SeqCst) {
                debug!(session_id = %self.session.id, "run: cancellation observed at loop boundary");
                self.terminate(SessionOutcome::Stopped {
                    reason: "cancelled".to_string(),
                });
                self.finalize();
                return Err(SessionError::Aborted);
            }
            if let Some(budget_ms) = self.config.session_budget_ms {
                if started.elapsed() >= Duration::from_millis(budget_ms) {
                    self.terminate(SessionOutcome::Stopped {
                        reason: "session_budget_exceeded".to_string(),
                    });
                    break;
                }
            }
            if self.session.iteration >= self.session.max_iterations {
                debug!(session_id = %self.session.id, "run: max iterations reached");
                self.terminate(SessionOutcome::Stopped {
                    reason: "max_iterations_reached".to_string(),
                });
                break;
            }

            self.session.iteration += 1;
            info!(
                session_id = %self.session.id,
                iteration = self.session.iteration,
                max = self.session.max_iterations,
                "Session iteration"
            );

            match self.run_iteration().await? {
                IterationFlow::Continue => {}
                IterationFlow::Terminal => break,
                IterationFlow::Paused => {
                    debug!(session_id = %self.session.id, "run: paused for clarification");
                    self.emit_terminal_event();
                    return Ok(self.report());
                }
            }
        }

        self.finalize();
        Ok(self.report())
    }

    /// One pass through the iteration sequence
    async fn run_iteration(&mut self) -> Result<IterationFlow, SessionError> {
        let iteration = self.session.iteration;
        debug!(session_id = %self.session.id, iteration, "run_iteration: called");
        self.recovery_cycles_this_iteration = 0;
        let mut iteration_tokens = TokenUsage::default();

        // 1. Heartbeat
        self.progress.heartbeat(iteration, "reflect");
        self.log.emit(ContextEvent::IterationBegin {
            session_id: self.session.id.clone(),
            iteration,
        });

        // 2. Reflection - skipped once when a recovery plan is pending
        let recovery = self.pending_recovery.take();
        let reflection = match &recovery {
            Some((_, category, strategy)) => {
                debug!(session_id = %self.session.id, %strategy, "run_iteration: skipping reflection for recovery");
                Reflection {
                    iteration,
                    assessment: Assessment::Continue,
                    predicted_progress: (self.session.progress + 10.0).min(95.0),
                    confidence: self.config.recovery_threshold,
                    reasoning: format!("Executing recovery strategy '{}' for {}", strategy, category),
                    next_action: format!("recover from {} via {}", category, strategy),
                    questions: vec![],
                    degraded: false,
                }
            }
            None => self.reflect(&mut iteration_tokens).await?,
        };

        self.log.emit(ContextEvent::Reflection {
            session_id: self.session.id.clone(),
            iteration,
            assessment: reflection.assessment.as_str().to_string(),
            predicted_progress: reflection.predicted_progress,
            confidence: reflection.confidence,
            next_action: reflection.next_action.clone(),
            degraded: reflection.degraded,
        });
        self.session.push_reflection(reflection.clone());
        self.session.confidence = reflection.confidence;

        match reflection.assessment {
            Assessment::Complete => {
                debug!(session_id = %self.session.id, "run_iteration: reflection declared completion");
                self.session.progress = 100.0;
                self.push_history_entry(&reflection, &[], None, Some("task assessed complete".to_string()), true, iteration_tokens);
                self.terminate(SessionOutcome::Completed);
                return Ok(IterationFlow::Terminal);
            }
            Assessment::NeedsClarification => {
                debug!(session_id = %self.session.id, questions = reflection.questions.len(), "run_iteration: needs clarification");
                self.session.clarification_questions = reflection.questions.clone();
                self.session.outcome = SessionOutcome::NeedsClarification;
                self.terminal_reason = Some("awaiting clarification".to_string());
                return Ok(IterationFlow::Paused);
            }
            Assessment::Continue | Assessment::Stuck => {}
        }

        // 3. Meta-reflection of the previous iteration
        if let Some((prev_reflection, prev_outcome)) = self.previous.take() {
            let score = score_reflection(&prev_reflection, &prev_outcome);
            self.log.emit(ContextEvent::MetaReflection {
                session_id: self.session.id.clone(),
                iteration,
                progress_error: score.progress_error,
                confidence_error: score.confidence_error,
                assessment_correct: score.assessment_correct,
                overall_accuracy: score.overall_accuracy,
            });
            self.meta_track.push(score);
        }

        // 4. Planning
        self.progress.heartbeat(iteration, "plan");
        let force_different = self.take_force_different(&reflection);
        let (mut plan, plan_confidence_hint, plan_ctx) = match recovery {
            Some((plan, category, strategy)) => {
                self.log.emit(ContextEvent::PlanningPhase {
                    session_id: self.session.id.clone(),
                    iteration,
                    source: "recovery".to_string(),
                    step_count: plan.steps.len(),
                    fallback_used: false,
                    alternatives_considered: 0,
                });
                // Remember which recovery is executing for outcome binding
                let confidence = self.config.recovery_threshold;
                self.executing_recovery = Some((category, strategy));
                (plan, confidence, None)
            }
            None => self.plan_action(&reflection, force_different, iteration).await,
        };

        // 5. Confidence check & checkpoint
        if self.cancel.load(Ordering::SeqCst) {
            self.terminate(SessionOutcome::Stopped {
                reason: "cancelled".to_string(),
            });
            return Ok(IterationFlow::Terminal);
        }
        let decision_type = if plan.has_destructive_step() {
            DecisionType::Execution
        } else {
            DecisionType::Plan
        };
        let confidence = self.plan_confidence(decision_type, &plan, plan_confidence_hint);
        let threshold = self.effective_threshold(decision_type);
        if confidence < threshold {
            debug!(session_id = %self.session.id, confidence, threshold, "run_iteration: confidence below threshold");
            plan = self.checkpoint_and_wait(decision_type, confidence, plan).await;
        }

        // 6-7. Execution + verification
        let summary = self.execute_plan(&plan, iteration).await;
        if summary.cancelled {
            self.push_history_entry(&reflection, &summary.tools_used, None, Some("cancelled mid-plan".to_string()), false, iteration_tokens);
            self.terminate(SessionOutcome::Stopped {
                reason: "cancelled".to_string(),
            });
            return Ok(IterationFlow::Terminal);
        }
        let succeeded = summary.succeeded();
        let step_success_rate = if summary.steps_total == 0 {
            1.0
        } else {
            summary.steps_succeeded as f32 / summary.steps_total as f32
        };
        debug!(
            session_id = %self.session.id,
            succeeded,
            step_success_rate,
            "run_iteration: execution bound"
        );

        // 8. Outcome binding
        let new_artifacts = summary
            .artifacts
            .iter()
            .filter(|a| !self.session.artifacts.contains(a))
            .count();
        let actual_progress = if succeeded {
            (self.session.progress + 10.0 + 12.0 * (new_artifacts.min(3) as f32)).min(95.0)
        } else {
            (self.session.progress - 5.0).max(0.0)
        };
        let observed = ObservedOutcome {
            actual_progress,
            succeeded,
            terminal: false,
        };

        // Recovery outcome accounting for the recovery this iteration executed
        if let Some((category, strategy)) = self.executing_recovery.take() {
            self.record_recovery_outcome(category, &strategy, succeeded, iteration);
        }

        // 9. Diagnose & recover on failure
        let failure_info = if let Some((raw_error, failing_command)) = &summary.failure {
            Some(
                self.diagnose_and_recover(raw_error.clone(), failing_command.clone(), iteration)
                    .await,
            )
        } else {
            self.recovery_streak = None;
            None
        };

        // 10. Planning feedback & cache credit
        let feedback = score_planning(iteration, &plan, confidence, &summary.tools_used, succeeded);
        self.log.emit(ContextEvent::PlanningFeedback {
            session_id: self.session.id.clone(),
            iteration,
            plan_succeeded: feedback.plan_succeeded,
            tools_matched: feedback.tools_matched,
            confidence_calibration: feedback.confidence_calibration,
        });
        self.session.push_planning_feedback(feedback);
        if succeeded {
            if let Some(plan_ctx) = &plan_ctx {
                self.task_planner.record_success(plan_ctx, &plan);
            }
        }

        // 11. Stuck detection
        let flow = if self.progress.is_stuck() && self.clarification.is_none() {
            self.stuck_iterations += 1;
            debug!(session_id = %self.session.id, stuck_iterations = self.stuck_iterations, "run_iteration: stuck");
            if self.stuck_iterations >= 2 {
                self.terminate(SessionOutcome::Stuck);
                IterationFlow::Terminal
            } else {
                if !self.forced_different_used {
                    self.force_different_next = true;
                    self.forced_different_used = true;
                }
                IterationFlow::Continue
            }
        } else {
            self.stuck_iterations = 0;
            IterationFlow::Continue
        };

        // 12. Persist the iteration
        let result_summary = if succeeded {
            Some(summary.outputs.join("\n").chars().take(500).collect::<String>())
        } else {
            None
        };
        self.session.progress = actual_progress;
        self.push_history_entry_full(
            &reflection,
            &summary.tools_used,
            summary.artifacts.clone(),
            failure_info,
            result_summary,
            succeeded,
            iteration_tokens,
        );
        self.previous = Some((reflection, observed));

        Ok(flow)
    }

    /// Reflection with retries, timeout, and degraded reuse
    async fn reflect(&mut self, iteration_tokens: &mut TokenUsage) -> Result<Reflection, SessionError> {
        let iteration = self.session.iteration;
        debug!(session_id = %self.session.id, iteration, "reflect: called");
        let prompt = self.render_reflection_prompt();
        let request = ChatRequest::new(
            "You supervise an autonomous work session. Assess honestly; never claim completion without evidence.",
        )
        .with_message(Message::user(prompt))
        .expecting_json()
        .with_max_tokens(1024);

        let timeout = Duration::from_millis(self.config.reflection_timeout_ms);
        let mut last_error = String::new();

        for attempt in 0..=REFLECTION_RETRIES {
            if attempt > 0 {
                let backoff = REFLECTION_BACKOFF * 2u32.pow(attempt - 1);
                debug!(session_id = %self.session.id, attempt, ?backoff, "reflect: backing off before retry");
                tokio::time::sleep(backoff).await;
            }

            match tokio::time::timeout(timeout, self.llm.chat(request.clone())).await {
                Ok(Ok(response)) => {
                    iteration_tokens.add(response.usage);
                    self.token_usage_total.add(response.usage);
                    match response.output.as_json().and_then(|v| Reflection::from_json(iteration, v)) {
                        Some(reflection) => {
                            debug!(session_id = %self.session.id, assessment = ?reflection.assessment, "reflect: parsed");
                            return Ok(reflection);
                        }
                        None => {
                            warn!(session_id = %self.session.id, attempt, "reflect: unparseable reflection");
                            last_error = "unparseable reflection".to_string();
                        }
                    }
                }
                Ok(Err(e)) => {
                    warn!(session_id = %self.session.id, attempt, error = %e, "reflect: LLM error");
                    last_error = e.to_string();
                }
                Err(_) => {
                    warn!(session_id = %self.session.id, attempt, "reflect: reflection timed out");
                    last_error = format!("reflection timed out after {:?}", timeout);
                }
            }
        }

        // Degraded continuation on the last known reflection
        if let Some(last) = self.session.recent_reflections.last() {
            warn!(session_id = %self.session.id, "reflect: continuing degraded on previous reflection");
            let mut degraded = last.clone();
            degraded.iteration = iteration;
            degraded.degraded = true;
            degraded.assessment = Assessment::Continue;
            return Ok(degraded);
        }

        Err(SessionError::LlmUnavailable(last_error))
    }

    fn render_reflection_prompt(&self) -> String {
        let history: Vec<String> = self
            .session
            .recent_history(3)
            .iter()
            .map(|e| {
                format!(
                    "iteration {}: {} -> {} (progress predicted {:.0})",
                    e.iteration,
                    e.next_action,
                    if e.succeeded { "ok" } else { "failed" },
                    e.predicted_progress,
                )
            })
            .collect();
        let failures: Vec<String> = self
            .session
            .failures
            .iter()
            .rev()
            .take(3)
            .map(|f| format!("{}: {}", f.category, f.message.chars().take(120).collect::<String>()))
            .collect();

        let episodes: Vec<String> = self
            .memory
            .episodes
            .search(&self.session.task, &SearchOptions::default())
            .into_iter()
            .map(|scored| {
                format!(
                    "{} ({}, {} iterations, {:.2} similar): {}",
                    if scored.episode.success { "succeeded" } else { "failed" },
                    scored.episode.task_type,
                    scored.episode.iterations,
                    scored.score,
                    scored.episode.summary.chars().take(120).collect::<String>(),
                )
            })
            .collect();

        let stats = self.memory.sessions.stats().unwrap_or_default();
        let mut tool_frequency: Vec<(&String, &u64)> = stats.tool_frequency.iter().collect();
        tool_frequency.sort_by(|a, b| b.1.cmp(a.1));
        let success_patterns = tool_frequency
            .iter()
            .take(3)
            .map(|(tool, count)| format!("{} ({} uses)", tool, count))
            .collect::<Vec<_>>()
            .join(", ");

        let preferences = self
            .memory
            .preferences
            .analyze(&self.memory.feedback.read_all().unwrap_or_default())
            .map(|p| format!("risk tolerance {:?}, decision speed {:?}", p.risk_tolerance, p.decision_speed))
            .unwrap_or_else(|_| "(unknown)".to_string());

        prompts::render(
            prompts::REFLECTION,
            &[
                ("task", self.session.task.as_str()),
                ("task-type", self.session.task_type.as_str()),
                ("iteration", &self.session.iteration.to_string()),
                ("max-iterations", &self.session.max_iterations.to_string()),
                ("progress", &format!("{:.0}", self.session.progress)),
                ("history", &bulleted(&history)),
                ("failures", &bulleted(&failures)),
                ("preferences", &preferences),
                ("episodes", &bulleted(&episodes)),
                (
                    "success-patterns",
                    if success_patterns.is_empty() { "(none)" } else { success_patterns.as_str() },
                ),
                ("meta-critique", &self.meta_track.critique_for_prompt()),
                (
                    "directive",
                    if self.force_different_next {
                        "Directive: previous attempts repeated themselves without success. Propose a fundamentally different approach."
                    } else {
                        ""
                    },
                ),
            ],
        )
    }

    /// Whether the planner must be forced onto a different approach
    fn take_force_different(&mut self, _reflection: &Reflection) -> bool {
        // Duplicate-proposal detection over the last three actions
        let last_actions = self.session.last_next_actions(3);
        let duplicates = last_actions.len() == 3
            && last_actions.windows(2).all(|pair| word_overlap(pair[0], pair[1]) >= DUPLICATE_OVERLAP)
            && self.session.recent_history(3).iter().all(|e| !e.succeeded);
        if duplicates {
            debug!(session_id = %self.session.id, "take_force_different: duplicate proposals detected");
            self.repetitive_actions_seen = true;
        }
        let force = self.force_different_next || duplicates;
        self.force_different_next = false;
        force
    }

    /// Plan the reflection's next action (direct or via alternatives)
    async fn plan_action(
        &mut self,
        reflection: &Reflection,
        force_different: bool,
        iteration: u32,
    ) -> (InstructionPlan, f32, Option<PlanContext>) {
        let use_alternatives = reflection.confidence < self.config.direct_planning_confidence;
        debug!(session_id = %self.session.id, use_alternatives, "plan_action: called");

        if use_alternatives {
            let stats = self.memory.sessions.stats().unwrap_or_default();
            let failure_rate = stats
                .task_type_success_rate(self.session.task_type.as_str())
                .map(|rate| 1.0 - rate)
                .unwrap_or(0.0);
            let generate_ctx = GenerateContext {
                goal: self.session.task.clone(),
                next_action: reflection.next_action.clone(),
                available_tools: self.tools.tool_names(),
                recent_failures: self
                    .session
                    .failures
                    .iter()
                    .rev()
                    .take(3)
                    .map(|f| format!("{}: {}", f.category, f.message.chars().take(100).collect::<String>()))
                    .collect(),
                similar_episodes: self
                    .memory
                    .episodes
                    .search(&self.session.task, &SearchOptions::default())
                    .into_iter()
                    .map(|s| s.episode.summary)
                    .collect(),
                tool_recommendations: {
                    let mut tools: Vec<(&String, &u64)> = stats.tool_frequency.iter().collect();
                    tools.sort_by(|a, b| b.1.cmp(a.1));
                    tools.into_iter().take(3).map(|(tool, _)| tool.clone()).collect()
                },
            };
            let effort_ctx = EffortContext {
                known_tools: self.session.tools_used(),
                past_failure_rate: failure_rate,
                iteration_stats: self.memory.episodes.iteration_stats(self.session.task_type.as_str()),
                max_iterations: self.session.max_iterations,
            };

            let (decision, method) = self.alternative_planner.plan(&generate_ctx, &effort_ctx).await;
            if let Some(plan) = decision_to_plan(&decision) {
                let chosen_confidence = decision.chosen().map(|c| c.alternative.confidence).unwrap_or(0.5);
                info!(session_id = %self.session.id, justification = %decision.justification, "plan_action: alternative chosen");
                self.log.emit(ContextEvent::PlanningPhase {
                    session_id: self.session.id.clone(),
                    iteration,
                    source: "alternative".to_string(),
                    step_count: plan.steps.len(),
                    fallback_used: method == GenerationMethod::HeuristicFallback,
                    alternatives_considered: decision.ranked.len(),
                });
                return (plan, chosen_confidence, None);
            }
        }

        let plan_ctx = PlanContext {
            action: reflection.next_action.clone(),
            goal: self.session.task.clone(),
            task_type: self.session.task_type,
            tool_names: self.tools.tool_names(),
            tool_descriptions: self.tools.describe_for_prompt(),
            recent_history: self
                .session
                .recent_history(3)
                .iter()
                .map(|e| format!("{}: {}", e.iteration, e.next_action))
                .collect(),
            recent_failures: self
                .session
                .failures
                .iter()
                .rev()
                .take(3)
                .map(|f| f.message.chars().take(100).collect::<String>())
                .collect(),
            cwd: self.workspace.display().to_string(),
            force_different_approach: force_different,
        };

        let outcome = self.task_planner.plan(&plan_ctx).await;
        self.log.emit(ContextEvent::PlanningPhase {
            session_id: self.session.id.clone(),
            iteration,
            source: outcome.plan.source.clone(),
            step_count: outcome.plan.steps.len(),
            fallback_used: outcome.fallback_used,
            alternatives_considered: 0,
        });
        let confidence = outcome.plan.mean_confidence();
        (outcome.plan, confidence, Some(plan_ctx))
    }

    /// Five-factor confidence for the plan about to execute
    fn plan_confidence(&self, decision_type: DecisionType, plan: &InstructionPlan, hint: f32) -> f32 {
        let stats = self.memory.sessions.stats().unwrap_or_default();
        let historical_success = stats
            .task_type_success_rate(self.session.task_type.as_str())
            .unwrap_or(0.5);

        let destructive_fraction = if plan.steps.is_empty() {
            0.0
        } else {
            plan.steps.iter().filter(|s| s.is_destructive()).count() as f32 / plan.steps.len() as f32
        };

        let context_completeness = [
            !self.session.history.is_empty(),
            self.memory.episodes.len() > 0,
            stats.total > 0,
            !plan.prerequisites.is_empty() || !plan.alternatives.is_empty(),
        ]
        .iter()
        .filter(|present| **present)
        .count() as f32
            / 4.0;

        let factors = ConfidenceFactors {
            option_clarity: (hint + plan.mean_confidence()) / 2.0,
            historical_success,
            risk_alignment: 1.0 - destructive_fraction,
            effort_certainty: if plan.verification.is_some() { 0.8 } else { 0.5 },
            context_completeness,
        };
        score_confidence(decision_type, factors)
    }

    /// Config threshold unless calibration drifted it
    fn effective_threshold(&self, decision_type: DecisionType) -> f32 {
        let drifted = self.calibrator.threshold(decision_type);
        if (drifted - decision_type.default_threshold()).abs() > f32::EPSILON {
            drifted
        } else {
            self.config.checkpoint_threshold(decision_type)
        }
    }

    /// Create a checkpoint, wait for a human, substitute the chosen option
    async fn checkpoint_and_wait(
        &mut self,
        decision_type: DecisionType,
        confidence: f32,
        plan: InstructionPlan,
    ) -> InstructionPlan {
        let iteration = self.session.iteration;
        debug!(session_id = %self.session.id, %decision_type, confidence, "checkpoint_and_wait: called");

        let proposed_risk = if plan.has_destructive_step() { RiskLevel::High } else { RiskLevel::Medium };
        let safe_steps = vec![
            PlanStep::new("read_dir", serde_json::json!({"path": "."}), "inspect the workspace before acting")
                .with_confidence(0.9),
            PlanStep::new(
                "echo",
                serde_json::json!({"message": "paused for a safer path; re-plan with the gathered context"}),
                "note the safer path",
            )
            .with_confidence(0.9),
            PlanStep::new("echo", serde_json::json!({"message": "ready to re-plan"}), "confirmation").with_confidence(0.9),
        ];

        let options = vec![
            CheckpointOption {
                id: "opt-proceed".to_string(),
                label: "Proceed with the proposed plan".to_string(),
                description: plan.approach.clone(),
                risk_level: proposed_risk,
                steps: plan.steps.clone(),
            },
            CheckpointOption {
                id: "opt-inspect".to_string(),
                label: "Inspect first, then re-plan".to_string(),
                description: "Swap in a low-risk inspection pass".to_string(),
                risk_level: RiskLevel::Low,
                steps: safe_steps,
            },
            CheckpointOption {
                id: "opt-defer".to_string(),
                label: "Defer this action".to_string(),
                description: "Record a no-op and reconsider next iteration".to_string(),
                risk_level: RiskLevel::Medium,
                steps: vec![
                    PlanStep::new("echo", serde_json::json!({"message": "action deferred by checkpoint"}), "deferral note")
                        .with_confidence(0.9),
                ],
            },
        ];

        let checkpoint = Checkpoint::new(self.session.id.clone(), decision_type, confidence, options);
        let checkpoint_id = checkpoint.id.clone();
        let safest_id = checkpoint.safest_option().map(|o| o.id.clone()).unwrap_or_default();
        self.log.emit(ContextEvent::CheckpointCreated {
            session_id: self.session.id.clone(),
            checkpoint_id: checkpoint_id.clone(),
            decision_type: decision_type.as_str().to_string(),
            predicted_confidence: confidence,
            option_count: checkpoint.options.len(),
        });

        let rx = self.checkpoints.create(checkpoint);
        let timeout = Duration::from_secs(self.config.checkpoints.timeout_secs);
        self.progress.heartbeat(iteration, "checkpoint");

        match self.checkpoints.wait(&checkpoint_id, rx, timeout).await {
            CheckpointWait::Resolved(resolution) => {
                self.log.emit_as(
                    Actor::User,
                    ContextEvent::CheckpointResolved {
                        session_id: self.session.id.clone(),
                        checkpoint_id: checkpoint_id.clone(),
                        selected_option_id: resolution.selected_option_id.clone(),
                        modified: resolution.modified,
                    },
                );

                let accepted = resolution.selected_option_id == safest_id;
                self.calibrator.record(decision_type, confidence, accepted);
                self.log.emit(ContextEvent::ConfidenceCalibrationRecord {
                    session_id: self.session.id.clone(),
                    decision_type: decision_type.as_str().to_string(),
                    predicted_confidence: confidence,
                    user_accepted: accepted,
                });
                if let Err(e) = self.memory.calibration.record(&agentmemory::CalibrationRecord {
                    decision_type: decision_type.as_str().to_string(),
                    predicted_confidence: confidence,
                    user_accepted: accepted,
                    timestamp: Utc::now(),
                }) {
                    warn!(session_id = %self.session.id, error = %e, "checkpoint_and_wait: failed to persist calibration");
                }
                if let Err(e) = self.memory.preferences.record_decision(&agentmemory::DecisionRecord {
                    decision_id: checkpoint_id,
                    safest_chosen: accepted,
                    accepted,
                    timestamp: Utc::now(),
                }) {
                    warn!(session_id = %self.session.id, error = %e, "checkpoint_and_wait: failed to persist decision");
                }

                // Substitute the chosen option's steps
                let selected_steps = self.selected_option_steps(&resolution.selected_option_id, &plan);
                let mut substituted = plan;
                if let Some(steps) = selected_steps {
                    substituted.steps = steps;
                    substituted.source = "checkpoint".to_string();
                }
                substituted
            }
            CheckpointWait::Expired => {
                self.log.emit(ContextEvent::CheckpointExpired {
                    session_id: self.session.id.clone(),
                    checkpoint_id,
                });
                plan
            }
        }
    }

    /// Steps of the selected option; None when "proceed" keeps the plan
    fn selected_option_steps(&self, option_id: &str, plan: &InstructionPlan) -> Option<Vec<PlanStep>> {
        match option_id {
            "opt-proceed" => None,
            "opt-inspect" => Some(vec![
                PlanStep::new("read_dir", serde_json::json!({"path": "."}), "inspect the workspace before acting")
                    .with_confidence(0.9),
                PlanStep::new(
                    "echo",
                    serde_json::json!({"message": format!("deferred risky plan: {}", plan.approach)}),
                    "note the safer path",
                )
                .with_confidence(0.9),
                PlanStep::new("echo", serde_json::json!({"message": "ready to re-plan"}), "confirmation")
                    .with_confidence(0.9),
            ]),
            "opt-defer" => Some(vec![
                PlanStep::new("echo", serde_json::json!({"message": "action deferred by checkpoint"}), "deferral note")
                    .with_confidence(0.9),
            ]),
            _ => None,
        }
    }

    /// Execute a plan's steps through the tool executor
    async fn execute_plan(&mut self, plan: &InstructionPlan, iteration: u32) -> ExecutionSummary {
        debug!(session_id = %self.session.id, steps = plan.steps.len(), "execute_plan: called");
        let ctx = ToolContext::new(self.workspace.clone(), self.session.id.clone())
            .with_step_timeout(Duration::from_millis(self.config.step_timeout_ms));

        let mut summary = ExecutionSummary {
            steps_total: plan.steps.len(),
            steps_succeeded: 0,
            tools_used: Vec::new(),
            artifacts: Vec::new(),
            outputs: Vec::new(),
            failure: None,
            cancelled: false,
        };

        for (step_index, step) in plan.steps.iter().enumerate() {
            if self.cancel.load(Ordering::SeqCst) {
                debug!(session_id = %self.session.id, step_index, "execute_plan: cancellation between steps");
                summary.cancelled = true;
                return summary;
            }

            self.progress.heartbeat(iteration, "execute");
            let result = self.execute_step(step, step_index, &ctx, iteration).await;

            if !summary.tools_used.contains(&step.tool) {
                summary.tools_used.push(step.tool.clone());
            }
            summary.artifacts.extend(result.artifacts.clone());
            summary.outputs.push(result.output.clone());

            if result.ok {
                summary.steps_succeeded += 1;
                continue;
            }

            // In-plan fallback per the step's hint
            let handled = match step.error_handling.as_str() {
                "retry" => {
                    debug!(session_id = %self.session.id, step_index, "execute_plan: retrying step once");
                    let retry = self.execute_step(step, step_index, &ctx, iteration).await;
                    let ok = retry.ok;
                    if ok {
                        summary.steps_succeeded += 1;
                        summary.artifacts.extend(retry.artifacts);
                        summary.outputs.push(retry.output);
                    }
                    ok
                }
                "skip" => {
                    debug!(session_id = %self.session.id, step_index, "execute_plan: skipping failed step");
                    true
                }
                hint if hint.starts_with("fallback:") => {
                    let fallback_tool = hint.trim_start_matches("fallback:").to_string();
                    debug!(session_id = %self.session.id, %fallback_tool, "execute_plan: trying fallback tool");
                    if self.tools.has_tool(&fallback_tool) {
                        let fallback_step = PlanStep::new(fallback_tool, step.args.clone(), step.description.clone());
                        let fallback = self.execute_step(&fallback_step, step_index, &ctx, iteration).await;
                        let ok = fallback.ok;
                        if ok {
                            summary.steps_succeeded += 1;
                            if !summary.tools_used.contains(&fallback_step.tool) {
                                summary.tools_used.push(fallback_step.tool.clone());
                            }
                            summary.artifacts.extend(fallback.artifacts);
                            summary.outputs.push(fallback.output);
                        }
                        ok
                    } else {
                        false
                    }
                }
                _ => false,
            };

            if !handled {
                let error_info = result.error.clone().unwrap_or_else(|| crate::tools::ToolErrorInfo {
                    exit_code: None,
                    name: "unknown".to_string(),
                    message: result.output.clone(),
                });
                let failing_command = step.args.get("command").and_then(|v| v.as_str()).map(String::from);
                let mut raw = RawError::new(error_info.name, error_info.message).with_tool(step.tool.clone());
                raw.exit_code = error_info.exit_code;
                summary.failure = Some((raw, failing_command));
                debug!(session_id = %self.session.id, step_index, "execute_plan: unhandled step failure, stopping");
                return summary;
            }
        }

        // Verification decides plan-level success
        if let Some(verification) = &plan.verification {
            self.progress.heartbeat(iteration, "verify");
            let invocation = ToolInvocation::new(
                "run_bash",
                serde_json::json!({"command": verification.check_command}),
            );
            let result = self.tools.execute(&invocation, &ctx).await;
            let observation = serde_json::json!({"command": verification.check_command, "ok": result.ok});
            if self.observe("run_bash", &observation, "verification") {
                self.progress.state_change("verification", observation);
            }
            self.log.emit(ContextEvent::VerificationCheck {
                session_id: self.session.id.clone(),
                iteration,
                check_command: verification.check_command.clone(),
                passed: result.ok,
            });
            if !result.ok {
                debug!(session_id = %self.session.id, "execute_plan: verification failed");
                let error_info = result.error.unwrap_or_else(|| crate::tools::ToolErrorInfo {
                    exit_code: None,
                    name: "verification_failed".to_string(),
                    message: result.output.clone(),
                });
                let mut raw = RawError::new(error_info.name, error_info.message).with_tool("run_bash");
                raw.exit_code = error_info.exit_code;
                summary.failure = Some((raw, Some(verification.check_command.clone())));
            }
        }

        summary
    }

    /// Run one step, emitting events and state changes
    ///
    /// A state change lands only for observations the session has not
    /// seen before; repeating the same invocation with the same result
    /// makes no progress and must not reset the stuck predicate.
    async fn execute_step(&mut self, step: &PlanStep, step_index: usize, ctx: &ToolContext, iteration: u32) -> ToolResult {
        debug!(session_id = %self.session.id, step_index, tool = %step.tool, "execute_step: called");
        self.log.emit(ContextEvent::ExecutionStep {
            session_id: self.session.id.clone(),
            iteration,
            step_index,
            tool: step.tool.clone(),
            description: step.description.clone(),
        });
        if self.observe(&step.tool, &step.args, "invocation") {
            self.progress.state_change(
                "tool_invocation",
                serde_json::json!({"tool": step.tool, "step": step_index}),
            );
        }

        let started = std::time::Instant::now();
        let invocation = ToolInvocation::new(step.tool.clone(), step.args.clone());
        let result = self.tools.execute(&invocation, ctx).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        let novel_result = {
            let observation = serde_json::json!({"output": result.output, "ok": result.ok});
            self.observe(&step.tool, &observation, "result")
        } || !result.artifacts.is_empty();
        if novel_result {
            self.progress.state_change(
                "tool_result",
                serde_json::json!({"tool": step.tool, "ok": result.ok, "step": step_index}),
            );
        }
        self.log.emit(ContextEvent::ExecutionResult {
            session_id: self.session.id.clone(),
            iteration,
            step_index,
            tool: step.tool.clone(),
            ok: result.ok,
            output_summary: result.output.chars().take(200).collect(),
            duration_ms,
        });
        result
    }

    /// Record an observation; true when it was not seen before
    fn observe(&mut self, tool: &str, payload: &serde_json::Value, kind: &str) -> bool {
        use std::hash::{Hash, Hasher};
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        tool.hash(&mut hasher);
        kind.hash(&mut hasher);
        payload.to_string().hash(&mut hasher);
        self.seen_observations.insert(hasher.finish())
    }

    /// The diagnose-and-recover pipeline for a classified failure
    async fn diagnose_and_recover(
        &mut self,
        raw_error: RawError,
        failing_command: Option<String>,
        iteration: u32,
    ) -> FailureInfo {
        self.recovery_cycles_this_iteration += 1;
        let category = classify(&raw_error);
        self.log.emit(ContextEvent::ErrorClassified {
            session_id: self.session.id.clone(),
            iteration,
            category: category.as_str().to_string(),
            tool: raw_error.tool.clone(),
            message: raw_error.message.chars().take(200).collect(),
        });

        let failure = FailureInfo {
            category,
            tool: raw_error.tool.clone(),
            message: raw_error.message.clone(),
        };

        if self.recovery_cycles_this_iteration > MAX_RECOVERY_CYCLES_PER_ITERATION {
            warn!(session_id = %self.session.id, "diagnose_and_recover: cycle cap reached, surfacing hard failure");
            return failure;
        }

        // Diagnose
        let recent_context = self
            .session
            .recent_history(2)
            .iter()
            .map(|e| e.next_action.clone())
            .collect::<Vec<_>>()
            .join("; ");
        let diagnosis = self
            .diagnostic
            .diagnose(raw_error.tool.as_deref(), &raw_error, category, &recent_context)
            .await;
        self.log.emit(ContextEvent::DiagnosticReflection {
            session_id: self.session.id.clone(),
            iteration,
            category: category.as_str().to_string(),
            root_cause: diagnosis.root_cause.description.clone(),
            why_depth: diagnosis.why_chain.len(),
        });

        // Plan recovery, learn from history
        let mut recovery_plan = plan_recovery(&diagnosis, failing_command.as_deref());
        PatternLearner::new(&self.memory.patterns).apply(&mut recovery_plan);

        // Repeated same-category recoveries lose confidence
        let streak = match self.recovery_streak {
            Some((streak_category, count)) if streak_category == category => count + 1,
            _ => 1,
        };
        self.recovery_streak = Some((category, streak));
        if streak >= 3 {
            let penalty = 0.1 * (streak - 2) as f32;
            recovery_plan.primary.confidence = (recovery_plan.primary.confidence - penalty).max(0.0);
            debug!(session_id = %self.session.id, streak, penalty, "diagnose_and_recover: downgrading repeated recovery");
        }

        let scheduled = recovery_plan.primary.confidence >= self.config.recovery_threshold;
        self.log.emit(ContextEvent::RecoveryPlan {
            session_id: self.session.id.clone(),
            iteration,
            category: category.as_str().to_string(),
            primary_strategy: recovery_plan.primary.name.clone(),
            confidence: recovery_plan.primary.confidence,
            scheduled,
        });

        if scheduled {
            let strategy_name = recovery_plan.primary.name.clone();
            let plan = strategy_to_plan(&recovery_plan.primary);
            self.pending_recovery = Some((plan, category, strategy_name));
            self.recoveries_attempted += 1;
            info!(session_id = %self.session.id, strategy = %recovery_plan.primary.name, "diagnose_and_recover: recovery scheduled");
        } else {
            debug!(session_id = %self.session.id, confidence = recovery_plan.primary.confidence, "diagnose_and_recover: below threshold, recording soft failure");
        }

        failure
    }

    /// Record the outcome of an executed recovery
    fn record_recovery_outcome(&mut self, category: ErrorCategory, strategy: &str, success: bool, iteration: u32) {
        debug!(session_id = %self.session.id, %category, %strategy, success, "record_recovery_outcome: called");
        if success {
            self.recoveries_succeeded += 1;
            self.recovery_streak = None;
        }
        self.log.emit(ContextEvent::RecoveryAttemptResult {
            session_id: self.session.id.clone(),
            iteration,
            category: category.as_str().to_string(),
            strategy: strategy.to_string(),
            success,
        });
        if let Err(e) = self.memory.patterns.record(&RecoveryOutcome {
            error_category: category.as_str().to_string(),
            strategy: strategy.to_string(),
            success,
            iterations: 1,
            context: self.session.task.chars().take(120).collect(),
            timestamp: Utc::now(),
        }) {
            warn!(session_id = %self.session.id, error = %e, "record_recovery_outcome: failed to persist pattern");
        }
    }

    /// Append the clarification to history and resume
    fn consume_clarification(&mut self, text: String) {
        info!(session_id = %self.session.id, "consume_clarification: resuming session");
        let questions = std::mem::take(&mut self.session.clarification_questions);
        self.session.push_history(ActionHistoryEntry {
            iteration: self.session.iteration,
            next_action: format!("clarify: {}", questions.join(" | ")),
            tools_used: vec![],
            result_summary: Some(format!("clarification: {}", text)),
            artifacts: vec![],
            error: None,
            predicted_progress: self.session.progress,
            predicted_confidence: self.session.confidence,
            succeeded: true,
            input_tokens: 0,
            output_tokens: 0,
        });
        self.session.task = format!("{}\nClarification: {}", self.session.task, text);
        self.session.outcome = SessionOutcome::Running;
        self.terminal_reason = None;
    }

    fn push_history_entry(
        &mut self,
        reflection: &Reflection,
        tools_used: &[String],
        error: Option<FailureInfo>,
        result_summary: Option<String>,
        succeeded: bool,
        tokens: TokenUsage,
    ) {
        self.push_history_entry_full(reflection, tools_used, vec![], error, result_summary, succeeded, tokens);
    }

    #[allow(clippy::too_many_arguments)]
    fn push_history_entry_full(
        &mut self,
        reflection: &Reflection,
        tools_used: &[String],
        artifacts: Vec<Artifact>,
        error: Option<FailureInfo>,
        result_summary: Option<String>,
        succeeded: bool,
        tokens: TokenUsage,
    ) {
        self.session.push_history(ActionHistoryEntry {
            iteration: reflection.iteration,
            next_action: reflection.next_action.clone(),
            tools_used: tools_used.to_vec(),
            result_summary,
            artifacts,
            error,
            predicted_progress: reflection.predicted_progress,
            predicted_confidence: reflection.confidence,
            succeeded,
            input_tokens: tokens.input_tokens,
            output_tokens: tokens.output_tokens,
        });
    }

    fn terminate(&mut self, outcome: SessionOutcome) {
        debug!(session_id = %self.session.id, ?outcome, "terminate: called");
        if let SessionOutcome::Stopped { reason } = &outcome {
            self.terminal_reason = Some(reason.clone());
        }
        if outcome == SessionOutcome::Stuck {
            self.terminal_reason = Some("no state change across consecutive iterations".to_string());
        }
        self.session.outcome = outcome;
    }

    /// Terminal persistence: episode, session record, preference analysis
    fn finalize(&mut self) {
        if !self.session.outcome.is_terminal() {
            return;
        }
        debug!(session_id = %self.session.id, "finalize: called");
        let success = self.session.outcome == SessionOutcome::Completed;

        if !self.episode_written {
            self.episode_written = true;
            let draft = EpisodeDraft {
                task: self.session.task.clone(),
                task_type: self.session.task_type.as_str().to_string(),
                success,
                iterations: self.session.iteration,
                tools_used: self.session.tools_used(),
                strategy: self
                    .session
                    .history
                    .last()
                    .map(|e| e.next_action.chars().take(80).collect())
                    .unwrap_or_else(|| "direct".to_string()),
                summary: self.summary_text(),
                confidence: self.session.confidence,
                failure_reason: (!success).then(|| self.terminal_reason.clone().unwrap_or_else(|| "failed".to_string())),
                error_count: self.session.failures.len() as u32,
            };
            match self.memory.episodes.write(draft) {
                Ok(episode) => {
                    self.log.emit(ContextEvent::EpisodeWritten {
                        session_id: self.session.id.clone(),
                        episode_id: episode.id,
                        success,
                        iterations: self.session.iteration,
                    });
                }
                Err(e) => warn!(session_id = %self.session.id, error = %e, "finalize: failed to write episode"),
            }

            let record = SessionMemoryRecord {
                task_type: self.session.task_type.as_str().to_string(),
                success,
                iterations: self.session.iteration,
                tools_used: self.session.tools_used(),
                failed_tools: {
                    let mut tools: Vec<String> = Vec::new();
                    for failure in &self.session.failures {
                        if let Some(tool) = &failure.tool {
                            if !tools.contains(tool) {
                                tools.push(tool.clone());
                            }
                        }
                    }
                    tools
                },
                error_categories: self.session.error_categories().iter().map(|c| c.as_str().to_string()).collect(),
                recoveries: RecoveryCounts {
                    attempted: self.recoveries_attempted,
                    succeeded: self.recoveries_succeeded,
                },
                repetitive_actions: self.repetitive_actions_seen,
                failure_reason: (!success).then(|| self.terminal_reason.clone().unwrap_or_else(|| "failed".to_string())),
                timestamp: Utc::now(),
            };
            if let Err(e) = self.memory.sessions.record(&record) {
                warn!(session_id = %self.session.id, error = %e, "finalize: failed to write session record");
            }

            if let Ok(profile) = self
                .memory
                .preferences
                .analyze(&self.memory.feedback.read_all().unwrap_or_default())
            {
                self.log.emit(ContextEvent::PreferenceAnalysis {
                    session_id: self.session.id.clone(),
                    risk_tolerance: format!("{:?}", profile.risk_tolerance).to_lowercase(),
                    decision_speed: format!("{:?}", profile.decision_speed).to_lowercase(),
                    total_decisions: profile.total_decisions,
                });
            }

            // Background re-embed once enough vocabulary accumulated
            if self.memory.episodes.needs_reembed() {
                let memory = self.memory.clone();
                tokio::task::spawn_blocking(move || {
                    if let Err(e) = memory.episodes.reembed() {
                        warn!(error = %e, "finalize: background re-embed failed");
                    }
                });
            }
        }

        self.emit_terminal_event();
    }

    fn emit_terminal_event(&self) {
        let outcome = match &self.session.outcome {
            SessionOutcome::Running => "running",
            SessionOutcome::Completed => "completed",
            SessionOutcome::Stopped { .. } => "stopped",
            SessionOutcome::Stuck => "stuck",
            SessionOutcome::NeedsClarification => "needs_clarification",
        };
        self.log.emit(ContextEvent::SessionTerminal {
            session_id: self.session.id.clone(),
            outcome: outcome.to_string(),
            reason: self.terminal_reason.clone(),
            iterations: self.session.iteration,
        });
    }

    fn summary_text(&self) -> String {
        format!(
            "{} after {} iteration(s): {} artifact(s), {} failure(s), tools [{}]",
            match &self.session.outcome {
                SessionOutcome::Completed => "Completed",
                SessionOutcome::Stuck => "Stuck",
                SessionOutcome::Stopped { .. } => "Stopped",
                SessionOutcome::NeedsClarification => "Paused",
                SessionOutcome::Running => "Running",
            },
            self.session.iteration,
            self.session.artifacts.len(),
            self.session.failures.len(),
            self.session.tools_used().join(", "),
        )
    }

    fn report(&self) -> SessionReport {
        SessionReport {
            session_id: self.session.id.clone(),
            outcome: self.session.outcome.clone(),
            reason: self.terminal_reason.clone(),
            iterations: self.session.iteration,
            progress: self.session.progress,
            artifacts: self.session.artifacts.clone(),
            summary: self.summary_text(),
            last_actions: self.session.last_next_actions(3).iter().map(|s| s.to_string()).collect(),
            failure_categories: self.session.error_categories().iter().map(|c| c.as_str().to_string()).collect(),
            questions: self.session.clarification_questions.clone(),
        }
    }
}

/// Convert a recovery strategy into an executable plan
fn strategy_to_plan(strategy: &RecoveryStrategy) -> InstructionPlan {
    let mut plan = InstructionPlan::new(format!("Recovery: {}", strategy.name)).with_source("recovery");
    plan.steps = strategy.steps.clone();
    for step in &mut plan.steps {
        step.confidence = strategy.confidence;
    }
    plan
}

fn bulleted(items: &[String]) -> String {
    if items.is_empty() {
        "(none)".to_string()
    } else {
        items.iter().map(|i| format!("- {}", i)).collect::<Vec<_>>().join("\n")
    }
}

/// Jaccard word overlap between two action texts
fn word_overlap(a: &str, b: &str) -> f32 {
    use std::collections::HashSet;
    let words = |text: &str| -> HashSet<String> {
        text.to_lowercase()
            .split_whitespace()
            .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_string())
            .filter(|w| !w.is_empty())
            .collect()
    };
    let set_a = words(a);
    let set_b = words(b);
    if set_a.is_empty() && set_b.is_empty() {
        return 1.0;
    }
    let intersection = set_a.intersection(&set_b).count() as f32;
    let union = set_a.union(&set_b).count() as f32;
    intersection / union
}
