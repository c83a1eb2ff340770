//! # Orchestrator
//!
//! Drives one generation run as a small state machine and exposes it as a
//! lazy stream of [`PipelineEvent`]s. Each call to `advance` runs exactly one
//! phase (at most one model call plus local checks) and returns the events
//! it produced, so dropping the stream between phases stops the run.
//!
//! Template path: design, build, then up to `max_iterations` attempts of
//! check/critique/revise sharing one budget. Custom-fast path: one combined
//! call, the sandbox, and a single edit round.

use crate::config::PipelineConfig;
use crate::critic::{Critic, CriticResult};
use crate::events::PipelineEvent;
use crate::obs;
use crate::profile::LearnerProfile;
use crate::prompts::{self, Prompt};
use crate::tools::{self, ToolReply};
use futures_util::Stream;
use gamecraft_engine::{
    apply_edits, validate, CustomComponent, EditOperation, FileStorage, GameKind, GameSpec, JsxCompiler,
    LlmProvider, MemoryStorage, RendererConfig, Sandbox, SandboxReport, StorageBackend, ToolDefinition,
    TraceRecorder, TraceStatus,
};
use gamecraft_error::{Error, ErrorKind, Result};
use serde_json::{json, Value};
use std::time::Instant;
use tracing::{Instrument, Span};

/// What to generate, and for whom
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub profile: LearnerProfile,
    pub topic: Option<String>,
    /// Overrides whatever kind the design step picks
    pub kind: Option<GameKind>,
    /// Skip the template path and go straight to a freeform component
    pub force_custom: bool,
}

impl GenerationRequest {
    pub fn new(profile: LearnerProfile) -> Self {
        Self {
            profile,
            topic: None,
            kind: None,
            force_custom: false,
        }
    }

    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    pub fn with_kind(mut self, kind: GameKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn force_custom(mut self) -> Self {
        self.force_custom = true;
        self
    }
}

pub struct Pipeline<P: LlmProvider> {
    provider: P,
    config: PipelineConfig,
    sandbox: Sandbox,
}

impl<P: LlmProvider> Pipeline<P> {
    pub fn new(provider: P) -> Self {
        Self::with_config(provider, PipelineConfig::default())
    }

    pub fn with_config(provider: P, config: PipelineConfig) -> Self {
        Self {
            provider,
            config,
            sandbox: Sandbox::new(),
        }
    }

    pub fn with_sandbox(mut self, sandbox: Sandbox) -> Self {
        self.sandbox = sandbox;
        self
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Start a run. Nothing happens until the stream is polled; the stream
    /// ends after its terminal `complete` or `error` event.
    pub fn run(&self, request: GenerationRequest) -> impl Stream<Item = PipelineEvent> + '_ {
        async_stream::stream! {
            let mut run = Run::new(self, request);
            while !run.is_finished() {
                let span = run.span.clone();
                let events = run.advance().instrument(span).await;
                for event in events {
                    yield event;
                }
            }
        }
    }

    fn trace_backend(&self) -> Box<dyn StorageBackend> {
        match &self.config.trace_dir {
            Some(dir) => match FileStorage::new(dir) {
                Ok(storage) => Box::new(storage),
                Err(e) => {
                    tracing::warn!(event = "trace_dir_unusable", dir = %dir.display(), error = %e);
                    Box::new(MemoryStorage::new())
                }
            },
            None => Box::new(MemoryStorage::new()),
        }
    }
}

/// A candidate as it came back from the model
enum Draft {
    Structured(Value),
    Component(String),
    /// The reply could not be read as a candidate at all
    Unusable(String),
}

impl Draft {
    fn candidate(&self) -> Option<Value> {
        match self {
            Draft::Structured(value) => Some(value.clone()),
            Draft::Component(source) => Some(json!({ "source": source })),
            Draft::Unusable(_) => None,
        }
    }
}

enum Phase {
    Start,
    Design,
    Build,
    Check(Draft),
    Revise { draft: Draft, feedback: String },
    CustomGame,
    CustomFix { source: String, problems: Vec<String> },
    Finished,
}

struct Best {
    config: RendererConfig,
    score: u8,
}

struct Run<'a, P: LlmProvider> {
    pipeline: &'a Pipeline<P>,
    request: GenerationRequest,
    trace: TraceRecorder,
    span: Span,
    started: Instant,
    phase: Phase,
    spec: Option<GameSpec>,
    best: Option<Best>,
    iteration: u32,
    critic_calls: u32,
}

impl<'a, P: LlmProvider> Run<'a, P> {
    fn new(pipeline: &'a Pipeline<P>, request: GenerationRequest) -> Self {
        let run_id = uuid::Uuid::new_v4().to_string();
        Self {
            pipeline,
            request,
            trace: TraceRecorder::new(run_id.clone(), pipeline.trace_backend()),
            span: obs::run_span(&run_id),
            started: Instant::now(),
            phase: Phase::Start,
            spec: None,
            best: None,
            iteration: 0,
            critic_calls: 0,
        }
    }

    fn is_finished(&self) -> bool {
        matches!(self.phase, Phase::Finished)
    }

    async fn advance(&mut self) -> Vec<PipelineEvent> {
        let mut events = Vec::new();
        let phase = std::mem::replace(&mut self.phase, Phase::Finished);
        match self.step(phase, &mut events).await {
            Ok(next) => self.phase = next,
            Err(e) => match (self.best.take(), self.spec.clone()) {
                (Some(best), Some(spec)) => self.settle(e, spec, best, &mut events),
                _ => self.fail(e, &mut events),
            },
        }
        events
    }

    async fn step(&mut self, phase: Phase, events: &mut Vec<PipelineEvent>) -> Result<Phase> {
        match phase {
            Phase::Start => self.start(),
            Phase::Design => self.design(events).await,
            Phase::Build => self.build(events).await,
            Phase::Check(draft) => self.check(draft, events).await,
            Phase::Revise { draft, feedback } => self.revise(draft, feedback, events).await,
            Phase::CustomGame => self.custom_game(events).await,
            Phase::CustomFix { source, problems } => self.custom_fix(source, problems, events).await,
            Phase::Finished => Ok(Phase::Finished),
        }
    }

    // ------------------------------------------------------------------
    // Phases
    // ------------------------------------------------------------------

    fn start(&mut self) -> Result<Phase> {
        let pipeline = self.pipeline;
        let request = &self.request;
        obs::emit_run_started(
            self.trace.run_id(),
            &request.profile.name,
            request.profile.topic(request.topic.as_deref()),
            request.force_custom,
        );

        self.trace.set_metadata("learner", &request.profile.name);
        self.trace.set_metadata("subject", &request.profile.subject);
        self.trace.set_metadata("topic", request.profile.topic(request.topic.as_deref()));
        self.trace.set_metadata("force_custom", request.force_custom);
        self.trace.set_metadata("provider", pipeline.provider.name());
        self.trace.set_metadata(
            "model",
            pipeline
                .config
                .model
                .as_deref()
                .unwrap_or_else(|| pipeline.provider.default_model()),
        );

        request.profile.check()?;
        Ok(if request.force_custom {
            Phase::CustomGame
        } else {
            Phase::Design
        })
    }

    async fn design(&mut self, events: &mut Vec<PipelineEvent>) -> Result<Phase> {
        let prompt = prompts::design(&self.request.profile, self.topic(), self.request.kind);
        let reply = self.call(prompt, tools::submit_game_spec(), "pipeline::design").await?;

        let mut spec = GameSpec::from_value(&reply.arguments)?;
        if let Some(kind) = self.request.kind {
            spec = spec.with_kind(kind);
        }
        self.spec_ready(spec, events);
        Ok(Phase::Build)
    }

    async fn build(&mut self, events: &mut Vec<PipelineEvent>) -> Result<Phase> {
        let spec = self.spec()?;
        self.iteration = 1;

        let draft = if spec.kind.is_structured() {
            let prompt = prompts::build_config(&self.request.profile, &spec);
            self.draft_config(prompt, "pipeline::build").await?
        } else {
            let prompt = prompts::build_component(&self.request.profile, &spec);
            self.draft_component(prompt, "pipeline::build").await?
        };
        self.draft_ready(&draft, events);
        Ok(Phase::Check(draft))
    }

    async fn check(&mut self, draft: Draft, events: &mut Vec<PipelineEvent>) -> Result<Phase> {
        let spec = self.spec()?;
        let iteration = self.iteration;

        let config = match self.inspect(&spec, &draft) {
            Ok(config) => config,
            Err(violations) => {
                obs::emit_validation_failed(iteration, violations.len());
                let result = CriticResult::structural_failure(&violations);
                let feedback = result.feedback();
                self.emit(events, PipelineEvent::ValidationError { iteration, errors: violations });
                self.emit(events, PipelineEvent::CriticResult { iteration, result });
                return self.after_failure(draft, feedback, events);
            }
        };

        self.critic_calls += 1;
        let pipeline = self.pipeline;
        let result = match Critic::new(&pipeline.provider, &pipeline.config).critique(&spec, &config).await {
            Ok((result, reply)) => {
                self.account("critic::critique", &reply);
                obs::emit_critic_scored(iteration, result.total, result.passed);
                result
            }
            // An unreadable review fails the attempt, not the run
            Err(e) if e.kind() == ErrorKind::CriticFailed => {
                obs::emit_critic_unusable(iteration, &e);
                self.account_failure("critic::critique", &prompts::critique(&spec, &config), &e);
                CriticResult::unscored(e.message())
            }
            Err(e) => return Err(e),
        };

        if self.best.as_ref().map_or(true, |best| result.total > best.score) {
            self.best = Some(Best {
                config: config.clone(),
                score: result.total,
            });
        }

        let (passed, total, feedback) = (result.passed, result.total, result.feedback());
        self.emit(events, PipelineEvent::CriticResult { iteration, result });
        if passed {
            self.complete(events, spec, config, Some(total), false);
            return Ok(Phase::Finished);
        }
        self.after_failure(draft, feedback, events)
    }

    async fn revise(&mut self, draft: Draft, feedback: String, events: &mut Vec<PipelineEvent>) -> Result<Phase> {
        let spec = self.spec()?;
        self.iteration += 1;
        const OPERATION: &str = "pipeline::revise";

        let (draft, summary) = match draft {
            Draft::Structured(previous) => {
                let prompt = prompts::revise_config(&spec, &previous, &feedback);
                let summary = format!("regenerated config: {}", first_line(&feedback));
                (self.draft_config(prompt, OPERATION).await?, summary)
            }
            Draft::Component(source) => {
                let (source, summary) = self.edit_component(&spec, source, &feedback, OPERATION).await?;
                (Draft::Component(source), summary)
            }
            Draft::Unusable(_) if spec.kind.is_structured() => {
                let prompt = prompts::build_config(&self.request.profile, &spec).with_feedback(&feedback);
                let summary = "rebuilt config after an unusable reply".to_string();
                (self.draft_config(prompt, OPERATION).await?, summary)
            }
            Draft::Unusable(_) => {
                let prompt = prompts::build_component(&self.request.profile, &spec).with_feedback(&feedback);
                let summary = "rebuilt component after an unusable reply".to_string();
                (self.draft_component(prompt, OPERATION).await?, summary)
            }
        };

        obs::emit_revision(self.iteration, &summary);
        self.emit(events, PipelineEvent::Revision { iteration: self.iteration, summary });
        self.draft_ready(&draft, events);
        Ok(Phase::Check(draft))
    }

    async fn custom_game(&mut self, events: &mut Vec<PipelineEvent>) -> Result<Phase> {
        const OPERATION: &str = "pipeline::custom_game";
        let prompt = prompts::custom_game(&self.request.profile, self.topic());
        let reply = self.call(prompt, tools::submit_custom_game(), OPERATION).await?;

        let mut spec_value = reply.arguments.get("spec").cloned().unwrap_or_else(|| json!({}));
        if let Some(obj) = spec_value.as_object_mut() {
            obj.entry("kind").or_insert_with(|| json!(GameKind::Custom.as_str()));
        }
        let spec = GameSpec::from_value(&spec_value)?.with_kind(GameKind::Custom);
        self.spec_ready(spec.clone(), events);

        let source = reply
            .arguments
            .get("source")
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| {
                Error::build_failed(format!("`{}` reply has no source", tools::SUBMIT_CUSTOM_GAME))
                    .with_operation(OPERATION)
            })?
            .to_string();

        self.iteration = 1;
        self.draft_ready(&Draft::Component(source.clone()), events);

        match self.pipeline.sandbox.check(&source, &smoke_props(&spec)) {
            SandboxReport::Passed { compiled, .. } => {
                let config = custom_config(&spec, source, compiled);
                self.complete(events, spec, config, None, false);
                Ok(Phase::Finished)
            }
            report => {
                let problems = report.problems();
                obs::emit_validation_failed(1, problems.len());
                self.emit(events, PipelineEvent::ValidationError { iteration: 1, errors: problems.clone() });
                Ok(Phase::CustomFix { source, problems })
            }
        }
    }

    /// The single fix attempt of the fast path
    async fn custom_fix(
        &mut self,
        source: String,
        problems: Vec<String>,
        events: &mut Vec<PipelineEvent>,
    ) -> Result<Phase> {
        const OPERATION: &str = "pipeline::custom_fix";
        let spec = self.spec()?;
        self.iteration = 2;

        let (source, summary) = self.edit_component(&spec, source, &problems.join("\n"), OPERATION).await?;
        obs::emit_revision(self.iteration, &summary);
        self.emit(events, PipelineEvent::Revision { iteration: 2, summary });
        self.draft_ready(&Draft::Component(source.clone()), events);

        let report = self.pipeline.sandbox.check(&source, &smoke_props(&spec));
        if !report.passed() {
            self.emit(events, PipelineEvent::ValidationError { iteration: 2, errors: report.problems() });
        }
        match report {
            SandboxReport::Passed { compiled, .. } => {
                let config = custom_config(&spec, source, compiled);
                self.complete(events, spec, config, None, false);
                Ok(Phase::Finished)
            }
            // Policy and compilation passed; the renderer's error boundary
            // handles whatever the smoke render tripped on.
            SandboxReport::SmokeFailed { compiled, .. } => {
                let config = custom_config(&spec, source, compiled);
                self.complete(events, spec, config, None, true);
                Ok(Phase::Finished)
            }
            report => Err(report
                .error()
                .unwrap_or_else(|| Error::unexpected("sandbox rejected the source without a reason"))
                .with_operation(OPERATION)),
        }
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    /// Structural check of a draft: the typed config, or what is wrong with it
    fn inspect(&self, spec: &GameSpec, draft: &Draft) -> std::result::Result<RendererConfig, Vec<String>> {
        match draft {
            Draft::Structured(value) => {
                let report = validate(spec.kind, value);
                if !report.valid {
                    return Err(report.violations);
                }
                report.into_config(value).map_err(|e| vec![e.message().to_string()])
            }
            Draft::Component(source) => match self.pipeline.sandbox.check(source, &smoke_props(spec)) {
                SandboxReport::Passed { compiled, .. } => Ok(custom_config(spec, source.clone(), compiled)),
                report => Err(report.problems()),
            },
            Draft::Unusable(message) => Err(vec![message.clone()]),
        }
    }

    /// Revise if budget remains, otherwise settle for the best candidate
    fn after_failure(&mut self, draft: Draft, feedback: String, events: &mut Vec<PipelineEvent>) -> Result<Phase> {
        if self.iteration < self.pipeline.config.iteration_budget() {
            return Ok(Phase::Revise { draft, feedback });
        }
        match self.best.take() {
            Some(best) => {
                let spec = self.spec()?;
                self.complete(events, spec, best.config, Some(best.score), true);
                Ok(Phase::Finished)
            }
            None => Err(Error::new(
                ErrorKind::Exhausted,
                format!(
                    "no structurally valid candidate after {} iteration(s)",
                    self.iteration
                ),
            )
            .with_operation("pipeline::run")),
        }
    }

    async fn draft_config(&mut self, prompt: Prompt, operation: &'static str) -> Result<Draft> {
        match self.call(prompt, tools::submit_config(), operation).await {
            Ok(reply) => Ok(Draft::Structured(reply.arguments)),
            Err(e) if e.kind().is_revisable() => Ok(Draft::Unusable(e.message().to_string())),
            Err(e) => Err(e),
        }
    }

    async fn draft_component(&mut self, prompt: Prompt, operation: &'static str) -> Result<Draft> {
        match self.call(prompt, tools::submit_component(), operation).await {
            Ok(reply) => Ok(match reply.arguments.get("source").and_then(Value::as_str) {
                Some(source) if !source.trim().is_empty() => Draft::Component(source.to_string()),
                _ => Draft::Unusable(format!("`{}` reply has no source", tools::SUBMIT_COMPONENT)),
            }),
            Err(e) if e.kind().is_revisable() => Ok(Draft::Unusable(e.message().to_string())),
            Err(e) => Err(e),
        }
    }

    /// Ask for edits and apply them. An unreadable reply keeps the source
    /// as it was; the next check reports the same problems.
    async fn edit_component(
        &mut self,
        spec: &GameSpec,
        source: String,
        feedback: &str,
        operation: &'static str,
    ) -> Result<(String, String)> {
        let prompt = prompts::revise_component(spec, &source, feedback);
        let reply = match self.call(prompt, tools::propose_edits(), operation).await {
            Ok(reply) => reply,
            Err(e) if e.kind().is_revisable() => {
                return Ok((source, format!("no usable edits: {}", e.message())));
            }
            Err(e) => return Err(e),
        };

        let raw = reply
            .arguments
            .get("edits")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        let submitted = raw.len();
        let mut edits = Vec::new();
        let mut positions = Vec::new();
        let mut failures = Vec::new();
        for (i, item) in raw.into_iter().enumerate() {
            match serde_json::from_value::<EditOperation>(item) {
                Ok(op) => {
                    edits.push(op);
                    positions.push(i);
                }
                Err(e) => failures.push(format!("edit {}: {}", i, e)),
            }
        }

        let outcome = apply_edits(&source, &edits);
        failures.extend(
            outcome
                .errors
                .iter()
                .map(|e| format!("edit {}: {}", positions.get(e.index).copied().unwrap_or(e.index), e.message)),
        );
        self.trace.step(
            "edits_applied",
            Some(self.iteration),
            json!({
                "submitted": submitted,
                "applied": outcome.applied,
                "rewritten": outcome.rewritten,
                "errors": failures,
            }),
        );

        let mut summary = reply
            .arguments
            .get("summary")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or("applied edits")
            .to_string();
        if !failures.is_empty() {
            summary.push_str(&format!(" ({} of {} edits failed)", failures.len(), submitted));
        }
        Ok((outcome.source, summary))
    }

    async fn call(&mut self, prompt: Prompt, tool: ToolDefinition, operation: &'static str) -> Result<ToolReply> {
        let pipeline = self.pipeline;
        match tools::call_tool(&pipeline.provider, &pipeline.config, prompt.clone(), tool, operation).await {
            Ok(reply) => {
                self.account(operation, &reply);
                Ok(reply)
            }
            Err(e) => {
                self.account_failure(operation, &prompt, &e);
                Err(e)
            }
        }
    }

    /// Trace one model exchange: the prompt, what came back, and its cost
    fn account(&mut self, operation: &str, reply: &ToolReply) {
        self.trace.track_usage(&reply.model, &reply.usage);
        self.trace.step(
            "model_call",
            self.iteration_tag(),
            json!({
                "operation": operation,
                "model": reply.model,
                "usage": reply.usage,
                "prompt": reply.prompt,
                "response": { "arguments": reply.arguments, "content": reply.content },
            }),
        );
        obs::emit_model_call(operation, &reply.model, reply.usage.total_tokens);
    }

    fn account_failure(&mut self, operation: &str, prompt: &Prompt, error: &Error) {
        self.trace.step(
            "model_call",
            self.iteration_tag(),
            json!({ "operation": operation, "prompt": prompt, "error": error.to_string() }),
        );
    }

    fn spec_ready(&mut self, spec: GameSpec, events: &mut Vec<PipelineEvent>) {
        obs::emit_spec_ready(&spec.title, spec.kind.as_str(), spec.rounds.len());
        self.trace.set_metadata("kind", spec.kind);
        self.trace.set_metadata("spec_id", &spec.id);
        self.emit(events, PipelineEvent::SpecReady { spec: spec.clone() });
        self.spec = Some(spec);
    }

    fn draft_ready(&mut self, draft: &Draft, events: &mut Vec<PipelineEvent>) {
        if let Some(candidate) = draft.candidate() {
            let iteration = self.iteration;
            self.emit(events, PipelineEvent::ConfigDraft { iteration, candidate });
        }
    }

    fn emit(&mut self, events: &mut Vec<PipelineEvent>, event: PipelineEvent) {
        self.trace.step(event.name(), event.iteration(), &event);
        events.push(event);
    }

    fn complete(
        &mut self,
        events: &mut Vec<PipelineEvent>,
        spec: GameSpec,
        config: RendererConfig,
        score: Option<u8>,
        best_effort: bool,
    ) {
        self.emit(events, PipelineEvent::Complete { spec, config, score, best_effort });
        self.finish(TraceStatus::Complete, if best_effort { "best_effort" } else { "complete" });
    }

    fn fail(&mut self, error: Error, events: &mut Vec<PipelineEvent>) {
        obs::emit_run_failed(self.trace.run_id(), &error);
        let message = error.to_string();
        self.trace.error(self.iteration_tag(), &message);
        events.push(PipelineEvent::Error { message });
        self.finish(TraceStatus::Error, "error");
    }

    /// A later failure does not discard a valid candidate already in hand
    fn settle(&mut self, error: Error, spec: GameSpec, best: Best, events: &mut Vec<PipelineEvent>) {
        obs::emit_run_degraded(self.trace.run_id(), &error);
        self.trace.error(self.iteration_tag(), &error.to_string());
        self.complete(events, spec, best.config, Some(best.score), true);
    }

    fn finish(&mut self, status: TraceStatus, outcome: &str) {
        self.trace.set_metadata("critic_calls", self.critic_calls);
        self.trace.finish(status);
        obs::emit_run_finished(
            self.trace.run_id(),
            self.started.elapsed().as_millis() as u64,
            outcome,
            self.critic_calls,
        );
    }

    fn spec(&self) -> Result<GameSpec> {
        self.spec
            .clone()
            .ok_or_else(|| Error::unexpected("no spec has been designed yet").with_operation("pipeline::run"))
    }

    fn topic(&self) -> Option<&str> {
        self.request.profile.topic(self.request.topic.as_deref())
    }

    fn iteration_tag(&self) -> Option<u32> {
        (self.iteration > 0).then_some(self.iteration)
    }
}

fn smoke_props(spec: &GameSpec) -> Value {
    let rounds = serde_json::to_value(&spec.rounds).unwrap_or_else(|_| json!([]));
    Sandbox::<JsxCompiler>::default_props(&rounds)
}

fn custom_config(spec: &GameSpec, source: String, compiled: String) -> RendererConfig {
    RendererConfig::Custom(CustomComponent {
        source,
        compiled,
        rounds: spec.rounds.clone(),
    })
}

fn first_line(text: &str) -> &str {
    text.lines().map(str::trim).find(|l| !l.is_empty()).unwrap_or("critic feedback")
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;
    use gamecraft_engine::{
        CompletionRequest, CompletionResponse, FinishReason, ProviderError, ToolCall, TraceRecord, Usage,
    };
    use std::collections::VecDeque;
    use std::sync::Mutex;

    enum Reply {
        Tool(&'static str, Value),
        Text(String),
        Fail(ProviderError),
    }

    /// Plays back canned replies in order and records which tool each
    /// request asked for
    struct Scripted {
        replies: Mutex<VecDeque<Reply>>,
        calls: Mutex<Vec<String>>,
    }

    impl Scripted {
        fn new(replies: Vec<Reply>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl LlmProvider for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }

        fn default_model(&self) -> &str {
            "scripted-1"
        }

        async fn complete(&self, request: CompletionRequest) -> std::result::Result<CompletionResponse, ProviderError> {
            let tool = request
                .tools
                .as_ref()
                .and_then(|tools| tools.first())
                .map(|t| t.name.clone())
                .unwrap_or_default();
            self.calls.lock().unwrap().push(tool);

            let reply = self
                .replies
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| ProviderError::Other("script exhausted".into()))?;
            let usage = Usage {
                prompt_tokens: 7,
                completion_tokens: 3,
                total_tokens: 10,
            };
            let (content, tool_calls) = match reply {
                Reply::Tool(name, args) => (
                    None,
                    vec![ToolCall {
                        id: "call-1".into(),
                        name: name.into(),
                        arguments: args.to_string(),
                    }],
                ),
                Reply::Text(text) => (Some(text), vec![]),
                Reply::Fail(e) => return Err(e),
            };
            Ok(CompletionResponse {
                id: "resp-1".into(),
                model: "scripted-1".into(),
                content,
                tool_calls,
                finish_reason: FinishReason::Stop,
                usage,
            })
        }
    }

    fn profile() -> LearnerProfile {
        LearnerProfile::new("Ada", "chemistry")
    }

    fn spec_args(kind: &str) -> Value {
        json!({
            "title": "Phase Sorter",
            "kind": kind,
            "difficulty": 2,
            "rationale": {
                "concept": "states of matter",
                "pedagogicalGoal": "classify substances by state",
                "whyThisMechanic": "sorting forces a decision per item"
            },
            "rounds": [{ "round": 1, "focus": "everyday substances", "contentSeed": "iron, water, helium" }]
        })
    }

    fn config_args(prompt: &str) -> Value {
        json!({
            "rounds": [{
                "prompt": prompt,
                "buckets": [{ "label": "Solid" }, { "label": "Liquid" }, { "label": "Gas" }],
                "items": [
                    { "id": "iron", "label": "Iron", "correctBucket": 0 },
                    { "id": "water", "label": "Water", "correctBucket": 1 },
                    { "id": "helium", "label": "Helium", "correctBucket": 2 }
                ]
            }]
        })
    }

    fn broken_config_args() -> Value {
        json!({
            "rounds": [{
                "prompt": "Sort them",
                "buckets": [{ "label": "Solid" }, { "label": "Gas" }],
                "items": [
                    { "id": "iron", "label": "Iron", "correctBucket": 5 },
                    { "id": "helium", "label": "Helium", "correctBucket": 1 }
                ]
            }]
        })
    }

    fn critique_args(scores: [u8; 4]) -> Value {
        json!({
            "dimensions": {
                "structural_correctness": { "score": scores[0], "feedback": "ok" },
                "content_accuracy": { "score": scores[1], "feedback": "ok" },
                "playability": { "score": scores[2], "feedback": "too easy" },
                "educational_value": { "score": scores[3], "feedback": "ok" }
            },
            "revision_instructions": "add a harder round"
        })
    }

    fn custom_game_args(source: &str) -> Value {
        json!({ "spec": spec_args("custom"), "source": source })
    }

    fn edits_args(search: &str, replace: &str) -> Value {
        json!({
            "summary": "fix the component",
            "edits": [{ "type": "replace", "search": search, "replace": replace }]
        })
    }

    async fn run_all(pipeline: &Pipeline<Scripted>, request: GenerationRequest) -> Vec<PipelineEvent> {
        pipeline.run(request).collect().await
    }

    fn names(events: &[PipelineEvent]) -> Vec<&'static str> {
        events.iter().map(PipelineEvent::name).collect()
    }

    fn count(calls: &[String], tool: &str) -> usize {
        calls.iter().filter(|c| c.as_str() == tool).count()
    }

    #[tokio::test]
    async fn test_passes_on_first_attempt() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Scripted::new(vec![
            Reply::Tool(tools::SUBMIT_GAME_SPEC, spec_args("bucket_sort")),
            Reply::Tool(tools::SUBMIT_CONFIG, config_args("Sort by state")),
            Reply::Tool(tools::SUBMIT_CRITIQUE, critique_args([3, 3, 3, 2])),
        ]);
        let pipeline = Pipeline::with_config(provider, PipelineConfig::default().with_trace_dir(dir.path()));

        let events = run_all(&pipeline, GenerationRequest::new(profile())).await;
        assert_eq!(names(&events), vec!["spec_ready", "config_draft", "critic_result", "complete"]);
        match events.last().unwrap() {
            PipelineEvent::Complete { config, score, best_effort, .. } => {
                assert_eq!(config.kind(), GameKind::BucketSort);
                assert_eq!(*score, Some(11));
                assert!(!best_effort);
            }
            other => panic!("unexpected terminal event {:?}", other),
        }

        let entry = std::fs::read_dir(dir.path()).unwrap().next().unwrap().unwrap();
        let record: TraceRecord = serde_json::from_str(&std::fs::read_to_string(entry.path()).unwrap()).unwrap();
        assert_eq!(record.status, TraceStatus::Complete);
        assert_eq!(record.usage.total_tokens(), 30);
        assert_eq!(record.metadata["learner"], "Ada");
        assert_eq!(record.steps.iter().filter(|s| s.name == "model_call").count(), 3);
        assert_eq!(record.steps.last().unwrap().name, "complete");
    }

    #[tokio::test]
    async fn test_every_iteration_invalid_ends_in_error() {
        let provider = Scripted::new(vec![
            Reply::Tool(tools::SUBMIT_GAME_SPEC, spec_args("bucket_sort")),
            Reply::Tool(tools::SUBMIT_CONFIG, broken_config_args()),
            Reply::Tool(tools::SUBMIT_CONFIG, broken_config_args()),
            Reply::Tool(tools::SUBMIT_CONFIG, broken_config_args()),
        ]);
        let pipeline = Pipeline::new(provider);

        let events = run_all(&pipeline, GenerationRequest::new(profile())).await;
        assert_eq!(count(&pipeline.provider().calls(), tools::SUBMIT_CRITIQUE), 0);
        assert_eq!(count(&pipeline.provider().calls(), tools::SUBMIT_CONFIG), 3);
        assert_eq!(names(&events).iter().filter(|n| **n == "validation_error").count(), 3);
        assert_eq!(names(&events).iter().filter(|n| **n == "revision").count(), 2);

        let synthetic = events.iter().find_map(|e| match e {
            PipelineEvent::CriticResult { result, .. } => Some(result.clone()),
            _ => None,
        });
        let synthetic = synthetic.unwrap();
        assert_eq!(synthetic.total, 0);
        assert!(synthetic.revision_instructions.unwrap().contains("correctBucket 5"));

        match events.last().unwrap() {
            PipelineEvent::Error { message } => assert!(message.contains("Exhausted"), "{}", message),
            other => panic!("unexpected terminal event {:?}", other),
        }
        assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
    }

    #[tokio::test]
    async fn test_budget_spent_returns_best_candidate() {
        let provider = Scripted::new(vec![
            Reply::Tool(tools::SUBMIT_GAME_SPEC, spec_args("bucket_sort")),
            Reply::Tool(tools::SUBMIT_CONFIG, config_args("first")),
            Reply::Tool(tools::SUBMIT_CRITIQUE, critique_args([2, 2, 2, 2])),
            Reply::Tool(tools::SUBMIT_CONFIG, config_args("second")),
            Reply::Tool(tools::SUBMIT_CRITIQUE, critique_args([3, 2, 2, 2])),
            Reply::Tool(tools::SUBMIT_CONFIG, config_args("third")),
            Reply::Tool(tools::SUBMIT_CRITIQUE, critique_args([2, 2, 2, 1])),
        ]);
        let pipeline = Pipeline::new(provider);

        let events = run_all(&pipeline, GenerationRequest::new(profile())).await;
        assert_eq!(count(&pipeline.provider().calls(), tools::SUBMIT_CRITIQUE), 3);
        match events.last().unwrap() {
            PipelineEvent::Complete { config, score, best_effort, .. } => {
                assert!(best_effort);
                assert_eq!(*score, Some(9));
                match config {
                    RendererConfig::BucketSort { rounds } => assert_eq!(rounds[0].prompt, "second"),
                    other => panic!("unexpected config {:?}", other),
                }
            }
            other => panic!("unexpected terminal event {:?}", other),
        }
    }

    fn read_trace(dir: &std::path::Path) -> TraceRecord {
        let entry = std::fs::read_dir(dir).unwrap().next().unwrap().unwrap();
        serde_json::from_str(&std::fs::read_to_string(entry.path()).unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_unreadable_critique_keeps_best_candidate() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Scripted::new(vec![
            Reply::Tool(tools::SUBMIT_GAME_SPEC, spec_args("bucket_sort")),
            Reply::Tool(tools::SUBMIT_CONFIG, config_args("first")),
            Reply::Tool(tools::SUBMIT_CRITIQUE, critique_args([3, 2, 2, 2])),
            Reply::Tool(tools::SUBMIT_CONFIG, config_args("second")),
            Reply::Text("Looks great, ship it.".into()),
            Reply::Tool(tools::SUBMIT_CONFIG, config_args("third")),
            Reply::Tool(tools::SUBMIT_CRITIQUE, critique_args([2, 2, 2, 1])),
        ]);
        let pipeline = Pipeline::with_config(provider, PipelineConfig::default().with_trace_dir(dir.path()));

        let events = run_all(&pipeline, GenerationRequest::new(profile())).await;
        assert_eq!(count(&pipeline.provider().calls(), tools::SUBMIT_CRITIQUE), 3);
        assert_eq!(names(&events).iter().filter(|n| **n == "critic_result").count(), 3);
        assert!(!names(&events).contains(&"error"));
        match events.last().unwrap() {
            PipelineEvent::Complete { config, score, best_effort, .. } => {
                assert!(best_effort);
                assert_eq!(*score, Some(9));
                match config {
                    RendererConfig::BucketSort { rounds } => assert_eq!(rounds[0].prompt, "first"),
                    other => panic!("unexpected config {:?}", other),
                }
            }
            other => panic!("unexpected terminal event {:?}", other),
        }

        let record = read_trace(dir.path());
        let failed = record
            .steps
            .iter()
            .find(|s| s.name == "model_call" && s.payload.get("error").is_some())
            .unwrap();
        assert_eq!(failed.iteration, Some(2));
        assert_eq!(failed.payload["operation"], "critic::critique");
        assert!(failed.payload["prompt"]["user"].as_str().unwrap().contains("## Rubric"));
    }

    #[tokio::test]
    async fn test_provider_failure_after_scored_candidate_ships_it() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Scripted::new(vec![
            Reply::Tool(tools::SUBMIT_GAME_SPEC, spec_args("bucket_sort")),
            Reply::Tool(tools::SUBMIT_CONFIG, config_args("first")),
            Reply::Tool(tools::SUBMIT_CRITIQUE, critique_args([3, 2, 2, 2])),
            Reply::Fail(ProviderError::Network("connection reset".into())),
        ]);
        let pipeline = Pipeline::with_config(provider, PipelineConfig::default().with_trace_dir(dir.path()));

        let events = run_all(&pipeline, GenerationRequest::new(profile())).await;
        assert!(matches!(
            events.last(),
            Some(PipelineEvent::Complete { score: Some(9), best_effort: true, .. })
        ));

        let record = read_trace(dir.path());
        assert_eq!(record.status, TraceStatus::Complete);
        let error = record.steps.iter().find(|s| s.name == "error").unwrap();
        assert!(error.payload["message"].as_str().unwrap().contains("NetworkFailed"));
    }

    #[tokio::test]
    async fn test_trace_keeps_prompt_and_response() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Scripted::new(vec![
            Reply::Tool(tools::SUBMIT_GAME_SPEC, spec_args("bucket_sort")),
            Reply::Tool(tools::SUBMIT_CONFIG, config_args("Sort by state")),
            Reply::Tool(tools::SUBMIT_CRITIQUE, critique_args([3, 3, 3, 3])),
        ]);
        let pipeline = Pipeline::with_config(provider, PipelineConfig::default().with_trace_dir(dir.path()));
        run_all(&pipeline, GenerationRequest::new(profile())).await;

        let record = read_trace(dir.path());
        let calls: Vec<&Value> = record
            .steps
            .iter()
            .filter(|s| s.name == "model_call")
            .map(|s| &s.payload)
            .collect();
        assert_eq!(calls.len(), 3);

        let design = calls[0];
        assert_eq!(design["operation"], "pipeline::design");
        assert!(design["prompt"]["system"].as_str().unwrap().starts_with("You design"));
        assert!(design["prompt"]["user"].as_str().unwrap().contains("- Name: Ada"));
        assert_eq!(design["response"]["arguments"]["title"], "Phase Sorter");
        assert!(design["response"]["content"].is_null());

        assert_eq!(calls[1]["response"]["arguments"]["rounds"][0]["prompt"], "Sort by state");
        assert_eq!(calls[2]["operation"], "critic::critique");
    }

    #[tokio::test]
    async fn test_oversized_budget_stops_at_three_attempts() {
        let mut replies = vec![Reply::Tool(tools::SUBMIT_GAME_SPEC, spec_args("bucket_sort"))];
        for _ in 0..5 {
            replies.push(Reply::Tool(tools::SUBMIT_CONFIG, config_args("again")));
            replies.push(Reply::Tool(tools::SUBMIT_CRITIQUE, critique_args([2, 2, 2, 2])));
        }
        let config = PipelineConfig {
            max_iterations: 10,
            ..PipelineConfig::default()
        };
        let pipeline = Pipeline::with_config(Scripted::new(replies), config);

        let events = run_all(&pipeline, GenerationRequest::new(profile())).await;
        assert_eq!(count(&pipeline.provider().calls(), tools::SUBMIT_CRITIQUE), 3);
        assert!(matches!(events.last(), Some(PipelineEvent::Complete { best_effort: true, .. })));
    }

    #[tokio::test]
    async fn test_invalid_then_valid_shares_budget() {
        let provider = Scripted::new(vec![
            Reply::Tool(tools::SUBMIT_GAME_SPEC, spec_args("bucket_sort")),
            Reply::Tool(tools::SUBMIT_CONFIG, broken_config_args()),
            Reply::Text("Sorry, here is my config as prose.".into()),
            Reply::Tool(tools::SUBMIT_CONFIG, config_args("fixed")),
            Reply::Tool(tools::SUBMIT_CRITIQUE, critique_args([3, 3, 3, 3])),
        ]);
        let pipeline = Pipeline::new(provider);

        let events = run_all(&pipeline, GenerationRequest::new(profile())).await;
        let revisions: Vec<u32> = events
            .iter()
            .filter_map(|e| match e {
                PipelineEvent::Revision { iteration, .. } => Some(*iteration),
                _ => None,
            })
            .collect();
        assert_eq!(revisions, vec![2, 3]);
        assert!(matches!(events.last(), Some(PipelineEvent::Complete { best_effort: false, .. })));
    }

    #[tokio::test]
    async fn test_design_failure_is_fatal() {
        let mut spec = spec_args("bucket_sort");
        spec.as_object_mut().unwrap().remove("title");
        let provider = Scripted::new(vec![Reply::Tool(tools::SUBMIT_GAME_SPEC, spec)]);
        let pipeline = Pipeline::new(provider);

        let events = run_all(&pipeline, GenerationRequest::new(profile())).await;
        assert_eq!(names(&events), vec!["error"]);
        assert_eq!(pipeline.provider().calls().len(), 1);
        match &events[0] {
            PipelineEvent::Error { message } => assert!(message.contains("title"), "{}", message),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_incomplete_profile_makes_no_calls() {
        let pipeline = Pipeline::new(Scripted::new(vec![]));
        let events = run_all(&pipeline, GenerationRequest::new(LearnerProfile::new("Ada", ""))).await;
        assert_eq!(names(&events), vec!["error"]);
        assert!(pipeline.provider().calls().is_empty());
    }

    #[tokio::test]
    async fn test_forced_kind_and_provider_failure() {
        let provider = Scripted::new(vec![
            Reply::Tool(tools::SUBMIT_GAME_SPEC, spec_args("bucket_sort")),
            Reply::Fail(ProviderError::Network("connection reset".into())),
        ]);
        let pipeline = Pipeline::new(provider);

        let request = GenerationRequest::new(profile()).with_kind(GameKind::Quiz);
        let events = run_all(&pipeline, request).await;
        match &events[0] {
            PipelineEvent::SpecReady { spec } => assert_eq!(spec.kind, GameKind::Quiz),
            other => panic!("unexpected event {:?}", other),
        }
        match events.last().unwrap() {
            PipelineEvent::Error { message } => assert!(message.contains("NetworkFailed"), "{}", message),
            other => panic!("unexpected terminal event {:?}", other),
        }
        assert_eq!(pipeline.provider().calls().len(), 2);
    }

    #[tokio::test]
    async fn test_fenced_text_reply_is_accepted() {
        let spec_text = format!("Here is the design:\n```json\n{}\n```", spec_args("bucket_sort"));
        let provider = Scripted::new(vec![
            Reply::Text(spec_text),
            Reply::Tool(tools::SUBMIT_CONFIG, config_args("Sort by state")),
            Reply::Tool(tools::SUBMIT_CRITIQUE, critique_args([3, 3, 2, 3])),
        ]);
        let pipeline = Pipeline::new(provider);

        let events = run_all(&pipeline, GenerationRequest::new(profile())).await;
        assert!(matches!(events.last(), Some(PipelineEvent::Complete { best_effort: false, .. })));
    }

    #[tokio::test]
    async fn test_custom_template_path_edits_component() {
        let provider = Scripted::new(vec![
            Reply::Tool(tools::SUBMIT_GAME_SPEC, spec_args("custom")),
            Reply::Tool(
                tools::SUBMIT_COMPONENT,
                json!({ "source": "function Game({ config }) {\n  return <div>{window.name}</div>;\n}" }),
            ),
            Reply::Tool(tools::PROPOSE_EDITS, edits_args("{window.name}", "{config.length} rounds")),
            Reply::Tool(tools::SUBMIT_CRITIQUE, critique_args([3, 3, 3, 3])),
        ]);
        let pipeline = Pipeline::new(provider);

        let events = run_all(&pipeline, GenerationRequest::new(profile())).await;
        assert_eq!(
            names(&events),
            vec![
                "spec_ready",
                "config_draft",
                "validation_error",
                "critic_result",
                "revision",
                "config_draft",
                "critic_result",
                "complete"
            ]
        );
        match events.last().unwrap() {
            PipelineEvent::Complete { config, .. } => {
                let component = config.as_custom().unwrap();
                assert!(component.source.contains("{config.length} rounds"));
                assert!(component.compiled.contains("h(\"div\""));
            }
            other => panic!("unexpected terminal event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_fast_path_passes_without_critic() {
        let provider = Scripted::new(vec![Reply::Tool(
            tools::SUBMIT_CUSTOM_GAME,
            custom_game_args("function Game({ config }) { return <div>{config[0].focus}</div>; }"),
        )]);
        let pipeline = Pipeline::new(provider);

        let events = run_all(&pipeline, GenerationRequest::new(profile()).force_custom()).await;
        assert_eq!(names(&events), vec!["spec_ready", "config_draft", "complete"]);
        assert!(matches!(
            events.last(),
            Some(PipelineEvent::Complete { score: None, best_effort: false, .. })
        ));
        assert_eq!(pipeline.provider().calls(), vec![tools::SUBMIT_CUSTOM_GAME]);
    }

    #[tokio::test]
    async fn test_fast_path_single_fix() {
        let provider = Scripted::new(vec![
            Reply::Tool(tools::SUBMIT_CUSTOM_GAME, custom_game_args("function Main() { return <div>hi</div>; }")),
            Reply::Tool(tools::PROPOSE_EDITS, edits_args("function Main(", "function Game(")),
        ]);
        let pipeline = Pipeline::new(provider);

        let events = run_all(&pipeline, GenerationRequest::new(profile()).force_custom()).await;
        assert_eq!(
            names(&events),
            vec!["spec_ready", "config_draft", "validation_error", "revision", "config_draft", "complete"]
        );
        assert!(matches!(events.last(), Some(PipelineEvent::Complete { best_effort: false, .. })));
        assert_eq!(pipeline.provider().calls().len(), 2);
    }

    #[tokio::test]
    async fn test_fast_path_ships_compiled_source_despite_smoke_failure() {
        let provider = Scripted::new(vec![
            Reply::Tool(
                tools::SUBMIT_CUSTOM_GAME,
                custom_game_args("function Game({ config }) { return <p>{config[5].focus}</p>; }"),
            ),
            Reply::Tool(tools::PROPOSE_EDITS, edits_args("config[5]", "config[4]")),
        ]);
        let pipeline = Pipeline::new(provider);

        let events = run_all(&pipeline, GenerationRequest::new(profile()).force_custom()).await;
        match events.last().unwrap() {
            PipelineEvent::Complete { config, best_effort, .. } => {
                assert!(best_effort);
                assert!(config.as_custom().unwrap().source.contains("config[4]"));
            }
            other => panic!("unexpected terminal event {:?}", other),
        }
        assert_eq!(pipeline.provider().calls().len(), 2);
    }

    #[tokio::test]
    async fn test_fast_path_compile_failure_after_fix_is_error() {
        let provider = Scripted::new(vec![
            Reply::Tool(tools::SUBMIT_CUSTOM_GAME, custom_game_args("function Game() { return <div><b></div>; }")),
            Reply::Tool(tools::PROPOSE_EDITS, edits_args("<b>", "<i>")),
        ]);
        let pipeline = Pipeline::new(provider);

        let events = run_all(&pipeline, GenerationRequest::new(profile()).force_custom()).await;
        match events.last().unwrap() {
            PipelineEvent::Error { message } => assert!(message.contains("CompileFailed"), "{}", message),
            other => panic!("unexpected terminal event {:?}", other),
        }
        assert_eq!(count(&pipeline.provider().calls(), tools::PROPOSE_EDITS), 1);
    }

    #[tokio::test]
    async fn test_dropping_stream_abandons_trace() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Scripted::new(vec![
            Reply::Tool(tools::SUBMIT_GAME_SPEC, spec_args("bucket_sort")),
            Reply::Tool(tools::SUBMIT_CONFIG, config_args("never requested")),
        ]);
        let pipeline = Pipeline::with_config(provider, PipelineConfig::default().with_trace_dir(dir.path()));

        let mut stream = Box::pin(pipeline.run(GenerationRequest::new(profile())));
        let first = stream.next().await.unwrap();
        assert_eq!(first.name(), "spec_ready");
        drop(stream);

        assert_eq!(pipeline.provider().calls().len(), 1);
        let entry = std::fs::read_dir(dir.path()).unwrap().next().unwrap().unwrap();
        let record: TraceRecord = serde_json::from_str(&std::fs::read_to_string(entry.path()).unwrap()).unwrap();
        assert_eq!(record.status, TraceStatus::Error);
        assert_eq!(record.steps.last().unwrap().name, "abandoned");
    }
}
