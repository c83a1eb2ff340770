//! # Sandbox Executor
//!
//! Gates model-written component source behind three ordered checks:
//!
//! 1. static policy ([`SourcePolicy`])
//! 2. compilation ([`SourceCompiler`], default [`JsxCompiler`])
//! 3. a smoke render ([`SmokeRunner`])
//!
//! A later gate never runs when an earlier one failed, and each failure is
//! reported on its own so revision feedback can say exactly which gate broke.

mod jsx;
mod policy;
mod smoke;

pub use jsx::{CompileError, JsxCompiler, SourceCompiler, FACTORY_PARAMS};
pub use policy::{RuleCategory, SourcePolicy, Violation};
pub use smoke::{SmokeOutcome, SmokeRunner, THEME_JSON};

use crate::error::{self, Error};
use serde::Serialize;
use serde_json::Value;

/// Component sources longer than this are rejected by policy
pub const MAX_SOURCE_LINES: usize = 600;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "gate", rename_all = "snake_case")]
pub enum SandboxReport {
    Rejected { violations: Vec<Violation> },
    CompileFailed { error: CompileError },
    SmokeFailed { compiled: String, message: String },
    Passed { compiled: String, rendered_nodes: usize },
}

impl SandboxReport {
    pub fn passed(&self) -> bool {
        matches!(self, SandboxReport::Passed { .. })
    }

    /// Compiled factory, when the source got through compilation
    pub fn compiled(&self) -> Option<&str> {
        match self {
            SandboxReport::SmokeFailed { compiled, .. } | SandboxReport::Passed { compiled, .. } => Some(compiled),
            _ => None,
        }
    }

    /// Human-readable problems, suitable as revision instructions
    pub fn problems(&self) -> Vec<String> {
        match self {
            SandboxReport::Rejected { violations } => {
                violations.iter().map(|v| format!("policy: {}", v)).collect()
            }
            SandboxReport::CompileFailed { error } => vec![format!("compile: {}", error)],
            SandboxReport::SmokeFailed { message, .. } => vec![format!("render: {}", message)],
            SandboxReport::Passed { .. } => Vec::new(),
        }
    }

    /// The failing gate as an error, `None` when every gate passed
    pub fn error(&self) -> Option<Error> {
        match self {
            SandboxReport::Rejected { violations } => {
                let rules: Vec<String> = violations.iter().map(|v| v.to_string()).collect();
                Some(error::policy_violation(&rules))
            }
            SandboxReport::CompileFailed { error } => Some(error.clone().into()),
            SandboxReport::SmokeFailed { message, .. } => Some(error::sandbox_failed(message.clone())),
            SandboxReport::Passed { .. } => None,
        }
    }

    pub fn gate(&self) -> &'static str {
        match self {
            SandboxReport::Rejected { .. } => "policy",
            SandboxReport::CompileFailed { .. } => "compile",
            SandboxReport::SmokeFailed { .. } => "smoke",
            SandboxReport::Passed { .. } => "passed",
        }
    }
}

/// The three gates, in order
pub struct Sandbox<C: SourceCompiler = JsxCompiler> {
    policy: SourcePolicy,
    compiler: C,
    runner: SmokeRunner,
}

impl Default for Sandbox<JsxCompiler> {
    fn default() -> Self {
        Self::new()
    }
}

impl Sandbox<JsxCompiler> {
    pub fn new() -> Self {
        Self::with_compiler(JsxCompiler::new())
    }
}

impl<C: SourceCompiler> Sandbox<C> {
    pub fn with_compiler(compiler: C) -> Self {
        Self {
            policy: SourcePolicy::new(),
            compiler,
            runner: SmokeRunner::new(),
        }
    }

    pub fn with_policy(mut self, policy: SourcePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_runner(mut self, runner: SmokeRunner) -> Self {
        self.runner = runner;
        self
    }

    /// Default props for a smoke render: the rounds as `config`
    pub fn default_props(rounds: &Value) -> Value {
        serde_json::json!({ "config": rounds })
    }

    /// Run the gates over `source`, rendering with `props` if it gets that far
    pub fn check(&self, source: &str, props: &Value) -> SandboxReport {
        let violations = self.policy.check(source);
        if !violations.is_empty() {
            tracing::debug!(event = "sandbox_gate", gate = "policy", violations = violations.len());
            return SandboxReport::Rejected { violations };
        }

        let compiled = match self.compiler.compile(source) {
            Ok(compiled) => compiled,
            Err(error) => {
                tracing::debug!(event = "sandbox_gate", gate = "compile", %error);
                return SandboxReport::CompileFailed { error };
            }
        };

        match self.runner.run(&compiled, props) {
            Ok(outcome) => {
                tracing::debug!(event = "sandbox_gate", gate = "passed", nodes = outcome.rendered_nodes);
                SandboxReport::Passed {
                    compiled,
                    rendered_nodes: outcome.rendered_nodes,
                }
            }
            Err(message) => {
                tracing::debug!(event = "sandbox_gate", gate = "smoke", %message);
                SandboxReport::SmokeFailed { compiled, message }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingCompiler {
        calls: Arc<AtomicUsize>,
    }

    impl SourceCompiler for CountingCompiler {
        fn compile(&self, source: &str) -> Result<String, CompileError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            JsxCompiler::new().compile(source)
        }
    }

    fn props() -> Value {
        Sandbox::<JsxCompiler>::default_props(&json!([{ "round": 1, "focus": "fractions" }]))
    }

    #[test]
    fn test_missing_entry_point_never_compiles() {
        let calls = Arc::new(AtomicUsize::new(0));
        let sandbox = Sandbox::with_compiler(CountingCompiler { calls: calls.clone() });

        let report = sandbox.check("function Main() { return <div/>; }", &props());
        assert_eq!(report.gate(), "policy");
        assert!(report.problems()[0].contains("entry point"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        let report = sandbox.check("function Game() { return <div>ok</div>; }", &props());
        assert!(report.passed());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_compile_failure_is_its_own_gate() {
        let report = Sandbox::new().check("function Game() { return <div><b></div>; }", &props());
        assert_eq!(report.gate(), "compile");
        assert!(report.compiled().is_none());
        assert_eq!(report.error().unwrap().kind(), crate::error::ErrorKind::CompileFailed);
    }

    #[test]
    fn test_smoke_failure_keeps_compiled_output() {
        let report = Sandbox::new().check(
            "export default function Game({ config }) { return <p>{config[5].focus}</p>; }",
            &props(),
        );
        assert_eq!(report.gate(), "smoke");
        assert!(report.compiled().unwrap().contains("h(\"p\""));
        assert!(report.problems()[0].starts_with("render: "));
    }

    #[test]
    fn test_report_serializes_with_gate_tag() {
        let report = Sandbox::new().check("const Game = () => <main>hi</main>;", &props());
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["gate"], "passed");
        assert_eq!(json["rendered_nodes"], 2);
    }
}
