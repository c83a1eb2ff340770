//! # gamecraft engine
//!
//! The building blocks a generation run is made of. Nothing here drives a
//! run; the pipeline crate does that.
//!
//! ## Core Concepts
//! - **Spec**: design-level description of an exercise ([`GameSpec`])
//! - **Config**: the renderer-ready artifact ([`RendererConfig`])
//! - **Validator**: structural rules per renderer kind
//! - **Sandbox**: policy, compile and smoke gates for freeform components
//! - **Edits**: anchored text edits applied to component source
//! - **Trace**: per-run JSON record of every step
//! - **Provider**: trait-based model gateway (OpenAI, Anthropic, local)

pub mod catalog;
pub mod config;
pub mod edit;
pub mod error;
pub mod provider;
pub mod sandbox;
pub mod spec;
pub mod storage;
pub mod trace;
pub mod validate;

pub use catalog::{RendererCatalog, RendererEntry};
pub use config::{CustomComponent, RendererConfig};
pub use edit::{apply_edits, EditError, EditOperation, EditOutcome};
pub use error::{Error, ErrorKind, ErrorStatus, Result};
pub use provider::{
    AnthropicProvider, ChatMessage, CompletionRequest, CompletionResponse, FinishReason, LlmProvider,
    OpenAIProvider, ProviderConfig, ProviderError, ProviderType, Role, ToolCall, ToolChoice, ToolDefinition,
    Usage, UsageTracker,
};
pub use sandbox::{JsxCompiler, Sandbox, SandboxReport, SourceCompiler, SourcePolicy};
pub use spec::{CompletionRequirement, GameKind, GameSpec, Rationale, RoundSpec};
pub use storage::{FileStorage, MemoryStorage, StorageBackend};
pub use trace::{TraceRecord, TraceRecorder, TraceStatus, TraceStep};
pub use validate::{validate, ValidationReport};
