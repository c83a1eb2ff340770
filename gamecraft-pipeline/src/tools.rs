//! # Tool Catalog
//!
//! JSON-schema tool definitions for every model call the pipeline makes, and
//! the one place where a model reply is turned into tool arguments.
//!
//! Tool calls are the preferred channel. When a model answers in prose
//! instead, the first fenced (or bare) JSON object in the text is used.

use crate::config::PipelineConfig;
use crate::prompts::Prompt;
use gamecraft_engine::{CompletionRequest, CompletionResponse, GameKind, LlmProvider, ToolDefinition, Usage};
use gamecraft_error::{Error, ErrorKind, Result};
use serde_json::{json, Value};
use std::time::Duration;

pub const SUBMIT_GAME_SPEC: &str = "submit_game_spec";
pub const SUBMIT_CONFIG: &str = "submit_config";
pub const SUBMIT_COMPONENT: &str = "submit_component";
pub const PROPOSE_EDITS: &str = "propose_edits";
pub const SUBMIT_CRITIQUE: &str = "submit_critique";
pub const SUBMIT_CUSTOM_GAME: &str = "submit_custom_game";

fn game_spec_schema() -> Value {
    let kinds: Vec<&str> = GameKind::ALL.iter().map(|k| k.as_str()).collect();
    json!({
        "type": "object",
        "properties": {
            "title": { "type": "string" },
            "kind": { "type": "string", "enum": kinds },
            "difficulty": { "type": "integer", "minimum": 1, "maximum": 5 },
            "rationale": {
                "type": "object",
                "properties": {
                    "concept": { "type": "string", "description": "The single concept the game teaches" },
                    "pedagogicalGoal": { "type": "string" },
                    "whyThisMechanic": { "type": "string" }
                },
                "required": ["concept", "pedagogicalGoal", "whyThisMechanic"]
            },
            "rounds": {
                "type": "array",
                "minItems": 1,
                "items": {
                    "type": "object",
                    "properties": {
                        "round": { "type": "integer" },
                        "focus": { "type": "string" },
                        "contentSeed": { "type": "string", "description": "Concrete material for this round" }
                    },
                    "required": ["focus"]
                }
            },
            "completion": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "description": { "type": "string" },
                        "condition": { "type": "string", "description": "Pseudocode the critic can check" }
                    },
                    "required": ["description", "condition"]
                }
            }
        },
        "required": ["title", "kind", "rationale", "rounds"]
    })
}

pub fn submit_game_spec() -> ToolDefinition {
    ToolDefinition::new(SUBMIT_GAME_SPEC, "Submit the design of the learning game").with_parameters(game_spec_schema())
}

pub fn submit_config() -> ToolDefinition {
    ToolDefinition::new(
        SUBMIT_CONFIG,
        "Submit the renderer config: one entry in `rounds` per designed round, in order",
    )
    .with_parameters(json!({
        "type": "object",
        "properties": {
            "rounds": { "type": "array", "items": { "type": "object" } }
        },
        "required": ["rounds"]
    }))
}

pub fn submit_component() -> ToolDefinition {
    ToolDefinition::new(SUBMIT_COMPONENT, "Submit the JSX source of the Game component").with_parameters(json!({
        "type": "object",
        "properties": {
            "source": { "type": "string", "description": "Complete JSX source defining function Game" },
            "notes": { "type": "string" }
        },
        "required": ["source"]
    }))
}

pub fn propose_edits() -> ToolDefinition {
    ToolDefinition::new(
        PROPOSE_EDITS,
        "Propose text edits that fix the component. Prefer small replace/insert_after edits; \
         use full_rewrite only when the structure is wrong.",
    )
    .with_parameters(json!({
        "type": "object",
        "properties": {
            "summary": { "type": "string", "description": "One sentence on what the edits change" },
            "edits": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "type": { "type": "string", "enum": ["replace", "insert_after", "full_rewrite"] },
                        "search": { "type": "string", "description": "replace: exact text, must occur once" },
                        "replace": { "type": "string" },
                        "anchor": { "type": "string", "description": "insert_after: a whole line, must occur once" },
                        "content": { "type": "string" }
                    },
                    "required": ["type"]
                }
            }
        },
        "required": ["summary", "edits"]
    }))
}

pub fn submit_critique() -> ToolDefinition {
    let dimension = json!({
        "type": "object",
        "properties": {
            "score": { "type": "integer", "minimum": 0, "maximum": 3 },
            "feedback": { "type": "string" }
        },
        "required": ["score", "feedback"]
    });
    ToolDefinition::new(SUBMIT_CRITIQUE, "Score the game on each rubric dimension").with_parameters(json!({
        "type": "object",
        "properties": {
            "dimensions": {
                "type": "object",
                "properties": {
                    "structural_correctness": dimension,
                    "content_accuracy": dimension,
                    "playability": dimension,
                    "educational_value": dimension
                },
                "required": ["structural_correctness", "content_accuracy", "playability", "educational_value"]
            },
            "revision_instructions": {
                "type": "string",
                "description": "Concrete changes that would raise the lowest scores"
            }
        },
        "required": ["dimensions"]
    }))
}

pub fn submit_custom_game() -> ToolDefinition {
    ToolDefinition::new(SUBMIT_CUSTOM_GAME, "Submit the game design and its JSX component together").with_parameters(
        json!({
            "type": "object",
            "properties": {
                "spec": game_spec_schema(),
                "source": { "type": "string", "description": "Complete JSX source defining function Game" }
            },
            "required": ["spec", "source"]
        }),
    )
}

// ============================================================================
// Calling tools
// ============================================================================

/// Tool arguments plus the exchange that produced them and what it cost
#[derive(Debug, Clone)]
pub struct ToolReply {
    pub arguments: Value,
    pub prompt: Prompt,
    /// Text the model wrote besides (or instead of) the tool call
    pub content: Option<String>,
    pub model: String,
    pub usage: Usage,
}

/// Make one model call that must answer through `tool`
pub async fn call_tool<P: LlmProvider>(
    provider: &P,
    config: &PipelineConfig,
    prompt: Prompt,
    tool: ToolDefinition,
    operation: &'static str,
) -> Result<ToolReply> {
    let name = tool.name.clone();
    let mut request = CompletionRequest::new(prompt.clone().into_messages())
        .with_required_tool(tool)
        .with_max_tokens(config.max_tokens);
    if let Some(model) = &config.model {
        request = request.with_model(model.clone());
    }
    if let Some(temperature) = config.temperature {
        request = request.with_temperature(temperature);
    }

    let response = tokio::time::timeout(Duration::from_secs(config.call_timeout_secs), provider.complete(request))
        .await
        .map_err(|_| {
            Error::new(ErrorKind::InferenceFailed, format!("model call timed out after {}s", config.call_timeout_secs))
                .with_operation(operation)
                .temporary()
        })?
        .map_err(|e| e.into_error(operation))?;

    let arguments = tool_arguments(&response, &name).map_err(|e| e.with_operation(operation))?;
    Ok(ToolReply {
        arguments,
        prompt,
        content: response.content,
        model: response.model,
        usage: response.usage,
    })
}

/// Arguments of the named tool call, falling back to JSON in the text body
pub fn tool_arguments(response: &CompletionResponse, tool: &str) -> Result<Value> {
    if let Some(call) = response.tool_call(tool) {
        return call.parse_arguments::<Value>().map_err(|e| {
            Error::parse_failed(format!("`{}` arguments are not valid JSON: {}", tool, e))
                .with_context("tool", tool)
                .set_source(e)
        });
    }

    response
        .content
        .as_deref()
        .and_then(extract_json)
        .ok_or_else(|| {
            Error::parse_failed(format!("model did not call `{}` and its reply contains no JSON object", tool))
                .with_context("tool", tool)
        })
}

/// Find a JSON object in free text: a ```json fence, any fence, the whole
/// text, then the outermost `{...}` span.
pub fn extract_json(text: &str) -> Option<Value> {
    let fenced = |marker: &str| -> Option<&str> {
        text.split(marker).nth(1).and_then(|s| s.split("```").next()).map(str::trim)
    };

    let candidates = [fenced("```json"), fenced("```"), Some(text.trim()), outer_braces(text)];
    candidates
        .into_iter()
        .flatten()
        .filter_map(|s| serde_json::from_str::<Value>(s).ok())
        .find(Value::is_object)
}

fn outer_braces(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}
