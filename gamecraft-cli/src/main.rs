//! # gamecraft CLI
//!
//! Command-line interface for the generation pipeline and its checkers.
//!
//! Usage:
//!   gamecraft generate --profile <learner.json> [--topic <t>] [--kind <k>] [--custom] [--output <file>]
//!   gamecraft validate --kind <k> <config.json>
//!   gamecraft check-component <Game.jsx> [--rounds <rounds.json>]
//!   gamecraft kinds
//!
//! Examples:
//!   gamecraft generate -p ada.json -t "simple machines" -o game.json
//!   GAMECRAFT_PROVIDER=anthropic gamecraft generate -p ada.json --custom
//!   gamecraft validate -k bucket_sort game.json

use clap::{Args, Parser, Subcommand};
use futures_util::StreamExt;
use gamecraft_engine::{
    validate, AnthropicProvider, CompletionRequest, CompletionResponse, Error, GameKind, JsxCompiler, LlmProvider,
    OpenAIProvider, ProviderConfig, ProviderError, ProviderType, RendererCatalog, Result, Sandbox, SandboxReport,
};
use gamecraft_pipeline::{GenerationRequest, LearnerProfile, Pipeline, PipelineConfig, PipelineEvent, MAX_ITERATIONS};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "gamecraft")]
#[command(author, version, about = "gamecraft - personalized learning games, designed and checked")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Debug-level logs (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    log_json: bool,

    /// Quiet mode - only print the final artifact
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a game for a learner
    Generate(GenerateArgs),
    /// Check a structured renderer config
    Validate {
        /// Renderer kind, e.g. bucket_sort
        #[arg(short, long)]
        kind: String,

        /// Config JSON: `{ "rounds": [...] }` or a bare array of rounds
        file: PathBuf,
    },
    /// Run a JSX component through policy, compilation and a smoke render
    CheckComponent {
        /// Component source file
        file: PathBuf,

        /// JSON array passed as the `config` prop
        #[arg(short, long)]
        rounds: Option<PathBuf>,
    },
    /// Show the renderer catalog
    Kinds {
        /// Print as JSON instead of prompt text
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args)]
struct GenerateArgs {
    /// Learner profile JSON
    #[arg(short, long)]
    profile: PathBuf,

    /// Topic hint; defaults to the profile's current topic
    #[arg(short, long)]
    topic: Option<String>,

    /// Force a renderer kind
    #[arg(short, long)]
    kind: Option<String>,

    /// Freeform component in one shot, no critic
    #[arg(long)]
    custom: bool,

    /// Write the final artifact here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Build attempts, initial build included (at most 3)
    #[arg(long, default_value = "3", value_parser = clap::value_parser!(u32).range(1..=MAX_ITERATIONS as i64))]
    max_iterations: u32,

    /// Directory for per-run trace files
    #[arg(long, env = "GAMECRAFT_TRACE_DIR")]
    trace_dir: Option<PathBuf>,

    #[command(flatten)]
    provider: ProviderArgs,
}

#[derive(Args)]
struct ProviderArgs {
    /// openai, anthropic or local
    #[arg(long, env = "GAMECRAFT_PROVIDER", default_value = "openai")]
    provider: String,

    #[arg(long, env = "GAMECRAFT_MODEL")]
    model: Option<String>,

    #[arg(long, env = "GAMECRAFT_BASE_URL")]
    base_url: Option<String>,

    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    openai_api_key: Option<String>,

    #[arg(long, env = "ANTHROPIC_API_KEY", hide_env_values = true)]
    anthropic_api_key: Option<String>,
}

/// The providers this binary can talk to
enum Provider {
    OpenAI(OpenAIProvider),
    Anthropic(AnthropicProvider),
}

impl LlmProvider for Provider {
    fn name(&self) -> &str {
        match self {
            Provider::OpenAI(p) => p.name(),
            Provider::Anthropic(p) => p.name(),
        }
    }

    fn default_model(&self) -> &str {
        match self {
            Provider::OpenAI(p) => p.default_model(),
            Provider::Anthropic(p) => p.default_model(),
        }
    }

    async fn complete(&self, request: CompletionRequest) -> std::result::Result<CompletionResponse, ProviderError> {
        match self {
            Provider::OpenAI(p) => p.complete(request).await,
            Provider::Anthropic(p) => p.complete(request).await,
        }
    }
}

fn connect(args: &ProviderArgs) -> Result<Provider> {
    let provider_type: ProviderType = args.provider.parse()?;
    let mut config = match provider_type {
        ProviderType::OpenAI => ProviderConfig::openai(require_key(args.openai_api_key.as_deref(), "OPENAI_API_KEY")?),
        ProviderType::Anthropic => {
            ProviderConfig::anthropic(require_key(args.anthropic_api_key.as_deref(), "ANTHROPIC_API_KEY")?)
        }
        ProviderType::Local => ProviderConfig::local(
            args.base_url.as_deref().unwrap_or("http://localhost:8000/v1"),
            args.model.as_deref().unwrap_or("default"),
        ),
    };
    if let Some(model) = &args.model {
        config = config.with_model(model.as_str());
    }
    if let Some(base_url) = &args.base_url {
        config = config.with_base_url(base_url.as_str());
    }

    Ok(match provider_type {
        ProviderType::Anthropic => Provider::Anthropic(AnthropicProvider::new(config)?),
        ProviderType::OpenAI | ProviderType::Local => Provider::OpenAI(OpenAIProvider::new(config)?),
    })
}

fn require_key(key: Option<&str>, var: &'static str) -> Result<String> {
    key.map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_string)
        .ok_or_else(|| Error::config_invalid(var, format!("{} is not set", var)))
}

fn init_tracing(json: bool, level: Level) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));

    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr).json())
            .try_init()
            .ok();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .try_init()
            .ok();
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        format!("{}…", s.chars().take(max_chars).collect::<String>())
    }
}

fn fail(message: impl std::fmt::Display) -> ! {
    eprintln!("Error: {}", message);
    std::process::exit(1);
}

fn read_json(path: &Path) -> Value {
    let content = std::fs::read_to_string(path).unwrap_or_else(|e| fail(format!("reading {}: {}", path.display(), e)));
    serde_json::from_str(&content).unwrap_or_else(|e| fail(format!("parsing {}: {}", path.display(), e)))
}

fn parse_kind(raw: &str) -> GameKind {
    raw.parse().unwrap_or_else(|e| fail(e))
}

/// Progress lines for one event. `generate` writes them to stderr so stdout
/// carries only the artifact.
fn progress_lines(event: &PipelineEvent) -> Vec<String> {
    let mut lines = Vec::new();
    match event {
        PipelineEvent::SpecReady { spec } => {
            lines.push(format!(
                "spec ready: \"{}\" ({}, {} round(s), difficulty {})",
                spec.title,
                spec.kind,
                spec.rounds.len(),
                spec.difficulty
            ));
            lines.push(format!("   concept: {}", spec.rationale.concept));
        }
        PipelineEvent::ConfigDraft { iteration, .. } => lines.push(format!("[{}] draft ready", iteration)),
        PipelineEvent::ValidationError { iteration, errors } => {
            lines.push(format!("[{}] {} structural problem(s)", iteration, errors.len()));
            for error in errors.iter().take(10) {
                lines.push(format!("      - {}", truncate(error, 120)));
            }
            if errors.len() > 10 {
                lines.push(format!("      ... ({} more)", errors.len() - 10));
            }
        }
        PipelineEvent::CriticResult { iteration, result } => {
            lines.push(format!(
                "[{}] critic: {}/12 {}",
                iteration,
                result.total,
                if result.passed { "PASS" } else { "FAIL" }
            ));
            for d in &result.dimensions {
                lines.push(format!("      {:<24} {}/3 {}", d.name, d.score, truncate(&d.feedback, 80)));
            }
        }
        PipelineEvent::Revision { iteration, summary } => {
            lines.push(format!("[{}] revision: {}", iteration, truncate(summary, 120)))
        }
        PipelineEvent::Complete {
            config,
            score,
            best_effort,
            ..
        } => {
            let score = score.map(|s| format!(", score {}/12", s)).unwrap_or_default();
            let note = if *best_effort { " (best effort)" } else { "" };
            lines.push(format!(
                "\n=== COMPLETE{}{}: {} {} round(s) ===\n",
                note,
                score,
                config.round_count(),
                config.kind()
            ));
        }
        PipelineEvent::Error { message } => {
            lines.push("\n=== FAILED ===\n".to_string());
            lines.push(message.clone());
        }
    }
    lines
}

async fn generate(args: GenerateArgs, quiet: bool) {
    let profile: LearnerProfile = serde_json::from_value(read_json(&args.profile))
        .unwrap_or_else(|e| fail(format!("invalid learner profile: {}", e)));
    let provider = connect(&args.provider).unwrap_or_else(|e| fail(e));

    let mut config = PipelineConfig::default().with_max_iterations(args.max_iterations);
    if let Some(dir) = &args.trace_dir {
        config = config.with_trace_dir(dir);
    }
    if let Some(model) = &args.provider.model {
        config = config.with_model(model.as_str());
    }
    let pipeline = Pipeline::with_config(provider, config);

    let mut request = GenerationRequest::new(profile);
    if let Some(topic) = args.topic {
        request = request.with_topic(topic);
    }
    if let Some(kind) = args.kind.as_deref() {
        request = request.with_kind(parse_kind(kind));
    }
    if args.custom {
        request = request.force_custom();
    }

    if !quiet {
        eprintln!("Generating with {} ({})\n", pipeline.provider().name(), pipeline.provider().default_model());
    }

    let mut events = Box::pin(pipeline.run(request));
    let mut terminal = None;
    while let Some(event) = events.next().await {
        if !quiet {
            for line in progress_lines(&event) {
                eprintln!("{}", line);
            }
        }
        if event.is_terminal() {
            terminal = Some(event);
        }
    }

    match terminal {
        Some(PipelineEvent::Complete {
            spec,
            config,
            score,
            best_effort,
        }) => {
            let artifact = json!({
                "spec": spec,
                "config": config,
                "score": score,
                "bestEffort": best_effort,
            });
            let text = serde_json::to_string_pretty(&artifact).unwrap_or_else(|e| fail(e));
            match &args.output {
                Some(path) => {
                    std::fs::write(path, text).unwrap_or_else(|e| fail(format!("writing {}: {}", path.display(), e)));
                    if !quiet {
                        eprintln!("Wrote {}", path.display());
                    }
                }
                None => println!("{}", text),
            }
        }
        Some(PipelineEvent::Error { message }) => {
            if quiet {
                eprintln!("Error: {}", message);
            }
            std::process::exit(1);
        }
        _ => fail("run ended without a result"),
    }
}

fn validate_file(kind: &str, file: &Path, quiet: bool) {
    let kind = parse_kind(kind);
    let value = match read_json(file) {
        Value::Array(rounds) => json!({ "rounds": rounds }),
        other => other,
    };

    let report = validate(kind, &value);
    if report.valid {
        if !quiet {
            println!("{}: valid {} config", file.display(), kind);
        }
        return;
    }
    println!("{}: {} violation(s)", file.display(), report.violations.len());
    for violation in &report.violations {
        println!("  - {}", violation);
    }
    std::process::exit(1);
}

fn check_component(file: &Path, rounds: Option<&Path>, verbose: bool) {
    let source =
        std::fs::read_to_string(file).unwrap_or_else(|e| fail(format!("reading {}: {}", file.display(), e)));
    let rounds = rounds
        .map(read_json)
        .unwrap_or_else(|| json!([{ "round": 1, "focus": "smoke test", "contentSeed": "" }]));

    let report = Sandbox::new().check(&source, &Sandbox::<JsxCompiler>::default_props(&rounds));
    match &report {
        SandboxReport::Passed { rendered_nodes, .. } => {
            println!("{}: passed ({} nodes rendered)", file.display(), rendered_nodes)
        }
        other => {
            println!("{}: failed at {} gate", file.display(), other.gate());
            for problem in other.problems() {
                println!("  - {}", problem);
            }
        }
    }
    if verbose {
        if let Some(compiled) = report.compiled() {
            println!("\n--- Compiled ---\n{}", compiled);
        }
    }
    if !report.passed() {
        std::process::exit(1);
    }
}

fn show_kinds(as_json: bool) {
    let catalog = RendererCatalog::new();
    if as_json {
        println!("{}", catalog.to_json());
    } else {
        println!("{}", catalog.to_prompt());
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.log_json, if cli.verbose { Level::DEBUG } else { Level::WARN });

    match cli.command {
        Commands::Generate(args) => generate(args, cli.quiet).await,
        Commands::Validate { kind, file } => validate_file(&kind, &file, cli.quiet),
        Commands::CheckComponent { file, rounds } => check_component(&file, rounds.as_deref(), cli.verbose),
        Commands::Kinds { json } => show_kinds(json),
    }
}
