//! faithful-eval CLI - run one evaluation pass against a hosted completion model
//!
//! Every fatal check (model, tokenizer, datasets, credentials) runs before the
//! first network call. Per-record failures during the pass are logged and
//! skipped; the final metrics go to stdout.

use clap::{Args, Parser, Subcommand, ValueEnum};
use faithful_eval::core::{
    ConfigError, DemoMode, EvalSettings, Evaluator, LengthBudget, ModelEndpointConfig, Schema,
    Task, TiktokenTokenizer,
};
use faithful_eval::data::{
    load_records, write_log, AbstentionRecord, ConflictRecord, OriginalRecord,
};
use faithful_eval::llm::client::CompletionClient;
use faithful_eval::llm::config::{EndpointConfig, BASE_URL_ENV};
use faithful_eval::llm::openai::OpenAiCompletions;
use faithful_eval::llm::retry::RetryPolicy;
use serde::Serialize;
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Abstention and knowledge-conflict evaluation for completion models
#[derive(Parser)]
#[command(name = "faithful-eval")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct GlobalArgs {
    /// Output format
    #[arg(short, long, value_enum, default_value = "text", global = true)]
    format: OutputFormat,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// API key (defaults to OPENAI_API_KEY)
    #[arg(long, global = true)]
    api_key: Option<String>,

    /// Completions API base URL (defaults to OPENAI_BASE_URL or the hosted API)
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Context window in tokens, for models missing from the built-in table
    #[arg(long, global = true)]
    context_limit: Option<usize>,

    /// Attempts per request before skipping the record
    #[arg(long, default_value = "5", global = true)]
    max_attempts: usize,

    /// Seconds to wait between attempts
    #[arg(long, default_value = "2", global = true)]
    retry_delay_secs: u64,
}

/// Output format for CLI responses
#[derive(Clone, Copy, ValueEnum, Default)]
enum OutputFormat {
    /// Human-readable summary line
    #[default]
    Text,
    /// JSON output for programmatic use
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Multiple-choice evaluation with an "I don't know" option
    Abstention {
        /// JSON array of abstention records
        #[arg(long)]
        data_path: PathBuf,

        /// JSON array of records used as demonstrations (required with --demo-mode original)
        #[arg(long)]
        demo_path: Option<PathBuf>,

        /// Completion model identifier
        #[arg(short, long)]
        model: String,

        /// Prompt schema (base, attr, instr, opin, instr+opin)
        #[arg(short, long, default_value = "base")]
        schema: Schema,

        /// Demonstrations to prepend (none, original)
        #[arg(long, default_value = "none")]
        demo_mode: DemoMode,

        /// Write annotated records here
        #[arg(long)]
        log_path: Option<PathBuf>,
    },

    /// Free-form evaluation under counterfactual contexts
    Conflict {
        /// JSON array of original-dataset records
        #[arg(long)]
        orig_path: PathBuf,

        /// JSON array of counterfactual records with embedded demonstrations
        #[arg(long)]
        counter_path: PathBuf,

        /// Completion model identifier
        #[arg(short, long)]
        model: String,

        /// Prompt schema (base, attr, instr, opin, instr+opin)
        #[arg(short, long, default_value = "base")]
        schema: Schema,

        /// Demonstrations to prepend (none, original, counter)
        #[arg(long, default_value = "none")]
        demo_mode: DemoMode,

        /// Most demonstrations to try per prompt
        #[arg(short = 'n', long, default_value = "16")]
        num_demos: usize,

        /// Tokens to generate per answer
        #[arg(long, default_value = "64")]
        max_tokens: usize,

        /// Write annotated records here
        #[arg(long)]
        log_path: Option<PathBuf>,
    },
}

/// Final report printed with `--format json`
#[derive(Debug, Serialize)]
struct RunReport<M: Serialize> {
    task: &'static str,
    model: String,
    schema: Schema,
    demo_mode: DemoMode,
    metrics: M,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_level = match cli.global.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(log_level)
        .with_writer(io::stderr)
        .init();

    let result = match cli.command {
        Commands::Abstention {
            data_path,
            demo_path,
            model,
            schema,
            demo_mode,
            log_path,
        } => execute_abstention(
            &cli.global,
            &data_path,
            demo_path.as_deref(),
            &model,
            schema,
            demo_mode,
            log_path.as_deref(),
        ),
        Commands::Conflict {
            orig_path,
            counter_path,
            model,
            schema,
            demo_mode,
            num_demos,
            max_tokens,
            log_path,
        } => execute_conflict(
            &cli.global,
            &orig_path,
            &counter_path,
            &model,
            EvalSettings {
                schema,
                demo_mode,
                max_demonstrations: num_demos,
                max_completion_tokens: max_tokens,
                ..Default::default()
            },
            log_path.as_deref(),
        ),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

// ============================================================================
// Command Implementations
// ============================================================================

fn execute_abstention(
    global: &GlobalArgs,
    data_path: &Path,
    demo_path: Option<&Path>,
    model: &str,
    schema: Schema,
    demo_mode: DemoMode,
    log_path: Option<&Path>,
) -> Result<(), String> {
    let settings = EvalSettings {
        schema,
        demo_mode,
        ..Default::default()
    };
    settings
        .validate(Task::Abstention)
        .map_err(|e| e.to_string())?;
    let demo_path = match (demo_mode, demo_path) {
        (DemoMode::Original, None) => {
            return Err("--demo-path is required with --demo-mode original".to_string())
        }
        (DemoMode::Original, Some(path)) => Some(path),
        _ => None,
    };

    let budget = build_budget(model, global.context_limit)?;
    let mut records: Vec<AbstentionRecord> =
        load_records(data_path).map_err(|e| e.to_string())?;
    let demonstrations = match demo_path {
        Some(path) => load_records::<AbstentionRecord>(path)
            .map_err(|e| e.to_string())?
            .iter()
            .map(AbstentionRecord::to_demonstration)
            .collect(),
        None => Vec::new(),
    };
    let client = build_client(global, model)?;

    let runtime = build_runtime()?;
    let evaluator = Evaluator::new(&client, &budget, settings);
    let metrics = runtime.block_on(evaluator.run_abstention(&mut records, &demonstrations));

    if let Some(path) = log_path {
        write_log(path, &records).map_err(|e| e.to_string())?;
        info!(path = %path.display(), "Wrote annotated log");
    }

    output_report(
        global.format,
        &RunReport {
            task: "abstention",
            model: model.to_string(),
            schema,
            demo_mode,
            metrics,
        },
        &metrics,
    )
}

fn execute_conflict(
    global: &GlobalArgs,
    orig_path: &Path,
    counter_path: &Path,
    model: &str,
    settings: EvalSettings,
    log_path: Option<&Path>,
) -> Result<(), String> {
    settings
        .validate(Task::Conflict)
        .map_err(|e| e.to_string())?;

    let budget = build_budget(model, global.context_limit)?;
    let originals: Vec<OriginalRecord> = load_records(orig_path).map_err(|e| e.to_string())?;
    let mut records: Vec<ConflictRecord> =
        load_records(counter_path).map_err(|e| e.to_string())?;
    let client = build_client(global, model)?;

    let runtime = build_runtime()?;
    let (schema, demo_mode) = (settings.schema, settings.demo_mode);
    let evaluator = Evaluator::new(&client, &budget, settings);
    let metrics = runtime.block_on(evaluator.run_conflict(&originals, &mut records));

    if let Some(path) = log_path {
        write_log(path, &records).map_err(|e| e.to_string())?;
        info!(path = %path.display(), "Wrote annotated log");
    }

    output_report(
        global.format,
        &RunReport {
            task: "conflict",
            model: model.to_string(),
            schema,
            demo_mode,
            metrics,
        },
        &metrics,
    )
}

// ============================================================================
// Startup
// ============================================================================

fn build_budget(model: &str, context_limit: Option<usize>) -> Result<LengthBudget, String> {
    let config = match context_limit {
        Some(limit) => ModelEndpointConfig::with_context_limit(model, limit),
        None => ModelEndpointConfig::for_model(model),
    }
    .map_err(|e| e.to_string())?;
    let tokenizer =
        TiktokenTokenizer::for_run(model, context_limit.is_some()).map_err(|e| e.to_string())?;
    info!(model, context_limit = config.context_limit(), "Model configured");
    Ok(LengthBudget::new(config, Box::new(tokenizer)))
}

fn endpoint_config(global: &GlobalArgs) -> Result<EndpointConfig, ConfigError> {
    let config = match global.api_key.as_deref().filter(|k| !k.is_empty()) {
        Some(key) => {
            let config = EndpointConfig::new(key);
            match std::env::var(BASE_URL_ENV) {
                Ok(url) if !url.is_empty() => config.with_base_url(&url),
                _ => config,
            }
        }
        None => EndpointConfig::from_env().ok_or(ConfigError::MissingApiKey)?,
    };
    Ok(match &global.base_url {
        Some(url) => config.with_base_url(url),
        None => config,
    })
}

fn build_client(global: &GlobalArgs, model: &str) -> Result<CompletionClient, String> {
    if global.max_attempts == 0 {
        return Err(ConfigError::InvalidValue {
            field: "max_attempts".to_string(),
            message: "must be greater than zero".to_string(),
        }
        .to_string());
    }
    let config = endpoint_config(global).map_err(|e| e.to_string())?;
    let endpoint = OpenAiCompletions::new(&config, model).map_err(|e| e.to_string())?;
    let retry = RetryPolicy::fixed(
        global.max_attempts,
        Duration::from_secs(global.retry_delay_secs),
    );
    Ok(CompletionClient::new(Arc::new(endpoint), retry))
}

fn build_runtime() -> Result<tokio::runtime::Runtime, String> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| format!("Failed to start runtime: {}", e))
}

// ============================================================================
// Output
// ============================================================================

fn output_report<T: Serialize, M: std::fmt::Display>(
    format: OutputFormat,
    report: &T,
    metrics: &M,
) -> Result<(), String> {
    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(report)
                .map_err(|e| format!("Failed to serialize report: {}", e))?;
            println!("{}", json);
        }
        OutputFormat::Text => println!("{}", metrics),
    }
    Ok(())
}
