//! llm-dispatch - run command-line LLM backends and normalize their output
//!
//! ## Commands
//!
//! - `dispatch`: Send a prompt to a configured backend
//! - `test`: Probe a backend for availability
//! - `list`: Show configured backends
//! - `extract`: Recover a JSON value from backend output
//! - `validate`: Validate JSON against a schema file
//! - `verdict`: Read the QA verdict from a response
//! - `check-qa-schema`: Check a custom QA schema before use

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, Level};

use llm_dispatch_core::response::{validate_against_schema_file, DEFAULT_QA_SCHEMA};
use llm_dispatch_core::{
    extract_json, parse_qa_response, validate_qa_schema, DispatchOptions, DispatchRequest,
    Dispatcher, LlmRegistry, MapContextProvider, ResponseFormat,
};

#[derive(Parser)]
#[command(name = "llm-dispatch")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Supervised dispatch of command-line LLM backends", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// LLM registry file (TOML, or JSON with a .json extension)
    #[arg(
        short,
        long,
        global = true,
        env = "LLM_DISPATCH_CONFIG",
        default_value = "llm-dispatch.toml"
    )]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send a prompt to a backend and print the result as JSON
    Dispatch {
        /// Backend id from the registry
        llm: String,

        /// Prompt text (read from stdin when omitted)
        #[arg(short, long)]
        prompt: Option<String>,

        /// Read the prompt from a file
        #[arg(long, conflicts_with = "prompt")]
        prompt_file: Option<PathBuf>,

        /// How to interpret stdout on success
        #[arg(short, long, value_enum, default_value = "text")]
        format: FormatArg,

        /// Timeout in seconds (registry default when omitted)
        #[arg(short, long)]
        timeout: Option<u64>,

        /// Context entry as KEY=FILE; repeatable, prepended in order
        #[arg(long = "context", value_name = "KEY=FILE")]
        context: Vec<String>,
    },

    /// Probe a backend with its test prompt
    Test {
        /// Backend id from the registry
        llm: String,
    },

    /// List configured backends
    List,

    /// Recover a JSON value from backend output
    Extract {
        /// Input file (default: stdin)
        #[arg(short, long)]
        input: Option<PathBuf>,
    },

    /// Validate a JSON document against a schema file
    Validate {
        /// JSON Schema file
        #[arg(short, long)]
        schema: PathBuf,

        /// Document file (default: stdin)
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Run the extractor on the input first
        #[arg(long)]
        extract: bool,
    },

    /// Print the normalized QA verdict of a response
    Verdict {
        /// Response file (default: stdin)
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Run the extractor on the input first
        #[arg(long)]
        extract: bool,
    },

    /// Check that a custom QA schema can express every verdict
    CheckQaSchema {
        /// Schema file (the built-in default when omitted)
        schema: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum FormatArg {
    Text,
    Json,
}

impl From<FormatArg> for ResponseFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Text => ResponseFormat::Text,
            FormatArg::Json => ResponseFormat::Json,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::WARN
    };
    llm_dispatch_core::telemetry::init_tracing(cli.json, level);

    match cli.command {
        Commands::Dispatch {
            llm,
            prompt,
            prompt_file,
            format,
            timeout,
            context,
        } => {
            let prompt = match (prompt, prompt_file) {
                (Some(p), _) => p,
                (None, Some(path)) => read_file(&path)?,
                (None, None) => read_input(None)?,
            };
            cmd_dispatch(&cli.config, &llm, prompt, format.into(), timeout, &context).await
        }
        Commands::Test { llm } => cmd_test(&cli.config, &llm).await,
        Commands::List => cmd_list(&cli.config),
        Commands::Extract { input } => cmd_extract(input.as_deref()),
        Commands::Validate {
            schema,
            input,
            extract,
        } => cmd_validate(&schema, input.as_deref(), extract),
        Commands::Verdict { input, extract } => cmd_verdict(input.as_deref(), extract),
        Commands::CheckQaSchema { schema } => cmd_check_qa_schema(schema.as_deref()),
    }
}

fn load_registry(path: &Path) -> Result<Arc<LlmRegistry>> {
    let registry = LlmRegistry::load(path)
        .with_context(|| format!("Failed to load LLM registry from {}", path.display()))?;
    Ok(Arc::new(registry))
}

fn read_file(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

/// Read a file, or all of stdin when no path is given.
fn read_input(path: Option<&Path>) -> Result<String> {
    match path {
        Some(path) => read_file(path),
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read stdin")?;
            Ok(buf)
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Split a `KEY=FILE` context argument.
fn parse_context_arg(arg: &str) -> Result<(String, PathBuf)> {
    match arg.split_once('=') {
        Some((key, file)) if !key.trim().is_empty() && !file.is_empty() => {
            Ok((key.trim().to_string(), PathBuf::from(file)))
        }
        _ => anyhow::bail!("Context entry must be KEY=FILE, got {:?}", arg),
    }
}

/// Send a prompt to a backend
async fn cmd_dispatch(
    config: &Path,
    llm: &str,
    prompt: String,
    format: ResponseFormat,
    timeout: Option<u64>,
    context: &[String],
) -> Result<()> {
    let registry = load_registry(config)?;

    let mut provider = MapContextProvider::new();
    let mut keys = Vec::with_capacity(context.len());
    for arg in context {
        let (key, file) = parse_context_arg(arg)?;
        provider = provider.with_entry(key.clone(), read_file(&file)?);
        keys.push(key);
    }

    let dispatcher = Dispatcher::new(registry).with_context_provider(Arc::new(provider));
    let request = DispatchRequest::new(llm, prompt)
        .with_context_keys(keys)
        .with_options(DispatchOptions {
            format,
            timeout_secs: timeout,
            ..Default::default()
        });

    let result = dispatcher
        .dispatch(&request)
        .await
        .with_context(|| format!("Dispatch to '{}' failed", llm))?;

    if dispatcher.is_rate_limited(llm, &result) {
        info!(llm_id = %llm, "backend reported a rate limit");
    }
    print_json(&result)?;

    if !result.succeeded() {
        anyhow::bail!("Backend '{}' exited with status {}", llm, result.exit_code);
    }
    Ok(())
}

/// Probe a backend
async fn cmd_test(config: &Path, llm: &str) -> Result<()> {
    let dispatcher = Dispatcher::new(load_registry(config)?);
    let outcome = dispatcher
        .test_llm(llm)
        .await
        .with_context(|| format!("Probe of '{}' failed", llm))?;

    print_json(&outcome)?;
    if !outcome.is_available() {
        anyhow::bail!("Backend '{}' is {}", llm, outcome.as_str());
    }
    Ok(())
}

/// List configured backends
fn cmd_list(config: &Path) -> Result<()> {
    let registry = load_registry(config)?;

    if registry.is_empty() {
        println!("No LLMs configured in {}", config.display());
        return Ok(());
    }

    for llm in registry.iter() {
        let mode = if llm.stdin { "stdin" } else { "args" };
        let state = if llm.enabled { "enabled" } else { "disabled" };
        println!("{:<16} {:<8} {:<6} {}", llm.id, state, mode, llm.command);
        if !llm.description.is_empty() {
            println!("    {}", llm.description);
        }
    }

    let limits = registry.limits();
    println!();
    println!(
        "Timeouts: default {}s, range {}..={}s",
        limits.default_timeout_secs, limits.min_timeout_secs, limits.max_timeout_secs
    );
    Ok(())
}

/// Recover a JSON value from backend output
fn cmd_extract(input: Option<&Path>) -> Result<()> {
    let text = read_input(input)?;
    println!("{}", extract_json(&text));
    Ok(())
}

/// Validate a document against a schema file
fn cmd_validate(schema: &Path, input: Option<&Path>, extract: bool) -> Result<()> {
    let mut document = read_input(input)?;
    if extract {
        document = extract_json(&document);
    }

    let result = validate_against_schema_file(&document, schema)
        .with_context(|| format!("Failed to use schema {}", schema.display()))?;
    print_json(&result)?;

    if !result.valid {
        anyhow::bail!("Document failed validation ({} errors)", result.errors.len());
    }
    Ok(())
}

/// Print the QA verdict of a response
fn cmd_verdict(input: Option<&Path>, extract: bool) -> Result<()> {
    let mut document = read_input(input)?;
    if extract {
        document = extract_json(&document);
    }

    let response = parse_qa_response(document.as_bytes()).context("Failed to read verdict")?;
    println!("{}", response.verdict);
    Ok(())
}

/// Check a custom QA schema
fn cmd_check_qa_schema(schema: Option<&Path>) -> Result<()> {
    let text = match schema {
        Some(path) => read_file(path)?,
        None => DEFAULT_QA_SCHEMA.to_string(),
    };
    validate_qa_schema(&text).context("QA schema rejected")?;
    println!("QA schema OK");
    Ok(())
}
