//! `rampart` command-line runner.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use rp_actions::builtin_registry;
use rp_engine::{Correlation, Playbook, PlaybookRunner};

#[derive(Parser)]
#[command(name = "rampart", version, about = "Security-operations playbook runner")]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a playbook
    Run {
        /// Path to the playbook JSON file
        file: PathBuf,
        /// Initial variable, as key=value (value parsed as JSON, else string)
        #[arg(long = "var", value_name = "KEY=VALUE")]
        vars: Vec<String>,
        /// Alert id to correlate the run with
        #[arg(long)]
        alert_id: Option<String>,
        /// Case id to correlate the run with
        #[arg(long)]
        case_id: Option<String>,
        /// Output format: text or json
        #[arg(long, default_value = "text")]
        format: OutputFormat,
    },
    /// Check a playbook's structure without running it
    Validate {
        /// Path to the playbook JSON file
        file: PathBuf,
    },
    /// List the registered actions
    Actions,
}

#[derive(Clone, Copy)]
enum OutputFormat {
    Text,
    Json,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            other => Err(format!("unknown output format '{other}'")),
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn load_playbook(path: &Path) -> Result<Playbook> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading playbook file {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("parsing playbook file {}", path.display()))
}

fn parse_vars(pairs: &[String]) -> Result<HashMap<String, Value>> {
    let mut vars = HashMap::new();
    for pair in pairs {
        let Some((key, raw)) = pair.split_once('=') else {
            bail!("--var '{pair}' is not of the form key=value");
        };
        let value = serde_json::from_str(raw)
            .unwrap_or_else(|_| Value::String(raw.to_string()));
        vars.insert(key.to_string(), value);
    }
    Ok(vars)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Run {
            file,
            vars,
            alert_id,
            case_id,
            format,
        } => {
            let playbook = load_playbook(&file)?;
            if !playbook.status.is_runnable() {
                bail!(
                    "playbook '{}' is not active and cannot be run",
                    playbook.name
                );
            }

            info!(playbook = %playbook.name, steps = playbook.steps.len(), "loaded playbook");
            let correlation = Correlation { alert_id, case_id };
            let runner = PlaybookRunner::new(Arc::new(builtin_registry()));
            let result = runner
                .run(&playbook, parse_vars(&vars)?, correlation)
                .await;

            if result.is_completed() {
                info!(execution = %result.execution_id, "execution completed");
            } else {
                warn!(
                    execution = %result.execution_id,
                    error = result.error.as_deref().unwrap_or("unknown"),
                    "execution failed"
                );
            }

            match format {
                OutputFormat::Text => print!("{}", result.summary()),
                OutputFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(&result)?)
                }
            }
            if !result.is_completed() {
                std::process::exit(1);
            }
        }
        Commands::Validate { file } => {
            let playbook = load_playbook(&file)?;
            let issues = playbook.validate();
            if issues.is_empty() {
                println!("{}: ok", playbook.name);
            } else {
                for issue in &issues {
                    println!("{}: {issue}", playbook.name);
                }
                std::process::exit(1);
            }
        }
        Commands::Actions => {
            let registry = builtin_registry();
            for name in registry.names() {
                match registry.get(&name) {
                    Some(action) => println!("{name}  {}", action.description()),
                    None => println!("{name}"),
                }
            }
        }
    }

    Ok(())
}
