//! Local CLI entry point: a thin `clap` front door over [`crate::handle`],
//! mirroring the teacher's `src/cli/{env,app,runtime}.rs` split (parse args,
//! init logging, load config, dispatch) without the teacher's metrics server
//! or YAML config format — this crate has no Non-goal excluding structured
//! logging, so that part of the ambient stack is kept.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use webwatch_core_types::{ExecutionMode, TaskInput, TaskOptions};

use crate::config::Config;

#[derive(Parser)]
#[command(author, version, about = "Scheduled web page watching with LLM-driven extraction", long_about = None)]
pub struct CliArgs {
    /// TOML configuration file path
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Log level, ignored when RUST_LOG is set
    #[arg(short, long, default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Runs a single task end to end and prints the response body.
    Watch {
        instruction: String,
        url: String,
        #[arg(long, value_enum, default_value = "auto")]
        mode: ModeArg,
        #[arg(long)]
        plan_only: bool,
        #[arg(long)]
        execution_only: bool,
        #[arg(long)]
        force_new_plan: bool,
    },
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum ModeArg {
    Plan,
    Interactive,
    Auto,
}

impl From<ModeArg> for ExecutionMode {
    fn from(value: ModeArg) -> Self {
        match value {
            ModeArg::Plan => ExecutionMode::Plan,
            ModeArg::Interactive => ExecutionMode::Interactive,
            ModeArg::Auto => ExecutionMode::Auto,
        }
    }
}

pub fn init_logging(level: &str) -> Result<()> {
    let level: tracing::Level = level.parse().context("invalid log level")?;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level.to_string())),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
    Ok(())
}

pub async fn run() -> Result<()> {
    let cli = CliArgs::parse();
    init_logging(&cli.log_level)?;
    info!("starting webwatch v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config(cli.config.as_deref());
    let orchestrator = crate::build_orchestrator(&config).await.context("failed to assemble orchestrator")?;

    match cli.command {
        Commands::Watch { instruction, url, mode, plan_only, execution_only, force_new_plan } => {
            let task = TaskInput {
                instruction,
                url,
                task_id: None,
                options: TaskOptions {
                    execution_mode: mode.into(),
                    plan_only,
                    execution_only,
                    force_new_plan,
                    ..Default::default()
                },
            };
            let response = crate::handle(&orchestrator, task).await;
            println!("{}", response.body);
            if response.status_code >= 400 {
                std::process::exit(1);
            }
            Ok(())
        }
    }
}

fn load_config(path: Option<&Path>) -> Config {
    match path {
        Some(path) => Config::load_with_file_override(Some(path)),
        None => {
            let default_path = Path::new("config/webwatch.toml");
            if default_path.exists() {
                Config::load_with_file_override(Some(default_path))
            } else {
                warn!(path = %default_path.display(), "config file not found, using environment and defaults");
                Config::from_env()
            }
        }
    }
}
