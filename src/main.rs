//! FlowRunner CLI — a headless, filesystem-backed host for the flow
//! interpreter. The direct descendant of the reference runner's
//! `execute_plan`/`Commands::Execute`, retargeted from UTDL test plans to
//! flows: `run` drives the interpreter to completion, `step` drives it one
//! step at a time printing each result as it lands, and `validate` checks
//! a flow file without executing it.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{error, info};

use flowrunner::codec;
use flowrunner::config::RunnerConfig;
use flowrunner::errors::FlowError;
use flowrunner::host::{CliHostBridge, HostBridge};
use flowrunner::interpreter::{FlowRunner, Marker, RunnerCallbacks};
use flowrunner::model::{Flow, StepResult};
use flowrunner::telemetry;
use flowrunner::validation;

#[derive(Parser)]
#[command(name = "flowrunner")]
#[command(about = "Authoring and execution engine for declarative HTTP API flows", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Suppresses informational logs; only errors reach stderr.
    #[arg(long, short = 's', global = true, default_value = "false")]
    silent: bool,

    /// Emits debug-level logs, including resolved URLs and headers.
    #[arg(long, short = 'v', global = true, default_value = "false")]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Runs a flow file to completion in a single pass.
    Run {
        #[arg(short, long)]
        file: PathBuf,
    },
    /// Drives the interpreter one step at a time, printing each result.
    Step {
        #[arg(short, long)]
        file: PathBuf,
    },
    /// Validates a flow file without executing it.
    Validate {
        #[arg(short, long)]
        file: PathBuf,
    },
}

struct ReportingCallbacks;

impl RunnerCallbacks for ReportingCallbacks {
    fn on_step_start(&self, step: &flowrunner::model::Step, _path: &[String]) {
        info!(step_id = %step.id(), step_name = %step.name(), "step starting");
    }

    fn on_step_complete(
        &self,
        result: &StepResult,
        step: &flowrunner::model::Step,
        _context: &flowrunner::context::RuntimeContext,
        _path: &[String],
    ) {
        info!(
            step_id = %step.id(),
            status = ?result.status,
            "step finished"
        );
        println!("{}", serde_json::to_string_pretty(result).unwrap_or_default());
    }

    fn on_marker(&self, marker: &Marker) {
        match &marker.detail {
            Some(detail) => info!("{}: {}", marker.label, detail),
            None => info!("{}", marker.label),
        }
    }

    fn on_error(&self, error: &FlowError) {
        error!(code = %error.code(), "{error}");
    }

    fn on_message(&self, message: &str) {
        info!("{message}");
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let config = RunnerConfig::from_env();
    let level = telemetry::level_from_flags(cli.silent, cli.verbose);
    telemetry::init_tracing(level.as_str());

    let exit_code = match &cli.command {
        Commands::Run { file } => run_flow(file, &config).await,
        Commands::Step { file } => step_flow(file, &config).await,
        Commands::Validate { file } => validate_flow_file(file).await,
    };

    std::process::exit(exit_code);
}

/// Loads and decodes a flow file through the CLI's host bridge. Uses
/// `anyhow` for ergonomic `.context(...)` propagation across the
/// dialog/read/parse/decode chain; the caller only needs the final
/// message, not a structured error kind.
async fn load_flow_anyhow(file: &PathBuf) -> anyhow::Result<Flow> {
    let bridge = CliHostBridge::new(Some(file.to_string_lossy().to_string()));
    let dialog = bridge.open_file_dialog().await;
    let path = dialog.file_path.context("no flow file specified")?;

    let read = bridge.read_file(&path).await;
    if !read.success {
        anyhow::bail!("failed to read '{path}': {:?}", read.error);
    }

    let raw: serde_json::Value = serde_json::from_str(&read.data.unwrap_or_default())
        .with_context(|| format!("'{path}' is not valid JSON"))?;

    codec::decode_flow(raw).with_context(|| format!("failed to decode flow from '{path}'"))
}

async fn load_flow(file: &PathBuf) -> Result<Flow, i32> {
    match load_flow_anyhow(file).await {
        Ok(flow) => Ok(flow),
        Err(e) => {
            error!("{e:#}");
            Err(1)
        }
    }
}

async fn run_flow(file: &PathBuf, config: &RunnerConfig) -> i32 {
    let flow = match load_flow(file).await {
        Ok(f) => f,
        Err(code) => return code,
    };

    let issues = validation::validate_flow(&flow);
    if !issues.is_empty() {
        for issue in &issues {
            error!(step_id = ?issue.step_id, "{}", issue.message);
        }
    }

    let runner = FlowRunner::new(config.to_runner_limits(), Arc::new(ReportingCallbacks));
    match runner.run(flow, false).await {
        Ok(()) => {
            let results = runner.results().await;
            let all_ok = results
                .iter()
                .all(|r| !matches!(r.status, Some(flowrunner::model::StepStatus::Error)));
            println!("{}", serde_json::to_string_pretty(&results).unwrap_or_default());
            if all_ok {
                0
            } else {
                1
            }
        }
        Err(e) => {
            error!(error = %e, "run failed");
            1
        }
    }
}

async fn step_flow(file: &PathBuf, config: &RunnerConfig) -> i32 {
    let flow = match load_flow(file).await {
        Ok(f) => f,
        Err(code) => return code,
    };

    let runner = FlowRunner::new(config.to_runner_limits(), Arc::new(ReportingCallbacks));
    loop {
        match runner.step(&flow).await {
            Ok(true) => continue,
            Ok(false) => break,
            Err(e) => {
                error!(error = %e, "step failed");
                return 1;
            }
        }
    }
    0
}

async fn validate_flow_file(file: &PathBuf) -> i32 {
    let flow = match load_flow(file).await {
        Ok(f) => f,
        Err(code) => return code,
    };

    let issues = validation::validate_flow(&flow);
    let report = serde_json::json!({
        "valid": issues.is_empty(),
        "errors": issues,
    });
    println!("{}", serde_json::to_string_pretty(&report).unwrap_or_default());

    if issues.is_empty() {
        0
    } else {
        1
    }
}
