//! Command-line entry point for SQLFlow (§6.5). Project layout: pipelines
//! live in `./pipelines/<name>.sql`, profiles in `./profiles/<profile>.yml`.
//! That discovery rule is a CLI convenience, not a core invariant — the
//! planner and coordinator only ever see parsed text and resolved maps.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use sqlflow_core::errors::handler::ErrorStrategy;
use sqlflow_core::vars::VariableResolver;
use sqlflow_exec::{Coordinator, ExecutionContext, Strategy};
use sqlflow_io::Profile;
use sqlflow_planner::Planner;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "sqlflow")]
#[command(about = "Declarative SQL-centric data-pipeline engine")]
struct Cli {
    #[command(subcommand)]
    command: TopLevel,
}

#[derive(Subcommand, Debug)]
enum TopLevel {
    #[command(subcommand)]
    Pipeline(PipelineCommand),
}

#[derive(Subcommand, Debug)]
enum PipelineCommand {
    Compile {
        name: String,
        #[arg(long)]
        profile: Option<String>,
        #[arg(long)]
        variables: Option<String>,
        #[arg(long, default_value = "compiled")]
        output_dir: PathBuf,
    },
    Run {
        name: String,
        #[arg(long)]
        profile: Option<String>,
        #[arg(long)]
        variables: Option<String>,
    },
    Validate {
        name: Option<String>,
        #[arg(long)]
        profile: Option<String>,
    },
    List {
        #[arg(long)]
        profile: Option<String>,
        #[arg(long, default_value = "table")]
        format: String,
    },
}

const EXIT_OK: i32 = 0;
const EXIT_GENERIC_ERROR: i32 = 1;
const EXIT_VALIDATION_ERROR: i32 = 2;
const EXIT_SIGINT: i32 = 130;

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let code = match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %e, "sqlflow run failed");
            EXIT_GENERIC_ERROR
        }
    };
    std::process::exit(code);
}

async fn run(cli: Cli) -> anyhow::Result<i32> {
    let TopLevel::Pipeline(cmd) = cli.command;
    match cmd {
        PipelineCommand::Compile {
            name,
            profile,
            variables,
            output_dir,
        } => compile(&name, profile.as_deref(), variables.as_deref(), &output_dir),
        PipelineCommand::Run {
            name,
            profile,
            variables,
        } => run_pipeline(&name, profile.as_deref(), variables.as_deref()).await,
        PipelineCommand::Validate { name, profile } => validate(name.as_deref(), profile.as_deref()),
        PipelineCommand::List { profile, format } => list(profile.as_deref(), &format),
    }
}

fn pipeline_path(name: &str) -> PathBuf {
    Path::new("pipelines").join(format!("{name}.sql"))
}

fn load_profile(profile: Option<&str>) -> anyhow::Result<Profile> {
    let path = Path::new("profiles").join(format!("{}.yml", profile.unwrap_or("default")));
    if !path.exists() {
        return Ok(Profile::parse("connectors: {}\n")?);
    }
    let text = std::fs::read_to_string(&path)?;
    Ok(Profile::parse(&text)?)
}

fn parse_variables(raw: Option<&str>) -> anyhow::Result<HashMap<String, serde_json::Value>> {
    let Some(raw) = raw else {
        return Ok(HashMap::new());
    };
    let trimmed = raw.trim();
    if trimmed.starts_with('{') {
        let value: serde_json::Value = serde_json::from_str(trimmed)?;
        let obj = value
            .as_object()
            .ok_or_else(|| anyhow::anyhow!("--variables JSON must be an object"))?;
        return Ok(obj.clone().into_iter().collect());
    }

    let mut vars = HashMap::new();
    for pair in trimmed.split(',').filter(|s| !s.is_empty()) {
        let (k, v) = pair
            .split_once('=')
            .ok_or_else(|| anyhow::anyhow!("invalid --variables entry '{pair}', expected k=v"))?;
        vars.insert(k.trim().to_string(), serde_json::Value::String(v.trim().to_string()));
    }
    Ok(vars)
}

fn build_plan(
    name: &str,
    profile: Option<&str>,
    variables: Option<&str>,
) -> anyhow::Result<(sqlflow_core::op::Plan, Profile)> {
    let path = pipeline_path(name);
    let text = std::fs::read_to_string(&path)
        .map_err(|e| anyhow::anyhow!("failed to read pipeline '{name}' at {}: {e}", path.display()))?;

    let pipeline = sqlflow_parser::parse(&text).map_err(|e| anyhow::anyhow!("{e}"))?;
    let profile = load_profile(profile)?;
    let cli_vars = parse_variables(variables)?;

    let plan = Planner::new(cli_vars, profile.variables.clone(), ErrorStrategy::WarnContinue)
        .plan(name, &pipeline)?;
    Ok((plan, profile))
}

fn compile(name: &str, profile: Option<&str>, variables: Option<&str>, output_dir: &Path) -> anyhow::Result<i32> {
    let (plan, _) = match build_plan(name, profile, variables) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("validation failed: {e}");
            return Ok(EXIT_VALIDATION_ERROR);
        }
    };

    std::fs::create_dir_all(output_dir)?;
    let out_path = output_dir.join(format!("{name}.json"));
    std::fs::write(&out_path, serde_json::to_string_pretty(&plan.to_json())?)?;
    println!("compiled {} operations to {}", plan.operations.len(), out_path.display());
    Ok(EXIT_OK)
}

async fn run_pipeline(name: &str, profile: Option<&str>, variables: Option<&str>) -> anyhow::Result<i32> {
    let (plan, _) = match build_plan(name, profile, variables) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("validation failed: {e}");
            return Ok(EXIT_VALIDATION_ERROR);
        }
    };

    let ctx = ExecutionContext::new(
        Arc::new(datafusion::execution::context::SessionContext::new()),
        Arc::new(VariableResolver::new(HashMap::new(), HashMap::new())),
        ErrorStrategy::WarnContinue,
    );

    let cancel = CancellationToken::new();
    let run_cancel = cancel.clone();
    let coordinator = Coordinator::new(Strategy::Auto, format!("{name}-run"));

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            cancel.cancel();
            Ok(EXIT_SIGINT)
        }
        result = coordinator.run(&plan, ctx, run_cancel) => {
            let result = result?;
            if result.success {
                println!("pipeline '{name}' completed: {} steps", result.results.len());
                Ok(EXIT_OK)
            } else {
                eprintln!("pipeline '{name}' failed: {}", result.first_error.unwrap_or_default());
                Ok(EXIT_GENERIC_ERROR)
            }
        }
    }
}

fn validate(name: Option<&str>, profile: Option<&str>) -> anyhow::Result<i32> {
    let names: Vec<String> = match name {
        Some(n) => vec![n.to_string()],
        None => discover_pipelines()?,
    };

    let mut ok = true;
    for name in &names {
        match build_plan(name, profile, None) {
            Ok((plan, _)) => println!("{name}: ok ({} operations)", plan.operations.len()),
            Err(e) => {
                ok = false;
                eprintln!("{name}: {e}");
            }
        }
    }
    Ok(if ok { EXIT_OK } else { EXIT_VALIDATION_ERROR })
}

fn list(profile: Option<&str>, format: &str) -> anyhow::Result<i32> {
    let _ = load_profile(profile)?;
    let names = discover_pipelines()?;
    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&names)?);
    } else {
        for name in &names {
            println!("{name}");
        }
    }
    Ok(EXIT_OK)
}

fn discover_pipelines() -> anyhow::Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in glob::glob("pipelines/*.sql")? {
        let path = entry?;
        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
            names.push(stem.to_string());
        }
    }
    names.sort();
    Ok(names)
}
