//! tangent CLI

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tangent_core::{Mode, Variable};

mod config;

use config::{RootConfig, diff_request, inline_parts, parse_var, read_config};

#[derive(Parser)]
#[command(name = "tangent")]
#[command(about = "tangent - forward- and reverse-mode automatic differentiation")]
#[command(version)]
struct Cli {
    /// Log verbosity level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "warn")]
    log_level: tracing::Level,

    #[command(subcommand)]
    command: Commands,
}

/// Functions and variables, from flags or a request file.
#[derive(Args)]
struct Source {
    /// Request file (JSON for `.json`, YAML otherwise). Replaces --function/--var.
    #[arg(short, long, conflicts_with_all = ["function", "var"])]
    config: Option<PathBuf>,

    /// Function to differentiate (repeatable; one Jacobian row each)
    #[arg(short, long)]
    function: Vec<String>,

    /// Variable seed as NAME=VALUE (repeatable; order fixes the columns)
    #[arg(long, value_parser = parse_var)]
    var: Vec<Variable>,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate functions and their derivatives at a point
    Diff {
        #[command(flatten)]
        source: Source,

        /// Differentiate only with respect to these variables (repeatable)
        #[arg(short, long)]
        target: Vec<String>,

        /// AD mode: forward or reverse
        #[arg(short, long)]
        mode: Option<Mode>,

        /// Output file for results (pretty JSON). Defaults to stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Solve a square system f(x) = 0 with Newton's method
    Root {
        #[command(flatten)]
        source: Source,

        /// AD mode used for the Jacobian: forward or reverse
        #[arg(short, long)]
        mode: Option<Mode>,

        /// Max Newton iterations
        #[arg(long)]
        max_iter: Option<usize>,

        /// Residual norm tolerance
        #[arg(long)]
        tol: Option<f64>,

        /// Output file for results (pretty JSON). Defaults to stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List the supported elementary functions
    Functions,

    /// Print version
    Version,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt().with_max_level(cli.log_level).with_target(false).init();

    match cli.command {
        Commands::Diff { source, target, mode, output } => {
            cmd_diff(source, target, mode, output.as_ref())
        }
        Commands::Root { source, mode, max_iter, tol, output } => {
            cmd_root(source, mode, max_iter, tol, output.as_ref())
        }
        Commands::Functions => cmd_functions(),
        Commands::Version => {
            println!("tangent {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn cmd_diff(
    source: Source,
    targets: Vec<String>,
    mode: Option<Mode>,
    output: Option<&PathBuf>,
) -> Result<()> {
    let request =
        diff_request(source.config.as_deref(), source.function, source.var, targets, mode)?;
    let report = tangent_eval::differentiate(&request)?;
    tracing::info!(mode = %report.mode, outputs = report.values.len(), "differentiation complete");
    write_json(output, serde_json::to_value(&report)?)
}

fn cmd_root(
    source: Source,
    mode: Option<Mode>,
    max_iter: Option<usize>,
    tol: Option<f64>,
    output: Option<&PathBuf>,
) -> Result<()> {
    let mut cfg = match source.config {
        Some(path) => read_config::<RootConfig>(&path)?,
        None => {
            let (functions, variables) = inline_parts(source.function, source.var)?;
            let defaults = tangent_eval::NewtonOptions::default();
            RootConfig {
                functions,
                variables,
                mode: defaults.mode,
                max_iter: defaults.max_iter,
                tolerance: defaults.tolerance,
            }
        }
    };
    if let Some(mode) = mode {
        cfg.mode = mode;
    }
    if let Some(n) = max_iter {
        cfg.max_iter = n;
    }
    if let Some(t) = tol {
        cfg.tolerance = t;
    }

    let result = tangent_eval::find_root(&cfg.functions, &cfg.variables, &cfg.options())?;
    if !result.converged {
        tracing::warn!(
            iterations = result.iterations,
            residual = result.residual_norm,
            "newton did not converge"
        );
    }

    let output_json = serde_json::json!({
        "names": result.names,
        "root": result.point,
        "residual_norm": result.residual_norm,
        "iterations": result.iterations,
        "converged": result.converged,
        "mode": cfg.mode,
    });
    write_json(output, output_json)
}

fn cmd_functions() -> Result<()> {
    let names = tangent_eval::expr::function_names();
    write_json(None, serde_json::json!({ "functions": names, "constants": ["pi", "e"] }))
}

fn write_json(output: Option<&PathBuf>, value: serde_json::Value) -> Result<()> {
    if let Some(path) = output {
        std::fs::write(path, serde_json::to_string_pretty(&value)?)?;
    } else {
        println!("{}", serde_json::to_string_pretty(&value)?);
    }
    Ok(())
}
