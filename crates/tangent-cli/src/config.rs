//! Request files and command-line assembly of requests.

use anyhow::{Result, bail};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::path::Path;
use tangent_core::{DiffRequest, Mode, Variable};
use tangent_eval::NewtonOptions;

/// Root-finding request file.
#[derive(Debug, Clone, Deserialize)]
pub struct RootConfig {
    pub functions: Vec<String>,
    pub variables: Vec<Variable>,
    #[serde(default)]
    pub mode: Mode,
    #[serde(default = "default_max_iter")]
    pub max_iter: usize,
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
}

fn default_max_iter() -> usize {
    NewtonOptions::default().max_iter
}

fn default_tolerance() -> f64 {
    NewtonOptions::default().tolerance
}

impl RootConfig {
    pub fn options(&self) -> NewtonOptions {
        NewtonOptions { max_iter: self.max_iter, tolerance: self.tolerance, mode: self.mode }
    }
}

/// Read a config file: JSON for `.json`, YAML otherwise.
pub fn read_config<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let bytes = std::fs::read(path)?;
    let ext = path.extension().and_then(|s| s.to_str()).unwrap_or("").to_ascii_lowercase();
    let cfg: T = if ext == "json" {
        serde_json::from_slice(&bytes)?
    } else {
        // Default: YAML (serde_yaml_ng).
        serde_yaml_ng::from_slice(&bytes)?
    };
    tracing::info!(path = %path.display(), "config loaded");
    Ok(cfg)
}

/// `--var name=value`
pub fn parse_var(s: &str) -> std::result::Result<Variable, String> {
    let (name, value) =
        s.split_once('=').ok_or_else(|| format!("expected NAME=VALUE, got '{s}'"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("missing variable name in '{s}'"));
    }
    let value: f64 =
        value.trim().parse().map_err(|_| format!("invalid value for '{name}': '{value}'"))?;
    Ok(Variable::new(name, value))
}

/// Functions and variables given as flags.
pub fn inline_parts(
    functions: Vec<String>,
    variables: Vec<Variable>,
) -> Result<(Vec<String>, Vec<Variable>)> {
    if functions.is_empty() {
        bail!("no functions given: pass --function or --config");
    }
    if variables.is_empty() {
        bail!("no variables given: pass --var NAME=VALUE or --config");
    }
    Ok((functions, variables))
}

/// Build a differentiation request from a config file or from flags.
///
/// Explicit `--target` and `--mode` flags override the file.
pub fn diff_request(
    config: Option<&Path>,
    functions: Vec<String>,
    variables: Vec<Variable>,
    targets: Vec<String>,
    mode: Option<Mode>,
) -> Result<DiffRequest> {
    let mut request = match config {
        Some(path) => read_config::<DiffRequest>(path)?,
        None => {
            let (functions, variables) = inline_parts(functions, variables)?;
            DiffRequest::new(functions, variables)
        }
    };
    if !targets.is_empty() {
        request = request.with_targets(targets);
    }
    if let Some(mode) = mode {
        request = request.with_mode(mode);
    }
    Ok(request)
}
