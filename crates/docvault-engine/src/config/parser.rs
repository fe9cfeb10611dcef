//! Loading job files: `${VAR}` expansion, then YAML into [`JobConfig`].

use std::path::Path;
use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::{Captures, Regex};

use crate::config::types::JobConfig;

/// `${NAME}` where NAME is a shell-style identifier. `$NAME` is left alone.
static PLACEHOLDER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid placeholder regex")
});

/// Expand every `${NAME}` placeholder in `input` from the process environment.
///
/// Nothing is expanded unless every referenced variable is set.
///
/// # Errors
///
/// Lists each unset variable once, in order of first reference.
pub fn substitute_env_vars(input: &str) -> Result<String> {
    let mut unset: Vec<String> = Vec::new();
    let expanded = PLACEHOLDER_RE.replace_all(input, |cap: &Captures<'_>| {
        let name = &cap[1];
        std::env::var(name).unwrap_or_else(|_| {
            if !unset.iter().any(|n| n == name) {
                unset.push(name.to_string());
            }
            String::new()
        })
    });

    if !unset.is_empty() {
        anyhow::bail!("Missing environment variable(s): {}", unset.join(", "));
    }
    Ok(expanded.into_owned())
}

/// Expand placeholders in job YAML text and deserialize it.
///
/// # Errors
///
/// Fails on unset variables, malformed YAML, or unknown job file keys.
pub fn parse_job_str(yaml_str: &str) -> Result<JobConfig> {
    let expanded = substitute_env_vars(yaml_str)?;
    serde_yaml::from_str(&expanded).context("Failed to parse job YAML")
}

/// Read and parse the job file at `path`.
///
/// # Errors
///
/// Fails when the file is unreadable, or for any reason [`parse_job_str`] does.
pub fn parse_job(path: &Path) -> Result<JobConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read job file: {}", path.display()))?;
    parse_job_str(&content)
}
