//! Semantic validation for parsed job configuration values.

use std::collections::HashSet;
use std::sync::LazyLock;

use anyhow::{bail, Result};
use docvault_types::document::{BACKUP_DATE_FIELD, ID_FIELD, ID_ORIGINAL_FIELD, JOB_NAME_FIELD};
use docvault_types::RunMode;
use regex::Regex;

use crate::config::types::{CleanConfig, JobConfig};

static FIELD_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid field name regex"));

/// Fields docvault writes itself; none may double as the partition key.
const RESERVED_FIELDS: [&str; 4] = [ID_FIELD, ID_ORIGINAL_FIELD, BACKUP_DATE_FIELD, JOB_NAME_FIELD];

fn validate_clean(clean: &CleanConfig, partition_key: &str, errors: &mut Vec<String>) {
    for field in &clean.remove_fields {
        if field == ID_FIELD || field == partition_key {
            errors.push(format!(
                "clean.remove_fields: '{field}' addresses the document and cannot be removed"
            ));
        }
    }
    for field in clean.set_fields.keys() {
        if field == ID_FIELD || field == partition_key {
            errors.push(format!(
                "clean.set_fields: '{field}' addresses the document and cannot be overwritten"
            ));
        }
    }
    if clean.remove_fields.is_empty() && clean.set_fields.is_empty() {
        errors.push("clean: at least one of remove_fields or set_fields is required".to_string());
    }
}

/// Validate a parsed job configuration.
/// Returns `Ok(())` if valid, Err with all validation errors if not.
///
/// # Errors
///
/// Returns an error listing all validation failures found in the job config.
pub fn validate_job(config: &JobConfig) -> Result<()> {
    let mut errors = Vec::new();

    if config.version != "1.0" {
        errors.push(format!(
            "Unsupported job version '{}', expected '1.0'",
            config.version
        ));
    }

    if config.job.trim().is_empty() {
        errors.push("Job name must not be empty".to_string());
    }

    if config.store.snapshot.as_os_str().is_empty() {
        errors.push("store.snapshot must not be empty".to_string());
    }

    let source = config.source.container.trim();
    let destination = config.destination.container.trim();
    if source.is_empty() {
        errors.push("source.container must not be empty".to_string());
    }
    if destination.is_empty() {
        errors.push("destination.container must not be empty".to_string());
    }
    if !source.is_empty() && source == destination {
        errors.push(format!(
            "source and destination must be different containers (both '{source}')"
        ));
    }

    let pk = config.source.partition_key.as_str();
    if !FIELD_NAME_RE.is_match(pk) {
        errors.push(format!(
            "source.partition_key '{pk}' must be a top-level field name ([A-Za-z_][A-Za-z0-9_]*)"
        ));
    } else if RESERVED_FIELDS.contains(&pk) {
        errors.push(format!(
            "source.partition_key '{pk}' collides with a field docvault writes"
        ));
    }

    if config.query.text.trim().is_empty() {
        errors.push("query.text must not be empty".to_string());
    }
    let mut seen = HashSet::new();
    for param in &config.query.parameters {
        if !param.name.starts_with('@') {
            errors.push(format!(
                "query parameter '{}' must start with '@'",
                param.name
            ));
        }
        if !seen.insert(param.name.as_str()) {
            errors.push(format!("query parameter '{}' is bound twice", param.name));
        }
    }

    if config.run.page_size == Some(0) {
        errors.push("run.page_size must be at least 1".to_string());
    }
    if let Some(mode) = &config.run.mode {
        if let Err(e) = mode.parse::<RunMode>() {
            errors.push(format!("run.mode: {e}"));
        }
    }

    if let Some(clean) = &config.clean {
        validate_clean(clean, pk, &mut errors);
    }

    if !errors.is_empty() {
        bail!("Job validation failed:\n  - {}", errors.join("\n  - "));
    }

    Ok(())
}
