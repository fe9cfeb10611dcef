use std::path::Path;

use anyhow::{Context, Result};

use docvault_engine::config::parser;
use docvault_engine::config::validator;
use docvault_store::{DocumentStore, MemoryStore};

use super::snapshot_path;

/// Execute the `check` command: validate the job file and the containers it names.
pub async fn execute(job_path: &Path) -> Result<()> {
    // 1. Parse job YAML
    let config = parser::parse_job(job_path)
        .with_context(|| format!("Failed to parse job: {}", job_path.display()))?;

    // 2. Validate job structure
    validator::validate_job(&config)?;
    println!("Job structure:     OK");

    // 3. Check store and containers
    let snapshot = snapshot_path(job_path, &config.store.snapshot);
    let store = match MemoryStore::load(&snapshot) {
        Ok(store) => {
            println!("Store snapshot:    OK");
            store
        }
        Err(e) => {
            println!("Store snapshot:    FAILED");
            println!("  {}: {e}", snapshot.display());
            anyhow::bail!("One or more checks failed");
        }
    };

    let spec = config.job_spec();
    let source_ok = print_container("Source", &store, &spec.source).await?;
    let dest_ok = print_container("Destination", &store, &spec.destination).await?;

    if let Some(clean) = &config.clean {
        println!("Clean rules:       OK");
        println!(
            "  remove {} field(s), set {} field(s), tester on {} field(s)",
            clean.remove_fields.len(),
            clean.set_fields.len(),
            clean.only_if_present.len()
        );
    }

    if source_ok && dest_ok {
        println!("\nAll checks passed.");
        Ok(())
    } else {
        anyhow::bail!("One or more checks failed")
    }
}

async fn print_container(
    label: &str,
    store: &MemoryStore,
    container: &docvault_types::ContainerName,
) -> Result<bool> {
    let exists = store
        .container_exists(container)
        .await
        .with_context(|| format!("Failed to look up container '{container}'"))?;
    let status = if exists { "OK" } else { "FAILED" };
    println!("{:18} {}", format!("{}:", label), status);
    if !exists {
        println!("  container '{container}' not found in snapshot");
    }
    Ok(exists)
}
