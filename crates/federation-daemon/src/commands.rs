//! One-shot operator subcommands.
//!
//! These run against the shared database without starting the dispatcher.
//! Mutations they make (imports, resweeps) surface to a running daemon at
//! its next reconciliation pass, not immediately.

use std::sync::{Arc, Mutex};

use anyhow::Context;
use federation_core::{FederationConfig, NullSink, Paths};
use federation_import::Importer;
use federation_store::{Database, MappingStatus};

use crate::app::build_adapters;

fn open_database(paths: &Paths) -> anyhow::Result<Database> {
    paths.ensure_dirs()?;
    Database::open(&paths.database_file(), Arc::new(NullSink))
        .context("Failed to open federation database")
}

/// Fetch one remote object and upsert it as local content.
pub async fn import(config: &FederationConfig, paths: &Paths, uri: &str) -> anyhow::Result<()> {
    let db = Arc::new(Mutex::new(open_database(paths)?));
    let importer = Importer::new(db, build_adapters(config)?);

    let content = importer.import(uri).await?;

    println!("Imported {}", content.id);
    println!("  Author:     {}", content.author_id);
    println!("  Created at: {}", content.created_at.to_rfc3339());
    if let Some(parent) = &content.reply_to_id {
        println!("  Reply to:   {}", parent);
    }
    Ok(())
}

/// Reset every mapping in `status` back to pending with a fresh attempt
/// budget. The daemon re-drives pending mappings at startup.
pub fn resweep(paths: &Paths, status_arg: &str) -> anyhow::Result<()> {
    let status = match status_arg {
        "pending" => MappingStatus::Pending,
        "failed" => MappingStatus::Failed,
        other => anyhow::bail!("Cannot resweep mappings in status '{other}'"),
    };

    let db = open_database(paths)?;
    let mappings = db.list_mappings_by_status(status)?;
    for mapping in &mappings {
        db.reset_for_redrive(&mapping.content_id, mapping.protocol)?;
    }

    println!("Reset {} {} mappings to pending.", mappings.len(), status);
    if !mappings.is_empty() {
        println!("The daemon will re-drive them at its next startup reconciliation.");
    }
    Ok(())
}

/// Print mapping counts by sync status.
pub fn status(paths: &Paths) -> anyhow::Result<()> {
    let database_file = paths.database_file();
    if !database_file.exists() {
        println!("No federation database at {}", database_file.display());
        return Ok(());
    }

    let db = Database::open(&database_file, Arc::new(NullSink))
        .context("Failed to open federation database")?;
    let counts = db.count_mappings_by_status()?;

    println!("Federation mappings");
    println!("  Pending:    {}", counts.pending);
    println!("  Synced:     {}", counts.synced);
    println!("  Failed:     {}", counts.failed);
    println!("  Tombstoned: {}", counts.tombstoned);
    println!("  Total:      {}", counts.total());

    if let Ok(pid) = std::fs::read_to_string(paths.pid_file()) {
        println!("  Daemon PID: {}", pid.trim());
    }
    Ok(())
}
