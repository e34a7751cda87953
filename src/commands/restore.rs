// src/commands/restore.rs

//! Restore command
//!
//! Puts back what the projects reference but the disk lacks:
//! - packages-config projects get missing packages extracted into the
//!   packages folder again
//! - build-integrated projects are restored and their lock files rewritten
//!   when the result changed
//!
//! `--pending` restores only the projects that lazy parent restores marked.

use super::Session;
use anyhow::Result;
use std::path::Path;
use tracing::{debug, info};

pub async fn cmd_restore(
    config_path: Option<&Path>,
    project: Option<&str>,
    pending: bool,
    cleanup: bool,
) -> Result<()> {
    let session = Session::open(config_path)?;
    let manager = &session.manager;

    if cleanup {
        let removed = manager.cleanup_marked_packages().await?;
        debug!("Removed {} package(s) marked for deletion", removed);
        if removed > 0 {
            println!("Removed {} package(s) left over from earlier runs", removed);
        }
    }

    if pending {
        let restored = manager
            .restore_pending(&session.context, &session.operation)
            .await?;
        if restored.is_empty() {
            println!("No pending restores");
        } else {
            println!("Restored: {}", restored.join(", "));
        }
        return Ok(());
    }

    let Some(name) = project else {
        info!("Restoring every project of the solution");
        let failures = manager
            .restore_solution(&session.context, &session.operation)
            .await?;
        if failures > 0 {
            return Err(anyhow::anyhow!("Restore failed for {} item(s)", failures));
        }
        println!("Restore complete");
        return Ok(());
    };

    let target = session.projects(Some(name))?.remove(0);
    if target.is_build_integrated() {
        if !manager
            .restore_project(name, &session.context, &session.operation)
            .await?
        {
            return Err(anyhow::anyhow!("Restore failed for project '{}'", name));
        }
        println!("Restored {}", target.name());
        return Ok(());
    }

    let mut restored = 0;
    for reference in target.installed_packages().await? {
        if manager
            .restore_package(&reference.identity, &session.context, &[], &session.operation)
            .await?
        {
            restored += 1;
        }
    }
    println!("Restored {} package(s) for {}", restored, target.name());
    Ok(())
}
