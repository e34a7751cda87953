// src/commands/mod.rs
//! Command handlers for the nupm CLI

mod install;
mod list;
mod restore;
mod uninstall;
mod update;

pub use install::cmd_install;
pub use list::cmd_list;
pub use restore::cmd_restore;
pub use uninstall::cmd_uninstall;
pub use update::cmd_update;

use anyhow::{Context, Result};
use nupm::config::Config;
use nupm::manager::{OperationContext, PackageManager, PlannedActions, ResolutionContext, SourceSelection};
use nupm::project::{LoggingProjectContext, SharedProject};
use nupm::resolver::DependencyBehavior;
use std::path::Path;
use tracing::warn;

/// Everything a command needs: the loaded configuration, the manager over
/// the configured solution and one operation scope
pub struct Session {
    pub config: Config,
    pub manager: PackageManager,
    pub context: LoggingProjectContext,
    pub operation: OperationContext,
}

impl Session {
    pub fn open(config_path: Option<&Path>) -> Result<Self> {
        let config = Config::load(config_path).context("Failed to load configuration")?;
        let manager = config
            .build_manager()
            .context("Failed to set up the solution")?;
        let operation = OperationContext::new();

        // Ctrl-C cancels the running operation; rollback still happens
        let token = operation.token().clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, cancelling");
                token.cancel();
            }
        });

        Ok(Self {
            config,
            manager,
            context: LoggingProjectContext::new(),
            operation,
        })
    }

    /// The named project, or every project of the solution in order
    pub fn projects(&self, name: Option<&str>) -> Result<Vec<SharedProject>> {
        let solution = self.manager.solution();
        match name {
            Some(name) => {
                let project = solution
                    .get_project(name)
                    .ok_or_else(|| anyhow::anyhow!("Project '{}' is not part of the solution", name))?;
                Ok(vec![project])
            }
            None => {
                let projects = solution.sorted_projects();
                if projects.is_empty() {
                    return Err(anyhow::anyhow!(
                        "No projects configured. Add [[project]] entries to the configuration file."
                    ));
                }
                Ok(projects)
            }
        }
    }

    /// Resolution settings from the configuration, overridden by flags
    pub fn resolution(&self, behavior: Option<&str>, prerelease: bool) -> Result<ResolutionContext> {
        let behavior = match behavior {
            Some(value) => value
                .parse::<DependencyBehavior>()
                .map_err(|_| anyhow::anyhow!("Unknown dependency behavior '{}'", value))?,
            None => self.config.dependency_behavior,
        };
        Ok(ResolutionContext::new(behavior)
            .with_prerelease(prerelease || self.config.include_prerelease))
    }

    /// Sources selected by `--source`; all configured sources when empty
    ///
    /// Named sources become primary, the remaining ones secondary.
    pub fn sources(&self, names: &[String]) -> Result<SourceSelection> {
        let all = self.manager.sources().to_vec();
        if names.is_empty() {
            return Ok(SourceSelection::all(all));
        }

        for name in names {
            if !all.iter().any(|s| s.name().eq_ignore_ascii_case(name)) {
                return Err(anyhow::anyhow!("Unknown or disabled source '{}'", name));
            }
        }
        let (primary, secondary): (Vec<_>, Vec<_>) = all
            .into_iter()
            .partition(|s| names.iter().any(|n| s.name().eq_ignore_ascii_case(n)));
        Ok(SourceSelection::new(primary, secondary))
    }
}

/// Print planned actions the way a dry run shows them
pub fn print_plan(project: &str, plan: &PlannedActions) {
    if plan.is_empty() {
        println!("{}: nothing to do", project);
        return;
    }

    println!("{}:", project);
    if let Some(build_integrated) = plan.as_build_integrated() {
        for action in &build_integrated.actions {
            println!("  {}", action);
        }
        let context = &build_integrated.installation_context;
        if !context.unsuccessful_frameworks.is_empty() {
            println!(
                "  restore fails for: {}",
                context
                    .unsuccessful_frameworks
                    .iter()
                    .map(|f| f.to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        }
        println!(
            "  {} package(s) in the restored graph",
            build_integrated.restore_result.packages.len()
        );
        return;
    }

    for action in plan.actions() {
        println!("  {}", action);
    }
}
