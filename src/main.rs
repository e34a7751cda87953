// src/main.rs

use anyhow::Result;
use clap::Parser;

mod cli;
mod commands;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber for logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = cli.config.as_deref();
    let project = cli.project.as_deref();

    let result = match cli.command {
        Some(Commands::Install {
            package,
            version,
            prerelease,
            dependency_behavior,
            source,
            dry_run,
        }) => {
            commands::cmd_install(
                config,
                project,
                &package,
                version.as_deref(),
                prerelease,
                dependency_behavior.as_deref(),
                &source,
                dry_run,
            )
            .await
        }
        Some(Commands::Uninstall {
            package,
            remove_dependencies,
            force,
            dry_run,
        }) => {
            commands::cmd_uninstall(config, project, &package, remove_dependencies, force, dry_run)
                .await
        }
        Some(Commands::Update {
            package,
            version,
            prerelease,
            safe,
            reinstall,
            source,
            dry_run,
        }) => {
            commands::cmd_update(
                config,
                project,
                package.as_deref(),
                version.as_deref(),
                prerelease,
                safe,
                reinstall,
                &source,
                dry_run,
            )
            .await
        }
        Some(Commands::Restore { pending, cleanup }) => {
            commands::cmd_restore(config, project, pending, cleanup).await
        }
        Some(Commands::List { json }) => commands::cmd_list(config, project, json).await,
        None => {
            // No command provided, show help
            println!("nupm v{}", env!("CARGO_PKG_VERSION"));
            println!("Run 'nupm --help' for usage information");
            Ok(())
        }
    };

    // Refusals caused by the request itself are reported without a chain
    if let Err(e) = &result
        && let Some(error) = e.downcast_ref::<nupm::Error>()
        && error.is_user_error()
    {
        eprintln!("error: {error}");
        std::process::exit(1);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_install_with_globals() {
        let cli = Cli::try_parse_from([
            "nupm", "--project", "App", "install", "Json", "--version", "13.0.1", "--dry-run",
        ])
        .unwrap();
        assert_eq!(cli.project.as_deref(), Some("App"));
        match cli.command {
            Some(Commands::Install { package, version, dry_run, .. }) => {
                assert_eq!(package, "Json");
                assert_eq!(version.as_deref(), Some("13.0.1"));
                assert!(dry_run);
            }
            _ => panic!("expected install"),
        }
    }

    #[test]
    fn test_update_version_requires_package() {
        assert!(Cli::try_parse_from(["nupm", "update", "--version", "2.0.0"]).is_err());
        assert!(Cli::try_parse_from(["nupm", "update", "--reinstall", "--safe"]).is_err());
    }
}
