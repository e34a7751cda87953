// src/config.rs

//! TOML configuration
//!
//! A `nupm.toml` file describes the package sources, the two package folders,
//! the projects of the solution and the defaults used by the command line:
//!
//! ```toml
//! packages_folder = "packages"
//! global_packages_folder = "~/.nupm/packages"
//! dependency_behavior = "lowest"
//!
//! [[source]]
//! name = "nuget.org"
//! url = "https://feed.example.org/v3/"
//!
//! [[source]]
//! name = "local"
//! path = "feed"
//! priority = 10
//!
//! [[project]]
//! name = "App"
//! kind = "packages-config"
//! path = "src/App"
//! framework = "net8.0"
//! ```
//!
//! Relative paths are taken relative to the directory of the file.

use crate::error::{Error, Result};
use crate::folder::PackagesFolder;
use crate::framework::TargetFramework;
use crate::manager::{ManagerSettings, PackageManager};
use crate::project::{BuildIntegratedProject, PackagesConfigProject, SharedProject};
use crate::protocol::{HttpSourceRepository, LocalFolderRepository, SharedSource};
use crate::resolver::DependencyBehavior;
use crate::solution::SolutionManager;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use strum_macros::{Display, EnumString};
use tracing::{debug, info};

pub const DEFAULT_CONFIG_FILE: &str = "nupm.toml";

/// Environment variable overriding `packages_folder`
pub const PACKAGES_ENV_VAR: &str = "NUPM_PACKAGES";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub packages_folder: PathBuf,
    pub global_packages_folder: PathBuf,
    pub max_parallel_downloads: usize,
    pub gather_parallelism: usize,
    pub request_timeout_secs: u64,
    pub dependency_behavior: DependencyBehavior,
    pub include_prerelease: bool,
    pub lazy_parent_restore: bool,

    #[serde(rename = "source")]
    pub sources: Vec<SourceConfig>,

    #[serde(rename = "project")]
    pub projects: Vec<ProjectConfig>,

    /// Directory relative paths are resolved against
    #[serde(skip)]
    pub base_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        let settings = ManagerSettings::default();
        Self {
            packages_folder: PathBuf::from("packages"),
            global_packages_folder: PathBuf::from(".nupm/packages"),
            max_parallel_downloads: settings.max_parallel_downloads,
            gather_parallelism: settings.max_degree_of_parallelism,
            request_timeout_secs: settings.request_timeout.as_secs(),
            dependency_behavior: DependencyBehavior::Lowest,
            include_prerelease: false,
            lazy_parent_restore: settings.lazy_parent_restore,
            sources: Vec::new(),
            projects: Vec::new(),
            base_dir: PathBuf::from("."),
        }
    }
}

/// A `[[source]]` entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub name: String,

    /// Base URL of an HTTP feed
    #[serde(default)]
    pub url: Option<String>,

    /// Directory of a local folder feed
    #[serde(default)]
    pub path: Option<PathBuf>,

    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Lower values are consulted first
    #[serde(default)]
    pub priority: i32,
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum ProjectKind {
    PackagesConfig,
    BuildIntegrated,
}

/// A `[[project]]` entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub name: String,
    pub kind: ProjectKind,

    /// Project directory
    pub path: PathBuf,

    /// Target framework of a packages-config project
    #[serde(default)]
    pub framework: Option<String>,
}

impl Config {
    /// Load `path`, or `nupm.toml` in the current directory
    ///
    /// A missing default file yields the default configuration; a missing
    /// explicit file is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let explicit = path.is_some();
        let path = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE));

        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let mut config = Self::parse(&content)?;
            config.base_dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from("."));
            debug!("Loaded configuration from {}", path.display());
            config
        } else if explicit {
            return Err(Error::ConfigError(format!(
                "Configuration file not found: {}",
                path.display()
            )));
        } else {
            Self::default()
        };

        if let Ok(folder) = std::env::var(PACKAGES_ENV_VAR)
            && !folder.is_empty()
        {
            debug!("Packages folder overridden by {} to {}", PACKAGES_ENV_VAR, folder);
            config.packages_folder = PathBuf::from(folder);
        }
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| Error::ConfigError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::ConfigError(e.to_string()))
    }

    fn validate(&self) -> Result<()> {
        if self.max_parallel_downloads == 0 || self.gather_parallelism == 0 {
            return Err(Error::ConfigError(
                "parallelism settings must be at least 1".to_string(),
            ));
        }
        for source in &self.sources {
            match (&source.url, &source.path) {
                (Some(_), Some(_)) => {
                    return Err(Error::ConfigError(format!(
                        "Source '{}' sets both url and path",
                        source.name
                    )));
                }
                (None, None) => {
                    return Err(Error::ConfigError(format!(
                        "Source '{}' needs a url or a path",
                        source.name
                    )));
                }
                _ => {}
            }
        }
        for (i, project) in self.projects.iter().enumerate() {
            if self.projects[..i]
                .iter()
                .any(|p| p.name.eq_ignore_ascii_case(&project.name))
            {
                return Err(Error::ConfigError(format!(
                    "Project '{}' is listed twice",
                    project.name
                )));
            }
        }
        Ok(())
    }

    /// Absolute form of a configured path
    pub fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    pub fn settings(&self) -> ManagerSettings {
        ManagerSettings {
            max_degree_of_parallelism: self.gather_parallelism,
            max_parallel_downloads: self.max_parallel_downloads,
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            lazy_parent_restore: self.lazy_parent_restore,
        }
    }

    pub fn packages_folder(&self) -> PackagesFolder {
        PackagesFolder::new(self.resolve_path(&self.packages_folder))
    }

    pub fn global_packages_folder(&self) -> PackagesFolder {
        PackagesFolder::new(self.resolve_path(&self.global_packages_folder))
    }

    /// Enabled sources ordered by priority, then by position in the file
    pub fn build_sources(&self) -> Result<Vec<SharedSource>> {
        let mut enabled: Vec<&SourceConfig> = self.sources.iter().filter(|s| s.enabled).collect();
        enabled.sort_by_key(|s| s.priority);

        let mut sources: Vec<SharedSource> = Vec::with_capacity(enabled.len());
        for source in enabled {
            let repository: SharedSource = match (&source.url, &source.path) {
                (Some(url), _) => Arc::new(HttpSourceRepository::new(&source.name, url)?),
                (None, Some(path)) => Arc::new(LocalFolderRepository::new(
                    &source.name,
                    self.resolve_path(path),
                )),
                (None, None) => continue,
            };
            sources.push(repository);
        }
        Ok(sources)
    }

    fn build_project(&self, project: &ProjectConfig) -> Result<SharedProject> {
        let dir = self.resolve_path(&project.path);
        match project.kind {
            ProjectKind::PackagesConfig => {
                let framework = match &project.framework {
                    Some(moniker) => TargetFramework::parse(moniker)?,
                    None => TargetFramework::any(),
                };
                Ok(Arc::new(PackagesConfigProject::in_directory(
                    &project.name,
                    &dir,
                    framework,
                    self.packages_folder(),
                )))
            }
            ProjectKind::BuildIntegrated => {
                let loaded = BuildIntegratedProject::load(&dir).map_err(|e| {
                    Error::ConfigError(format!(
                        "Project '{}' has no readable package spec in {}: {}",
                        project.name,
                        dir.display(),
                        e
                    ))
                })?;
                Ok(Arc::new(loaded))
            }
        }
    }

    pub fn build_solution(&self) -> Result<SolutionManager> {
        let solution = SolutionManager::new();
        for project in &self.projects {
            solution.add_project(self.build_project(project)?);
        }
        Ok(solution)
    }

    /// Manager over the configured solution, folders and sources
    pub fn build_manager(&self) -> Result<PackageManager> {
        let solution = Arc::new(self.build_solution()?);
        let sources = self.build_sources()?;
        info!(
            "Using {} source(s) and {} project(s)",
            sources.len(),
            self.projects.len()
        );
        Ok(PackageManager::new(
            solution,
            self.packages_folder(),
            self.global_packages_folder(),
            sources,
        )
        .with_settings(self.settings()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SAMPLE: &str = r#"
packages_folder = "pkgs"
max_parallel_downloads = 4
dependency_behavior = "highest"
include_prerelease = true

[[source]]
name = "remote"
url = "https://feed.example.org/v3/"
priority = 5

[[source]]
name = "local"
path = "feed"

[[source]]
name = "off"
path = "unused"
enabled = false

[[project]]
name = "App"
kind = "packages-config"
path = "app"
framework = "net8.0"
"#;

    #[test]
    fn test_parse_sample() {
        let config = Config::parse(SAMPLE).unwrap();
        assert_eq!(config.packages_folder, PathBuf::from("pkgs"));
        assert_eq!(config.max_parallel_downloads, 4);
        assert_eq!(config.gather_parallelism, ManagerSettings::default().max_degree_of_parallelism);
        assert_eq!(config.dependency_behavior, DependencyBehavior::Highest);
        assert!(config.include_prerelease);
        assert_eq!(config.sources.len(), 3);
        assert!(!config.sources[2].enabled);
        assert_eq!(config.projects[0].kind, ProjectKind::PackagesConfig);
    }

    #[test]
    fn test_sources_sorted_by_priority() {
        let config = Config::parse(SAMPLE).unwrap();
        let sources = config.build_sources().unwrap();
        let names: Vec<&str> = sources.iter().map(|s| s.name()).collect();
        assert_eq!(names, vec!["local", "remote"]);
    }

    #[test]
    fn test_source_needs_location() {
        let err = Config::parse("[[source]]\nname = \"x\"\n").unwrap_err();
        assert!(matches!(err, Error::ConfigError(_)));

        let both = "[[source]]\nname = \"x\"\nurl = \"https://a/\"\npath = \"b\"\n";
        assert!(Config::parse(both).is_err());
    }

    #[test]
    fn test_duplicate_project_rejected() {
        let content = r#"
[[project]]
name = "App"
kind = "packages-config"
path = "a"

[[project]]
name = "app"
kind = "build-integrated"
path = "b"
"#;
        assert!(Config::parse(content).is_err());
    }

    #[test]
    fn test_load_resolves_relative_paths() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(DEFAULT_CONFIG_FILE);
        std::fs::write(&path, SAMPLE).unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.base_dir, temp.path());
        assert_eq!(
            config.global_packages_folder().root(),
            temp.path().join(".nupm/packages")
        );

        let solution = config.build_solution().unwrap();
        let project = solution.get_project("app").unwrap();
        assert_eq!(project.name(), "App");
        assert!(!project.is_build_integrated());
    }

    #[test]
    fn test_missing_explicit_file() {
        let temp = TempDir::new().unwrap();
        let err = Config::load(Some(&temp.path().join("absent.toml"))).unwrap_err();
        assert!(matches!(err, Error::ConfigError(_)));
    }

    #[test]
    fn test_missing_build_integrated_spec() {
        let temp = TempDir::new().unwrap();
        let content = format!(
            "[[project]]\nname = \"Lib\"\nkind = \"build-integrated\"\npath = \"{}\"\n",
            temp.path().join("lib").display()
        );
        let config = Config::parse(&content).unwrap();
        assert!(matches!(config.build_solution(), Err(Error::ConfigError(_))));
    }

    #[test]
    fn test_settings_from_config() {
        let config = Config::parse("request_timeout_secs = 30\nlazy_parent_restore = true\n").unwrap();
        let settings = config.settings();
        assert_eq!(settings.request_timeout, Duration::from_secs(30));
        assert!(settings.lazy_parent_restore);
    }
}
