// tests/config_solution.rs

//! A solution assembled from a configuration file, served by a local feed.

mod common;

use common::{id, lowest};
use nupm::manager::OperationContext;
use nupm::packaging::{PackageDependency, PackageManifest};
use nupm::project::LoggingProjectContext;
use nupm::{Config, PackagesFolder, TargetFramework, VersionRange};

async fn publish(feed: &PackagesFolder, name: &str, version: &str, deps: &[&str]) {
    let mut manifest = PackageManifest::new(id(name, version));
    for dep in deps {
        manifest = manifest.with_dependency(
            TargetFramework::any(),
            PackageDependency::new(*dep, VersionRange::parse("1.0.0").unwrap()),
        );
    }
    feed.install(&manifest, name.as_bytes()).await.unwrap();
}

#[tokio::test]
async fn test_install_from_configured_local_feed() {
    let temp = tempfile::tempdir().unwrap();
    let feed = PackagesFolder::new(temp.path().join("feed"));
    publish(&feed, "Core", "1.0.0", &[]).await;
    publish(&feed, "Web", "1.0.0", &["Core"]).await;
    std::fs::create_dir_all(temp.path().join("app")).unwrap();

    let config_path = temp.path().join("nupm.toml");
    std::fs::write(
        &config_path,
        r#"
packages_folder = "packages"

[[source]]
name = "local"
path = "feed"

[[project]]
name = "App"
kind = "packages-config"
path = "app"
framework = "net8.0"
"#,
    )
    .unwrap();

    let config = Config::load(Some(&config_path)).unwrap();
    let manager = config.build_manager().unwrap();
    let project = manager.solution().get_project("App").unwrap();
    let context = LoggingProjectContext::new();

    manager
        .install_package_by_id(
            project.as_ref(),
            "Web",
            &lowest(),
            &context,
            &manager.default_sources(),
            &OperationContext::new(),
        )
        .await
        .unwrap();

    let order = manager
        .get_installed_packages_in_dependency_order(project.as_ref())
        .await
        .unwrap();
    assert_eq!(order, vec![id("Core", "1.0.0"), id("Web", "1.0.0")]);
    assert!(temp.path().join("app").join("packages.config").exists());
    assert!(manager.packages_folder().package_exists(&id("Web", "1.0.0")));
}
