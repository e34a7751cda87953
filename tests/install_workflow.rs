// tests/install_workflow.rs

//! Install, update, uninstall and rollback workflows on packages.config
//! projects sharing one packages folder.

mod common;

use common::{Fixture, describe, id, installed, lowest};
use nupm::manager::{OperationContext, UninstallationContext, UpdateRequest};
use nupm::packaging::PackageManifest;
use nupm::project::MessageLevel;
use nupm::version::VersionConstraints;
use nupm::{DependencyBehavior, Error, NuGetVersion, ResolutionContext};

#[tokio::test]
async fn test_install_without_dependencies() {
    let fx = Fixture::new();
    fx.feed.add("A", "1.0.0", &[]).unwrap();
    let project = fx.packages_config_project("App");
    let op = OperationContext::new();

    let plan = fx
        .manager
        .preview_install_package(project.as_ref(), &id("A", "1.0.0"), &lowest(), &fx.context, &fx.sources(), &op)
        .await
        .unwrap();
    assert_eq!(describe(plan.actions()), vec!["Install A 1.0.0 from feed"]);

    fx.manager
        .execute_project_actions(project.as_ref(), &plan, &fx.context, &op)
        .await
        .unwrap();

    assert_eq!(installed(&project).await, vec!["A 1.0.0"]);
    assert!(fx.manager.packages_folder().package_exists(&id("A", "1.0.0")));
    assert!(fx.context.messages_at(MessageLevel::Error).is_empty());
}

#[tokio::test]
async fn test_update_uninstalls_before_installing() {
    let fx = Fixture::new();
    fx.feed.add("A", "1.0.0", &[]).unwrap();
    fx.feed.add("A", "2.0.0", &[]).unwrap();
    let project = fx.packages_config_project("App");
    let op = OperationContext::new();

    fx.manager
        .install_package(project.as_ref(), &id("A", "1.0.0"), &lowest(), &fx.context, &fx.sources(), &op)
        .await
        .unwrap();

    let plan = fx
        .manager
        .preview_update_packages(
            project.as_ref(),
            &UpdateRequest::Id("A".to_string()),
            &lowest(),
            &fx.context,
            &fx.sources(),
            &op,
        )
        .await
        .unwrap();
    assert_eq!(
        describe(plan.actions()),
        vec!["Uninstall A 1.0.0", "Install A 2.0.0 from feed"]
    );

    fx.manager
        .execute_project_actions(project.as_ref(), &plan, &fx.context, &op)
        .await
        .unwrap();

    assert_eq!(installed(&project).await, vec!["A 2.0.0"]);
    let folder = fx.manager.packages_folder();
    assert!(!folder.package_exists(&id("A", "1.0.0")));
    assert!(folder.package_exists(&id("A", "2.0.0")));
}

#[tokio::test]
async fn test_dependency_resolves_to_lowest_available() {
    let fx = Fixture::new();
    fx.feed.add("A", "1.0.0", &[("B", "1.0.0")]).unwrap();
    fx.feed.add("B", "1.5.0", &[]).unwrap();
    fx.feed.add("B", "2.0.0", &[]).unwrap();
    let project = fx.packages_config_project("App");
    let op = OperationContext::new();

    let plan = fx
        .manager
        .preview_install_package(project.as_ref(), &id("A", "1.0.0"), &lowest(), &fx.context, &fx.sources(), &op)
        .await
        .unwrap();
    assert_eq!(
        describe(plan.actions()),
        vec!["Install B 1.5.0 from feed", "Install A 1.0.0 from feed"]
    );
}

#[tokio::test]
async fn test_highest_behavior_picks_newest_dependency() {
    let fx = Fixture::new();
    fx.feed.add("A", "1.0.0", &[("B", "1.0.0")]).unwrap();
    fx.feed.add("B", "1.5.0", &[]).unwrap();
    fx.feed.add("B", "2.0.0", &[]).unwrap();
    let project = fx.packages_config_project("App");

    let plan = fx
        .manager
        .preview_install_package(
            project.as_ref(),
            &id("A", "1.0.0"),
            &ResolutionContext::new(DependencyBehavior::Highest),
            &fx.context,
            &fx.sources(),
            &OperationContext::new(),
        )
        .await
        .unwrap();
    assert_eq!(plan.actions()[0].identity, id("B", "2.0.0"));
}

#[tokio::test]
async fn test_download_failure_rolls_back() {
    let fx = Fixture::new();
    fx.feed.add("A", "1.0.0", &[("B", "1.0.0")]).unwrap();
    fx.feed.add("B", "1.0.0", &[]).unwrap();
    fx.feed.fail_download(id("A", "1.0.0"));
    let project = fx.packages_config_project("App");

    let err = fx
        .manager
        .install_package(
            project.as_ref(),
            &id("A", "1.0.0"),
            &lowest(),
            &fx.context,
            &fx.sources(),
            &OperationContext::new(),
        )
        .await
        .unwrap_err();

    assert!(
        err.to_string().contains("could not be downloaded"),
        "unexpected error: {err}"
    );
    assert!(installed(&project).await.is_empty());
    assert!(!fx.manager.packages_folder().package_exists(&id("B", "1.0.0")));

    let warnings = fx.context.messages_at(MessageLevel::Warning);
    assert!(warnings.iter().any(|w| w.contains("Rolling back package changes in project 'App'")));
    assert!(!fx.context.messages_at(MessageLevel::Error).is_empty());
}

#[tokio::test]
async fn test_shared_package_retained_until_last_reference() {
    let fx = Fixture::new();
    fx.feed.add("A", "1.0.0", &[]).unwrap();
    let first = fx.packages_config_project("First");
    let second = fx.packages_config_project("Second");
    let op = OperationContext::new();

    let count = fx
        .manager
        .install_package_in_projects(
            &[first.clone(), second.clone()],
            &id("A", "1.0.0"),
            &lowest(),
            &fx.context,
            &fx.sources(),
            &op,
        )
        .await
        .unwrap();
    assert_eq!(count, 2);
    // The second project reuses the extracted package
    assert_eq!(fx.feed.download_count(), 1);

    let uninstall = UninstallationContext::default();
    fx.manager
        .uninstall_package(first.as_ref(), "A", &uninstall, &fx.context, &op)
        .await
        .unwrap();
    assert!(installed(&first).await.is_empty());
    assert!(fx.manager.packages_folder().package_exists(&id("A", "1.0.0")));

    fx.manager
        .uninstall_package(second.as_ref(), "A", &uninstall, &fx.context, &op)
        .await
        .unwrap();
    assert!(!fx.manager.packages_folder().package_exists(&id("A", "1.0.0")));
}

#[tokio::test]
async fn test_install_refuses_existing_and_older() {
    let fx = Fixture::new();
    fx.feed.add("A", "1.0.0", &[]).unwrap();
    fx.feed.add("A", "2.0.0", &[]).unwrap();
    let project = fx.packages_config_project("App");
    let op = OperationContext::new();

    fx.manager
        .install_package(project.as_ref(), &id("A", "2.0.0"), &lowest(), &fx.context, &fx.sources(), &op)
        .await
        .unwrap();

    let again = fx
        .manager
        .preview_install_package(project.as_ref(), &id("A", "2.0.0"), &lowest(), &fx.context, &fx.sources(), &op)
        .await;
    assert!(matches!(again, Err(Error::AlreadyInstalled { .. })));

    // A fresh operation, the gather cache still lists 2.0.0
    fx.feed.unlist(&id("A", "2.0.0"));
    let by_id = fx
        .manager
        .preview_install_package_by_id(
            project.as_ref(),
            "A",
            &ResolutionContext::new(DependencyBehavior::Lowest).with_unlisted(false),
            &fx.context,
            &fx.sources(),
            &OperationContext::new(),
        )
        .await;
    assert!(matches!(by_id, Err(Error::NewerVersionAlreadyReferenced { .. })));
    assert_eq!(installed(&project).await, vec!["A 2.0.0"]);
}

#[tokio::test]
async fn test_uninstall_with_dependencies() {
    let fx = Fixture::new();
    fx.feed.add("A", "1.0.0", &[("B", "1.0.0")]).unwrap();
    fx.feed.add("B", "1.0.0", &[]).unwrap();
    let project = fx.packages_config_project("App");
    let op = OperationContext::new();

    fx.manager
        .install_package(project.as_ref(), &id("A", "1.0.0"), &lowest(), &fx.context, &fx.sources(), &op)
        .await
        .unwrap();
    assert_eq!(installed(&project).await, vec!["A 1.0.0", "B 1.0.0"]);

    let refused = fx
        .manager
        .preview_uninstall_package(project.as_ref(), "B", &UninstallationContext::default(), &fx.context, &op)
        .await;
    assert!(matches!(refused, Err(Error::PackageHasDependants { .. })));

    let plan = fx
        .manager
        .preview_uninstall_package(
            project.as_ref(),
            "A",
            &UninstallationContext::new(true, false),
            &fx.context,
            &op,
        )
        .await
        .unwrap();
    assert_eq!(describe(plan.actions()), vec!["Uninstall A 1.0.0", "Uninstall B 1.0.0"]);

    fx.manager
        .execute_project_actions(project.as_ref(), &plan, &fx.context, &op)
        .await
        .unwrap();
    assert!(installed(&project).await.is_empty());
}

#[tokio::test]
async fn test_direct_install_offers_readme() {
    let fx = Fixture::new();
    let mut manifest = PackageManifest::new(id("Docs", "1.0.0"));
    manifest.readme = Some("Read me first".to_string());
    fx.feed.add_package(manifest);
    let project = fx.packages_config_project("App");

    fx.manager
        .install_package(
            project.as_ref(),
            &id("Docs", "1.0.0"),
            &lowest(),
            &fx.context,
            &fx.sources(),
            &OperationContext::new(),
        )
        .await
        .unwrap();

    let readmes = fx.context.readmes();
    assert_eq!(readmes.len(), 1);
    assert_eq!(std::fs::read_to_string(&readmes[0]).unwrap(), "Read me first");
}

#[tokio::test]
async fn test_cancelled_operation_changes_nothing() {
    let fx = Fixture::new();
    fx.feed.add("A", "1.0.0", &[]).unwrap();
    let project = fx.packages_config_project("App");
    let op = OperationContext::new();
    op.cancel();

    let result = fx
        .manager
        .install_package(project.as_ref(), &id("A", "1.0.0"), &lowest(), &fx.context, &fx.sources(), &op)
        .await;
    assert!(matches!(result, Err(Error::Cancelled)));
    assert!(installed(&project).await.is_empty());
}

#[tokio::test]
async fn test_update_all_bumps_user_installed_packages() {
    let fx = Fixture::new();
    fx.feed.add("A", "1.0.0", &[]).unwrap();
    fx.feed.add("A", "2.0.0", &[]).unwrap();
    let project = fx.packages_config_project("App");
    let op = OperationContext::new();

    fx.manager
        .install_package(project.as_ref(), &id("A", "1.0.0"), &lowest(), &fx.context, &fx.sources(), &op)
        .await
        .unwrap();

    let plan = fx
        .manager
        .preview_update_packages(project.as_ref(), &UpdateRequest::All, &lowest(), &fx.context, &fx.sources(), &op)
        .await
        .unwrap();
    assert_eq!(
        describe(plan.actions()),
        vec!["Uninstall A 1.0.0", "Install A 2.0.0 from feed"]
    );
}

fn sorted(mut actions: Vec<String>) -> Vec<String> {
    actions.sort();
    actions
}

#[tokio::test]
async fn test_reinstall_covers_dependency_closure() {
    let fx = Fixture::new();
    fx.feed.add("A", "1.0.0", &[("B", "1.0.0")]).unwrap();
    fx.feed.add("A", "2.0.0", &[("B", "1.0.0")]).unwrap();
    fx.feed.add("B", "1.0.0", &[]).unwrap();
    let project = fx.packages_config_project("App");
    let op = OperationContext::new();

    fx.manager
        .install_package(project.as_ref(), &id("A", "1.0.0"), &lowest(), &fx.context, &fx.sources(), &op)
        .await
        .unwrap();

    let reinstall = lowest().with_constraints(VersionConstraints::exact());
    let plan = fx
        .manager
        .preview_update_packages(
            project.as_ref(),
            &UpdateRequest::Id("A".to_string()),
            &reinstall,
            &fx.context,
            &fx.sources(),
            &op,
        )
        .await
        .unwrap();
    let actions = describe(plan.actions());
    assert!(actions[..2].iter().all(|a| a.starts_with("Uninstall")));
    assert_eq!(
        sorted(actions),
        vec![
            "Install A 1.0.0 from feed",
            "Install B 1.0.0 from feed",
            "Uninstall A 1.0.0",
            "Uninstall B 1.0.0",
        ]
    );

    fx.manager
        .execute_project_actions(project.as_ref(), &plan, &fx.context, &op)
        .await
        .unwrap();
    assert_eq!(installed(&project).await, vec!["A 1.0.0", "B 1.0.0"]);
    assert!(fx.manager.packages_folder().package_exists(&id("A", "1.0.0")));
}

#[tokio::test]
async fn test_reinstall_all_keeps_versions() {
    let fx = Fixture::new();
    fx.feed.add("A", "1.0.0", &[]).unwrap();
    fx.feed.add("A", "2.0.0", &[]).unwrap();
    fx.feed.add("C", "1.0.0", &[]).unwrap();
    let project = fx.packages_config_project("App");
    let op = OperationContext::new();

    for package in [id("A", "1.0.0"), id("C", "1.0.0")] {
        fx.manager
            .install_package(project.as_ref(), &package, &lowest(), &fx.context, &fx.sources(), &op)
            .await
            .unwrap();
    }

    let reinstall = lowest().with_constraints(VersionConstraints::exact());
    let plan = fx
        .manager
        .preview_update_packages(project.as_ref(), &UpdateRequest::All, &reinstall, &fx.context, &fx.sources(), &op)
        .await
        .unwrap();
    assert_eq!(
        sorted(describe(plan.actions())),
        vec![
            "Install A 1.0.0 from feed",
            "Install C 1.0.0 from feed",
            "Uninstall A 1.0.0",
            "Uninstall C 1.0.0",
        ]
    );
}

#[tokio::test]
async fn test_failed_update_keeps_old_version() {
    let fx = Fixture::new();
    fx.feed.add("A", "1.0.0", &[]).unwrap();
    fx.feed.add("A", "2.0.0", &[]).unwrap();
    fx.feed.fail_download(id("A", "2.0.0"));
    let project = fx.packages_config_project("App");
    let op = OperationContext::new();

    fx.manager
        .install_package(project.as_ref(), &id("A", "1.0.0"), &lowest(), &fx.context, &fx.sources(), &op)
        .await
        .unwrap();

    let result = fx
        .manager
        .update_packages(
            project.as_ref(),
            &UpdateRequest::Id("A".to_string()),
            &lowest(),
            &fx.context,
            &fx.sources(),
            &op,
        )
        .await;
    assert!(result.is_err());
    assert_eq!(installed(&project).await, vec!["A 1.0.0"]);
    assert!(fx.manager.packages_folder().package_exists(&id("A", "1.0.0")));
    assert!(!fx.manager.packages_folder().package_exists(&id("A", "2.0.0")));
}

#[tokio::test]
async fn test_incompatible_dependency_aborts_install() {
    let fx = Fixture::new();
    fx.feed.add("A", "1.0.0", &[("B", "1.0.0")]).unwrap();
    let mut b = PackageManifest::new(id("B", "1.0.0"));
    b.min_client_version = Some(NuGetVersion::parse("99.0.0").unwrap());
    fx.feed.add_package(b);
    let project = fx.packages_config_project("App");

    let err = fx
        .manager
        .install_package(project.as_ref(), &id("A", "1.0.0"), &lowest(), &fx.context, &fx.sources(), &OperationContext::new())
        .await
        .unwrap_err();

    match err {
        Error::IncompatiblePackage { package, reason } => {
            assert_eq!(package, "B 1.0.0");
            assert!(reason.contains("99.0.0"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(installed(&project).await.is_empty());
}

#[tokio::test]
async fn test_cleanup_keeps_marked_package_still_referenced() {
    let fx = Fixture::new();
    fx.feed.add("A", "1.0.0", &[]).unwrap();
    fx.feed.add("B", "1.0.0", &[]).unwrap();
    let project = fx.packages_config_project("App");
    let op = OperationContext::new();

    fx.manager
        .install_package(project.as_ref(), &id("A", "1.0.0"), &lowest(), &fx.context, &fx.sources(), &op)
        .await
        .unwrap();
    let folder = fx.manager.packages_folder();
    folder.mark_for_deletion(&id("A", "1.0.0")).unwrap();
    folder.mark_for_deletion(&id("B", "1.0.0")).unwrap();

    assert_eq!(fx.manager.cleanup_marked_packages().await.unwrap(), 1);
    assert!(folder.package_exists(&id("A", "1.0.0")));
    assert!(!folder.is_marked_for_deletion(&id("A", "1.0.0")));
    assert_eq!(installed(&project).await, vec!["A 1.0.0"]);
}
