use std::fs::{self, File};
use std::path::Path;

use fnpack::config::ServiceConfig;
use fnpack::deploy::{deploy, plan_service, upload_service};
use fnpack::naming::ServiceNaming;
use fnpack::prune::MockDependencyEnumerator;
use fnpack::store::{LocalDirStore, MockObjectStore};
use fnpack::upload::TaskOutcome;
use fnpack::{DeployError, PlanError, UploadError};
use tempfile::tempdir;
use zip::ZipArchive;

fn no_manifest() -> MockDependencyEnumerator {
    let mut enumerator = MockDependencyEnumerator::new();
    enumerator.expect_manifest_present().return_const(false);
    enumerator
}

fn write_project(root: &Path) {
    fs::create_dir_all(root.join("create")).unwrap();
    fs::create_dir_all(root.join("shared")).unwrap();
    fs::write(root.join("create/handler.js"), "exports.create = () => 1;").unwrap();
    fs::write(root.join("shared/util.js"), "exports.util = () => 2;").unwrap();
    fs::write(root.join("list.js"), "exports.list = () => 3;").unwrap();

    let staging = root.join(".fnpack");
    fs::create_dir_all(&staging).unwrap();
    fs::write(staging.join("stack-template.json"), r#"{"Resources":{}}"#).unwrap();
}

fn config(root: &Path) -> ServiceConfig {
    serde_json::from_value(serde_json::json!({
        "service": "orders",
        "bucket": "deployments",
        "project_root": root,
        "artifact_directory": "orders/dev",
        "concurrency": 2,
        "functions": {
            "create": { "package": { "individually": true, "exclude": ["list.js"] } },
            "list": {},
            "refund": {}
        }
    }))
    .unwrap()
}

fn entries(path: &Path) -> Vec<String> {
    let archive = ZipArchive::new(File::open(path).unwrap()).unwrap();
    let mut names: Vec<String> = archive.file_names().map(str::to_string).collect();
    names.sort();
    names
}

#[tokio::test]
async fn deploy_packages_and_uploads_every_planned_artifact() {
    let project = tempdir().unwrap();
    let remote = tempdir().unwrap();
    write_project(project.path());
    let config = config(project.path());
    let store = LocalDirStore::new(remote.path());

    let report = deploy(
        &config,
        &ServiceNaming::new("orders"),
        &no_manifest(),
        &store,
    )
    .await
    .expect("deploy should succeed");

    assert_eq!(report.plan.unit_artifacts.len(), 1);
    assert!(report.plan.service_artifact.is_some());
    assert_eq!(report.packaged.len(), 2);
    assert_eq!(report.uploads.descriptors.uploaded(), 1);
    assert_eq!(report.uploads.units.uploaded(), 1);
    assert_eq!(report.uploads.service.as_ref().map(|r| r.uploaded()), Some(1));

    let prefix = remote.path().join("deployments/orders/dev");
    assert!(prefix.join("stack-template.json").is_file());
    assert_eq!(
        entries(&prefix.join("create.zip")),
        vec!["create/handler.js", "shared/util.js"]
    );
    assert_eq!(
        entries(&prefix.join("orders.zip")),
        vec!["create/handler.js", "list.js", "shared/util.js"]
    );
}

#[tokio::test]
async fn failed_upload_can_be_retried_without_repackaging() {
    let project = tempdir().unwrap();
    let remote = tempdir().unwrap();
    write_project(project.path());
    let config = config(project.path());
    let naming = ServiceNaming::new("orders");

    let mut flaky = MockObjectStore::new();
    flaky.expect_put().returning(|request| {
        if request.key.ends_with("create.zip") {
            Err("connection reset".into())
        } else {
            Ok(())
        }
    });

    let err = deploy(&config, &naming, &no_manifest(), &flaky)
        .await
        .unwrap_err();
    match &err {
        DeployError::Upload(UploadError::Batch { key, report, .. }) => {
            assert_eq!(key, "orders/dev/create.zip");
            assert!(matches!(
                report.outcome("orders/dev/create.zip"),
                Some(TaskOutcome::Failed { .. })
            ));
        }
        other => panic!("unexpected error: {other:?}"),
    }

    let staging = project.path().join(".fnpack");
    assert!(staging.join("create.zip").is_file());
    assert!(staging.join("orders.zip").is_file());

    let plan = plan_service(&config, &naming).unwrap();
    let store = LocalDirStore::new(remote.path());
    let summary = upload_service(&config, &plan, &naming, &store)
        .await
        .expect("retry should succeed");
    assert_eq!(summary.units.uploaded(), 1);
    assert!(remote
        .path()
        .join("deployments/orders/dev/orders.zip")
        .is_file());
}

#[tokio::test]
async fn packaging_failure_uploads_nothing() {
    let project = tempdir().unwrap();
    write_project(project.path());
    let mut config = config(project.path());
    config.package.exclude = vec!["**".into()];

    let mut store = MockObjectStore::new();
    store.expect_put().never();

    let err = deploy(
        &config,
        &ServiceNaming::new("orders"),
        &no_manifest(),
        &store,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, DeployError::Package(_)));
}

#[tokio::test]
async fn upload_without_packaging_reports_missing_artifact() {
    let project = tempdir().unwrap();
    write_project(project.path());
    let config = config(project.path());
    let naming = ServiceNaming::new("orders");

    let mut store = MockObjectStore::new();
    store.expect_put().never();

    let plan = plan_service(&config, &naming).unwrap();
    let err = upload_service(&config, &plan, &naming, &store)
        .await
        .unwrap_err();
    assert!(matches!(err, UploadError::MissingArtifact { .. }));
}

#[tokio::test]
async fn unit_named_after_service_fails_before_packaging() {
    let project = tempdir().unwrap();
    write_project(project.path());
    fs::write(project.path().join("orders.js"), "exports.orders = () => 4;").unwrap();
    let config: ServiceConfig = serde_json::from_value(serde_json::json!({
        "service": "orders",
        "bucket": "deployments",
        "project_root": project.path(),
        "functions": {
            "orders": { "package": { "individually": true, "exclude": ["list.js"] } },
            "list": {}
        }
    }))
    .unwrap();

    let mut store = MockObjectStore::new();
    store.expect_put().never();

    let err = deploy(
        &config,
        &ServiceNaming::new("orders"),
        &no_manifest(),
        &store,
    )
    .await
    .unwrap_err();
    match err {
        DeployError::Plan(PlanError::ArtifactCollision { file_name, .. }) => {
            assert_eq!(file_name, "orders.zip");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(!project.path().join(".fnpack/orders.zip").exists());
}
