//! High-level pipeline: plan → package → upload for one service.
//!
//! # Responsibilities
//! - Resolve which artifacts the service needs ([`plan_service`])
//! - Build every planned artifact that is not pre-built ([`package_service`])
//! - Upload descriptors and artifacts in order ([`upload_service`])
//!
//! Packaging completes before any network activity starts, so a packaging
//! error never leaves a half-uploaded deployment. An upload error leaves the
//! built artifacts in the staging directory; [`upload_service`] can be called
//! again without rebuilding.

use std::path::PathBuf;

use tracing::{debug, error, info, Instrument};
use uuid::Uuid;

use crate::config::ServiceConfig;
use crate::error::{DeployError, PackageError, PlanError, UploadError};
use crate::naming::ArtifactNaming;
use crate::package::{package, PackagingRequest};
use crate::plan::{plan, ArtifactOwner, DeployableUnit, PlannedArtifact, UploadPlan};
use crate::prune::DependencyEnumerator;
use crate::rules::merge_unique;
use crate::store::ObjectStore;
use crate::upload::{upload_artifacts, UploadSummary};

/// Outcome of a full deploy.
#[derive(Debug)]
pub struct DeployReport {
    pub run_id: Uuid,
    pub plan: UploadPlan,
    pub packaged: Vec<PathBuf>,
    pub uploads: UploadSummary,
}

pub fn plan_service(
    config: &ServiceConfig,
    naming: &dyn ArtifactNaming,
) -> Result<UploadPlan, PlanError> {
    plan(&config.packaging(), naming)
}

fn unit_named<'a>(units: &'a [DeployableUnit], name: &str) -> Option<&'a DeployableUnit> {
    units.iter().find(|unit| unit.name == name)
}

/// Packaging request for a planned artifact.
///
/// Unit artifacts use the service rules followed by the unit's own rules.
pub fn request_for(config: &ServiceConfig, artifact: &PlannedArtifact) -> PackagingRequest {
    let staging_dir = artifact
        .path
        .parent()
        .map(PathBuf::from)
        .unwrap_or_else(|| config.staging_dir());
    let mut exclude = config.service_excludes();
    let mut include = config.package.include.clone();

    if let ArtifactOwner::Unit(name) = &artifact.owner {
        if let Some(unit) = unit_named(&config.units(), name) {
            exclude = merge_unique(&exclude, &unit.exclude);
            include = merge_unique(&include, &unit.include);
        }
    }

    PackagingRequest {
        project_root: config.project_root.clone(),
        staging_dir,
        exclude,
        include,
        artifact_name: artifact.file_name(),
    }
}

/// Build every artifact of `plan` that is not pre-built.
pub fn package_service(
    config: &ServiceConfig,
    plan: &UploadPlan,
    enumerator: &dyn DependencyEnumerator,
) -> Result<Vec<PathBuf>, PackageError> {
    let mut packaged = Vec::new();
    for artifact in plan.to_build() {
        info!(owner = artifact.owner.id(), artifact = %artifact.path.display(), "Packaging artifact");
        let request = request_for(config, artifact);
        debug!(?request, "Packaging request");
        packaged.push(package(&request, enumerator)?);
    }
    Ok(packaged)
}

/// Upload descriptors and the artifacts of `plan` without rebuilding anything.
pub async fn upload_service<S>(
    config: &ServiceConfig,
    plan: &UploadPlan,
    naming: &dyn ArtifactNaming,
    store: &S,
) -> Result<UploadSummary, UploadError>
where
    S: ObjectStore + ?Sized,
{
    let target = config.upload_target();
    info!(
        bucket = %target.bucket,
        prefix = %target.artifact_directory,
        artifacts = plan.len(),
        "Uploading service artifacts"
    );
    let summary = upload_artifacts(store, &target, plan, naming).await?;
    match serde_json::to_string_pretty(&summary) {
        Ok(json) => debug!(json = %json, "Upload summary"),
        Err(e) => error!(error = ?e, "Failed to serialize upload summary"),
    }
    Ok(summary)
}

/// Plan, package and upload the service.
pub async fn deploy<S>(
    config: &ServiceConfig,
    naming: &dyn ArtifactNaming,
    enumerator: &dyn DependencyEnumerator,
    store: &S,
) -> Result<DeployReport, DeployError>
where
    S: ObjectStore + ?Sized,
{
    let run_id = Uuid::new_v4();
    let span = tracing::info_span!("deploy", %run_id, service = %config.service);

    async move {
        info!("Starting deploy");
        let plan = plan_service(config, naming).map_err(|e| {
            error!(error = %e, "Planning failed, nothing packaged");
            e
        })?;

        let packaged = package_service(config, &plan, enumerator).map_err(|e| {
            error!(error = %e, "Packaging failed, nothing uploaded");
            e
        })?;

        let uploads = upload_service(config, &plan, naming, store)
            .await
            .map_err(|e| {
                error!(error = %e, "Upload failed; artifacts remain staged for retry");
                e
            })?;

        info!(
            packaged = packaged.len(),
            uploaded = uploads.units.uploaded()
                + uploads.service.as_ref().map_or(0, |r| r.uploaded()),
            "Deploy complete"
        );
        Ok(DeployReport {
            run_id,
            plan,
            packaged,
            uploads,
        })
    }
    .instrument(span)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::naming::ServiceNaming;
    use crate::plan::SERVICE_ARTIFACT_OWNER;

    fn config() -> ServiceConfig {
        serde_json::from_value(serde_json::json!({
            "service": "orders",
            "bucket": "deployments",
            "project_root": "/srv/orders",
            "package": { "exclude": ["docs/**"], "include": ["docs/api.md"] },
            "functions": {
                "create": { "package": { "individually": true, "exclude": ["list/**"] } },
                "list": {}
            }
        }))
        .unwrap()
    }

    #[test]
    fn unit_request_layers_unit_rules_after_service_rules() {
        let config = config();
        let plan = plan_service(&config, &ServiceNaming::new("orders")).unwrap();
        let unit = &plan.unit_artifacts[0];

        let request = request_for(&config, unit);
        assert_eq!(request.artifact_name, "create.zip");
        assert_eq!(request.staging_dir, PathBuf::from("/srv/orders/.fnpack"));
        assert_eq!(request.exclude.last().map(String::as_str), Some("list/**"));
        assert!(request.exclude.contains(&"docs/**".to_string()));
        assert_eq!(request.include, vec!["docs/api.md"]);
    }

    #[test]
    fn service_request_uses_service_rules_only() {
        let config = config();
        let plan = plan_service(&config, &ServiceNaming::new("orders")).unwrap();
        let shared = plan.service_artifact.as_ref().unwrap();
        assert_eq!(shared.owner.id(), SERVICE_ARTIFACT_OWNER);

        let request = request_for(&config, shared);
        assert_eq!(request.artifact_name, "orders.zip");
        assert!(!request.exclude.contains(&"list/**".to_string()));
    }
}
