//! # plan: which artifacts must exist remotely
//!
//! Every deployable unit resolves to exactly one artifact:
//!
//! 1. its own explicit artifact override (pre-built, uploaded as is);
//! 2. otherwise, when no service artifact is configured and either the
//!    service or the unit packages individually, a unit-specific archive;
//! 3. otherwise the shared service archive.
//!
//! The shared archive is planned once, after all units are resolved, and only
//! if at least one unit needs it. No artifact path is planned twice, and two
//! distinct artifacts never share a file name: the file name is both the
//! staging path and the remote key.

use std::path::PathBuf;

use serde::Serialize;
use tracing::{debug, error, info};

use crate::archive::ZIP_CONTENT_TYPE;
use crate::error::PlanError;
use crate::naming::ArtifactNaming;

/// Owner id of the shared service artifact.
pub const SERVICE_ARTIFACT_OWNER: &str = "__service__";

/// A deployable unit ("function") of the service.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeployableUnit {
    pub name: String,
    /// Pre-built artifact to ship instead of packaging.
    pub artifact: Option<PathBuf>,
    /// Per-unit override of the service `individually` default.
    pub individually: Option<bool>,
    /// Extra exclude rules applied when the unit is packaged on its own.
    pub exclude: Vec<String>,
    /// Extra include rules applied when the unit is packaged on its own.
    pub include: Vec<String>,
}

impl DeployableUnit {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// Packaging description of a whole service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServicePackaging {
    pub units: Vec<DeployableUnit>,
    /// Service-wide pre-built artifact.
    pub artifact: Option<PathBuf>,
    /// Service-wide `individually` default.
    pub individually: bool,
    /// Where built artifacts are staged.
    pub staging_dir: PathBuf,
}

/// Whose artifact this is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ArtifactOwner {
    Unit(String),
    Service,
}

impl ArtifactOwner {
    pub fn id(&self) -> &str {
        match self {
            ArtifactOwner::Unit(name) => name,
            ArtifactOwner::Service => SERVICE_ARTIFACT_OWNER,
        }
    }
}

/// An artifact that must be present remotely.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedArtifact {
    pub owner: ArtifactOwner,
    pub path: PathBuf,
    pub content_type: &'static str,
    /// Supplied by configuration; never packaged by this run.
    pub prebuilt: bool,
}

impl PlannedArtifact {
    fn new(owner: ArtifactOwner, path: PathBuf, prebuilt: bool) -> Self {
        Self {
            owner,
            path,
            content_type: ZIP_CONTENT_TYPE,
            prebuilt,
        }
    }

    /// Last path component, used as the remote object name.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Artifacts to upload: unit artifacts first, then the shared one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UploadPlan {
    pub unit_artifacts: Vec<PlannedArtifact>,
    pub service_artifact: Option<PlannedArtifact>,
}

impl UploadPlan {
    /// Artifacts this run has to build, in upload order.
    pub fn to_build(&self) -> impl Iterator<Item = &PlannedArtifact> {
        self.unit_artifacts
            .iter()
            .chain(self.service_artifact.iter())
            .filter(|artifact| !artifact.prebuilt)
    }

    pub fn len(&self) -> usize {
        self.unit_artifacts.len() + usize::from(self.service_artifact.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Whether two planned artifacts are the same pre-built file.
fn same_prebuilt(a: &PlannedArtifact, b: &PlannedArtifact) -> bool {
    a.prebuilt && b.prebuilt && a.path == b.path
}

/// Check `candidate` against `planned`.
///
/// Returns `Ok(true)` when it is the same pre-built file as an artifact
/// already planned, and an error when it only shares the file name, since the
/// file name is both the staging path and the remote key.
fn already_planned(
    planned: &[PlannedArtifact],
    candidate: &PlannedArtifact,
) -> Result<bool, PlanError> {
    let file_name = candidate.file_name();
    for existing in planned {
        if same_prebuilt(existing, candidate) {
            return Ok(true);
        }
        if existing.path == candidate.path || existing.file_name() == file_name {
            error!(
                file_name = %file_name,
                first = existing.owner.id(),
                second = candidate.owner.id(),
                "Artifact name collision"
            );
            return Err(PlanError::ArtifactCollision {
                file_name,
                first_owner: existing.owner.id().to_string(),
                first: existing.path.clone(),
                second_owner: candidate.owner.id().to_string(),
                second: candidate.path.clone(),
            });
        }
    }
    Ok(false)
}

/// Decide the artifact of every unit.
///
/// Fails with [`PlanError::ArtifactCollision`] when two distinct artifacts,
/// including the shared one, would end up under the same file name.
pub fn plan(
    service: &ServicePackaging,
    naming: &dyn ArtifactNaming,
) -> Result<UploadPlan, PlanError> {
    let mut unit_artifacts: Vec<PlannedArtifact> = Vec::new();
    let mut needs_service_artifact = false;

    for unit in &service.units {
        let planned = if let Some(path) = &unit.artifact {
            debug!(unit = %unit.name, artifact = %path.display(), "Unit ships a pre-built artifact");
            PlannedArtifact::new(ArtifactOwner::Unit(unit.name.clone()), path.clone(), true)
        } else if service.artifact.is_none()
            && (service.individually || unit.individually.unwrap_or(false))
        {
            let path = service
                .staging_dir
                .join(naming.unit_artifact_name(&unit.name));
            debug!(unit = %unit.name, artifact = %path.display(), "Unit is packaged individually");
            PlannedArtifact::new(ArtifactOwner::Unit(unit.name.clone()), path, false)
        } else {
            debug!(unit = %unit.name, "Unit uses the service artifact");
            needs_service_artifact = true;
            continue;
        };

        if already_planned(&unit_artifacts, &planned)? {
            debug!(unit = %unit.name, artifact = %planned.path.display(), "Artifact already planned");
            continue;
        }
        unit_artifacts.push(planned);
    }

    let mut service_artifact = None;
    if needs_service_artifact {
        let shared = match &service.artifact {
            Some(path) => PlannedArtifact::new(ArtifactOwner::Service, path.clone(), true),
            None => PlannedArtifact::new(
                ArtifactOwner::Service,
                service.staging_dir.join(naming.service_artifact_name()),
                false,
            ),
        };
        if already_planned(&unit_artifacts, &shared)? {
            debug!(artifact = %shared.path.display(), "Service artifact already planned by a unit");
        } else {
            service_artifact = Some(shared);
        }
    }

    info!(
        units = service.units.len(),
        unit_artifacts = unit_artifacts.len(),
        service_artifact = service_artifact.is_some(),
        "Upload plan resolved"
    );
    Ok(UploadPlan {
        unit_artifacts,
        service_artifact,
    })
}
