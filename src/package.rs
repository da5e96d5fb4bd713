//! Packaging pipeline: prune → normalize → select → archive.

use std::path::{Path, PathBuf};

use tracing::info;

use crate::archive;
use crate::error::PackageError;
use crate::prune::{prune, DependencyEnumerator, Pruning};
use crate::rules::{merge_unique, RuleSet};
use crate::select::select;

/// Everything needed to build one artifact. Never mutated by the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackagingRequest {
    pub project_root: PathBuf,
    pub staging_dir: PathBuf,
    pub exclude: Vec<String>,
    pub include: Vec<String>,
    /// File name of the archive inside the staging directory.
    pub artifact_name: String,
}

impl PackagingRequest {
    /// A copy of this request with pruning rules unioned in.
    pub fn with_pruning(&self, pruning: &Pruning) -> Self {
        Self {
            exclude: merge_unique(&self.exclude, &pruning.additional_excludes),
            include: merge_unique(&self.include, &pruning.additional_includes),
            ..self.clone()
        }
    }

    pub fn artifact_path(&self) -> PathBuf {
        self.staging_dir.join(&self.artifact_name)
    }
}

/// Build the archive described by `request` and return its path.
pub fn package(
    request: &PackagingRequest,
    enumerator: &dyn DependencyEnumerator,
) -> Result<PathBuf, PackageError> {
    let pruning = prune(&request.project_root, enumerator);
    let request = request.with_pruning(&pruning);

    let rules = RuleSet::from_lists(&request.exclude, &request.include)?;
    let files = select(&request.project_root, &rules)?;
    let artifact = archive::build(&request.project_root, &files, &request.artifact_path())?;

    info!(
        artifact = %artifact.display(),
        files = files.len(),
        rules = rules.len(),
        "Packaged artifact"
    );
    Ok(artifact)
}

/// Exclude rule covering `staging_dir` when it lives inside `project_root`.
pub fn staging_exclude(project_root: &Path, staging_dir: &Path) -> Option<String> {
    let relative = staging_dir.strip_prefix(project_root).ok()?;
    let relative = relative
        .components()
        .map(|component| component.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/");
    (!relative.is_empty()).then(|| format!("{relative}/**"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prune::{Dependencies, MockDependencyEnumerator};
    use std::fs::{self, File};
    use tempfile::tempdir;
    use zip::ZipArchive;

    fn no_manifest() -> MockDependencyEnumerator {
        let mut enumerator = MockDependencyEnumerator::new();
        enumerator.expect_manifest_present().return_const(false);
        enumerator
    }

    fn entries(path: &Path) -> Vec<String> {
        let archive = ZipArchive::new(File::open(path).unwrap()).unwrap();
        let mut names: Vec<String> = archive.file_names().map(str::to_string).collect();
        names.sort();
        names
    }

    fn request(root: &Path, exclude: &[&str]) -> PackagingRequest {
        PackagingRequest {
            project_root: root.to_path_buf(),
            staging_dir: root.join(".fnpack"),
            exclude: exclude.iter().map(|s| s.to_string()).collect(),
            include: Vec::new(),
            artifact_name: "service.zip".into(),
        }
    }

    fn project() -> tempfile::TempDir {
        let tmp = tempdir().unwrap();
        let root = tmp.path();
        fs::create_dir_all(root.join("node_modules/express")).unwrap();
        fs::create_dir_all(root.join("node_modules/jest")).unwrap();
        fs::write(root.join("handler.js"), "module.exports = {};").unwrap();
        fs::write(root.join("package.json"), "{}").unwrap();
        fs::write(root.join("node_modules/express/index.js"), "//").unwrap();
        fs::write(root.join("node_modules/jest/index.js"), "//").unwrap();
        tmp
    }

    #[test]
    fn pruning_keeps_only_production_dependencies() {
        let tmp = project();
        let mut enumerator = MockDependencyEnumerator::new();
        enumerator.expect_manifest_present().return_const(true);
        enumerator.expect_enumerate().returning(|_| {
            Ok(Dependencies {
                shared_dir: "node_modules".into(),
                paths: vec!["node_modules/express".into()],
            })
        });

        let artifact = package(&request(tmp.path(), &[]), &enumerator).unwrap();
        assert_eq!(artifact, tmp.path().join(".fnpack/service.zip"));
        assert_eq!(
            entries(&artifact),
            vec!["handler.js", "node_modules/express/index.js", "package.json"]
        );
    }

    #[test]
    fn without_manifest_rules_apply_unchanged() {
        let tmp = project();
        let artifact = package(&request(tmp.path(), &["package.json"]), &no_manifest()).unwrap();
        assert_eq!(
            entries(&artifact),
            vec![
                "handler.js",
                "node_modules/express/index.js",
                "node_modules/jest/index.js"
            ]
        );
    }

    #[test]
    fn empty_selection_creates_no_archive() {
        let tmp = project();
        let req = request(tmp.path(), &["**"]);
        let err = package(&req, &no_manifest()).unwrap_err();
        assert!(matches!(err, PackageError::EmptySelection { .. }));
        assert!(!req.artifact_path().exists());
    }

    #[test]
    fn with_pruning_unions_rules_without_touching_original() {
        let tmp = tempdir().unwrap();
        let original = request(tmp.path(), &["node_modules/**", "*.md"]);
        let pruned = original.with_pruning(&Pruning {
            additional_excludes: vec!["node_modules/**".into()],
            additional_includes: vec!["node_modules/a/**".into()],
        });
        assert_eq!(pruned.exclude, vec!["node_modules/**", "*.md"]);
        assert_eq!(pruned.include, vec!["node_modules/a/**"]);
        assert!(original.include.is_empty());
    }

    #[test]
    fn staging_exclude_is_relative_to_project() {
        let root = Path::new("/project");
        assert_eq!(
            staging_exclude(root, &root.join(".fnpack")),
            Some(".fnpack/**".to_string())
        );
        assert_eq!(
            staging_exclude(root, &root.join("build").join("stage")),
            Some("build/stage/**".to_string())
        );
        assert_eq!(staging_exclude(root, Path::new("/elsewhere")), None);
        assert_eq!(staging_exclude(root, root), None);
    }
}
