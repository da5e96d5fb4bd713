use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::package::staging_exclude;
use crate::plan::{DeployableUnit, ServicePackaging};
use crate::rules::merge_unique;
use crate::upload::{UploadTarget, DEFAULT_CONCURRENCY};

/// Staging directory name used when none is configured.
pub const DEFAULT_STAGING_DIR: &str = ".fnpack";

/// Excludes prepended to the service rules unless disabled.
pub const DEFAULT_EXCLUDES: &[&str] = &[
    ".git/**",
    ".gitignore",
    ".DS_Store",
    "npm-debug.log",
    "fnpack.yml",
    ".fnpack/**",
];

/// A service: its units, packaging rules and upload destination.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub service: String,
    #[serde(default = "default_project_root")]
    pub project_root: PathBuf,
    /// Relative paths are resolved against `project_root`.
    #[serde(default = "default_staging_dir")]
    pub staging_dir: PathBuf,
    pub bucket: String,
    /// Remote key prefix; defaults to `fnpack/<service>`.
    #[serde(default)]
    pub artifact_directory: Option<String>,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Regular expression selecting descriptor files in the staging directory.
    #[serde(default)]
    pub descriptor_pattern: Option<String>,
    #[serde(default)]
    pub package: PackageConfig,
    #[serde(default)]
    pub functions: BTreeMap<String, FunctionConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageConfig {
    #[serde(default)]
    pub individually: bool,
    #[serde(default)]
    pub artifact: Option<PathBuf>,
    #[serde(default)]
    pub exclude: Vec<String>,
    #[serde(default)]
    pub include: Vec<String>,
    #[serde(default = "default_true")]
    pub exclude_defaults: bool,
}

impl Default for PackageConfig {
    fn default() -> Self {
        Self {
            individually: false,
            artifact: None,
            exclude: Vec::new(),
            include: Vec::new(),
            exclude_defaults: true,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FunctionConfig {
    #[serde(default)]
    pub package: FunctionPackageConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FunctionPackageConfig {
    #[serde(default)]
    pub individually: Option<bool>,
    #[serde(default)]
    pub artifact: Option<PathBuf>,
    #[serde(default)]
    pub exclude: Vec<String>,
    #[serde(default)]
    pub include: Vec<String>,
}

fn default_project_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_staging_dir() -> PathBuf {
    PathBuf::from(DEFAULT_STAGING_DIR)
}

fn default_concurrency() -> usize {
    DEFAULT_CONCURRENCY
}

fn default_true() -> bool {
    true
}

impl ServiceConfig {
    pub fn trace_loaded(&self) {
        info!(
            service = %self.service,
            project_root = %self.project_root.display(),
            functions = self.functions.len(),
            individually = self.package.individually,
            "Loaded ServiceConfig"
        );
        debug!(?self, "ServiceConfig loaded (full debug)");
    }

    /// Resolve relative paths against `base` (usually the config file's directory).
    pub fn resolve_paths(&mut self, base: &Path) {
        if self.project_root.is_relative() {
            self.project_root = base.join(&self.project_root);
        }
        let root = self.project_root.clone();
        let resolve = |path: &mut PathBuf| {
            if path.is_relative() {
                *path = root.join(&*path);
            }
        };
        if let Some(artifact) = self.package.artifact.as_mut() {
            resolve(artifact);
        }
        for function in self.functions.values_mut() {
            if let Some(artifact) = function.package.artifact.as_mut() {
                resolve(artifact);
            }
        }
    }

    pub fn staging_dir(&self) -> PathBuf {
        if self.staging_dir.is_absolute() {
            self.staging_dir.clone()
        } else {
            self.project_root.join(&self.staging_dir)
        }
    }

    pub fn artifact_directory(&self) -> String {
        self.artifact_directory
            .clone()
            .unwrap_or_else(|| format!("fnpack/{}", self.service))
    }

    /// Service-level exclude rules: defaults, staging directory, configured.
    pub fn service_excludes(&self) -> Vec<String> {
        let mut excludes: Vec<String> = Vec::new();
        if self.package.exclude_defaults {
            excludes.extend(DEFAULT_EXCLUDES.iter().map(|s| s.to_string()));
        }
        if let Some(staging) = staging_exclude(&self.project_root, &self.staging_dir()) {
            excludes = merge_unique(&excludes, &[staging]);
        }
        merge_unique(&excludes, &self.package.exclude)
    }

    pub fn units(&self) -> Vec<DeployableUnit> {
        self.functions
            .iter()
            .map(|(name, function)| DeployableUnit {
                name: name.clone(),
                artifact: function.package.artifact.clone(),
                individually: function.package.individually,
                exclude: function.package.exclude.clone(),
                include: function.package.include.clone(),
            })
            .collect()
    }

    pub fn packaging(&self) -> ServicePackaging {
        ServicePackaging {
            units: self.units(),
            artifact: self.package.artifact.clone(),
            individually: self.package.individually,
            staging_dir: self.staging_dir(),
        }
    }

    pub fn upload_target(&self) -> UploadTarget {
        UploadTarget {
            bucket: self.bucket.clone(),
            artifact_directory: self.artifact_directory(),
            staging_dir: self.staging_dir(),
            concurrency: self.concurrency,
        }
    }
}
