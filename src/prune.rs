//! # prune: production-only dependency pruning
//!
//! When the project carries a dependency manifest, the whole shared
//! dependency directory is excluded and only the production dependencies are
//! re-admitted through trailing include globs.
//!
//! Pruning is best-effort: any enumeration failure degrades to "no pruning"
//! and is logged, never returned. An over-inclusive archive is preferred to a
//! failed build.

use std::io;
use std::path::Path;
use std::process::Command;

#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;
use regex::Regex;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Dependency directory shared by every npm package in a project.
pub const NODE_MODULES: &str = "node_modules";

/// Why dependencies could not be enumerated. Only ever logged.
#[derive(Debug, Error)]
#[error("dependency enumeration unavailable: {reason}")]
pub struct EnumerationUnavailable {
    pub reason: String,
}

impl EnumerationUnavailable {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Production dependencies of a project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependencies {
    /// Directory (relative to the project root) holding all dependencies.
    pub shared_dir: String,
    /// Dependency roots relative to the project root, forward-slash separated.
    pub paths: Vec<String>,
}

/// Lists the production dependencies of a project.
///
/// Implementations never need a particular tool to be installed: a missing
/// tool is reported as [`EnumerationUnavailable`].
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
pub trait DependencyEnumerator: Send + Sync {
    /// Whether the project root carries the manifest this enumerator understands.
    fn manifest_present(&self, project_root: &Path) -> bool;

    /// Enumerate production dependency roots.
    fn enumerate(&self, project_root: &Path) -> Result<Dependencies, EnumerationUnavailable>;
}

/// Extra rules produced by pruning.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Pruning {
    pub additional_excludes: Vec<String>,
    pub additional_includes: Vec<String>,
}

impl Pruning {
    pub fn is_empty(&self) -> bool {
        self.additional_excludes.is_empty() && self.additional_includes.is_empty()
    }
}

/// Compute the pruning rules for `project_root`.
pub fn prune(project_root: &Path, enumerator: &dyn DependencyEnumerator) -> Pruning {
    if !enumerator.manifest_present(project_root) {
        debug!(root = %project_root.display(), "No dependency manifest, pruning skipped");
        return Pruning::default();
    }

    match enumerator.enumerate(project_root) {
        Ok(dependencies) => {
            info!(
                root = %project_root.display(),
                dependencies = dependencies.paths.len(),
                "Pruning dependencies to production set"
            );
            Pruning {
                additional_excludes: vec![format!("{}/**", dependencies.shared_dir)],
                additional_includes: dependencies
                    .paths
                    .iter()
                    .map(|path| format!("{path}/**"))
                    .collect(),
            }
        }
        Err(e) => {
            warn!(root = %project_root.display(), error = %e, "Dependency pruning skipped");
            Pruning::default()
        }
    }
}

/// Captured result of an external command.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub success: bool,
    pub stdout: String,
}

/// Abstraction for running external commands.
pub trait CommandRunner: Send + Sync {
    fn run(&self, program: &str, args: &[&str], cwd: &Path) -> io::Result<CommandOutput>;
}

/// Runs commands on the host system.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemCommandRunner;

impl CommandRunner for SystemCommandRunner {
    fn run(&self, program: &str, args: &[&str], cwd: &Path) -> io::Result<CommandOutput> {
        let output = Command::new(program).args(args).current_dir(cwd).output()?;
        Ok(CommandOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        })
    }
}

/// Enumerates npm production dependencies with `npm ls`.
#[derive(Debug, Clone)]
pub struct NpmEnumerator<R = SystemCommandRunner> {
    runner: R,
    dependency_path: Regex,
}

impl NpmEnumerator<SystemCommandRunner> {
    pub fn new() -> Self {
        Self::with_runner(SystemCommandRunner)
    }
}

impl Default for NpmEnumerator<SystemCommandRunner> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: CommandRunner> NpmEnumerator<R> {
    pub fn with_runner(runner: R) -> Self {
        Self {
            runner,
            dependency_path: Regex::new(r"(node_modules/.*)").expect("static regex is valid"),
        }
    }

    /// Extract dependency roots from parseable `npm ls` output.
    pub fn parse(&self, stdout: &str) -> Vec<String> {
        stdout
            .lines()
            .map(|line| line.trim().replace('\\', "/"))
            .filter_map(|line| {
                self.dependency_path
                    .captures(&line)
                    .map(|caps| caps[1].trim_end_matches('/').to_string())
            })
            .collect()
    }
}

impl<R: CommandRunner> DependencyEnumerator for NpmEnumerator<R> {
    fn manifest_present(&self, project_root: &Path) -> bool {
        project_root.join("package.json").is_file()
    }

    fn enumerate(&self, project_root: &Path) -> Result<Dependencies, EnumerationUnavailable> {
        let output = self
            .runner
            .run(
                "npm",
                &["ls", "--prod=true", "--parseable=true", "--silent"],
                project_root,
            )
            .map_err(|e| EnumerationUnavailable::new(format!("failed to launch npm: {e}")))?;

        if !output.success {
            return Err(EnumerationUnavailable::new("npm ls exited with non-zero code"));
        }

        let paths = self.parse(&output.stdout);
        if paths.is_empty() {
            return Err(EnumerationUnavailable::new(
                "npm ls output contained no dependency paths",
            ));
        }
        Ok(Dependencies {
            shared_dir: NODE_MODULES.to_string(),
            paths,
        })
    }
}
