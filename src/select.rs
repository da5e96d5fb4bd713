//! File selection: walks a project tree and keeps the regular files a
//! [`RuleSet`] selects.
//!
//! Traversal is deterministic (directory entries sorted by name), follows
//! symbolic links and includes dotfiles. Directories are never returned.

use std::fs::{self, Metadata};
use std::path::{Path, PathBuf};

use tracing::{debug, error, info, warn};

use crate::error::PackageError;
use crate::rules::RuleSet;

/// A regular file chosen for the archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedFile {
    /// Archive entry name: path relative to the project root, `/`-separated.
    pub name: String,
    /// Location of the file on disk.
    pub source: PathBuf,
    /// POSIX permission bits.
    pub mode: u32,
    /// Size in bytes.
    pub size: u64,
}

/// Select every regular file under `project_root` that `rules` admits.
///
/// Fails with [`PackageError::EmptySelection`] when nothing is selected.
pub fn select(project_root: &Path, rules: &RuleSet) -> Result<Vec<SelectedFile>, PackageError> {
    let mut files = Vec::new();
    let mut ancestors = Vec::new();
    visit_dir(project_root, project_root, rules, &mut ancestors, &mut files)?;

    if files.is_empty() {
        error!(root = %project_root.display(), "No file matches include / exclude patterns");
        return Err(PackageError::EmptySelection {
            root: project_root.to_path_buf(),
        });
    }

    info!(
        root = %project_root.display(),
        files = files.len(),
        bytes = files.iter().map(|f| f.size).sum::<u64>(),
        "Selected files for packaging"
    );
    Ok(files)
}

fn walk_error(path: &Path) -> impl FnOnce(std::io::Error) -> PackageError + '_ {
    move |source| PackageError::Walk {
        path: path.to_path_buf(),
        source,
    }
}

fn visit_dir(
    dir: &Path,
    root: &Path,
    rules: &RuleSet,
    ancestors: &mut Vec<PathBuf>,
    out: &mut Vec<SelectedFile>,
) -> Result<(), PackageError> {
    let canonical = fs::canonicalize(dir).map_err(walk_error(dir))?;
    if ancestors.contains(&canonical) {
        warn!(path = %dir.display(), "Symbolic link loop, skipping directory");
        return Ok(());
    }
    ancestors.push(canonical);

    let mut entries = fs::read_dir(dir)
        .map_err(walk_error(dir))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(walk_error(dir))?;
    entries.sort_by_key(|entry| entry.file_name());

    for entry in entries {
        let path = entry.path();
        let metadata = match fs::metadata(&path) {
            Ok(metadata) => metadata,
            Err(e) if is_symlink(&entry) => {
                warn!(path = %path.display(), error = %e, "Dangling symbolic link, skipping");
                continue;
            }
            Err(e) => return Err(walk_error(&path)(e)),
        };

        if metadata.is_dir() {
            visit_dir(&path, root, rules, ancestors, out)?;
        } else if metadata.is_file() {
            let name = entry_name(root, &path);
            if rules.is_selected(&name) {
                debug!(entry = %name, size = metadata.len(), "Selected file");
                out.push(SelectedFile {
                    name,
                    source: path,
                    mode: file_mode(&metadata),
                    size: metadata.len(),
                });
            }
        }
    }

    ancestors.pop();
    Ok(())
}

fn is_symlink(entry: &fs::DirEntry) -> bool {
    entry
        .file_type()
        .map(|file_type| file_type.is_symlink())
        .unwrap_or(false)
}

/// Forward-slash path of `path` relative to `root`.
fn entry_name(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|component| component.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(unix)]
fn file_mode(metadata: &Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o7777
}

#[cfg(not(unix))]
fn file_mode(metadata: &Metadata) -> u32 {
    if metadata.permissions().readonly() {
        0o444
    } else {
        0o644
    }
}
