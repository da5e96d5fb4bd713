//! Zip archive construction.
//!
//! Entries are written in selection order with a fixed timestamp, so
//! identical inputs give byte-identical archives. Each entry carries the
//! source file's POSIX permission bits. The archive is staged in a temporary
//! file next to the destination and only renamed into place once finished.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, error, info};
use zip::result::{ZipError, ZipResult};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipWriter};

use crate::error::PackageError;
use crate::select::SelectedFile;

/// MIME type of every artifact this module produces.
pub const ZIP_CONTENT_TYPE: &str = "application/zip";

const ZIP64_THRESHOLD: u64 = u32::MAX as u64;

/// Write `files` into a zip archive at `destination`.
///
/// Relative source paths are resolved against `project_root`. On failure no
/// file is left at `destination`.
pub fn build(
    project_root: &Path,
    files: &[SelectedFile],
    destination: &Path,
) -> Result<PathBuf, PackageError> {
    let archive_error = |source: ZipError| {
        error!(artifact = %destination.display(), error = %source, "Failed to write archive");
        PackageError::ArchiveWrite {
            path: destination.to_path_buf(),
            source,
        }
    };

    let parent = destination
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent).map_err(|e| archive_error(ZipError::Io(e)))?;

    let mut staged = NamedTempFile::new_in(parent).map_err(|e| archive_error(ZipError::Io(e)))?;
    write_entries(project_root, files, staged.as_file_mut()).map_err(archive_error)?;
    staged
        .as_file()
        .sync_all()
        .map_err(|e| archive_error(ZipError::Io(e)))?;
    staged
        .persist(destination)
        .map_err(|e| archive_error(ZipError::Io(e.error)))?;

    info!(
        artifact = %destination.display(),
        entries = files.len(),
        "Archive written"
    );
    Ok(destination.to_path_buf())
}

fn write_entries(project_root: &Path, files: &[SelectedFile], out: &mut File) -> ZipResult<()> {
    let mut writer = ZipWriter::new(out);

    for file in files {
        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .unix_permissions(file.mode)
            .last_modified_time(DateTime::default())
            .large_file(file.size >= ZIP64_THRESHOLD);
        writer.start_file(file.name.as_str(), options)?;

        let source = if file.source.is_absolute() {
            file.source.clone()
        } else {
            project_root.join(&file.source)
        };
        let mut reader = File::open(&source)?;
        io::copy(&mut reader, &mut writer)?;
        debug!(entry = %file.name, mode = format_args!("{:o}", file.mode), "Appended entry");
    }

    writer.finish()?;
    Ok(())
}
