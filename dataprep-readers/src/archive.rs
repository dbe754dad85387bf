//! Idempotent extraction of zip archive members

use std::fs::File;
use std::path::{Path, PathBuf};

use tracing::{debug, info};
use zip::result::ZipError;
use zip::ZipArchive;

use crate::atomic::{copy_stream, write_atomically};
use crate::error::{Error, Result};

fn open_archive(archive: &Path) -> Result<ZipArchive<File>> {
    let file = File::open(archive).map_err(|e| Error::Format(format!("cannot open archive {}: {e}", archive.display())))?;
    ZipArchive::new(file).map_err(|e| archive_error(archive, &e))
}

fn archive_error(archive: &Path, err: &ZipError) -> Error {
    Error::Archive {
        path: archive.to_path_buf(),
        message: err.to_string(),
    }
}

/// Extract `member` of `archive` into `dest_dir` unless it is already there.
///
/// Returns the extracted path, `dest_dir` joined with the member name.
pub fn ensure_extracted(archive: &Path, member: &str, dest_dir: &Path) -> Result<PathBuf> {
    let member_path = Path::new(member);
    if member_path.is_absolute() || member_path.components().any(|c| c.as_os_str() == "..") {
        return Err(Error::InvalidArgument(format!("member name '{member}' escapes the destination")));
    }

    let dest = dest_dir.join(member_path);
    if dest.is_file() {
        debug!(archive = %archive.display(), member, "already extracted, skipping");
        return Ok(dest);
    }

    let mut zip = open_archive(archive)?;
    let mut entry = zip.by_name(member).map_err(|e| match e {
        ZipError::FileNotFound => Error::Format(format!("{} has no member '{member}'", archive.display())),
        other => archive_error(archive, &other),
    })?;

    let bytes = write_atomically(&dest, |writer, part| {
        copy_stream(&mut entry, writer, part, |e| Error::Archive {
            path: archive.to_path_buf(),
            message: e.to_string(),
        })
    })?;
    info!(archive = %archive.display(), member, bytes, "member extracted");
    Ok(dest)
}

/// Extract every file of `archive` into `dest_dir`, skipping files that are
/// already present. Returns the paths in archive order.
pub fn extract_all(archive: &Path, dest_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut zip = open_archive(archive)?;
    let mut extracted = Vec::with_capacity(zip.len());

    for index in 0..zip.len() {
        let mut entry = zip.by_index(index).map_err(|e| archive_error(archive, &e))?;
        if entry.is_dir() {
            continue;
        }

        let relative = entry
            .enclosed_name()
            .map(Path::to_path_buf)
            .ok_or_else(|| Error::Format(format!("{} has an unsafe member name '{}'", archive.display(), entry.name())))?;
        let dest = dest_dir.join(relative);

        if !dest.is_file() {
            write_atomically(&dest, |writer, part| {
                copy_stream(&mut entry, writer, part, |e| Error::Archive {
                    path: archive.to_path_buf(),
                    message: e.to_string(),
                })
            })?;
        }
        extracted.push(dest);
    }

    info!(archive = %archive.display(), files = extracted.len(), "archive extracted");
    Ok(extracted)
}
