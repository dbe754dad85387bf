//! Write-then-rename helpers shared by the fetcher and archive extraction

use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

const COPY_BUFFER_SIZE: usize = 64 * 1024;

/// Sibling of `dest` that receives bytes until the write completes
pub(crate) fn part_path(dest: &Path) -> Result<PathBuf> {
    let file_name = dest
        .file_name()
        .ok_or_else(|| Error::InvalidArgument(format!("destination {} has no file name", dest.display())))?;
    let mut part: OsString = file_name.to_os_string();
    part.push(".part");
    Ok(dest.with_file_name(part))
}

/// Run `fill` against a fresh `*.part` file and rename it onto `dest` once
/// `fill` succeeds. On failure the partial file is removed and `dest` is
/// left untouched.
pub(crate) fn write_atomically<F>(dest: &Path, fill: F) -> Result<u64>
where
    F: FnOnce(&mut BufWriter<File>, &Path) -> Result<u64>,
{
    if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| Error::filesystem(parent, e))?;
    }

    let part = part_path(dest)?;
    let file = File::create(&part).map_err(|e| Error::filesystem(&part, e))?;
    let mut writer = BufWriter::new(file);

    let written = fill(&mut writer, &part).and_then(|bytes| {
        writer.flush().map_err(|e| Error::filesystem(&part, e))?;
        Ok(bytes)
    });
    drop(writer);

    match written {
        Ok(bytes) => {
            fs::rename(&part, dest).map_err(|e| Error::filesystem(dest, e))?;
            Ok(bytes)
        }
        Err(err) => {
            let _ = fs::remove_file(&part);
            Err(err)
        }
    }
}

/// Copy `reader` into `writer`, attributing read failures with `on_read`
/// and write failures to `part`
pub(crate) fn copy_stream<R, W>(
    reader: &mut R,
    writer: &mut W,
    part: &Path,
    on_read: impl Fn(io::Error) -> Error,
) -> Result<u64>
where
    R: Read + ?Sized,
    W: Write,
{
    let mut buffer = vec![0u8; COPY_BUFFER_SIZE];
    let mut total = 0u64;
    loop {
        let n = match reader.read(&mut buffer) {
            Ok(0) => return Ok(total),
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(on_read(e)),
        };
        writer
            .write_all(&buffer[..n])
            .map_err(|e| Error::filesystem(part, e))?;
        total += n as u64;
    }
}
