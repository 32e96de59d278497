//! Photo archive codec.
//!
//! The photos directory is flat: one file per member photo. It travels between
//! sites as a zip archive holding every file of the directory. An archive
//! applied with [`replace_from_archive`] is the authoritative full set of
//! photos: local files missing from it are deleted. [`extract_archive`] only
//! adds or overwrites files.

use std::collections::BTreeSet;
use std::ffi::OsString;
use std::fs::File;
use std::io::{Cursor, Read, Write};
use std::path::{Path, PathBuf};

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::{Error, Result};

/// Largest decompressed size accepted for a single photo
pub const MAX_PHOTO_BYTES: u64 = 64 * 1024 * 1024;

/// What applying an archive did to the photos directory
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractReport {
    /// Files written from the archive
    pub written: usize,
    /// Local files removed because the archive did not contain them
    pub removed: usize,
}

/// Zip every regular file currently in `dir`.
///
/// A missing directory yields a valid, empty archive.
pub fn build_archive(dir: &Path) -> Result<Vec<u8>> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    let mut packed = 0;
    for (name, path) in list_photo_files(dir)? {
        let Some(name) = name.to_str() else {
            tracing::warn!(path = %path.display(), "Skipping photo with non UTF-8 name");
            continue;
        };
        writer.start_file(name, options)?;
        let mut file = File::open(&path)?;
        std::io::copy(&mut file, &mut writer)?;
        packed += 1;
    }

    let bytes = writer.finish()?.into_inner();
    tracing::debug!(files = packed, bytes = bytes.len(), "Built photo archive");
    Ok(bytes)
}

/// Apply `archive` as the complete photo set for `dir`.
///
/// Every entry is written first; only once the whole archive extracted
/// cleanly are local files absent from it deleted. Local names that are not
/// valid UTF-8 can never appear in an archive, so they are always deleted.
pub fn replace_from_archive(dir: &Path, archive: &[u8]) -> Result<ExtractReport> {
    let names = unpack(dir, archive)?;

    let mut removed = 0;
    for (name, path) in list_photo_files(dir)? {
        let named = name.to_str().is_some_and(|name| names.contains(name));
        if !named {
            std::fs::remove_file(&path)?;
            removed += 1;
        }
    }

    let report = ExtractReport {
        written: names.len(),
        removed,
    };
    tracing::info!(
        written = report.written,
        removed = report.removed,
        "Replaced photo directory from archive"
    );
    Ok(report)
}

/// Add or overwrite the archive's files in `dir`, keeping everything else
pub fn extract_archive(dir: &Path, archive: &[u8]) -> Result<ExtractReport> {
    let names = unpack(dir, archive)?;
    Ok(ExtractReport {
        written: names.len(),
        removed: 0,
    })
}

/// Check that `archive` is a readable zip of plain photo files within the
/// declared size limit, without touching the filesystem. Returns the file count.
pub fn validate_archive(archive: &[u8]) -> Result<usize> {
    let mut zip = ZipArchive::new(Cursor::new(archive))?;
    let mut files = 0;
    for index in 0..zip.len() {
        let entry = zip.by_index(index)?;
        if entry.is_dir() {
            continue;
        }
        let name = photo_name(entry.enclosed_name(), entry.name())?;
        if entry.size() > MAX_PHOTO_BYTES {
            return Err(Error::OversizedArchiveEntry(name, MAX_PHOTO_BYTES));
        }
        files += 1;
    }
    Ok(files)
}

fn unpack(dir: &Path, archive: &[u8]) -> Result<BTreeSet<String>> {
    let mut zip = ZipArchive::new(Cursor::new(archive))?;
    std::fs::create_dir_all(dir)?;

    let mut names = BTreeSet::new();
    for index in 0..zip.len() {
        let mut entry = zip.by_index(index)?;
        if entry.is_dir() {
            continue;
        }

        let name = photo_name(entry.enclosed_name(), entry.name())?;
        write_entry(dir, &name, &mut entry, MAX_PHOTO_BYTES)?;
        names.insert(name);
    }
    Ok(names)
}

/// Flatten an entry to its bare file name; entries escaping the directory are refused
fn photo_name(enclosed: Option<PathBuf>, raw: &str) -> Result<String> {
    enclosed
        .and_then(|relative| {
            relative
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
        })
        .ok_or_else(|| Error::UnsafeArchiveEntry(raw.to_string()))
}

/// Stream one entry through a temp file in `dir`, refusing more than `limit` bytes
fn write_entry(dir: &Path, name: &str, entry: impl Read, limit: u64) -> Result<()> {
    let mut temp = tempfile::NamedTempFile::new_in(dir)?;
    let copied = std::io::copy(&mut entry.take(limit + 1), &mut temp)?;
    if copied > limit {
        return Err(Error::OversizedArchiveEntry(name.to_string(), limit));
    }
    temp.flush()?;
    temp.as_file().sync_all()?;
    temp.persist(dir.join(name))
        .map_err(|error| Error::Io(error.error))?;
    Ok(())
}

fn list_photo_files(dir: &Path) -> Result<Vec<(OsString, PathBuf)>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        files.push((entry.file_name(), entry.path()));
    }
    files.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(files)
}
