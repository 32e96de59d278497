//! Building and applying master packages

use crate::db::{probe_store_bytes, MasterStore};
use crate::error::{Error, Result};
use crate::merge::{merge_master_snapshot, MergeResult};
use crate::photos::{self, ExtractReport};
use crate::protocol::MasterPackage;
use crate::site::SitePaths;
use crate::util::write_atomic;

/// What applying a package changed locally
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppliedPackage {
    /// Present when the package was merged rather than written verbatim
    pub merge: Option<MergeResult>,
    /// Present when the package carried a photo archive
    pub photos: Option<ExtractReport>,
}

impl AppliedPackage {
    pub fn summary(&self) -> String {
        let mut parts = Vec::new();
        match &self.merge {
            Some(merge) => parts.push(merge.summary()),
            None => parts.push("master store replaced".to_string()),
        }
        if let Some(photos) = &self.photos {
            parts.push(format!(
                "photos written {}, removed {}",
                photos.written, photos.removed
            ));
        }
        parts.join("; ")
    }
}

/// Package the local master file, plus a fresh photo archive when requested.
///
/// Fails with [`Error::NotFound`] when the master file does not exist.
pub fn build_master_package(
    paths: &SitePaths,
    site_code: &str,
    include_photos: bool,
) -> Result<MasterPackage> {
    if !paths.master.is_file() {
        return Err(Error::NotFound(paths.master.display().to_string()));
    }
    let master_database = std::fs::read(&paths.master)?;
    let photos_archive = if include_photos {
        Some(photos::build_archive(&paths.photos_dir)?)
    } else {
        None
    };

    Ok(MasterPackage {
        site_code: site_code.to_string(),
        master_database,
        photos_archive,
    })
}

/// Store a package verbatim: the master file is atomically replaced and, when
/// an archive is present, the photos directory becomes exactly its contents.
///
/// The master payload and the archive are validated before the master file is
/// touched, so a corrupt package leaves the site unchanged.
pub fn apply_master_overwrite(paths: &SitePaths, package: &MasterPackage) -> Result<AppliedPackage> {
    if package.master_database.is_empty() {
        return Err(Error::InvalidInput("master database payload is empty".to_string()));
    }
    probe_store_bytes(&package.master_database)?;
    if let Some(archive) = &package.photos_archive {
        photos::validate_archive(archive)?;
    }

    write_atomic(&paths.master, &package.master_database)?;
    let photos = package
        .photos_archive
        .as_deref()
        .map(|archive| photos::replace_from_archive(&paths.photos_dir, archive))
        .transpose()?;

    Ok(AppliedPackage {
        merge: None,
        photos,
    })
}

/// Merge a package into the local master store.
///
/// Photos are extracted additively: files named in the archive are written,
/// local-only photos are kept, mirroring the merge's no-delete policy.
pub fn apply_master_merge(paths: &SitePaths, package: &MasterPackage) -> Result<AppliedPackage> {
    if let Some(archive) = &package.photos_archive {
        photos::validate_archive(archive)?;
    }

    let mut local = MasterStore::open(&paths.master)?;
    let merge = merge_master_snapshot(&mut local, &package.master_database)?;
    let photos = package
        .photos_archive
        .as_deref()
        .map(|archive| photos::extract_archive(&paths.photos_dir, archive))
        .transpose()?;

    Ok(AppliedPackage {
        merge: Some(merge),
        photos,
    })
}
