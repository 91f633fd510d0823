use anyhow::{Context, Result, bail};
use std::path::{Component, Path, PathBuf};
use tokio::runtime::Builder;

use crate::fs_utils::list_total_files;
use crate::packaging::zip::{ArchiveEntry, read_zip_async, write_zip_async};

pub mod zip;

/// Represents a file to include in the ZIP archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub path: PathBuf,
    pub name_in_archive: String,
}

/// Lists every file under `staging`, named relative to its parent so that
/// each archive entry starts with the staging directory's own name.
pub fn collect_entries(staging: &Path) -> Result<Vec<FileEntry>> {
    let base = staging
        .parent()
        .with_context(|| format!("staging directory {staging:?} has no parent"))?;

    list_total_files(staging, base, &[])?
        .into_iter()
        .map(|path| {
            let name_in_archive = archive_name(&path, base)?;
            Ok(FileEntry {
                path,
                name_in_archive,
            })
        })
        .collect()
}

/// Zip entry names always use `/`, whatever the host separator.
pub(crate) fn archive_name(path: &Path, base: &Path) -> Result<String> {
    let relative = path
        .strip_prefix(base)
        .with_context(|| format!("{path:?} is not under {base:?}"))?;

    let mut parts = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
            other => bail!("unexpected path component {other:?} in {path:?}"),
        }
    }
    Ok(parts.join("/"))
}

/// Writes `files` into a deflate ZIP at `output` and returns the archive size.
///
/// The async writer runs on a current-thread runtime, so the call blocks
/// until the archive is fully flushed.
pub fn create_zip_sync(files: &[FileEntry], output: &Path) -> Result<u64> {
    let rt = Builder::new_current_thread().build()?;
    rt.block_on(write_zip_async(files, output))?;

    let size = std::fs::metadata(output)
        .with_context(|| format!("reading size of {output:?}"))?
        .len();
    Ok(size)
}

/// Lists the entries of an existing ZIP archive.
pub fn read_zip_sync(path: &Path) -> Result<Vec<ArchiveEntry>> {
    let rt = Builder::new_current_thread().build()?;
    rt.block_on(read_zip_async(path))
}
