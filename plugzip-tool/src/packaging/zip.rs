use anyhow::{Context, Result};
use async_zip::tokio::read::fs::ZipFileReader;
use async_zip::tokio::write::ZipFileWriter;
use async_zip::{Compression, ZipEntryBuilder};
use std::path::Path;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

use super::FileEntry;

/// One entry as recorded in an existing archive.
#[derive(Debug, Clone, PartialEq)]
pub struct ArchiveEntry {
    pub name: String,
    pub compression: Compression,
    pub size: u64,
}

/// Creates the output file, creating parent directories if they don't exist.
async fn create_file_writer(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("creating directory {parent:?}"))?;
    }

    File::create(path)
        .await
        .with_context(|| format!("creating archive {path:?}"))
}

/// Writes every file as a deflated entry, in the given order.
pub async fn write_zip_async(files: &[FileEntry], output: &Path) -> Result<()> {
    let file = create_file_writer(output).await?;
    let mut writer = ZipFileWriter::with_tokio(file);

    for fe in files {
        let data = tokio::fs::read(&fe.path)
            .await
            .with_context(|| format!("reading {:?}", fe.path))?;

        let builder = ZipEntryBuilder::new(fe.name_in_archive.clone().into(), Compression::Deflate);
        writer
            .write_entry_whole(builder, &data)
            .await
            .with_context(|| format!("adding {} to archive", fe.name_in_archive))?;
    }

    // tokio files finish pending writes in the background unless flushed
    let mut file = writer
        .close()
        .await
        .context("finishing archive")?
        .into_inner();
    file.flush()
        .await
        .with_context(|| format!("flushing {output:?}"))?;
    Ok(())
}

pub async fn read_zip_async(path: &Path) -> Result<Vec<ArchiveEntry>> {
    let reader = ZipFileReader::new(path.to_path_buf())
        .await
        .with_context(|| format!("opening archive {path:?}"))?;

    reader
        .file()
        .entries()
        .iter()
        .map(|entry| {
            let name = entry
                .filename()
                .as_str()
                .context("entry name is not valid UTF-8")?
                .to_string();
            Ok(ArchiveEntry {
                name,
                compression: entry.compression(),
                size: entry.uncompressed_size(),
            })
        })
        .collect()
}
