use anyhow::{Result, bail};
use async_zip::Compression;
use std::path::Path;

use crate::packaging::read_zip_sync;

/// Entry names of an archive that passed [`verify_archive`].
#[derive(Debug)]
pub struct VerifyReport {
    pub entries: Vec<String>,
    /// Sum of uncompressed entry sizes.
    pub total_size: u64,
}

/// Checks that an archive extracts into a single `<name>/` directory,
/// carries the main file, and deflates every entry.
pub fn verify_archive(path: &Path, name: &str, main_file: &str) -> Result<VerifyReport> {
    let entries = read_zip_sync(path)?;
    let prefix = format!("{name}/");

    let mut problems = Vec::new();
    for entry in &entries {
        if !entry.name.starts_with(&prefix) {
            problems.push(format!("{} is outside {prefix}", entry.name));
        }
        if entry.compression != Compression::Deflate {
            problems.push(format!("{} is stored as {:?}", entry.name, entry.compression));
        }
    }

    let main_entry = format!("{prefix}{main_file}");
    if !entries.iter().any(|e| e.name == main_entry) {
        problems.push(format!("{main_entry} is missing"));
    }

    if !problems.is_empty() {
        bail!("archive {path:?} failed verification: {}", problems.join("; "));
    }

    Ok(VerifyReport {
        total_size: entries.iter().map(|e| e.size).sum(),
        entries: entries.into_iter().map(|e| e.name).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packaging::{FileEntry, create_zip_sync};
    use std::fs;
    use tempfile::TempDir;

    fn zip_with(names: &[&str]) -> (TempDir, std::path::PathBuf) {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("src.txt");
        fs::write(&src, "data").unwrap();
        let files: Vec<FileEntry> = names
            .iter()
            .map(|n| FileEntry {
                path: src.clone(),
                name_in_archive: n.to_string(),
            })
            .collect();
        let out = tmp.path().join("out.zip");
        create_zip_sync(&files, &out).unwrap();
        (tmp, out)
    }

    #[test]
    fn accepts_well_formed_archive() {
        let (_tmp, out) = zip_with(&["pkg/pkg.php", "pkg/blocks/a/block.json"]);
        let report = verify_archive(&out, "pkg", "pkg.php").unwrap();
        assert_eq!(report.entries.len(), 2);
        assert_eq!(report.total_size, 8);
    }

    #[test]
    fn rejects_missing_main_file_and_stray_entries() {
        let (_tmp, out) = zip_with(&["pkg/other.php", "stray.txt"]);
        let err = verify_archive(&out, "pkg", "pkg.php").unwrap_err().to_string();
        assert!(err.contains("stray.txt is outside pkg/"));
        assert!(err.contains("pkg/pkg.php is missing"));
    }
}
