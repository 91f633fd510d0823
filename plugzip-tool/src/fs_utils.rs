use anyhow::{Context, Result};
use std::{
    fs,
    path::{Path, PathBuf},
};

use glob::Pattern;

/// Compiles `skip` globs, naming the offending pattern on failure.
pub fn compile_patterns(patterns: &[String]) -> Result<Vec<Pattern>> {
    patterns
        .iter()
        .map(|p| Pattern::new(p).with_context(|| format!("invalid skip pattern: {p}")))
        .collect()
}

/// Matches `path` relative to `base`, `/`-separated, so patterns such as
/// `assets/maps/*` are written the way the project tree reads.
pub fn is_skipped(path: &Path, base: &Path, patterns: &[Pattern]) -> bool {
    if patterns.is_empty() {
        return false;
    }
    let relative = path.strip_prefix(base).unwrap_or(path);
    let path_str = relative.to_string_lossy().replace('\\', "/");
    patterns.iter().any(|p| p.matches(&path_str))
}

/// Recursively lists all regular files under `dir`, excluding any whose path
/// relative to `base` matches `skip`. The result is sorted so callers see a
/// stable order.
pub fn list_total_files(dir: &Path, base: &Path, skip: &[Pattern]) -> Result<Vec<PathBuf>> {
    fn walk_dir(
        dir: &Path,
        base: &Path,
        patterns: &[Pattern],
        result: &mut Vec<PathBuf>,
    ) -> Result<()> {
        for entry in fs::read_dir(dir).with_context(|| format!("reading directory {dir:?}"))? {
            let entry = entry.with_context(|| format!("reading entry in {dir:?}"))?;
            let path = entry.path();

            if is_skipped(&path, base, patterns) {
                continue;
            }

            if path.is_dir() {
                walk_dir(&path, base, patterns, result)?;
            } else if path.is_file() {
                result.push(path);
            }
        }
        Ok(())
    }

    let mut result = Vec::new();
    walk_dir(dir, base, skip, &mut result)?;
    result.sort();
    Ok(result)
}

pub fn total_size(files: &[PathBuf]) -> Result<u64> {
    let mut total: u64 = 0;
    for path in files {
        let meta = fs::metadata(path).with_context(|| format!("reading metadata of {path:?}"))?;
        total += meta.len();
    }
    Ok(total)
}

/// Parse human-readable sizes in both binary (Ki/Mi/Gi) and decimal (KB/MB/GB) units.
/// Examples: "512Mi", "10Gi", "1MB", "500kb", "1024", "2.5GB"
pub fn parse_size(s: &str) -> Result<u64> {
    let s = s.trim().to_ascii_lowercase();

    let units: [(&str, u64); 8] = [
        ("ki", 1024),
        ("mi", 1024_u64.pow(2)),
        ("gi", 1024_u64.pow(3)),
        ("ti", 1024_u64.pow(4)),
        ("kb", 1000),
        ("mb", 1000_u64.pow(2)),
        ("gb", 1000_u64.pow(3)),
        ("tb", 1000_u64.pow(4)),
    ];

    let (multiplier, number_str) = units
        .iter()
        .find_map(|(suffix, mult)| s.strip_suffix(suffix).map(|rest| (*mult, rest)))
        .unwrap_or((1, s.as_str()));

    let number: f64 = number_str
        .trim()
        .parse()
        .with_context(|| format!("Invalid size format: {s}"))?;

    if number < 0.0 {
        anyhow::bail!("Invalid size format: {s}");
    }

    Ok((number * multiplier as f64) as u64)
}

/// Convert bytes into a human-friendly string using binary (KiB, MiB, GiB...) units.
pub fn encode_size(bytes: u64) -> String {
    const UNITS: [&str; 6] = ["B", "KiB", "MiB", "GiB", "TiB", "PiB"];

    if bytes == 0 {
        return "0 B".to_string();
    }

    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    // 1.0 MiB prints as 1 MiB
    if (size * 10.0) % 10.0 == 0.0 {
        format!("{:.0} {}", size, UNITS[unit_index])
    } else {
        format!("{:.1} {}", size, UNITS[unit_index])
    }
}

/// Size in mebibytes with two decimals, as shown in the completion banner.
pub fn format_mebibytes(bytes: u64) -> String {
    format!("{:.2}", bytes as f64 / (1024.0 * 1024.0))
}
