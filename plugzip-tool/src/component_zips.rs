use anyhow::{Context, Result, bail};
use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use crate::{
    fs_utils::list_total_files,
    naming::archive_file_name,
    packaging::{FileEntry, archive_name, create_zip_sync, read_zip_sync},
    process::{BuildSettings, display_name},
    shell_exec::execute_and_stream_command,
    staging::{discover_components, select_components},
};

/// One component's archive contents, computed before anything is written.
#[derive(Debug)]
pub struct ComponentPlan {
    pub component: String,
    pub archive: PathBuf,
    pub entries: Vec<FileEntry>,
}

/// A written component archive.
#[derive(Debug)]
pub struct ComponentReport {
    pub component: String,
    pub archive: PathBuf,
    pub size: u64,
    pub entries: usize,
}

/// Entries of a single component archive, keyed by name at the archive root.
///
/// The component's build output comes first; whitelisted source files of the
/// same name replace the built copy.
pub fn component_entries(settings: &BuildSettings, component: &str) -> Result<Vec<FileEntry>> {
    let manifest = &settings.manifest;
    let build_dir = settings
        .root
        .join(&manifest.component_build_dir)
        .join(component);
    let source_dir = settings.root.join(&manifest.components_dir).join(component);

    let mut by_name: BTreeMap<String, PathBuf> = BTreeMap::new();
    if build_dir.is_dir() {
        for path in list_total_files(&build_dir, &settings.root, &settings.skip)? {
            by_name.insert(archive_name(&path, &build_dir)?, path);
        }
    }
    for file_name in &manifest.component_files {
        let source = source_dir.join(file_name);
        if source.is_file() {
            by_name.insert(file_name.clone(), source);
        }
    }

    Ok(by_name
        .into_iter()
        .map(|(name_in_archive, path)| FileEntry {
            path,
            name_in_archive,
        })
        .collect())
}

/// Resolves the selected components into archive plans. Components with
/// nothing to pack are reported in `warnings` and left out.
pub fn plan_component_archives(
    settings: &BuildSettings,
    warnings: &mut Vec<String>,
) -> Result<Vec<ComponentPlan>> {
    let container = settings.root.join(&settings.manifest.components_dir);
    let available = discover_components(&container)?;
    let selected = select_components(available, &settings.selection, warnings);

    let mut plans = Vec::new();
    for component in selected {
        let entries = component_entries(settings, &component)?;
        if entries.is_empty() {
            warnings.push(format!("{component}: no build output or packaged files, skipping"));
            continue;
        }
        let file_name = archive_file_name(&settings.file_name, &component, &settings.version)?;
        plans.push(ComponentPlan {
            archive: settings.output_dir.join(file_name),
            component,
            entries,
        });
    }
    Ok(plans)
}

/// Writes one archive per selected component into the output directory.
pub fn build_component_archives(settings: &BuildSettings) -> Result<Vec<ComponentReport>> {
    println!("Creating component ZIPs in {}", settings.output_dir.display());
    println!("{}", "=".repeat(50));

    if let Some(command) = &settings.before {
        println!("Running before hook: {command}");
        execute_and_stream_command(command, &settings.root)?;
    }

    let mut warnings = Vec::new();
    let plans = plan_component_archives(settings, &mut warnings)?;
    for warning in &warnings {
        println!("  ⚠ {warning}");
    }

    let mut reports = Vec::new();
    for plan in plans {
        if plan.archive.exists() {
            fs::remove_file(&plan.archive)
                .with_context(|| format!("removing {:?}", plan.archive))?;
        }

        let size = create_zip_sync(&plan.entries, &plan.archive)?;
        println!("  ✓ {} ({} files)", display_name(&plan.archive), plan.entries.len());

        if settings.verify {
            let written = read_zip_sync(&plan.archive)?;
            if written.len() != plan.entries.len() {
                bail!(
                    "archive {:?} holds {} entries, expected {}",
                    plan.archive,
                    written.len(),
                    plan.entries.len()
                );
            }
        }

        reports.push(ComponentReport {
            component: plan.component,
            archive: plan.archive,
            size,
            entries: plan.entries.len(),
        });
    }

    if let Some(command) = &settings.after {
        println!("Running after hook: {command}");
        execute_and_stream_command(command, &settings.root)?;
    }

    Ok(reports)
}

/// Archive entry names, for listing in a dry run.
pub fn entry_listing(plan: &ComponentPlan) -> Vec<(&Path, &str)> {
    plan.entries
        .iter()
        .map(|e| (e.path.as_path(), e.name_in_archive.as_str()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use plugzip_lib::{Config, PackageMode};
    use tempfile::TempDir;

    fn project() -> TempDir {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        fs::write(root.join("modular-blocks-plugin.php"), "<?php").unwrap();
        fs::create_dir_all(root.join("build/blocks/card")).unwrap();
        fs::write(root.join("build/blocks/card/index.js"), "built").unwrap();
        fs::write(root.join("build/blocks/card/block.json"), "built json").unwrap();
        fs::write(root.join("build/blocks/card/index.js.map"), "map").unwrap();
        fs::create_dir_all(root.join("blocks/card")).unwrap();
        fs::write(root.join("blocks/card/block.json"), "source json").unwrap();
        fs::write(root.join("blocks/card/render.php"), "<?php").unwrap();
        fs::write(root.join("blocks/card/edit.js"), "edit").unwrap();
        fs::create_dir_all(root.join("blocks/bare")).unwrap();
        fs::write(root.join("blocks/bare/notes.txt"), "x").unwrap();
        tmp
    }

    fn settings(root: &Path, extra: Config) -> BuildSettings {
        BuildSettings::from_config(&Config {
            root: Some(root.to_string_lossy().into_owned()),
            mode: Some(PackageMode::PerComponent),
            ..extra
        })
        .unwrap()
    }

    #[test]
    fn build_output_merges_with_source_files_at_archive_root() {
        let tmp = project();
        let s = settings(tmp.path(), Config::default());
        let entries = component_entries(&s, "card").unwrap();

        let names: Vec<&str> = entries.iter().map(|e| e.name_in_archive.as_str()).collect();
        assert_eq!(names, vec!["block.json", "index.js", "index.js.map", "render.php"]);

        let json = entries.iter().find(|e| e.name_in_archive == "block.json").unwrap();
        assert_eq!(json.path, tmp.path().join("blocks/card/block.json"));
    }

    #[test]
    fn writes_one_archive_per_component_and_skips_empty_ones() {
        let tmp = project();
        let s = settings(
            tmp.path(),
            Config {
                output_dir: Some("plugin-zips".into()),
                skip: Some(vec!["build/blocks/*/*.map".into()]),
                verify: Some(true),
                ..Config::default()
            },
        );

        let reports = build_component_archives(&s).unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].component, "card");
        assert_eq!(reports[0].archive, tmp.path().join("plugin-zips/card.zip"));
        assert!(!tmp.path().join("plugin-zips/bare.zip").exists());

        let names: Vec<String> = read_zip_sync(&reports[0].archive)
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(names, vec!["block.json", "index.js", "render.php"]);
    }

    #[test]
    fn unknown_components_are_warned_about() {
        let tmp = project();
        let s = settings(
            tmp.path(),
            Config {
                components: Some(vec!["card".into(), "ghost".into()]),
                ..Config::default()
            },
        );
        let mut warnings = Vec::new();
        let plans = plan_component_archives(&s, &mut warnings).unwrap();
        assert_eq!(plans.len(), 1);
        assert_eq!(warnings, vec!["component \"ghost\" not found, skipping"]);
        assert_eq!(entry_listing(&plans[0]).len(), 4);
    }
}
