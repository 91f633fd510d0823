use anyhow::{Context, Result, bail};
use glob::Pattern;
use plugzip_lib::{Config, DEFAULT_NAME, DEFAULT_VERSION, Manifest, PackageMode};
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::{
    component_zips::{entry_listing, plan_component_archives},
    fs_utils::{compile_patterns, encode_size, parse_size, total_size},
    naming::archive_file_name,
    packaging::{collect_entries, create_zip_sync},
    shell_exec::execute_and_stream_command,
    staging::{ComponentSelection, StagePlan, StagingDir, check_package_name, plan_staging},
    verify::verify_archive,
};

/// Fully resolved inputs of one packaging run.
#[derive(Debug)]
pub struct BuildSettings {
    pub root: PathBuf,
    pub name: String,
    pub version: String,
    pub output_dir: PathBuf,
    pub file_name: String,
    pub manifest: Manifest,
    pub mode: PackageMode,
    pub selection: ComponentSelection,
    pub skip: Vec<Pattern>,
    pub max_size: Option<u64>,
    pub before: Option<String>,
    pub after: Option<String>,
    pub verify: bool,
}

impl BuildSettings {
    /// Resolves a merged config, filling the built-in defaults.
    pub fn from_config(config: &Config) -> Result<Self> {
        let root = PathBuf::from(config.root.as_deref().unwrap_or("."));
        let name = config.name.clone().unwrap_or_else(|| DEFAULT_NAME.to_string());
        let manifest = config.manifest();
        check_package_name(&name, &manifest)?;
        let mode = config.mode.unwrap_or_default();

        let output_dir = match &config.output_dir {
            Some(dir) => root.join(dir),
            None => root.clone(),
        };

        let max_size = match &config.max_size {
            Some(s) => Some(parse_size(s)?).filter(|limit| *limit > 0),
            None => None,
        };

        let selection = match (mode, &config.components) {
            (PackageMode::Empty, _) => ComponentSelection::Empty,
            (PackageMode::Preserve, _) => ComponentSelection::Omit,
            (_, Some(names)) => ComponentSelection::Only(names.clone()),
            (_, None) => ComponentSelection::All,
        };

        Ok(Self {
            output_dir,
            name,
            version: config
                .version
                .clone()
                .unwrap_or_else(|| DEFAULT_VERSION.to_string()),
            file_name: config
                .file_name
                .clone()
                .unwrap_or_else(|| mode.default_file_name().to_string()),
            manifest,
            mode,
            selection,
            skip: compile_patterns(config.skip.as_deref().unwrap_or_default())?,
            max_size,
            before: config.before.clone(),
            after: config.after.clone(),
            verify: config.verify.unwrap_or(false),
            root,
        })
    }

    pub fn staging_path(&self) -> PathBuf {
        self.root.join(&self.name)
    }

    pub fn archive_path(&self) -> Result<PathBuf> {
        let file_name = archive_file_name(&self.file_name, &self.name, &self.version)?;
        Ok(self.output_dir.join(file_name))
    }
}

/// Outcome of a successful run.
#[derive(Debug)]
pub struct BuildReport {
    pub archive: PathBuf,
    pub size: u64,
    pub entries: usize,
}

/// Stages the manifest's files, zips them and removes the staging directory.
///
/// A stale archive and staging directory are removed before anything is
/// copied, so a failed run never leaves the previous archive in place.
pub fn build_package(settings: &BuildSettings) -> Result<BuildReport> {
    let archive_path = settings.archive_path()?;
    let staging_path = settings.staging_path();
    if archive_path.starts_with(&staging_path) {
        bail!("archive {archive_path:?} cannot live inside the staging directory {staging_path:?}");
    }

    println!("Creating ZIP: {}", display_name(&archive_path));
    println!("{}", "=".repeat(50));

    if let Some(command) = &settings.before {
        println!("Running before hook: {command}");
        execute_and_stream_command(command, &settings.root)?;
    }

    if archive_path.exists() {
        println!("Removing old ZIP file...");
        fs::remove_file(&archive_path).with_context(|| format!("removing {archive_path:?}"))?;
    }

    let staging = StagingDir::create(staging_path)?;

    println!("Copying plugin files...");
    let plan = plan_staging(
        &settings.root,
        &settings.manifest,
        &settings.selection,
        &settings.skip,
    )?;
    staging.populate(&plan)?;
    for note in &plan.notes {
        println!("  ✓ {note}");
    }
    for warning in &plan.warnings {
        println!("  ⚠ {warning}");
    }

    if let Some(limit) = settings.max_size {
        let total = staged_size(&plan)?;
        if total > limit {
            bail!(
                "staged size {} exceeds limit {}",
                encode_size(total),
                encode_size(limit)
            );
        }
    }

    println!("\nFiles copied. Creating ZIP archive...");
    let entries = collect_entries(staging.path())?;
    let size = create_zip_sync(&entries, &archive_path)?;

    println!("Cleaning up...");
    staging.finish()?;

    if settings.verify {
        let report = verify_archive(&archive_path, &settings.name, &settings.manifest.main_file)?;
        println!(
            "Verified {} entries ({} uncompressed)",
            report.entries.len(),
            encode_size(report.total_size)
        );
    }

    if let Some(command) = &settings.after {
        println!("Running after hook: {command}");
        execute_and_stream_command(command, &settings.root)?;
    }

    Ok(BuildReport {
        archive: archive_path,
        size,
        entries: entries.len(),
    })
}

/// Prints the merged config and what a run would write, without deleting
/// or writing anything. Returns the number of files listed.
pub fn dry_run(settings: &BuildSettings, config: &Config) -> Result<usize> {
    println!("{}", dry_run_header(config)?);

    if settings.mode == PackageMode::PerComponent {
        return dry_run_components(settings);
    }

    let archive_path = settings.archive_path()?;
    let plan = plan_staging(
        &settings.root,
        &settings.manifest,
        &settings.selection,
        &settings.skip,
    )?;

    println!("Archive: {}", archive_path.display());
    for file in &plan.files {
        let name_in_archive = Path::new(&settings.name).join(&file.relative);
        println!(
            "  {} -> {}",
            file.source.display(),
            name_in_archive.to_string_lossy().replace('\\', "/")
        );
    }
    for warning in &plan.warnings {
        println!("  ⚠ {warning}");
    }
    println!("Total files: {}", plan.files.len());
    println!("Total size: {}", encode_size(staged_size(&plan)?));

    Ok(plan.files.len())
}

/// The dry-run header followed by the merged config it resolved from.
fn dry_run_header(config: &Config) -> Result<String> {
    Ok(format!("--- DRY RUN ---\n{}", serde_yaml::to_string(config)?))
}

fn dry_run_components(settings: &BuildSettings) -> Result<usize> {
    let mut warnings = Vec::new();
    let plans = plan_component_archives(settings, &mut warnings)?;

    let mut total = 0;
    for plan in &plans {
        println!("Archive: {}", plan.archive.display());
        for (source, name_in_archive) in entry_listing(plan) {
            println!("  {} -> {name_in_archive}", source.display());
        }
        total += plan.entries.len();
    }
    for warning in &warnings {
        println!("  ⚠ {warning}");
    }
    println!("Total files: {total}");
    Ok(total)
}

fn staged_size(plan: &StagePlan) -> Result<u64> {
    let sources: Vec<PathBuf> = plan.files.iter().map(|f| f.source.clone()).collect();
    total_size(&sources)
}

pub fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
