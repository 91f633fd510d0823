use anyhow::{Context, Result, bail};
use glob::Pattern;
use plugzip_lib::{ItemKind, Manifest};
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::fs_utils::list_total_files;

/// A single file to place in the staging directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedFile {
    pub source: PathBuf,
    /// Destination relative to the staging directory.
    pub relative: PathBuf,
}

/// Everything one run copies, computed before anything is written.
#[derive(Debug, Default)]
pub struct StagePlan {
    /// Directories to create, relative to the staging directory.
    pub dirs: Vec<PathBuf>,
    pub files: Vec<StagedFile>,
    /// Empty marker files, relative to the staging directory, that keep an
    /// otherwise empty directory visible in the archive.
    pub placeholders: Vec<PathBuf>,
    /// Human-readable progress lines, one per copied directory or component.
    pub notes: Vec<String>,
    pub warnings: Vec<String>,
}

impl StagePlan {
    fn add_file(&mut self, source: PathBuf, relative: PathBuf) {
        self.files.push(StagedFile { source, relative });
    }

    /// Queues every file of `source` under `relative`, minus paths whose
    /// location relative to `root` matches `skip`.
    fn add_tree(
        &mut self,
        root: &Path,
        source: &Path,
        relative: &Path,
        skip: &[Pattern],
    ) -> Result<()> {
        self.dirs.push(relative.to_path_buf());
        for file in list_total_files(source, root, skip)? {
            let rest = file
                .strip_prefix(source)
                .with_context(|| format!("{file:?} is not under {source:?}"))?;
            self.add_file(file.clone(), relative.join(rest));
        }
        Ok(())
    }
}

/// Which components of the components directory to stage.
#[derive(Debug, Clone, Default)]
pub enum ComponentSelection {
    #[default]
    All,
    Only(Vec<String>),
    /// Stage the components directory with no components in it.
    Empty,
    /// Leave the components directory out altogether.
    Omit,
}

/// Resolves `selection` against the components found on disk. Unknown
/// names are reported through `warnings`.
pub fn select_components(
    available: Vec<String>,
    selection: &ComponentSelection,
    warnings: &mut Vec<String>,
) -> Vec<String> {
    match selection {
        ComponentSelection::All => available,
        ComponentSelection::Only(wanted) => {
            let mut picked = Vec::new();
            for name in wanted {
                if available.contains(name) {
                    picked.push(name.clone());
                } else {
                    warnings.push(format!("component {name:?} not found, skipping"));
                }
            }
            picked
        }
        ComponentSelection::Empty | ComponentSelection::Omit => Vec::new(),
    }
}

/// Top-level names the project tree itself uses. The staging directory sits
/// next to them, so a package name from this list would replace source files.
pub fn reserved_names(manifest: &Manifest) -> Vec<String> {
    let mut paths: Vec<&str> = vec![
        &manifest.main_file,
        &manifest.components_dir,
        &manifest.component_build_dir,
    ];
    paths.extend(manifest.copy_dirs.iter().map(String::as_str));
    paths.extend(manifest.optional.iter().map(|item| item.path.as_str()));

    let mut names: Vec<String> = paths
        .into_iter()
        .filter_map(|p| Path::new(p).components().next())
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names.dedup();
    names
}

/// Rejects a package name that cannot safely name the staging directory.
pub fn check_package_name(name: &str, manifest: &Manifest) -> Result<()> {
    if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
        bail!("package name {name:?} must be a plain directory name");
    }
    if reserved_names(manifest).iter().any(|r| r == name) {
        bail!("package name {name:?} collides with a source path of the project");
    }
    Ok(())
}

/// Immediate subdirectory names of `dir`, sorted. Files at that level are ignored.
pub fn discover_components(dir: &Path) -> Result<Vec<String>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut names = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("reading directory {dir:?}"))? {
        let entry = entry.with_context(|| format!("reading entry in {dir:?}"))?;
        if entry.path().is_dir() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    names.sort();
    Ok(names)
}

/// Builds the copy plan for `manifest` against the project tree at `root`.
///
/// Only the main file is mandatory; every other item is skipped when absent.
pub fn plan_staging(
    root: &Path,
    manifest: &Manifest,
    selection: &ComponentSelection,
    skip: &[Pattern],
) -> Result<StagePlan> {
    let mut plan = StagePlan::default();

    let main_file = root.join(&manifest.main_file);
    if !main_file.is_file() {
        bail!("required file {main_file:?} not found");
    }
    plan.add_file(main_file, PathBuf::from(&manifest.main_file));

    for dir_name in &manifest.copy_dirs {
        let source = root.join(dir_name);
        if source.is_dir() {
            plan.add_tree(root, &source, Path::new(dir_name), skip)?;
            plan.notes.push(format!("Copied {dir_name}/"));
        }
    }

    plan_components(root, manifest, selection, &mut plan)?;

    for item in &manifest.optional {
        let source = root.join(&item.path);
        match item.kind {
            ItemKind::Dir if source.is_dir() => {
                plan.add_tree(root, &source, Path::new(&item.path), skip)?;
            }
            ItemKind::File if source.is_file() => {
                plan.add_file(source, PathBuf::from(&item.path));
            }
            _ => {}
        }
    }

    Ok(plan)
}

fn plan_components(
    root: &Path,
    manifest: &Manifest,
    selection: &ComponentSelection,
    plan: &mut StagePlan,
) -> Result<()> {
    let container = root.join(&manifest.components_dir);
    let container_rel = PathBuf::from(&manifest.components_dir);

    match selection {
        ComponentSelection::Omit => {
            plan.notes
                .push(format!("Left out {}/", manifest.components_dir));
            return Ok(());
        }
        ComponentSelection::Empty => {
            plan.dirs.push(container_rel.clone());
            plan.placeholders.push(container_rel.join(".gitkeep"));
            plan.notes
                .push(format!("Created empty {}/", manifest.components_dir));
            return Ok(());
        }
        ComponentSelection::All | ComponentSelection::Only(_) => {}
    }
    plan.dirs.push(container_rel.clone());

    let available = discover_components(&container)?;
    let selected = select_components(available, selection, &mut plan.warnings);

    for name in selected {
        let source_dir = container.join(&name);
        let dest_dir = container_rel.join(&name);
        plan.dirs.push(dest_dir.clone());

        let mut copied = 0;
        for file_name in &manifest.component_files {
            let source = source_dir.join(file_name);
            if source.is_file() {
                plan.add_file(source, dest_dir.join(file_name));
                copied += 1;
            }
        }

        if copied == 0 {
            plan.warnings
                .push(format!("{name}: none of the packaged files present"));
        }
        plan.notes.push(format!("Copied {name}"));
    }

    Ok(())
}

/// The transient directory the archive is built from.
///
/// Dropping it removes the directory, so a failed run leaves nothing behind.
#[derive(Debug)]
pub struct StagingDir {
    path: PathBuf,
    removed: bool,
}

impl StagingDir {
    /// Creates an empty staging directory at `path`, removing a stale one first.
    pub fn create(path: PathBuf) -> Result<Self> {
        if path.exists() {
            println!("Removing old temp directory...");
            fs::remove_dir_all(&path).with_context(|| format!("removing {path:?}"))?;
        }

        println!("Creating temporary directory...");
        fs::create_dir_all(&path).with_context(|| format!("creating {path:?}"))?;
        Ok(Self {
            path,
            removed: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Copies the planned directories and files into the staging directory.
    pub fn populate(&self, plan: &StagePlan) -> Result<()> {
        for dir in &plan.dirs {
            let dest = self.path.join(dir);
            fs::create_dir_all(&dest).with_context(|| format!("creating {dest:?}"))?;
        }

        for file in &plan.files {
            let dest = self.path.join(&file.relative);
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent).with_context(|| format!("creating {parent:?}"))?;
            }
            fs::copy(&file.source, &dest)
                .with_context(|| format!("copying {:?} to {dest:?}", file.source))?;
        }

        for marker in &plan.placeholders {
            let dest = self.path.join(marker);
            fs::write(&dest, b"").with_context(|| format!("creating {dest:?}"))?;
        }
        Ok(())
    }

    /// Removes the directory, reporting failure instead of swallowing it.
    pub fn finish(mut self) -> Result<()> {
        self.removed = true;
        fs::remove_dir_all(&self.path).with_context(|| format!("removing {:?}", self.path))
    }
}

impl Drop for StagingDir {
    fn drop(&mut self) {
        if !self.removed {
            let _ = fs::remove_dir_all(&self.path);
        }
    }
}
