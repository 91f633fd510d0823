use serde::{Deserialize, Serialize};
use std::str::FromStr;

pub const DEFAULT_NAME: &str = "modular-blocks-plugin";
pub const DEFAULT_VERSION: &str = "1.0.0";
pub const DEFAULT_FILE_NAME: &str = "%name%-%version%.zip";

/// Layered run configuration. Every field is optional so that env, file
/// and CLI sources can be merged field by field.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    pub config: Option<String>,
    pub root: Option<String>,
    pub name: Option<String>,
    pub version: Option<String>,
    pub output_dir: Option<String>,
    pub file_name: Option<String>,
    pub main_file: Option<String>,
    pub copy_dirs: Option<Vec<String>>,
    pub components_dir: Option<String>,
    pub component_files: Option<Vec<String>>,
    pub component_build_dir: Option<String>,
    pub optional: Option<Vec<OptionalItem>>,
    pub mode: Option<PackageMode>,
    pub components: Option<Vec<String>>,
    pub skip: Option<Vec<String>>,
    pub max_size: Option<String>,
    pub before: Option<String>,
    pub after: Option<String>,
    pub dry: Option<bool>,
    pub verify: Option<bool>,
}

impl Config {
    /// Overlays the manifest keys of this config on the built-in manifest.
    pub fn manifest(&self) -> Manifest {
        let base = Manifest::default();
        Manifest {
            main_file: self.main_file.clone().unwrap_or(base.main_file),
            copy_dirs: self.copy_dirs.clone().unwrap_or(base.copy_dirs),
            components_dir: self.components_dir.clone().unwrap_or(base.components_dir),
            component_files: self
                .component_files
                .clone()
                .unwrap_or(base.component_files),
            component_build_dir: self
                .component_build_dir
                .clone()
                .unwrap_or(base.component_build_dir),
            optional: self.optional.clone().unwrap_or(base.optional),
        }
    }
}

/// What a run produces.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum PackageMode {
    /// One archive with the selected components.
    #[default]
    Full,
    /// One archive with an empty components directory.
    Empty,
    /// One archive without the components directory, for updating an
    /// installation while keeping the components already deployed.
    Preserve,
    /// One archive per component, holding its build output and whitelisted files.
    PerComponent,
}

impl PackageMode {
    /// Archive name template used when none is configured.
    pub fn default_file_name(self) -> &'static str {
        match self {
            Self::Full => DEFAULT_FILE_NAME,
            Self::Empty => "%name%-empty-%version%.zip",
            Self::Preserve => "%name%-framework-update.zip",
            Self::PerComponent => "%name%.zip",
        }
    }
}

impl FromStr for PackageMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "full" => Ok(Self::Full),
            "empty" => Ok(Self::Empty),
            "preserve" => Ok(Self::Preserve),
            "per-component" => Ok(Self::PerComponent),
            other => Err(format!(
                "unknown mode {other:?} (expected full, empty, preserve or per-component)"
            )),
        }
    }
}

/// Whether an optional top-level item is copied as a tree or a single file.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Dir,
    File,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct OptionalItem {
    pub path: String,
    pub kind: ItemKind,
}

impl OptionalItem {
    pub fn dir(path: &str) -> Self {
        Self {
            path: path.to_string(),
            kind: ItemKind::Dir,
        }
    }

    pub fn file(path: &str) -> Self {
        Self {
            path: path.to_string(),
            kind: ItemKind::File,
        }
    }
}

/// Inclusion rules for one package.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Manifest {
    /// Top-level file that must exist.
    pub main_file: String,
    /// Directories copied wholesale when present.
    pub copy_dirs: Vec<String>,
    /// Container whose immediate subdirectories are filtered.
    pub components_dir: String,
    /// Files picked from each component, when present.
    pub component_files: Vec<String>,
    /// Compiled output per component, merged into per-component archives.
    pub component_build_dir: String,
    pub optional: Vec<OptionalItem>,
}

impl Default for Manifest {
    fn default() -> Self {
        Self {
            main_file: format!("{DEFAULT_NAME}.php"),
            copy_dirs: ["includes", "admin", "assets", "build"]
                .into_iter()
                .map(String::from)
                .collect(),
            components_dir: "blocks".to_string(),
            component_files: ["block.json", "render.php", "view.js"]
                .into_iter()
                .map(String::from)
                .collect(),
            component_build_dir: "build/blocks".to_string(),
            optional: vec![
                OptionalItem::dir("languages"),
                OptionalItem::file("README.md"),
                OptionalItem::file("LICENSE.txt"),
                OptionalItem::file("LICENSE"),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_yields_default_manifest() {
        assert_eq!(Config::default().manifest(), Manifest::default());
    }

    #[test]
    fn config_overrides_only_named_keys() {
        let cfg = Config {
            main_file: Some("plugin.php".into()),
            component_files: Some(vec!["block.json".into()]),
            ..Config::default()
        };
        let manifest = cfg.manifest();
        assert_eq!(manifest.main_file, "plugin.php");
        assert_eq!(manifest.component_files, vec!["block.json".to_string()]);
        assert_eq!(manifest.components_dir, "blocks");
        assert_eq!(manifest.copy_dirs.len(), 4);
    }

    #[test]
    fn modes_parse_from_text_and_yaml() {
        assert_eq!("Per-Component".parse::<PackageMode>(), Ok(PackageMode::PerComponent));
        assert_eq!("preserve".parse::<PackageMode>(), Ok(PackageMode::Preserve));
        assert!("partial".parse::<PackageMode>().is_err());

        let cfg: Config = serde_yaml::from_str("mode: empty\n").unwrap();
        assert_eq!(cfg.mode, Some(PackageMode::Empty));
    }

    #[test]
    fn each_mode_has_its_own_default_name() {
        assert_eq!(PackageMode::default().default_file_name(), DEFAULT_FILE_NAME);
        assert_eq!(
            PackageMode::Empty.default_file_name(),
            "%name%-empty-%version%.zip"
        );
        assert!(!PackageMode::Preserve.default_file_name().contains("%version%"));
    }

    #[test]
    fn optional_items_parse_from_yaml() {
        let yaml = "optional:\n  - path: languages\n    kind: dir\n  - path: README.md\n    kind: file\n";
        let cfg: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(
            cfg.optional,
            Some(vec![
                OptionalItem::dir("languages"),
                OptionalItem::file("README.md")
            ])
        );
        assert!(cfg.name.is_none());
    }
}
