use anyhow::Context;
use clap::Parser;
use plugzip_lib::{Config, PackageMode};
use std::{collections::HashMap, env, fs, process::ExitCode};

mod component_zips;
mod fs_utils;
mod naming;
mod packaging;
mod process;
mod shell_exec;
mod staging;
mod verify;

use crate::component_zips::build_component_archives;
use crate::fs_utils::format_mebibytes;
use crate::process::{BuildSettings, build_package, display_name, dry_run};

#[derive(Parser, Debug, Default)]
#[command(author, version, about = "Packages a plugin tree into a deployable ZIP", long_about = None)]
pub struct Cli {
    /// Configuration file (YAML or JSON)
    #[arg(short, long)]
    pub config: Option<String>,

    /// Project directory to package (default: current directory)
    #[arg(short, long)]
    pub root: Option<String>,

    /// Package name; also the top-level directory inside the archive
    #[arg(short, long)]
    pub name: Option<String>,

    /// Package version used in the archive name
    #[arg(long = "package-version")]
    pub package_version: Option<String>,

    /// Directory the archive is written to, relative to the root
    #[arg(short, long)]
    pub output_dir: Option<String>,

    /// Archive name template (%name%, %version%, %date%, %datetime%, %unix%)
    #[arg(long)]
    pub file_name: Option<String>,

    /// Only package these components (can be specified multiple times)
    #[arg(short = 'b', long = "component")]
    pub components: Vec<String>,

    /// Ship an empty components directory
    #[arg(long, action = clap::ArgAction::SetTrue, conflicts_with_all = ["preserve", "per_component"])]
    pub empty: bool,

    /// Leave the components directory out, keeping deployed components on update
    #[arg(long, alias = "no-components", action = clap::ArgAction::SetTrue, conflicts_with = "per_component")]
    pub preserve: bool,

    /// Write one archive per component instead of one package
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub per_component: bool,

    /// Patterns to skip (can be specified multiple times)
    #[arg(short = 's', long)]
    pub skip: Vec<String>,

    /// Max staged size, e.g. 20Mi (0 = unlimited)
    #[arg(short, long)]
    pub max_size: Option<String>,

    /// Command to execute before packaging
    #[arg(long)]
    pub before: Option<String>,

    /// Command to execute after packaging
    #[arg(long)]
    pub after: Option<String>,

    /// Dry run (just list files and parameters)
    #[arg(short, long, action = clap::ArgAction::SetTrue)]
    pub dry: bool,

    /// Check the archive layout after it is written
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub verify: bool,

    /// Generate YAML config to stdout
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub generate_yaml_config: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    ExitCode::from(exit_status(run(&cli)))
}

/// Reports a failed run on stderr and maps the outcome to a process status.
fn exit_status(result: anyhow::Result<()>) -> u8 {
    match result {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("{}", failure_banner(&e));
            1
        }
    }
}

fn failure_banner(e: &anyhow::Error) -> String {
    format!("\n❌ Error creating ZIP: {e}\n{e:?}")
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    let merged = load_config(cli)?;

    if cli.generate_yaml_config {
        println!("{}", serde_yaml::to_string(&merged)?);
        return Ok(());
    }

    let settings = BuildSettings::from_config(&merged)?;

    if merged.dry.unwrap_or(false) {
        dry_run(&settings, &merged)?;
        return Ok(());
    }

    if settings.mode == PackageMode::PerComponent {
        let reports = build_component_archives(&settings)?;
        println!("\n{}", "=".repeat(50));
        println!("✓ Created {} component ZIP(s)", reports.len());
        for report in &reports {
            println!(
                "  {}: {} ({} MB, {} entries)",
                report.component,
                display_name(&report.archive),
                format_mebibytes(report.size),
                report.entries
            );
        }
        println!("{}", "=".repeat(50));
        return Ok(());
    }

    let report = build_package(&settings)?;

    println!("\n{}", "=".repeat(50));
    println!("✓ Plugin ZIP created successfully!");
    println!("  File: {}", display_name(&report.archive));
    println!("  Size: {} MB", format_mebibytes(report.size));
    println!("  Entries: {}", report.entries);
    println!("\nYou can now upload this ZIP file to WordPress:");
    println!("  Plugins → Add New → Upload Plugin");
    println!("{}", "=".repeat(50));
    Ok(())
}

/// Merges env < file < CLI.
fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    let env_config = read_env();

    let mut file_config = Config::default();
    if let Some(path) = cli.config.clone().or(env_config.config.clone()) {
        file_config = read_config_file(&path)?;
    }

    Ok(merge_configs(env_config, file_config, cli_to_config(cli)))
}

/// Reads environment variables prefixed with PLUGZIP_
fn read_env() -> Config {
    let vars: HashMap<String, String> = env::vars().collect();
    config_from_vars(&vars)
}

fn config_from_vars(vars: &HashMap<String, String>) -> Config {
    macro_rules! get_env {
        ($key:expr) => {
            vars.get(&format!("PLUGZIP_{}", $key)).cloned()
        };
    }

    fn flag(v: String) -> bool {
        v == "true" || v == "1" || v.eq_ignore_ascii_case("yes")
    }

    fn list(v: String) -> Vec<String> {
        v.split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }

    Config {
        config: get_env!("CONFIG"),
        root: get_env!("ROOT"),
        name: get_env!("NAME"),
        version: get_env!("VERSION"),
        output_dir: get_env!("OUTPUT_DIR"),
        file_name: get_env!("FILE_NAME"),
        mode: get_env!("MODE").and_then(|v| v.parse().ok()),
        components: get_env!("COMPONENTS").map(list),
        skip: get_env!("SKIP").map(list),
        max_size: get_env!("MAX_SIZE"),
        before: get_env!("BEFORE"),
        after: get_env!("AFTER"),
        dry: get_env!("DRY").map(flag),
        verify: get_env!("VERIFY").map(flag),
        ..Config::default()
    }
}

/// Reads YAML or JSON config from file
fn read_config_file(path: &str) -> anyhow::Result<Config> {
    let content =
        fs::read_to_string(path).with_context(|| format!("reading config file {path}"))?;
    let cfg = if path.to_lowercase().ends_with(".json") {
        serde_json::from_str(&content).with_context(|| format!("parsing {path}"))?
    } else {
        serde_yaml::from_str(&content).with_context(|| format!("parsing {path}"))?
    };
    Ok(cfg)
}

/// Converts CLI struct into Config. Unset flags stay `None` so lower layers show through.
fn cli_to_config(cli: &Cli) -> Config {
    fn non_empty(v: &[String]) -> Option<Vec<String>> {
        if v.is_empty() { None } else { Some(v.to_vec()) }
    }

    Config {
        config: cli.config.clone(),
        root: cli.root.clone(),
        name: cli.name.clone(),
        version: cli.package_version.clone(),
        output_dir: cli.output_dir.clone(),
        file_name: cli.file_name.clone(),
        mode: cli_mode(cli),
        components: non_empty(&cli.components),
        skip: non_empty(&cli.skip),
        max_size: cli.max_size.clone(),
        before: cli.before.clone(),
        after: cli.after.clone(),
        dry: cli.dry.then_some(true),
        verify: cli.verify.then_some(true),
        ..Config::default()
    }
}

fn cli_mode(cli: &Cli) -> Option<PackageMode> {
    if cli.per_component {
        Some(PackageMode::PerComponent)
    } else if cli.preserve {
        Some(PackageMode::Preserve)
    } else if cli.empty {
        Some(PackageMode::Empty)
    } else {
        None
    }
}

/// Merge configs by priority: env < file < cli
fn merge_configs(env: Config, file: Config, cli: Config) -> Config {
    fn pick<T: Clone>(env: Option<T>, file: Option<T>, cli: Option<T>) -> Option<T> {
        cli.or(file).or(env)
    }

    Config {
        config: pick(env.config, file.config, cli.config),
        root: pick(env.root, file.root, cli.root),
        name: pick(env.name, file.name, cli.name),
        version: pick(env.version, file.version, cli.version),
        output_dir: pick(env.output_dir, file.output_dir, cli.output_dir),
        file_name: pick(env.file_name, file.file_name, cli.file_name),
        main_file: pick(env.main_file, file.main_file, cli.main_file),
        copy_dirs: pick(env.copy_dirs, file.copy_dirs, cli.copy_dirs),
        components_dir: pick(env.components_dir, file.components_dir, cli.components_dir),
        component_files: pick(env.component_files, file.component_files, cli.component_files),
        component_build_dir: pick(
            env.component_build_dir,
            file.component_build_dir,
            cli.component_build_dir,
        ),
        optional: pick(env.optional, file.optional, cli.optional),
        mode: pick(env.mode, file.mode, cli.mode),
        components: pick(env.components, file.components, cli.components),
        skip: pick(env.skip, file.skip, cli.skip),
        max_size: pick(env.max_size, file.max_size, cli.max_size),
        before: pick(env.before, file.before, cli.before),
        after: pick(env.after, file.after, cli.after),
        dry: pick(env.dry, file.dry, cli.dry),
        verify: pick(env.verify, file.verify, cli.verify),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn env_vars_map_to_config() {
        let vars: HashMap<String, String> = [
            ("PLUGZIP_NAME", "my-plugin"),
            ("PLUGZIP_SKIP", "*.map, ,*.DS_Store"),
            ("PLUGZIP_DRY", "yes"),
            ("UNRELATED", "x"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let cfg = config_from_vars(&vars);
        assert_eq!(cfg.name.as_deref(), Some("my-plugin"));
        assert_eq!(cfg.skip, Some(vec!["*.map".to_string(), "*.DS_Store".to_string()]));
        assert_eq!(cfg.dry, Some(true));
        assert!(cfg.version.is_none());
    }

    #[test]
    fn cli_beats_file_beats_env() {
        let env = Config {
            name: Some("env".into()),
            version: Some("0.0.1".into()),
            root: Some("env-root".into()),
            ..Config::default()
        };
        let file = Config {
            name: Some("file".into()),
            version: Some("0.0.2".into()),
            ..Config::default()
        };
        let cli = Config {
            name: Some("cli".into()),
            ..Config::default()
        };

        let merged = merge_configs(env, file, cli);
        assert_eq!(merged.name.as_deref(), Some("cli"));
        assert_eq!(merged.version.as_deref(), Some("0.0.2"));
        assert_eq!(merged.root.as_deref(), Some("env-root"));
    }

    #[test]
    fn unset_cli_flags_do_not_override() {
        let cfg = cli_to_config(&Cli::default());
        assert_eq!(cfg, Config::default());
    }

    #[test]
    fn reads_yaml_and_json_files() {
        let tmp = TempDir::new().unwrap();
        let yaml = tmp.path().join("plugzip.yaml");
        fs::write(&yaml, "name: yaml-plugin\ncopy_dirs: [includes]\n").unwrap();
        let json = tmp.path().join("plugzip.json");
        fs::write(&json, r#"{"version": "3.0.0", "verify": true}"#).unwrap();

        let from_yaml = read_config_file(yaml.to_str().unwrap()).unwrap();
        assert_eq!(from_yaml.name.as_deref(), Some("yaml-plugin"));
        assert_eq!(from_yaml.copy_dirs, Some(vec!["includes".to_string()]));

        let from_json = read_config_file(json.to_str().unwrap()).unwrap();
        assert_eq!(from_json.version.as_deref(), Some("3.0.0"));
        assert_eq!(from_json.verify, Some(true));
    }

    #[test]
    fn mode_comes_from_flags_env_and_file() {
        let cli = Cli::try_parse_from(["plugzip", "--no-components"]).unwrap();
        assert_eq!(cli_to_config(&cli).mode, Some(PackageMode::Preserve));

        let cli = Cli::try_parse_from(["plugzip", "--per-component"]).unwrap();
        assert_eq!(cli_to_config(&cli).mode, Some(PackageMode::PerComponent));

        assert!(Cli::try_parse_from(["plugzip", "--empty", "--preserve"]).is_err());

        let vars: HashMap<String, String> =
            [("PLUGZIP_MODE".to_string(), "empty".to_string())].into();
        let env = config_from_vars(&vars);
        assert_eq!(env.mode, Some(PackageMode::Empty));

        let file = Config {
            mode: Some(PackageMode::Preserve),
            component_build_dir: Some("dist/blocks".into()),
            ..Config::default()
        };
        let merged = merge_configs(env, file, Config::default());
        assert_eq!(merged.mode, Some(PackageMode::Preserve));
        assert_eq!(merged.component_build_dir.as_deref(), Some("dist/blocks"));
    }

    #[test]
    fn failures_map_to_nonzero_status_with_context_chain() {
        assert_eq!(exit_status(Ok(())), 0);

        let err = anyhow::anyhow!("required file \"x.php\" not found").context("staging files");
        let banner = failure_banner(&err);
        assert!(banner.contains("❌ Error creating ZIP: staging files"));
        assert!(banner.contains("required file"));
        assert_eq!(exit_status(Err(err)), 1);
    }

    #[test]
    fn cli_parses_repeated_flags() {
        let cli = Cli::try_parse_from([
            "plugzip",
            "--package-version",
            "1.2.3",
            "-b",
            "card",
            "--component",
            "chart",
            "--dry",
        ])
        .unwrap();
        let cfg = cli_to_config(&cli);
        assert_eq!(cfg.version.as_deref(), Some("1.2.3"));
        assert_eq!(cfg.components, Some(vec!["card".to_string(), "chart".to_string()]));
        assert_eq!(cfg.dry, Some(true));
    }
}
