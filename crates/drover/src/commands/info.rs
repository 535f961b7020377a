//! Info command: show package, config, and discovered module information.

use camino::Utf8Path;
use clap::Args;
use owo_colors::OwoColorize;
use serde::Serialize;
use tracing::{debug, instrument, warn};

use drover_core::config::Config;
use drover_core::module::{Module, ModuleFilter, Project};

/// Arguments for the `info` subcommand.
#[derive(Args, Debug, Default)]
pub struct InfoArgs {
    // No subcommand-specific arguments; uses global --json flag
}

#[derive(Serialize)]
struct PackageInfo {
    name: &'static str,
    version: &'static str,
    #[serde(skip_serializing_if = "str::is_empty")]
    description: &'static str,
    #[serde(skip_serializing_if = "str::is_empty")]
    repository: &'static str,
    #[serde(skip_serializing_if = "str::is_empty")]
    homepage: &'static str,
    #[serde(skip_serializing_if = "str::is_empty")]
    license: &'static str,
}

impl PackageInfo {
    const fn new() -> Self {
        Self {
            name: env!("CARGO_PKG_NAME"),
            version: env!("CARGO_PKG_VERSION"),
            description: env!("CARGO_PKG_DESCRIPTION"),
            repository: env!("CARGO_PKG_REPOSITORY"),
            homepage: env!("CARGO_PKG_HOMEPAGE"),
            license: env!("CARGO_PKG_LICENSE"),
        }
    }
}

#[derive(Serialize)]
struct ConfigInfo {
    /// Merged files, lowest precedence first.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    config_files: Vec<String>,
    log_level: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    log_dir: Option<String>,
    package: String,
    remote: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    release_path: Option<String>,
}

impl ConfigInfo {
    fn from_config(config: &Config) -> Self {
        Self {
            config_files: config.sources.iter().map(ToString::to_string).collect(),
            log_level: config.log_level.as_str().to_string(),
            log_dir: config.log_dir.as_ref().map(|p| p.to_string()),
            package: config.package(),
            remote: config.remote(),
            release_path: config.release_path().map(|p| p.to_string()),
        }
    }
}

#[derive(Serialize)]
struct ModuleInfo {
    name: String,
    directory: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    package: Option<String>,
    /// Whether the root requires this module as `self.version`.
    release: bool,
    translatable: bool,
}

#[derive(Serialize)]
struct ProjectInfo {
    directory: String,
    modules: Vec<ModuleInfo>,
}

impl ProjectInfo {
    /// Describe the project in `dir`, if there is one.
    fn discover(dir: &Utf8Path, config: &Config) -> Option<Self> {
        if !Project::exists_in(dir) {
            return None;
        }
        let project = match Project::open(dir, &config.project_layout()) {
            Ok(project) => project,
            Err(e) => {
                warn!(error = %e, "could not open project");
                return None;
            }
        };
        let released: Vec<&str> = project
            .discover_modules(&ModuleFilter::default())
            .map(|modules| modules.iter().map(|m| m.name()).collect())
            .unwrap_or_default();

        let modules = std::iter::once(project.root())
            .chain(project.children())
            .map(|module| ModuleInfo::new(module, released.contains(&module.name())))
            .collect();

        Some(Self {
            directory: dir.to_string(),
            modules,
        })
    }
}

impl ModuleInfo {
    fn new(module: &Module, release: bool) -> Self {
        Self {
            name: module.name().to_string(),
            directory: module.directory().to_string(),
            package: module.package_name().ok().flatten(),
            release,
            translatable: module.is_translatable(),
        }
    }
}

#[derive(Serialize)]
struct FullInfo {
    #[serde(flatten)]
    package: PackageInfo,
    config: ConfigInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    project: Option<ProjectInfo>,
}

/// Print package information.
///
/// # Arguments
/// * `global_json` - Global `--json` flag from CLI
/// * `config` - Loaded configuration
/// * `cwd` - Current working directory for config discovery and module listing
#[instrument(name = "cmd_info", skip_all, fields(json_output))]
pub fn cmd_info(
    _args: InfoArgs,
    global_json: bool,
    config: &Config,
    cwd: &Utf8Path,
) -> anyhow::Result<()> {
    debug!(json_output = global_json, "executing info command");

    let full_info = FullInfo {
        package: PackageInfo::new(),
        config: ConfigInfo::from_config(config),
        project: ProjectInfo::discover(cwd, config),
    };

    if global_json {
        println!("{}", serde_json::to_string_pretty(&full_info)?);
        return Ok(());
    }

    let package = &full_info.package;
    println!("{} {}", package.name.bold(), package.version.green());
    if !package.description.is_empty() {
        println!("{}", package.description);
    }
    if !package.license.is_empty() {
        println!("{}: {}", "License".dimmed(), package.license);
    }
    if !package.repository.is_empty() {
        println!("{}: {}", "Repository".dimmed(), package.repository.cyan());
    }

    println!();
    println!("{}", "Configuration".bold().underline());
    if full_info.config.config_files.is_empty() {
        println!("{}: {}", "Config files".dimmed(), "none loaded".yellow());
    }
    for path in &full_info.config.config_files {
        println!("{}: {}", "Config file".dimmed(), path.cyan());
    }
    println!("{}: {}", "Log level".dimmed(), full_info.config.log_level);
    if let Some(dir) = &full_info.config.log_dir {
        println!("{}: {}", "Log directory".dimmed(), dir);
    }
    println!("{}: {}", "Package".dimmed(), full_info.config.package.cyan());
    println!("{}: {}", "Remote".dimmed(), full_info.config.remote.cyan());
    if let Some(path) = &full_info.config.release_path {
        println!("{}: {}", "Release path".dimmed(), path.cyan());
    }

    println!();
    println!("{}", "Modules".bold().underline());
    match &full_info.project {
        Some(project) => {
            for module in &project.modules {
                let marker = if module.release {
                    "●".green().to_string()
                } else {
                    "○".dimmed().to_string()
                };
                let translatable = if module.translatable {
                    " (translatable)".dimmed().to_string()
                } else {
                    String::new()
                };
                println!(
                    "  {marker} {} {}{translatable}",
                    module.name.bold(),
                    module.package.as_deref().unwrap_or("").dimmed()
                );
            }
        }
        None => println!(
            "  {} {}",
            "○".yellow(),
            "No project in the current directory".yellow()
        ),
    }

    Ok(())
}
