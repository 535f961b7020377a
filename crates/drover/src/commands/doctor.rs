//! Doctor command: diagnose external tools, configuration and environment.

use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use inquire::Confirm;
use owo_colors::OwoColorize;
use serde::Serialize;
use tracing::{debug, instrument};

use drover_core::config::{self, Config};
use drover_core::steps::TX_BINARY;
use drover_core::tools;

/// Arguments for the `doctor` subcommand.
#[derive(Args, Debug, Default)]
pub struct DoctorArgs {
    // No subcommand-specific arguments; uses global --json flag
}

#[derive(Serialize)]
struct DoctorReport {
    tools: Vec<ToolStatus>,
    directories: DirectoryPaths,
    config: ConfigStatus,
    environment: EnvironmentInfo,
}

#[derive(Serialize)]
struct ToolStatus {
    name: String,
    purpose: &'static str,
    found: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    version: Option<String>,
    /// Set when the tool is present but older than required.
    #[serde(skip_serializing_if = "Option::is_none")]
    problem: Option<String>,
}

#[derive(Serialize)]
struct DirectoryPaths {
    config: Option<String>,
    cache: Option<String>,
    data: Option<String>,
    data_local: Option<String>,
}

#[derive(Serialize)]
struct ConfigStatus {
    /// Merged files, lowest precedence first.
    files: Vec<String>,
    found: bool,
}

#[derive(Serialize)]
struct EnvironmentInfo {
    /// Current working directory
    cwd: Option<String>,
    /// Relevant environment variables
    env_vars: Vec<EnvVar>,
}

#[derive(Serialize)]
struct EnvVar {
    name: &'static str,
    value: Option<String>,
    description: &'static str,
}

/// Binary, version flag and what drover uses it for.
///
/// `zip` has no flag that prints only its version.
fn tool_table(config: &Config) -> Vec<(String, Option<&'static str>, &'static str)> {
    vec![
        ("git".to_string(), Some("--version"), "branches, tags, merges, pushes"),
        (config.composer_command(), Some("--version"), "project install, archives"),
        (TX_BINARY.to_string(), Some("--version"), "translation sync"),
        ("gh".to_string(), Some("--version"), "module GitHub releases"),
        ("aws".to_string(), Some("--version"), "archive upload"),
        ("tar".to_string(), Some("--version"), "archive packing"),
        ("zip".to_string(), None, "archive packing"),
    ]
}

fn check_tool(
    name: String,
    flag: Option<&str>,
    purpose: &'static str,
    config: &Config,
) -> ToolStatus {
    if !tools::has_binary(&name) {
        return ToolStatus {
            name,
            purpose,
            found: false,
            version: None,
            problem: None,
        };
    }
    let version = flag
        .and_then(|flag| tools::run(&name, &[flag], None).ok())
        .and_then(|output| tools::parse_version_from_output(&output));

    let mut problem = None;
    if name == TX_BINARY {
        match (config.translation_min_version(), &version) {
            (Ok(minimum), Some(found)) if *found < minimum => {
                problem = Some(format!("{minimum} or later is required"));
            }
            (Err(e), _) => problem = Some(e.to_string()),
            _ => {}
        }
    }
    debug!(tool = %name, ?version, "checked tool");

    ToolStatus {
        name,
        purpose,
        found: true,
        version: version.map(|v| v.to_string()),
        problem,
    }
}

impl DoctorReport {
    fn gather(config: &Config, cwd: &camino::Utf8Path) -> Self {
        Self {
            tools: tool_table(config)
                .into_iter()
                .map(|(name, flag, purpose)| check_tool(name, flag, purpose, config))
                .collect(),
            directories: DirectoryPaths {
                config: config::user_config_dir().map(|p| p.to_string()),
                cache: config::user_cache_dir().map(|p| p.to_string()),
                data: config::user_data_dir().map(|p| p.to_string()),
                data_local: config::user_data_local_dir().map(|p| p.to_string()),
            },
            config: ConfigStatus {
                found: !config.sources.is_empty(),
                files: config.sources.iter().map(ToString::to_string).collect(),
            },
            environment: EnvironmentInfo {
                cwd: Some(cwd.to_string()),
                env_vars: vec![
                    EnvVar {
                        name: "XDG_CONFIG_HOME",
                        value: std::env::var("XDG_CONFIG_HOME").ok(),
                        description: "Override config directory",
                    },
                    EnvVar {
                        name: "DROVER_RELEASE_PATH",
                        value: std::env::var("DROVER_RELEASE_PATH").ok(),
                        description: "Base directory for release checkouts",
                    },
                    EnvVar {
                        name: "DROVER_LOG_DIR",
                        value: std::env::var("DROVER_LOG_DIR").ok(),
                        description: "Log directory",
                    },
                    EnvVar {
                        name: "RUST_LOG",
                        value: std::env::var("RUST_LOG").ok(),
                        description: "Log filter directive",
                    },
                ],
            },
        }
    }
}

/// Run diagnostics and report tool availability and configuration status.
#[instrument(name = "cmd_doctor", skip_all)]
pub fn cmd_doctor(
    _args: DoctorArgs,
    global_json: bool,
    config: &Config,
    cwd: &camino::Utf8Path,
) -> anyhow::Result<()> {
    debug!(json_output = global_json, "executing doctor command");

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.cyan} {msg}")
            .expect("valid template"),
    );
    spinner.set_message("Gathering diagnostics...");
    spinner.enable_steady_tick(std::time::Duration::from_millis(80));

    let report = DoctorReport::gather(config, cwd);
    spinner.finish_and_clear();

    if global_json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("{}", "Tools".bold().underline());
    for tool in &report.tools {
        let version = tool.version.as_deref().unwrap_or("unknown version");
        match (tool.found, &tool.problem) {
            (false, _) => println!(
                "  {} {} {}",
                "✗".red(),
                tool.name.bold(),
                format!("not found ({})", tool.purpose).dimmed()
            ),
            (true, Some(problem)) => println!(
                "  {} {} {} {}",
                "!".yellow(),
                tool.name.bold(),
                version,
                problem.yellow()
            ),
            (true, None) => println!(
                "  {} {} {}",
                "✓".green(),
                tool.name.bold(),
                version.dimmed()
            ),
        }
    }
    println!();

    println!("{}", "Configuration".bold().underline());
    if report.config.found {
        for file in &report.config.files {
            println!("  {} Config file: {}", "✓".green(), file.cyan());
        }
    } else {
        println!("  {} No config file found", "○".yellow());
        offer_config_creation()?;
    }
    println!();

    println!("{}", "Directories".bold().underline());
    print_dir("  Config", &report.directories.config);
    print_dir("  Cache", &report.directories.cache);
    print_dir("  Data", &report.directories.data);
    print_dir("  Data (local)", &report.directories.data_local);
    println!();

    println!("{}", "Environment".bold().underline());
    println!("  {}: {}", "Working directory".dimmed(), cwd.cyan());
    let set_vars: Vec<_> = report
        .environment
        .env_vars
        .iter()
        .filter(|v| v.value.is_some())
        .collect();
    if set_vars.is_empty() {
        println!("  {} No overrides set", "○".dimmed());
    } else {
        for var in set_vars {
            println!(
                "  {}: {}",
                var.name.dimmed(),
                var.value.as_deref().unwrap_or("").cyan()
            );
        }
    }

    Ok(())
}

fn print_dir(label: &str, path: &Option<String>) {
    print!("{}: ", label.dimmed());
    match path {
        Some(p) => println!("{}", p.cyan()),
        None => println!("{}", "(unavailable)".yellow()),
    }
}

/// Offer to create a default config file when none exists.
fn offer_config_creation() -> anyhow::Result<()> {
    let Some(config_dir) = config::user_config_dir() else {
        return Ok(());
    };
    let config_path = config_dir.join("config.yaml");

    if !std::io::IsTerminal::is_terminal(&std::io::stdin()) {
        return Ok(());
    }

    let create = Confirm::new("Create a default config file?")
        .with_default(false)
        .with_help_message(&format!("Will create {config_path}"))
        .prompt();

    if let Ok(true) = create {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let yaml = serde_saphyr::to_string(&Config::default())?;
        std::fs::write(&config_path, yaml)?;
        println!("  {} Created {}", "✓".green(), config_path.cyan());
    }

    Ok(())
}
