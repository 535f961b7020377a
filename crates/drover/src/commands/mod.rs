//! Command implementations

pub mod branch;

pub mod doctor;

pub mod info;

pub mod module;

pub mod release;

use std::io::IsTerminal;

use anyhow::Context;
use camino::{Utf8Path, Utf8PathBuf};
use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;
use serde::Serialize;

use drover_core::config::Config;
use drover_core::module::{ModuleFilter, Project};
use drover_core::steps::{StepEvent, StepOutcome};
use drover_core::version::ReleaseVersion;

/// Module selection shared by every multi-module command.
#[derive(Args, Debug, Clone, Default)]
pub struct TargetArgs {
    /// Modules to include (all release modules when omitted)
    #[arg(value_name = "MODULE")]
    pub modules: Vec<String>,

    /// Treat the module list as exclusions instead
    #[arg(short, long)]
    pub exclude: bool,

    /// Project directory
    #[arg(short, long, value_name = "DIR")]
    pub directory: Option<Utf8PathBuf>,
}

impl TargetArgs {
    /// The module filter these arguments describe.
    pub fn filter(&self) -> ModuleFilter {
        ModuleFilter::new(self.modules.clone(), self.exclude)
    }

    /// The `--directory` value resolved against `cwd`, or `cwd` itself.
    pub fn directory_or_cwd(&self, cwd: &Utf8Path) -> Utf8PathBuf {
        resolve_directory(self.directory.as_deref(), cwd)
    }

    /// The `--directory` value, or the configured release checkout.
    pub fn release_directory(
        &self,
        config: &Config,
        version: &ReleaseVersion,
        cwd: &Utf8Path,
    ) -> Utf8PathBuf {
        match &self.directory {
            Some(dir) => resolve_directory(Some(dir.as_path()), cwd),
            None => config.release_directory(version, cwd),
        }
    }
}

fn resolve_directory(directory: Option<&Utf8Path>, cwd: &Utf8Path) -> Utf8PathBuf {
    match directory {
        Some(dir) if dir.is_absolute() => dir.to_path_buf(),
        Some(dir) => cwd.join(dir),
        None => cwd.to_path_buf(),
    }
}

/// Parse a version argument.
pub fn parse_version(text: &str) -> anyhow::Result<ReleaseVersion> {
    ReleaseVersion::parse(text).with_context(|| format!("invalid version {text:?}"))
}

/// Open the installer project in `directory`.
pub fn open_project(directory: &Utf8Path, config: &Config) -> anyhow::Result<Project> {
    Project::open(directory, &config.project_layout())
        .with_context(|| format!("failed to open project in {directory}"))
}

/// Whether prompts can be shown.
pub fn is_interactive(global_json: bool) -> bool {
    !global_json && std::io::stdin().is_terminal()
}

/// Pretty-print `value` as JSON on stdout.
pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

// ──────────────────────────────────────────────
// Progress rendering
// ──────────────────────────────────────────────

/// Renders step events as terminal progress.
///
/// Silent in JSON mode, where the final report carries the same data.
pub struct Reporter {
    json: bool,
    spinner: Option<ProgressBar>,
}

impl Reporter {
    /// A reporter for the given output mode.
    pub const fn new(json: bool) -> Self {
        Self {
            json,
            spinner: None,
        }
    }

    /// Render one event.
    pub fn handle(&mut self, event: StepEvent) {
        if self.json {
            return;
        }
        match event {
            StepEvent::Started(step) => {
                let spinner = ProgressBar::new_spinner();
                spinner.set_style(
                    ProgressStyle::with_template("  {spinner:.cyan} {msg}")
                        .expect("valid template")
                        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "✓"]),
                );
                spinner.set_message(format!("{step}..."));
                spinner.enable_steady_tick(std::time::Duration::from_millis(80));
                self.spinner = Some(spinner);
            }
            StepEvent::Module {
                step,
                module,
                message,
            } => self.line(format!(
                "    {} {} {}",
                format!("[{step}]").dimmed(),
                module.cyan(),
                message
            )),
            StepEvent::Warning {
                step,
                module,
                message,
            } => {
                let subject = module.map(|m| format!("{m}: ")).unwrap_or_default();
                self.line(format!(
                    "    {} {} {subject}{message}",
                    "!".yellow().bold(),
                    format!("[{step}]").yellow(),
                ));
            }
            StepEvent::Completed(step, outcome) => {
                if let Some(spinner) = self.spinner.take() {
                    spinner.finish_and_clear();
                }
                match outcome {
                    StepOutcome::Success { message } => println!(
                        "  {} {} {}",
                        "✓".green(),
                        step.to_string().bold(),
                        message.dimmed(),
                    ),
                    StepOutcome::Skipped { reason } => println!(
                        "  {} {} {}",
                        "–".yellow(),
                        step.to_string().bold(),
                        format!("skipped: {reason}").dimmed(),
                    ),
                }
            }
        }
    }

    /// Run `f` with the spinner hidden, e.g. around a prompt.
    pub fn suspend<R>(&self, f: impl FnOnce() -> R) -> R {
        match &self.spinner {
            Some(spinner) => spinner.suspend(f),
            None => f(),
        }
    }

    fn line(&self, text: String) {
        match &self.spinner {
            Some(spinner) => spinner.suspend(|| println!("{text}")),
            None => println!("{text}"),
        }
    }
}

impl Drop for Reporter {
    fn drop(&mut self) {
        if let Some(spinner) = self.spinner.take() {
            spinner.finish_and_clear();
        }
    }
}
