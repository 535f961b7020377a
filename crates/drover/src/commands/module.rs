//! Module commands: translations and single-module GitHub releases.

use std::cell::RefCell;

use anyhow::{Context, anyhow};
use camino::{Utf8Path, Utf8PathBuf};
use clap::Args;
use inquire::Confirm;
use owo_colors::OwoColorize;
use tracing::{debug, instrument};

use drover_core::config::Config;
use drover_core::steps::{self, ModuleTagOptions, StepError, TranslationOptions};

use super::{Reporter, TargetArgs, is_interactive, open_project, parse_version, print_json};

/// GitHub CLI binary.
const GH_BINARY: &str = "gh";

/// Arguments for `module:translate`.
#[derive(Args, Debug, Default)]
pub struct TranslateArgs {
    /// Push translated modules afterwards
    #[arg(long)]
    pub push: bool,

    #[command(flatten)]
    pub target: TargetArgs,
}

/// Arguments for `module:tag`.
#[derive(Args, Debug, Default)]
pub struct TagArgs {
    /// Module to release
    pub module: String,

    /// Version tag
    pub version: String,

    /// Version to build the release notes from (defaults to the prior version)
    #[arg(short, long, value_name = "VERSION")]
    pub from: Option<String>,

    /// Project directory
    #[arg(short, long, value_name = "DIR")]
    pub directory: Option<Utf8PathBuf>,

    /// Release title shown on GitHub (defaults to the version)
    #[arg(short, long)]
    pub message: Option<String>,

    /// Publish without reviewing the release notes
    #[arg(short, long)]
    pub yes: bool,
}

/// Execute `module:translate`.
#[instrument(name = "cmd_module_translate", skip_all)]
pub fn cmd_translate(
    args: TranslateArgs,
    global_json: bool,
    config: &Config,
    cwd: &Utf8Path,
) -> anyhow::Result<()> {
    let project = open_project(&args.target.directory_or_cwd(cwd), config)?;
    let filter = args.target.filter();
    let modules = project.discover_modules(&filter)?;
    let options = TranslationOptions::from_config(config).context("invalid configuration")?;

    let mut reporter = Reporter::new(global_json);
    let mut reports = vec![
        steps::update_translations(
            &project,
            &modules,
            filter.is_explicit(),
            &options,
            &mut |event| reporter.handle(event),
        )
        .context("translation failed")?,
    ];
    if args.push {
        let translatable: Vec<_> = modules
            .iter()
            .copied()
            .filter(|m| m.is_translatable())
            .collect();
        reports.push(
            steps::push_branch(&translatable, &config.remote(), &mut |event| {
                reporter.handle(event)
            })
            .context("push failed")?,
        );
    }
    drop(reporter);

    if global_json {
        print_json(&reports)?;
    }
    Ok(())
}

/// Execute `module:tag`.
#[instrument(name = "cmd_module_tag", skip_all, fields(module = %args.module, version = %args.version))]
pub fn cmd_tag(
    args: TagArgs,
    global_json: bool,
    config: &Config,
    cwd: &Utf8Path,
) -> anyhow::Result<()> {
    let version = parse_version(&args.version)?;
    let from = match args.from.as_deref() {
        Some(from) => parse_version(from)?,
        None => version
            .prior_version()
            .context("cannot derive a version to build release notes from; pass --from")?,
    };
    let directory = TargetArgs {
        directory: args.directory,
        ..TargetArgs::default()
    }
    .directory_or_cwd(cwd);
    let project = open_project(&directory, config)?;
    let module = project
        .resolve_module(&args.module)
        .ok_or_else(|| anyhow!("module {} not found in {directory}", args.module))?;

    let options = ModuleTagOptions {
        version,
        from,
        message: args.message,
        remote: config.remote(),
        template: config.module_line_template(),
        gh: GH_BINARY.to_string(),
    };
    let review = !args.yes && is_interactive(global_json);
    debug!(review, "executing module tag command");

    let reporter = RefCell::new(Reporter::new(global_json));
    let result = steps::tag_annotated_module(
        module,
        &options,
        &mut |notes| !review || reporter.borrow().suspend(|| confirm_notes(notes)),
        &mut |event| reporter.borrow_mut().handle(event),
    );
    drop(reporter);

    let release = match result {
        Ok(release) => release,
        Err(StepError::Cancelled { .. }) => {
            println!("{}", "Release cancelled.".yellow());
            return Ok(());
        }
        Err(e) => return Err(e).context("module release failed"),
    };

    if global_json {
        print_json(&release)?;
    } else {
        println!(
            "\n{} Released {} {}",
            "✓".green().bold(),
            release.repository.cyan(),
            release.tag.green().bold()
        );
        if let Some(url) = &release.url {
            println!("  {}", url.dimmed());
        }
    }
    Ok(())
}

/// Show the release notes and ask whether to publish them.
fn confirm_notes(notes: &str) -> bool {
    println!("\n{}", "Release notes".bold().underline());
    if notes.trim().is_empty() {
        println!("  {}", "(no categorised changes)".dimmed());
    } else {
        print!("{notes}");
    }
    println!();
    Confirm::new("Publish this release?")
        .with_default(true)
        .prompt()
        .unwrap_or(false)
}
