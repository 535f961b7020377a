//! Branch commands: checkout, merge and push across a set of modules.

use std::cell::RefCell;

use anyhow::{Context, bail};
use clap::Args;
use inquire::Select;
use owo_colors::OwoColorize;
use tracing::{debug, instrument};

use drover_core::config::Config;
use drover_core::steps::{self, ConflictResolution, MergeConflict, MergeOptions, StepError};

use super::{Reporter, TargetArgs, is_interactive, open_project, print_json};

/// Arguments for `branch:checkout`.
#[derive(Args, Debug, Default)]
pub struct CheckoutArgs {
    /// Branch to check out
    pub branch: String,

    /// Remote to fetch from (defaults to the configured remote)
    #[arg(short, long)]
    pub remote: Option<String>,

    #[command(flatten)]
    pub target: TargetArgs,
}

/// Arguments for `branch:merge`.
#[derive(Args, Debug, Default)]
pub struct MergeArgs {
    /// Branch to merge from
    pub from: String,

    /// Branch to merge into
    pub to: String,

    /// Remote to fetch from and push to (defaults to the configured remote)
    #[arg(short, long)]
    pub remote: Option<String>,

    /// Push every module that merged cleanly
    #[arg(long)]
    pub push: bool,

    /// Never prompt; conflicted modules are left for manual resolution
    #[arg(short = 'n', long)]
    pub no_interaction: bool,

    #[command(flatten)]
    pub target: TargetArgs,
}

/// Arguments for `branch:push`.
#[derive(Args, Debug, Default)]
pub struct PushArgs {
    /// Remote to push to (defaults to the configured remote)
    #[arg(short, long)]
    pub remote: Option<String>,

    #[command(flatten)]
    pub target: TargetArgs,
}

/// Execute `branch:checkout`.
///
/// Every module under the directory is considered, whether or not the root
/// tracks it as `self.version`.
#[instrument(name = "cmd_branch_checkout", skip_all, fields(branch = %args.branch))]
pub fn cmd_checkout(
    args: CheckoutArgs,
    global_json: bool,
    config: &Config,
    cwd: &camino::Utf8Path,
) -> anyhow::Result<()> {
    let project = open_project(&args.target.directory_or_cwd(cwd), config)?;
    let filter = args.target.filter().without_self_version_check();
    let modules = project.discover_modules(&filter)?;
    let remote = args.remote.unwrap_or_else(|| config.remote());

    let mut reporter = Reporter::new(global_json);
    let report = steps::checkout_branch(&modules, &args.branch, &remote, &mut |event| {
        reporter.handle(event)
    })
    .context("checkout failed")?;
    drop(reporter);

    if global_json {
        print_json(&report)?;
    }
    Ok(())
}

/// Execute `branch:merge`.
///
/// Fails once the run is over if any module still needs manual resolution.
#[instrument(name = "cmd_branch_merge", skip_all, fields(from = %args.from, to = %args.to))]
pub fn cmd_merge(
    args: MergeArgs,
    global_json: bool,
    config: &Config,
    cwd: &camino::Utf8Path,
) -> anyhow::Result<()> {
    let project = open_project(&args.target.directory_or_cwd(cwd), config)?;
    let modules = project.discover_modules(&args.target.filter())?;
    let options = MergeOptions {
        from: args.from,
        to: args.to,
        remote: args.remote.unwrap_or_else(|| config.remote()),
        push: args.push,
    };
    let interactive = !args.no_interaction && is_interactive(global_json);
    debug!(interactive, push = options.push, "executing merge command");

    let reporter = RefCell::new(Reporter::new(global_json));
    let result = steps::merge_branch(
        &modules,
        &options,
        &mut |conflict| {
            if interactive {
                reporter.borrow().suspend(|| prompt_conflict(conflict))
            } else {
                ConflictResolution::Skip
            }
        },
        &mut |event| reporter.borrow_mut().handle(event),
    );
    drop(reporter);

    let report = match result {
        Ok(report) => report,
        Err(StepError::Aborted { conflicts, .. }) => {
            if !global_json {
                print_conflicts(&conflicts);
            }
            bail!("merge aborted with {} module(s) unresolved", conflicts.len());
        }
        Err(e) => return Err(e).context("merge failed"),
    };

    if global_json {
        print_json(&report)?;
    } else {
        println!(
            "\n{} {} merged, {} pushed",
            "Merge".bold(),
            report.merged.len().to_string().green(),
            report.pushed.len().to_string().green()
        );
        print_conflicts(&report.conflicts);
    }

    if report.needs_resolution() {
        bail!(
            "{} module(s) need manual conflict resolution",
            report.conflicts.len()
        );
    }
    Ok(())
}

/// Execute `branch:push`.
#[instrument(name = "cmd_branch_push", skip_all)]
pub fn cmd_push(
    args: PushArgs,
    global_json: bool,
    config: &Config,
    cwd: &camino::Utf8Path,
) -> anyhow::Result<()> {
    let project = open_project(&args.target.directory_or_cwd(cwd), config)?;
    let modules = project.discover_modules(&args.target.filter())?;
    let remote = args.remote.unwrap_or_else(|| config.remote());

    let mut reporter = Reporter::new(global_json);
    let report = steps::push_branch(&modules, &remote, &mut |event| reporter.handle(event))
        .context("push failed")?;
    drop(reporter);

    if global_json {
        print_json(&report)?;
    }
    Ok(())
}

fn print_conflicts(conflicts: &[MergeConflict]) {
    if conflicts.is_empty() {
        return;
    }
    println!("\n{}", "Manual resolution required".yellow().bold().underline());
    for conflict in conflicts {
        println!("  {} ({})", conflict.module.cyan(), conflict.directory.dimmed());
        for path in &conflict.paths {
            println!("    {} {path}", "✗".red());
        }
    }
}

/// Ask how to handle one conflicted module.
///
/// An interrupted prompt aborts the run.
fn prompt_conflict(conflict: &MergeConflict) -> ConflictResolution {
    println!(
        "\n{} {} has conflicts in {}:",
        "!".yellow().bold(),
        conflict.module.cyan().bold(),
        conflict.directory
    );
    for path in &conflict.paths {
        println!("    {path}");
    }

    let options = vec![
        "Continue (resolved and committed)",
        "Skip this module",
        "Abort the merge",
    ];
    match Select::new("How should this module be handled?", options).prompt() {
        Ok(choice) if choice.starts_with("Continue") => ConflictResolution::Continue,
        Ok(choice) if choice.starts_with("Skip") => ConflictResolution::Skip,
        _ => ConflictResolution::Abort,
    }
}
