//! Release commands: thin CLI layer over `drover_core::steps`.

use anyhow::Context;
use camino::{Utf8Path, Utf8PathBuf};
use clap::Args;
use owo_colors::OwoColorize;
use serde::Serialize;
use tracing::{debug, instrument};

use drover_core::changelog::{ChangelogFormat, ChangelogReport};
use drover_core::config::Config;
use drover_core::module::Project;
use drover_core::steps::{
    self, ArchiveOptions, ReleaseSettings, StepReport, TranslationOptions, UploadOptions,
};
use drover_core::version::ReleaseVersion;

use super::{Reporter, TargetArgs, open_project, parse_version, print_json};

/// Version plus module selection.
#[derive(Args, Debug, Default)]
pub struct VersionArgs {
    /// Version being released (e.g. "4.1.0" or "4.1.0-rc1")
    pub version: String,

    #[command(flatten)]
    pub target: TargetArgs,
}

/// Arguments for `release`.
#[derive(Args, Debug, Default)]
pub struct ReleaseArgs {
    /// Version being released
    pub version: String,

    /// Version to build the changelog from (defaults to the prior version)
    #[arg(short, long, value_name = "VERSION")]
    pub from: Option<String>,

    /// Branch to create or switch to in every module
    #[arg(short, long)]
    pub branch: Option<String>,

    /// Do not run the test suite
    #[arg(long)]
    pub skip_tests: bool,

    /// Changelog layout
    #[arg(long, value_enum, default_value_t)]
    pub format: ChangelogFormat,

    /// Write the changelog to FILE instead of stdout
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<Utf8PathBuf>,

    #[command(flatten)]
    pub target: TargetArgs,
}

/// Arguments for `release:create`.
#[derive(Args, Debug, Default)]
pub struct CreateArgs {
    /// Version being released
    pub version: String,

    /// Directory to install into
    #[arg(short, long, value_name = "DIR")]
    pub directory: Option<Utf8PathBuf>,
}

/// Arguments for `release:branch`.
#[derive(Args, Debug, Default)]
pub struct BranchArgs {
    /// Version being released
    pub version: String,

    /// Branch to create or switch to
    pub branch: String,

    #[command(flatten)]
    pub target: TargetArgs,
}

/// Arguments for `release:test`.
#[derive(Args, Debug, Default)]
pub struct TestArgs {
    /// Version being released
    pub version: String,

    /// Project directory
    #[arg(short, long, value_name = "DIR")]
    pub directory: Option<Utf8PathBuf>,

    /// Test command to run instead of the configured one
    #[arg(long, value_name = "CMD")]
    pub command: Option<String>,
}

/// Arguments for `release:changelog`.
#[derive(Args, Debug, Default)]
pub struct ChangelogArgs {
    /// Version being released
    pub version: String,

    /// Version to build the changelog from (defaults to the prior version)
    #[arg(short, long, value_name = "VERSION")]
    pub from: Option<String>,

    /// Changelog layout
    #[arg(long, value_enum, default_value_t)]
    pub format: ChangelogFormat,

    /// Write the changelog to FILE instead of stdout
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<Utf8PathBuf>,

    #[command(flatten)]
    pub target: TargetArgs,
}

/// Arguments for `release:publish`.
#[derive(Args, Debug, Default)]
pub struct PublishArgs {
    /// Version being released
    pub version: String,

    /// AWS profile used for the upload
    #[arg(long, value_name = "PROFILE")]
    pub aws_profile: Option<String>,

    #[command(flatten)]
    pub target: TargetArgs,
}

/// Arguments for `release:upload`.
#[derive(Args, Debug, Default)]
pub struct UploadArgs {
    /// Version being released
    pub version: String,

    /// Directory holding the archives
    #[arg(short, long, value_name = "DIR")]
    pub directory: Option<Utf8PathBuf>,

    /// AWS profile used for the upload
    #[arg(long, value_name = "PROFILE")]
    pub aws_profile: Option<String>,
}

fn release_directory(
    directory: Option<&Utf8Path>,
    config: &Config,
    version: &ReleaseVersion,
    cwd: &Utf8Path,
) -> Utf8PathBuf {
    TargetArgs {
        directory: directory.map(Utf8Path::to_path_buf),
        ..TargetArgs::default()
    }
    .release_directory(config, version, cwd)
}

fn finish_step(report: &StepReport, global_json: bool) -> anyhow::Result<()> {
    if global_json {
        print_json(report)?;
    }
    Ok(())
}

fn emit_changelog(
    report: &ChangelogReport,
    output: Option<&Utf8Path>,
    cwd: &Utf8Path,
) -> anyhow::Result<()> {
    match output {
        Some(path) => {
            let path = if path.is_absolute() {
                path.to_path_buf()
            } else {
                cwd.join(path)
            };
            std::fs::write(&path, &report.markdown)
                .with_context(|| format!("failed to write changelog to {path}"))?;
            println!("  {} Changelog written to {}", "✓".green(), path.cyan());
        }
        None => print!("{}", report.markdown),
    }
    Ok(())
}

/// Execute `release`.
#[instrument(name = "cmd_release", skip_all, fields(version = %args.version))]
pub fn cmd_release(
    args: ReleaseArgs,
    global_json: bool,
    config: &Config,
    cwd: &Utf8Path,
) -> anyhow::Result<()> {
    let version = parse_version(&args.version)?;
    let directory = args.target.release_directory(config, &version, cwd);
    debug!(%directory, json_output = global_json, "executing release command");

    let mut settings = ReleaseSettings::from_config(config, version, directory)
        .context("invalid configuration")?;
    settings.from = args.from.as_deref().map(parse_version).transpose()?;
    settings.branch = args.branch;
    settings.skip_tests = args.skip_tests;
    settings.format = args.format;

    if !global_json {
        println!(
            "\n{}: {} into {}\n",
            "Release".bold(),
            settings.version.to_string().green().bold(),
            settings.directory.cyan()
        );
    }

    let layout = settings.layout.clone();
    let mut reporter = Reporter::new(global_json);
    let outcome = steps::release(
        &settings,
        &args.target.filter(),
        &|dir: &Utf8Path| Project::open(dir, &layout),
        &mut |event| reporter.handle(event),
    )
    .context("release failed")?;
    drop(reporter);

    if global_json {
        print_json(&outcome)?;
    } else {
        println!();
        emit_changelog(&outcome.changelog, args.output.as_deref(), cwd)?;
    }
    Ok(())
}

/// Execute `release:create`.
#[instrument(name = "cmd_release_create", skip_all, fields(version = %args.version))]
pub fn cmd_create(
    args: CreateArgs,
    global_json: bool,
    config: &Config,
    cwd: &Utf8Path,
) -> anyhow::Result<()> {
    let version = parse_version(&args.version)?;
    let directory = release_directory(args.directory.as_deref(), config, &version, cwd);

    let mut reporter = Reporter::new(global_json);
    let report = steps::create_project(
        &directory,
        &version,
        &config.package(),
        &config.composer_command(),
        &mut |event| reporter.handle(event),
    )
    .context("project creation failed")?;
    finish_step(&report, global_json)
}

/// Execute `release:branch`.
#[instrument(name = "cmd_release_branch", skip_all, fields(branch = %args.branch))]
pub fn cmd_branch(
    args: BranchArgs,
    global_json: bool,
    config: &Config,
    cwd: &Utf8Path,
) -> anyhow::Result<()> {
    let version = parse_version(&args.version)?;
    let project = open_project(&args.target.release_directory(config, &version, cwd), config)?;
    let modules = project.discover_modules(&args.target.filter())?;

    let mut reporter = Reporter::new(global_json);
    let report = steps::create_branch(
        &modules,
        Some(args.branch.as_str()),
        &config.remote(),
        &mut |event| reporter.handle(event),
    )
    .context("branching failed")?;
    finish_step(&report, global_json)
}

/// Execute `release:translate`.
#[instrument(name = "cmd_release_translate", skip_all, fields(version = %args.version))]
pub fn cmd_translate(
    args: VersionArgs,
    global_json: bool,
    config: &Config,
    cwd: &Utf8Path,
) -> anyhow::Result<()> {
    let version = parse_version(&args.version)?;
    let project = open_project(&args.target.release_directory(config, &version, cwd), config)?;
    let filter = args.target.filter();
    let modules = project.discover_modules(&filter)?;
    let options = TranslationOptions::from_config(config).context("invalid configuration")?;

    let mut reporter = Reporter::new(global_json);
    let report = steps::update_translations(
        &project,
        &modules,
        filter.is_explicit(),
        &options,
        &mut |event| reporter.handle(event),
    )
    .context("translation failed")?;
    finish_step(&report, global_json)
}

/// Execute `release:test`.
#[instrument(name = "cmd_release_test", skip_all, fields(version = %args.version))]
pub fn cmd_test(
    args: TestArgs,
    global_json: bool,
    config: &Config,
    cwd: &Utf8Path,
) -> anyhow::Result<()> {
    let version = parse_version(&args.version)?;
    let directory = release_directory(args.directory.as_deref(), config, &version, cwd);
    let command = args.command.unwrap_or_else(|| config.test_command());

    let mut reporter = Reporter::new(global_json);
    let report = steps::run_tests(&directory, &command, &mut |event| reporter.handle(event))
        .context("tests failed")?;
    finish_step(&report, global_json)
}

/// Execute `release:changelog`.
#[instrument(name = "cmd_release_changelog", skip_all, fields(version = %args.version))]
pub fn cmd_changelog(
    args: ChangelogArgs,
    global_json: bool,
    config: &Config,
    cwd: &Utf8Path,
) -> anyhow::Result<()> {
    let version = parse_version(&args.version)?;
    let from = match args.from.as_deref() {
        Some(from) => parse_version(from)?,
        None => version
            .prior_version()
            .context("cannot derive a version to build the changelog from; pass --from")?,
    };
    let project = open_project(&args.target.release_directory(config, &version, cwd), config)?;
    let modules = project.discover_modules(&args.target.filter())?;

    let mut reporter = Reporter::new(global_json);
    let report = steps::build_changelog(
        &modules,
        &from,
        &config.remote(),
        &config.line_template(),
        args.format,
        &mut |event| reporter.handle(event),
    )
    .context("changelog generation failed")?;
    drop(reporter);

    if global_json {
        print_json(&report)?;
    } else {
        emit_changelog(&report, args.output.as_deref(), cwd)?;
    }
    Ok(())
}

/// Execute `release:tag`.
#[instrument(name = "cmd_release_tag", skip_all, fields(version = %args.version))]
pub fn cmd_tag(
    args: VersionArgs,
    global_json: bool,
    config: &Config,
    cwd: &Utf8Path,
) -> anyhow::Result<()> {
    let version = parse_version(&args.version)?;
    let project = open_project(&args.target.release_directory(config, &version, cwd), config)?;
    let modules = project.discover_modules(&args.target.filter())?;

    let mut reporter = Reporter::new(global_json);
    let report = steps::tag_modules(&modules, &version, &mut |event| reporter.handle(event))
        .context("tagging failed")?;
    finish_step(&report, global_json)
}

/// Execute `release:push`.
#[instrument(name = "cmd_release_push", skip_all, fields(version = %args.version))]
pub fn cmd_push(
    args: VersionArgs,
    global_json: bool,
    config: &Config,
    cwd: &Utf8Path,
) -> anyhow::Result<()> {
    let version = parse_version(&args.version)?;
    let project = open_project(&args.target.release_directory(config, &version, cwd), config)?;
    let modules = project.discover_modules(&args.target.filter())?;

    let mut reporter = Reporter::new(global_json);
    let report = steps::push_release(&modules, &config.remote(), &mut |event| {
        reporter.handle(event)
    })
    .context("push failed")?;
    finish_step(&report, global_json)
}

#[derive(Serialize)]
struct PublishSummary<'a> {
    version: &'a ReleaseVersion,
    steps: &'a [StepReport],
}

/// Execute `release:publish`.
#[instrument(name = "cmd_release_publish", skip_all, fields(version = %args.version))]
pub fn cmd_publish(
    args: PublishArgs,
    global_json: bool,
    config: &Config,
    cwd: &Utf8Path,
) -> anyhow::Result<()> {
    let version = parse_version(&args.version)?;
    let project = open_project(&args.target.release_directory(config, &version, cwd), config)?;
    let mut upload = UploadOptions::from_config(config);
    if let Some(profile) = args.aws_profile {
        upload = upload.with_profile(profile);
    }

    let mut reporter = Reporter::new(global_json);
    let outcome = steps::publish(
        &project,
        &args.target.filter(),
        &version,
        &config.remote(),
        &upload,
        &mut |event| reporter.handle(event),
    )
    .context("publish failed")?;
    drop(reporter);

    if global_json {
        print_json(&PublishSummary {
            version: &outcome.version,
            steps: &outcome.steps,
        })?;
    } else {
        println!(
            "\n{} Published {}",
            "✓".green().bold(),
            outcome.version.to_string().green().bold()
        );
    }
    Ok(())
}

/// Execute `release:archive`.
#[instrument(name = "cmd_release_archive", skip_all, fields(version = %args.version))]
pub fn cmd_archive(
    args: VersionArgs,
    global_json: bool,
    config: &Config,
    cwd: &Utf8Path,
) -> anyhow::Result<()> {
    let version = parse_version(&args.version)?;
    let directory = args.target.release_directory(config, &version, cwd);
    std::fs::create_dir_all(&directory)
        .with_context(|| format!("failed to create {directory}"))?;

    let mut reporter = Reporter::new(global_json);
    let report = steps::build_archive(
        &directory,
        &version,
        &ArchiveOptions::from_config(config),
        &mut |event| reporter.handle(event),
    )
    .context("archive build failed")?;
    finish_step(&report, global_json)
}

/// Execute `release:upload`.
#[instrument(name = "cmd_release_upload", skip_all, fields(version = %args.version))]
pub fn cmd_upload(
    args: UploadArgs,
    global_json: bool,
    config: &Config,
    cwd: &Utf8Path,
) -> anyhow::Result<()> {
    let version = parse_version(&args.version)?;
    let directory = release_directory(args.directory.as_deref(), config, &version, cwd);
    let mut options = UploadOptions::from_config(config);
    if let Some(profile) = args.aws_profile {
        options = options.with_profile(profile);
    }

    let mut reporter = Reporter::new(global_json);
    let report = steps::upload_archive(&directory, &version, &options, &mut |event| {
        reporter.handle(event)
    })
    .context("upload failed")?;
    finish_step(&report, global_json)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_directory_wins_over_release_path() {
        let version = parse_version("4.1.0").unwrap();
        let dir = release_directory(
            Some(Utf8Path::new("/work/site")),
            &Config::default(),
            &version,
            Utf8Path::new("/srv"),
        );
        assert_eq!(dir, Utf8PathBuf::from("/work/site"));
    }

    #[test]
    fn changelog_is_written_relative_to_cwd() {
        let tmp = tempfile::TempDir::new().unwrap();
        let cwd = Utf8PathBuf::from_path_buf(tmp.path().to_path_buf()).unwrap();
        let report = ChangelogReport {
            markdown: "\n\n## Change Log\n".to_string(),
            warnings: Vec::new(),
            item_count: 0,
        };
        emit_changelog(&report, Some(Utf8Path::new("CHANGELOG.md")), &cwd).unwrap();
        assert_eq!(
            std::fs::read_to_string(cwd.join("CHANGELOG.md")).unwrap(),
            "\n\n## Change Log\n"
        );
    }

    #[test]
    fn tag_outside_a_project_fails() {
        let tmp = tempfile::TempDir::new().unwrap();
        let cwd = Utf8PathBuf::from_path_buf(tmp.path().to_path_buf()).unwrap();
        let args = VersionArgs {
            version: "4.1.0".to_string(),
            target: TargetArgs {
                directory: Some(cwd.clone()),
                ..TargetArgs::default()
            },
        };
        let err = cmd_tag(args, true, &Config::default(), &cwd).unwrap_err();
        assert!(err.to_string().contains("failed to open project"));
    }

    #[test]
    fn changelog_needs_from_for_first_release() {
        let tmp = tempfile::TempDir::new().unwrap();
        let cwd = Utf8PathBuf::from_path_buf(tmp.path().to_path_buf()).unwrap();
        let args = ChangelogArgs {
            version: "4.0.0".to_string(),
            ..ChangelogArgs::default()
        };
        let err = cmd_changelog(args, true, &Config::default(), &cwd).unwrap_err();
        assert!(err.to_string().contains("--from"));
    }
}
