//! Project installation and the test suite.

use std::sync::LazyLock;

use camino::Utf8Path;
use regex::Regex;
use tracing::{debug, instrument};

use super::{EventSink, Progress, StepError, StepName, StepReport, StepResult};
use crate::module::Project;
use crate::tools::{self, ToolError};
use crate::version::ReleaseVersion;

static VERSIONS_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^versions\s*:\s*(\S.+\S)\s*$").expect("valid versions regex")
});

static VERSION_SEPARATOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*,\s*").expect("valid separator regex"));

/// Versions listed in `composer show --all` output.
///
/// Composer marks the installed version with a leading `* `.
pub fn parse_available_versions(output: &str) -> Option<Vec<String>> {
    let list = VERSIONS_LINE.captures(output)?.get(1)?.as_str();
    Some(
        VERSION_SEPARATOR
            .split(list)
            .map(|v| v.trim_start_matches("* ").to_string())
            .filter(|v| !v.is_empty())
            .collect(),
    )
}

/// The most specific composer constraint for `version` that is available.
pub fn pick_best_version(version: &ReleaseVersion, available: &[String]) -> Option<String> {
    version
        .composer_candidates()
        .into_iter()
        .find(|candidate| available.contains(candidate))
}

/// Install `package` at the best constraint for `version` into `directory`.
///
/// An existing project in `directory` is left alone.
#[instrument(skip(on_event), fields(version = %version))]
pub fn create_project(
    directory: &Utf8Path,
    version: &ReleaseVersion,
    package: &str,
    composer: &str,
    on_event: EventSink<'_>,
) -> StepResult<StepReport> {
    let mut progress = Progress::start(StepName::CreateProject, on_event);
    if Project::exists_in(directory) {
        return Ok(progress.skipped(format!("project already exists in {directory}")));
    }
    tools::require_tool(composer, None)?;

    let output = tools::run(composer, &["show", package, "--all"], None)?;
    let available =
        parse_available_versions(&output).ok_or_else(|| StepError::UnparseableVersions {
            package: package.to_string(),
        })?;
    debug!(count = available.len(), "available versions");

    let constraint =
        pick_best_version(version, &available).ok_or_else(|| StepError::NoInstallableVersion {
            package: package.to_string(),
            version: version.clone(),
            candidates: version.composer_candidates(),
        })?;

    progress.module(
        package,
        format!("installing {constraint} into {directory}"),
    );
    tools::run(
        composer,
        &[
            "create-project",
            "--prefer-source",
            "--keep-vcs",
            package,
            directory.as_str(),
            &constraint,
        ],
        None,
    )?;
    Ok(progress.success(format!("installed {package} {constraint}")))
}

/// Run the project's test suite once.
#[instrument(skip(on_event))]
pub fn run_tests(
    directory: &Utf8Path,
    command: &str,
    on_event: EventSink<'_>,
) -> StepResult<StepReport> {
    let progress = Progress::start(StepName::Test, on_event);
    match tools::run_shell(command, directory) {
        Ok(_) => Ok(progress.success(format!("{command} passed"))),
        Err(ToolError::Failed {
            exit_code, stderr, ..
        }) => {
            let status = exit_code.map_or_else(|| "killed by signal".to_string(), |c| format!("exit {c}"));
            let message = if stderr.is_empty() {
                format!("{command} ({status})")
            } else {
                format!("{command} ({status}): {stderr}")
            };
            Err(StepError::TestsFailed { message })
        }
        Err(e) => Err(e.into()),
    }
}
