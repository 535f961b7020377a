//! Changelog, tag and push steps.

use tracing::instrument;

use super::branch::push_modules;
use super::{EventSink, Progress, StepName, StepReport, StepResult};
use crate::changelog::{Changelog, ChangelogFormat, ChangelogReport, LineTemplate};
use crate::module::Module;
use crate::version::ReleaseVersion;

/// Build the changelog for `modules` since `from`.
///
/// Modules missing the `from` reference are reported as warnings.
#[instrument(skip(modules, template, on_event), fields(from = %from))]
pub fn build_changelog(
    modules: &[&Module],
    from: &ReleaseVersion,
    remote: &str,
    template: &LineTemplate,
    format: ChangelogFormat,
    on_event: EventSink<'_>,
) -> StepResult<ChangelogReport> {
    let mut progress = Progress::start(StepName::Changelog, on_event);
    let report = Changelog::new(modules.to_vec(), from.clone())
        .with_remote(remote)
        .with_template(template.clone())
        .render(format)?;
    for warning in &report.warnings {
        progress.warn(Some(&warning.module), warning.message.clone());
    }
    progress.success(format!("{} change(s) since {from}", report.item_count));
    Ok(report)
}

/// Tag every module with `version`.
///
/// A module that already carries the tag is left alone. Failures are
/// per-module warnings; the remaining modules are still tagged.
#[instrument(skip(modules, on_event), fields(version = %version))]
pub fn tag_modules(
    modules: &[&Module],
    version: &ReleaseVersion,
    on_event: EventSink<'_>,
) -> StepResult<StepReport> {
    let mut progress = Progress::start(StepName::Tag, on_event);
    let tag = version.to_string();
    let message = format!("Release {version}");
    let mut created = 0;

    for module in modules {
        let repo = module.repo();
        match repo.tag_exists(&tag) {
            Ok(false) => {}
            Ok(true) => {
                progress.module(module.name(), format!("tag {tag} already exists, skipping"));
                continue;
            }
            Err(e) => {
                progress.warn(Some(module.name()), format!("could not list tags: {e}"));
                continue;
            }
        }
        match repo.create_tag(&tag, &message) {
            Ok(()) => {
                created += 1;
                progress.module(module.name(), format!("tagged {tag}"));
            }
            Err(e) => progress.warn(Some(module.name()), format!("could not tag {tag}: {e}")),
        }
    }
    Ok(progress.success(format!("{created} module(s) tagged {tag}")))
}

/// Push every module's current branch along with its tags.
#[instrument(skip(modules, on_event))]
pub fn push_release(
    modules: &[&Module],
    remote: &str,
    on_event: EventSink<'_>,
) -> StepResult<StepReport> {
    push_modules(StepName::Push, modules, remote, true, on_event)
}
