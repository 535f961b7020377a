//! Branch creation, checkout, merge and push across modules.

use camino::Utf8PathBuf;
use serde::Serialize;
use tracing::{debug, instrument};

use super::{EventSink, Progress, StepError, StepName, StepReport, StepResult, StepWarning};
use crate::git::{GitResult, MergeOutcome, Repository};
use crate::module::Module;

/// Create (or switch to) `branch` in every module.
///
/// With no branch the step is a no-op. A module that fails to switch gets a
/// warning; the others carry on.
#[instrument(skip(modules, on_event))]
pub fn create_branch(
    modules: &[&Module],
    branch: Option<&str>,
    remote: &str,
    on_event: EventSink<'_>,
) -> StepResult<StepReport> {
    let mut progress = Progress::start(StepName::Branch, on_event);
    let Some(branch) = branch.filter(|b| !b.is_empty()) else {
        return Ok(progress.skipped("no branch requested"));
    };

    let mut switched = 0;
    for module in modules {
        let repo = module.repo();
        match repo.current_branch() {
            Ok(Some(current)) if current == branch => {
                progress.module(module.name(), format!("already on {branch}"));
                continue;
            }
            Ok(_) => {}
            Err(e) => {
                progress.warn(Some(module.name()), format!("could not read current branch: {e}"));
                continue;
            }
        }
        match repo.checkout(branch, remote, true) {
            Ok(()) => {
                switched += 1;
                progress.module(module.name(), format!("switched to {branch}"));
            }
            Err(e) => progress.warn(Some(module.name()), format!("could not switch to {branch}: {e}")),
        }
    }
    Ok(progress.success(format!("{switched} module(s) switched to {branch}")))
}

/// Fetch `remote` and check out an existing `branch` in every module.
///
/// Missing branches are expected in modules that have not been branched
/// yet, so failures are warnings.
#[instrument(skip(modules, on_event))]
pub fn checkout_branch(
    modules: &[&Module],
    branch: &str,
    remote: &str,
    on_event: EventSink<'_>,
) -> StepResult<StepReport> {
    let mut progress = Progress::start(StepName::Checkout, on_event);
    let mut checked_out = 0;
    for module in modules {
        let repo = module.repo();
        let result = repo.fetch(remote).and_then(|()| repo.checkout(branch, remote, false));
        match result {
            Ok(()) => {
                checked_out += 1;
                progress.module(module.name(), format!("checked out {branch}"));
            }
            Err(e) => progress.warn(Some(module.name()), format!("skipping module: {e}")),
        }
    }
    Ok(progress.success(format!("{checked_out} of {} module(s) on {branch}", modules.len())))
}

/// Push the current branch of every module, without tags.
#[instrument(skip(modules, on_event))]
pub fn push_branch(
    modules: &[&Module],
    remote: &str,
    on_event: EventSink<'_>,
) -> StepResult<StepReport> {
    push_modules(StepName::Push, modules, remote, false, on_event)
}

pub(super) fn push_modules(
    step: StepName,
    modules: &[&Module],
    remote: &str,
    include_tags: bool,
    on_event: EventSink<'_>,
) -> StepResult<StepReport> {
    let mut progress = Progress::start(step, on_event);
    for module in modules {
        module
            .repo()
            .push(remote, include_tags)
            .map_err(|source| StepError::Push {
                module: module.name().to_string(),
                source,
            })?;
        progress.module(module.name(), format!("pushed to {remote}"));
    }
    Ok(progress.success(format!("{} module(s) pushed to {remote}", modules.len())))
}

// ──────────────────────────────────────────────
// Merge
// ──────────────────────────────────────────────

/// Branches for a merge run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOptions {
    /// Branch merged from.
    pub from: String,
    /// Branch merged into.
    pub to: String,
    /// Remote to fetch from and push to.
    pub remote: String,
    /// Push modules that merged cleanly.
    pub push: bool,
}

/// A module left with unmerged paths.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MergeConflict {
    /// Module name.
    pub module: String,
    /// Working directory to resolve in.
    pub directory: Utf8PathBuf,
    /// Conflicting paths.
    pub paths: Vec<String>,
}

/// What to do about a conflicted module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictResolution {
    /// The operator resolved it; treat as merged if nothing is left unmerged.
    Continue,
    /// Leave it for later and move on.
    Skip,
    /// Stop the whole run.
    Abort,
}

/// Result of a merge run.
#[derive(Debug, Clone, Serialize)]
pub struct MergeReport {
    /// Step report.
    pub report: StepReport,
    /// Modules merged cleanly (or resolved).
    pub merged: Vec<String>,
    /// Modules pushed after merging.
    pub pushed: Vec<String>,
    /// Modules needing manual resolution.
    pub conflicts: Vec<MergeConflict>,
}

impl MergeReport {
    /// Whether any module still needs manual work.
    pub fn needs_resolution(&self) -> bool {
        !self.conflicts.is_empty()
    }

    /// Per-module warnings from the run.
    pub fn warnings(&self) -> &[StepWarning] {
        &self.report.warnings
    }
}

/// Merge `from` into `to` in every module.
///
/// Conflicts go to `resolve`; skipped ones are collected in the report and
/// never pushed. [`ConflictResolution::Abort`] stops with
/// [`StepError::Aborted`].
#[instrument(skip(modules, resolve, on_event), fields(from = %options.from, to = %options.to))]
pub fn merge_branch(
    modules: &[&Module],
    options: &MergeOptions,
    resolve: &mut dyn FnMut(&MergeConflict) -> ConflictResolution,
    on_event: EventSink<'_>,
) -> StepResult<MergeReport> {
    let mut progress = Progress::start(StepName::Merge, on_event);
    let mut merged = Vec::new();
    let mut pushed = Vec::new();
    let mut conflicts = Vec::new();

    for module in modules {
        let repo = module.repo();
        let name = module.name();

        let prepared = repo
            .fetch(&options.remote)
            .and_then(|()| repo.checkout(&options.from, &options.remote, false))
            .and_then(|()| repo.checkout(&options.to, &options.remote, false));
        if let Err(e) = prepared {
            progress.warn(Some(name), format!("skipping module: {e}"));
            continue;
        }

        let paths = match repo.merge(&options.from) {
            Ok(MergeOutcome::Clean) => None,
            Ok(MergeOutcome::Conflict { paths }) => Some(paths),
            Err(e) => {
                progress.warn(Some(name), format!("merge failed: {e}"));
                continue;
            }
        };

        if let Some(paths) = paths {
            let conflict = MergeConflict {
                module: name.to_string(),
                directory: module.directory().to_path_buf(),
                paths,
            };
            debug!(module = name, paths = ?conflict.paths, "merge conflict");
            match resolve(&conflict) {
                ConflictResolution::Abort => {
                    conflicts.push(conflict);
                    return Err(StepError::Aborted {
                        step: StepName::Merge,
                        conflicts,
                    });
                }
                ConflictResolution::Skip => {
                    progress.warn(Some(name), "merge conflict left for manual resolution");
                    conflicts.push(conflict);
                    continue;
                }
                ConflictResolution::Continue => match still_merging(repo) {
                    Ok(None) => {}
                    Ok(Some(reason)) => {
                        progress.warn(Some(name), reason);
                        conflicts.push(conflict);
                        continue;
                    }
                    Err(e) => {
                        progress.warn(Some(name), format!("could not check merge state: {e}"));
                        conflicts.push(conflict);
                        continue;
                    }
                },
            }
        }

        progress.module(name, format!("merged {} into {}", options.from, options.to));
        merged.push(name.to_string());

        if options.push {
            match repo.push(&options.remote, false) {
                Ok(()) => {
                    progress.module(name, format!("pushed {}", options.to));
                    pushed.push(name.to_string());
                }
                Err(e) => progress.warn(Some(name), format!("push failed: {e}")),
            }
        }
    }

    let summary = if conflicts.is_empty() {
        format!("{} module(s) merged", merged.len())
    } else {
        format!(
            "{} module(s) merged, {} need manual resolution",
            merged.len(),
            conflicts.len()
        )
    };
    Ok(MergeReport {
        report: progress.success(summary),
        merged,
        pushed,
        conflicts,
    })
}

/// Why a merge the operator continued is not finished, if it is not.
fn still_merging(repo: &dyn Repository) -> GitResult<Option<&'static str>> {
    if repo.has_unmerged_paths()? {
        return Ok(Some("unmerged paths remain after resolution"));
    }
    if repo.merge_in_progress()? {
        return Ok(Some("merge is staged but not committed"));
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::mock::MockRepository;
    use crate::module::fixtures::{installer, set_repo, Fixture};
    use crate::module::ModuleFilter;
    use crate::steps::test_support::Recorder;
    use crate::steps::StepOutcome;

    fn pair() -> Fixture {
        installer(&[
            ("framework", "silverstripe/framework", true),
            ("cms", "silverstripe/cms", true),
        ])
    }

    fn options(push: bool) -> MergeOptions {
        MergeOptions {
            from: "4.1".to_string(),
            to: "4".to_string(),
            remote: "origin".to_string(),
            push,
        }
    }

    fn branched(repo: MockRepository) -> MockRepository {
        repo.with_remote_branch("origin", "4.1")
            .with_remote_branch("origin", "4")
    }

    #[test]
    fn create_branch_without_name_is_noop() {
        let fixture = pair();
        let project = fixture.project();
        let modules = project.discover_modules(&ModuleFilter::default()).unwrap();
        let report = create_branch(&modules, Some(""), "origin", &mut |_| {}).unwrap();
        assert!(matches!(report.outcome, StepOutcome::Skipped { .. }));
        assert!(fixture.repo("framework").calls().is_empty());
    }

    #[test]
    fn create_branch_skips_modules_already_on_branch() {
        let mut fixture = pair();
        set_repo(
            &mut fixture,
            "cms",
            MockRepository::new().with_branch("4.1").on_branch(Some("4.1")),
        );
        let project = fixture.project();
        let modules = project.discover_modules(&ModuleFilter::default()).unwrap();
        create_branch(&modules, Some("4.1"), "origin", &mut |_| {}).unwrap();

        assert!(fixture.repo("framework").called("checkout 4.1"));
        assert!(!fixture.repo("cms").called("checkout"));
    }

    #[test]
    fn checkout_missing_branch_warns_and_continues() {
        let mut fixture = pair();
        set_repo(
            &mut fixture,
            "framework",
            MockRepository::new().with_remote_branch("origin", "4.1"),
        );
        let project = fixture.project();
        let modules = project.discover_modules(&ModuleFilter::default()).unwrap();
        let mut recorder = Recorder::default();
        let report = checkout_branch(&modules, "4.1", "origin", &mut recorder.sink()).unwrap();

        assert!(fixture.repo("framework").called("checkout 4.1"));
        assert!(fixture.repo("cms").called("fetch origin"));
        let warned: Vec<Option<String>> = report.warnings.iter().map(|w| w.module.clone()).collect();
        assert!(warned.contains(&Some("cms".to_string())));
        assert!(warned.contains(&Some("installer".to_string())));
        assert!(!warned.contains(&Some("framework".to_string())));
        assert_eq!(recorder.warnings().len(), report.warnings.len());
    }

    #[test]
    fn conflicted_module_is_reported_and_not_pushed() {
        let mut fixture = pair();
        set_repo(
            &mut fixture,
            "framework",
            branched(MockRepository::new()).with_conflict("4.1", &["src/Core.php"]),
        );
        set_repo(&mut fixture, "cms", branched(MockRepository::new()));
        let project = fixture.project();
        let filter = ModuleFilter::new(vec!["framework".into(), "cms".into()], false);
        let modules = project.discover_modules(&filter).unwrap();

        let mut asked = Vec::new();
        let report = merge_branch(
            &modules,
            &options(true),
            &mut |conflict: &MergeConflict| {
                asked.push(conflict.module.clone());
                ConflictResolution::Skip
            },
            &mut |_| {},
        )
        .unwrap();

        assert_eq!(asked, vec!["framework"]);
        assert!(report.needs_resolution());
        assert_eq!(report.conflicts[0].module, "framework");
        assert_eq!(report.conflicts[0].paths, vec!["src/Core.php"]);
        assert_eq!(report.merged, vec!["cms"]);
        assert_eq!(report.pushed, vec!["cms"]);
        assert!(!fixture.repo("framework").called("push"));
        assert!(fixture.repo("cms").called("push origin 4"));
    }

    #[test]
    fn merge_without_push_never_pushes() {
        let mut fixture = pair();
        set_repo(&mut fixture, "cms", branched(MockRepository::new()));
        let project = fixture.project();
        let filter = ModuleFilter::new(vec!["cms".into()], false);
        let modules = project.discover_modules(&filter).unwrap();
        let report = merge_branch(
            &modules,
            &options(false),
            &mut |_| ConflictResolution::Skip,
            &mut |_| {},
        )
        .unwrap();
        assert_eq!(report.merged, vec!["cms"]);
        assert!(report.pushed.is_empty());
        assert!(!fixture.repo("cms").called("push"));
    }

    #[test]
    fn continue_after_resolution_counts_as_merged() {
        let mut fixture = pair();
        set_repo(
            &mut fixture,
            "framework",
            branched(MockRepository::new()).with_conflict("4.1", &["a.php"]),
        );
        let project = fixture.project();
        let filter = ModuleFilter::new(vec!["framework".into()], false);
        let modules = project.discover_modules(&filter).unwrap();
        let repo = fixture.repo("framework");

        let report = merge_branch(
            &modules,
            &options(false),
            &mut |_| {
                repo.resolve_conflicts();
                ConflictResolution::Continue
            },
            &mut |_| {},
        )
        .unwrap();
        assert_eq!(report.merged, vec!["framework"]);
        assert!(!report.needs_resolution());
    }

    #[test]
    fn continue_with_unmerged_paths_stays_conflicted() {
        let mut fixture = pair();
        set_repo(
            &mut fixture,
            "framework",
            branched(MockRepository::new()).with_conflict("4.1", &["a.php"]),
        );
        let project = fixture.project();
        let filter = ModuleFilter::new(vec!["framework".into()], false);
        let modules = project.discover_modules(&filter).unwrap();

        let report = merge_branch(
            &modules,
            &options(true),
            &mut |_| ConflictResolution::Continue,
            &mut |_| {},
        )
        .unwrap();
        assert!(report.merged.is_empty());
        assert_eq!(report.conflicts.len(), 1);
        assert!(!fixture.repo("framework").called("push"));
    }

    #[test]
    fn continue_with_uncommitted_merge_is_not_pushed() {
        let mut fixture = pair();
        set_repo(
            &mut fixture,
            "framework",
            branched(MockRepository::new()).with_conflict("4.1", &["a.php"]),
        );
        let project = fixture.project();
        let filter = ModuleFilter::new(vec!["framework".into()], false);
        let modules = project.discover_modules(&filter).unwrap();
        let repo = fixture.repo("framework");

        let report = merge_branch(
            &modules,
            &options(true),
            &mut |_| {
                repo.stage_resolutions();
                ConflictResolution::Continue
            },
            &mut |_| {},
        )
        .unwrap();
        assert!(report.merged.is_empty());
        assert_eq!(report.conflicts.len(), 1);
        assert!(!repo.called("push"));
    }

    #[test]
    fn abort_stops_remaining_modules() {
        let mut fixture = pair();
        set_repo(
            &mut fixture,
            "cms",
            branched(MockRepository::new()).with_conflict("4.1", &["code/Page.php"]),
        );
        set_repo(&mut fixture, "framework", branched(MockRepository::new()));
        let project = fixture.project();
        // Children are ordered by name, so cms runs before framework.
        let filter = ModuleFilter::new(vec!["cms".into(), "framework".into()], false);
        let modules = project.discover_modules(&filter).unwrap();

        let err = merge_branch(
            &modules,
            &options(true),
            &mut |_| ConflictResolution::Abort,
            &mut |_| {},
        )
        .unwrap_err();
        match err {
            StepError::Aborted { step, conflicts } => {
                assert_eq!(step, StepName::Merge);
                assert_eq!(conflicts.len(), 1);
                assert_eq!(conflicts[0].module, "cms");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!fixture.repo("framework").called("merge"));
    }

    #[test]
    fn push_release_stops_on_detached_head() {
        let mut fixture = pair();
        set_repo(&mut fixture, "cms", MockRepository::new().on_branch(None));
        let project = fixture.project();
        let modules = project.discover_modules(&ModuleFilter::default()).unwrap();
        let err = push_modules(StepName::Push, &modules, "origin", true, &mut |_| {}).unwrap_err();
        assert!(matches!(err, StepError::Push { ref module, .. } if module == "cms"));
        assert!(fixture.repo("installer").called("push origin main --follow-tags"));
        assert!(!fixture.repo("framework").called("push"));
    }

    #[test]
    fn push_branch_omits_tags() {
        let fixture = pair();
        let project = fixture.project();
        let modules = project.discover_modules(&ModuleFilter::default()).unwrap();
        push_branch(&modules, "origin", &mut |_| {}).unwrap();
        assert!(fixture.repo("framework").calls().contains(&"push origin main".to_string()));
    }

    mod real_git {
        use std::sync::Arc;

        use camino::Utf8Path;

        use super::*;
        use crate::git::sandbox::{commit_file, git_available, run, Origin};
        use crate::git::{GitRepository, Repository};
        use crate::module::Module;

        /// A module whose `4.1` and `4` both changed `a.txt` on origin.
        fn conflicting_module(origin: &Origin) -> (GitRepository, Module) {
            let repo = origin.clone_into("module");
            std::fs::write(repo.dir().join("composer.json"), r#"{"name":"acme/module"}"#).unwrap();
            run(repo.dir(), &["checkout", "-q", "-b", "4"]);
            run(repo.dir(), &["add", "composer.json"]);
            commit_file(&repo, "a.txt", "base", "Initial");
            run(repo.dir(), &["checkout", "-q", "-b", "4.1"]);
            commit_file(&repo, "a.txt", "from 4.1", "Change on 4.1");
            run(repo.dir(), &["checkout", "-q", "4"]);
            commit_file(&repo, "a.txt", "from 4", "Change on 4");
            run(repo.dir(), &["push", "-q", "origin", "4", "4.1"]);

            let module = Module::with_repository(
                repo.dir(),
                "module",
                None,
                Arc::new(GitRepository::new(repo.dir())),
            )
            .unwrap();
            (repo, module)
        }

        fn resolve_in(dir: &Utf8Path) {
            std::fs::write(dir.join("a.txt"), "resolved").unwrap();
            run(dir, &["add", "a.txt"]);
        }

        #[test]
        fn staged_but_uncommitted_merge_stays_conflicted() {
            if !git_available() {
                return;
            }
            let origin = Origin::new();
            let (repo, module) = conflicting_module(&origin);

            let report = merge_branch(
                &[&module],
                &options(true),
                &mut |conflict: &MergeConflict| {
                    resolve_in(&conflict.directory);
                    ConflictResolution::Continue
                },
                &mut |_| {},
            )
            .unwrap();

            assert!(report.merged.is_empty());
            assert!(report.pushed.is_empty());
            assert_eq!(report.conflicts.len(), 1);
            assert!(repo.merge_in_progress().unwrap());
            assert!(!origin.contains("4", "4.1"));
        }

        #[test]
        fn committed_resolution_is_merged_and_pushed() {
            if !git_available() {
                return;
            }
            let origin = Origin::new();
            let (_repo, module) = conflicting_module(&origin);

            let report = merge_branch(
                &[&module],
                &options(true),
                &mut |conflict: &MergeConflict| {
                    resolve_in(&conflict.directory);
                    run(&conflict.directory, &["commit", "-q", "--no-edit"]);
                    ConflictResolution::Continue
                },
                &mut |_| {},
            )
            .unwrap();

            assert_eq!(report.merged, vec!["module"]);
            assert_eq!(report.pushed, vec!["module"]);
            assert!(origin.contains("4", "4.1"));
        }
    }
}
