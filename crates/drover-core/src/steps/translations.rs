//! Translation sync through the Transifex client.
//!
//! The run has a fixed order: pull translations for every module, collect
//! new source strings across the project, regenerate the JavaScript
//! dictionaries, push sources, then commit. A module that fails a stage is
//! dropped from the later ones.

use std::fs;
use std::time::{Duration, SystemTime};

use camino::{Utf8Path, Utf8PathBuf};
use semver::Version;
use tracing::{debug, instrument};

use super::{EventSink, Progress, StepError, StepName, StepReport, StepResult};
use crate::config::Config;
use crate::error::ConfigResult;
use crate::module::{Module, Project};
use crate::tools;

/// Transifex client binary.
pub const TX_BINARY: &str = "tx";

const COMMIT_MESSAGE: &str = "Update translations";

const ONE_YEAR: Duration = Duration::from_secs(365 * 24 * 60 * 60);

const JS_TEMPLATE: &str = "\
// This file was generated by drover from %FILE%.
if(typeof(ss) == 'undefined' || typeof(ss.i18n) == 'undefined') {
\tif(typeof(console) != 'undefined') console.error('Class ss.i18n not defined');
} else {
\tss.i18n.addDictionary('%LOCALE%', %TRANSLATIONS%);
}
";

/// Settings for the translation step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslationOptions {
    /// Client binary.
    pub tx: String,
    /// Oldest acceptable client.
    pub min_version: Version,
    /// Skip languages below this completion percentage.
    pub minimum_percent: u8,
}

impl TranslationOptions {
    /// Options from the `translations` config section.
    pub fn from_config(config: &Config) -> ConfigResult<Self> {
        Ok(Self {
            tx: TX_BINARY.to_string(),
            min_version: config.translation_min_version()?,
            minimum_percent: config.translation_minimum_percent()?,
        })
    }
}

/// Pull, collect, regenerate, push and commit translations.
///
/// Without an explicit module filter, only modules with a `.tx/config` take
/// part. With one, a named module that cannot be translated is a warning.
#[instrument(skip_all, fields(dir = %project.directory()))]
pub fn update_translations(
    project: &Project,
    modules: &[&Module],
    explicit_filter: bool,
    options: &TranslationOptions,
    on_event: EventSink<'_>,
) -> StepResult<StepReport> {
    let mut progress = Progress::start(StepName::Translations, on_event);

    let mut selected: Vec<&Module> = Vec::new();
    for &module in modules {
        if module.is_translatable() {
            selected.push(module);
        } else if explicit_filter {
            progress.warn(
                Some(module.name()),
                format!("{} has no .tx/config, skipping", module.name()),
            );
        }
    }
    if selected.is_empty() {
        return Ok(progress.skipped("no translatable modules"));
    }

    tools::require_tool(&options.tx, Some(&options.min_version))?;

    let minimum = format!("--minimum-perc={}", options.minimum_percent);
    selected.retain(|module| {
        let pulled = age_yaml_files(&module.lang_directory()).and_then(|()| {
            tools::run(
                &options.tx,
                &["pull", "-a", "-s", "-f", &minimum],
                Some(module.directory()),
            )
            .map_err(StepError::from)
        });
        match pulled {
            Ok(_) => {
                progress.module(module.name(), "pulled translations");
                true
            }
            Err(e) => {
                progress.warn(Some(module.name()), format!("pull failed: {e}"));
                false
            }
        }
    });
    if selected.is_empty() {
        return Ok(progress.success("no module pulled translations"));
    }

    collect_text(project, &selected)?;
    progress.module(project.root().name(), "collected source strings");

    for module in &selected {
        let mut generated = 0;
        for js_dir in module.js_lang_directories() {
            match generate_javascript(module.directory(), &js_dir) {
                Ok(files) => generated += files.len(),
                Err(e) => progress.warn(Some(module.name()), e.to_string()),
            }
        }
        if generated > 0 {
            progress.module(module.name(), format!("generated {generated} javascript file(s)"));
        }
    }

    selected.retain(
        |module| match tools::run(&options.tx, &["push", "-s"], Some(module.directory())) {
            Ok(_) => true,
            Err(e) => {
                progress.warn(Some(module.name()), format!("push failed: {e}"));
                false
            }
        },
    );

    let mut committed = 0;
    for module in &selected {
        let mut paths = vec![module.lang_directory()];
        paths.extend(module.js_lang_directories());
        paths.retain(|p| p.is_dir());
        let repo = module.repo();
        match repo.add(&paths).and_then(|()| repo.commit(COMMIT_MESSAGE)) {
            Ok(()) => {
                committed += 1;
                progress.module(module.name(), "committed translations");
            }
            Err(e) => progress.warn(Some(module.name()), format!("commit failed: {e}")),
        }
    }
    Ok(progress.success(format!("{committed} module(s) translated")))
}

/// Push the modification time of every `*.yml` in `lang_dir` back a year,
/// so the client treats the remote copies as newer.
fn age_yaml_files(lang_dir: &Utf8Path) -> StepResult<()> {
    let Ok(entries) = lang_dir.read_dir_utf8() else {
        return Ok(());
    };
    let stamp = SystemTime::now()
        .checked_sub(ONE_YEAR)
        .unwrap_or(SystemTime::UNIX_EPOCH);
    for entry in entries {
        let entry = entry.map_err(StepError::io(lang_dir))?;
        let path = entry.path();
        if path.extension() != Some("yml") {
            continue;
        }
        fs::File::options()
            .write(true)
            .open(path)
            .and_then(|file| file.set_modified(stamp))
            .map_err(StepError::io(path))?;
    }
    Ok(())
}

fn collect_text(project: &Project, modules: &[&Module]) -> StepResult<()> {
    let names: Vec<&str> = modules.iter().map(|m| m.name()).collect();
    let sake = project.directory().join("framework").join("sake");
    let module_arg = format!("module={}", names.join(","));
    debug!(%sake, modules = %module_arg, "running text collector");
    tools::run(
        sake.as_str(),
        &[
            "dev/tasks/i18nTextCollectorTask",
            "flush=all",
            "merge=1",
            &module_arg,
        ],
        Some(project.directory()),
    )?;
    Ok(())
}

/// Write `{js_dir}/{locale}.js` for every `{js_dir}/src/{locale}.js`.
///
/// Returns the written files. The header names the source relative to
/// `base`.
pub fn generate_javascript(base: &Utf8Path, js_dir: &Utf8Path) -> StepResult<Vec<Utf8PathBuf>> {
    let src = js_dir.join("src");
    let Ok(entries) = src.read_dir_utf8() else {
        return Ok(Vec::new());
    };
    let mut sources: Vec<Utf8PathBuf> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.into_path())
        .filter(|path| path.extension() == Some("js"))
        .collect();
    sources.sort();

    let mut written = Vec::new();
    for source in sources {
        let Some(locale) = source.file_stem() else {
            continue;
        };
        let contents = fs::read_to_string(&source).map_err(StepError::io(&source))?;
        let relative = source.strip_prefix(base).unwrap_or(source.as_path());
        let output = JS_TEMPLATE
            .replace("%FILE%", relative.as_str())
            .replace("%LOCALE%", locale)
            .replace("%TRANSLATIONS%", contents.trim_end());
        let target = js_dir.join(format!("{locale}.js"));
        fs::write(&target, output).map_err(StepError::io(&target))?;
        debug!(%target, "generated javascript dictionary");
        written.push(target);
    }
    Ok(written)
}
