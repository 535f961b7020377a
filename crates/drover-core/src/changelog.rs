//! Commit classification and changelog rendering.
//!
//! Each commit between the from-version and `HEAD` of every module becomes a
//! [`ChangelogItem`]. Noise commits are dropped, the rest are classified into
//! a [`CommitCategory`] by an ordered rule table and rendered into Markdown,
//! either grouped by category or as one flat list.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::git::{Commit, GitError};
use crate::module::Module;
use crate::version::ReleaseVersion;

// ──────────────────────────────────────────────
// Errors
// ──────────────────────────────────────────────

/// Errors from changelog generation.
#[derive(Error, Debug)]
pub enum ChangelogError {
    /// A repository query failed for a reason other than a missing lower
    /// bound.
    #[error("module {module}: {source}")]
    Git {
        /// Module being read.
        module: String,
        /// Underlying error.
        source: GitError,
    },
}

/// Result alias for changelog operations.
pub type ChangelogResult<T> = Result<T, ChangelogError>;

// ──────────────────────────────────────────────
// Rules
// ──────────────────────────────────────────────

/// Changelog section, in rendering priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum CommitCategory {
    /// Security advisories.
    Security,
    /// API changes.
    ApiChanges,
    /// New features and enhancements.
    Features,
    /// Bug fixes.
    Bugfixes,
}

impl CommitCategory {
    /// Every category, highest priority first.
    pub const ALL: [Self; 4] = [Self::Security, Self::ApiChanges, Self::Features, Self::Bugfixes];

    /// Section heading.
    pub const fn label(self) -> &'static str {
        match self {
            Self::Security => "Security",
            Self::ApiChanges => "API Changes",
            Self::Features => "Features and Enhancements",
            Self::Bugfixes => "Bugfixes",
        }
    }
}

impl fmt::Display for CommitCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|p| Regex::new(p).expect("valid changelog regex"))
        .collect()
}

/// Ordered `(category, patterns)` table; the first matching row wins.
static CATEGORY_RULES: LazyLock<Vec<(CommitCategory, Vec<Regex>)>> = LazyLock::new(|| {
    vec![
        (
            CommitCategory::Security,
            compile(&[r"(?i)^(\[SS-2\d{3}-\d{3}\])\s?:?"]),
        ),
        (
            CommitCategory::ApiChanges,
            compile(&[r"(?i)^(APICHANGE|API-CHANGE|API CHANGE|API)\s?:?"]),
        ),
        (
            CommitCategory::Features,
            compile(&[r"(?i)^(ENHANCEMENT|ENHNACEMENT|FEATURE|NEW)\s?:?"]),
        ),
        (
            CommitCategory::Bugfixes,
            compile(&[
                r"(?i)^(BUG FIX)\s?:?",
                r"(?i)^(BUGFIX|BUGFUX|BUG|FIXING|FIXED|FIX)\s?:?",
            ]),
        ),
    ]
});

static IGNORE_RULES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r"^Merge",
        r"^Blocked revisions",
        r"^Initialized merge tracking ",
        r"^Created (branches|tags)",
        r"^NOTFORMERGE",
        r"^\s*$",
    ])
});

static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(<?[A-Z0-9._%+-]+@[A-Z0-9.-]+\.[A-Z]{2,4}>?)").expect("valid email regex")
});

static SECURITY_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(SS-2\d{3}-\d{3})").expect("valid advisory regex"));

// ──────────────────────────────────────────────
// Templates
// ──────────────────────────────────────────────

/// Default line template for grouped changelogs.
pub const DEFAULT_LINE_FORMAT: &str = " * {date} [{shortHash}]({link}) {shortMessage} ({author})";

/// Default line template for single-module release notes.
pub const DEFAULT_MODULE_LINE_FORMAT: &str = " * {message} ({author}) - [{shortHash}]({link})";

/// Default suffix appended to security items.
pub const DEFAULT_SECURITY_FORMAT: &str = " - See [{cve}]({cveURL})";

/// Default advisory base URL.
pub const DEFAULT_SECURITY_URL: &str = "http://www.silverstripe.org/download/security-releases/";

/// Field-substitution templates for one rendered line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineTemplate {
    /// Per-item line.
    pub line: String,
    /// Appended to items carrying a security identifier.
    pub security: String,
    /// Prefix for `{cveURL}`.
    pub security_url: String,
}

impl Default for LineTemplate {
    fn default() -> Self {
        Self {
            line: DEFAULT_LINE_FORMAT.to_string(),
            security: DEFAULT_SECURITY_FORMAT.to_string(),
            security_url: DEFAULT_SECURITY_URL.to_string(),
        }
    }
}

fn substitute(format: &str, fields: &[(&str, &str)]) -> String {
    fields.iter().fold(format.to_string(), |acc, (name, value)| {
        acc.replace(&format!("{{{name}}}"), value)
    })
}

/// How the changelog is laid out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ChangelogFormat {
    /// One section per category.
    #[default]
    Grouped,
    /// One list, newest first, categorized items only.
    Flat,
}

// ──────────────────────────────────────────────
// Items
// ──────────────────────────────────────────────

/// One commit from one module, ready for classification.
#[derive(Debug, Clone)]
pub struct ChangelogItem {
    module: String,
    link_base: String,
    commit: Commit,
}

impl ChangelogItem {
    /// Wrap `commit` from `module`; `link_base` is the repository web URL
    /// with a trailing slash (empty when unknown).
    pub fn new(module: impl Into<String>, link_base: impl Into<String>, commit: Commit) -> Self {
        Self {
            module: module.into(),
            link_base: link_base.into(),
            commit,
        }
    }

    /// Owning module name.
    pub fn module(&self) -> &str {
        &self.module
    }

    /// The underlying commit.
    pub const fn commit(&self) -> &Commit {
        &self.commit
    }

    /// Subject line as committed.
    pub fn raw_message(&self) -> &str {
        self.commit.subject.lines().next().unwrap_or("")
    }

    /// Whether this is a noise commit (merges, tracking markers, empty).
    pub fn is_ignored(&self) -> bool {
        let message = self.raw_message();
        IGNORE_RULES.iter().any(|rule| rule.is_match(message))
    }

    /// Subject with email addresses removed and `<`/`>` escaped.
    pub fn message(&self) -> String {
        let stripped = EMAIL.replace_all(self.raw_message(), "");
        stripped.replace('<', "&lt;").replace('>', "&gt;")
    }

    /// [`message`](Self::message) with its leading category tag removed.
    ///
    /// Only the first matching rule is stripped, so `[SS-2024-001]: Fix XSS`
    /// keeps its `Fix`.
    pub fn short_message(&self) -> String {
        let message = self.message();
        let rule = CATEGORY_RULES
            .iter()
            .flat_map(|(_, rules)| rules)
            .find(|rule| rule.is_match(&message));
        match rule {
            Some(rule) => rule.replace(&message, "").trim().to_string(),
            None => message,
        }
    }

    /// First matching category, falling back to Security when an advisory
    /// identifier appears anywhere in the subject.
    pub fn category(&self) -> Option<CommitCategory> {
        let message = self.raw_message();
        CATEGORY_RULES
            .iter()
            .find(|(_, rules)| rules.iter().any(|rule| rule.is_match(message)))
            .map(|(category, _)| *category)
            .or_else(|| self.security_id().map(|_| CommitCategory::Security))
    }

    /// Lower-cased advisory identifier (`ss-2015-016`), if present.
    pub fn security_id(&self) -> Option<String> {
        SECURITY_ID
            .captures(self.raw_message())
            .map(|caps| caps[1].to_lowercase())
    }

    /// Author date as `YYYY-MM-DD` (UTC).
    pub fn date(&self) -> String {
        iso_date(self.commit.timestamp)
    }

    /// Web link to the commit.
    pub fn link(&self) -> String {
        format!("{}commit/{}", self.link_base, self.commit.hash)
    }

    /// Render one line (newline-terminated) through `template`.
    pub fn render(&self, template: &LineTemplate) -> String {
        let category = self.category().map(CommitCategory::label).unwrap_or("");
        let link = self.link();
        let date = self.date();
        let message = self.message();
        let short_message = self.short_message();
        let mut line = substitute(
            &template.line,
            &[
                ("type", category),
                ("link", &link),
                ("shortHash", &self.commit.short_hash),
                ("date", &date),
                ("rawMessage", self.raw_message()),
                ("message", &message),
                ("shortMessage", &short_message),
                ("author", &self.commit.author),
            ],
        );

        if let Some(cve) = self.security_id() {
            let url = format!("{}{cve}", template.security_url);
            line.push_str(&substitute(
                &template.security,
                &[("cve", &cve), ("cveURL", &url)],
            ));
        }

        line.push('\n');
        line
    }
}

/// Format unix seconds as a UTC calendar date (Hinnant's civil-from-days).
fn iso_date(timestamp: i64) -> String {
    let days = timestamp.div_euclid(86_400);

    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146_096) / 365;
    let y = yoe + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = doy - (153 * mp + 2) / 5 + 1;
    let m = if mp < 10 { mp + 3 } else { mp - 9 };
    let y = if m <= 2 { y + 1 } else { y };

    format!("{y:04}-{m:02}-{d:02}")
}

// ──────────────────────────────────────────────
// Builder
// ──────────────────────────────────────────────

/// A module skipped while collecting commits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangelogWarning {
    /// Module name.
    pub module: String,
    /// Human-readable reason.
    pub message: String,
}

/// Rendered changelog plus what happened while building it.
#[derive(Debug, Clone, Serialize)]
pub struct ChangelogReport {
    /// Markdown document.
    pub markdown: String,
    /// Per-module skips.
    pub warnings: Vec<ChangelogWarning>,
    /// Number of rendered items.
    pub item_count: usize,
}

/// Aggregated changelog over a set of modules since a version.
#[derive(Debug)]
pub struct Changelog<'a> {
    modules: Vec<&'a Module>,
    from: ReleaseVersion,
    remote: String,
    template: LineTemplate,
}

impl<'a> Changelog<'a> {
    /// Changelog for `modules` since `from`.
    pub fn new(modules: Vec<&'a Module>, from: ReleaseVersion) -> Self {
        Self {
            modules,
            from,
            remote: "origin".to_string(),
            template: LineTemplate::default(),
        }
    }

    /// Use `template` for item lines.
    #[must_use]
    pub fn with_template(mut self, template: LineTemplate) -> Self {
        self.template = template;
        self
    }

    /// Read commit links from `remote`.
    #[must_use]
    pub fn with_remote(mut self, remote: impl Into<String>) -> Self {
        self.remote = remote.into();
        self
    }

    /// Non-ignored items from every module, newest first.
    ///
    /// A module whose log cannot be read (most often because it lacks the
    /// from-version reference) contributes a warning instead of items.
    #[instrument(skip(self), fields(from = %self.from))]
    pub fn collect(&self) -> ChangelogResult<(Vec<ChangelogItem>, Vec<ChangelogWarning>)> {
        let range = format!("{}..HEAD", self.from);
        let mut items = Vec::new();
        let mut warnings = Vec::new();

        for module in &self.modules {
            let fail = |source| ChangelogError::Git {
                module: module.name().to_string(),
                source,
            };
            let commits = match module.repo().commit_range(&range) {
                Ok(commits) => commits,
                Err(GitError::RangeNotFound { .. }) => {
                    warn!(module = module.name(), from = %self.from, "from-version missing, skipping module");
                    warnings.push(ChangelogWarning {
                        module: module.name().to_string(),
                        message: format!(
                            "module {} does not have from-version {}; skipping changelog for this module",
                            module.name(),
                            self.from
                        ),
                    });
                    continue;
                }
                Err(e) => {
                    warn!(module = module.name(), error = %e, "could not read commits, skipping module");
                    warnings.push(ChangelogWarning {
                        module: module.name().to_string(),
                        message: format!("could not read commits for module {}: {e}", module.name()),
                    });
                    continue;
                }
            };
            let link_base = module.link(&self.remote).map_err(fail)?.unwrap_or_default();

            let before = items.len();
            items.extend(
                commits
                    .into_iter()
                    .map(|commit| ChangelogItem::new(module.name(), link_base.clone(), commit))
                    .filter(|item| !item.is_ignored()),
            );
            debug!(module = module.name(), count = items.len() - before, "collected items");
        }

        // Stable: equal timestamps keep module then log order.
        items.sort_by(|a, b| b.commit.timestamp.cmp(&a.commit.timestamp));
        Ok((items, warnings))
    }

    /// Build the document in `format`.
    pub fn render(&self, format: ChangelogFormat) -> ChangelogResult<ChangelogReport> {
        let (items, warnings) = self.collect()?;
        let (markdown, item_count) = match format {
            ChangelogFormat::Grouped => render_grouped(&items, &self.template),
            ChangelogFormat::Flat => render_flat(&items, &self.template),
        };
        Ok(ChangelogReport {
            markdown,
            warnings,
            item_count,
        })
    }
}

fn render_grouped(items: &[ChangelogItem], template: &LineTemplate) -> (String, usize) {
    let mut markdown = String::from("\n\n## Change Log\n");
    let mut count = 0;
    for category in CommitCategory::ALL {
        let section: Vec<&ChangelogItem> = items
            .iter()
            .filter(|item| item.category() == Some(category))
            .collect();
        if section.is_empty() {
            continue;
        }
        markdown.push_str(&format!("\n### {category}\n\n"));
        for item in &section {
            markdown.push_str(&item.render(template));
        }
        count += section.len();
    }
    (markdown, count)
}

fn render_flat(items: &[ChangelogItem], template: &LineTemplate) -> (String, usize) {
    let lines: Vec<String> = items
        .iter()
        .filter(|item| item.category().is_some())
        .map(|item| item.render(template))
        .collect();
    (lines.concat(), lines.len())
}
