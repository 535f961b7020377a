//! Repository adapter.
//!
//! Higher layers talk to version control only through the [`Repository`]
//! trait. [`GitRepository`] implements it by shelling out to `git` inside one
//! module's working directory, which means we inherit the user's SSH keys,
//! signing setup and hooks. [`mock::MockRepository`] is an in-memory stand-in
//! for tests.

pub mod mock;
#[cfg(test)]
pub(crate) mod sandbox;

use std::collections::BTreeSet;
use std::fmt;
use std::process::Command;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, instrument};

/// Errors from repository operations.
#[derive(Error, Debug)]
pub enum GitError {
    /// Failed to execute the `git` command.
    #[error("failed to run git: {0}")]
    Exec(#[from] std::io::Error),

    /// `git` returned a non-zero exit code.
    #[error("git {command} failed: {stderr}")]
    Command {
        /// The git subcommand that failed (e.g., "checkout").
        command: String,
        /// Captured stderr.
        stderr: String,
    },

    /// Not inside a git repository.
    #[error("not a git repository (or any parent up to mount point)")]
    NotARepo,

    /// The branch exists neither locally nor on the remote.
    #[error("branch {branch} is not a local or remote branch")]
    BranchNotFound {
        /// Requested branch name.
        branch: String,
    },

    /// The lower bound of a log range does not resolve to a commit.
    #[error("reference {reference} in range {range} does not exist")]
    RangeNotFound {
        /// Full range expression.
        range: String,
        /// The missing reference.
        reference: String,
    },

    /// HEAD is detached, so there is nothing to push.
    #[error("no current branch (detached HEAD)")]
    NoCurrentBranch,
}

/// Result alias for repository operations.
pub type GitResult<T> = Result<T, GitError>;

/// One commit from a log range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Commit {
    /// Full hash.
    pub hash: String,
    /// Abbreviated hash.
    pub short_hash: String,
    /// Author name.
    pub author: String,
    /// Author date as unix seconds.
    pub timestamp: i64,
    /// Subject line only.
    pub subject: String,
}

impl Commit {
    /// Build a commit record, abbreviating the hash to seven characters.
    pub fn new(
        hash: impl Into<String>,
        author: impl Into<String>,
        timestamp: i64,
        subject: impl Into<String>,
    ) -> Self {
        let hash = hash.into();
        let short_hash = hash.chars().take(7).collect();
        Self {
            hash,
            short_hash,
            author: author.into(),
            timestamp,
            subject: subject.into(),
        }
    }
}

/// Result of merging one branch into the current one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    /// Merge completed (including fast-forward and up-to-date).
    Clean,
    /// Merge stopped with unresolved paths; the working tree is left as-is.
    Conflict {
        /// Paths with unmerged entries.
        paths: Vec<String>,
    },
}

/// Version-control capabilities the release pipeline depends on.
///
/// All calls are synchronous and scoped to a single working directory.
pub trait Repository: fmt::Debug + Send + Sync {
    /// Current branch name, `None` when HEAD is detached.
    fn current_branch(&self) -> GitResult<Option<String>>;

    /// Local branch names, or the branches of `remote` with the
    /// `{remote}/` prefix removed.
    fn list_branches(&self, remote: Option<&str>) -> GitResult<BTreeSet<String>>;

    /// All tag names.
    fn list_tags(&self) -> GitResult<BTreeSet<String>>;

    /// Whether `tag` exists.
    fn tag_exists(&self, tag: &str) -> GitResult<bool> {
        Ok(self.list_tags()?.contains(tag))
    }

    /// Fetch from `remote`.
    fn fetch(&self, remote: &str) -> GitResult<()>;

    /// Switch to `branch`.
    ///
    /// Fails with [`GitError::BranchNotFound`] when the branch exists neither
    /// locally nor on `remote`, unless `allow_create` is set. When the branch
    /// exists on both sides, the local copy is fast-forwarded to the remote.
    fn checkout(&self, branch: &str, remote: &str, allow_create: bool) -> GitResult<()>;

    /// Create an annotated tag at HEAD.
    fn create_tag(&self, tag: &str, message: &str) -> GitResult<()>;

    /// Push the current branch to `remote`, optionally with tags.
    fn push(&self, remote: &str, include_tags: bool) -> GitResult<()>;

    /// Merge `from` into the current branch without resolving conflicts.
    fn merge(&self, from: &str) -> GitResult<MergeOutcome>;

    /// Commits in `range` (`lower..upper`), newest first.
    fn commit_range(&self, range: &str) -> GitResult<Vec<Commit>>;

    /// Full hash of HEAD.
    fn head_commit_hash(&self) -> GitResult<String>;

    /// URL of `remote`, `None` if it is not configured.
    fn remote_url(&self, remote: &str) -> GitResult<Option<String>>;

    /// Stage paths relative to the working directory.
    fn add(&self, paths: &[Utf8PathBuf]) -> GitResult<()>;

    /// Commit whatever is staged.
    fn commit(&self, message: &str) -> GitResult<()>;

    /// Whether the index still holds unmerged entries.
    fn has_unmerged_paths(&self) -> GitResult<bool>;

    /// Whether a merge has stopped and not been committed yet.
    ///
    /// Staging every resolution clears [`has_unmerged_paths`] but leaves the
    /// merge pending until it is committed.
    ///
    /// [`has_unmerged_paths`]: Repository::has_unmerged_paths
    fn merge_in_progress(&self) -> GitResult<bool>;
}

/// [`Repository`] backed by the `git` executable.
#[derive(Debug, Clone)]
pub struct GitRepository {
    dir: Utf8PathBuf,
}

impl GitRepository {
    /// Adapter for the working directory at `dir`.
    pub fn new(dir: impl Into<Utf8PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The working directory this adapter runs in.
    pub fn dir(&self) -> &Utf8Path {
        &self.dir
    }

    /// Check if the directory is inside a work tree.
    #[instrument(skip(self), fields(dir = %self.dir))]
    pub fn is_inside_repo(&self) -> GitResult<bool> {
        match self.git(&["rev-parse", "--is-inside-work-tree"]) {
            Ok(output) => Ok(output.trim() == "true"),
            Err(GitError::Command { .. } | GitError::NotARepo) => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn unmerged_paths(&self) -> GitResult<Vec<String>> {
        let output = self.git(&["diff", "--name-only", "--diff-filter=U"])?;
        Ok(output
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(String::from)
            .collect())
    }

    fn ref_exists(&self, reference: &str) -> bool {
        let spec = format!("{reference}^{{commit}}");
        self.git(&["rev-parse", "--verify", "--quiet", &spec]).is_ok()
    }

    /// Run a git command in the working directory and return its stdout.
    fn git(&self, args: &[&str]) -> GitResult<String> {
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.dir)
            .output()?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).to_string())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();

            if stderr.contains("not a git repository") {
                return Err(GitError::NotARepo);
            }

            Err(GitError::Command {
                command: args.first().unwrap_or(&"").to_string(),
                stderr,
            })
        }
    }
}

const FIELD_SEP: char = '\u{1f}';
const RECORD_SEP: char = '\u{1e}';

impl Repository for GitRepository {
    #[instrument(skip(self), fields(dir = %self.dir))]
    fn current_branch(&self) -> GitResult<Option<String>> {
        // The full ref avoids `heads/4` when a tag `4` also exists.
        match self.git(&["symbolic-ref", "--quiet", "HEAD"]) {
            Ok(output) => {
                let full = output.trim();
                let branch = full.strip_prefix("refs/heads/").unwrap_or(full).to_string();
                debug!(%branch, "current branch");
                Ok(Some(branch))
            }
            // `--quiet` exits 1 without a message when HEAD is detached.
            Err(GitError::Command { stderr, .. }) if stderr.is_empty() => {
                debug!("detached HEAD");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    #[instrument(skip(self), fields(dir = %self.dir))]
    fn list_branches(&self, remote: Option<&str>) -> GitResult<BTreeSet<String>> {
        let namespace = remote.map_or_else(|| "refs/heads".to_string(), |r| format!("refs/remotes/{r}"));
        let output = self.git(&["for-each-ref", "--format=%(refname)", &namespace])?;
        let prefix = format!("{namespace}/");
        let branches: BTreeSet<String> = output
            .lines()
            .filter_map(|line| line.trim().strip_prefix(prefix.as_str()))
            .filter(|name| *name != "HEAD")
            .map(String::from)
            .collect();
        debug!(count = branches.len(), "branches");
        Ok(branches)
    }

    #[instrument(skip(self), fields(dir = %self.dir))]
    fn list_tags(&self) -> GitResult<BTreeSet<String>> {
        let output = self.git(&["tag", "--list"])?;
        Ok(output
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(String::from)
            .collect())
    }

    #[instrument(skip(self), fields(dir = %self.dir))]
    fn fetch(&self, remote: &str) -> GitResult<()> {
        self.git(&["fetch", remote])?;
        Ok(())
    }

    #[instrument(skip(self), fields(dir = %self.dir))]
    fn checkout(&self, branch: &str, remote: &str, allow_create: bool) -> GitResult<()> {
        let local = self.list_branches(None)?;
        let remote_branches = self.list_branches(Some(remote))?;
        let is_local = local.contains(branch);
        let is_remote = remote_branches.contains(branch);

        if !is_local && !is_remote {
            if !allow_create {
                return Err(GitError::BranchNotFound {
                    branch: branch.to_string(),
                });
            }
            debug!(%branch, "creating branch");
            self.git(&["checkout", "-B", branch])?;
            return Ok(());
        }

        if self.current_branch()?.as_deref() != Some(branch) {
            // Explicit ref paths keep a tag with the same name from winning.
            let source = if is_local {
                format!("refs/heads/{branch}")
            } else {
                format!("refs/remotes/{remote}/{branch}")
            };
            if is_local {
                self.git(&["checkout", branch, "--"])?;
            } else {
                self.git(&["checkout", "-B", branch, &source])?;
            }
            debug!(%branch, %source, "switched branch");
        }

        if is_local && is_remote {
            let upstream = format!("refs/remotes/{remote}/{branch}");
            self.git(&["merge", "--ff-only", &upstream])?;
            debug!(%branch, "fast-forwarded from remote");
        }
        Ok(())
    }

    #[instrument(skip(self, message), fields(dir = %self.dir))]
    fn create_tag(&self, tag: &str, message: &str) -> GitResult<()> {
        self.git(&["tag", "-a", tag, "-m", message])?;
        Ok(())
    }

    #[instrument(skip(self), fields(dir = %self.dir))]
    fn push(&self, remote: &str, include_tags: bool) -> GitResult<()> {
        let branch = self.current_branch()?.ok_or(GitError::NoCurrentBranch)?;
        let refspec = format!("refs/heads/{branch}");
        let mut args = vec!["push", remote, refspec.as_str()];
        if include_tags {
            args.push("--follow-tags");
        }
        self.git(&args)?;
        Ok(())
    }

    #[instrument(skip(self), fields(dir = %self.dir))]
    fn merge(&self, from: &str) -> GitResult<MergeOutcome> {
        match self.git(&["merge", "--no-edit", from]) {
            Ok(_) => Ok(MergeOutcome::Clean),
            Err(GitError::Command { command, stderr }) => {
                let paths = self.unmerged_paths()?;
                if paths.is_empty() {
                    Err(GitError::Command { command, stderr })
                } else {
                    debug!(count = paths.len(), "merge conflict");
                    Ok(MergeOutcome::Conflict { paths })
                }
            }
            Err(e) => Err(e),
        }
    }

    #[instrument(skip(self), fields(dir = %self.dir))]
    fn commit_range(&self, range: &str) -> GitResult<Vec<Commit>> {
        let lower = range.split_once("..").map_or(range, |(lower, _)| lower);
        if !lower.is_empty() && !self.ref_exists(lower) {
            return Err(GitError::RangeNotFound {
                range: range.to_string(),
                reference: lower.to_string(),
            });
        }

        let format = "--format=%H%x1f%an%x1f%at%x1f%s%x1e";
        let output = self.git(&["log", format, range, "--"])?;
        let commits = parse_log(&output);
        debug!(count = commits.len(), "commits in range");
        Ok(commits)
    }

    #[instrument(skip(self), fields(dir = %self.dir))]
    fn head_commit_hash(&self) -> GitResult<String> {
        Ok(self.git(&["rev-parse", "HEAD"])?.trim().to_string())
    }

    #[instrument(skip(self), fields(dir = %self.dir))]
    fn remote_url(&self, remote: &str) -> GitResult<Option<String>> {
        match self.git(&["remote", "get-url", remote]) {
            Ok(url) => {
                let url = url.trim().to_string();
                debug!(%remote, %url, "remote URL");
                Ok(Some(url))
            }
            Err(GitError::Command { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    #[instrument(skip(self), fields(dir = %self.dir))]
    fn add(&self, paths: &[Utf8PathBuf]) -> GitResult<()> {
        if paths.is_empty() {
            return Ok(());
        }
        let mut args = vec!["add", "--"];
        args.extend(paths.iter().map(|p| p.as_str()));
        self.git(&args)?;
        Ok(())
    }

    #[instrument(skip(self), fields(dir = %self.dir))]
    fn commit(&self, message: &str) -> GitResult<()> {
        self.git(&["commit", "-m", message])?;
        Ok(())
    }

    #[instrument(skip(self), fields(dir = %self.dir))]
    fn has_unmerged_paths(&self) -> GitResult<bool> {
        Ok(!self.unmerged_paths()?.is_empty())
    }

    #[instrument(skip(self), fields(dir = %self.dir))]
    fn merge_in_progress(&self) -> GitResult<bool> {
        match self.git(&["rev-parse", "-q", "--verify", "MERGE_HEAD"]) {
            Ok(_) => Ok(true),
            Err(GitError::Command { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

/// Parse `git log` output written with unit/record separators.
fn parse_log(output: &str) -> Vec<Commit> {
    output
        .split(RECORD_SEP)
        .map(str::trim)
        .filter(|record| !record.is_empty())
        .filter_map(|record| {
            let mut fields = record.splitn(4, FIELD_SEP);
            let hash = fields.next()?;
            let author = fields.next()?;
            let timestamp = fields.next()?.parse().ok()?;
            let subject = fields.next().unwrap_or("");
            Some(Commit::new(hash, author, timestamp, subject))
        })
        .collect()
}

/// Parse owner and repo from a git remote URL.
///
/// Handles both HTTPS and SSH formats:
/// - `https://github.com/owner/repo.git`
/// - `git@github.com:owner/repo.git`
///
/// Returns `None` if the URL cannot be parsed.
pub fn parse_owner_repo(url: &str) -> Option<(String, String)> {
    let path = url.strip_prefix("git@").map_or_else(
        || {
            url.split("//")
                .nth(1)
                .and_then(|after_scheme| after_scheme.split_once('/').map(|(_, path)| path))
        },
        |rest| rest.split_once(':').map(|(_, path)| path),
    )?;

    let path = path.strip_suffix(".git").unwrap_or(path);
    let (owner, repo) = path.split_once('/')?;

    if owner.is_empty() || repo.is_empty() || repo.contains('/') {
        return None;
    }

    Some((owner.to_string(), repo.to_string()))
}

#[cfg(test)]
mod tests {
    use super::sandbox::{commit_file, git_available, run, scratch_repo, Origin};
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn parse_log_reads_records() {
        let raw = "abcdef0123\u{1f}Ada\u{1f}1700000000\u{1f}API: rename\u{1e}\n\
                   1234567890\u{1f}Bob\u{1f}1690000000\u{1f}BUG: crash\u{1e}\n";
        let commits = parse_log(raw);
        assert_eq!(commits.len(), 2);
        assert_eq!(commits[0].short_hash, "abcdef0");
        assert_eq!(commits[0].author, "Ada");
        assert_eq!(commits[0].timestamp, 1_700_000_000);
        assert_eq!(commits[1].subject, "BUG: crash");
    }

    #[test]
    fn parse_log_skips_malformed_records() {
        let commits = parse_log("garbage\u{1e}\n\u{1e}");
        assert!(commits.is_empty());
    }

    #[test]
    fn commit_range_and_tags_against_real_git() {
        if !git_available() {
            return;
        }
        let (_tmp, repo) = scratch_repo();
        commit_file(&repo, "a.txt", "1", "Initial");
        repo.create_tag("4.0.0", "Release 4.0.0").unwrap();
        commit_file(&repo, "a.txt", "2", "BUG: fix crash");

        assert!(repo.tag_exists("4.0.0").unwrap());
        assert_eq!(repo.current_branch().unwrap().as_deref(), Some("main"));

        let commits = repo.commit_range("4.0.0..HEAD").unwrap();
        assert_eq!(commits.len(), 1);
        assert_eq!(commits[0].subject, "BUG: fix crash");
        assert_eq!(repo.head_commit_hash().unwrap(), commits[0].hash);
    }

    #[test]
    fn commit_range_missing_lower_bound() {
        if !git_available() {
            return;
        }
        let (_tmp, repo) = scratch_repo();
        commit_file(&repo, "a.txt", "1", "Initial");

        let err = repo.commit_range("3.9.9..HEAD").unwrap_err();
        assert!(
            matches!(err, GitError::RangeNotFound { ref reference, .. } if reference == "3.9.9")
        );
    }

    #[test]
    fn checkout_requires_existing_branch_unless_creating() {
        if !git_available() {
            return;
        }
        let (_tmp, repo) = scratch_repo();
        commit_file(&repo, "a.txt", "1", "Initial");

        let err = repo.checkout("4.1", "origin", false).unwrap_err();
        assert!(matches!(err, GitError::BranchNotFound { .. }));

        repo.checkout("4.1", "origin", true).unwrap();
        assert_eq!(repo.current_branch().unwrap().as_deref(), Some("4.1"));

        repo.checkout("main", "origin", false).unwrap();
        assert_eq!(repo.current_branch().unwrap().as_deref(), Some("main"));
        assert!(repo.list_branches(None).unwrap().contains("4.1"));
    }

    #[test]
    fn checkout_prefers_branch_over_same_named_tag() {
        if !git_available() {
            return;
        }
        let (_tmp, repo) = scratch_repo();
        commit_file(&repo, "a.txt", "1", "Initial");
        repo.create_tag("4", "tag shadowing the branch").unwrap();
        run(repo.dir(), &["branch", "4"]);
        commit_file(&repo, "a.txt", "2", "Ahead on main");

        repo.checkout("4", "origin", false).unwrap();
        assert_eq!(repo.current_branch().unwrap().as_deref(), Some("4"));
    }

    #[test]
    fn merge_reports_conflicts() {
        if !git_available() {
            return;
        }
        let (_tmp, repo) = scratch_repo();
        commit_file(&repo, "a.txt", "base", "Initial");
        run(repo.dir(), &["checkout", "-q", "-b", "4.1"]);
        commit_file(&repo, "a.txt", "from 4.1", "Change on 4.1");
        run(repo.dir(), &["checkout", "-q", "main"]);
        commit_file(&repo, "a.txt", "from main", "Change on main");

        let outcome = repo.merge("4.1").unwrap();
        assert_eq!(
            outcome,
            MergeOutcome::Conflict {
                paths: vec!["a.txt".to_string()]
            }
        );
        assert!(repo.has_unmerged_paths().unwrap());
    }

    #[test]
    fn checkout_fast_forwards_local_branch_from_remote() {
        if !git_available() {
            return;
        }
        let origin = Origin::new();
        let repo = origin.clone_into("work");
        commit_file(&repo, "a.txt", "1", "Initial");
        run(repo.dir(), &["push", "-q", "origin", "HEAD:refs/heads/4"]);
        run(repo.dir(), &["branch", "-q", "4", "origin/4"]);

        let other = origin.clone_into("other");
        run(other.dir(), &["checkout", "-q", "4"]);
        commit_file(&other, "a.txt", "2", "Ahead on origin");
        run(other.dir(), &["push", "-q", "origin", "4"]);
        let remote_tip = other.head_commit_hash().unwrap();

        repo.fetch("origin").unwrap();
        assert_ne!(repo.head_commit_hash().unwrap(), remote_tip);
        repo.checkout("4", "origin", false).unwrap();
        assert_eq!(repo.current_branch().unwrap().as_deref(), Some("4"));
        assert_eq!(repo.head_commit_hash().unwrap(), remote_tip);
    }

    #[test]
    fn checkout_never_rewrites_diverged_local_branch() {
        if !git_available() {
            return;
        }
        let origin = Origin::new();
        let repo = origin.clone_into("work");
        commit_file(&repo, "a.txt", "1", "Initial");
        run(repo.dir(), &["push", "-q", "origin", "HEAD:refs/heads/4"]);
        run(repo.dir(), &["checkout", "-q", "-b", "4", "origin/4"]);
        commit_file(&repo, "local.txt", "local", "Local only");
        let local_tip = repo.head_commit_hash().unwrap();

        let other = origin.clone_into("other");
        run(other.dir(), &["checkout", "-q", "4"]);
        commit_file(&other, "a.txt", "2", "Remote only");
        run(other.dir(), &["push", "-q", "origin", "4"]);

        repo.fetch("origin").unwrap();
        assert!(repo.checkout("4", "origin", false).is_err());
        assert_eq!(repo.head_commit_hash().unwrap(), local_tip);
    }

    #[test]
    fn current_branch_is_none_when_detached() {
        if !git_available() {
            return;
        }
        let (_tmp, repo) = scratch_repo();
        commit_file(&repo, "a.txt", "1", "Initial");
        run(repo.dir(), &["checkout", "-q", "--detach"]);
        assert_eq!(repo.current_branch().unwrap(), None);
    }

    #[test]
    fn push_with_same_named_tag_updates_branch() {
        if !git_available() {
            return;
        }
        let origin = Origin::new();
        let repo = origin.clone_into("work");
        commit_file(&repo, "a.txt", "1", "Initial");
        repo.checkout("4", "origin", true).unwrap();
        repo.create_tag("4", "tag shadowing the branch").unwrap();

        repo.push("origin", true).unwrap();
        assert!(origin.has_branch("4"));
        assert_eq!(origin.resolve("refs/heads/4"), repo.head_commit_hash().unwrap());
    }

    #[test]
    fn staged_resolution_leaves_merge_in_progress() {
        if !git_available() {
            return;
        }
        let (_tmp, repo) = scratch_repo();
        commit_file(&repo, "a.txt", "base", "Initial");
        run(repo.dir(), &["checkout", "-q", "-b", "4.1"]);
        commit_file(&repo, "a.txt", "from 4.1", "Change on 4.1");
        run(repo.dir(), &["checkout", "-q", "main"]);
        commit_file(&repo, "a.txt", "from main", "Change on main");
        assert!(!repo.merge_in_progress().unwrap());

        repo.merge("4.1").unwrap();
        std::fs::write(repo.dir().join("a.txt"), "resolved").unwrap();
        run(repo.dir(), &["add", "a.txt"]);
        assert!(!repo.has_unmerged_paths().unwrap());
        assert!(repo.merge_in_progress().unwrap());

        run(repo.dir(), &["commit", "-q", "--no-edit"]);
        assert!(!repo.merge_in_progress().unwrap());
    }

    #[test]
    fn add_and_commit_stage_only_named_paths() {
        if !git_available() {
            return;
        }
        let (_tmp, repo) = scratch_repo();
        commit_file(&repo, "a.txt", "1", "Initial");
        std::fs::create_dir_all(repo.dir().join("lang")).unwrap();
        std::fs::write(repo.dir().join("lang/en.yml"), "en:\n").unwrap();
        std::fs::write(repo.dir().join("untracked.txt"), "x").unwrap();

        repo.add(&[Utf8PathBuf::from("lang")]).unwrap();
        repo.commit("Update translations").unwrap();

        let commits = repo.commit_range("HEAD~1..HEAD").unwrap();
        assert_eq!(commits[0].subject, "Update translations");
        let status = sandbox::output(repo.dir(), &["status", "--porcelain"]);
        assert_eq!(status, "?? untracked.txt");
    }

    #[test]
    fn merge_clean() {
        if !git_available() {
            return;
        }
        let (_tmp, repo) = scratch_repo();
        commit_file(&repo, "a.txt", "base", "Initial");
        run(repo.dir(), &["checkout", "-q", "-b", "4.1"]);
        commit_file(&repo, "b.txt", "new", "Add b");
        run(repo.dir(), &["checkout", "-q", "main"]);

        assert_eq!(repo.merge("4.1").unwrap(), MergeOutcome::Clean);
        assert!(!repo.has_unmerged_paths().unwrap());
    }

    #[test]
    fn push_without_remote_fails() {
        if !git_available() {
            return;
        }
        let (_tmp, repo) = scratch_repo();
        commit_file(&repo, "a.txt", "1", "Initial");
        assert!(repo.push("origin", true).is_err());
        assert_eq!(repo.remote_url("origin").unwrap(), None);
    }

    #[test]
    fn push_detached_head_is_no_current_branch() {
        if !git_available() {
            return;
        }
        let (_tmp, repo) = scratch_repo();
        commit_file(&repo, "a.txt", "1", "Initial");
        run(repo.dir(), &["checkout", "-q", "--detach"]);
        assert!(matches!(
            repo.push("origin", false),
            Err(GitError::NoCurrentBranch)
        ));
    }

    #[test]
    fn is_inside_repo_outside() {
        let tmp = TempDir::new().unwrap();
        let repo = GitRepository::new(Utf8Path::from_path(tmp.path()).unwrap());
        // Temp dirs may sit under a repo on some hosts; only assert no error.
        assert!(repo.is_inside_repo().is_ok());
    }

    #[test]
    fn parse_owner_repo_https() {
        let result = parse_owner_repo("https://github.com/silverstripe/silverstripe-framework.git");
        assert_eq!(
            result,
            Some(("silverstripe".into(), "silverstripe-framework".into()))
        );
    }

    #[test]
    fn parse_owner_repo_https_no_suffix() {
        let result = parse_owner_repo("https://github.com/silverstripe/silverstripe-cms");
        assert_eq!(result, Some(("silverstripe".into(), "silverstripe-cms".into())));
    }

    #[test]
    fn parse_owner_repo_ssh() {
        let result = parse_owner_repo("git@github.com:silverstripe/silverstripe-cms.git");
        assert_eq!(result, Some(("silverstripe".into(), "silverstripe-cms".into())));
    }

    #[test]
    fn parse_owner_repo_invalid() {
        assert!(parse_owner_repo("not-a-url").is_none());
        assert!(parse_owner_repo("").is_none());
        assert!(parse_owner_repo("https://github.com/a/b/c").is_none());
    }
}
