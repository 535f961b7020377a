//! In-memory [`Repository`] for tests.
//!
//! State lives behind a mutex so the `&self` trait methods can mutate it.
//! Every mutating call is appended to a call log that tests can inspect.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use camino::Utf8PathBuf;

use super::{Commit, GitError, GitResult, MergeOutcome, Repository};

#[derive(Debug, Default)]
struct MockState {
    current_branch: Option<String>,
    local_branches: BTreeSet<String>,
    remote_branches: BTreeMap<String, BTreeSet<String>>,
    tags: BTreeMap<String, String>,
    commits: Vec<Commit>,
    conflicts: BTreeMap<String, Vec<String>>,
    unmerged: Vec<String>,
    merging: bool,
    failing: BTreeSet<&'static str>,
    remote_url: Option<String>,
    head: String,
    reject_push: bool,
    calls: Vec<String>,
}

/// Mock repository for exercising pipeline logic without `git`.
#[derive(Debug, Default)]
pub struct MockRepository {
    state: Mutex<MockState>,
}

impl MockRepository {
    /// Create an empty repository on branch `main`.
    pub fn new() -> Self {
        let repo = Self::default();
        {
            let mut state = repo.state();
            state.current_branch = Some("main".to_string());
            state.local_branches.insert("main".to_string());
            state.head = "0000000000000000000000000000000000000000".to_string();
        }
        repo
    }

    /// Add a local branch.
    #[must_use]
    pub fn with_branch(self, name: &str) -> Self {
        self.state().local_branches.insert(name.to_string());
        self
    }

    /// Add a branch on `remote`.
    #[must_use]
    pub fn with_remote_branch(self, remote: &str, name: &str) -> Self {
        self.state()
            .remote_branches
            .entry(remote.to_string())
            .or_default()
            .insert(name.to_string());
        self
    }

    /// Switch HEAD to `name` (`None` detaches).
    #[must_use]
    pub fn on_branch(self, name: Option<&str>) -> Self {
        {
            let mut state = self.state();
            state.current_branch = name.map(String::from);
            if let Some(name) = name {
                state.local_branches.insert(name.to_string());
            }
        }
        self
    }

    /// Add an existing tag.
    #[must_use]
    pub fn with_tag(self, name: &str) -> Self {
        self.state().tags.insert(name.to_string(), String::new());
        self
    }

    /// Add a commit returned from any resolvable range (newest first).
    #[must_use]
    pub fn with_commit(self, commit: Commit) -> Self {
        {
            let mut state = self.state();
            if state.commits.is_empty() {
                state.head.clone_from(&commit.hash);
            }
            state.commits.push(commit);
        }
        self
    }

    /// Make merging `from` stop with conflicts on `paths`.
    #[must_use]
    pub fn with_conflict(self, from: &str, paths: &[&str]) -> Self {
        self.state().conflicts.insert(
            from.to_string(),
            paths.iter().map(|p| (*p).to_string()).collect(),
        );
        self
    }

    /// Configure the URL reported for every remote.
    #[must_use]
    pub fn with_remote_url(self, url: &str) -> Self {
        self.state().remote_url = Some(url.to_string());
        self
    }

    /// Make every push fail.
    #[must_use]
    pub fn rejecting_push(self) -> Self {
        self.state().reject_push = true;
        self
    }

    /// Make the named trait method fail with a git command error.
    #[must_use]
    pub fn failing_on(self, method: &'static str) -> Self {
        self.state().failing.insert(method);
        self
    }

    /// Resolve conflicts and commit the merge.
    pub fn resolve_conflicts(&self) {
        let mut state = self.state();
        state.unmerged.clear();
        state.merging = false;
    }

    /// Stage resolutions without committing; the merge stays in progress.
    pub fn stage_resolutions(&self) {
        self.state().unmerged.clear();
    }

    /// Mutating calls made so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    /// Whether any recorded call starts with `prefix`.
    pub fn called(&self, prefix: &str) -> bool {
        self.state().calls.iter().any(|c| c.starts_with(prefix))
    }

    /// Message stored for `tag`, if it exists.
    pub fn tag_message(&self, tag: &str) -> Option<String> {
        self.state().tags.get(tag).cloned()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(state: &mut MockState, call: String) {
        state.calls.push(call);
    }

    fn check(state: &MockState, method: &'static str) -> GitResult<()> {
        if state.failing.contains(method) {
            return Err(GitError::Command {
                command: method.to_string(),
                stderr: format!("fatal: {method} failed"),
            });
        }
        Ok(())
    }
}

impl Repository for MockRepository {
    fn current_branch(&self) -> GitResult<Option<String>> {
        Ok(self.state().current_branch.clone())
    }

    fn list_branches(&self, remote: Option<&str>) -> GitResult<BTreeSet<String>> {
        let state = self.state();
        Ok(match remote {
            None => state.local_branches.clone(),
            Some(remote) => state
                .remote_branches
                .get(remote)
                .cloned()
                .unwrap_or_default(),
        })
    }

    fn list_tags(&self) -> GitResult<BTreeSet<String>> {
        let state = self.state();
        Self::check(&state, "list_tags")?;
        Ok(state.tags.keys().cloned().collect())
    }

    fn fetch(&self, remote: &str) -> GitResult<()> {
        let mut state = self.state();
        Self::check(&state, "fetch")?;
        Self::record(&mut state, format!("fetch {remote}"));
        Ok(())
    }

    fn checkout(&self, branch: &str, remote: &str, allow_create: bool) -> GitResult<()> {
        let mut state = self.state();
        let known = state.local_branches.contains(branch)
            || state
                .remote_branches
                .get(remote)
                .is_some_and(|branches| branches.contains(branch));
        if !known && !allow_create {
            return Err(GitError::BranchNotFound {
                branch: branch.to_string(),
            });
        }
        state.local_branches.insert(branch.to_string());
        state.current_branch = Some(branch.to_string());
        Self::record(&mut state, format!("checkout {branch}"));
        Ok(())
    }

    fn create_tag(&self, tag: &str, message: &str) -> GitResult<()> {
        let mut state = self.state();
        if state.tags.contains_key(tag) {
            return Err(GitError::Command {
                command: "tag".to_string(),
                stderr: format!("fatal: tag '{tag}' already exists"),
            });
        }
        state.tags.insert(tag.to_string(), message.to_string());
        Self::record(&mut state, format!("tag {tag}"));
        Ok(())
    }

    fn push(&self, remote: &str, include_tags: bool) -> GitResult<()> {
        let mut state = self.state();
        let branch = state
            .current_branch
            .clone()
            .ok_or(GitError::NoCurrentBranch)?;
        if state.reject_push {
            return Err(GitError::Command {
                command: "push".to_string(),
                stderr: "remote rejected".to_string(),
            });
        }
        let suffix = if include_tags { " --follow-tags" } else { "" };
        Self::record(&mut state, format!("push {remote} {branch}{suffix}"));
        Ok(())
    }

    fn merge(&self, from: &str) -> GitResult<MergeOutcome> {
        let mut state = self.state();
        Self::record(&mut state, format!("merge {from}"));
        match state.conflicts.get(from).cloned() {
            Some(paths) => {
                state.unmerged.clone_from(&paths);
                state.merging = true;
                Ok(MergeOutcome::Conflict { paths })
            }
            None => Ok(MergeOutcome::Clean),
        }
    }

    fn commit_range(&self, range: &str) -> GitResult<Vec<Commit>> {
        let state = self.state();
        Self::check(&state, "commit_range")?;
        let lower = range.split_once("..").map_or(range, |(lower, _)| lower);
        let resolvable = state.tags.contains_key(lower)
            || state.local_branches.contains(lower)
            || state.commits.iter().any(|c| c.hash == lower);
        if !resolvable {
            return Err(GitError::RangeNotFound {
                range: range.to_string(),
                reference: lower.to_string(),
            });
        }
        Ok(state.commits.clone())
    }

    fn head_commit_hash(&self) -> GitResult<String> {
        Ok(self.state().head.clone())
    }

    fn remote_url(&self, _remote: &str) -> GitResult<Option<String>> {
        Ok(self.state().remote_url.clone())
    }

    fn add(&self, paths: &[Utf8PathBuf]) -> GitResult<()> {
        let mut state = self.state();
        let joined: Vec<&str> = paths.iter().map(|p| p.as_str()).collect();
        Self::record(&mut state, format!("add {}", joined.join(" ")));
        Ok(())
    }

    fn commit(&self, message: &str) -> GitResult<()> {
        let mut state = self.state();
        Self::record(&mut state, format!("commit {message}"));
        Ok(())
    }

    fn has_unmerged_paths(&self) -> GitResult<bool> {
        Ok(!self.state().unmerged.is_empty())
    }

    fn merge_in_progress(&self) -> GitResult<bool> {
        Ok(self.state().merging)
    }
}
