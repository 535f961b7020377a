//! Throwaway repositories driven by the real `git` binary.

use std::process::Command;

use camino::{Utf8Path, Utf8PathBuf};
use tempfile::TempDir;

use super::GitRepository;

const IDENTITY: [(&str, &str); 4] = [
    ("GIT_AUTHOR_NAME", "Release Bot"),
    ("GIT_AUTHOR_EMAIL", "bot@example.com"),
    ("GIT_COMMITTER_NAME", "Release Bot"),
    ("GIT_COMMITTER_EMAIL", "bot@example.com"),
];

pub(crate) fn git_available() -> bool {
    which::which("git").is_ok()
}

/// Run git in `dir` and return stdout, panicking on failure.
pub(crate) fn output(dir: &Utf8Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .envs(IDENTITY)
        .output()
        .unwrap();
    assert!(output.status.success(), "git {args:?} failed: {output:?}");
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

pub(crate) fn run(dir: &Utf8Path, args: &[&str]) {
    output(dir, args);
}

fn configure(dir: &Utf8Path) {
    run(dir, &["config", "user.name", "Release Bot"]);
    run(dir, &["config", "user.email", "bot@example.com"]);
    run(dir, &["config", "commit.gpgsign", "false"]);
    run(dir, &["config", "tag.gpgsign", "false"]);
}

/// A single repository on `main` with no remote.
pub(crate) fn scratch_repo() -> (TempDir, GitRepository) {
    let tmp = TempDir::new().unwrap();
    let dir = Utf8Path::from_path(tmp.path()).unwrap().to_path_buf();
    run(&dir, &["init", "-q", "-b", "main"]);
    configure(&dir);
    (tmp, GitRepository::new(dir))
}

pub(crate) fn commit_file(repo: &GitRepository, name: &str, contents: &str, message: &str) {
    std::fs::write(repo.dir().join(name), contents).unwrap();
    run(repo.dir(), &["add", name]);
    run(repo.dir(), &["commit", "-q", "-m", message]);
}

/// A bare repository plus any number of clones of it, all in one temp dir.
pub(crate) struct Origin {
    tmp: TempDir,
}

impl Origin {
    pub(crate) fn new() -> Self {
        let tmp = TempDir::new().unwrap();
        let origin = Self { tmp };
        run(origin.root(), &["init", "-q", "--bare", "-b", "main", "origin.git"]);
        origin
    }

    fn root(&self) -> &Utf8Path {
        Utf8Path::from_path(self.tmp.path()).unwrap()
    }

    pub(crate) fn path(&self) -> Utf8PathBuf {
        self.root().join("origin.git")
    }

    /// Clone into `name`, with `origin` as the remote.
    pub(crate) fn clone_into(&self, name: &str) -> GitRepository {
        let origin = self.path();
        run(self.root(), &["clone", "-q", origin.as_str(), name]);
        let dir = self.root().join(name);
        configure(&dir);
        GitRepository::new(dir)
    }

    pub(crate) fn has_branch(&self, branch: &str) -> bool {
        let listed = output(&self.path(), &["branch", "--list", branch]);
        !listed.is_empty()
    }

    /// Commit hash `reference` points at in the bare repository.
    pub(crate) fn resolve(&self, reference: &str) -> String {
        output(&self.path(), &["rev-parse", reference])
    }

    /// Whether `ancestor` is reachable from `branch` in the bare repository.
    pub(crate) fn contains(&self, branch: &str, ancestor: &str) -> bool {
        Command::new("git")
            .args(["merge-base", "--is-ancestor", ancestor, branch])
            .current_dir(self.path())
            .status()
            .is_ok_and(|status| status.success())
    }
}
