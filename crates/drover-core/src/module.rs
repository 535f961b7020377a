//! Module graph.
//!
//! A [`Module`] is one git-backed code unit with a `composer.json` manifest.
//! A [`Project`] is the installer checkout: a root module plus the child
//! modules found in its immediate subdirectories. [`ModuleFilter`] decides
//! which of those take part in a command.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::git::{GitRepository, GitResult, Repository, parse_owner_repo};

/// Manifest filename every module carries.
pub const MANIFEST_FILE: &str = "composer.json";

/// Constraint value marking a dependency as release-tracked.
pub const SELF_VERSION: &str = "self.version";

/// Errors from module discovery.
#[derive(Error, Debug)]
pub enum ModuleError {
    /// The directory has no manifest.
    #[error("{path} is not a module (no {MANIFEST_FILE})")]
    NotAModule {
        /// Offending directory.
        path: Utf8PathBuf,
    },

    /// Filesystem access failed.
    #[error("failed to read {path}: {source}")]
    Io {
        /// Path being read.
        path: Utf8PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The manifest is not valid JSON of the expected shape.
    #[error("invalid manifest {path}: {source}")]
    Manifest {
        /// Manifest path.
        path: Utf8PathBuf,
        /// Underlying error.
        source: serde_json::Error,
    },

    /// A named module is not part of the project.
    #[error("module {0} not found")]
    UnknownModule(String),
}

/// Result alias for module operations.
pub type ModuleResult<T> = Result<T, ModuleError>;

/// The parts of `composer.json` we read.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Manifest {
    /// Package name (`vendor/package`).
    #[serde(default)]
    pub name: Option<String>,
    /// Dependency map of package name to constraint.
    #[serde(default)]
    pub require: BTreeMap<String, String>,
}

impl Manifest {
    /// Read and parse the manifest in `dir`.
    pub fn read(dir: &Utf8Path) -> ModuleResult<Self> {
        let path = dir.join(MANIFEST_FILE);
        let raw = std::fs::read_to_string(&path).map_err(|source| ModuleError::Io {
            path: path.clone(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ModuleError::Manifest { path, source })
    }

    /// Package names required with the `self.version` constraint.
    pub fn self_version_packages(&self) -> BTreeSet<String> {
        self.require
            .iter()
            .filter(|(_, constraint)| constraint.trim() == SELF_VERSION)
            .map(|(name, _)| name.clone())
            .collect()
    }
}

/// Builds the repository adapter for a module directory.
pub type RepositoryFactory<'a> = &'a dyn Fn(&Utf8Path) -> Arc<dyn Repository>;

/// One module: a directory, a name, and its repository adapter.
pub struct Module {
    directory: Utf8PathBuf,
    name: String,
    parent: Option<String>,
    repo: Arc<dyn Repository>,
}

impl fmt::Debug for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Module")
            .field("name", &self.name)
            .field("directory", &self.directory)
            .field("parent", &self.parent)
            .finish_non_exhaustive()
    }
}

impl Module {
    /// Open the module at `directory`, backed by `git`.
    pub fn open(
        directory: impl Into<Utf8PathBuf>,
        name: impl Into<String>,
        parent: Option<String>,
    ) -> ModuleResult<Self> {
        let directory = directory.into();
        let repo = Arc::new(GitRepository::new(directory.clone()));
        Self::with_repository(directory, name, parent, repo)
    }

    /// Open the module at `directory` with a supplied adapter.
    pub fn with_repository(
        directory: impl Into<Utf8PathBuf>,
        name: impl Into<String>,
        parent: Option<String>,
        repo: Arc<dyn Repository>,
    ) -> ModuleResult<Self> {
        let directory = directory.into();
        if !directory.join(MANIFEST_FILE).is_file() {
            return Err(ModuleError::NotAModule { path: directory });
        }
        Ok(Self {
            directory,
            name: name.into(),
            parent,
            repo,
        })
    }

    /// Module name (directory basename, or the root name).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Absolute module directory.
    pub fn directory(&self) -> &Utf8Path {
        &self.directory
    }

    /// Name of the owning project, `None` for the root.
    pub fn parent(&self) -> Option<&str> {
        self.parent.as_deref()
    }

    /// The repository adapter.
    pub fn repo(&self) -> &dyn Repository {
        self.repo.as_ref()
    }

    /// Parsed manifest.
    pub fn manifest(&self) -> ModuleResult<Manifest> {
        Manifest::read(&self.directory)
    }

    /// Package name from the manifest, if declared.
    pub fn package_name(&self) -> ModuleResult<Option<String>> {
        Ok(self.manifest()?.name)
    }

    /// Package name, falling back to the module name.
    pub fn display_name(&self) -> String {
        self.package_name()
            .ok()
            .flatten()
            .unwrap_or_else(|| self.name.clone())
    }

    /// YAML translation directory.
    pub fn lang_directory(&self) -> Utf8PathBuf {
        self.directory.join("lang")
    }

    /// JavaScript translation directories that exist in this module.
    pub fn js_lang_directories(&self) -> Vec<Utf8PathBuf> {
        ["javascript/lang", "client/lang"]
            .iter()
            .map(|rel| self.directory.join(rel))
            .filter(|dir| dir.is_dir())
            .collect()
    }

    /// Whether the module is configured for the translation service.
    pub fn is_translatable(&self) -> bool {
        self.directory.join(".tx").join("config").is_file()
    }

    /// `owner/repo` of the GitHub remote, if it is one.
    pub fn github_slug(&self, remote: &str) -> GitResult<Option<String>> {
        let url = self.repo.remote_url(remote)?;
        Ok(url
            .as_deref()
            .and_then(parse_owner_repo)
            .map(|(owner, repo)| format!("{owner}/{repo}")))
    }

    /// Web URL of the repository with a trailing slash, if on GitHub.
    pub fn link(&self, remote: &str) -> GitResult<Option<String>> {
        Ok(self
            .github_slug(remote)?
            .map(|slug| format!("https://github.com/{slug}/")))
    }
}

/// Names and directories that shape project discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectLayout {
    /// Name given to the root module.
    pub root_name: String,
    /// Subdirectories never treated as modules.
    pub ignore_dirs: Vec<String>,
}

impl Default for ProjectLayout {
    fn default() -> Self {
        Self {
            root_name: "installer".to_string(),
            ignore_dirs: vec!["assets".into(), "mysite".into(), "vendor".into()],
        }
    }
}

/// Whether `dir` looks like a module: it holds a `_config.php` file or a
/// `_config/` directory and its name is not in `ignore_dirs`.
pub fn is_module_path(dir: &Utf8Path, ignore_dirs: &[String]) -> bool {
    let Some(name) = dir.file_name() else {
        return false;
    };
    if ignore_dirs.iter().any(|ignored| ignored == name) {
        return false;
    }
    dir.join("_config.php").is_file() || dir.join("_config").is_dir()
}

/// Which modules a command operates on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleFilter {
    /// Module names to include (or exclude, when `exclusive`).
    pub names: Vec<String>,
    /// Treat `names` as an exclusion list.
    pub exclusive: bool,
    /// Without explicit names, keep only children the root requires as
    /// `self.version`.
    pub require_self_version: bool,
}

impl Default for ModuleFilter {
    fn default() -> Self {
        Self {
            names: Vec::new(),
            exclusive: false,
            require_self_version: true,
        }
    }
}

impl ModuleFilter {
    /// Filter on `names`, inclusive unless `exclusive`.
    pub fn new(names: Vec<String>, exclusive: bool) -> Self {
        Self {
            names,
            exclusive,
            ..Self::default()
        }
    }

    /// Skip the `self.version` cross-check.
    #[must_use]
    pub const fn without_self_version_check(mut self) -> Self {
        self.require_self_version = false;
        self
    }

    /// Whether explicit names were given.
    pub fn is_explicit(&self) -> bool {
        !self.names.is_empty()
    }

    /// The name rule: empty filter, or membership XOR exclusive.
    pub fn allows(&self, name: &str) -> bool {
        self.names.is_empty() || (self.names.iter().any(|n| n == name) != self.exclusive)
    }
}

/// The installer project: root module plus discovered children.
#[derive(Debug)]
pub struct Project {
    root: Module,
    children: Vec<Module>,
}

impl Project {
    /// Whether `dir` already holds a project.
    pub fn exists_in(dir: &Utf8Path) -> bool {
        dir.join(MANIFEST_FILE).is_file()
    }

    /// Open the project in `dir`, backing each module with `git`.
    pub fn open(dir: &Utf8Path, layout: &ProjectLayout) -> ModuleResult<Self> {
        Self::open_with(dir, layout, &|path| {
            Arc::new(GitRepository::new(path.to_path_buf())) as Arc<dyn Repository>
        })
    }

    /// Open the project in `dir`, building adapters with `factory`.
    #[instrument(skip(layout, factory))]
    pub fn open_with(
        dir: &Utf8Path,
        layout: &ProjectLayout,
        factory: RepositoryFactory<'_>,
    ) -> ModuleResult<Self> {
        let root = Module::with_repository(dir, &layout.root_name, None, factory(dir))?;

        let entries = std::fs::read_dir(dir).map_err(|source| ModuleError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        let mut candidates: Vec<Utf8PathBuf> = entries
            .filter_map(Result::ok)
            .filter_map(|entry| Utf8PathBuf::from_path_buf(entry.path()).ok())
            .filter(|path| path.is_dir() && is_module_path(path, &layout.ignore_dirs))
            .collect();
        candidates.sort();

        let mut children = Vec::with_capacity(candidates.len());
        for path in candidates {
            let Some(name) = path.file_name().map(String::from) else {
                continue;
            };
            match Module::with_repository(
                &path,
                name,
                Some(layout.root_name.clone()),
                factory(&path),
            ) {
                Ok(module) => children.push(module),
                Err(ModuleError::NotAModule { path }) => {
                    warn!(%path, "skipping module directory without manifest");
                }
                Err(e) => return Err(e),
            }
        }
        debug!(count = children.len(), "child modules");

        Ok(Self { root, children })
    }

    /// The root module.
    pub fn root(&self) -> &Module {
        &self.root
    }

    /// Every child module, ordered by name.
    pub fn children(&self) -> &[Module] {
        &self.children
    }

    /// Project directory.
    pub fn directory(&self) -> &Utf8Path {
        self.root.directory()
    }

    /// Modules selected by `filter`: the root first when allowed, then
    /// children in name order.
    ///
    /// The `self.version` cross-check only runs when no names were given;
    /// an explicit list is trusted as-is.
    pub fn discover_modules(&self, filter: &ModuleFilter) -> ModuleResult<Vec<&Module>> {
        let tracked = if !filter.is_explicit() && filter.require_self_version {
            Some(self.root.manifest()?.self_version_packages())
        } else {
            None
        };

        let mut modules = Vec::new();
        if filter.allows(self.root.name()) {
            modules.push(&self.root);
        }
        for child in &self.children {
            if !filter.allows(child.name()) {
                continue;
            }
            if let Some(tracked) = &tracked {
                let package = child.package_name()?;
                if !package.is_some_and(|p| tracked.contains(&p)) {
                    debug!(module = child.name(), "not a self.version dependency");
                    continue;
                }
            }
            modules.push(child);
        }
        Ok(modules)
    }

    /// Look up a module by name (the root included).
    pub fn resolve_module(&self, name: &str) -> Option<&Module> {
        if self.root.name() == name {
            return Some(&self.root);
        }
        self.children.iter().find(|m| m.name() == name)
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use std::collections::HashMap;

    use super::*;
    use crate::git::mock::MockRepository;
    use tempfile::TempDir;

    /// On-disk installer layout with mock repositories per module.
    pub struct Fixture {
        pub tmp: TempDir,
        pub repos: HashMap<String, Arc<MockRepository>>,
    }

    impl Fixture {
        pub fn dir(&self) -> &Utf8Path {
            Utf8Path::from_path(self.tmp.path()).unwrap()
        }

        pub fn repo(&self, name: &str) -> &MockRepository {
            &self.repos[name]
        }

        pub fn project(&self) -> Project {
            let repos = self.repos.clone();
            let root = self.dir().to_path_buf();
            Project::open_with(self.dir(), &ProjectLayout::default(), &move |path| {
                let key = if path == root.as_path() {
                    "installer".to_string()
                } else {
                    path.file_name().unwrap_or_default().to_string()
                };
                let repo = repos
                    .get(&key)
                    .cloned()
                    .unwrap_or_else(|| Arc::new(MockRepository::new()));
                repo as Arc<dyn Repository>
            })
            .unwrap()
        }
    }

    /// Build an installer with `children` as `(dir, package, self_version)`.
    pub fn installer(children: &[(&str, &str, bool)]) -> Fixture {
        let tmp = TempDir::new().unwrap();
        let root = Utf8Path::from_path(tmp.path()).unwrap();
        let require: serde_json::Map<String, serde_json::Value> = children
            .iter()
            .map(|(_, package, tracked)| {
                let constraint = if *tracked { SELF_VERSION } else { "4.0.0" };
                ((*package).to_string(), serde_json::Value::from(constraint))
            })
            .collect();
        let manifest = serde_json::json!({
            "name": "silverstripe/installer",
            "require": require,
        });
        std::fs::write(root.join(MANIFEST_FILE), manifest.to_string()).unwrap();

        let mut repos = HashMap::new();
        repos.insert("installer".to_string(), Arc::new(MockRepository::new()));
        for (dir, package, _) in children {
            let path = root.join(dir);
            std::fs::create_dir_all(path.join("_config")).unwrap();
            std::fs::write(
                path.join(MANIFEST_FILE),
                serde_json::json!({ "name": package }).to_string(),
            )
            .unwrap();
            repos.insert((*dir).to_string(), Arc::new(MockRepository::new()));
        }
        Fixture { tmp, repos }
    }

    /// Replace the mock behind `name`.
    pub fn set_repo(fixture: &mut Fixture, name: &str, repo: MockRepository) {
        fixture.repos.insert(name.to_string(), Arc::new(repo));
    }
}
