//! Release configuration.
//!
//! Settings come from `~/.config/drover/config.<ext>`, then the nearest
//! `.drover.<ext>` or `drover.<ext>` found walking up from the working
//! directory, then any `--config` files, each layer overriding the last.
//! The walk ends at the first directory containing `.git`, after that
//! directory's own files have been checked. `<ext>` is one of `toml`,
//! `yaml`, `yml` or `json`, tried in that order.
//!
//! Every section is optional. Accessors on [`Config`] fill in defaults, so
//! callers never see a half-populated record.
//!
//! # Example
//! ```no_run
//! use camino::Utf8PathBuf;
//! use drover_core::config::{Config, ConfigLoader};
//!
//! let cwd = std::env::current_dir().unwrap();
//! let cwd = Utf8PathBuf::try_from(cwd).expect("current directory is not valid UTF-8");
//! let config = ConfigLoader::new()
//!     .with_project_search(&cwd)
//!     .load()
//!     .unwrap();
//! println!("remote: {}", config.remote());
//! ```

use camino::{Utf8Path, Utf8PathBuf};
use figment::Figment;
use figment::providers::{Format, Json, Serialized, Toml, Yaml};
use semver::Version;
use serde::{Deserialize, Serialize};

use crate::changelog::{
    DEFAULT_LINE_FORMAT, DEFAULT_MODULE_LINE_FORMAT, DEFAULT_SECURITY_FORMAT,
    DEFAULT_SECURITY_URL, LineTemplate,
};
use crate::error::{ConfigError, ConfigResult};
use crate::module::ProjectLayout;
use crate::tools::lenient_version;
use crate::version::ReleaseVersion;

/// Environment variable overriding `project.release_path`.
pub const RELEASE_PATH_ENV: &str = "DROVER_RELEASE_PATH";

/// Installer package created for a release.
pub const DEFAULT_PACKAGE: &str = "silverstripe/installer";

/// Packages removed to build the framework-only archive.
pub const DEFAULT_FRAMEWORK_REMOVE: &[&str] = &[
    "silverstripe/cms",
    "silverstripe/siteconfig",
    "silverstripe/reports",
    "silverstripe/asset-admin",
    "silverstripe/graphql",
];

/// Destination for release archives.
pub const DEFAULT_UPLOAD_BASE: &str =
    "s3://silverstripe-ssorg-releases/sssites-ssorg-prod/assets/releases";

/// The configuration for drover.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// Log level for the application (e.g., "debug", "info", "warn", "error").
    pub log_level: LogLevel,
    /// Directory for JSONL log files (falls back to platform defaults if unset).
    pub log_dir: Option<Utf8PathBuf>,
    /// Installer project settings.
    pub project: Option<ProjectConfig>,
    /// Changelog line templates.
    pub changelog: Option<ChangelogConfig>,
    /// Translation sync settings.
    pub translations: Option<TranslationsConfig>,
    /// External command overrides.
    pub commands: Option<CommandsConfig>,
    /// Archive packaging settings.
    pub archive: Option<ArchiveConfig>,
    /// Archive upload settings.
    pub upload: Option<UploadConfig>,
    /// Files this config was merged from, lowest precedence first.
    #[serde(skip)]
    pub sources: Vec<Utf8PathBuf>,
}

/// Installer project settings.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct ProjectConfig {
    /// Package installed by `release:create` (default `silverstripe/installer`).
    pub package: Option<String>,
    /// Name of the root module (default `installer`).
    pub root_name: Option<String>,
    /// Git remote to fetch from and push to (default `origin`).
    pub remote: Option<String>,
    /// Subdirectories that are never modules.
    pub ignore_dirs: Option<Vec<String>>,
    /// Parent directory for `release-{version}` checkouts.
    pub release_path: Option<Utf8PathBuf>,
}

/// Changelog line templates.
///
/// Templates substitute `{date}`, `{shortHash}`, `{link}`, `{message}`,
/// `{shortMessage}`, `{rawMessage}`, `{author}` and `{type}`. The security
/// suffix substitutes `{cve}` and `{cveURL}`.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct ChangelogConfig {
    /// Line for release changelogs.
    pub line_format: Option<String>,
    /// Suffix appended to security items.
    pub security_format: Option<String>,
    /// Advisory base URL used for `{cveURL}`.
    pub security_url: Option<String>,
    /// Line for single-module release notes (`module:tag`).
    pub module_line_format: Option<String>,
}

/// Translation sync settings.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct TranslationsConfig {
    /// Oldest accepted `tx` client version (default `0.11`).
    pub min_version: Option<String>,
    /// Minimum completion percentage pulled from the service (default 10).
    pub minimum_percent: Option<u8>,
}

/// External command overrides.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct CommandsConfig {
    /// Test command run from the project root (default `vendor/bin/phpunit`).
    pub test: Option<String>,
    /// Composer binary (default `composer`).
    pub composer: Option<String>,
}

/// Archive packaging settings.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct ArchiveConfig {
    /// Packages removed from the framework-only archive.
    pub framework_remove: Option<Vec<String>>,
}

/// Archive upload settings.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct UploadConfig {
    /// S3 URL archives are copied to.
    pub base_path: Option<String>,
    /// AWS CLI profile (default `silverstripe`).
    pub aws_profile: Option<String>,
}

/// Log level configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Verbose output for debugging and development.
    Debug,
    /// Standard operational information (default).
    #[default]
    Info,
    /// Warnings about potential issues.
    Warn,
    /// Errors that indicate failures.
    Error,
}

impl LogLevel {
    /// Returns the log level as a lowercase string slice.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

impl Config {
    fn project_section(&self) -> ProjectConfig {
        self.project.clone().unwrap_or_default()
    }

    fn changelog_section(&self) -> ChangelogConfig {
        self.changelog.clone().unwrap_or_default()
    }

    /// Installer package name.
    pub fn package(&self) -> String {
        self.project_section()
            .package
            .unwrap_or_else(|| DEFAULT_PACKAGE.to_string())
    }

    /// Git remote name.
    pub fn remote(&self) -> String {
        self.project_section()
            .remote
            .unwrap_or_else(|| "origin".to_string())
    }

    /// Discovery layout (root name and ignored directories).
    pub fn project_layout(&self) -> ProjectLayout {
        let section = self.project_section();
        let defaults = ProjectLayout::default();
        ProjectLayout {
            root_name: section.root_name.unwrap_or(defaults.root_name),
            ignore_dirs: section.ignore_dirs.unwrap_or(defaults.ignore_dirs),
        }
    }

    /// Base directory for release checkouts: `DROVER_RELEASE_PATH`, then
    /// `project.release_path`.
    pub fn release_path(&self) -> Option<Utf8PathBuf> {
        std::env::var(RELEASE_PATH_ENV)
            .ok()
            .filter(|v| !v.is_empty())
            .map(Utf8PathBuf::from)
            .or_else(|| self.project_section().release_path)
    }

    /// `{release_path}/release-{version}`, relative to `cwd` when no base is
    /// configured.
    pub fn release_directory(&self, version: &ReleaseVersion, cwd: &Utf8Path) -> Utf8PathBuf {
        let base = self.release_path().unwrap_or_else(|| cwd.to_path_buf());
        let base = if base.is_absolute() {
            base
        } else {
            cwd.join(base)
        };
        base.join(format!("release-{version}"))
    }

    /// Template for release changelog lines.
    pub fn line_template(&self) -> LineTemplate {
        let section = self.changelog_section();
        LineTemplate {
            line: section
                .line_format
                .unwrap_or_else(|| DEFAULT_LINE_FORMAT.to_string()),
            security: section
                .security_format
                .unwrap_or_else(|| DEFAULT_SECURITY_FORMAT.to_string()),
            security_url: section
                .security_url
                .unwrap_or_else(|| DEFAULT_SECURITY_URL.to_string()),
        }
    }

    /// Template for single-module release notes.
    pub fn module_line_template(&self) -> LineTemplate {
        let section = self.changelog_section();
        LineTemplate {
            line: section
                .module_line_format
                .unwrap_or_else(|| DEFAULT_MODULE_LINE_FORMAT.to_string()),
            ..self.line_template()
        }
    }

    /// Oldest acceptable `tx` client.
    pub fn translation_min_version(&self) -> ConfigResult<Version> {
        let raw = self
            .translations
            .as_ref()
            .and_then(|t| t.min_version.clone())
            .unwrap_or_else(|| "0.11".to_string());
        lenient_version(&raw).ok_or_else(|| ConfigError::Invalid {
            field: "translations.min_version",
            message: format!("{raw:?} is not a version"),
        })
    }

    /// Minimum translation completion percentage.
    pub fn translation_minimum_percent(&self) -> ConfigResult<u8> {
        let percent = self
            .translations
            .as_ref()
            .and_then(|t| t.minimum_percent)
            .unwrap_or(10);
        if percent > 100 {
            return Err(ConfigError::Invalid {
                field: "translations.minimum_percent",
                message: format!("{percent} is above 100"),
            });
        }
        Ok(percent)
    }

    /// Test command line.
    pub fn test_command(&self) -> String {
        self.commands
            .as_ref()
            .and_then(|c| c.test.clone())
            .unwrap_or_else(|| "vendor/bin/phpunit".to_string())
    }

    /// Composer binary.
    pub fn composer_command(&self) -> String {
        self.commands
            .as_ref()
            .and_then(|c| c.composer.clone())
            .unwrap_or_else(|| "composer".to_string())
    }

    /// Packages stripped from the framework-only archive.
    pub fn framework_remove(&self) -> Vec<String> {
        self.archive
            .as_ref()
            .and_then(|a| a.framework_remove.clone())
            .unwrap_or_else(|| DEFAULT_FRAMEWORK_REMOVE.iter().map(|s| (*s).to_string()).collect())
    }

    /// Upload destination.
    pub fn upload_base(&self) -> String {
        self.upload
            .as_ref()
            .and_then(|u| u.base_path.clone())
            .unwrap_or_else(|| DEFAULT_UPLOAD_BASE.to_string())
    }

    /// AWS CLI profile.
    pub fn aws_profile(&self) -> String {
        self.upload
            .as_ref()
            .and_then(|u| u.aws_profile.clone())
            .unwrap_or_else(|| "silverstripe".to_string())
    }
}

/// Extensions tried for every config file name, most preferred first.
const CONFIG_EXTENSIONS: &[&str] = &["toml", "yaml", "yml", "json"];

/// Name used for config files and platform directories.
const APP_NAME: &str = "drover";

/// Collects config files and merges them over the release defaults.
///
/// Later sources win: user config, then the nearest project config, then
/// every explicit file in the order given.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    search_from: Option<Utf8PathBuf>,
    user_config: bool,
    stop_marker: Option<String>,
    explicit: Vec<Utf8PathBuf>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// A loader that reads the user config and stops at `.git`.
    pub fn new() -> Self {
        Self {
            search_from: None,
            user_config: true,
            stop_marker: Some(".git".to_string()),
            explicit: Vec::new(),
        }
    }

    /// Look for `.drover.<ext>` / `drover.<ext>` from `dir` upwards.
    pub fn with_project_search(mut self, dir: impl AsRef<Utf8Path>) -> Self {
        self.search_from = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Whether `~/.config/drover/config.<ext>` is read.
    pub const fn with_user_config(mut self, include: bool) -> Self {
        self.user_config = include;
        self
    }

    /// Name of the entry that ends the upward search, or `None` to walk to
    /// the filesystem root.
    ///
    /// The directory holding the marker is still searched. Modules are git
    /// checkouts nested inside the installer checkout, so the default `.git`
    /// keeps a module's search inside that module.
    pub fn stop_at(mut self, marker: Option<&str>) -> Self {
        self.stop_marker = marker.map(str::to_string);
        self
    }

    /// Merge `path` on top of everything discovered.
    pub fn with_file(mut self, path: impl AsRef<Utf8Path>) -> Self {
        self.explicit.push(path.as_ref().to_path_buf());
        self
    }

    /// Files that [`load`](Self::load) will merge, lowest precedence first.
    pub fn sources(&self) -> Vec<Utf8PathBuf> {
        let mut files = Vec::new();
        if self.user_config {
            files.extend(user_config_file());
        }
        if let Some(dir) = &self.search_from {
            files.extend(self.project_file(dir));
        }
        files.extend(self.explicit.iter().cloned());
        files
    }

    /// Merge every source and extract the result.
    ///
    /// The returned config remembers which files went into it.
    #[tracing::instrument(skip(self), fields(search_from = ?self.search_from))]
    pub fn load(self) -> ConfigResult<Config> {
        let sources = self.sources();
        let figment = sources.iter().fold(
            Figment::from(Serialized::defaults(Config::default())),
            |figment, path| merge_file(figment, path),
        );
        let mut config: Config = figment
            .extract()
            .map_err(|e| ConfigError::Deserialize(Box::new(e)))?;
        tracing::debug!(
            ?sources,
            log_level = config.log_level.as_str(),
            "configuration loaded"
        );
        config.sources = sources;
        Ok(config)
    }

    fn project_file(&self, start: &Utf8Path) -> Option<Utf8PathBuf> {
        for dir in start.ancestors() {
            let found = CONFIG_EXTENSIONS
                .iter()
                .flat_map(|ext| [format!(".{APP_NAME}.{ext}"), format!("{APP_NAME}.{ext}")])
                .map(|name| dir.join(name))
                .find(|path| path.is_file());
            if found.is_some() {
                return found;
            }
            if let Some(marker) = &self.stop_marker
                && dir.join(marker).exists()
            {
                tracing::debug!(%dir, marker = %marker, "config search stopped at boundary");
                return None;
            }
        }
        None
    }
}

fn user_config_file() -> Option<Utf8PathBuf> {
    let dir = user_config_dir()?;
    CONFIG_EXTENSIONS
        .iter()
        .map(|ext| dir.join(format!("config.{ext}")))
        .find(|path| path.is_file())
}

fn merge_file(figment: Figment, path: &Utf8Path) -> Figment {
    match path.extension() {
        Some("yaml" | "yml") => figment.merge(Yaml::file_exact(path.as_str())),
        Some("json") => figment.merge(Json::file_exact(path.as_str())),
        _ => figment.merge(Toml::file_exact(path.as_str())),
    }
}

fn platform_dir(pick: fn(&directories::ProjectDirs) -> &std::path::Path) -> Option<Utf8PathBuf> {
    let dirs = directories::ProjectDirs::from("", "", APP_NAME)?;
    Utf8PathBuf::from_path_buf(pick(&dirs).to_path_buf()).ok()
}

/// `~/.config/drover` on Linux, `~/Library/Application Support/drover` on
/// macOS.
pub fn user_config_dir() -> Option<Utf8PathBuf> {
    platform_dir(directories::ProjectDirs::config_dir)
}

/// Per-user cache directory.
pub fn user_cache_dir() -> Option<Utf8PathBuf> {
    platform_dir(directories::ProjectDirs::cache_dir)
}

/// Per-user data directory.
pub fn user_data_dir() -> Option<Utf8PathBuf> {
    platform_dir(directories::ProjectDirs::data_dir)
}

/// Machine-local data directory.
pub fn user_data_local_dir() -> Option<Utf8PathBuf> {
    platform_dir(directories::ProjectDirs::data_local_dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn load_str(file: &str, contents: &str) -> ConfigResult<Config> {
        let tmp = TempDir::new().unwrap();
        let config_path = Utf8PathBuf::try_from(tmp.path().join(file)).unwrap();
        fs::write(&config_path, contents).unwrap();
        ConfigLoader::new()
            .with_user_config(false)
            .with_file(&config_path)
            .load()
    }

    #[test]
    fn defaults_match_release_conventions() {
        let config = Config::default();
        assert_eq!(config.log_level, LogLevel::Info);
        assert_eq!(config.package(), "silverstripe/installer");
        assert_eq!(config.remote(), "origin");
        assert_eq!(config.project_layout(), ProjectLayout::default());
        assert_eq!(config.test_command(), "vendor/bin/phpunit");
        assert_eq!(config.composer_command(), "composer");
        assert_eq!(config.translation_min_version().unwrap(), Version::new(0, 11, 0));
        assert_eq!(config.translation_minimum_percent().unwrap(), 10);
        assert_eq!(config.aws_profile(), "silverstripe");
        assert_eq!(config.framework_remove().len(), 5);
        assert_eq!(config.line_template(), LineTemplate::default());
        assert_eq!(config.module_line_template().line, DEFAULT_MODULE_LINE_FORMAT);
    }

    #[test]
    fn loader_without_sources_yields_defaults() {
        let config = ConfigLoader::new()
            .with_user_config(false)
            .load()
            .unwrap();
        assert_eq!(config.log_level, LogLevel::Info);
        assert!(config.sources.is_empty());
    }

    #[test]
    fn toml_sections_override_defaults() {
        let config = load_str(
            "config.toml",
            r#"
log_level = "debug"

[project]
remote = "upstream"
ignore_dirs = ["vendor", "themes"]

[changelog]
line_format = " - {shortMessage}"

[translations]
min_version = "0.12.1"
minimum_percent = 25

[commands]
test = "phpunit --stop-on-failure"
"#,
        )
        .unwrap();

        assert_eq!(config.log_level, LogLevel::Debug);
        assert_eq!(config.remote(), "upstream");
        assert_eq!(config.project_layout().ignore_dirs, vec!["vendor", "themes"]);
        assert_eq!(config.project_layout().root_name, "installer");
        assert_eq!(config.line_template().line, " - {shortMessage}");
        assert_eq!(config.line_template().security, DEFAULT_SECURITY_FORMAT);
        assert_eq!(config.translation_min_version().unwrap(), Version::new(0, 12, 1));
        assert_eq!(config.translation_minimum_percent().unwrap(), 25);
        assert_eq!(config.test_command(), "phpunit --stop-on-failure");
        assert_eq!(config.composer_command(), "composer");
    }

    #[test]
    fn yaml_upload_section() {
        let config = load_str(
            "config.yaml",
            "upload:\n  base_path: s3://bucket/releases\n  aws_profile: ci\n",
        )
        .unwrap();
        assert_eq!(config.upload_base(), "s3://bucket/releases");
        assert_eq!(config.aws_profile(), "ci");
    }

    #[test]
    fn json_archive_section() {
        let config = load_str(
            "config.json",
            r#"{"archive": {"framework_remove": ["silverstripe/cms"]}}"#,
        )
        .unwrap();
        assert_eq!(config.framework_remove(), vec!["silverstripe/cms"]);
    }

    #[test]
    fn invalid_translation_settings_are_rejected() {
        let config = load_str(
            "config.toml",
            "[translations]\nmin_version = \"latest\"\nminimum_percent = 150\n",
        )
        .unwrap();
        assert!(matches!(
            config.translation_min_version(),
            Err(ConfigError::Invalid { field: "translations.min_version", .. })
        ));
        assert!(matches!(
            config.translation_minimum_percent(),
            Err(ConfigError::Invalid { .. })
        ));
    }

    #[test]
    fn bad_type_fails_to_load() {
        let result = load_str("config.toml", "[project]\nignore_dirs = 3\n");
        assert!(matches!(result, Err(ConfigError::Deserialize(_))));
    }

    #[test]
    fn release_directory_joins_version() {
        let config = Config {
            project: Some(ProjectConfig {
                release_path: Some("/srv/releases".into()),
                ..ProjectConfig::default()
            }),
            ..Config::default()
        };
        let version: ReleaseVersion = "4.1.0-rc1".parse().unwrap();
        // The env override is process-wide; only assert when it is unset.
        if std::env::var(RELEASE_PATH_ENV).is_err() {
            assert_eq!(
                config.release_directory(&version, Utf8Path::new("/work")),
                Utf8PathBuf::from("/srv/releases/release-4.1.0-rc1")
            );
            assert_eq!(
                Config::default().release_directory(&version, Utf8Path::new("/work")),
                Utf8PathBuf::from("/work/release-4.1.0-rc1")
            );
        }
    }

    #[test]
    fn later_file_overrides_earlier() {
        let tmp = TempDir::new().unwrap();
        let base = Utf8PathBuf::try_from(tmp.path().join("base.toml")).unwrap();
        let over = Utf8PathBuf::try_from(tmp.path().join("override.toml")).unwrap();
        fs::write(&base, "[project]\nremote = \"a\"\npackage = \"x/y\"\n").unwrap();
        fs::write(&over, "[project]\nremote = \"b\"\n").unwrap();

        let config = ConfigLoader::new()
            .with_user_config(false)
            .with_file(&base)
            .with_file(&over)
            .load()
            .unwrap();

        assert_eq!(config.remote(), "b");
        assert_eq!(config.package(), "x/y");
    }

    #[test]
    fn project_config_discovery() {
        let tmp = TempDir::new().unwrap();
        let project_dir = tmp.path().join("project");
        let sub_dir = project_dir.join("framework").join("src");
        fs::create_dir_all(&sub_dir).unwrap();
        fs::write(project_dir.join(".drover.toml"), r#"log_level = "debug""#).unwrap();

        let sub_dir = Utf8PathBuf::try_from(sub_dir).unwrap();
        let config = ConfigLoader::new()
            .with_user_config(false)
            .stop_at(None)
            .with_project_search(&sub_dir)
            .load()
            .unwrap();

        assert_eq!(config.log_level, LogLevel::Debug);
        assert_eq!(config.sources.len(), 1);
        assert!(config.sources[0].ends_with(".drover.toml"));
    }

    #[test]
    fn boundary_marker_stops_search() {
        let tmp = TempDir::new().unwrap();
        let parent = tmp.path().join("parent");
        let child = parent.join("child");
        let work = child.join("work");
        fs::create_dir_all(&work).unwrap();
        fs::write(parent.join(".drover.toml"), r#"log_level = "warn""#).unwrap();
        fs::create_dir(child.join(".git")).unwrap();

        let work = Utf8PathBuf::try_from(work).unwrap();
        let loader = ConfigLoader::new()
            .with_user_config(false)
            .with_project_search(&work);
        assert!(loader.sources().is_empty());
        assert_eq!(loader.load().unwrap().log_level, LogLevel::Info);
    }

    #[test]
    fn boundary_directory_itself_is_searched() {
        let tmp = TempDir::new().unwrap();
        let module = tmp.path().join("framework");
        let src = module.join("src");
        fs::create_dir_all(&src).unwrap();
        fs::create_dir(module.join(".git")).unwrap();
        fs::write(module.join("drover.yaml"), "project:\n  remote: fork\n").unwrap();

        let src = Utf8PathBuf::try_from(src).unwrap();
        let config = ConfigLoader::new()
            .with_user_config(false)
            .with_project_search(&src)
            .load()
            .unwrap();
        assert_eq!(config.remote(), "fork");
    }

    #[test]
    fn dotfile_beats_plain_name_and_toml_beats_yaml() {
        let tmp = TempDir::new().unwrap();
        let dir = Utf8PathBuf::try_from(tmp.path().to_path_buf()).unwrap();
        fs::write(dir.join("drover.toml"), "").unwrap();
        fs::write(dir.join(".drover.yaml"), "").unwrap();
        fs::write(dir.join(".drover.toml"), "").unwrap();

        let sources = ConfigLoader::new()
            .with_user_config(false)
            .with_project_search(&dir)
            .sources();
        assert_eq!(sources, vec![dir.join(".drover.toml")]);
    }

    #[test]
    fn user_config_dir_names_app() {
        if let Some(path) = user_config_dir() {
            assert!(path.as_str().contains("drover"));
        }
    }
}
