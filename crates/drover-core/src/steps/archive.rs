//! Release archive packaging and upload.

use std::fs;
use std::io;
use std::path::Path;

use camino::{Utf8Path, Utf8PathBuf};
use tempfile::TempDir;
use tracing::{debug, instrument};
use walkdir::WalkDir;

use super::{EventSink, Progress, StepError, StepName, StepReport, StepResult};
use crate::config::Config;
use crate::tools;
use crate::version::{ArchiveVariant, ReleaseVersion};

const DEVELOPMENT_DIRS: &[&str] = &["tests", "docs"];

/// Settings for building archives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveOptions {
    /// Composer binary.
    pub composer: String,
    /// Installer package.
    pub package: String,
    /// Packages removed for the framework-only archive.
    pub framework_remove: Vec<String>,
}

impl ArchiveOptions {
    /// Options from config.
    pub fn from_config(config: &Config) -> Self {
        Self {
            composer: config.composer_command(),
            package: config.package(),
            framework_remove: config.framework_remove(),
        }
    }
}

/// Settings for uploading archives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadOptions {
    /// AWS CLI binary.
    pub aws: String,
    /// Destination prefix, e.g. `s3://bucket/releases`.
    pub base_path: String,
    /// AWS credentials profile.
    pub profile: String,
}

impl UploadOptions {
    /// Options from config.
    pub fn from_config(config: &Config) -> Self {
        Self {
            aws: "aws".to_string(),
            base_path: config.upload_base(),
            profile: config.aws_profile(),
        }
    }

    /// Same options with a different profile.
    #[must_use]
    pub fn with_profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = profile.into();
        self
    }
}

/// Build the CMS and framework-only archives for `version` into
/// `destination`.
///
/// A clean install is staged in a temporary directory, copied for the
/// framework variant, stripped of development files, then packed as
/// `.tar.gz` and `.zip`.
#[instrument(skip(options, on_event), fields(version = %version))]
pub fn build_archive(
    destination: &Utf8Path,
    version: &ReleaseVersion,
    options: &ArchiveOptions,
    on_event: EventSink<'_>,
) -> StepResult<StepReport> {
    let mut progress = Progress::start(StepName::Archive, on_event);
    for tool in [options.composer.as_str(), "tar", "zip"] {
        tools::require_tool(tool, None)?;
    }

    let staging = TempDir::new().map_err(StepError::io(destination))?;
    let staging_dir = Utf8PathBuf::from_path_buf(staging.path().to_path_buf()).map_err(|path| {
        StepError::Io {
            path: destination.to_path_buf(),
            source: io::Error::new(
                io::ErrorKind::InvalidData,
                format!("non UTF-8 staging path {}", path.display()),
            ),
        }
    })?;

    let cms_name = ArchiveVariant::Cms.archive_name(version);
    let framework_name = ArchiveVariant::Framework.archive_name(version);
    let cms_dir = staging_dir.join(&cms_name);
    let framework_dir = staging_dir.join(&framework_name);

    progress.module(&options.package, format!("installing {version} into {staging_dir}"));
    let version_arg = version.to_string();
    tools::run(
        &options.composer,
        &[
            "create-project",
            &options.package,
            cms_dir.as_str(),
            &version_arg,
            "--prefer-dist",
            "--no-dev",
        ],
        None,
    )?;

    copy_dir(&cms_dir, &framework_dir)?;
    if !options.framework_remove.is_empty() {
        let mut args = vec!["remove"];
        args.extend(options.framework_remove.iter().map(String::as_str));
        args.push("--update-no-dev");
        tools::run(&options.composer, &args, Some(framework_dir.as_path()))?;
    }
    remove_path(&framework_dir.join("mysite/code/Page.php"))?;

    for dir in [&cms_dir, &framework_dir] {
        let removed = strip_development_files(dir)?;
        debug!(%dir, removed, "stripped development files");
    }

    let mut built = Vec::new();
    for (name, source) in [(&cms_name, &cms_dir), (&framework_name, &framework_dir)] {
        let tarball = destination.join(format!("{name}.tar.gz"));
        tools::run("tar", &["-czf", tarball.as_str(), "."], Some(source.as_path()))?;
        progress.module(name, format!("built {tarball}"));

        let zipfile = destination.join(format!("{name}.zip"));
        tools::run("zip", &["-rq", zipfile.as_str(), "."], Some(source.as_path()))?;
        progress.module(name, format!("built {zipfile}"));
        built.extend([tarball, zipfile]);
    }
    Ok(progress.success(format!("{} archive(s) written to {destination}", built.len())))
}

/// Upload every release archive in `directory`.
#[instrument(skip(options, on_event), fields(version = %version))]
pub fn upload_archive(
    directory: &Utf8Path,
    version: &ReleaseVersion,
    options: &UploadOptions,
    on_event: EventSink<'_>,
) -> StepResult<StepReport> {
    let mut progress = Progress::start(StepName::Upload, on_event);
    tools::require_tool(&options.aws, None)?;

    let filenames = version.release_filenames();
    for filename in &filenames {
        let from = directory.join(filename);
        if !from.is_file() {
            return Err(StepError::Io {
                path: from,
                source: io::Error::from(io::ErrorKind::NotFound),
            });
        }
        let to = format!("{}/{filename}", options.base_path.trim_end_matches('/'));
        tools::run(
            &options.aws,
            &[
                "s3",
                "cp",
                from.as_str(),
                &to,
                "--acl",
                "public-read",
                "--profile",
                &options.profile,
            ],
            None,
        )?;
        progress.module(filename, format!("uploaded to {to}"));
    }
    Ok(progress.success(format!("{} file(s) uploaded", filenames.len())))
}

fn copy_dir(from: &Utf8Path, to: &Utf8Path) -> StepResult<()> {
    // Parents are visited before their contents, so targets always have a
    // directory to land in.
    for entry in WalkDir::new(from).follow_links(false) {
        let entry = entry.map_err(walk_error(from))?;
        let source = utf8(entry.path())?;
        let target = match source.strip_prefix(from) {
            Ok(relative) if !relative.as_str().is_empty() => to.join(relative),
            _ => to.to_path_buf(),
        };
        let file_type = entry.file_type();
        if file_type.is_dir() {
            fs::create_dir_all(&target).map_err(StepError::io(&target))?;
        } else if file_type.is_symlink() {
            copy_symlink(source, &target).map_err(StepError::io(&target))?;
        } else {
            fs::copy(source, &target).map_err(StepError::io(source))?;
        }
    }
    Ok(())
}

fn utf8(path: &Path) -> StepResult<&Utf8Path> {
    Utf8Path::from_path(path).ok_or_else(|| StepError::Io {
        path: Utf8PathBuf::from(path.to_string_lossy().into_owned()),
        source: io::Error::new(io::ErrorKind::InvalidData, "path is not valid UTF-8"),
    })
}

fn walk_error(root: &Utf8Path) -> impl FnOnce(walkdir::Error) -> StepError + '_ {
    move |e| {
        let path = e
            .path()
            .and_then(Utf8Path::from_path)
            .unwrap_or(root)
            .to_path_buf();
        StepError::Io {
            path,
            source: e.into(),
        }
    }
}

#[cfg(unix)]
fn copy_symlink(from: &Utf8Path, to: &Utf8Path) -> io::Result<()> {
    std::os::unix::fs::symlink(fs::read_link(from)?, to)
}

#[cfg(not(unix))]
fn copy_symlink(from: &Utf8Path, to: &Utf8Path) -> io::Result<()> {
    fs::copy(from, to).map(|_| ())
}

fn remove_path(path: &Utf8Path) -> StepResult<()> {
    let result = if path.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };
    match result {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(StepError::io(path)(e)),
        _ => Ok(()),
    }
}

/// Remove `tests/` and `docs/` from every top-level directory of `root`.
fn strip_development_files(root: &Utf8Path) -> StepResult<usize> {
    let mut doomed = Vec::new();
    let walk = WalkDir::new(root)
        .min_depth(2)
        .max_depth(2)
        .follow_links(false)
        .sort_by_file_name();
    for entry in walk {
        let entry = entry.map_err(walk_error(root))?;
        let development = entry.file_type().is_dir()
            && entry
                .file_name()
                .to_str()
                .is_some_and(|name| DEVELOPMENT_DIRS.contains(&name));
        if development {
            doomed.push(utf8(entry.path())?.to_path_buf());
        }
    }
    for dir in &doomed {
        debug!(%dir, "removing development files");
        remove_path(dir)?;
    }
    Ok(doomed.len())
}
