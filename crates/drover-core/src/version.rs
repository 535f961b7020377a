//! Release version model.
//!
//! A [`ReleaseVersion`] is the `major.minor.patch[-stability[N]]` identifier a
//! release is cut as. Besides formatting, it knows how to infer the version
//! released before it (the default lower bound for changelogs), which
//! installable constraints a package index may offer for it, and which
//! archive files a release of it produces.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from version operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VersionError {
    /// The input did not match `major.minor.patch[-stability[N]]`.
    #[error(
        "invalid version {0}: expected a full version (e.g. 3.1.13) with an optional rc|alpha|beta suffix"
    )]
    InvalidFormat(String),

    /// No lower version can be inferred (stable `x.y.0`).
    #[error("cannot infer a prior version for {0}; pass one explicitly")]
    NotDerivable(String),
}

/// Result alias for version operations.
pub type VersionResult<T> = Result<T, VersionError>;

static VERSION_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d+)\.(\d+)\.(\d+)(?:-(rc|alpha|beta)(\d*))?$").expect("valid version regex")
});

/// Pre-release qualifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stability {
    /// `-alphaN`
    Alpha,
    /// `-betaN`
    Beta,
    /// `-rcN`
    Rc,
}

impl Stability {
    /// The suffix keyword as it appears in a version string.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Alpha => "alpha",
            Self::Beta => "beta",
            Self::Rc => "rc",
        }
    }
}

impl fmt::Display for Stability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stability {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "alpha" => Ok(Self::Alpha),
            "beta" => Ok(Self::Beta),
            "rc" => Ok(Self::Rc),
            other => Err(VersionError::InvalidFormat(other.to_string())),
        }
    }
}

/// The two archive flavours built for every release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveVariant {
    /// Full installer including the CMS.
    Cms,
    /// Framework-only installer.
    Framework,
}

impl ArchiveVariant {
    /// Every variant, in build order.
    pub const ALL: &[Self] = &[Self::Cms, Self::Framework];

    /// Archive base name (no extension) for a version.
    pub fn archive_name(self, version: &ReleaseVersion) -> String {
        let flavour = match self {
            Self::Cms => "cms",
            Self::Framework => "framework",
        };
        format!("SilverStripe-{flavour}-v{version}")
    }
}

/// Archive file extensions, in build order.
pub const ARCHIVE_EXTENSIONS: &[&str] = &["tar.gz", "zip"];

/// A release identifier: `major.minor.patch` plus an optional stability tag.
///
/// Immutable once parsed; [`prior_version`](Self::prior_version) derives a new
/// value rather than mutating.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct ReleaseVersion {
    major: u64,
    minor: u64,
    patch: u64,
    stability: Option<Stability>,
    stability_counter: Option<u64>,
}

impl ReleaseVersion {
    /// Build a stable version.
    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
            stability: None,
            stability_counter: None,
        }
    }

    /// Return a copy with a stability tag and counter attached.
    #[must_use]
    pub const fn with_stability(mut self, stability: Stability, counter: Option<u64>) -> Self {
        self.stability = Some(stability);
        self.stability_counter = counter;
        self
    }

    /// Parse `major.minor.patch[-(rc|alpha|beta)[N]]`.
    pub fn parse(text: &str) -> VersionResult<Self> {
        let caps = VERSION_PATTERN
            .captures(text.trim())
            .ok_or_else(|| VersionError::InvalidFormat(text.to_string()))?;

        let number = |idx: usize| -> VersionResult<u64> {
            caps[idx]
                .parse()
                .map_err(|_| VersionError::InvalidFormat(text.to_string()))
        };

        let stability = caps
            .get(4)
            .map(|m| m.as_str().parse::<Stability>())
            .transpose()?;
        let stability_counter = match caps.get(5).map(|m| m.as_str()) {
            Some(digits) if !digits.is_empty() => Some(
                digits
                    .parse()
                    .map_err(|_| VersionError::InvalidFormat(text.to_string()))?,
            ),
            _ => None,
        };

        Ok(Self {
            major: number(1)?,
            minor: number(2)?,
            patch: number(3)?,
            stability,
            stability_counter,
        })
    }

    /// Major component.
    pub const fn major(&self) -> u64 {
        self.major
    }

    /// Minor component.
    pub const fn minor(&self) -> u64 {
        self.minor
    }

    /// Patch component.
    pub const fn patch(&self) -> u64 {
        self.patch
    }

    /// Stability tag, if any.
    pub const fn stability(&self) -> Option<Stability> {
        self.stability
    }

    /// Stability counter, if one was given (`rc2` → `2`).
    pub const fn stability_counter(&self) -> Option<u64> {
        self.stability_counter
    }

    /// Whether this is an alpha, beta or release candidate.
    pub const fn is_prerelease(&self) -> bool {
        self.stability.is_some()
    }

    /// `major.minor.patch`, without any stability suffix.
    pub fn stable_string(&self) -> String {
        format!("{}.{}.{}", self.major, self.minor, self.patch)
    }

    /// The full identifier, including `-{stability}{counter}` when set.
    pub fn full_string(&self) -> String {
        let mut value = self.stable_string();
        if let Some(stability) = self.stability {
            value.push('-');
            value.push_str(stability.as_str());
            if let Some(counter) = self.stability_counter {
                value.push_str(&counter.to_string());
            }
        }
        value
    }

    /// Installable constraints for this release, best first.
    ///
    /// The exact version, then the patch, minor and major dev branches
    /// (`3.1.13.x-dev`, `3.1.x-dev`, `3.x-dev`). Callers pick the first entry
    /// the package index lists as available.
    pub fn composer_candidates(&self) -> Vec<String> {
        let mut candidates = vec![self.full_string()];
        let mut parts = vec![self.major, self.minor, self.patch];
        while !parts.is_empty() {
            let prefix: Vec<String> = parts.iter().map(u64::to_string).collect();
            candidates.push(format!("{}.x-dev", prefix.join(".")));
            parts.pop();
        }
        candidates
    }

    /// Infer the version released immediately before this one.
    ///
    /// - `rcN` with `N > 1` → `rc(N-1)`
    /// - any other tagged version → the same version without the tag
    /// - a stable version → patch decremented; fails at patch `0`
    ///
    /// A counter of `0` is treated as if no stability tag were present.
    pub fn prior_version(&self) -> VersionResult<Self> {
        let mut prior = self.clone();

        match (self.stability, self.stability_counter) {
            (Some(_), Some(counter)) if counter > 1 => {
                prior.stability_counter = Some(counter - 1);
                return Ok(prior);
            }
            (Some(_), Some(0)) => {
                prior.stability = None;
                prior.stability_counter = None;
            }
            (Some(_), _) => {
                prior.stability = None;
                prior.stability_counter = None;
                return Ok(prior);
            }
            (None, _) => {}
        }

        if prior.patch == 0 {
            return Err(VersionError::NotDerivable(self.full_string()));
        }
        prior.patch -= 1;
        prior.stability_counter = None;
        Ok(prior)
    }

    /// Archive filenames a release of this version produces.
    pub fn release_filenames(&self) -> Vec<String> {
        ArchiveVariant::ALL
            .iter()
            .flat_map(|variant| {
                let name = variant.archive_name(self);
                ARCHIVE_EXTENSIONS
                    .iter()
                    .map(move |ext| format!("{name}.{ext}"))
            })
            .collect()
    }
}

impl fmt::Display for ReleaseVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full_string())
    }
}

impl FromStr for ReleaseVersion {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<ReleaseVersion> for String {
    fn from(version: ReleaseVersion) -> Self {
        version.full_string()
    }
}

impl TryFrom<String> for ReleaseVersion {
    type Error = VersionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}
