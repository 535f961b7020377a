//! External tool invocation.
//!
//! Package installation, translation sync, archive packaging and uploads are
//! all delegated to command-line tools. This module finds them, checks their
//! versions, and runs them with captured output.

use std::io::Write;
use std::process::{Command, Stdio};

use camino::Utf8Path;
use semver::Version;
use thiserror::Error;
use tracing::{debug, instrument};

/// Errors from external tools.
#[derive(Error, Debug)]
pub enum ToolError {
    /// The binary is not on `PATH`.
    #[error("{tool} is not installed or not on PATH")]
    Missing {
        /// Binary name.
        tool: String,
    },

    /// The binary is older than required.
    #[error("{tool} {found} is too old; {minimum} or later is required")]
    TooOld {
        /// Binary name.
        tool: String,
        /// Installed version.
        found: Version,
        /// Required version.
        minimum: Version,
    },

    /// The installed version could not be determined.
    #[error("could not determine {tool} version: {reason}")]
    UnknownVersion {
        /// Binary name.
        tool: String,
        /// What went wrong.
        reason: String,
    },

    /// Spawning the process failed.
    #[error("failed to run {tool}: {source}")]
    Exec {
        /// Binary name.
        tool: String,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The process exited unsuccessfully.
    #[error("`{command}` failed (exit {}): {stderr}", .exit_code.map_or_else(|| "signal".to_string(), |c| c.to_string()))]
    Failed {
        /// Command line that was run.
        command: String,
        /// Exit code, `None` if killed by a signal.
        exit_code: Option<i32>,
        /// Captured stderr.
        stderr: String,
    },
}

/// Result alias for tool operations.
pub type ToolResult<T> = Result<T, ToolError>;

/// Check whether a binary is available on `PATH`.
pub fn has_binary(name: &str) -> bool {
    which::which(name).is_ok()
}

/// Parse a version that may omit minor or patch (`0.11` → `0.11.0`).
pub fn lenient_version(text: &str) -> Option<Version> {
    let text = text.trim().trim_start_matches('v');
    if let Ok(version) = Version::parse(text) {
        return Some(version);
    }
    let core = text.split(['-', '+']).next()?;
    let mut parts = core.split('.').map(|p| p.parse::<u64>().ok());
    let major = parts.next()??;
    let minor = parts.next().unwrap_or(Some(0))?;
    let patch = parts.next().unwrap_or(Some(0))?;
    if parts.next().is_some() {
        return None;
    }
    Some(Version::new(major, minor, patch))
}

/// First whitespace-separated token of `output` that reads as a version.
pub fn parse_version_from_output(output: &str) -> Option<Version> {
    output
        .split_whitespace()
        .map(|token| token.trim_matches(|c: char| c == ',' || c == '(' || c == ')'))
        .filter(|token| token.starts_with(|c: char| c.is_ascii_digit() || c == 'v'))
        .find_map(lenient_version)
}

/// Ensure `binary` exists and, when `minimum` is given, is recent enough.
///
/// Returns the detected version when one was checked.
#[instrument]
pub fn require_tool(binary: &str, minimum: Option<&Version>) -> ToolResult<Option<Version>> {
    if !has_binary(binary) {
        return Err(ToolError::Missing {
            tool: binary.to_string(),
        });
    }
    let Some(minimum) = minimum else {
        return Ok(None);
    };

    let output = run(binary, &["--version"], None)?;
    let found = parse_version_from_output(&output).ok_or_else(|| ToolError::UnknownVersion {
        tool: binary.to_string(),
        reason: format!("unrecognised output: {}", output.trim()),
    })?;
    debug!(%binary, %found, %minimum, "tool version");

    if found < *minimum {
        return Err(ToolError::TooOld {
            tool: binary.to_string(),
            found,
            minimum: minimum.clone(),
        });
    }
    Ok(Some(found))
}

/// Run `program args...` in `cwd` and return stdout.
pub fn run(program: &str, args: &[&str], cwd: Option<&Utf8Path>) -> ToolResult<String> {
    run_with_input(program, args, cwd, None)
}

/// Run `program args...` in `cwd`, feeding `input` on stdin.
#[instrument(skip(input))]
pub fn run_with_input(
    program: &str,
    args: &[&str],
    cwd: Option<&Utf8Path>,
    input: Option<&str>,
) -> ToolResult<String> {
    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(if input.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    if let Some(cwd) = cwd {
        command.current_dir(cwd.as_std_path());
    }

    let exec_err = |source| ToolError::Exec {
        tool: program.to_string(),
        source,
    };
    let mut child = command.spawn().map_err(exec_err)?;
    if let (Some(input), Some(mut stdin)) = (input, child.stdin.take()) {
        // A child that exits without reading its input is not a failure.
        match stdin.write_all(input.as_bytes()) {
            Err(e) if e.kind() != std::io::ErrorKind::BrokenPipe => return Err(exec_err(e)),
            _ => {}
        }
    }
    let output = child.wait_with_output().map_err(exec_err)?;

    if !output.status.success() {
        return Err(ToolError::Failed {
            command: display_command(program, args),
            exit_code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

/// Run a shell command line through `sh -c` in `cwd`.
pub fn run_shell(command_line: &str, cwd: &Utf8Path) -> ToolResult<String> {
    run("sh", &["-c", command_line], Some(cwd))
}

fn display_command(program: &str, args: &[&str]) -> String {
    std::iter::once(program)
        .chain(args.iter().copied())
        .collect::<Vec<_>>()
        .join(" ")
}
