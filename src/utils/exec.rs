//! External command execution utilities.
//!
//! Embed plugins run captured (`exec!`), external subcommands run attached
//! to the terminal (`passthrough`).

use crate::log;
use anyhow::{Context, Result};
use regex::Regex;
use std::{
    ffi::OsString,
    path::{Path, PathBuf},
    process::{Command, Output},
    sync::OnceLock,
};

// ============================================================================
// Macros
// ============================================================================

/// Run an external command in `root`, capturing its output.
///
/// # Examples
/// ```ignore
/// exec!(root; ["mzsdot"]; "graph.dot")?;
/// ```
#[macro_export]
macro_rules! exec {
    ($root:expr; $cmd:expr; $($arg:expr),* $(,)?) => {
        $crate::utils::exec::exec(
            $root,
            &$crate::utils::exec::internal::to_cmd_vec($cmd),
            &[$($crate::utils::exec::internal::to_os($arg)),*],
        )
    };
}

// ============================================================================
// Argument Conversion
// ============================================================================

#[doc(hidden)]
pub mod internal {
    use std::ffi::OsString;

    /// Convert to `OsString`.
    #[inline]
    pub fn to_os<S: Into<OsString>>(s: S) -> OsString {
        s.into()
    }

    /// Convert a command array to `Vec<OsString>`.
    #[inline]
    pub fn to_cmd_vec<const N: usize>(cmd: [&str; N]) -> Vec<OsString> {
        cmd.into_iter().map(OsString::from).collect()
    }
}

// ============================================================================
// Command Execution
// ============================================================================

/// Execute a command in `root` and capture its output.
///
/// Stderr is logged under the command name on success.
///
/// # Errors
/// Returns error if command fails to execute or returns non-zero exit code.
pub fn exec(root: &Path, cmd: &[OsString], args: &[OsString]) -> Result<Output> {
    let (name, mut command) = prepare(cmd)?;
    command.args(args).current_dir(root);

    let output = command
        .output()
        .with_context(|| format!("Failed to execute `{name}`"))?;

    log_output(&name, &output)?;
    Ok(output)
}

/// Run a command attached to the current terminal.
///
/// Stdio is inherited, so the child talks to the user directly.
///
/// # Errors
/// Returns error if the command is missing or exits with non-zero status.
pub fn passthrough(cmd: &[OsString]) -> Result<()> {
    let (name, mut command) = prepare(cmd)?;
    find_program(&name)?;

    let status = command
        .status()
        .with_context(|| format!("Failed to execute `{name}`"))?;

    if !status.success() {
        anyhow::bail!("Command `{name}` failed with {status}");
    }
    Ok(())
}

/// Locate an executable on `PATH`.
pub fn find_program(name: &str) -> Result<PathBuf> {
    which::which(name).with_context(|| format!("`{name}` not found. Please install it first."))
}

/// Split a command into its name and a `Command` carrying the rest.
fn prepare(cmd: &[OsString]) -> Result<(String, Command)> {
    let (program, rest) = cmd.split_first().context("Empty command")?;
    let name = program.to_str().context("Command name is not UTF-8")?.to_owned();

    let mut command = Command::new(program);
    command.args(rest);
    Ok((name, command))
}

// ============================================================================
// Output Handling
// ============================================================================

fn strip_ansi(s: &str) -> std::borrow::Cow<'_, str> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"\x1b\[[0-9;]*m").unwrap());
    re.replace_all(s, "")
}

/// Non-blank lines of command output.
fn visible_lines(output: &str) -> Vec<&str> {
    output
        .lines()
        .filter(|line| !strip_ansi(line).trim().is_empty())
        .collect()
}

/// Captured stdout that is the product (markup or JSON), not a diagnostic.
#[inline]
fn is_product(stdout: &str) -> bool {
    stdout.starts_with('<') || stdout.starts_with('{')
}

/// Fail on non-zero exit; otherwise log stderr (warnings). Stdout is the product.
fn log_output(name: &str, output: &Output) -> Result<()> {
    if !output.status.success() {
        anyhow::bail!(format_error(name, output));
    }

    let stderr = String::from_utf8_lossy(&output.stderr);
    let lines = visible_lines(&stderr);
    if !lines.is_empty() {
        log!(name; "{}", lines.join("\n"));
    }
    Ok(())
}

/// Format command error message.
fn format_error(name: &str, output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stdout = String::from_utf8_lossy(&output.stdout);

    let mut msg = format!("Command `{name}` failed with {}\n", output.status);
    msg.push_str(stderr.trim());

    let stdout = stdout.trim();
    if !stdout.is_empty() && !is_product(stdout) {
        msg.push_str("\nStdout:\n");
        msg.push_str(stdout);
    }
    msg
}

// ============================================================================
// Tests
// ============================================================================
