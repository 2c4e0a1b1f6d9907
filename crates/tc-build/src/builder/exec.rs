//! Child process execution.
//!
//! Every external command goes through [`Exec`]. It owns the only `PATH`
//! manipulation in the program: directories are prepended per child command,
//! the parent's environment is never modified. Build steps also create and
//! remove their output folders through it so `--dry-run` leaves disk alone.

use super::error::Error;
use super::logger;
use anyhow::{Context, Result};
use std::env;
use std::ffi::OsString;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

/// Execution context shared by all build steps.
#[derive(Debug, Default)]
pub struct Exec {
    show_commands: bool,
    dry_run: bool,
    path_prefix: Vec<PathBuf>,
    history: Vec<String>,
}

impl Exec {
    pub fn new(show_commands: bool, dry_run: bool) -> Self {
        Self {
            show_commands: show_commands || dry_run,
            dry_run,
            ..Self::default()
        }
    }

    pub fn dry_run(&self) -> bool {
        self.dry_run
    }

    /// Commands issued so far, in order.
    pub fn history(&self) -> &[String] {
        &self.history
    }

    /// Put `dir` in front of the search path of every later child.
    pub fn prepend_path(&mut self, dir: impl Into<PathBuf>) {
        let dir = dir.into();
        self.path_prefix.retain(|d| *d != dir);
        self.path_prefix.insert(0, dir);
    }

    /// The search path children see: our prefix, then the inherited `PATH`.
    pub fn search_path(&self) -> Result<OsString> {
        let existing = env::var_os("PATH").unwrap_or_default();
        let mut paths = self.path_prefix.clone();
        paths.extend(env::split_paths(&existing));
        Ok(env::join_paths(paths)?)
    }

    /// Delete `dir` and everything below it. Only logged under `--dry-run`.
    pub fn remove_dir(&self, dir: &Path) -> Result<()> {
        if !dir.exists() {
            return Ok(());
        }
        if self.dry_run {
            log::info!("Dry run: would remove {}", dir.display());
            return Ok(());
        }
        fs::remove_dir_all(dir).with_context(|| format!("Removing {}", dir.display()))
    }

    /// Create `dir` and its parents. Only logged under `--dry-run`.
    pub fn create_dir(&self, dir: &Path) -> Result<()> {
        if dir.is_dir() {
            return Ok(());
        }
        if self.dry_run {
            log::debug!("Dry run: would create {}", dir.display());
            return Ok(());
        }
        fs::create_dir_all(dir).with_context(|| format!("Creating {}", dir.display()))
    }

    /// Write `contents` to `path`. Only logged under `--dry-run`.
    pub fn write(&self, path: &Path, contents: &str) -> Result<()> {
        if self.dry_run {
            log::debug!("Dry run: would write {}", path.display());
            return Ok(());
        }
        fs::write(path, contents).with_context(|| format!("Writing {}", path.display()))
    }

    fn prepare(&mut self, cmd: &mut Command) -> Result<String> {
        if !self.path_prefix.is_empty() {
            cmd.env("PATH", self.search_path()?);
        }
        let line = display(cmd);
        if self.show_commands {
            // Acts like 'set -x' in a shell script
            println!("$ {line}");
            logger::flush();
        }
        self.history.push(line.clone());
        Ok(line)
    }

    /// Run a command that changes the filesystem, streaming its output.
    ///
    /// Skipped under `--dry-run`.
    pub fn run(&mut self, mut cmd: Command) -> Result<()> {
        let line = self.prepare(&mut cmd)?;
        if self.dry_run {
            return Ok(());
        }
        let status = cmd
            .status()
            .with_context(|| format!("Failed to run `{line}`"))?;
        check(&line, status.code())
    }

    /// Like [`Exec::run`] but discards the child's output.
    pub fn run_silent(&mut self, mut cmd: Command) -> Result<()> {
        cmd.stdout(Stdio::null()).stderr(Stdio::null());
        self.run(cmd)
    }

    /// Run a read-only command and hand back its raw output, whatever the
    /// exit status. Runs even under `--dry-run`.
    pub fn output(&mut self, mut cmd: Command, input: Option<&str>) -> Result<Output> {
        let line = self.prepare(&mut cmd)?;
        cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
        cmd.stdin(if input.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        });

        let mut child = cmd
            .spawn()
            .with_context(|| format!("Failed to run `{line}`"))?;
        if let (Some(input), Some(mut stdin)) = (input, child.stdin.take()) {
            stdin
                .write_all(input.as_bytes())
                .with_context(|| format!("Failed to write stdin of `{line}`"))?;
        }
        child
            .wait_with_output()
            .with_context(|| format!("Failed to wait for `{line}`"))
    }

    /// Run a read-only command and return its trimmed stdout; a non-zero
    /// exit is an error.
    pub fn capture(&mut self, cmd: Command, input: Option<&str>) -> Result<String> {
        let line = display(&cmd);
        let output = self.output(cmd, input)?;
        check(&line, output.status.code())?;
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Whether a read-only command exits successfully. Spawn failures count
    /// as "no".
    pub fn succeeds(&mut self, cmd: Command, input: Option<&str>) -> bool {
        self.output(cmd, input)
            .map(|o| o.status.success())
            .unwrap_or(false)
    }
}

fn check(line: &str, code: Option<i32>) -> Result<()> {
    match code {
        Some(0) => Ok(()),
        Some(code) => Err(Error::CommandFailed {
            command: line.to_string(),
            code,
        }
        .into()),
        None => Err(Error::CommandKilled {
            command: line.to_string(),
        }
        .into()),
    }
}

/// Render a command the way it would be typed in a shell.
pub fn display(cmd: &Command) -> String {
    std::iter::once(cmd.get_program())
        .chain(cmd.get_args())
        .map(|arg| quote(&arg.to_string_lossy()))
        .collect::<Vec<_>>()
        .join(" ")
}

fn quote(arg: &str) -> String {
    let plain = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:,+@%".contains(c));
    if plain {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}

/// Number of parallel jobs to hand to make/ninja.
pub fn cpus() -> String {
    std::thread::available_parallelism()
        .map(std::num::NonZero::get)
        .unwrap_or(1)
        .to_string()
}
