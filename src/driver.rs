//! The boundary to the external tools that actually move overlay content
//! (`git`, `svn`, `rsync`, `mount`, ...).

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;

/// One external command to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    /// Working directory; the current one when `None`.
    pub cwd: Option<PathBuf>,
}

impl Invocation {
    pub fn new(program: &str) -> Self {
        Self {
            program: program.to_string(),
            args: Vec::new(),
            cwd: None,
        }
    }

    pub fn arg<S: AsRef<str>>(mut self, arg: S) -> Self {
        self.args.push(arg.as_ref().to_string());
        self
    }

    pub fn path_arg<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.args.push(path.as_ref().to_string_lossy().to_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.args.extend(args.into_iter().map(|a| a.as_ref().to_string()));
        self
    }

    pub fn current_dir<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.cwd = Some(dir.as_ref().to_path_buf());
        self
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// A command that could not be started or exited unsuccessfully.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("`{command}` failed: {message}")]
pub struct DriverError {
    pub command: String,
    pub message: String,
}

/// Runs external commands on behalf of the sync strategies.
pub trait SyncDriver: Send + Sync {
    fn run(&self, invocation: &Invocation) -> Result<(), DriverError>;
}

/// Runs commands as child processes and waits for them.
#[derive(Debug, Default, Clone)]
pub struct ProcessDriver;

impl SyncDriver for ProcessDriver {
    fn run(&self, invocation: &Invocation) -> Result<(), DriverError> {
        log::debug!("Running: {invocation}");
        let mut command = Command::new(&invocation.program);
        command.args(&invocation.args);
        if let Some(cwd) = &invocation.cwd {
            command.current_dir(cwd);
        }
        let output = command.output().map_err(|e| DriverError {
            command: invocation.to_string(),
            message: e.to_string(),
        })?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(DriverError {
                command: invocation.to_string(),
                message: format!(
                    "exit {}: {}",
                    output.status.code().unwrap_or(-1),
                    stderr.trim()
                ),
            });
        }
        Ok(())
    }
}
