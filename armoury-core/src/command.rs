//! External tool invoker
//!
//! Runs helper programs (`asusctl`, `openrgb`, `sensors`, ...) with a hard
//! timeout. Missing binaries, non-zero exits and timeouts all collapse into a
//! [`ToolOutput`] with a non-zero code; nothing here returns an error.

use std::fmt;
use std::io::Read;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, trace, warn};

use crate::constants::tools;
use crate::error::{ArmouryError, Result};

/// A program invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommand {
    pub program: String,
    pub args: Vec<String>,
    pub timeout: Duration,
}

impl ToolCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            timeout: tools::DEFAULT_TIMEOUT,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl fmt::Display for ToolCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Result of running a tool
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolOutput {
    pub code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self { code: 0, stdout: stdout.into(), stderr: String::new() }
    }

    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self { code, stdout: String::new(), stderr: stderr.into() }
    }

    pub fn not_found(program: &str) -> Self {
        Self::failed(-1, format!("Command not found: {}", program))
    }

    pub fn timed_out() -> Self {
        Self::failed(-1, "Command timed out")
    }

    pub fn success(&self) -> bool {
        self.code == 0
    }

    /// Convert into a typed result, keeping stdout on success
    pub fn into_result(self, program: &str) -> Result<String> {
        if self.success() {
            return Ok(self.stdout);
        }
        if self.stderr.starts_with("Command not found") {
            return Err(ArmouryError::ToolNotFound(program.to_string()));
        }
        if self.stderr == "Command timed out" {
            return Err(ArmouryError::ToolTimeout(program.to_string()));
        }
        Err(ArmouryError::ToolFailed {
            program: program.to_string(),
            code: self.code,
            stderr: self.stderr.trim().to_string(),
        })
    }
}

/// Seam between facets and the processes they spawn
#[cfg_attr(test, mockall::automock)]
pub trait ToolRunner: Send + Sync {
    /// Run to completion or until the command's timeout elapses
    fn run(&self, command: &ToolCommand) -> ToolOutput;

    /// Whether `program` is an executable somewhere on `PATH`
    fn is_installed(&self, program: &str) -> bool;
}

/// Run a command and map failure into an [`ArmouryError`]
pub fn run_checked(runner: &dyn ToolRunner, command: &ToolCommand) -> Result<String> {
    trace!(target: "armoury::tools", "Running: {}", command);
    runner.run(command).into_result(&command.program)
}

/// [`ToolRunner`] backed by real child processes
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl SystemRunner {
    pub fn new() -> Self {
        Self
    }

    fn wait_with_timeout(child: &mut Child, timeout: Duration) -> Option<i32> {
        let deadline = Instant::now() + timeout;
        loop {
            match child.try_wait() {
                // Killed by signal has no code
                Ok(Some(status)) => return Some(status.code().unwrap_or(-1)),
                Ok(None) if Instant::now() >= deadline => return None,
                Ok(None) => thread::sleep(tools::WAIT_POLL),
                Err(e) => {
                    warn!(target: "armoury::tools", "Failed to wait for child: {}", e);
                    return Some(-1);
                }
            }
        }
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = String::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_string(&mut buf);
        }
        buf
    })
}

impl ToolRunner for SystemRunner {
    fn run(&self, command: &ToolCommand) -> ToolOutput {
        let spawned = Command::new(&command.program)
            .args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn();

        let mut child = match spawned {
            Ok(child) => child,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(target: "armoury::tools", "Command not found: {}", command.program);
                return ToolOutput::not_found(&command.program);
            }
            Err(e) => {
                debug!(target: "armoury::tools", "Failed to spawn {}: {}", command, e);
                return ToolOutput::failed(-1, e.to_string());
            }
        };

        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let Some(code) = Self::wait_with_timeout(&mut child, command.timeout) else {
            warn!(target: "armoury::tools", "Command timed out after {:?}: {}", command.timeout, command);
            let _ = child.kill();
            let _ = child.wait();
            return ToolOutput::timed_out();
        };

        ToolOutput {
            code,
            stdout: stdout.join().unwrap_or_default(),
            stderr: stderr.join().unwrap_or_default(),
        }
    }

    fn is_installed(&self, program: &str) -> bool {
        use std::os::unix::fs::PermissionsExt;

        let is_executable = |path: &Path| {
            path.metadata()
                .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
                .unwrap_or(false)
        };

        if program.contains('/') {
            return is_executable(Path::new(program));
        }

        std::env::var_os("PATH")
            .map(|paths| std::env::split_paths(&paths).any(|dir| is_executable(&dir.join(program))))
            .unwrap_or(false)
    }
}
