//! Command execution abstraction for the packet-filter backends.
//!
//! Firewall backends never call `std::process::Command` directly; they go
//! through [`CommandExecutor`] so the exact `ipset`/`iptables`/`nft` command
//! sequences can be checked in unit tests without root.

use std::io::{self, Write};
use std::process::{Command, Stdio};
use tracing::debug;

use crate::error::FilterError;

#[cfg(test)]
use mockall::automock;

/// Output from command execution
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    /// Whether the command exited with status 0
    pub success: bool,
    pub code: Option<i32>,
}

impl CommandOutput {
    /// Successful output with the given stdout (test helper and mock default).
    pub fn ok(stdout: &str) -> Self {
        Self {
            stdout: stdout.to_string(),
            stderr: String::new(),
            success: true,
            code: Some(0),
        }
    }

    /// Failed output with the given stderr and exit code 1.
    pub fn failed(stderr: &str) -> Self {
        Self {
            stdout: String::new(),
            stderr: stderr.to_string(),
            success: false,
            code: Some(1),
        }
    }
}

/// Runs external programs on behalf of a firewall backend.
#[cfg_attr(test, automock)]
pub trait CommandExecutor: Send + Sync {
    /// Execute `cmd` with `args` and capture its output.
    fn execute(&self, cmd: &str, args: &[String]) -> io::Result<CommandOutput>;

    /// Execute `cmd` with `args`, feeding `stdin` to it.
    fn execute_with_stdin(&self, cmd: &str, args: &[String], stdin: &str)
        -> io::Result<CommandOutput>;
}

/// Runs actual system commands.
#[derive(Debug, Clone, Copy, Default)]
pub struct RealCommandExecutor;

impl CommandExecutor for RealCommandExecutor {
    fn execute(&self, cmd: &str, args: &[String]) -> io::Result<CommandOutput> {
        let output = Command::new(cmd)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()?;

        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            success: output.status.success(),
            code: output.status.code(),
        })
    }

    fn execute_with_stdin(
        &self,
        cmd: &str,
        args: &[String],
        stdin_data: &str,
    ) -> io::Result<CommandOutput> {
        let mut child = Command::new(cmd)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(stdin_data.as_bytes())?;
        }

        let output = child.wait_with_output()?;

        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            success: output.status.success(),
            code: output.status.code(),
        })
    }
}

/// Convert a slice of &str to Vec<String>.
///
/// mockall has trouble with the lifetimes of `&[&str]`, so the trait takes
/// `&[String]`.
pub fn args_to_strings(args: &[&str]) -> Vec<String> {
    args.iter().map(|s| s.to_string()).collect()
}

/// Execute a command and return stdout, turning a non-zero exit into an error.
pub fn run_checked<E: CommandExecutor + ?Sized>(
    executor: &E,
    program: &str,
    args: &[&str],
) -> Result<String, FilterError> {
    let output = run(executor, program, args)?;
    if output.success {
        Ok(output.stdout)
    } else {
        Err(FilterError::Command {
            program: program.to_string(),
            stderr: output.stderr.trim().to_string(),
        })
    }
}

/// Execute a command and return its raw output; only a spawn failure is an error.
pub fn run<E: CommandExecutor + ?Sized>(
    executor: &E,
    program: &str,
    args: &[&str],
) -> Result<CommandOutput, FilterError> {
    debug!("exec: {} {}", program, args.join(" "));
    executor
        .execute(program, &args_to_strings(args))
        .map_err(|source| FilterError::Spawn {
            program: program.to_string(),
            source,
        })
}

/// Feed a script to `program` on stdin, turning a non-zero exit into an error.
pub fn run_script<E: CommandExecutor + ?Sized>(
    executor: &E,
    program: &str,
    args: &[&str],
    script: &str,
) -> Result<(), FilterError> {
    debug!("exec: {} {} <<\n{}", program, args.join(" "), script);
    let output = executor
        .execute_with_stdin(program, &args_to_strings(args), script)
        .map_err(|source| FilterError::Spawn {
            program: program.to_string(),
            source,
        })?;
    if output.success {
        Ok(())
    } else {
        Err(FilterError::Command {
            program: program.to_string(),
            stderr: output.stderr.trim().to_string(),
        })
    }
}
