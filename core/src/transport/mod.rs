//! Transports: how an assembled program reaches an interpreter and how its
//! output comes back.
//!
//! `Transport` is the seam the dispatcher talks to. `SshTransport` is the
//! production implementation (one system `ssh` process per call),
//! `LocalTransport` runs the interpreter on this machine, and `MockTransport`
//! records calls and serves canned output for tests.

pub mod local;
pub mod mock;
pub mod resolver;
pub mod ssh;

pub use local::LocalTransport;
pub use mock::MockTransport;
pub use resolver::{ConfigResolver, ConnectionParams, HostResolver};
pub use ssh::SshTransport;

use std::io::Write;
use std::process::{Command, Stdio};

use tracing::debug;

use crate::error::{LandingError, Result};


/// Everything one remote process produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawOutput {
    pub stdout: String,
    pub stderr: String,
    /// `None` when the process was killed by a signal.
    pub exit_code: Option<i32>,
}

/// Runs a program text on a host and collects its output.
pub trait Transport: Send + Sync {
    fn execute(&self, host: &str, program: &str) -> Result<RawOutput>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn execute(&self, host: &str, program: &str) -> Result<RawOutput> {
        (**self).execute(host, program)
    }
}

/// Quote a word for a POSIX shell. Words made only of safe characters are
/// returned unchanged.
pub fn shell_quote(word: &str) -> String {
    let safe = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "_-./=:@,+%".contains(c));
    if safe {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', "'\\''"))
    }
}

/// The interpreter setting as a shell command prefix. The setting may carry
/// a launcher or flags (`/usr/bin/env python3`, `python3 -u`); each word is
/// quoted on its own.
pub fn interpreter_command(interpreter: &str) -> String {
    interpreter
        .split_whitespace()
        .map(shell_quote)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Spawn `command`, feed it `stdin`, and wait for it to finish.
///
/// Stdin is written from a separate thread so a chatty process cannot
/// deadlock against a large program still being written.
pub(crate) fn run_process(
    mut command: Command,
    stdin: Option<&str>,
    host: &str,
) -> Result<RawOutput> {
    command
        .stdin(if stdin.is_some() { Stdio::piped() } else { Stdio::null() })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = command.spawn().map_err(|e| LandingError::Transport {
        host: host.to_string(),
        reason: format!("failed to start {:?}: {}", command.get_program(), e),
    })?;

    let writer = match (stdin, child.stdin.take()) {
        (Some(text), Some(mut pipe)) => {
            let text = text.to_string();
            Some(std::thread::spawn(move || pipe.write_all(text.as_bytes())))
        }
        _ => None,
    };

    let output = child.wait_with_output().map_err(|e| LandingError::Transport {
        host: host.to_string(),
        reason: format!("failed to collect output: {}", e),
    })?;

    if let Some(handle) = writer {
        match handle.join() {
            Ok(Err(e)) => debug!(host, "stdin closed early: {}", e),
            Err(_) => debug!(host, "stdin writer panicked"),
            Ok(Ok(())) => {}
        }
    }

    Ok(RawOutput {
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        exit_code: output.status.code(),
    })
}
