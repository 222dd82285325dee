//! Remote execution through the system ssh client.
//!
//! Each call opens exactly one ssh session and closes it when the remote
//! process exits. Nothing is pooled or reused between calls.

use std::process::Command;

use tracing::{debug, info};
use uuid::Uuid;

use super::resolver::{ConfigResolver, HostResolver};
use super::{interpreter_command, run_process, shell_quote, RawOutput, Transport};
use crate::error::{LandingError, Result};
use crate::settings::{Delivery, Settings, SshSettings};


/// Exit status the ssh client uses for its own failures (connection refused,
/// authentication, unknown host).
const SSH_FAILURE: i32 = 255;


// ---------------------------------------------------------------------------
// RemoteCommand
// ---------------------------------------------------------------------------

/// The command line run on the remote side and what to feed its stdin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteCommand {
    pub command: String,
    pub stdin: Option<String>,
}


// ---------------------------------------------------------------------------
// SshTransport
// ---------------------------------------------------------------------------

pub struct SshTransport<R: HostResolver = ConfigResolver> {
    resolver: R,
    ssh: SshSettings,
    interpreter: String,
    delivery: Delivery,
    tmp_dir: String,
}

impl SshTransport<ConfigResolver> {
    /// Transport resolving hosts from the settings' `hosts` table.
    pub fn from_settings(settings: &Settings) -> Self {
        SshTransport::with_resolver(ConfigResolver::new(settings.hosts.clone()), settings)
    }
}

impl<R: HostResolver> SshTransport<R> {
    pub fn with_resolver(resolver: R, settings: &Settings) -> Self {
        SshTransport {
            resolver,
            ssh: settings.ssh.clone(),
            interpreter: settings.interpreter.clone(),
            delivery: settings.delivery,
            tmp_dir: settings.remote_tmp_dir.trim_end_matches('/').to_string(),
        }
    }

    pub fn resolver(&self) -> &R {
        &self.resolver
    }

    /// Build the remote command for one program.
    ///
    /// With `TempFile` delivery the program arrives on stdin, is written to a
    /// fresh file, run, and the file is removed whatever the outcome. The
    /// interpreter's exit status is passed through.
    pub fn remote_command(&self, program: &str) -> RemoteCommand {
        let interpreter = interpreter_command(&self.interpreter);
        match self.delivery {
            Delivery::Inline => RemoteCommand {
                command: format!("{} -c {}", interpreter, shell_quote(program)),
                stdin: None,
            },
            Delivery::TempFile => {
                let path = shell_quote(&format!(
                    "{}/landing_{}.py",
                    self.tmp_dir,
                    Uuid::new_v4().simple()
                ));
                RemoteCommand {
                    command: format!(
                        "umask 077; cat > {path} && {interp} {path}; rc=$?; rm -f {path}; exit $rc",
                        path = path,
                        interp = interpreter
                    ),
                    stdin: Some(program.to_string()),
                }
            }
        }
    }

    /// Full ssh argument vector (without the program name) and stdin.
    pub fn ssh_invocation(&self, host: &str, program: &str) -> Result<(Vec<String>, Option<String>)> {
        let params = self.resolver.resolve(host)?;
        let remote = self.remote_command(program);
        let mut args = params.ssh_args(&self.ssh);
        args.push(remote.command);
        Ok((args, remote.stdin))
    }
}

impl<R: HostResolver> Transport for SshTransport<R> {
    fn execute(&self, host: &str, program: &str) -> Result<RawOutput> {
        let (args, stdin) = self.ssh_invocation(host, program)?;
        info!(host, delivery = ?self.delivery, bytes = program.len(), "opening ssh session");

        let mut command = Command::new(&self.ssh.program);
        command.args(&args);
        let raw = run_process(command, stdin.as_deref(), host)?;
        debug!(host, exit_code = ?raw.exit_code, "ssh session closed");

        if raw.exit_code == Some(SSH_FAILURE) {
            return Err(LandingError::Transport {
                host: host.to_string(),
                reason: raw.stderr.trim().to_string(),
            });
        }
        Ok(raw)
    }
}


/// Write a stand-in for the ssh client into `dir`: it ignores every option
/// and runs the remote command (its last argument) with the local shell,
/// passing stdin through.
#[cfg(all(test, unix))]
pub(crate) fn loopback_ssh(dir: &std::path::Path) -> std::path::PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join("ssh-loopback");
    std::fs::write(&path, "#!/bin/sh\nfor last; do :; done\nexec sh -c \"$last\"\n").unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}
