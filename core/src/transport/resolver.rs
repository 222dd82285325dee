//! Host resolution: turning a host name into ssh connection parameters.

use std::collections::BTreeMap;

use crate::error::{LandingError, Result};
use crate::settings::{HostEntry, SshSettings};


// ---------------------------------------------------------------------------
// ConnectionParams
// ---------------------------------------------------------------------------

/// Where and as whom to connect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionParams {
    /// Hostname, IP address, or an alias the ssh client knows.
    pub address: String,
    pub user: Option<String>,
    pub port: Option<u16>,
    /// Path to a private key, if not the client's default.
    pub identity_file: Option<String>,
}

impl ConnectionParams {
    /// Parameters that defer everything to the ssh client's own config.
    pub fn alias(host: &str) -> Self {
        ConnectionParams {
            address: host.to_string(),
            user: None,
            port: None,
            identity_file: None,
        }
    }

    /// `user@address`, or just the address when no user is set.
    pub fn destination(&self) -> String {
        match self.user {
            Some(ref user) => format!("{}@{}", user, self.address),
            None => self.address.clone(),
        }
    }

    /// ssh arguments up to and including the destination, without a command.
    pub fn ssh_args(&self, ssh: &SshSettings) -> Vec<String> {
        let mut args = vec![
            "-T".to_string(),
            "-o".to_string(),
            format!("ConnectTimeout={}", ssh.connect_timeout_secs),
            "-o".to_string(),
            format!("StrictHostKeyChecking={}", ssh.strict_host_key_checking),
        ];
        if ssh.batch_mode {
            args.push("-o".to_string());
            args.push("BatchMode=yes".to_string());
        }
        if let Some(port) = self.port {
            args.push("-p".to_string());
            args.push(port.to_string());
        }
        if let Some(ref key) = self.identity_file {
            args.push("-i".to_string());
            args.push(key.clone());
        }
        args.extend(ssh.extra_args.iter().cloned());
        args.push(self.destination());
        args
    }
}


// ---------------------------------------------------------------------------
// HostResolver
// ---------------------------------------------------------------------------

/// Resolves a host name to connection parameters.
pub trait HostResolver: Send + Sync {
    fn resolve(&self, host: &str) -> Result<ConnectionParams>;
}

/// Resolves from the `hosts` table of the settings. Names not in the table
/// are passed through as aliases for the ssh client to resolve.
#[derive(Debug, Clone, Default)]
pub struct ConfigResolver {
    hosts: BTreeMap<String, HostEntry>,
}

impl ConfigResolver {
    pub fn new(hosts: BTreeMap<String, HostEntry>) -> Self {
        ConfigResolver { hosts }
    }

    /// Configured aliases, sorted.
    pub fn aliases(&self) -> Vec<&str> {
        self.hosts.keys().map(|s| s.as_str()).collect()
    }
}

impl HostResolver for ConfigResolver {
    fn resolve(&self, host: &str) -> Result<ConnectionParams> {
        validate_host(host)?;
        let entry = match self.hosts.get(host) {
            Some(entry) => entry,
            None => return Ok(ConnectionParams::alias(host)),
        };
        let address = entry.hostname.clone().unwrap_or_else(|| host.to_string());
        validate_host(&address)?;
        Ok(ConnectionParams {
            address,
            user: entry.user.clone(),
            port: entry.port,
            identity_file: entry.identity_file.clone(),
        })
    }
}

fn validate_host(host: &str) -> Result<()> {
    let reason = if host.is_empty() {
        "empty host name"
    } else if host.starts_with('-') {
        "host name must not start with '-'"
    } else if host.chars().any(|c| c.is_whitespace() || c.is_control()) {
        "host name contains whitespace"
    } else {
        return Ok(());
    };
    Err(LandingError::Resolve {
        host: host.to_string(),
        reason: reason.to_string(),
    })
}
