//! Dispatcher settings and their YAML form.
//!
//! Every field has a default, so an empty document (or no file at all) is a
//! valid configuration. Host entries are optional: a host name that is not
//! listed is handed to the ssh client unchanged and resolved by the user's
//! own client configuration.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{LandingError, Result};


// ---------------------------------------------------------------------------
// Enumerated options
// ---------------------------------------------------------------------------

/// How the assembled program reaches the remote interpreter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Delivery {
    /// Streamed into a uniquely named remote file, run, then removed.
    #[default]
    TempFile,
    /// Passed on the interpreter command line.
    Inline,
}

/// What to do with values that cannot cross the wire and with executions
/// that produce no reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Policy {
    /// Report both as errors.
    #[default]
    Strict,
    /// Drop unencodable captures and treat a missing reply as "no value".
    BestEffort,
}


// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Interpreter command run on the remote host, optionally with a launcher
    /// or flags (`/usr/bin/env python3`, `python3 -u`).
    pub interpreter: String,
    pub delivery: Delivery,
    /// Directory for temporary program files on the remote host.
    pub remote_tmp_dir: String,
    pub policy: Policy,
    /// Write captured remote output to the local sink.
    pub echo_output: bool,
    /// Log every assembled program at debug level.
    pub debug_script: bool,
    pub ssh: SshSettings,
    /// Host aliases with explicit connection parameters.
    pub hosts: BTreeMap<String, HostEntry>,
}

/// Options for the system ssh client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SshSettings {
    pub program: String,
    pub connect_timeout_secs: u32,
    pub strict_host_key_checking: String,
    /// Never prompt for passwords or passphrases.
    pub batch_mode: bool,
    pub extra_args: Vec<String>,
}

/// Connection parameters for one host alias.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct HostEntry {
    pub hostname: Option<String>,
    pub user: Option<String>,
    pub port: Option<u16>,
    pub identity_file: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        default_settings()
    }
}

impl Default for SshSettings {
    fn default() -> Self {
        SshSettings {
            program: "ssh".into(),
            connect_timeout_secs: 10,
            strict_host_key_checking: "accept-new".into(),
            batch_mode: true,
            extra_args: Vec::new(),
        }
    }
}

/// Returns sensible defaults for all settings fields.
pub fn default_settings() -> Settings {
    Settings {
        interpreter: "python3".into(),
        delivery: Delivery::TempFile,
        remote_tmp_dir: "/tmp".into(),
        policy: Policy::Strict,
        echo_output: true,
        debug_script: false,
        ssh: SshSettings::default(),
        hosts: BTreeMap::new(),
    }
}

/// Load settings from a YAML file.
pub fn load(path: &Path) -> Result<Settings> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        LandingError::Config(format!("cannot read {}: {}", path.display(), e))
    })?;
    parse(&content)
}

/// Parse settings from YAML text. Blank input yields the defaults.
pub fn parse(content: &str) -> Result<Settings> {
    if content.trim().is_empty() {
        return Ok(default_settings());
    }
    let settings: Settings =
        serde_yaml::from_str(content).map_err(|e| LandingError::Config(e.to_string()))?;
    validate(&settings)?;
    Ok(settings)
}

/// Render settings as YAML.
pub fn to_yaml(settings: &Settings) -> Result<String> {
    serde_yaml::to_string(settings).map_err(|e| LandingError::Config(e.to_string()))
}

fn validate(settings: &Settings) -> Result<()> {
    if settings.interpreter.trim().is_empty() {
        return Err(LandingError::Config("interpreter must not be empty".into()));
    }
    if settings.ssh.program.trim().is_empty() {
        return Err(LandingError::Config("ssh.program must not be empty".into()));
    }
    if !settings.remote_tmp_dir.starts_with('/') {
        return Err(LandingError::Config(format!(
            "remote_tmp_dir must be absolute, got '{}'",
            settings.remote_tmp_dir
        )));
    }
    Ok(())
}


// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
