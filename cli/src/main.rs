//! `land`: the command-line entry point for Landing.
//!
//! # Usage
//!
//! ```text
//! land run count.py --host gpu-1 --arg '"/proc/cpuinfo"'
//! land run report.py --with header.py --host gpu-1
//! land script report.py --with header.py
//! land hosts
//! ```

mod args;

use std::path::{Path, PathBuf};
use std::process;

use anyhow::{Context, Result};
use serde_json::Value;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use landing_core::settings;
use landing_core::transport::shell_quote;
use landing_core::{
    Callable, ConfigResolver, Dispatcher, HostResolver, LocalTransport, Settings, Transport,
};

use args::{parse_args, Command, Target, USAGE};


fn main() {
    init_tracing();

    let args: Vec<String> = std::env::args().collect();
    let arg_refs: Vec<&str> = args[1..].iter().map(|s| s.as_str()).collect();

    let cmd = match parse_args(&arg_refs) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("land: {}", e);
            process::exit(1);
        }
    };

    if let Err(e) = execute(cmd) {
        eprintln!("land: {:#}", e);
        process::exit(1);
    }
}

/// Logs go to stderr so remote output and results own stdout.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn execute(cmd: Command) -> Result<()> {
    match cmd {
        Command::Help => {
            println!("{}", USAGE);
            Ok(())
        }
        Command::Run { target, host, local, config } => {
            let settings = load_settings(config.as_deref())?;
            let value = if local {
                let transport = LocalTransport::from_settings(&settings);
                run_target(&Dispatcher::new(transport, settings), &target, &host)?
            } else {
                run_target(&Dispatcher::over_ssh(settings), &target, &host)?
            };
            println!("{}", value);
            Ok(())
        }
        Command::Script { target, config } => {
            let settings = load_settings(config.as_deref())?;
            let transport = LocalTransport::from_settings(&settings);
            let d = Dispatcher::new(transport, settings);
            let name = land_target(&d, &target, "localhost")?;
            let program = d
                .script(&name, Value::Array(target.args.clone()))
                .with_context(|| format!("assembling program for '{}'", name))?;
            print!("{}", program);
            Ok(())
        }
        Command::Hosts { config } => {
            let settings = load_settings(config.as_deref())?;
            for line in host_lines(&settings)? {
                println!("{}", line);
            }
            Ok(())
        }
    }
}


// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// `--config`, then `$LANDING_CONFIG`, then built-in defaults.
fn load_settings(flag: Option<&Path>) -> Result<Settings> {
    let path = match flag {
        Some(p) => Some(p.to_path_buf()),
        None => std::env::var_os("LANDING_CONFIG").map(PathBuf::from),
    };
    match path {
        Some(p) => {
            debug!(path = %p.display(), "loading settings");
            settings::load(&p).with_context(|| format!("loading settings from {}", p.display()))
        }
        None => {
            debug!("no config given, using defaults");
            Ok(settings::default_settings())
        }
    }
}

/// Land every function of every `--with` file, then the target. Returns the
/// target's name.
fn land_target<T: Transport>(d: &Dispatcher<T>, target: &Target, host: &str) -> Result<String> {
    for dep in &target.with {
        let source = std::fs::read_to_string(dep)
            .with_context(|| format!("reading dependency {}", dep.display()))?;
        let callables = Callable::all_from_source(&source)
            .with_context(|| format!("loading dependency {}", dep.display()))?;
        for callable in callables {
            info!(callable = callable.name(), file = %dep.display(), host, "landing dependency");
            d.land(callable, host);
        }
    }
    let callable = read_callable(&target.file, target.name.as_deref())?;
    let name = callable.name().to_string();
    info!(callable = %name, file = %target.file.display(), host, "landing target");
    d.land(callable, host);
    Ok(name)
}

fn run_target<T: Transport>(d: &Dispatcher<T>, target: &Target, host: &str) -> Result<Value> {
    let name = land_target(d, target, host)?;
    let handle = d.handle(&name)?;
    handle
        .call(Value::Array(target.args.clone()))
        .with_context(|| format!("running '{}' on {}", name, host))
}

fn read_callable(path: &Path, name: Option<&str>) -> Result<Callable> {
    let callable = match name {
        Some(name) => {
            let source = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            Callable::new(name, &source)
        }
        None => Callable::from_file(path),
    };
    callable.with_context(|| format!("loading callable from {}", path.display()))
}

/// One line per configured alias: the alias and the ssh command it becomes.
fn host_lines(settings: &Settings) -> Result<Vec<String>> {
    let resolver = ConfigResolver::new(settings.hosts.clone());
    let mut lines = Vec::new();
    for alias in resolver.aliases() {
        let params = resolver.resolve(alias)?;
        let args: Vec<String> = params
            .ssh_args(&settings.ssh)
            .iter()
            .map(|a| shell_quote(a))
            .collect();
        lines.push(format!("{}\t{} {}", alias, settings.ssh.program, args.join(" ")));
    }
    Ok(lines)
}
