use std::path::PathBuf;

use serde_json::Value;


/// A parsed `land` invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// `land run <file.py> --host <host> ...`
    Run {
        target: Target,
        host: String,
        local: bool,
        config: Option<PathBuf>,
    },
    /// `land script <file.py> ...`
    Script {
        target: Target,
        config: Option<PathBuf>,
    },
    /// `land hosts`
    Hosts { config: Option<PathBuf> },
    Help,
}

/// The callable to land and what to call it with.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Target {
    pub file: PathBuf,
    /// Function to call when the file defines more than one.
    pub name: Option<String>,
    /// Files whose functions are landed first as potential dependencies.
    pub with: Vec<PathBuf>,
    pub args: Vec<Value>,
}

pub const USAGE: &str = "\
Usage:
  land run <file.py> --host <host> [--name <fn>] [--with <dep.py>]... [--arg <json>]... [--local] [--config <path>]
  land script <file.py> [--name <fn>] [--with <dep.py>]... [--arg <json>]... [--config <path>]
  land hosts [--config <path>]";


/// Parse arguments (without the program name) into a `Command`.
pub fn parse_args(args: &[&str]) -> Result<Command, String> {
    if args.is_empty() {
        return Err(format!("No command specified.\n{}", USAGE));
    }

    match args[0] {
        "run" => parse_run(args),
        "script" => parse_script(args),
        "hosts" => parse_hosts(args),
        "help" | "--help" | "-h" => Ok(Command::Help),
        _ => Err(format!("Unknown command: '{}'", args[0])),
    }
}


// ---------------------------------------------------------------------------
// Sub-parsers
// ---------------------------------------------------------------------------

fn parse_run(args: &[&str]) -> Result<Command, String> {
    if args.len() < 2 {
        return Err("Usage: land run <file.py> --host <host> [...]".into());
    }
    let mut target = Target {
        file: PathBuf::from(args[1]),
        ..Target::default()
    };
    let mut host = None;
    let mut local = false;
    let mut config = None;

    let rest = &args[2..];
    let mut i = 0;
    while i < rest.len() {
        match rest[i] {
            "--host" => {
                i += 1;
                host = Some(take_arg(rest, i, "--host")?);
            }
            "--local" => local = true,
            "--config" => {
                i += 1;
                config = Some(PathBuf::from(take_arg(rest, i, "--config")?));
            }
            other => {
                if !parse_target_flag(rest, &mut i, &mut target)? {
                    return Err(format!("Unknown flag for run: '{}'", other));
                }
            }
        }
        i += 1;
    }

    let host = match host {
        Some(h) => h,
        None if local => "localhost".to_string(),
        None => return Err("run requires --host <host> (or --local)".into()),
    };
    Ok(Command::Run { target, host, local, config })
}

fn parse_script(args: &[&str]) -> Result<Command, String> {
    if args.len() < 2 {
        return Err("Usage: land script <file.py> [...]".into());
    }
    let mut target = Target {
        file: PathBuf::from(args[1]),
        ..Target::default()
    };
    let mut config = None;

    let rest = &args[2..];
    let mut i = 0;
    while i < rest.len() {
        match rest[i] {
            "--config" => {
                i += 1;
                config = Some(PathBuf::from(take_arg(rest, i, "--config")?));
            }
            other => {
                if !parse_target_flag(rest, &mut i, &mut target)? {
                    return Err(format!("Unknown flag for script: '{}'", other));
                }
            }
        }
        i += 1;
    }
    Ok(Command::Script { target, config })
}

fn parse_hosts(args: &[&str]) -> Result<Command, String> {
    let mut config = None;
    let rest = &args[1..];
    let mut i = 0;
    while i < rest.len() {
        match rest[i] {
            "--config" => {
                i += 1;
                config = Some(PathBuf::from(take_arg(rest, i, "--config")?));
            }
            other => return Err(format!("Unknown flag for hosts: '{}'", other)),
        }
        i += 1;
    }
    Ok(Command::Hosts { config })
}

/// Handle the flags shared by `run` and `script`. Returns false when the flag
/// at `rest[*i]` is not one of them.
fn parse_target_flag(rest: &[&str], i: &mut usize, target: &mut Target) -> Result<bool, String> {
    match rest[*i] {
        "--name" => {
            *i += 1;
            target.name = Some(take_arg(rest, *i, "--name")?);
        }
        "--with" => {
            *i += 1;
            target.with.push(PathBuf::from(take_arg(rest, *i, "--with")?));
        }
        "--arg" => {
            *i += 1;
            let raw = take_arg(rest, *i, "--arg")?;
            let value = serde_json::from_str(&raw)
                .map_err(|e| format!("--arg '{}' is not valid JSON: {}", raw, e))?;
            target.args.push(value);
        }
        _ => return Ok(false),
    }
    Ok(true)
}

fn take_arg(args: &[&str], index: usize, flag: &str) -> Result<String, String> {
    if index >= args.len() {
        return Err(format!("{} requires a value", flag));
    }
    Ok(args[index].into())
}


// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_args() {
        assert!(parse_args(&[]).is_err());
    }

    #[test]
    fn unknown_command() {
        assert!(parse_args(&["bogus"]).is_err());
    }

    #[test]
    fn help() {
        assert_eq!(parse_args(&["help"]).unwrap(), Command::Help);
        assert_eq!(parse_args(&["--help"]).unwrap(), Command::Help);
    }

    #[test]
    fn run_minimal() {
        let cmd = parse_args(&["run", "job.py", "--host", "box1"]).unwrap();
        assert_eq!(
            cmd,
            Command::Run {
                target: Target {
                    file: "job.py".into(),
                    ..Target::default()
                },
                host: "box1".into(),
                local: false,
                config: None,
            }
        );
    }

    #[test]
    fn run_full() {
        let cmd = parse_args(&[
            "run", "job.py", "--name", "collect", "--with", "a.py", "--with", "b.py",
            "--arg", "[1, 2]", "--arg", "\"x\"", "--host", "gpu", "--config", "land.yaml",
        ])
        .unwrap();
        match cmd {
            Command::Run { target, host, local, config } => {
                assert_eq!(target.name.as_deref(), Some("collect"));
                assert_eq!(target.with, vec![PathBuf::from("a.py"), PathBuf::from("b.py")]);
                assert_eq!(target.args, vec![json!([1, 2]), json!("x")]);
                assert_eq!(host, "gpu");
                assert!(!local);
                assert_eq!(config, Some(PathBuf::from("land.yaml")));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn run_requires_host() {
        let err = parse_args(&["run", "job.py"]).unwrap_err();
        assert!(err.contains("--host"));
    }

    #[test]
    fn run_local_defaults_host() {
        match parse_args(&["run", "job.py", "--local"]).unwrap() {
            Command::Run { host, local, .. } => {
                assert_eq!(host, "localhost");
                assert!(local);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn invalid_json_arg() {
        let err = parse_args(&["run", "job.py", "--host", "h", "--arg", "{oops"]).unwrap_err();
        assert!(err.contains("not valid JSON"));
    }

    #[test]
    fn missing_flag_value() {
        let err = parse_args(&["run", "job.py", "--host"]).unwrap_err();
        assert_eq!(err, "--host requires a value");
    }

    #[test]
    fn unknown_flag() {
        assert!(parse_args(&["run", "job.py", "--host", "h", "--fast"]).is_err());
        assert!(parse_args(&["script", "job.py", "--host", "h"]).is_err());
        assert!(parse_args(&["hosts", "--verbose"]).is_err());
    }

    #[test]
    fn script_with_deps() {
        let cmd = parse_args(&["script", "job.py", "--with", "dep.py", "--arg", "3"]).unwrap();
        match cmd {
            Command::Script { target, config } => {
                assert_eq!(target.with, vec![PathBuf::from("dep.py")]);
                assert_eq!(target.args, vec![json!(3)]);
                assert!(config.is_none());
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn hosts() {
        assert_eq!(parse_args(&["hosts"]).unwrap(), Command::Hosts { config: None });
        assert_eq!(
            parse_args(&["hosts", "--config", "c.yaml"]).unwrap(),
            Command::Hosts { config: Some("c.yaml".into()) }
        );
    }
}
