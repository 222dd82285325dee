//! Decoding of the structured reply printed by a remote program.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::error::{LandingError, Result};
use crate::transport::RawOutput;


/// The single object a remote execution prints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reply {
    /// Everything the callable wrote to stdout or stderr while running.
    #[serde(default)]
    pub output: String,
    /// The return value, or null.
    #[serde(default)]
    pub result: Value,
    /// Formatted traceback when the callable raised.
    #[serde(default)]
    pub error: Option<String>,
    /// Values of the captured names after the call returned.
    #[serde(default)]
    pub variables: BTreeMap<String, Value>,
}

impl Reply {
    /// The call's outcome: its value, or the remote diagnostic.
    pub fn outcome(&self) -> std::result::Result<&Value, &str> {
        match self.error {
            Some(ref diagnostic) => Err(diagnostic.as_str()),
            None => Ok(&self.result),
        }
    }

    pub fn is_failure(&self) -> bool {
        self.error.is_some()
    }
}

/// Decode the raw output of one remote process.
///
/// No stdout at all yields `Ok(None)`; the caller decides whether that is an
/// error. Otherwise the last non-blank stdout line must be a reply object.
pub fn decode(raw: &RawOutput) -> Result<Option<Reply>> {
    let line = match raw.stdout.lines().rev().find(|l| !l.trim().is_empty()) {
        Some(line) => line.trim(),
        None => return Ok(None),
    };
    serde_json::from_str::<Reply>(line).map(Some).map_err(|e| {
        warn!(stderr = %raw.stderr.trim(), "unparsable reply line");
        LandingError::MalformedReply {
            reason: format!("{} in {:?}", e, truncate(line, 200)),
        }
    })
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let head: String = text.chars().take(max).collect();
        format!("{}...", head)
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(stdout: &str) -> RawOutput {
        RawOutput {
            stdout: stdout.to_string(),
            stderr: String::new(),
            exit_code: Some(0),
        }
    }

    #[test]
    fn empty_stdout_is_no_reply() {
        assert_eq!(decode(&raw("")).unwrap(), None);
        assert_eq!(decode(&raw("\n  \n")).unwrap(), None);
    }

    #[test]
    fn decodes_plain_reply() {
        let reply = decode(&raw("{\"output\": \"\", \"result\": 4}\n"))
            .unwrap()
            .unwrap();
        assert_eq!(reply.result, json!(4));
        assert_eq!(reply.output, "");
        assert!(reply.error.is_none());
        assert!(reply.variables.is_empty());
        assert_eq!(reply.outcome(), Ok(&json!(4)));
    }

    #[test]
    fn missing_result_is_null() {
        let reply = decode(&raw("{\"output\": \"hi\\n\"}")).unwrap().unwrap();
        assert_eq!(reply.result, Value::Null);
        assert_eq!(reply.output, "hi\n");
    }

    #[test]
    fn error_field_is_a_failure() {
        let line = r#"{"output": "\n[EXCEPTION]\nNameError", "result": null, "error": "NameError: name 'header' is not defined"}"#;
        let reply = decode(&raw(line)).unwrap().unwrap();
        assert!(reply.is_failure());
        assert_eq!(
            reply.outcome(),
            Err("NameError: name 'header' is not defined")
        );
    }

    #[test]
    fn last_line_wins_over_login_noise() {
        let stdout = "Welcome to Ubuntu\n{\"output\": \"\", \"result\": [1, 2]}\n\n";
        let reply = decode(&raw(stdout)).unwrap().unwrap();
        assert_eq!(reply.result, json!([1, 2]));
    }

    #[test]
    fn variables_round_trip() {
        let line = r#"{"output": "", "result": null, "error": null, "variables": {"y": 20}}"#;
        let reply = decode(&raw(line)).unwrap().unwrap();
        assert_eq!(reply.variables["y"], json!(20));
    }

    #[test]
    fn garbage_is_malformed() {
        let err = decode(&raw("Traceback (most recent call last):\n  oops\n")).unwrap_err();
        assert!(matches!(err, LandingError::MalformedReply { .. }));
    }

    #[test]
    fn truncate_long_lines() {
        let long = "x".repeat(500);
        let t = truncate(&long, 10);
        assert_eq!(t, "xxxxxxxxxx...");
    }
}
