//! Test-double transport that records calls and returns pre-configured output.

use std::collections::VecDeque;
use std::sync::Mutex;

use serde_json::{json, Value};

use super::{RawOutput, Transport};
use crate::error::Result;


/// One recorded `execute` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Execution {
    pub host: String,
    pub program: String,
}

/// Records every execution and serves responses in order. Once the queue is
/// empty it answers with empty output, like a remote process that died
/// before printing anything.
#[derive(Debug, Default)]
pub struct MockTransport {
    responses: Mutex<VecDeque<Result<RawOutput>>>,
    executions: Mutex<Vec<Execution>>,
}

impl MockTransport {
    pub fn new() -> Self {
        MockTransport::default()
    }

    pub fn with_responses(responses: Vec<Result<RawOutput>>) -> Self {
        MockTransport {
            responses: Mutex::new(responses.into()),
            executions: Mutex::new(Vec::new()),
        }
    }

    /// A transport whose first call returns `result` with no captured output.
    pub fn replying(result: &Value) -> Self {
        MockTransport::with_responses(vec![Ok(reply_output("", result))])
    }

    /// Queue another response.
    pub fn push(&self, response: Result<RawOutput>) {
        lock(&self.responses).push_back(response);
    }

    pub fn executions(&self) -> Vec<Execution> {
        lock(&self.executions).clone()
    }

    /// Hosts of all executions, in call order.
    pub fn hosts(&self) -> Vec<String> {
        lock(&self.executions).iter().map(|e| e.host.clone()).collect()
    }

    pub fn last_program(&self) -> Option<String> {
        lock(&self.executions).last().map(|e| e.program.clone())
    }
}

impl Transport for MockTransport {
    fn execute(&self, host: &str, program: &str) -> Result<RawOutput> {
        lock(&self.executions).push(Execution {
            host: host.to_string(),
            program: program.to_string(),
        });
        lock(&self.responses)
            .pop_front()
            .unwrap_or_else(|| Ok(RawOutput::default()))
    }
}

/// Raw output of a remote program that printed `output` and returned `result`.
pub fn reply_output(output: &str, result: &Value) -> RawOutput {
    RawOutput {
        stdout: format!("{}\n", json!({"output": output, "result": result})),
        stderr: String::new(),
        exit_code: Some(0),
    }
}

/// Raw output of a remote program whose callable raised.
pub fn failure_output(output: &str, diagnostic: &str) -> RawOutput {
    RawOutput {
        stdout: format!(
            "{}\n",
            json!({"output": output, "result": null, "error": diagnostic})
        ),
        stderr: String::new(),
        exit_code: Some(0),
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
