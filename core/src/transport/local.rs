//! Runs programs with an interpreter on this machine, ignoring the host.

use std::process::Command;

use tracing::debug;

use super::{run_process, RawOutput, Transport};
use crate::error::Result;
use crate::settings::Settings;


/// Feeds the program to a local interpreter on stdin. The interpreter setting
/// may include flags (`python3 -u`).
#[derive(Debug, Clone)]
pub struct LocalTransport {
    interpreter: String,
}

impl LocalTransport {
    pub fn new(interpreter: &str) -> Self {
        LocalTransport {
            interpreter: interpreter.to_string(),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        LocalTransport::new(&settings.interpreter)
    }
}

impl Transport for LocalTransport {
    fn execute(&self, host: &str, program: &str) -> Result<RawOutput> {
        debug!(host, interpreter = %self.interpreter, "running locally");
        let mut words = self.interpreter.split_whitespace();
        let mut command = Command::new(words.next().unwrap_or_default());
        command.args(words).arg("-");
        run_process(command, Some(program), host)
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LandingError;

    #[test]
    fn missing_interpreter_is_transport_error() {
        let t = LocalTransport::new("/nonexistent/python-for-landing-tests");
        let err = t.execute("localhost", "print(1)").unwrap_err();
        assert!(matches!(err, LandingError::Transport { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn program_arrives_on_stdin() {
        // `sh -` reads its script from stdin just like `python3 -`.
        let t = LocalTransport::new("sh");
        let raw = t.execute("localhost", "echo from-script\n").unwrap();
        assert_eq!(raw.stdout, "from-script\n");
        assert_eq!(raw.exit_code, Some(0));
    }

    #[cfg(unix)]
    #[test]
    fn interpreter_flags_are_passed() {
        let t = LocalTransport::new("sh -e");
        let raw = t.execute("localhost", "false\necho unreachable\n").unwrap();
        assert_eq!(raw.stdout, "");
        assert_ne!(raw.exit_code, Some(0));
    }
}
