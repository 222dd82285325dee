//! The dispatcher: lands callables, routes calls, and runs the
//! assemble → transport → decode cycle.
//!
//! A `Dispatcher` owns its registry behind a mutex, so landing and routing are
//! atomic with respect to each other. The lock is held only while reading or
//! updating the registry, never across a remote round trip. `land` returns a
//! [`Handle`], the local stand-in for the callable: each call through it looks
//! up the host the name is bound to at that moment.

use std::io::Write;
use std::sync::{Mutex, MutexGuard};

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::callable::Callable;
use crate::context;
use crate::deps;
use crate::error::{LandingError, Result};
use crate::registry::Registry;
use crate::reply::{self, Reply};
use crate::script::{self, Payload};
use crate::settings::{Policy, Settings};
use crate::transport::{RawOutput, SshTransport, Transport};
use crate::wire;


// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

pub struct Dispatcher<T: Transport = SshTransport> {
    registry: Mutex<Registry>,
    transport: T,
    settings: Settings,
    sink: Mutex<Box<dyn Write + Send>>,
}

impl Dispatcher<SshTransport> {
    /// A dispatcher that reaches hosts through the system ssh client.
    pub fn over_ssh(settings: Settings) -> Self {
        let transport = SshTransport::from_settings(&settings);
        Dispatcher::new(transport, settings)
    }
}

impl<T: Transport> Dispatcher<T> {
    /// Create a dispatcher surfacing remote output on this process's stdout.
    pub fn new(transport: T, settings: Settings) -> Self {
        Dispatcher {
            registry: Mutex::new(Registry::new()),
            transport,
            settings,
            sink: Mutex::new(Box::new(std::io::stdout())),
        }
    }

    /// Send surfaced remote output to `sink` instead of stdout.
    pub fn with_output<W: Write + Send + 'static>(mut self, sink: W) -> Self {
        self.sink = Mutex::new(Box::new(sink));
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Register `callable` (first landing of a name wins) and bind its name
    /// to `host` (last landing wins).
    pub fn land(&self, callable: Callable, host: &str) -> Handle<'_, T> {
        let name = callable.name().to_string();
        {
            let mut registry = self.registry();
            registry.store(callable);
            registry.bind(&name, host);
        }
        info!(callable = %name, host, "landed");
        Handle {
            dispatcher: self,
            name,
        }
    }

    /// A handle for a name that has already been landed.
    pub fn handle(&self, name: &str) -> Result<Handle<'_, T>> {
        if !self.registry().is_landed(name) {
            return Err(LandingError::NotLanded(name.to_string()));
        }
        Ok(Handle {
            dispatcher: self,
            name: name.to_string(),
        })
    }

    /// Host `name` is currently bound to.
    pub fn route(&self, name: &str) -> Option<String> {
        self.registry().route(name).map(|h| h.to_string())
    }

    /// Names of all landed callables, sorted.
    pub fn landed(&self) -> Vec<String> {
        self.registry().names().into_iter().map(String::from).collect()
    }

    /// Run a landed callable on `host`, regardless of its current binding.
    ///
    /// Captured remote output is written to the output sink. A failure of the
    /// callable's own logic comes back as [`LandingError::Remote`]. An
    /// execution that printed no reply is [`LandingError::NoReply`] under the
    /// strict policy and `Value::Null` under best effort.
    pub fn run<A: Serialize>(&self, name: &str, host: &str, args: A) -> Result<Value> {
        let (raw, reply) = self.exchange(name, host, args)?;
        let reply = match reply {
            Some(reply) => reply,
            None => {
                warn!(callable = name, host, stderr = %raw.stderr.trim(), "remote execution printed no reply");
                return match self.settings.policy {
                    Policy::Strict => Err(LandingError::NoReply {
                        host: host.to_string(),
                        stderr: raw.stderr,
                    }),
                    Policy::BestEffort => Ok(Value::Null),
                };
            }
        };

        self.surface(&reply.output)?;
        match reply.error {
            Some(diagnostic) => Err(LandingError::Remote {
                callable: name.to_string(),
                host: host.to_string(),
                diagnostic,
            }),
            None => Ok(reply.result),
        }
    }

    /// Like [`run`](Self::run) but returns the whole reply, including the
    /// post-call values of captured names, without writing output anywhere.
    pub fn execute<A: Serialize>(&self, name: &str, host: &str, args: A) -> Result<Option<Reply>> {
        self.exchange(name, host, args).map(|(_, reply)| reply)
    }

    /// Land `callable` on `host` and call it once through its handle.
    pub fn run_now<A: Serialize>(&self, callable: Callable, host: &str, args: A) -> Result<Value> {
        self.land(callable, host).call(args)
    }

    /// The program that would be shipped for `name` with `args`.
    pub fn script<A: Serialize>(&self, name: &str, args: A) -> Result<String> {
        let args = wire::encode_args(args)?;
        self.prepare(name, &args)
    }

    fn exchange<A: Serialize>(
        &self,
        name: &str,
        host: &str,
        args: A,
    ) -> Result<(RawOutput, Option<Reply>)> {
        let args = wire::encode_args(args)?;
        let program = self.prepare(name, &args)?;
        let raw = self.transport.execute(host, &program)?;
        debug!(callable = name, host, exit_code = ?raw.exit_code, "remote execution finished");
        let reply = reply::decode(&raw)?;
        Ok((raw, reply))
    }

    fn prepare(&self, name: &str, args: &[Value]) -> Result<String> {
        let (target, dependencies) = {
            let registry = self.registry();
            let target = registry
                .get(name)
                .ok_or_else(|| LandingError::NotLanded(name.to_string()))?;
            let dependencies = deps::resolve(&target, &registry);
            (target, dependencies)
        };
        let context = context::filter(&target, self.settings.policy)?;

        let program = script::assemble(&Payload {
            target: &target,
            dependencies: &dependencies,
            context: &context,
            args,
        });
        debug!(
            callable = name,
            dependencies = dependencies.len(),
            context = context.len(),
            bytes = program.len(),
            "assembled program"
        );
        if self.settings.debug_script {
            debug!(callable = name, "program:\n{}", program);
        }
        Ok(program)
    }

    fn surface(&self, output: &str) -> Result<()> {
        if !self.settings.echo_output || output.is_empty() {
            return Ok(());
        }
        let mut sink = self.sink.lock().unwrap_or_else(|p| p.into_inner());
        sink.write_all(output.as_bytes())?;
        sink.flush()?;
        Ok(())
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(|p| p.into_inner())
    }
}


// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// Local stand-in for a landed callable.
pub struct Handle<'d, T: Transport = SshTransport> {
    dispatcher: &'d Dispatcher<T>,
    name: String,
}

impl<'d, T: Transport> Handle<'d, T> {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The host the next call will go to.
    pub fn host(&self) -> Option<String> {
        self.dispatcher.route(&self.name)
    }

    /// Call the callable on whichever host its name is bound to now.
    pub fn call<A: Serialize>(&self, args: A) -> Result<Value> {
        let host = self
            .host()
            .ok_or_else(|| LandingError::NotLanded(self.name.clone()))?;
        self.dispatcher.run(&self.name, &host, args)
    }

    /// Call with exactly one argument, even when `arg` is a sequence or
    /// `None`.
    pub fn call1<A: Serialize>(&self, arg: A) -> Result<Value> {
        self.call((arg,))
    }

    /// Call and decode the result into `R`.
    pub fn call_as<R: DeserializeOwned, A: Serialize>(&self, args: A) -> Result<R> {
        let value = self.call(args)?;
        serde_json::from_value(value).map_err(LandingError::Decode)
    }
}

impl<'d, T: Transport> Clone for Handle<'d, T> {
    fn clone(&self) -> Self {
        Handle {
            dispatcher: self.dispatcher,
            name: self.name.clone(),
        }
    }
}


// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
