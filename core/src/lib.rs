//! Landing: run individual Python functions on remote hosts over ssh.
//!
//! A [`Callable`] is a function definition plus the context values it reads.
//! Landing it on a host through a [`Dispatcher`] yields a [`Handle`]; calling
//! the handle ships a self-contained program (context, transitively referenced
//! landed callables, the target, and the call) to the host's interpreter and
//! decodes the structured reply it prints.
//!
//! ```no_run
//! use landing_core::{Callable, Dispatcher, Settings};
//!
//! # fn main() -> landing_core::Result<()> {
//! let d = Dispatcher::over_ssh(Settings::default());
//! let count = Callable::from_source(
//!     "def count(path):\n    return sum(1 for _ in open(path))\n",
//! )?;
//! let lines: u64 = d.land(count, "build-box").call_as("/etc/hosts")?;
//! # let _ = lines;
//! # Ok(())
//! # }
//! ```

pub mod callable;
pub mod context;
pub mod deps;
pub mod dispatch;
pub mod error;
pub mod registry;
pub mod reply;
pub mod script;
pub mod settings;
pub mod transport;
pub mod wire;

pub use callable::{Callable, Capture};
pub use dispatch::{Dispatcher, Handle};
pub use error::{LandingError, Result};
pub use registry::Registry;
pub use reply::Reply;
pub use settings::{Delivery, HostEntry, Policy, Settings, SshSettings};
pub use transport::{
    ConfigResolver, ConnectionParams, HostResolver, LocalTransport, MockTransport, RawOutput,
    SshTransport, Transport,
};
