use thiserror::Error;

// ---------------------------------------------------------------------------
// Landing errors
// ---------------------------------------------------------------------------

/// Everything that can go wrong between `land` and a decoded reply.
///
/// Local and transport failures surface here. A failure of the callable's
/// own logic on the remote host is reported as [`LandingError::Remote`],
/// carrying the diagnostic text produced inside the remote program.
#[derive(Debug, Error)]
pub enum LandingError {
    /// `run` was asked for a name that was never landed.
    #[error("callable '{0}' has not been landed")]
    NotLanded(String),

    /// The manifest itself is unusable (bad name, no definition found).
    #[error("invalid callable: {0}")]
    InvalidCallable(String),

    /// Connection parameters for a host could not be determined.
    #[error("cannot resolve host '{host}': {reason}")]
    Resolve { host: String, reason: String },

    /// The session could not be opened or the remote command not started.
    #[error("transport to '{host}' failed: {reason}")]
    Transport { host: String, reason: String },

    /// The remote process finished without printing a reply.
    #[error("no reply from '{host}'{}", stderr_suffix(.stderr))]
    NoReply { host: String, stderr: String },

    /// The remote process printed something that is not a reply object.
    #[error("malformed reply: {reason}")]
    MalformedReply { reason: String },

    /// The callable's own logic raised on the remote host.
    #[error("'{callable}' failed on '{host}':\n{diagnostic}")]
    Remote {
        callable: String,
        host: String,
        diagnostic: String,
    },

    /// A captured value has no wire form and the policy is strict.
    #[error("captured value '{entry}' of '{callable}' cannot be sent: {reason}")]
    UnencodableContext {
        callable: String,
        entry: String,
        reason: String,
    },

    /// Call arguments could not be encoded.
    #[error("cannot encode arguments: {0}")]
    Encode(#[source] serde_json::Error),

    /// A result could not be decoded into the requested type.
    #[error("cannot decode result: {0}")]
    Decode(#[source] serde_json::Error),

    /// Settings file could not be parsed.
    #[error("config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn stderr_suffix(stderr: &str) -> String {
    let trimmed = stderr.trim();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!(" (stderr: {})", trimmed)
    }
}

pub type Result<T> = std::result::Result<T, LandingError>;


// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
