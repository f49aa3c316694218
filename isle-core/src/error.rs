//! Error types.

use thiserror::Error;

/// Errors raised by the interactivity runtime.
#[derive(Debug, Error)]
pub enum Error {
    /// An accessor for the ambient scope was called outside any directive
    /// evaluation or scoped callback.
    #[error(
        "Cannot call `{method}()` when there is no scope. If you are using an async function, \
         wrap it with `with_scope()` or make it a scoped action."
    )]
    NoScope { method: &'static str },

    /// The current scope has no context for the namespace.
    #[error("No context found for namespace '{namespace}'")]
    MissingContext { namespace: String },

    /// No namespace was given and none is active.
    #[error("No namespace is active for `{method}()`")]
    NoNamespace { method: &'static str },

    #[error("Cannot lock a public store (namespace '{namespace}')")]
    PublicStoreLock { namespace: String },

    #[error("Cannot unlock a private store with an invalid lock code (namespace '{namespace}')")]
    InvalidLock { namespace: String },

    /// A directive value that should be a dotted path was an object.
    #[error("The `value` of a directive should be a string path, got {value}")]
    InvalidExpression { value: String },

    /// Raised by author code inside an action, callback or getter.
    #[error("{0}")]
    Action(String),

    #[error("Failed to parse server data: {0}")]
    ServerData(#[from] serde_json::Error),

    #[error("Failed to decode server data: {0}")]
    ServerDataEncoding(#[from] rmp_serde::decode::Error),

    #[error("Invalid runtime configuration: {message}")]
    Config { message: String },

    /// A node handed to hydration is not attached where it needs to be.
    #[error("Cannot hydrate a detached {what}")]
    Detached { what: &'static str },
}

impl Error {
    /// Convenience constructor for author-raised errors.
    pub fn action(message: impl Into<String>) -> Self {
        Self::Action(message.into())
    }
}

/// Result type used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_are_descriptive() {
        let err = Error::NoScope { method: "getContext" };
        assert!(err.to_string().starts_with("Cannot call `getContext()` when there is no scope."));

        let err = Error::InvalidLock {
            namespace: "shop".into(),
        };
        assert!(err.to_string().contains("invalid lock code"));

        let err: Error = serde_json::from_str::<serde_json::Value>("{").unwrap_err().into();
        assert!(matches!(err, Error::ServerData(_)));
    }
}
