//! Engine errors.
//!
//! Configuration errors (duplicate keys, unknown containers) and lifecycle
//! failures both fail fast: a mount/update pass either completes fully or
//! leaves the container in its prior state.

use thiserror::Error;

use crate::host::ContainerId;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Two siblings declared the same explicit key.
    #[error("duplicate sibling key `{key}` under `{parent}`")]
    DuplicateKey { key: String, parent: String },

    /// A component's render closure returned an error.
    #[error("render of `{component}` failed: {reason}")]
    RenderFailed { component: String, reason: String },

    /// A lifecycle hook returned an error.
    #[error("`{hook}` hook of `{component}` failed: {reason}")]
    HookFailed {
        hook: &'static str,
        component: String,
        reason: String,
    },

    /// The container reference does not name a live container.
    #[error("unknown container {0:?}")]
    UnknownContainer(ContainerId),

    /// An operation required a mounted root but the container has none.
    #[error("no mounted root in container {0:?}")]
    NotMounted(ContainerId),

    /// No composite instance exists at the given child path.
    #[error("no composite instance at path `{0}`")]
    NoSuchInstance(String),

    /// Pre-populated container markup could not be parsed.
    #[error("malformed markup at byte {at}: {reason}")]
    MarkupParse { at: usize, reason: String },

    /// A patch addressed an identifier that is not in the live tree.
    #[error("live node `{0}` not found")]
    NodeNotFound(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;
