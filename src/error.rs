/// Error taxonomy for stack assembly
use thiserror::Error;

pub type Result<T> = std::result::Result<T, StackError>;

/// Errors raised while reading configuration, wiring the resource graph or
/// resolving deferred outputs.
///
/// The type is `Clone` because a single failure may be observed by every
/// consumer of a shared [`crate::output::Output`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StackError {
    #[error("Missing required configuration value: {0}")]
    MissingConfiguration(String),

    #[error("Invalid configuration value for {key}: {reason}")]
    InvalidConfiguration { key: String, reason: String },

    #[error("Invalid CIDR notation: {0}")]
    InvalidCidr(String),

    #[error("Dependency unresolved: {0}")]
    DependencyUnresolved(String),

    #[error("Provisioning failed for {resource}: {message}")]
    RemoteProvisioning { resource: String, message: String },

    #[error("Output '{0}' is already exported")]
    DuplicateOutput(String),

    #[error("Resource '{0}' is already declared")]
    DuplicateResource(String),

    #[error("Resource '{0}' is not declared in this graph")]
    UnknownDependency(String),

    #[error("Resource kind {kind} has no output field '{field}'")]
    UnknownOutput { kind: String, field: String },
}

impl StackError {
    pub fn invalid_config(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            key: key.into(),
            reason: reason.into(),
        }
    }

    pub fn remote(resource: impl Into<String>, message: impl Into<String>) -> Self {
        Self::RemoteProvisioning {
            resource: resource.into(),
            message: message.into(),
        }
    }

    pub fn unresolved(what: impl Into<String>) -> Self {
        Self::DependencyUnresolved(what.into())
    }
}
