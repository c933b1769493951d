use std::path::PathBuf;
use thiserror::Error;

/// Persistence-adapter error type.
pub type AdapterError = Box<dyn std::error::Error + Send + Sync>;

/// Engine-construction error type returned by an [`EngineFactory`](crate::EngineFactory).
pub type BuildError = Box<dyn std::error::Error + Send + Sync>;

/// Crate result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by this crate.
#[derive(Debug, Error)]
pub enum Error {
    /// No configuration section exists under the given key.
    #[error("configuration missing: {key}")]
    ConfigMissing { key: String },
    /// The requested guard has no usable configuration.
    #[error("enforcer [{0}] is not defined")]
    UndefinedGuard(String),
    /// Invalid guard name input.
    #[error("invalid guard name: {0}")]
    InvalidGuardName(String),
    /// A configuration section exists but has the wrong shape.
    #[error("invalid configuration at {key}: {message}")]
    InvalidConfig { key: String, message: String },
    /// Configuration source could not be read or parsed.
    #[error("failed to load configuration from {path}: {message}")]
    ConfigLoad { path: String, message: String },
    /// Model file could not be read.
    #[error("failed to read model file {}: {source}", .path.display())]
    ModelLoad {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// Model definition is malformed.
    #[error("malformed model in {origin} at line {line}: {message}")]
    ModelParse {
        origin: String,
        line: usize,
        message: String,
    },
    /// Persistence adapter could not be constructed.
    #[error("adapter construction failed: {0}")]
    AdapterConstruction(#[source] AdapterError),
    /// Engine factory rejected the resolved parts.
    #[error("engine build failed: {0}")]
    EngineBuild(#[source] BuildError),
}
