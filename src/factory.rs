use crate::adapter::SharedAdapter;
use crate::error::BuildError;
use crate::logger::LogBridge;
use crate::model::PolicyModel;
use crate::types::GuardName;
use std::fmt;
use std::sync::Arc;

/// Everything resolved for one guard before its engine is constructed.
pub struct EngineParts {
    /// Guard the engine is built for.
    pub guard: GuardName,
    /// Parsed policy model; empty when the guard configures none.
    pub model: PolicyModel,
    /// Persistence adapter, injected or built from configuration.
    pub adapter: Option<SharedAdapter>,
    /// Whether the engine should write to `log`.
    pub log_enabled: bool,
    /// Logging sink shared by every engine of the same registry.
    pub log: Arc<LogBridge>,
}

impl fmt::Debug for EngineParts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineParts")
            .field("guard", &self.guard)
            .field("model", &self.model)
            .field("adapter", &self.adapter.is_some())
            .field("log_enabled", &self.log_enabled)
            .field("log", &self.log)
            .finish()
    }
}

/// Constructs policy engines from resolved parts.
///
/// Implemented for closures of shape `Fn(EngineParts) -> Result<E, BuildError>`.
/// A factory must not request guards from the registry that invokes it.
pub trait EngineFactory: Send + Sync {
    /// Engine type produced by this factory.
    type Engine: Send + Sync + 'static;

    /// Builds one engine.
    fn build(&self, parts: EngineParts) -> std::result::Result<Self::Engine, BuildError>;
}

impl<F, E> EngineFactory for F
where
    F: Fn(EngineParts) -> std::result::Result<E, BuildError> + Send + Sync,
    E: Send + Sync + 'static,
{
    type Engine = E;

    fn build(&self, parts: EngineParts) -> std::result::Result<E, BuildError> {
        self(parts)
    }
}
