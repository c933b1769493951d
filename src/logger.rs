use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};
use tracing::Level;

/// Logging capability engines write to.
pub trait Logger: Send + Sync {
    /// Records one message.
    fn log(&self, level: Level, message: &str);
}

/// Logger that emits `tracing` events under the `rs_guard::engine` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn log(&self, level: Level, message: &str) {
        match level {
            Level::ERROR => tracing::error!(target: "rs_guard::engine", "{message}"),
            Level::WARN => tracing::warn!(target: "rs_guard::engine", "{message}"),
            Level::INFO => tracing::info!(target: "rs_guard::engine", "{message}"),
            Level::DEBUG => tracing::debug!(target: "rs_guard::engine", "{message}"),
            _ => tracing::trace!(target: "rs_guard::engine", "{message}"),
        }
    }
}

/// Logging sink shared by every engine a registry builds.
///
/// Installing a logger swaps the sink for all engines holding this bridge,
/// including engines built before the swap. Messages are dropped while no
/// logger is installed.
#[derive(Default)]
pub struct LogBridge {
    logger: RwLock<Option<Arc<dyn Logger>>>,
}

impl LogBridge {
    /// Creates a bridge with no logger installed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs `logger`, replacing the previous one.
    pub fn set_logger(&self, logger: Arc<dyn Logger>) {
        *self.logger.write().expect("poisoned lock") = Some(logger);
    }

    /// Removes the installed logger.
    pub fn clear(&self) {
        *self.logger.write().expect("poisoned lock") = None;
    }

    /// Returns true when a logger is installed.
    pub fn is_installed(&self) -> bool {
        self.logger.read().expect("poisoned lock").is_some()
    }

    /// Returns the installed logger.
    pub fn logger(&self) -> Option<Arc<dyn Logger>> {
        self.logger.read().expect("poisoned lock").clone()
    }
}

impl Logger for LogBridge {
    fn log(&self, level: Level, message: &str) {
        if let Some(logger) = self.logger() {
            logger.log(level, message);
        }
    }
}

impl fmt::Debug for LogBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogBridge")
            .field("installed", &self.is_installed())
            .finish()
    }
}

/// Maps logger descriptors to logger instances.
///
/// Registered loggers are returned as-is; any other name resolves to one
/// shared [`TracingLogger`].
#[derive(Clone)]
pub struct LoggerResolver {
    named: HashMap<String, Arc<dyn Logger>>,
    fallback: Arc<dyn Logger>,
}

impl Default for LoggerResolver {
    fn default() -> Self {
        Self {
            named: HashMap::new(),
            fallback: Arc::new(TracingLogger),
        }
    }
}

impl LoggerResolver {
    /// Creates a resolver with no registered loggers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `logger` under `name`.
    pub fn register(&mut self, name: impl Into<String>, logger: Arc<dyn Logger>) {
        self.named.insert(name.into(), logger);
    }

    /// Resolves `name` to a logger.
    pub fn resolve(&self, name: &str) -> Arc<dyn Logger> {
        match self.named.get(name) {
            Some(logger) => Arc::clone(logger),
            None => {
                tracing::debug!(logger = name, "logger not registered; using tracing logger");
                Arc::clone(&self.fallback)
            }
        }
    }
}

impl fmt::Debug for LoggerResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.named.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("LoggerResolver")
            .field("named", &names)
            .finish()
    }
}
