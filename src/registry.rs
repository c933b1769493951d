use crate::adapter::{AdapterFactory, NoAdapter, SharedAdapter};
use crate::config::{ConfigResolver, ConfigStore, DEFAULT_NAMESPACE, GuardConfig, ModelSource};
use crate::error::{AdapterError, Error, Result};
use crate::factory::{EngineFactory, EngineParts};
use crate::logger::{LogBridge, Logger, LoggerResolver};
use crate::model::PolicyModel;
use crate::types::{AdapterName, GuardName};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::{
    Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard,
};

type Slot<E> = Arc<Mutex<Option<Arc<E>>>>;

/// Generic operation dispatch for engines reached through
/// [`GuardRegistry::invoke`].
pub trait Invoke {
    /// Error returned by the engine.
    type Error;

    /// Runs the named operation with JSON arguments.
    fn invoke(&self, operation: &str, args: &[Value]) -> std::result::Result<Value, Self::Error>;
}

/// Named cache of lazily built policy engines.
///
/// Each guard name owns one slot. Looking a guard up holds that slot's lock
/// across the check, build and insert, so concurrent callers asking for the
/// same unbuilt guard trigger exactly one build and share its result. Guards
/// with different names build independently. A failed build leaves no slot
/// behind.
pub struct GuardRegistry<F: EngineFactory> {
    resolver: ConfigResolver,
    factory: F,
    adapter: RwLock<Option<SharedAdapter>>,
    adapter_factory: Arc<dyn AdapterFactory>,
    loggers: LoggerResolver,
    log_bridge: Arc<LogBridge>,
    guards: Mutex<HashMap<GuardName, Slot<F::Engine>>>,
}

/// Builder for [`GuardRegistry`].
pub struct GuardRegistryBuilder<F> {
    config: ConfigStore,
    factory: F,
    namespace: String,
    adapter: Option<SharedAdapter>,
    adapter_factory: Option<Arc<dyn AdapterFactory>>,
    loggers: LoggerResolver,
    log_bridge: Option<Arc<LogBridge>>,
}

impl<F: EngineFactory> GuardRegistryBuilder<F> {
    /// Creates a builder reading configuration from `config`.
    pub fn new(config: ConfigStore, factory: F) -> Self {
        Self {
            config,
            factory,
            namespace: DEFAULT_NAMESPACE.to_string(),
            adapter: None,
            adapter_factory: None,
            loggers: LoggerResolver::new(),
            log_bridge: None,
        }
    }

    /// Sets the configuration namespace guards are read from.
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Injects an adapter used by every build regardless of configuration.
    pub fn adapter(mut self, adapter: SharedAdapter) -> Self {
        self.adapter = Some(adapter);
        self
    }

    /// Sets the factory for adapters named in guard configuration. Without
    /// one, a configured descriptor gets a fresh [`NoAdapter`].
    pub fn adapter_factory<A: AdapterFactory + 'static>(mut self, factory: A) -> Self {
        self.adapter_factory = Some(Arc::new(factory));
        self
    }

    /// Registers a logger instance under `name`.
    pub fn logger(mut self, name: impl Into<String>, logger: Arc<dyn Logger>) -> Self {
        self.loggers.register(name, logger);
        self
    }

    /// Shares an existing logging sink instead of creating one.
    pub fn log_bridge(mut self, bridge: Arc<LogBridge>) -> Self {
        self.log_bridge = Some(bridge);
        self
    }

    /// Builds the registry. No guard is built until first requested.
    pub fn build(self) -> GuardRegistry<F> {
        GuardRegistry {
            resolver: ConfigResolver::new(self.config, self.namespace),
            factory: self.factory,
            adapter: RwLock::new(self.adapter),
            adapter_factory: self
                .adapter_factory
                .unwrap_or_else(|| Arc::new(no_adapter) as Arc<dyn AdapterFactory>),
            loggers: self.loggers,
            log_bridge: self.log_bridge.unwrap_or_default(),
            guards: Mutex::new(HashMap::new()),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

fn no_adapter(descriptor: &AdapterName) -> std::result::Result<SharedAdapter, AdapterError> {
    tracing::debug!(adapter = %descriptor, "no adapter factory registered; using no-op adapter");
    Ok(Arc::new(NoAdapter))
}

fn undefined(name: &str) -> impl FnOnce(Error) -> Error + '_ {
    move |err| match err {
        Error::ConfigMissing { .. } => Error::UndefinedGuard(name.to_string()),
        other => other,
    }
}

impl<F: EngineFactory> GuardRegistry<F> {
    /// Returns the engine for `name`, building it on first use.
    ///
    /// An empty `name` selects the default guard.
    pub fn guard(&self, name: &str) -> Result<Arc<F::Engine>> {
        let name = self.resolve_name(name)?;
        self.with_slot(&name, |entry| {
            if let Some(engine) = entry.as_ref() {
                tracing::debug!(guard = %name, "guard cache hit");
                return Ok(Arc::clone(engine));
            }

            tracing::debug!(guard = %name, "guard cache miss");
            let engine = Arc::new(self.build_for(&name)?);
            *entry = Some(Arc::clone(&engine));
            Ok(engine)
        })
    }

    /// Returns the engine for the default guard.
    pub fn default_guard(&self) -> Result<Arc<F::Engine>> {
        self.guard("")
    }

    /// Replaces the cached engine for `name` with a freshly built one.
    ///
    /// If the build fails the previous engine, if any, stays cached.
    pub fn rebuild(&self, name: &str) -> Result<Arc<F::Engine>> {
        let name = self.resolve_name(name)?;
        self.with_slot(&name, |entry| {
            tracing::debug!(guard = %name, replaced = entry.is_some(), "rebuilding guard");
            let engine = Arc::new(self.build_for(&name)?);
            *entry = Some(Arc::clone(&engine));
            Ok(engine)
        })
    }

    /// Returns the default guard's engine, rebuilding it when `force_new` is set
    /// or when it has not been built yet.
    pub fn enforcer(&self, force_new: bool) -> Result<Arc<F::Engine>> {
        if force_new {
            self.rebuild("")
        } else {
            self.default_guard()
        }
    }

    /// Builds an engine for `name` without touching the cache.
    ///
    /// Like every build this installs the guard's configured logger on the
    /// shared log bridge.
    pub fn build_instance(&self, name: &str) -> Result<F::Engine> {
        let name = self.resolve_name(name)?;
        self.build_for(&name)
    }

    /// Runs `op` against the default guard's engine.
    ///
    /// Errors returned by `op` reach the caller unchanged; registry errors are
    /// converted through `E: From<Error>`.
    pub fn call<T, E, Op>(&self, op: Op) -> std::result::Result<T, E>
    where
        Op: FnOnce(&F::Engine) -> std::result::Result<T, E>,
        E: From<Error>,
    {
        let engine = self.default_guard()?;
        op(&*engine)
    }

    /// Forwards a named operation to the default guard's engine.
    pub fn invoke(
        &self,
        operation: &str,
        args: &[Value],
    ) -> std::result::Result<Value, <F::Engine as Invoke>::Error>
    where
        F::Engine: Invoke,
        <F::Engine as Invoke>::Error: From<Error>,
    {
        self.call(|engine| engine.invoke(operation, args))
    }

    /// Sets the adapter used by future builds. Engines already built keep
    /// the adapter they were built with.
    pub fn set_adapter(&self, adapter: SharedAdapter) {
        *write(&self.adapter) = Some(adapter);
    }

    /// Returns the injected adapter.
    pub fn adapter(&self) -> Option<SharedAdapter> {
        read(&self.adapter).clone()
    }

    /// Returns the configured default guard name, or an empty string.
    pub fn default_guard_name(&self) -> String {
        self.resolver.default_guard_name()
    }

    /// Overwrites the default guard name without validating it.
    pub fn set_default_guard_name(&self, name: impl AsRef<str>) {
        self.resolver.set_default_guard_name(name);
    }

    /// Returns true when `name` has a cached engine.
    pub fn is_built(&self, name: &str) -> bool {
        let Ok(name) = self.resolver.resolve_name(name) else {
            return false;
        };
        let Some(slot) = lock(&self.guards).get(&name).cloned() else {
            return false;
        };
        let entry = lock(&slot);
        entry.is_some()
    }

    /// Returns the names of all cached guards in sorted order.
    pub fn built_guards(&self) -> Vec<GuardName> {
        let slots: Vec<(GuardName, Slot<F::Engine>)> = lock(&self.guards)
            .iter()
            .map(|(name, slot)| (name.clone(), Arc::clone(slot)))
            .collect();
        let mut names: Vec<GuardName> = slots
            .into_iter()
            .filter(|(_, slot)| lock(slot).is_some())
            .map(|(name, _)| name)
            .collect();
        names.sort_unstable();
        names
    }

    /// Returns the configuration resolver.
    pub fn resolver(&self) -> &ConfigResolver {
        &self.resolver
    }

    /// Returns the logging sink shared by every engine of this registry.
    pub fn log_bridge(&self) -> &Arc<LogBridge> {
        &self.log_bridge
    }

    fn resolve_name(&self, name: &str) -> Result<GuardName> {
        self.resolver.resolve_name(name).map_err(|err| match err {
            // The default guard name is stored unvalidated.
            Error::InvalidGuardName(_) if name.trim().is_empty() => {
                Error::UndefinedGuard(self.default_guard_name())
            }
            other => undefined(name)(other),
        })
    }

    fn slot(&self, name: &GuardName) -> Slot<F::Engine> {
        let mut guards = lock(&self.guards);
        Arc::clone(guards.entry(name.clone()).or_default())
    }

    /// Runs `op` with the locked slot of `name`. A slot still empty after `op`
    /// is removed from the map before its lock is released.
    ///
    /// Lock order is slot then map; nothing takes a slot lock while holding
    /// the map lock.
    fn with_slot<T>(
        &self,
        name: &GuardName,
        op: impl FnOnce(&mut Option<Arc<F::Engine>>) -> Result<T>,
    ) -> Result<T> {
        loop {
            let slot = self.slot(name);
            let mut entry = lock(&slot);
            if entry.is_none() && !self.is_registered(name, &slot) {
                // Emptied and dropped by a failed build while we waited.
                continue;
            }

            let result = op(&mut *entry);
            if entry.is_none() {
                let mut guards = lock(&self.guards);
                if guards.get(name).is_some_and(|current| Arc::ptr_eq(current, &slot)) {
                    guards.remove(name);
                }
            }
            return result;
        }
    }

    fn is_registered(&self, name: &GuardName, slot: &Slot<F::Engine>) -> bool {
        lock(&self.guards)
            .get(name)
            .is_some_and(|current| Arc::ptr_eq(current, slot))
    }

    fn build_for(&self, name: &GuardName) -> Result<F::Engine> {
        let config = self
            .resolver
            .resolve_guard(name)
            .map_err(undefined(name.as_str()))?;

        let model = load_model(&config.model_source)?;
        let adapter = self.resolve_adapter(&config)?;
        if let Some(logger) = config.logger.as_deref() {
            self.log_bridge.set_logger(self.loggers.resolve(logger));
        }

        let parts = EngineParts {
            guard: name.clone(),
            model,
            adapter,
            log_enabled: config.log_enabled,
            log: Arc::clone(&self.log_bridge),
        };
        let has_adapter = parts.adapter.is_some();
        let engine = self.factory.build(parts).map_err(Error::EngineBuild)?;

        tracing::info!(
            guard = %name,
            model = config.model_source.kind(),
            adapter = has_adapter,
            log_enabled = config.log_enabled,
            "guard built"
        );
        Ok(engine)
    }

    fn resolve_adapter(&self, config: &GuardConfig) -> Result<Option<SharedAdapter>> {
        if let Some(adapter) = self.adapter() {
            return Ok(Some(adapter));
        }
        let Some(descriptor) = config.adapter.as_ref() else {
            return Ok(None);
        };
        self.adapter_factory
            .create(descriptor)
            .map(Some)
            .map_err(Error::AdapterConstruction)
    }
}

fn load_model(source: &ModelSource) -> Result<PolicyModel> {
    match source {
        ModelSource::None => Ok(PolicyModel::new()),
        ModelSource::File(path) => PolicyModel::from_file(path),
        ModelSource::Text(text) => PolicyModel::from_text(text),
    }
}

impl<F: EngineFactory> fmt::Debug for GuardRegistry<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GuardRegistry")
            .field("namespace", &self.resolver.namespace())
            .field("built", &self.built_guards())
            .field("adapter", &self.adapter().is_some())
            .field("loggers", &self.loggers)
            .field("log_bridge", &self.log_bridge)
            .finish_non_exhaustive()
    }
}
