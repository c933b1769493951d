//! Named policy-enforcer guards for Rust services.
//!
//! A [`GuardRegistry`] reads per-guard configuration from a shared
//! [`ConfigStore`], builds one engine per guard name on first use through an
//! [`EngineFactory`], and hands out the same shared instance to every later
//! caller. Model loading, adapter selection and logger wiring happen once per
//! build; evaluating policies is left to the engine.
//!
//! # Examples
//!
//! Building the default guard from TOML configuration:
//! ```no_run
//! use rs_guard::{BuildError, ConfigStore, EngineParts, GuardRegistryBuilder, PolicyModel};
//!
//! struct Enforcer {
//!     model: PolicyModel,
//! }
//!
//! let config = ConfigStore::from_toml_str(
//!     r#"
//!     [permission]
//!     default = "api"
//!
//!     [permission.api.model]
//!     config_type = "file"
//!     config_file_path = "config/rbac_model.conf"
//!     "#,
//! )
//! .unwrap();
//!
//! let factory = |parts: EngineParts| -> Result<Enforcer, BuildError> {
//!     Ok(Enforcer { model: parts.model })
//! };
//! let registry = GuardRegistryBuilder::new(config, factory).build();
//! let enforcer = registry.guard("").unwrap();
//! assert!(enforcer.model.has_section("m"));
//! ```
//!
//! Sharing a process-local adapter (enable `memory-adapter`):
//! ```no_run
//! # #[cfg(feature = "memory-adapter")]
//! # {
//! use rs_guard::{MemoryAdapter, PolicyRule};
//! let adapter = MemoryAdapter::with_rules([PolicyRule::new("p", ["alice", "data1", "read"])]);
//! # let _ = adapter;
//! # }
//! ```
#![forbid(unsafe_code)]

mod adapter;
mod config;
mod error;
mod factory;
mod logger;
mod model;
mod registry;
mod types;
#[cfg(feature = "memory-adapter")]
mod memory_adapter;

pub use crate::adapter::{Adapter, AdapterFactory, NoAdapter, PolicyRule, SharedAdapter};
pub use crate::config::{
    ConfigResolver, ConfigStore, DEFAULT_NAMESPACE, GuardConfig, ModelSource,
};
pub use crate::error::{AdapterError, BuildError, Error, Result};
pub use crate::factory::{EngineFactory, EngineParts};
pub use crate::logger::{LogBridge, Logger, LoggerResolver, TracingLogger};
pub use crate::model::PolicyModel;
pub use crate::registry::{GuardRegistry, GuardRegistryBuilder, Invoke};
pub use crate::types::{AdapterName, GuardName};

#[cfg(feature = "memory-adapter")]
pub use crate::memory_adapter::MemoryAdapter;
