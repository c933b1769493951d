use crate::error::AdapterError;
use crate::types::AdapterName;
use async_trait::async_trait;
use std::sync::Arc;

/// One stored policy rule: a section tag (`p`, `g`, ...) and its fields.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PolicyRule {
    /// Section tag the rule belongs to.
    pub ptype: String,
    /// Ordered rule fields.
    pub values: Vec<String>,
}

impl PolicyRule {
    /// Creates a rule from a section tag and its fields.
    pub fn new<I, V>(ptype: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        Self {
            ptype: ptype.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }
}

/// Persistence interface for policy rules.
#[async_trait]
pub trait Adapter: Send + Sync {
    /// Loads every stored rule.
    async fn load_policy(&self) -> std::result::Result<Vec<PolicyRule>, AdapterError>;

    /// Replaces the stored rules with `rules`.
    async fn save_policy(&self, rules: &[PolicyRule]) -> std::result::Result<(), AdapterError>;

    /// Adds one rule.
    async fn add_policy(&self, rule: PolicyRule) -> std::result::Result<(), AdapterError>;

    /// Removes one rule. Returns whether it was present.
    async fn remove_policy(&self, rule: &PolicyRule) -> std::result::Result<bool, AdapterError>;
}

/// Adapter shared between the registry and the engines it builds.
pub type SharedAdapter = Arc<dyn Adapter>;

/// No-op adapter implementation.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoAdapter;

#[async_trait]
impl Adapter for NoAdapter {
    async fn load_policy(&self) -> std::result::Result<Vec<PolicyRule>, AdapterError> {
        Ok(Vec::new())
    }

    async fn save_policy(&self, _rules: &[PolicyRule]) -> std::result::Result<(), AdapterError> {
        Ok(())
    }

    async fn add_policy(&self, _rule: PolicyRule) -> std::result::Result<(), AdapterError> {
        Ok(())
    }

    async fn remove_policy(&self, _rule: &PolicyRule) -> std::result::Result<bool, AdapterError> {
        Ok(false)
    }
}

/// Builds the adapter a guard's configuration asks for.
pub trait AdapterFactory: Send + Sync {
    /// Constructs a new adapter for `descriptor`.
    fn create(&self, descriptor: &AdapterName) -> std::result::Result<SharedAdapter, AdapterError>;
}

impl<F> AdapterFactory for F
where
    F: Fn(&AdapterName) -> std::result::Result<SharedAdapter, AdapterError> + Send + Sync,
{
    fn create(&self, descriptor: &AdapterName) -> std::result::Result<SharedAdapter, AdapterError> {
        self(descriptor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on;

    #[test]
    fn no_adapter_should_store_nothing() {
        let adapter = NoAdapter;
        let rule = PolicyRule::new("p", ["alice", "data1", "read"]);

        block_on(adapter.add_policy(rule.clone())).unwrap();
        assert!(block_on(adapter.load_policy()).unwrap().is_empty());
        assert!(!block_on(adapter.remove_policy(&rule)).unwrap());
    }

    #[test]
    fn closure_should_act_as_factory() {
        let factory = |name: &AdapterName| -> std::result::Result<SharedAdapter, AdapterError> {
            if name.as_str() == "none" {
                Ok(Arc::new(NoAdapter))
            } else {
                Err(format!("unsupported adapter {name}").into())
            }
        };

        assert!(factory.create(&AdapterName::new("none").unwrap()).is_ok());
        let err = factory
            .create(&AdapterName::new("redis").unwrap())
            .err()
            .expect("must reject");
        assert_eq!(err.to_string(), "unsupported adapter redis");
    }
}
