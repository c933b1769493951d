use crate::adapter::{Adapter, PolicyRule};
use crate::error::AdapterError;
use async_trait::async_trait;
use std::sync::{Arc, RwLock};

/// In-memory adapter implementation for tests and demos.
///
/// Clones share the same rule set.
#[derive(Debug, Default, Clone)]
pub struct MemoryAdapter {
    inner: Arc<RwLock<Vec<PolicyRule>>>,
}

impl MemoryAdapter {
    /// Creates an empty adapter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an adapter seeded with `rules`.
    pub fn with_rules(rules: impl IntoIterator<Item = PolicyRule>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(rules.into_iter().collect())),
        }
    }

    /// Returns the number of stored rules.
    pub fn len(&self) -> usize {
        self.inner.read().expect("poisoned lock").len()
    }

    /// Returns true when no rules are stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl Adapter for MemoryAdapter {
    async fn load_policy(&self) -> std::result::Result<Vec<PolicyRule>, AdapterError> {
        let guard = self.inner.read().expect("poisoned lock");
        Ok(guard.clone())
    }

    async fn save_policy(&self, rules: &[PolicyRule]) -> std::result::Result<(), AdapterError> {
        let mut guard = self.inner.write().expect("poisoned lock");
        *guard = rules.to_vec();
        Ok(())
    }

    async fn add_policy(&self, rule: PolicyRule) -> std::result::Result<(), AdapterError> {
        let mut guard = self.inner.write().expect("poisoned lock");
        if !guard.contains(&rule) {
            guard.push(rule);
        }
        Ok(())
    }

    async fn remove_policy(&self, rule: &PolicyRule) -> std::result::Result<bool, AdapterError> {
        let mut guard = self.inner.write().expect("poisoned lock");
        let before = guard.len();
        guard.retain(|existing| existing != rule);
        Ok(guard.len() != before)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on;

    #[test]
    fn memory_adapter_should_support_basic_flow() {
        let adapter = MemoryAdapter::new();
        let read = PolicyRule::new("p", ["alice", "data1", "read"]);
        let role = PolicyRule::new("g", ["alice", "admin"]);

        block_on(adapter.add_policy(read.clone())).unwrap();
        block_on(adapter.add_policy(read.clone())).unwrap();
        block_on(adapter.add_policy(role.clone())).unwrap();
        assert_eq!(adapter.len(), 2);

        assert!(block_on(adapter.remove_policy(&read)).unwrap());
        assert!(!block_on(adapter.remove_policy(&read)).unwrap());
        assert_eq!(block_on(adapter.load_policy()).unwrap(), vec![role]);
    }

    #[test]
    fn save_policy_should_replace_rules() {
        let adapter = MemoryAdapter::with_rules([PolicyRule::new("p", ["bob", "data2", "write"])]);
        let shared = adapter.clone();

        block_on(adapter.save_policy(&[])).unwrap();
        assert!(shared.is_empty());
    }
}
