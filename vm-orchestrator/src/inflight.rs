use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

/// Names of VMs that currently have a workflow running.
///
/// A name is held for as long as its [`InFlightGuard`] lives, so a workflow
/// that finishes, fails or is dropped mid-flight always releases it.
#[derive(Debug, Clone, Default)]
pub struct InFlightRegistry {
    names: Arc<Mutex<HashSet<String>>>,
}

impl InFlightRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<String>> {
        self.names.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Claim `name`, or `None` if another workflow already holds it.
    pub fn try_acquire(&self, name: &str) -> Option<InFlightGuard> {
        if !self.lock().insert(name.to_string()) {
            return None;
        }
        Some(InFlightGuard {
            registry: self.clone(),
            name: name.to_string(),
        })
    }

    pub fn is_in_flight(&self, name: &str) -> bool {
        self.lock().contains(name)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug)]
pub struct InFlightGuard {
    registry: InFlightRegistry,
    name: String,
}

impl InFlightGuard {
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.registry.lock().remove(&self.name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_acquire_is_refused() {
        let registry = InFlightRegistry::new();
        let guard = registry.try_acquire("db01").expect("first claim");
        assert_eq!(guard.name(), "db01");
        assert!(registry.try_acquire("db01").is_none());
        // other names are independent
        assert!(registry.try_acquire("db02").is_some());
    }

    #[test]
    fn test_drop_releases() {
        let registry = InFlightRegistry::new();
        {
            let _guard = registry.try_acquire("db01").unwrap();
            assert!(registry.is_in_flight("db01"));
        }
        assert!(!registry.is_in_flight("db01"));
        assert!(registry.is_empty());
        assert!(registry.try_acquire("db01").is_some());
    }
}
