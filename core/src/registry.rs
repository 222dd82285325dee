use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::callable::Callable;

// ---------------------------------------------------------------------------
// Registry: callable store and routing table
// ---------------------------------------------------------------------------

/// Landed callables and the host each one is currently bound to.
///
/// Storage is write-once per name: the first manifest landed under a name is
/// the one that ships, for the life of the registry. Routing is last write
/// wins. The registry itself is not synchronised; the dispatcher owns it
/// behind a lock.
#[derive(Debug, Default)]
pub struct Registry {
    callables: HashMap<String, Arc<Callable>>,
    routes: HashMap<String, String>,
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Registry {
            callables: HashMap::new(),
            routes: HashMap::new(),
        }
    }

    /// Store a manifest unless one with the same name is already stored.
    /// Returns the manifest that is in effect for that name.
    pub fn store(&mut self, callable: Callable) -> Arc<Callable> {
        if let Some(existing) = self.callables.get(callable.name()) {
            if existing.source() != callable.source() || existing.captures() != callable.captures() {
                warn!(
                    callable = callable.name(),
                    "a different definition is already landed under this name; keeping the first"
                );
            }
            return Arc::clone(existing);
        }
        debug!(callable = callable.name(), "storing callable");
        let stored = Arc::new(callable);
        self.callables
            .insert(stored.name().to_string(), Arc::clone(&stored));
        stored
    }

    /// Bind a name to a host, replacing any previous binding.
    pub fn bind(&mut self, name: &str, host: &str) -> Option<String> {
        let previous = self.routes.insert(name.to_string(), host.to_string());
        if let Some(ref prev) = previous {
            if prev != host {
                debug!(callable = name, from = %prev, to = host, "rebinding");
            }
        }
        previous
    }

    /// Host a name is currently bound to.
    pub fn route(&self, name: &str) -> Option<&str> {
        self.routes.get(name).map(|s| s.as_str())
    }

    /// The stored manifest for a name.
    pub fn get(&self, name: &str) -> Option<Arc<Callable>> {
        self.callables.get(name).cloned()
    }

    pub fn is_landed(&self, name: &str) -> bool {
        self.callables.contains_key(name)
    }

    /// All stored names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.callables.keys().map(|s| s.as_str()).collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.callables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.callables.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn make(name: &str, body: &str) -> Callable {
        Callable::new(name, &format!("def {}():\n    {}\n", name, body)).unwrap()
    }

    #[test]
    fn empty_registry() {
        let reg = Registry::new();
        assert!(reg.is_empty());
        assert!(reg.get("anything").is_none());
        assert!(reg.route("anything").is_none());
    }

    #[test]
    fn first_store_wins() {
        let mut reg = Registry::new();
        reg.store(make("job", "return 1"));
        let kept = reg.store(make("job", "return 2"));
        assert!(kept.source().contains("return 1"));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn store_same_definition_twice_is_noop() {
        let mut reg = Registry::new();
        let a = reg.store(make("job", "return 1"));
        let b = reg.store(make("job", "return 1"));
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn last_bind_wins() {
        let mut reg = Registry::new();
        assert_eq!(reg.bind("job", "h1"), None);
        assert_eq!(reg.bind("job", "h2"), Some("h1".to_string()));
        assert_eq!(reg.route("job"), Some("h2"));
    }

    #[test]
    fn routing_does_not_imply_storage() {
        let mut reg = Registry::new();
        reg.bind("ghost", "h1");
        assert!(!reg.is_landed("ghost"));
    }

    #[test]
    fn names_are_sorted() {
        let mut reg = Registry::new();
        reg.store(make("zeta", "pass"));
        reg.store(make("alpha", "pass"));
        reg.store(make("mid", "pass"));
        assert_eq!(reg.names(), vec!["alpha", "mid", "zeta"]);
    }
}
