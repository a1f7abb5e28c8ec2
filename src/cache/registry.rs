//! Bidirectional key dependency index.
//!
//! Tracks which entries depend on which keys so that removing a key can
//! reach every entry built on top of it.

use std::collections::{HashMap, HashSet};

/// Tracks parent → dependents and dependent → parents mappings.
///
/// The index holds no locks; the owning store keeps it behind the same lock
/// as the entry map so both views change together.
#[derive(Debug, Default)]
pub(crate) struct DependencyIndex {
    dependents: HashMap<String, HashSet<String>>,
    parents: HashMap<String, HashSet<String>>,
}

impl DependencyIndex {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Record that `key` depends on every key in `parents`.
    pub(crate) fn register(&mut self, key: &str, parents: HashSet<String>) {
        if parents.is_empty() {
            return;
        }
        for parent in &parents {
            self.dependents
                .entry(parent.clone())
                .or_default()
                .insert(key.to_string());
        }
        self.parents.insert(key.to_string(), parents);
    }

    /// Forget the parents of `key`. Its own dependents stay recorded until
    /// they are unregistered themselves.
    pub(crate) fn unregister(&mut self, key: &str) {
        let Some(parents) = self.parents.remove(key) else {
            return;
        };
        for parent in parents {
            if let Some(children) = self.dependents.get_mut(&parent) {
                children.remove(key);
                if children.is_empty() {
                    self.dependents.remove(&parent);
                }
            }
        }
    }

    /// Entries that directly depend on `key`.
    pub(crate) fn dependents_of(&self, key: &str) -> Vec<String> {
        self.dependents
            .get(key)
            .map(|children| children.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub(crate) fn clear(&mut self) {
        self.dependents.clear();
        self.parents.clear();
    }

    #[cfg(test)]
    pub(crate) fn parent_count(&self) -> usize {
        self.dependents.len()
    }

    #[cfg(test)]
    pub(crate) fn child_count(&self) -> usize {
        self.parents.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(keys: &[&str]) -> HashSet<String> {
        keys.iter().map(|key| key.to_string()).collect()
    }

    #[test]
    fn register_and_lookup() {
        let mut index = DependencyIndex::new();
        index.register("p:home:config", set(&["p:global"]));
        index.register("p:home:~/Views/Home/Index.hbs", set(&["p:home:config"]));

        assert_eq!(index.dependents_of("p:global"), vec!["p:home:config"]);
        assert_eq!(
            index.dependents_of("p:home:config"),
            vec!["p:home:~/Views/Home/Index.hbs"]
        );
        assert!(index.dependents_of("p:home:~/Views/Home/Index.hbs").is_empty());
    }

    #[test]
    fn unregister_cleans_up_mappings() {
        let mut index = DependencyIndex::new();
        index.register("child", set(&["a", "b"]));
        assert_eq!(index.parent_count(), 2);
        assert_eq!(index.child_count(), 1);

        index.unregister("child");
        assert_eq!(index.parent_count(), 0);
        assert_eq!(index.child_count(), 0);
    }

    #[test]
    fn empty_parent_set_is_not_tracked() {
        let mut index = DependencyIndex::new();
        index.register("lonely", HashSet::new());
        assert_eq!(index.child_count(), 0);
    }
}
