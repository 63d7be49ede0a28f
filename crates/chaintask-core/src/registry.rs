//! Name-keyed registry shared by tasks and queues.

use std::collections::HashMap;
use std::sync::Arc;

/// Something that can be registered under its declared name.
pub trait Named {
    fn registry_name(&self) -> &str;
}

/// Maps names to shared instances. Later registrations replace earlier ones.
pub struct Registry<T: ?Sized> {
    entries: HashMap<String, Arc<T>>,
}

impl<T: ?Sized + Named> Registry<T> {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Insert each item under its own name, overwriting any previous entry.
    pub fn register<I>(&mut self, items: I)
    where
        I: IntoIterator<Item = Arc<T>>,
    {
        for item in items {
            let name = item.registry_name().to_string();
            if self.entries.insert(name.clone(), item).is_some() {
                tracing::debug!(%name, "registry entry replaced");
            }
        }
    }

    /// Look up an entry; `None` when nothing is registered under `name`.
    pub fn get(&self, name: &str) -> Option<Arc<T>> {
        self.entries.get(name).cloned()
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<T: ?Sized + Named> Default for Registry<T> {
    fn default() -> Self {
        Self::new()
    }
}
