//! Name-keyed, write-once provider catalogs.

use std::collections::HashMap;
use std::sync::Arc;

use aura_types::CapabilityManifest;

/// A frozen mapping from provider name to a registered provider. Built once
/// via `ProviderRegistryBuilder` at startup and read-only afterwards — no
/// interior mutability needed. Absent providers are represented by their
/// absence from the map, never a null entry.
pub struct ProviderRegistry<T: ?Sized> {
    providers: HashMap<String, Arc<T>>,
}

impl<T: ?Sized> ProviderRegistry<T> {
    pub fn get(&self, name: &str) -> Option<Arc<T>> {
        self.providers.get(name).cloned()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.providers.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }
}

/// Builder for a `ProviderRegistry`. Consumed by `build()`.
pub struct ProviderRegistryBuilder<T: ?Sized> {
    providers: HashMap<String, Arc<T>>,
}

impl<T: ?Sized> Default for ProviderRegistryBuilder<T> {
    fn default() -> Self {
        Self {
            providers: HashMap::new(),
        }
    }
}

impl<T: ?Sized> ProviderRegistryBuilder<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, name: impl Into<String>, provider: Arc<T>) -> Self {
        self.providers.insert(name.into(), provider);
        self
    }

    pub fn build(self) -> ProviderRegistry<T> {
        ProviderRegistry {
            providers: self.providers,
        }
    }
}

/// Entries a selection pass can read without downcasting to a concrete
/// provider trait — just enough to run the tier/offline precedence rules.
pub fn manifests<T: ?Sized>(
    registry: &ProviderRegistry<T>,
    manifest_of: impl Fn(&Arc<T>) -> CapabilityManifest,
) -> Vec<CapabilityManifest> {
    registry
        .providers
        .values()
        .map(manifest_of)
        .collect()
}
