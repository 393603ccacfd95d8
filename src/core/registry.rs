use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("capability `{capability}` is already registered")]
    Duplicate { capability: &'static str },
    #[error("capability `{capability}` was never registered")]
    Unresolved { capability: &'static str },
}

type Instance = Box<dyn Any + Send + Sync>;

struct Entry {
    capability: &'static str,
    instance: Instance,
}

/// Narrow lookup handed to whoever constructs commands. Only resolution is
/// exposed, registration stays with the owner of the [`DependencyRegistry`].
pub trait CapabilityLookup: Send + Sync {
    fn lookup(&self, capability: TypeId) -> Option<&(dyn Any + Send + Sync)>;
}

impl<'a> dyn CapabilityLookup + 'a {
    /// Resolve the instance registered for `C`, e.g. `resolve::<dyn Gateway>()`
    pub fn resolve<C>(&self) -> Result<Arc<C>, RegistryError>
    where
        C: ?Sized + Send + Sync + 'static,
    {
        self.lookup(TypeId::of::<C>())
            .and_then(|instance| instance.downcast_ref::<Arc<C>>())
            .cloned()
            .ok_or(RegistryError::Unresolved {
                capability: type_name::<C>(),
            })
    }
}

/// Capability type → single instance, in insertion order.
///
/// Capabilities are usually trait objects (`dyn Localization`), sometimes
/// concrete services. Written sequentially during startup, read afterwards.
#[derive(Default)]
pub struct DependencyRegistry {
    entries: Vec<Entry>,
    index: HashMap<TypeId, usize>,
}

impl DependencyRegistry {
    pub fn new() -> Self {
        Default::default()
    }

    /// Fails if `C` already has an instance, whatever that instance is.
    pub fn register<C>(&mut self, instance: Arc<C>) -> Result<(), RegistryError>
    where
        C: ?Sized + Send + Sync + 'static,
    {
        let key = TypeId::of::<C>();
        let capability = type_name::<C>();
        if self.index.contains_key(&key) {
            return Err(RegistryError::Duplicate { capability });
        }
        self.index.insert(key, self.entries.len());
        self.entries.push(Entry {
            capability,
            instance: Box::new(instance),
        });
        Ok(())
    }

    #[cfg(test)]
    pub fn resolve<C>(&self) -> Result<Arc<C>, RegistryError>
    where
        C: ?Sized + Send + Sync + 'static,
    {
        self.as_lookup().resolve::<C>()
    }

    #[cfg(test)]
    pub fn contains<C>(&self) -> bool
    where
        C: ?Sized + 'static,
    {
        self.index.contains_key(&TypeId::of::<C>())
    }

    pub fn as_lookup(&self) -> &dyn CapabilityLookup {
        self
    }

    /// Registered capability names, oldest first
    pub fn capabilities(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.iter().map(|e| e.capability)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

impl CapabilityLookup for DependencyRegistry {
    fn lookup(&self, capability: TypeId) -> Option<&(dyn Any + Send + Sync)> {
        self.index
            .get(&capability)
            .map(|&i| self.entries[i].instance.as_ref())
    }
}
