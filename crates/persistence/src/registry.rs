//! Explicit registration of the entity types a unit of work can serve.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use domain::Entity;

use crate::repository::{Repository, RepositoryContext};

type Factory = Arc<dyn Fn(RepositoryContext) -> Box<dyn Any + Send + Sync> + Send + Sync>;

/// Maps entity types to repository factories.
///
/// Built once at startup and shared by every unit of work.
#[derive(Clone, Default)]
pub struct RepositoryRegistry {
    factories: HashMap<TypeId, Factory>,
    names: Vec<&'static str>,
}

impl RepositoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the repository for `T`. Registering twice is harmless.
    pub fn register<T: Entity>(mut self) -> Self {
        let factory: Factory = Arc::new(
            |context: RepositoryContext| -> Box<dyn Any + Send + Sync> {
                Box::new(Repository::<T>::new(context))
            },
        );
        if self.factories.insert(TypeId::of::<T>(), factory).is_none() {
            self.names.push(T::ENTITY_TYPE);
        }
        self
    }

    pub fn contains<T: Entity>(&self) -> bool {
        self.factories.contains_key(&TypeId::of::<T>())
    }

    /// Returns the registered entity type names, in registration order.
    pub fn entity_types(&self) -> &[&'static str] {
        &self.names
    }

    /// Builds a repository for `T`, or `None` if `T` was never registered.
    pub(crate) fn build<T: Entity>(&self, context: RepositoryContext) -> Option<Repository<T>> {
        let factory = self.factories.get(&TypeId::of::<T>())?;
        factory(context).downcast::<Repository<T>>().ok().map(|r| *r)
    }
}

impl std::fmt::Debug for RepositoryRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RepositoryRegistry")
            .field("entity_types", &self.names)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::{Category, Department};

    #[test]
    fn tracks_registered_types_once() {
        let registry = RepositoryRegistry::new()
            .register::<Category>()
            .register::<Department>()
            .register::<Category>();

        assert!(registry.contains::<Category>());
        assert_eq!(registry.entity_types(), &["Category", "Department"]);
    }
}
