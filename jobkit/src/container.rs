//! Minimal dependency-injection container.
//!
//! Bindings are registered up front with [`ContainerBuilder`] and frozen
//! into a [`Container`]. Every [`Container::make`] call runs the binding's
//! factory, so job types resolve to a fresh instance per call.

use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::ContainerError;

type Factory =
    Arc<dyn Fn(&Container) -> Result<Box<dyn Any + Send + Sync>, ContainerError> + Send + Sync>;

struct Binding {
    type_name: &'static str,
    factory: Factory,
}

/// Frozen set of factories keyed by the type they produce.
pub struct Container {
    bindings: HashMap<TypeId, Binding>,
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.bindings.values().map(|b| b.type_name).collect();
        names.sort_unstable();
        f.debug_struct("Container").field("bindings", &names).finish()
    }
}

impl Container {
    pub fn builder() -> ContainerBuilder {
        ContainerBuilder::new()
    }

    /// Resolve a new `T` through its binding.
    pub fn make<T: Send + Sync + 'static>(&self) -> Result<T, ContainerError> {
        let binding = self
            .bindings
            .get(&TypeId::of::<T>())
            .ok_or(ContainerError::Unbound(type_name::<T>()))?;
        let value = (binding.factory)(self)?;
        value
            .downcast::<T>()
            .map(|boxed| *boxed)
            .map_err(|_| ContainerError::TypeMismatch(binding.type_name))
    }

    /// Whether a binding for `T` exists.
    pub fn contains<T: 'static>(&self) -> bool {
        self.bindings.contains_key(&TypeId::of::<T>())
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

/// Collects bindings before freezing them into a [`Container`].
#[derive(Default)]
pub struct ContainerBuilder {
    bindings: HashMap<TypeId, Binding>,
}

impl ContainerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `T` to a factory. The factory may resolve its own dependencies
    /// from the container it is handed. Rebinding replaces the factory.
    #[must_use]
    pub fn bind<T, F>(mut self, factory: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&Container) -> Result<T, ContainerError> + Send + Sync + 'static,
    {
        let factory: Factory = Arc::new(move |container| {
            factory(container).map(|value| Box::new(value) as Box<dyn Any + Send + Sync>)
        });
        self.bindings.insert(
            TypeId::of::<T>(),
            Binding {
                type_name: type_name::<T>(),
                factory,
            },
        );
        self
    }

    /// Bind `T` to its `Default` value.
    #[must_use]
    pub fn bind_default<T: Default + Send + Sync + 'static>(self) -> Self {
        self.bind(|_| Ok(T::default()))
    }

    /// Bind `T` to clones of one shared value.
    #[must_use]
    pub fn singleton<T: Clone + Send + Sync + 'static>(self, value: T) -> Self {
        self.bind(move |_| Ok(value.clone()))
    }

    pub fn build(self) -> Arc<Container> {
        Arc::new(Container {
            bindings: self.bindings,
        })
    }
}

impl ContainerError {
    /// Wrap a failure raised inside the factory for `T`.
    pub fn factory<T: 'static>(message: impl fmt::Display) -> Self {
        Self::Factory {
            type_name: type_name::<T>(),
            message: message.to_string(),
        }
    }
}
