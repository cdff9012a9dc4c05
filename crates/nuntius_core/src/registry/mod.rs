use std::collections::HashSet;

use indexmap::IndexMap;
use tracing::debug;

use crate::{ConsumerDefinition, EntityType, RegistrationError, validate_definition};

/// The mutable registration phase. Every consumer is registered here once at
/// start-up, then the builder is frozen into a [`Registry`].
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    consumers: IndexMap<String, Vec<ConsumerDefinition>>,
    entity_types: IndexMap<String, EntityType>,
    names: HashSet<String>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate `definition` and bind it to its table.
    ///
    /// Fails when the definition is incomplete, when a consumer with the same
    /// name already exists, or when another consumer bound the same table to a
    /// different entity type.
    pub fn register(&mut self, definition: ConsumerDefinition) -> Result<&mut Self, RegistrationError> {
        validate_definition(&definition)?;

        if self.names.contains(definition.name()) {
            return Err(RegistrationError::DuplicateConsumer {
                consumer: definition.name().to_string(),
            });
        }

        if let Some(registered) = self.entity_types.get(definition.table())
            && registered.type_id() != definition.entity_type().type_id()
        {
            return Err(RegistrationError::EntityTypeMismatch {
                consumer: definition.name().to_string(),
                table: definition.table().to_string(),
                registered: registered.name(),
                found: definition.entity_type().name(),
            });
        }

        debug!(
            consumer = %definition.name(),
            table = %definition.table(),
            entity = definition.entity_type().name(),
            triggers = %definition.triggers(),
            "registered consumer"
        );

        let table = definition.table().to_string();
        self.names.insert(definition.name().to_string());
        self.entity_types
            .entry(table.clone())
            .or_insert_with(|| definition.entity_type().clone());
        self.consumers.entry(table).or_default().push(definition);

        Ok(self)
    }

    pub fn freeze(self) -> Registry {
        Registry {
            consumers: self.consumers,
            entity_types: self.entity_types,
        }
    }
}

/// Frozen table-to-consumer bindings. Read-only and shared across dispatches.
#[derive(Debug)]
pub struct Registry {
    consumers: IndexMap<String, Vec<ConsumerDefinition>>,
    entity_types: IndexMap<String, EntityType>,
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// Consumers bound to `table`, in registration order.
    pub fn consumers_for(&self, table: &str) -> &[ConsumerDefinition] {
        self.consumers.get(table).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn entity_type(&self, table: &str) -> Option<&EntityType> {
        self.entity_types.get(table)
    }

    pub fn tables(&self) -> impl Iterator<Item = &str> {
        self.consumers.keys().map(String::as_str)
    }

    pub fn consumers(&self) -> impl Iterator<Item = &ConsumerDefinition> {
        self.consumers.values().flatten()
    }

    /// Number of registered consumers.
    pub fn len(&self) -> usize {
        self.consumers.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.consumers.is_empty()
    }
}
