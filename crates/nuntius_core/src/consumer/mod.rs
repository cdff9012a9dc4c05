mod validate;
pub use validate::*;

use std::{any::Any, error::Error, marker::PhantomData};

use derivative::Derivative;

use crate::{Entity, EntityType, Operation, Trigger, TriggerSpec};

/// Error type consumers and guards return. Anything implementing `Error` converts
/// into it with `?`.
pub type ConsumeError = Box<dyn Error + Send + Sync>;

type ConsumeFn = Box<dyn Fn(&dyn Any) -> Result<(), ConsumeError> + Send + Sync>;
type GuardFn = Box<dyn Fn(&dyn Any, Operation) -> Result<bool, ConsumeError> + Send + Sync>;

#[derive(Debug, thiserror::Error)]
#[error("materialized instance is not a {expected}")]
pub struct InstanceTypeMismatch {
    pub expected: &'static str,
}

/// A handler bound to one source table, together with the triggers deciding
/// when it fires.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct ConsumerDefinition {
    name: String,
    table: String,
    entity_type: EntityType,
    triggers: TriggerSpec,
    rejected_operations: Vec<String>,
    #[derivative(Debug = "ignore")]
    consume: Option<ConsumeFn>,
    #[derivative(Debug = "ignore")]
    guard: Option<GuardFn>,
}

impl ConsumerDefinition {
    pub fn builder<E: Entity>(name: impl Into<String>) -> ConsumerBuilder<E> {
        ConsumerBuilder {
            name: name.into(),
            table: None,
            triggers: TriggerSpec::new(),
            rejected_operations: Vec::new(),
            consume: None,
            guard: None,
            _entity: PhantomData,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn entity_type(&self) -> &EntityType {
        &self.entity_type
    }

    pub fn triggers(&self) -> &TriggerSpec {
        &self.triggers
    }

    pub fn trigger(&self, operation: Operation) -> Option<&Trigger> {
        self.triggers.get(operation)
    }

    pub fn has_guard(&self) -> bool {
        self.guard.is_some()
    }

    /// The extra per-instance condition. Consumers without one always fire.
    pub fn should_trigger(
        &self,
        instance: &dyn Any,
        operation: Operation,
    ) -> Result<bool, ConsumeError> {
        match &self.guard {
            Some(guard) => guard(instance, operation),
            None => Ok(true),
        }
    }

    pub fn consume(&self, instance: &dyn Any) -> Result<(), ConsumeError> {
        match &self.consume {
            Some(consume) => consume(instance),
            None => Err(RegistrationError::MissingConsume {
                consumer: self.name.clone(),
            }
            .into()),
        }
    }
}

/// Builder returned by [`ConsumerDefinition::builder`].
///
/// Nothing is checked here; [`crate::RegistryBuilder::register`] validates
/// the finished definition.
pub struct ConsumerBuilder<E: Entity> {
    name: String,
    table: Option<String>,
    triggers: TriggerSpec,
    rejected_operations: Vec<String>,
    consume: Option<ConsumeFn>,
    guard: Option<GuardFn>,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> ConsumerBuilder<E> {
    /// Bind to `table` instead of the entity's own table.
    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    pub fn on(mut self, operation: Operation, trigger: impl Into<Trigger>) -> Self {
        if operation.is_triggerable() {
            self.triggers.insert(operation, trigger.into());
        } else {
            self.rejected_operations.push(operation.name().to_string());
        }
        self
    }

    /// Like [`Self::on`], keyed by operation name.
    pub fn on_key(self, key: &str, trigger: impl Into<Trigger>) -> Self {
        match key.parse::<Operation>() {
            Ok(operation) => self.on(operation, trigger),
            Err(_) => {
                let mut builder = self;
                builder.rejected_operations.push(key.to_string());
                builder
            }
        }
    }

    pub fn should_trigger<F>(self, guard: F) -> Self
    where
        F: Fn(&E, Operation) -> bool + Send + Sync + 'static,
    {
        self.try_should_trigger(move |instance, operation| Ok(guard(instance, operation)))
    }

    pub fn try_should_trigger<F>(mut self, guard: F) -> Self
    where
        F: Fn(&E, Operation) -> Result<bool, ConsumeError> + Send + Sync + 'static,
    {
        self.guard = Some(Box::new(
            move |instance: &dyn Any, operation: Operation| -> Result<bool, ConsumeError> {
                guard(downcast::<E>(instance)?, operation)
            },
        ));
        self
    }

    pub fn consume<F>(mut self, consume: F) -> Self
    where
        F: Fn(&E) -> Result<(), ConsumeError> + Send + Sync + 'static,
    {
        self.consume = Some(Box::new(
            move |instance: &dyn Any| -> Result<(), ConsumeError> {
                consume(downcast::<E>(instance)?)
            },
        ));
        self
    }

    pub fn build(self) -> ConsumerDefinition {
        ConsumerDefinition {
            name: self.name,
            table: self.table.unwrap_or_else(|| E::TABLE.to_string()),
            entity_type: E::entity_type(),
            triggers: self.triggers,
            rejected_operations: self.rejected_operations,
            consume: self.consume,
            guard: self.guard,
        }
    }
}

fn downcast<E: Entity>(instance: &dyn Any) -> Result<&E, InstanceTypeMismatch> {
    instance.downcast_ref::<E>().ok_or(InstanceTypeMismatch {
        expected: std::any::type_name::<E>(),
    })
}
