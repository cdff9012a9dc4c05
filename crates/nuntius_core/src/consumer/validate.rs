use crate::{Operation, Trigger};

use super::ConsumerDefinition;

#[derive(Debug, thiserror::Error)]
pub enum RegistrationError {
    #[error("consumer `{consumer}` declares no trigger")]
    MissingTrigger { consumer: String },
    #[error("consumer `{consumer}` declares no consume operation")]
    MissingConsume { consumer: String },
    #[error(
        "consumer `{consumer}` declares a trigger for `{operation}`; only create, update and delete are allowed"
    )]
    InvalidTriggerOperation { consumer: String, operation: String },
    #[error("consumer `{consumer}`: a {operation} trigger may only reference the {allowed} image")]
    InvalidTriggerShape {
        consumer: String,
        operation: Operation,
        allowed: &'static str,
    },
    #[error("consumer `{consumer}` is already registered")]
    DuplicateConsumer { consumer: String },
    #[error(
        "consumer `{consumer}` binds table `{table}` to {found}, but it is already bound to {registered}"
    )]
    EntityTypeMismatch {
        consumer: String,
        table: String,
        registered: &'static str,
        found: &'static str,
    },
    #[error("consumer `{consumer}` binds {entity}, which declares no fields")]
    InvalidEntityType {
        consumer: String,
        entity: &'static str,
    },
}

/// Checks that need nothing but the definition itself.
pub(crate) fn validate_definition(definition: &ConsumerDefinition) -> Result<(), RegistrationError> {
    let consumer = || definition.name.clone();

    if definition.triggers.is_empty() && definition.rejected_operations.is_empty() {
        return Err(RegistrationError::MissingTrigger {
            consumer: consumer(),
        });
    }

    if definition.consume.is_none() {
        return Err(RegistrationError::MissingConsume {
            consumer: consumer(),
        });
    }

    if definition.entity_type.fields().is_empty() {
        return Err(RegistrationError::InvalidEntityType {
            consumer: consumer(),
            entity: definition.entity_type.name(),
        });
    }

    if let Some(operation) = definition.rejected_operations.first() {
        return Err(RegistrationError::InvalidTriggerOperation {
            consumer: consumer(),
            operation: operation.clone(),
        });
    }

    for (operation, trigger) in definition.triggers.iter() {
        let Trigger::When(expr) = trigger else {
            continue;
        };

        if !expr.validate_operation(operation) {
            return Err(RegistrationError::InvalidTriggerShape {
                consumer: consumer(),
                operation,
                allowed: allowed_image(operation),
            });
        }
    }

    Ok(())
}

fn allowed_image(operation: Operation) -> &'static str {
    match operation {
        Operation::Create => "after",
        Operation::Delete => "before",
        Operation::Update | Operation::Read => "before or after",
    }
}
