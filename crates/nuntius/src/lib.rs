pub use nuntius_core::*;
pub use nuntius_macros::*;

pub mod prelude {
    pub use crate::trigger::dsl::{after, before, lit};
    pub use crate::{
        ChangeEvent, ConsumeError, ConsumerDefinition, DispatchOutcome, Dispatcher, Entity,
        MemoryStore, Operation, Poller, Registry, RegistryBuilder, Trigger, TriggerExpr,
        UnitOfWork, entity,
    };
}

#[cfg(test)]
extern crate self as nuntius;
