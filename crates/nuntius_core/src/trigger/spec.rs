use std::fmt;

use smallvec::SmallVec;

use crate::{Operation, TriggerExpr, utils::iter_join::Join};

/// What a consumer fires on for one operation.
#[derive(Clone, Debug)]
pub enum Trigger {
    /// Fire for every event of the operation without inspecting the images.
    Always,
    When(TriggerExpr),
}

impl From<TriggerExpr> for Trigger {
    fn from(expr: TriggerExpr) -> Self {
        Trigger::When(expr)
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trigger::Always => write!(f, "always"),
            Trigger::When(expr) => write!(f, "{expr}"),
        }
    }
}

/// Per-operation triggers of one consumer, in declaration order.
#[derive(Clone, Debug, Default)]
pub struct TriggerSpec {
    entries: SmallVec<[(Operation, Trigger); 3]>,
}

impl TriggerSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, operation: Operation) -> Option<&Trigger> {
        self.entries
            .iter()
            .find_map(|(op, trigger)| (*op == operation).then_some(trigger))
    }

    /// Set the trigger for `operation`, replacing any earlier one.
    pub fn insert(&mut self, operation: Operation, trigger: Trigger) -> Option<Trigger> {
        match self.entries.iter_mut().find(|(op, _)| *op == operation) {
            Some((_, existing)) => Some(std::mem::replace(existing, trigger)),
            None => {
                self.entries.push((operation, trigger));
                None
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Operation, &Trigger)> {
        self.entries.iter().map(|(op, trigger)| (*op, trigger))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Display for TriggerSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries = self
            .iter()
            .map(|(operation, trigger)| format!("{}: {trigger}", operation.name()))
            .join(", ");
        write!(f, "{{{entries}}}")
    }
}
