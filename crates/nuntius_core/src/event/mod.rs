mod envelope;
pub use envelope::*;

mod field_map;
pub use field_map::*;

use std::{fmt, str::FromStr};

use enum_assoc::Assoc;

/// The row-level operation a change event describes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Assoc)]
#[func(pub const fn name(&self) -> &'static str)]
pub enum Operation {
    #[assoc(name = "create")]
    Create,
    /// Snapshot reads. Parsed, never dispatched.
    #[assoc(name = "read")]
    Read,
    #[assoc(name = "update")]
    Update,
    #[assoc(name = "delete")]
    Delete,
}

impl Operation {
    /// Operations a consumer may declare a trigger for.
    pub const TRIGGERABLE: [Operation; 3] =
        [Operation::Create, Operation::Update, Operation::Delete];

    pub fn is_triggerable(&self) -> bool {
        Self::TRIGGERABLE.contains(self)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown operation `{0}`")]
pub struct UnknownOperation(pub String);

impl FromStr for Operation {
    type Err = UnknownOperation;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(Operation::Create),
            "read" => Ok(Operation::Read),
            "update" => Ok(Operation::Update),
            "delete" => Ok(Operation::Delete),
            other => Err(UnknownOperation(other.to_string())),
        }
    }
}

/// One validated row-level change.
///
/// `before` is absent for creates and `after` for deletes; updates carry both.
#[derive(Clone, Debug, PartialEq)]
pub struct ChangeEvent {
    pub table: String,
    pub operation: Operation,
    pub before: Option<FieldMap>,
    pub after: Option<FieldMap>,
    pub ts_ms: Option<i64>,
}

impl ChangeEvent {
    pub fn new(
        table: impl Into<String>,
        operation: Operation,
        before: Option<FieldMap>,
        after: Option<FieldMap>,
    ) -> Self {
        Self {
            table: table.into(),
            operation,
            before,
            after,
            ts_ms: None,
        }
    }

    pub fn create(table: impl Into<String>, after: FieldMap) -> Self {
        Self::new(table, Operation::Create, None, Some(after))
    }

    pub fn update(table: impl Into<String>, before: FieldMap, after: FieldMap) -> Self {
        Self::new(table, Operation::Update, Some(before), Some(after))
    }

    pub fn delete(table: impl Into<String>, before: FieldMap) -> Self {
        Self::new(table, Operation::Delete, Some(before), None)
    }

    pub fn before(&self) -> Option<&FieldMap> {
        self.before.as_ref()
    }

    pub fn after(&self) -> Option<&FieldMap> {
        self.after.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operation_names_round_trip() {
        for op in [
            Operation::Create,
            Operation::Read,
            Operation::Update,
            Operation::Delete,
        ] {
            assert_eq!(op.name().parse::<Operation>().unwrap(), op);
        }
        assert!("upsert".parse::<Operation>().is_err());
    }

    #[test]
    fn read_is_not_triggerable() {
        assert!(!Operation::Read.is_triggerable());
        assert!(Operation::Delete.is_triggerable());
    }
}
