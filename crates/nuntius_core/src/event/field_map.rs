use indexmap::IndexMap;
use serde_json::{Map, Value};

use crate::Datatype;

/// Field name to raw value, in the order the change feed listed them.
pub type FieldMap = IndexMap<String, Datatype>;

pub fn field_map_from_json(object: &Map<String, Value>) -> FieldMap {
    object
        .iter()
        .map(|(field, value)| {
            let value: Datatype = value.into();
            (field.clone(), value)
        })
        .collect()
}
