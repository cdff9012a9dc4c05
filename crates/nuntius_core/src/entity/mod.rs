use std::any::{Any, TypeId};

use derivative::Derivative;

use crate::{Datatype, DatatypeConversionError, DatatypeKind, FieldMap};

pub type FieldsDef = &'static [(&'static str, DatatypeKind)];

/// A row type that change events can be materialized into.
///
/// Usually generated by `#[entity]`. The field table doubles as the coercion
/// table: every declared field is parsed through its [`DatatypeKind`] before
/// it reaches [`Entity::set_field`]. Fields the change feed carries but the
/// entity does not declare (relations, audit columns) are ignored.
pub trait Entity: Default + Send + Sync + 'static {
    const TABLE: &'static str;

    fn fields() -> FieldsDef;

    fn set_field(&mut self, field: &str, value: Datatype) -> Result<(), DatatypeConversionError>;

    fn to_datatypes(&self) -> Vec<(&'static str, Datatype)>;

    fn entity_type() -> EntityType {
        EntityType::of::<Self>()
    }
}

/// A materialized row, handed to consumers behind a type-erased box.
pub type Instance = Box<dyn Any + Send + Sync>;

type MaterializeFn =
    fn(&EntityType, Option<&FieldMap>, Option<&FieldMap>) -> Result<Instance, MaterializeError>;

/// Runtime descriptor of an [`Entity`] implementation.
#[derive(Clone, Derivative)]
#[derivative(Debug)]
pub struct EntityType {
    name: &'static str,
    table: &'static str,
    #[derivative(Debug = "ignore")]
    type_id: TypeId,
    fields: FieldsDef,
    #[derivative(Debug = "ignore")]
    materialize: MaterializeFn,
}

impl EntityType {
    pub fn of<E: Entity>() -> Self {
        Self {
            name: std::any::type_name::<E>(),
            table: E::TABLE,
            type_id: TypeId::of::<E>(),
            fields: E::fields(),
            materialize: materialize::<E>,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// The table the entity declares. Consumers may still bind it to another.
    pub fn table(&self) -> &'static str {
        self.table
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn fields(&self) -> FieldsDef {
        self.fields
    }

    pub fn is<E: Entity>(&self) -> bool {
        self.type_id == TypeId::of::<E>()
    }

    /// Build one logical row: start from the before image, then overlay every
    /// field present in the after image. Nulls in the before image leave the
    /// default value in place, so key-only before images of deletes still
    /// materialize.
    pub fn materialize(
        &self,
        before: Option<&FieldMap>,
        after: Option<&FieldMap>,
    ) -> Result<Instance, MaterializeError> {
        (self.materialize)(self, before, after)
    }

    /// Run every declared field of `image` through its coercion rule.
    ///
    /// With `omit_null`, fields that are explicitly null are left out instead
    /// of being coerced.
    pub fn coerce(
        &self,
        image: &FieldMap,
        omit_null: bool,
    ) -> Result<Vec<(&'static str, Datatype)>, MaterializeError> {
        let mut coerced = Vec::with_capacity(self.fields.len());

        for &(field, ref kind) in self.fields {
            let Some(raw) = image.get(field) else {
                continue;
            };

            if omit_null && raw.is_null() {
                continue;
            }

            let value = kind
                .coerce(raw.clone())
                .map_err(|source| MaterializeError::Coercion {
                    entity: self.name,
                    field,
                    source,
                })?;
            coerced.push((field, value));
        }

        Ok(coerced)
    }
}

fn materialize<E: Entity>(
    entity_type: &EntityType,
    before: Option<&FieldMap>,
    after: Option<&FieldMap>,
) -> Result<Instance, MaterializeError> {
    let mut instance = E::default();

    let images = [(before, true), (after, false)];
    for (image, omit_null) in images {
        let Some(image) = image else {
            continue;
        };

        for (field, value) in entity_type.coerce(image, omit_null)? {
            instance
                .set_field(field, value)
                .map_err(|source| MaterializeError::Coercion {
                    entity: entity_type.name,
                    field,
                    source,
                })?;
        }
    }

    Ok(Box::new(instance))
}

#[derive(Debug, thiserror::Error)]
pub enum MaterializeError {
    #[error("cannot coerce field `{field}` of {entity}: {source}")]
    Coercion {
        entity: &'static str,
        field: &'static str,
        #[source]
        source: DatatypeConversionError,
    },
}
