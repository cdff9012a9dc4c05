use enum_assoc::Assoc;

use super::{Datatype, DatatypeConversionError};

/// The declared type of an entity field. Each kind knows how to coerce a raw
/// change-feed scalar into its native representation.
#[derive(Debug, Assoc, Clone, PartialEq)]
#[func(pub const fn metadata(&self) -> &DatatypeKindMetadata { _0 })]
#[func(pub const fn metadata_mut(&mut self) -> &mut DatatypeKindMetadata { _0 })]
pub enum DatatypeKind {
    Int(DatatypeKindMetadata),
    BigInt(DatatypeKindMetadata),

    Float(DatatypeKindMetadata),
    Double(DatatypeKindMetadata),

    Text(DatatypeKindMetadata),

    Blob(DatatypeKindMetadata),

    Bool(DatatypeKindMetadata),
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct DatatypeKindMetadata {
    pub optional: bool,
}

impl DatatypeKind {
    pub fn name(&self) -> &'static str {
        match self {
            DatatypeKind::Int(_) => "Int",
            DatatypeKind::BigInt(_) => "BigInt",
            DatatypeKind::Float(_) => "Float",
            DatatypeKind::Double(_) => "Double",
            DatatypeKind::Text(_) => "Text",
            DatatypeKind::Blob(_) => "Blob",
            DatatypeKind::Bool(_) => "Bool",
        }
    }

    pub fn is_optional(&self) -> bool {
        self.metadata().optional
    }

    /// Coerce a raw value into this kind.
    ///
    /// Change feeds commonly encode numbers and booleans as strings, so text is
    /// parsed for every non-text kind. Null is accepted only by optional kinds.
    pub fn coerce(&self, raw: Datatype) -> Result<Datatype, DatatypeConversionError> {
        if raw.is_null() {
            return if self.is_optional() {
                Ok(Datatype::Null)
            } else {
                Err(DatatypeConversionError::UnexpectedNull)
            };
        }

        match self {
            DatatypeKind::Int(_) => coerce_integer(raw, "Int").and_then(|v| {
                i32::try_from(v)
                    .map(Datatype::Int)
                    .map_err(|_| DatatypeConversionError::OutOfRange {
                        expected: "Int",
                        value: v.to_string(),
                    })
            }),
            DatatypeKind::BigInt(_) => coerce_integer(raw, "BigInt").map(Datatype::BigInt),
            DatatypeKind::Float(_) => coerce_float(raw, "Float").map(|v| Datatype::Float(v as f32)),
            DatatypeKind::Double(_) => coerce_float(raw, "Double").map(Datatype::Double),
            DatatypeKind::Text(_) => match raw {
                Datatype::Text(v) => Ok(Datatype::Text(v)),
                Datatype::Blob(v) => String::from_utf8(v)
                    .map(Datatype::Text)
                    .map_err(|e| DatatypeConversionError::Unparsable {
                        expected: "Text",
                        value: format!("{:?}", e.into_bytes()),
                    }),
                Datatype::Bool(v) => Ok(Datatype::Text(if v { "True" } else { "False" }.into())),
                other => Ok(Datatype::Text(other.to_string())),
            },
            DatatypeKind::Blob(_) => match raw {
                Datatype::Blob(v) => Ok(Datatype::Blob(v)),
                Datatype::Text(v) => Ok(Datatype::Blob(v.into_bytes())),
                other => Err(DatatypeConversionError::TypeMismatch {
                    expected: "Blob",
                    got: other.type_name(),
                }),
            },
            DatatypeKind::Bool(_) => coerce_bool(raw).map(Datatype::Bool),
        }
    }
}

fn coerce_integer(raw: Datatype, expected: &'static str) -> Result<i64, DatatypeConversionError> {
    match raw {
        Datatype::Int(v) => Ok(v as i64),
        Datatype::BigInt(v) => Ok(v),
        Datatype::Bool(v) => Ok(v as i64),
        Datatype::Float(v) if v.fract() == 0.0 => Ok(v as i64),
        Datatype::Double(v) if v.fract() == 0.0 => Ok(v as i64),
        Datatype::Text(v) => {
            v.trim()
                .parse::<i64>()
                .map_err(|_| DatatypeConversionError::Unparsable { expected, value: v })
        }
        other => Err(DatatypeConversionError::TypeMismatch {
            expected,
            got: other.type_name(),
        }),
    }
}

fn coerce_float(raw: Datatype, expected: &'static str) -> Result<f64, DatatypeConversionError> {
    match raw {
        Datatype::Int(v) => Ok(v as f64),
        Datatype::BigInt(v) => Ok(v as f64),
        Datatype::Float(v) => Ok(v as f64),
        Datatype::Double(v) => Ok(v),
        Datatype::Text(v) => {
            v.trim()
                .parse::<f64>()
                .map_err(|_| DatatypeConversionError::Unparsable { expected, value: v })
        }
        other => Err(DatatypeConversionError::TypeMismatch {
            expected,
            got: other.type_name(),
        }),
    }
}

fn coerce_bool(raw: Datatype) -> Result<bool, DatatypeConversionError> {
    match raw {
        Datatype::Bool(v) => Ok(v),
        Datatype::Int(v @ (0 | 1)) => Ok(v == 1),
        Datatype::BigInt(v @ (0 | 1)) => Ok(v == 1),
        Datatype::Text(v) => match v.as_str() {
            "t" | "true" | "True" | "1" => Ok(true),
            "f" | "false" | "False" | "0" => Ok(false),
            _ => Err(DatatypeConversionError::Unparsable {
                expected: "Bool",
                value: v,
            }),
        },
        other => Err(DatatypeConversionError::Unparsable {
            expected: "Bool",
            value: other.to_string(),
        }),
    }
}

pub trait AsDatatypeKind {
    fn as_datatype_kind() -> DatatypeKind;
}

impl<T: AsDatatypeKind> AsDatatypeKind for Option<T> {
    fn as_datatype_kind() -> DatatypeKind {
        let mut datatype_kind = T::as_datatype_kind();
        datatype_kind.metadata_mut().optional = true;
        datatype_kind
    }
}

impl AsDatatypeKind for i32 {
    fn as_datatype_kind() -> DatatypeKind {
        DatatypeKind::Int(DatatypeKindMetadata::default())
    }
}

impl AsDatatypeKind for i64 {
    fn as_datatype_kind() -> DatatypeKind {
        DatatypeKind::BigInt(DatatypeKindMetadata::default())
    }
}

impl AsDatatypeKind for f32 {
    fn as_datatype_kind() -> DatatypeKind {
        DatatypeKind::Float(DatatypeKindMetadata::default())
    }
}

impl AsDatatypeKind for f64 {
    fn as_datatype_kind() -> DatatypeKind {
        DatatypeKind::Double(DatatypeKindMetadata::default())
    }
}

impl AsDatatypeKind for bool {
    fn as_datatype_kind() -> DatatypeKind {
        DatatypeKind::Bool(DatatypeKindMetadata::default())
    }
}

impl AsDatatypeKind for String {
    fn as_datatype_kind() -> DatatypeKind {
        DatatypeKind::Text(DatatypeKindMetadata::default())
    }
}

impl AsDatatypeKind for Vec<u8> {
    fn as_datatype_kind() -> DatatypeKind {
        DatatypeKind::Blob(DatatypeKindMetadata::default())
    }
}
