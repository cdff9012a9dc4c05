mod kind;

pub use kind::*;

use serde_json::Value;

/// A single scalar as it travels through the engine: raw change-feed values,
/// trigger operands and results, and coerced entity fields all use it.
#[derive(Clone, Debug, PartialEq)]
pub enum Datatype {
    Int(i32),
    BigInt(i64),

    Float(f32),
    Double(f64),

    Text(String),

    Blob(Vec<u8>),

    Bool(bool),

    Null,
}

impl<D: Into<Datatype>> Into<Datatype> for Option<D> {
    fn into(self) -> Datatype {
        match self {
            Some(datatype) => datatype.into(),
            None => Datatype::Null,
        }
    }
}

impl Into<Datatype> for i32 {
    fn into(self) -> Datatype {
        Datatype::Int(self)
    }
}

impl Into<Datatype> for i64 {
    fn into(self) -> Datatype {
        Datatype::BigInt(self)
    }
}

impl Into<Datatype> for f32 {
    fn into(self) -> Datatype {
        Datatype::Float(self)
    }
}

impl Into<Datatype> for f64 {
    fn into(self) -> Datatype {
        Datatype::Double(self)
    }
}

impl Into<Datatype> for bool {
    fn into(self) -> Datatype {
        Datatype::Bool(self)
    }
}

impl Into<Datatype> for String {
    fn into(self) -> Datatype {
        Datatype::Text(self)
    }
}

impl Into<Datatype> for &str {
    fn into(self) -> Datatype {
        Datatype::Text(self.to_string())
    }
}

impl Into<Datatype> for Vec<u8> {
    fn into(self) -> Datatype {
        Datatype::Blob(self)
    }
}

impl Into<Datatype> for &Value {
    /// Change feeds deliver loosely typed JSON. Nested objects and arrays are
    /// kept as their serialized text.
    fn into(self) -> Datatype {
        match self {
            Value::Null => Datatype::Null,
            Value::Bool(v) => Datatype::Bool(*v),
            Value::Number(n) => match n.as_i64() {
                Some(v) => Datatype::BigInt(v),
                None => Datatype::Double(n.as_f64().unwrap_or(f64::NAN)),
            },
            Value::String(v) => Datatype::Text(v.clone()),
            other => Datatype::Text(other.to_string()),
        }
    }
}

#[derive(Debug)]
pub enum DatatypeConversionError {
    TypeMismatch {
        expected: &'static str,
        got: &'static str,
    },
    UnexpectedNull,
    Unparsable {
        expected: &'static str,
        value: String,
    },
    OutOfRange {
        expected: &'static str,
        value: String,
    },
}

impl std::fmt::Display for DatatypeConversionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TypeMismatch { expected, got } => {
                write!(f, "type mismatch: expected {expected}, got {got}")
            }
            Self::UnexpectedNull => write!(f, "unexpected null value"),
            Self::Unparsable { expected, value } => {
                write!(f, "cannot parse {value:?} as {expected}")
            }
            Self::OutOfRange { expected, value } => {
                write!(f, "{value} is out of range for {expected}")
            }
        }
    }
}

impl std::error::Error for DatatypeConversionError {}

impl std::fmt::Display for Datatype {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Datatype::Int(v) => write!(f, "{v}"),
            Datatype::BigInt(v) => write!(f, "{v}"),
            Datatype::Float(v) => write!(f, "{v}"),
            Datatype::Double(v) => write!(f, "{v}"),
            Datatype::Text(v) => write!(f, "{v:?}"),
            Datatype::Blob(v) => write!(f, "{v:?}"),
            Datatype::Bool(v) => write!(f, "{v}"),
            Datatype::Null => write!(f, "null"),
        }
    }
}

impl Datatype {
    pub fn type_name(&self) -> &'static str {
        match self {
            Datatype::Int(_) => "Int",
            Datatype::BigInt(_) => "BigInt",
            Datatype::Float(_) => "Float",
            Datatype::Double(_) => "Double",
            Datatype::Text(_) => "Text",
            Datatype::Blob(_) => "Blob",
            Datatype::Bool(_) => "Bool",
            Datatype::Null => "Null",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Datatype::Null)
    }

    /// Boolean coercion used by trigger combinators: null, zero and empty
    /// values are false, everything else is true.
    pub fn is_truthy(&self) -> bool {
        match self {
            Datatype::Null => false,
            Datatype::Bool(v) => *v,
            Datatype::Int(v) => *v != 0,
            Datatype::BigInt(v) => *v != 0,
            Datatype::Float(v) => *v != 0.0,
            Datatype::Double(v) => *v != 0.0,
            Datatype::Text(v) => !v.is_empty(),
            Datatype::Blob(v) => !v.is_empty(),
        }
    }
}

impl TryFrom<Datatype> for i32 {
    type Error = DatatypeConversionError;

    fn try_from(datatype: Datatype) -> Result<Self, Self::Error> {
        match datatype {
            Datatype::Int(v) => Ok(v),
            Datatype::BigInt(v) => {
                i32::try_from(v).map_err(|_| DatatypeConversionError::OutOfRange {
                    expected: "Int",
                    value: v.to_string(),
                })
            }
            Datatype::Null => Err(DatatypeConversionError::UnexpectedNull),
            other => Err(DatatypeConversionError::TypeMismatch {
                expected: "Int",
                got: other.type_name(),
            }),
        }
    }
}

impl TryFrom<Datatype> for i64 {
    type Error = DatatypeConversionError;

    fn try_from(datatype: Datatype) -> Result<Self, Self::Error> {
        match datatype {
            Datatype::BigInt(v) => Ok(v),
            Datatype::Int(v) => Ok(v as i64),
            Datatype::Null => Err(DatatypeConversionError::UnexpectedNull),
            other => Err(DatatypeConversionError::TypeMismatch {
                expected: "BigInt",
                got: other.type_name(),
            }),
        }
    }
}

impl TryFrom<Datatype> for f32 {
    type Error = DatatypeConversionError;

    fn try_from(datatype: Datatype) -> Result<Self, Self::Error> {
        match datatype {
            Datatype::Float(v) => Ok(v),
            Datatype::Double(v) => Ok(v as f32),
            Datatype::Null => Err(DatatypeConversionError::UnexpectedNull),
            other => Err(DatatypeConversionError::TypeMismatch {
                expected: "Float",
                got: other.type_name(),
            }),
        }
    }
}

impl TryFrom<Datatype> for f64 {
    type Error = DatatypeConversionError;

    fn try_from(datatype: Datatype) -> Result<Self, Self::Error> {
        match datatype {
            Datatype::Double(v) => Ok(v),
            Datatype::Float(v) => Ok(v as f64),
            Datatype::Null => Err(DatatypeConversionError::UnexpectedNull),
            other => Err(DatatypeConversionError::TypeMismatch {
                expected: "Double",
                got: other.type_name(),
            }),
        }
    }
}

impl TryFrom<Datatype> for bool {
    type Error = DatatypeConversionError;

    fn try_from(datatype: Datatype) -> Result<Self, Self::Error> {
        match datatype {
            Datatype::Bool(v) => Ok(v),
            Datatype::Int(v) => Ok(v != 0),
            Datatype::BigInt(v) => Ok(v != 0),
            Datatype::Null => Err(DatatypeConversionError::UnexpectedNull),
            other => Err(DatatypeConversionError::TypeMismatch {
                expected: "Bool",
                got: other.type_name(),
            }),
        }
    }
}

impl TryFrom<Datatype> for String {
    type Error = DatatypeConversionError;

    fn try_from(datatype: Datatype) -> Result<Self, Self::Error> {
        match datatype {
            Datatype::Text(v) => Ok(v),
            Datatype::Null => Err(DatatypeConversionError::UnexpectedNull),
            other => Err(DatatypeConversionError::TypeMismatch {
                expected: "Text",
                got: other.type_name(),
            }),
        }
    }
}

impl TryFrom<Datatype> for Vec<u8> {
    type Error = DatatypeConversionError;

    fn try_from(datatype: Datatype) -> Result<Self, Self::Error> {
        match datatype {
            Datatype::Blob(v) => Ok(v),
            Datatype::Null => Err(DatatypeConversionError::UnexpectedNull),
            other => Err(DatatypeConversionError::TypeMismatch {
                expected: "Blob",
                got: other.type_name(),
            }),
        }
    }
}

impl<T: TryFrom<Datatype, Error = DatatypeConversionError>> TryFrom<Datatype> for Option<T> {
    type Error = DatatypeConversionError;

    fn try_from(datatype: Datatype) -> Result<Self, Self::Error> {
        match datatype {
            Datatype::Null => Ok(None),
            other => Ok(Some(T::try_from(other)?)),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn json_scalars() {
        let as_datatype = |value: Value| -> Datatype { (&value).into() };

        assert_eq!(as_datatype(json!(null)), Datatype::Null);
        assert_eq!(as_datatype(json!(true)), Datatype::Bool(true));
        assert_eq!(as_datatype(json!(7)), Datatype::BigInt(7));
        assert_eq!(as_datatype(json!(1.5)), Datatype::Double(1.5));
        assert_eq!(as_datatype(json!("x")), Datatype::Text("x".into()));
    }

    #[test]
    fn json_nested_values_become_text() {
        let value = json!({"scale": 2, "value": "AQ=="});
        let datatype: Datatype = (&value).into();
        assert_eq!(
            datatype,
            Datatype::Text(r#"{"scale":2,"value":"AQ=="}"#.into())
        );
    }

    #[test]
    fn truthiness() {
        assert!(!Datatype::Null.is_truthy());
        assert!(!Datatype::BigInt(0).is_truthy());
        assert!(!Datatype::Text(String::new()).is_truthy());
        assert!(Datatype::Double(0.1).is_truthy());
        assert!(Datatype::Text("0".into()).is_truthy());
    }

    #[test]
    fn narrowing_out_of_range() {
        let result = i32::try_from(Datatype::BigInt(i64::MAX));
        assert!(matches!(
            result,
            Err(DatatypeConversionError::OutOfRange { .. })
        ));
    }

    #[test]
    fn option_accepts_null() {
        let value: Option<String> = Datatype::Null.try_into().unwrap();
        assert_eq!(value, None);
    }
}
