use std::fmt;

use crate::{Datatype, FieldMap, Operation};

use super::{BinaryOp, LogicalOp, UnaryOp};

/// A predicate over the before and after images of a change.
///
/// Leaves read a field from one image or hold a constant; inner nodes combine
/// them with comparison, arithmetic and logical operators. Trees are built at
/// registration time, usually through [`super::dsl`], and never mutated.
#[derive(Clone, Debug)]
pub enum TriggerExpr {
    /// `before.field`
    Before(String),
    /// `after.field`
    After(String),
    /// A constant operand, used verbatim.
    Const(Datatype),
    Unary(UnaryOp, Box<TriggerExpr>),
    Binary(BinaryOp, Box<TriggerExpr>, Box<TriggerExpr>),
    Logical(LogicalOp, Box<TriggerExpr>, Box<TriggerExpr>),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Image {
    Before,
    After,
}

impl fmt::Display for Image {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Image::Before => write!(f, "before"),
            Image::After => write!(f, "after"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TriggerError {
    #[error("field `{field}` is missing from the {image} image")]
    MissingField { image: Image, field: String },
    #[error("operator `{op}` is not defined for {left} and {right}")]
    BinaryTypeMismatch {
        op: &'static str,
        left: &'static str,
        right: &'static str,
    },
    #[error("operator `{op}` is not defined for {operand}")]
    UnaryTypeMismatch {
        op: &'static str,
        operand: &'static str,
    },
    #[error("division by zero in `{op}`")]
    DivisionByZero { op: &'static str },
    #[error("integer overflow in `{op}`")]
    Overflow { op: &'static str },
}

impl TriggerExpr {
    pub fn evaluate(
        &self,
        before: Option<&FieldMap>,
        after: Option<&FieldMap>,
    ) -> Result<Datatype, TriggerError> {
        match self {
            TriggerExpr::Before(field) => lookup(Image::Before, before, field),
            TriggerExpr::After(field) => lookup(Image::After, after, field),
            TriggerExpr::Const(value) => Ok(value.clone()),
            TriggerExpr::Unary(op, operand) => op.apply(operand.evaluate(before, after)?),
            TriggerExpr::Binary(op, left, right) => {
                let left = left.evaluate(before, after)?;
                let right = right.evaluate(before, after)?;
                op.apply(left, right)
            }
            TriggerExpr::Logical(op, left, right) => {
                let left = left.evaluate(before, after)?.is_truthy();

                let result = match op {
                    LogicalOp::And if !left => false,
                    LogicalOp::Or if left => true,
                    LogicalOp::And | LogicalOp::Or => right.evaluate(before, after)?.is_truthy(),
                    LogicalOp::Xor => left ^ right.evaluate(before, after)?.is_truthy(),
                };

                Ok(Datatype::Bool(result))
            }
        }
    }

    /// Evaluate and coerce the result to a boolean.
    pub fn matches(
        &self,
        before: Option<&FieldMap>,
        after: Option<&FieldMap>,
    ) -> Result<bool, TriggerError> {
        self.evaluate(before, after).map(|value| value.is_truthy())
    }

    /// Whether this expression can be evaluated for `operation`: creates have
    /// no before image and deletes have no after image.
    pub fn validate_operation(&self, operation: Operation) -> bool {
        match self {
            TriggerExpr::Before(_) => operation != Operation::Create,
            TriggerExpr::After(_) => operation != Operation::Delete,
            TriggerExpr::Const(_) => true,
            TriggerExpr::Unary(_, operand) => operand.validate_operation(operation),
            TriggerExpr::Binary(_, left, right) | TriggerExpr::Logical(_, left, right) => {
                left.validate_operation(operation) && right.validate_operation(operation)
            }
        }
    }

    fn binary(self, op: BinaryOp, rhs: impl Into<TriggerExpr>) -> Self {
        TriggerExpr::Binary(op, Box::new(self), Box::new(rhs.into()))
    }

    fn logical(self, op: LogicalOp, rhs: impl Into<TriggerExpr>) -> Self {
        TriggerExpr::Logical(op, Box::new(self), Box::new(rhs.into()))
    }

    pub fn eq(self, rhs: impl Into<TriggerExpr>) -> Self {
        self.binary(BinaryOp::Eq, rhs)
    }

    pub fn ne(self, rhs: impl Into<TriggerExpr>) -> Self {
        self.binary(BinaryOp::Ne, rhs)
    }

    pub fn lt(self, rhs: impl Into<TriggerExpr>) -> Self {
        self.binary(BinaryOp::Lt, rhs)
    }

    pub fn le(self, rhs: impl Into<TriggerExpr>) -> Self {
        self.binary(BinaryOp::Le, rhs)
    }

    pub fn gt(self, rhs: impl Into<TriggerExpr>) -> Self {
        self.binary(BinaryOp::Gt, rhs)
    }

    pub fn ge(self, rhs: impl Into<TriggerExpr>) -> Self {
        self.binary(BinaryOp::Ge, rhs)
    }

    pub fn pow(self, rhs: impl Into<TriggerExpr>) -> Self {
        self.binary(BinaryOp::Pow, rhs)
    }

    pub fn contains(self, rhs: impl Into<TriggerExpr>) -> Self {
        self.binary(BinaryOp::Contains, rhs)
    }

    pub fn and(self, rhs: impl Into<TriggerExpr>) -> Self {
        self.logical(LogicalOp::And, rhs)
    }

    pub fn or(self, rhs: impl Into<TriggerExpr>) -> Self {
        self.logical(LogicalOp::Or, rhs)
    }

    pub fn xor(self, rhs: impl Into<TriggerExpr>) -> Self {
        self.logical(LogicalOp::Xor, rhs)
    }

    pub fn abs(self) -> Self {
        TriggerExpr::Unary(UnaryOp::Abs, Box::new(self))
    }
}

fn lookup(image: Image, map: Option<&FieldMap>, field: &str) -> Result<Datatype, TriggerError> {
    map.and_then(|map| map.get(field))
        .cloned()
        .ok_or_else(|| TriggerError::MissingField {
            image,
            field: field.to_string(),
        })
}

// Raw values that convert to Datatype automatically become constants.
impl<T: Into<Datatype>> From<T> for TriggerExpr {
    fn from(val: T) -> Self {
        TriggerExpr::Const(val.into())
    }
}

macro_rules! impl_operator {
    ($trait:ident, $method:ident, $variant:ident, $op:expr) => {
        impl<R: Into<TriggerExpr>> std::ops::$trait<R> for TriggerExpr {
            type Output = TriggerExpr;

            fn $method(self, rhs: R) -> TriggerExpr {
                TriggerExpr::$variant($op, Box::new(self), Box::new(rhs.into()))
            }
        }
    };
}

impl_operator!(Add, add, Binary, BinaryOp::Add);
impl_operator!(Sub, sub, Binary, BinaryOp::Sub);
impl_operator!(Mul, mul, Binary, BinaryOp::Mul);
impl_operator!(Div, div, Binary, BinaryOp::Div);
impl_operator!(Rem, rem, Binary, BinaryOp::Rem);
impl_operator!(BitAnd, bitand, Logical, LogicalOp::And);
impl_operator!(BitOr, bitor, Logical, LogicalOp::Or);
impl_operator!(BitXor, bitxor, Logical, LogicalOp::Xor);

impl fmt::Display for TriggerExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriggerExpr::Before(field) => write!(f, "before.{field}"),
            TriggerExpr::After(field) => write!(f, "after.{field}"),
            TriggerExpr::Const(value) => write!(f, "{value}"),
            TriggerExpr::Unary(op, operand) => write!(f, "{}({operand})", op.symbol()),
            TriggerExpr::Binary(op, left, right) => {
                write!(f, "({left} {} {right})", op.symbol())
            }
            TriggerExpr::Logical(op, left, right) => {
                write!(f, "({left} {} {right})", op.symbol())
            }
        }
    }
}
