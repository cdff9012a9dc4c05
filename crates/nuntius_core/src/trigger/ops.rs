use std::cmp::Ordering;

use enum_assoc::Assoc;

use crate::Datatype;

use super::TriggerError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Assoc)]
#[func(pub const fn symbol(&self) -> &'static str)]
pub enum BinaryOp {
    #[assoc(symbol = "==")]
    Eq,
    #[assoc(symbol = "!=")]
    Ne,
    #[assoc(symbol = "<")]
    Lt,
    #[assoc(symbol = "<=")]
    Le,
    #[assoc(symbol = ">")]
    Gt,
    #[assoc(symbol = ">=")]
    Ge,
    #[assoc(symbol = "+")]
    Add,
    #[assoc(symbol = "-")]
    Sub,
    #[assoc(symbol = "*")]
    Mul,
    #[assoc(symbol = "/")]
    Div,
    #[assoc(symbol = "%")]
    Rem,
    #[assoc(symbol = "**")]
    Pow,
    #[assoc(symbol = "contains")]
    Contains,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Assoc)]
#[func(pub const fn symbol(&self) -> &'static str)]
pub enum UnaryOp {
    #[assoc(symbol = "abs")]
    Abs,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Assoc)]
#[func(pub const fn symbol(&self) -> &'static str)]
pub enum LogicalOp {
    #[assoc(symbol = "&")]
    And,
    #[assoc(symbol = "|")]
    Or,
    #[assoc(symbol = "^")]
    Xor,
}

/// Numeric view of a scalar. Booleans take part in arithmetic as 0 and 1.
#[derive(Clone, Copy, Debug)]
enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    fn of(value: &Datatype) -> Option<Self> {
        match value {
            Datatype::Int(v) => Some(Number::Int(*v as i64)),
            Datatype::BigInt(v) => Some(Number::Int(*v)),
            Datatype::Bool(v) => Some(Number::Int(*v as i64)),
            Datatype::Float(v) => Some(Number::Float(*v as f64)),
            Datatype::Double(v) => Some(Number::Float(*v)),
            _ => None,
        }
    }

    fn as_f64(self) -> f64 {
        match self {
            Number::Int(v) => v as f64,
            Number::Float(v) => v,
        }
    }

    fn into_datatype(self) -> Datatype {
        match self {
            Number::Int(v) => Datatype::BigInt(v),
            Number::Float(v) => Datatype::Double(v),
        }
    }

    fn partial_cmp(self, other: Self) -> Option<Ordering> {
        match (self, other) {
            (Number::Int(a), Number::Int(b)) => Some(a.cmp(&b)),
            (a, b) => a.as_f64().partial_cmp(&b.as_f64()),
        }
    }
}

impl BinaryOp {
    pub fn apply(self, left: Datatype, right: Datatype) -> Result<Datatype, TriggerError> {
        match self {
            BinaryOp::Eq => Ok(Datatype::Bool(loose_eq(&left, &right))),
            BinaryOp::Ne => Ok(Datatype::Bool(!loose_eq(&left, &right))),
            BinaryOp::Lt => self.compare(&left, &right, Ordering::is_lt),
            BinaryOp::Le => self.compare(&left, &right, Ordering::is_le),
            BinaryOp::Gt => self.compare(&left, &right, Ordering::is_gt),
            BinaryOp::Ge => self.compare(&left, &right, Ordering::is_ge),
            BinaryOp::Add => match (left, right) {
                (Datatype::Text(mut a), Datatype::Text(b)) => {
                    a.push_str(&b);
                    Ok(Datatype::Text(a))
                }
                (Datatype::Blob(mut a), Datatype::Blob(b)) => {
                    a.extend_from_slice(&b);
                    Ok(Datatype::Blob(a))
                }
                (left, right) => self.arithmetic(&left, &right, i64::checked_add, |a, b| a + b),
            },
            BinaryOp::Sub => self.arithmetic(&left, &right, i64::checked_sub, |a, b| a - b),
            BinaryOp::Mul => self.arithmetic(&left, &right, i64::checked_mul, |a, b| a * b),
            BinaryOp::Div => {
                let (a, b) = self.numbers(&left, &right)?;
                if b.as_f64() == 0.0 {
                    return Err(TriggerError::DivisionByZero { op: self.symbol() });
                }
                Ok(Datatype::Double(a.as_f64() / b.as_f64()))
            }
            BinaryOp::Rem => self.floored_rem(&left, &right),
            BinaryOp::Pow => self.pow(&left, &right),
            BinaryOp::Contains => match (&left, &right) {
                (Datatype::Text(haystack), Datatype::Text(needle)) => {
                    Ok(Datatype::Bool(haystack.contains(needle.as_str())))
                }
                (Datatype::Blob(haystack), Datatype::Blob(needle)) => Ok(Datatype::Bool(
                    needle.is_empty() || haystack.windows(needle.len()).any(|w| w == needle),
                )),
                _ => Err(self.mismatch(&left, &right)),
            },
        }
    }

    fn mismatch(self, left: &Datatype, right: &Datatype) -> TriggerError {
        TriggerError::BinaryTypeMismatch {
            op: self.symbol(),
            left: left.type_name(),
            right: right.type_name(),
        }
    }

    fn numbers(self, left: &Datatype, right: &Datatype) -> Result<(Number, Number), TriggerError> {
        match (Number::of(left), Number::of(right)) {
            (Some(a), Some(b)) => Ok((a, b)),
            _ => Err(self.mismatch(left, right)),
        }
    }

    fn compare(
        self,
        left: &Datatype,
        right: &Datatype,
        accept: fn(Ordering) -> bool,
    ) -> Result<Datatype, TriggerError> {
        let ordering = match (left, right) {
            (Datatype::Text(a), Datatype::Text(b)) => Some(a.cmp(b)),
            (Datatype::Blob(a), Datatype::Blob(b)) => Some(a.cmp(b)),
            _ => {
                let (a, b) = self.numbers(left, right)?;
                a.partial_cmp(b)
            }
        };

        // NaN compares false against everything.
        Ok(Datatype::Bool(ordering.is_some_and(accept)))
    }

    fn arithmetic(
        self,
        left: &Datatype,
        right: &Datatype,
        int_op: fn(i64, i64) -> Option<i64>,
        float_op: fn(f64, f64) -> f64,
    ) -> Result<Datatype, TriggerError> {
        match self.numbers(left, right)? {
            (Number::Int(a), Number::Int(b)) => int_op(a, b)
                .map(Datatype::BigInt)
                .ok_or(TriggerError::Overflow { op: self.symbol() }),
            (a, b) => Ok(Datatype::Double(float_op(a.as_f64(), b.as_f64()))),
        }
    }

    /// Modulo whose result takes the sign of the divisor.
    fn floored_rem(self, left: &Datatype, right: &Datatype) -> Result<Datatype, TriggerError> {
        match self.numbers(left, right)? {
            (Number::Int(_), Number::Int(0)) => {
                Err(TriggerError::DivisionByZero { op: self.symbol() })
            }
            (Number::Int(a), Number::Int(b)) => {
                let r = a
                    .checked_rem(b)
                    .ok_or(TriggerError::Overflow { op: self.symbol() })?;
                Ok(Datatype::BigInt(if r != 0 && (r < 0) != (b < 0) { r + b } else { r }))
            }
            (a, b) => {
                let (a, b) = (a.as_f64(), b.as_f64());
                if b == 0.0 {
                    return Err(TriggerError::DivisionByZero { op: self.symbol() });
                }
                let r = a % b;
                Ok(Datatype::Double(if r != 0.0 && (r < 0.0) != (b < 0.0) { r + b } else { r }))
            }
        }
    }

    fn pow(self, left: &Datatype, right: &Datatype) -> Result<Datatype, TriggerError> {
        let (base, exponent) = self.numbers(left, right)?;

        if base.as_f64() == 0.0 && exponent.as_f64() < 0.0 {
            return Err(TriggerError::DivisionByZero { op: self.symbol() });
        }

        match (base, exponent) {
            (Number::Int(b), Number::Int(e)) if e >= 0 => u32::try_from(e)
                .ok()
                .and_then(|e| b.checked_pow(e))
                .map(Datatype::BigInt)
                .ok_or(TriggerError::Overflow { op: self.symbol() }),
            (b, e) => Ok(Datatype::Double(b.as_f64().powf(e.as_f64()))),
        }
    }
}

impl UnaryOp {
    pub fn apply(self, operand: Datatype) -> Result<Datatype, TriggerError> {
        match self {
            UnaryOp::Abs => match Number::of(&operand) {
                Some(Number::Int(v)) => v
                    .checked_abs()
                    .map(Datatype::BigInt)
                    .ok_or(TriggerError::Overflow { op: self.symbol() }),
                Some(number @ Number::Float(_)) => {
                    Ok(Number::Float(number.as_f64().abs()).into_datatype())
                }
                None => Err(TriggerError::UnaryTypeMismatch {
                    op: self.symbol(),
                    operand: operand.type_name(),
                }),
            },
        }
    }
}

/// Equality across numeric kinds compares values; any other pair of
/// different kinds is unequal.
fn loose_eq(left: &Datatype, right: &Datatype) -> bool {
    match (Number::of(left), Number::of(right)) {
        (Some(a), Some(b)) => a.partial_cmp(b) == Some(Ordering::Equal),
        _ => left == right,
    }
}
