//! Free-function builders for [`TriggerExpr`] trees.
//!
//! ```ignore
//! use nuntius::trigger::dsl::*;
//!
//! let deactivated = and(eq(before("is_active"), true), eq(after("is_active"), false));
//! ```

use super::{BinaryOp, LogicalOp, TriggerExpr, UnaryOp};

pub fn before(field: impl Into<String>) -> TriggerExpr {
    TriggerExpr::Before(field.into())
}

pub fn after(field: impl Into<String>) -> TriggerExpr {
    TriggerExpr::After(field.into())
}

pub fn lit(value: impl Into<TriggerExpr>) -> TriggerExpr {
    value.into()
}

fn binary(op: BinaryOp, left: impl Into<TriggerExpr>, right: impl Into<TriggerExpr>) -> TriggerExpr {
    TriggerExpr::Binary(op, Box::new(left.into()), Box::new(right.into()))
}

fn logical(op: LogicalOp, left: impl Into<TriggerExpr>, right: impl Into<TriggerExpr>) -> TriggerExpr {
    TriggerExpr::Logical(op, Box::new(left.into()), Box::new(right.into()))
}

macro_rules! binary_builders {
    ($($name:ident => $op:ident),* $(,)?) => {
        $(
            pub fn $name(left: impl Into<TriggerExpr>, right: impl Into<TriggerExpr>) -> TriggerExpr {
                binary(BinaryOp::$op, left, right)
            }
        )*
    };
}

binary_builders! {
    eq => Eq,
    ne => Ne,
    lt => Lt,
    le => Le,
    gt => Gt,
    ge => Ge,
    add => Add,
    sub => Sub,
    mul => Mul,
    div => Div,
    rem => Rem,
    pow => Pow,
    contains => Contains,
}

pub fn and(left: impl Into<TriggerExpr>, right: impl Into<TriggerExpr>) -> TriggerExpr {
    logical(LogicalOp::And, left, right)
}

pub fn or(left: impl Into<TriggerExpr>, right: impl Into<TriggerExpr>) -> TriggerExpr {
    logical(LogicalOp::Or, left, right)
}

pub fn xor(left: impl Into<TriggerExpr>, right: impl Into<TriggerExpr>) -> TriggerExpr {
    logical(LogicalOp::Xor, left, right)
}

pub fn abs(operand: impl Into<TriggerExpr>) -> TriggerExpr {
    TriggerExpr::Unary(UnaryOp::Abs, Box::new(operand.into()))
}
