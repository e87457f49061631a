//! Shared primitive operator semantics.
//!
//! Both execution modes funnel built-in unary and binary operators through
//! this module, so checked overflow, wrap-around, division by zero, and
//! lifted null propagation behave identically whichever executor runs the
//! tree. The builder guarantees that both operands of a binary node have
//! already been converted to the same primitive kind; the ladders here only
//! match same-variant pairs.

use exprtree_core::{value_equal, EvalError, MethodRef, Value};

use crate::node::{BinaryOp, UnaryOp};

/// Apply a user-defined binary operator method, with lifted null handling
/// in front of the call: null operands short-circuit without invoking the
/// method, and lifted equality treats null as an ordinary comparand.
pub fn apply_user_binary(
    op: BinaryOp,
    lifted: bool,
    method: &MethodRef,
    left: Value,
    right: Value,
) -> Result<Value, EvalError> {
    if lifted && (left.is_null() || right.is_null()) {
        return Ok(match op {
            BinaryOp::Equal => Value::Bool(left.is_null() && right.is_null()),
            BinaryOp::NotEqual => Value::Bool(!(left.is_null() && right.is_null())),
            _ => Value::Null,
        });
    }
    let mut args = [left, right];
    (method.native)(None, &mut args)
}

/// Apply a user-defined unary operator method with lifted null handling.
pub fn apply_user_unary(
    lifted: bool,
    method: &MethodRef,
    operand: Value,
) -> Result<Value, EvalError> {
    if lifted && operand.is_null() {
        return Ok(Value::Null);
    }
    let mut args = [operand];
    (method.native)(None, &mut args)
}

fn overflow(target: &str) -> EvalError {
    EvalError::Overflow { target: target.into() }
}

fn unsupported_binary(op: BinaryOp, left: &Value, right: &Value) -> EvalError {
    EvalError::TypeMismatch {
        expected: format!("operands for '{}'", op.symbol()),
        actual: format!("{} and {}", left.shape_name(), right.shape_name()),
    }
}

fn unsupported_unary(op: UnaryOp, operand: &Value) -> EvalError {
    EvalError::TypeMismatch {
        expected: format!("operand for '{}'", op.symbol()),
        actual: operand.shape_name().to_string(),
    }
}

/// Apply a built-in binary operator. `lifted` nodes propagate null operands
/// before the value ladders run; equality is the exception, where null is an
/// ordinary comparand.
pub fn apply_binary(
    op: BinaryOp,
    lifted: bool,
    left: &Value,
    right: &Value,
) -> Result<Value, EvalError> {
    if lifted && (left.is_null() || right.is_null()) {
        return Ok(match op {
            BinaryOp::Equal => Value::Bool(left.is_null() && right.is_null()),
            BinaryOp::NotEqual => Value::Bool(!(left.is_null() && right.is_null())),
            _ => Value::Null,
        });
    }

    if op.is_comparison() {
        return compare(op, left, right);
    }
    if op.is_shift() {
        return shift(op, left, right);
    }

    macro_rules! int_arith {
        ($variant:ident, $name:literal, $a:expr, $b:expr) => {{
            let (a, b) = ($a, $b);
            let r = match op {
                BinaryOp::Add => a.wrapping_add(b),
                BinaryOp::AddChecked => a.checked_add(b).ok_or_else(|| overflow($name))?,
                BinaryOp::Subtract => a.wrapping_sub(b),
                BinaryOp::SubtractChecked => {
                    a.checked_sub(b).ok_or_else(|| overflow($name))?
                }
                BinaryOp::Multiply => a.wrapping_mul(b),
                BinaryOp::MultiplyChecked => {
                    a.checked_mul(b).ok_or_else(|| overflow($name))?
                }
                BinaryOp::Divide => {
                    if b == 0 {
                        return Err(EvalError::DivisionByZero);
                    }
                    a.checked_div(b).ok_or_else(|| overflow($name))?
                }
                BinaryOp::Modulo => {
                    if b == 0 {
                        return Err(EvalError::DivisionByZero);
                    }
                    a.checked_rem(b).ok_or_else(|| overflow($name))?
                }
                BinaryOp::And => a & b,
                BinaryOp::Or => a | b,
                BinaryOp::ExclusiveOr => a ^ b,
                _ => return Err(unsupported_binary(op, left, right)),
            };
            Ok(Value::$variant(r))
        }};
    }

    macro_rules! float_arith {
        ($variant:ident, $a:expr, $b:expr) => {{
            let (a, b) = ($a, $b);
            let r = match op {
                BinaryOp::Add | BinaryOp::AddChecked => a + b,
                BinaryOp::Subtract | BinaryOp::SubtractChecked => a - b,
                BinaryOp::Multiply | BinaryOp::MultiplyChecked => a * b,
                BinaryOp::Divide => a / b,
                BinaryOp::Modulo => a % b,
                _ => return Err(unsupported_binary(op, left, right)),
            };
            Ok(Value::$variant(r))
        }};
    }

    match (left, right) {
        (Value::I8(a), Value::I8(b)) => int_arith!(I8, "i8", *a, *b),
        (Value::I16(a), Value::I16(b)) => int_arith!(I16, "i16", *a, *b),
        (Value::I32(a), Value::I32(b)) => int_arith!(I32, "i32", *a, *b),
        (Value::I64(a), Value::I64(b)) => int_arith!(I64, "i64", *a, *b),
        (Value::U8(a), Value::U8(b)) => int_arith!(U8, "u8", *a, *b),
        (Value::U16(a), Value::U16(b)) => int_arith!(U16, "u16", *a, *b),
        (Value::U32(a), Value::U32(b)) => int_arith!(U32, "u32", *a, *b),
        (Value::U64(a), Value::U64(b)) => int_arith!(U64, "u64", *a, *b),
        (Value::F32(a), Value::F32(b)) => float_arith!(F32, *a, *b),
        (Value::F64(a), Value::F64(b)) => float_arith!(F64, *a, *b),
        (Value::Decimal(a), Value::Decimal(b)) => {
            let r = match op {
                BinaryOp::Add | BinaryOp::AddChecked => a.checked_add(*b)?,
                BinaryOp::Subtract | BinaryOp::SubtractChecked => a.checked_sub(*b)?,
                BinaryOp::Multiply | BinaryOp::MultiplyChecked => a.checked_mul(*b)?,
                BinaryOp::Divide => a.checked_div(*b)?,
                BinaryOp::Modulo => a.checked_rem(*b)?,
                _ => return Err(unsupported_binary(op, left, right)),
            };
            Ok(Value::Decimal(r))
        }
        (Value::Bool(a), Value::Bool(b)) => {
            let r = match op {
                BinaryOp::And => *a && *b,
                BinaryOp::Or => *a || *b,
                BinaryOp::ExclusiveOr => *a != *b,
                _ => return Err(unsupported_binary(op, left, right)),
            };
            Ok(Value::Bool(r))
        }
        (Value::Str(a), Value::Str(b)) if matches!(op, BinaryOp::Add) => {
            Ok(Value::str(&format!("{}{}", a, b)))
        }
        _ => Err(unsupported_binary(op, left, right)),
    }
}

fn compare(op: BinaryOp, left: &Value, right: &Value) -> Result<Value, EvalError> {
    macro_rules! relational {
        ($a:expr, $b:expr) => {{
            let (a, b) = ($a, $b);
            match op {
                BinaryOp::Equal => a == b,
                BinaryOp::NotEqual => a != b,
                BinaryOp::LessThan => a < b,
                BinaryOp::LessThanOrEqual => a <= b,
                BinaryOp::GreaterThan => a > b,
                BinaryOp::GreaterThanOrEqual => a >= b,
                _ => return Err(unsupported_binary(op, left, right)),
            }
        }};
    }

    let result = match (left, right) {
        (Value::I8(a), Value::I8(b)) => relational!(a, b),
        (Value::I16(a), Value::I16(b)) => relational!(a, b),
        (Value::I32(a), Value::I32(b)) => relational!(a, b),
        (Value::I64(a), Value::I64(b)) => relational!(a, b),
        (Value::U8(a), Value::U8(b)) => relational!(a, b),
        (Value::U16(a), Value::U16(b)) => relational!(a, b),
        (Value::U32(a), Value::U32(b)) => relational!(a, b),
        (Value::U64(a), Value::U64(b)) => relational!(a, b),
        (Value::F32(a), Value::F32(b)) => relational!(a, b),
        (Value::F64(a), Value::F64(b)) => relational!(a, b),
        (Value::Decimal(a), Value::Decimal(b)) => relational!(a, b),
        _ if op.is_equality() => {
            let eq = value_equal(left, right);
            if op == BinaryOp::Equal { eq } else { !eq }
        }
        _ => return Err(unsupported_binary(op, left, right)),
    };
    Ok(Value::Bool(result))
}

/// Shift the left operand by the right operand's low bits; the amount is
/// masked to the operand width, the same wrap-around the hardware performs.
fn shift(op: BinaryOp, left: &Value, right: &Value) -> Result<Value, EvalError> {
    let amount = match right {
        Value::I32(n) => *n as u32,
        _ => return Err(unsupported_binary(op, left, right)),
    };

    macro_rules! shift_case {
        ($variant:ident, $a:expr, $bits:literal) => {{
            let a = $a;
            let s = amount & ($bits - 1);
            Ok(Value::$variant(match op {
                BinaryOp::LeftShift => a << s,
                _ => a >> s,
            }))
        }};
    }

    match left {
        Value::I8(a) => shift_case!(I8, *a, 8),
        Value::I16(a) => shift_case!(I16, *a, 16),
        Value::I32(a) => shift_case!(I32, *a, 32),
        Value::I64(a) => shift_case!(I64, *a, 64),
        Value::U8(a) => shift_case!(U8, *a, 8),
        Value::U16(a) => shift_case!(U16, *a, 16),
        Value::U32(a) => shift_case!(U32, *a, 32),
        Value::U64(a) => shift_case!(U64, *a, 64),
        _ => Err(unsupported_binary(op, left, right)),
    }
}

/// Apply a built-in unary operator.
pub fn apply_unary(op: UnaryOp, lifted: bool, operand: &Value) -> Result<Value, EvalError> {
    if lifted && operand.is_null() {
        return Ok(Value::Null);
    }

    match op {
        UnaryOp::UnaryPlus => Ok(operand.clone()),
        UnaryOp::Negate | UnaryOp::NegateChecked => {
            let checked = op.is_checked();
            macro_rules! neg_case {
                ($variant:ident, $name:literal, $a:expr) => {{
                    let a = $a;
                    if checked {
                        a.checked_neg().map(Value::$variant).ok_or_else(|| overflow($name))
                    } else {
                        Ok(Value::$variant(a.wrapping_neg()))
                    }
                }};
            }
            match operand {
                Value::I8(a) => neg_case!(I8, "i8", *a),
                Value::I16(a) => neg_case!(I16, "i16", *a),
                Value::I32(a) => neg_case!(I32, "i32", *a),
                Value::I64(a) => neg_case!(I64, "i64", *a),
                Value::F32(a) => Ok(Value::F32(-a)),
                Value::F64(a) => Ok(Value::F64(-a)),
                Value::Decimal(a) => Ok(Value::Decimal(a.checked_neg()?)),
                _ => Err(unsupported_unary(op, operand)),
            }
        }
        UnaryOp::Not => match operand {
            Value::Bool(b) => Ok(Value::Bool(!b)),
            Value::I8(a) => Ok(Value::I8(!a)),
            Value::I16(a) => Ok(Value::I16(!a)),
            Value::I32(a) => Ok(Value::I32(!a)),
            Value::I64(a) => Ok(Value::I64(!a)),
            Value::U8(a) => Ok(Value::U8(!a)),
            Value::U16(a) => Ok(Value::U16(!a)),
            Value::U32(a) => Ok(Value::U32(!a)),
            Value::U64(a) => Ok(Value::U64(!a)),
            _ => Err(unsupported_unary(op, operand)),
        },
        UnaryOp::ArrayLength => match operand {
            Value::Array(items) => Ok(Value::I32(items.borrow().len() as i32)),
            Value::Null => Err(EvalError::NullReference { member: "length".into() }),
            _ => Err(unsupported_unary(op, operand)),
        },
    }
}
