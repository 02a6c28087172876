//! Expression evaluation, shared by `VAR` folding and the runtime.

use lw_session::Value;

use crate::ast::{AssignOp, BinOp, Expr, Segment};
use crate::error::ScriptError;

pub(crate) fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Int(_) => "integer",
        Value::Float(_) => "float",
        Value::Str(_) => "string",
        Value::List(_) => "list",
        Value::Map(_) => "map",
    }
}

fn overflow() -> ScriptError {
    ScriptError::Runtime("integer overflow".into())
}

fn division_by_zero() -> ScriptError {
    ScriptError::Runtime("division by zero".into())
}

fn int_op(op: BinOp, a: i64, b: i64) -> Result<Value, ScriptError> {
    let result = match op {
        BinOp::Add => a.checked_add(b).ok_or_else(overflow)?,
        BinOp::Sub => a.checked_sub(b).ok_or_else(overflow)?,
        BinOp::Mul => a.checked_mul(b).ok_or_else(overflow)?,
        BinOp::Div if b == 0 => return Err(division_by_zero()),
        BinOp::Div => a.checked_div(b).ok_or_else(overflow)?,
        BinOp::Rem if b == 0 => return Err(division_by_zero()),
        BinOp::Rem => a.checked_rem(b).ok_or_else(overflow)?,
    };
    Ok(Value::Int(result))
}

fn float_op(op: BinOp, a: f64, b: f64) -> Result<Value, ScriptError> {
    let result = match op {
        BinOp::Add => a + b,
        BinOp::Sub => a - b,
        BinOp::Mul => a * b,
        BinOp::Div | BinOp::Rem if b == 0.0 => return Err(division_by_zero()),
        BinOp::Div => a / b,
        BinOp::Rem => a % b,
    };
    Ok(Value::Float(result))
}

/// Apply a binary operator.
///
/// Two integers stay integral; mixing in a float promotes to float. `+`
/// concatenates when either side is a string.
pub fn binary(op: BinOp, lhs: Value, rhs: Value) -> Result<Value, ScriptError> {
    match (lhs, rhs) {
        (Value::Int(a), Value::Int(b)) => int_op(op, a, b),
        (Value::Str(a), b) if op == BinOp::Add => Ok(Value::Str(format!("{a}{b}"))),
        (a, Value::Str(b)) if op == BinOp::Add => Ok(Value::Str(format!("{a}{b}"))),
        (Value::Int(a), Value::Float(b)) => float_op(op, a as f64, b),
        (Value::Float(a), Value::Int(b)) => float_op(op, a, b as f64),
        (Value::Float(a), Value::Float(b)) => float_op(op, a, b),
        (a, b) => Err(ScriptError::Runtime(format!(
            "cannot apply {op:?} to {} and {}",
            kind(&a),
            kind(&b)
        ))),
    }
}

/// Evaluate an expression, reading variables through `lookup`.
pub fn evaluate<F>(expr: &Expr, lookup: &F) -> Result<Value, ScriptError>
where
    F: Fn(&str) -> Option<Value>,
{
    match expr {
        Expr::Literal(value) => Ok(value.clone()),
        Expr::Var(name) => lookup(name).ok_or_else(|| ScriptError::UndeclaredVariable(name.clone())),
        Expr::Neg(inner) => match evaluate(inner, lookup)? {
            Value::Int(n) => n.checked_neg().map(Value::Int).ok_or_else(overflow),
            Value::Float(f) => Ok(Value::Float(-f)),
            other => Err(ScriptError::Runtime(format!("cannot negate {}", kind(&other)))),
        },
        Expr::Binary { op, lhs, rhs } => {
            binary(*op, evaluate(lhs, lookup)?, evaluate(rhs, lookup)?)
        }
    }
}

/// Combine the old value of a variable with a newly evaluated one.
pub fn assign(op: AssignOp, old: Value, new: Value) -> Result<Value, ScriptError> {
    match op {
        AssignOp::Set => Ok(new),
        AssignOp::Add => binary(BinOp::Add, old, new),
        AssignOp::Sub => binary(BinOp::Sub, old, new),
    }
}

/// Render text segments, substituting variables.
///
/// Unknown variables render as nothing.
pub fn render<F>(segments: &[Segment], lookup: &F) -> String
where
    F: Fn(&str) -> Option<Value>,
{
    let mut out = String::new();
    for segment in segments {
        match segment {
            Segment::Text(text) => out.push_str(text),
            Segment::Var(name) => {
                if let Some(value) = lookup(name) {
                    out.push_str(&value.to_string());
                }
            }
        }
    }
    out
}
