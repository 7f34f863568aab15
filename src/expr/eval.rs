//! Evaluation of rule expressions against a variable scope

use std::collections::BTreeMap;
use std::fmt;

use thiserror::Error;

use crate::grid::{format_number, CellValue};

use super::ast::{BinaryOp, Expr, Literal, Spanned, UnaryOp};

/// Runtime value of an expression
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    List(Vec<Value>),
    Record(BTreeMap<String, Value>),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::List(_) => "list",
            Value::Record(_) => "record",
        }
    }

    /// Truthiness used by `and`, `or`, `not` and `if`
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0,
            Value::String(s) => !s.is_empty(),
            Value::List(items) => !items.is_empty(),
            Value::Record(_) => true,
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Value::Null => true,
            Value::String(s) => s.is_empty(),
            Value::List(items) => items.is_empty(),
            _ => false,
        }
    }

    /// Build a record value from field pairs
    pub fn record<'a>(fields: impl IntoIterator<Item = (&'a str, Value)>) -> Value {
        Value::Record(
            fields
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        )
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Number(n) => write!(f, "{}", format_number(*n)),
            Value::String(s) => write!(f, "{}", s),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Value::Record(fields) => {
                write!(f, "{{")?;
                for (i, (k, v)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", k, v)?;
                }
                write!(f, "}}")
            }
        }
    }
}

impl From<&CellValue> for Value {
    fn from(value: &CellValue) -> Self {
        match value {
            CellValue::Number(n) => Value::Number(*n),
            CellValue::Text(s) => Value::String(s.clone()),
            CellValue::Empty => Value::Null,
        }
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Value::Number(n as f64)
    }
}

/// Errors raised while evaluating an expression
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EvalError {
    #[error("unknown variable '{0}'")]
    UnknownVariable(String),

    #[error("{on} has no field '{field}'")]
    UnknownField { field: String, on: String },

    #[error("unknown function '{0}'")]
    UnknownFunction(String),

    #[error("function '{function}' expects {expected} argument(s), got {found}")]
    Arity {
        function: String,
        expected: String,
        found: usize,
    },

    #[error("cannot apply '{op}' to {lhs} and {rhs}")]
    TypeMismatch {
        op: String,
        lhs: &'static str,
        rhs: &'static str,
    },

    #[error("division by zero")]
    DivisionByZero,
}

/// Variable lookup for expression evaluation
pub trait Scope {
    fn lookup(&self, name: &str) -> Option<Value>;
}

impl Scope for BTreeMap<String, Value> {
    fn lookup(&self, name: &str) -> Option<Value> {
        self.get(name).cloned()
    }
}

/// Evaluate an expression tree
pub fn evaluate(expr: &Spanned<Expr>, scope: &dyn Scope) -> Result<Value, EvalError> {
    match &expr.node {
        Expr::Literal(lit) => Ok(match lit {
            Literal::Number(n) => Value::Number(*n),
            Literal::String(s) => Value::String(s.clone()),
            Literal::Bool(b) => Value::Bool(*b),
            Literal::Null => Value::Null,
        }),
        Expr::Variable(name) => scope
            .lookup(name)
            .ok_or_else(|| EvalError::UnknownVariable(name.clone())),
        Expr::List(items) => items
            .iter()
            .map(|item| evaluate(item, scope))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::List),
        Expr::Field(base, field) => match evaluate(base, scope)? {
            Value::Record(mut fields) => {
                fields
                    .remove(&field.node)
                    .ok_or_else(|| EvalError::UnknownField {
                        field: field.node.clone(),
                        on: "record".to_string(),
                    })
            }
            // Fields of an absent area (e.g. the parent of the root) read as null
            Value::Null => Ok(Value::Null),
            other => Err(EvalError::UnknownField {
                field: field.node.clone(),
                on: other.type_name().to_string(),
            }),
        },
        Expr::Index(base, index) => {
            let base = evaluate(base, scope)?;
            let index = evaluate(index, scope)?;
            index_value(base, index)
        }
        Expr::Call(name, args) => {
            let args = args
                .iter()
                .map(|arg| evaluate(arg, scope))
                .collect::<Result<Vec<_>, _>>()?;
            call_builtin(&name.node, args)
        }
        Expr::Unary(op, operand) => {
            let value = evaluate(operand, scope)?;
            match op {
                UnaryOp::Not => Ok(Value::Bool(!value.is_truthy())),
                UnaryOp::Neg => match value {
                    Value::Number(n) => Ok(Value::Number(-n)),
                    other => Err(EvalError::TypeMismatch {
                        op: "-".to_string(),
                        lhs: "nothing",
                        rhs: other.type_name(),
                    }),
                },
            }
        }
        Expr::Binary(BinaryOp::And, lhs, rhs) => {
            let lhs = evaluate(lhs, scope)?;
            if !lhs.is_truthy() {
                return Ok(Value::Bool(false));
            }
            Ok(Value::Bool(evaluate(rhs, scope)?.is_truthy()))
        }
        Expr::Binary(BinaryOp::Or, lhs, rhs) => {
            let lhs = evaluate(lhs, scope)?;
            if lhs.is_truthy() {
                return Ok(Value::Bool(true));
            }
            Ok(Value::Bool(evaluate(rhs, scope)?.is_truthy()))
        }
        Expr::Binary(op, lhs, rhs) => {
            let lhs = evaluate(lhs, scope)?;
            let rhs = evaluate(rhs, scope)?;
            binary(*op, lhs, rhs)
        }
        Expr::If {
            condition,
            then_branch,
            else_branch,
        } => {
            if evaluate(condition, scope)?.is_truthy() {
                evaluate(then_branch, scope)
            } else {
                evaluate(else_branch, scope)
            }
        }
    }
}

fn index_value(base: Value, index: Value) -> Result<Value, EvalError> {
    match (base, index) {
        (Value::List(items), Value::Number(n)) => {
            // Negative indices count from the end
            let len = items.len() as i64;
            let i = if n < 0.0 { len + n as i64 } else { n as i64 };
            Ok(usize::try_from(i)
                .ok()
                .and_then(|i| items.get(i).cloned())
                .unwrap_or(Value::Null))
        }
        (Value::String(s), Value::Number(n)) => Ok(s
            .chars()
            .nth(n.max(0.0) as usize)
            .map(|c| Value::String(c.to_string()))
            .unwrap_or(Value::Null)),
        (Value::Record(mut fields), Value::String(key)) => {
            Ok(fields.remove(&key).unwrap_or(Value::Null))
        }
        (Value::Null, _) => Ok(Value::Null),
        (base, index) => Err(EvalError::TypeMismatch {
            op: "[]".to_string(),
            lhs: base.type_name(),
            rhs: index.type_name(),
        }),
    }
}

fn mismatch(op: BinaryOp, lhs: &Value, rhs: &Value) -> EvalError {
    EvalError::TypeMismatch {
        op: op.symbol().to_string(),
        lhs: lhs.type_name(),
        rhs: rhs.type_name(),
    }
}

fn binary(op: BinaryOp, lhs: Value, rhs: Value) -> Result<Value, EvalError> {
    match op {
        BinaryOp::Add => match (&lhs, &rhs) {
            (Value::Number(a), Value::Number(b)) => Ok(Value::Number(a + b)),
            (Value::List(a), Value::List(b)) => {
                Ok(Value::List(a.iter().chain(b.iter()).cloned().collect()))
            }
            (Value::String(_), _) | (_, Value::String(_)) => {
                Ok(Value::String(format!("{}{}", lhs, rhs)))
            }
            _ => Err(mismatch(op, &lhs, &rhs)),
        },
        BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => {
            let (a, b) = match (&lhs, &rhs) {
                (Value::Number(a), Value::Number(b)) => (*a, *b),
                _ => return Err(mismatch(op, &lhs, &rhs)),
            };
            match op {
                BinaryOp::Sub => Ok(Value::Number(a - b)),
                BinaryOp::Mul => Ok(Value::Number(a * b)),
                _ if b == 0.0 => Err(EvalError::DivisionByZero),
                BinaryOp::Div => Ok(Value::Number(a / b)),
                _ => Ok(Value::Number(a % b)),
            }
        }
        BinaryOp::Eq => Ok(Value::Bool(lhs == rhs)),
        BinaryOp::NotEq => Ok(Value::Bool(lhs != rhs)),
        BinaryOp::Less | BinaryOp::LessOrEqual | BinaryOp::Greater | BinaryOp::GreaterOrEqual => {
            let ordering = match (&lhs, &rhs) {
                (Value::Number(a), Value::Number(b)) => a.partial_cmp(b),
                (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
                _ => None,
            }
            .ok_or_else(|| mismatch(op, &lhs, &rhs))?;
            Ok(Value::Bool(match op {
                BinaryOp::Less => ordering.is_lt(),
                BinaryOp::LessOrEqual => ordering.is_le(),
                BinaryOp::Greater => ordering.is_gt(),
                _ => ordering.is_ge(),
            }))
        }
        BinaryOp::In => match (&lhs, &rhs) {
            (_, Value::List(items)) => Ok(Value::Bool(items.contains(&lhs))),
            (Value::String(needle), Value::String(haystack)) => {
                Ok(Value::Bool(haystack.contains(needle.as_str())))
            }
            (Value::Null, Value::String(_)) => Ok(Value::Bool(false)),
            _ => Err(mismatch(op, &lhs, &rhs)),
        },
        // Short-circuit operators are handled by `evaluate`
        BinaryOp::And => Ok(Value::Bool(lhs.is_truthy() && rhs.is_truthy())),
        BinaryOp::Or => Ok(Value::Bool(lhs.is_truthy() || rhs.is_truthy())),
    }
}

fn expect_arity(function: &str, args: &[Value], expected: usize) -> Result<(), EvalError> {
    if args.len() != expected {
        return Err(EvalError::Arity {
            function: function.to_string(),
            expected: expected.to_string(),
            found: args.len(),
        });
    }
    Ok(())
}

fn string_arg<'v>(function: &str, value: &'v Value) -> Result<&'v str, EvalError> {
    match value {
        Value::String(s) => Ok(s),
        Value::Null => Ok(""),
        other => Err(EvalError::TypeMismatch {
            op: function.to_string(),
            lhs: other.type_name(),
            rhs: "nothing",
        }),
    }
}

fn call_builtin(name: &str, args: Vec<Value>) -> Result<Value, EvalError> {
    match name {
        "is_empty" => {
            expect_arity(name, &args, 1)?;
            Ok(Value::Bool(args[0].is_empty()))
        }
        "is_number" => {
            expect_arity(name, &args, 1)?;
            Ok(Value::Bool(matches!(args[0], Value::Number(_))))
        }
        "is_string" => {
            expect_arity(name, &args, 1)?;
            Ok(Value::Bool(matches!(&args[0], Value::String(s) if !s.is_empty())))
        }
        "len" => {
            expect_arity(name, &args, 1)?;
            Ok(Value::from(match &args[0] {
                Value::String(s) => s.chars().count(),
                Value::List(items) => items.len(),
                Value::Record(fields) => fields.len(),
                Value::Null => 0,
                other => {
                    return Err(EvalError::TypeMismatch {
                        op: name.to_string(),
                        lhs: other.type_name(),
                        rhs: "nothing",
                    })
                }
            }))
        }
        "lower" | "upper" | "trim" => {
            expect_arity(name, &args, 1)?;
            let s = string_arg(name, &args[0])?;
            Ok(Value::String(match name {
                "lower" => s.to_lowercase(),
                "upper" => s.to_uppercase(),
                _ => s.trim().to_string(),
            }))
        }
        "contains" | "starts_with" | "ends_with" => {
            expect_arity(name, &args, 2)?;
            let s = string_arg(name, &args[0])?;
            let pattern = string_arg(name, &args[1])?;
            Ok(Value::Bool(match name {
                "contains" => s.contains(pattern),
                "starts_with" => s.starts_with(pattern),
                _ => s.ends_with(pattern),
            }))
        }
        "str" => {
            expect_arity(name, &args, 1)?;
            Ok(Value::String(args[0].to_string()))
        }
        "num" => {
            expect_arity(name, &args, 1)?;
            Ok(match &args[0] {
                Value::Number(n) => Value::Number(*n),
                Value::String(s) => s
                    .trim()
                    .parse::<f64>()
                    .map(Value::Number)
                    .unwrap_or(Value::Null),
                Value::Bool(b) => Value::Number(if *b { 1.0 } else { 0.0 }),
                _ => Value::Null,
            })
        }
        "min" | "max" => {
            if args.is_empty() {
                return Err(EvalError::Arity {
                    function: name.to_string(),
                    expected: "at least 1".to_string(),
                    found: 0,
                });
            }
            let mut best: Option<f64> = None;
            for arg in &args {
                let n = match arg {
                    Value::Number(n) => *n,
                    other => {
                        return Err(EvalError::TypeMismatch {
                            op: name.to_string(),
                            lhs: other.type_name(),
                            rhs: "number",
                        })
                    }
                };
                best = Some(match best {
                    None => n,
                    Some(b) if name == "min" => b.min(n),
                    Some(b) => b.max(n),
                });
            }
            Ok(best.map(Value::Number).unwrap_or(Value::Null))
        }
        "coalesce" => Ok(args
            .into_iter()
            .find(|v| !v.is_empty())
            .unwrap_or(Value::Null)),
        other => Err(EvalError::UnknownFunction(other.to_string())),
    }
}
