//! Tree-walking evaluator over JSON values.

use crate::parser::Expr;
use crate::{FilterError, Scope};
use serde_json::Value;

fn err(message: impl Into<String>) -> FilterError {
    FilterError::Eval(message.into())
}

pub(crate) fn eval(expr: &Expr, scope: &Scope) -> Result<Value, FilterError> {
    match expr {
        Expr::Str(s) => Ok(Value::String(s.clone())),
        Expr::Int(i) => Ok(Value::from(*i)),
        Expr::Bool(b) => Ok(Value::Bool(*b)),

        Expr::Var(name) => scope
            .get(name)
            .cloned()
            .ok_or_else(|| err(format!("undefined variable {name:?}"))),

        Expr::Not(inner) => match eval(inner, scope)? {
            Value::Bool(b) => Ok(Value::Bool(!b)),
            other => Err(err(format!("'!' requires a boolean, got {other}"))),
        },

        Expr::And(left, right) => match eval(left, scope)? {
            Value::Bool(false) => Ok(Value::Bool(false)),
            Value::Bool(true) => match eval(right, scope)? {
                Value::Bool(b) => Ok(Value::Bool(b)),
                other => Err(err(format!("'&&' requires booleans, got {other}"))),
            },
            other => Err(err(format!("'&&' requires booleans, got {other}"))),
        },

        Expr::Or(left, right) => match eval(left, scope)? {
            Value::Bool(true) => Ok(Value::Bool(true)),
            Value::Bool(false) => match eval(right, scope)? {
                Value::Bool(b) => Ok(Value::Bool(b)),
                other => Err(err(format!("'||' requires booleans, got {other}"))),
            },
            other => Err(err(format!("'||' requires booleans, got {other}"))),
        },

        Expr::Eq(left, right) => Ok(Value::Bool(eval(left, scope)? == eval(right, scope)?)),
        Expr::Ne(left, right) => Ok(Value::Bool(eval(left, scope)? != eval(right, scope)?)),

        Expr::Field(base, name) => match eval(base, scope)? {
            Value::Object(map) => map
                .get(name)
                .cloned()
                .ok_or_else(|| err(format!("no such field {name:?}"))),
            other => Err(err(format!("field access {name:?} on non-map value {other}"))),
        },

        Expr::Index(base, index) => {
            let base = eval(base, scope)?;
            let index = eval(index, scope)?;
            match (base, index) {
                (Value::Object(map), Value::String(key)) => map
                    .get(&key)
                    .cloned()
                    .ok_or_else(|| err(format!("no such key {key:?}"))),
                (Value::Array(items), Value::Number(n)) => {
                    let i = n
                        .as_u64()
                        .and_then(|i| usize::try_from(i).ok())
                        .ok_or_else(|| err(format!("invalid list index {n}")))?;
                    items
                        .get(i)
                        .cloned()
                        .ok_or_else(|| err(format!("list index {i} out of bounds")))
                }
                (base, index) => Err(err(format!("cannot index {base} with {index}"))),
            }
        }

        Expr::Method(base, name, args) => {
            let base = eval(base, scope)?;
            let args = args
                .iter()
                .map(|a| eval(a, scope))
                .collect::<Result<Vec<_>, _>>()?;
            call_method(&base, name, &args)
        }
    }
}

fn call_method(base: &Value, name: &str, args: &[Value]) -> Result<Value, FilterError> {
    match name {
        "split" => {
            let s = as_string(base, name)?;
            let sep = one_string_arg(args, name)?;
            Ok(Value::Array(
                s.split(sep.as_str())
                    .map(|part| Value::String(part.to_string()))
                    .collect(),
            ))
        }
        "first" => {
            no_args(args, name)?;
            let items = as_array(base, name)?;
            items
                .first()
                .cloned()
                .ok_or_else(|| err("first() on an empty list"))
        }
        "last" => {
            no_args(args, name)?;
            let items = as_array(base, name)?;
            items
                .last()
                .cloned()
                .ok_or_else(|| err("last() on an empty list"))
        }
        "lowerAscii" => {
            no_args(args, name)?;
            let s = as_string(base, name)?;
            Ok(Value::String(s.to_ascii_lowercase()))
        }
        "startsWith" => {
            let s = as_string(base, name)?;
            let prefix = one_string_arg(args, name)?;
            Ok(Value::Bool(s.starts_with(prefix.as_str())))
        }
        "contains" => {
            let s = as_string(base, name)?;
            let needle = one_string_arg(args, name)?;
            Ok(Value::Bool(s.contains(needle.as_str())))
        }
        other => Err(err(format!("unknown method {other:?}"))),
    }
}

fn as_string<'a>(value: &'a Value, method: &str) -> Result<&'a String, FilterError> {
    match value {
        Value::String(s) => Ok(s),
        other => Err(err(format!("{method}() requires a string, got {other}"))),
    }
}

fn as_array<'a>(value: &'a Value, method: &str) -> Result<&'a Vec<Value>, FilterError> {
    match value {
        Value::Array(items) => Ok(items),
        other => Err(err(format!("{method}() requires a list, got {other}"))),
    }
}

fn one_string_arg(args: &[Value], method: &str) -> Result<String, FilterError> {
    match args {
        [Value::String(s)] => Ok(s.clone()),
        _ => Err(err(format!("{method}() takes exactly one string argument"))),
    }
}

fn no_args(args: &[Value], method: &str) -> Result<(), FilterError> {
    if args.is_empty() {
        Ok(())
    } else {
        Err(err(format!("{method}() takes no arguments")))
    }
}
