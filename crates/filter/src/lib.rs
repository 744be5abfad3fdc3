//! Expression language evaluated against webhook payloads and events.
//!
//! Receivers use boolean expressions (`resource-filter`) to decide per
//! target whether an inbound webhook should trigger it; commit-status
//! providers use string expressions to derive a stable status id. Both are
//! compiled once at admission; evaluation happens per fan-out unit against a
//! small set of JSON-valued variables (`req`, `res`, `event`, `alert`,
//! `provider`).
//!
//! The grammar covers field access on nested maps, indexing, the string
//! methods `split`, `first`, `last`, `lowerAscii`, `startsWith` and
//! `contains`, equality and the boolean operators.

mod eval;
mod lexer;
mod parser;

pub use parser::Expr;

use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FilterError {
    /// The source failed to compile. Owning objects are marked stalled.
    #[error("parse error at offset {offset}: {message}")]
    Parse { offset: usize, message: String },

    /// Evaluation failed at runtime (type mismatch, missing field). Fails
    /// the current fan-out unit only.
    #[error("evaluation error: {0}")]
    Eval(String),
}

/// Variables an expression is evaluated against.
pub type Scope = HashMap<String, Value>;

/// A compiled expression.
#[derive(Debug, Clone)]
pub struct Program {
    source: String,
    expr: Expr,
}

impl Program {
    /// Compile an expression. Failures are terminal for the owning object.
    pub fn compile(source: &str) -> Result<Self, FilterError> {
        let tokens = lexer::lex(source)?;
        let expr = parser::parse(&tokens)?;
        Ok(Self {
            source: source.to_string(),
            expr,
        })
    }

    /// The original source text.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Evaluate to an arbitrary JSON value.
    pub fn eval(&self, scope: &Scope) -> Result<Value, FilterError> {
        eval::eval(&self.expr, scope)
    }

    /// Evaluate to a boolean, rejecting any other result type.
    pub fn eval_bool(&self, scope: &Scope) -> Result<bool, FilterError> {
        match self.eval(scope)? {
            Value::Bool(b) => Ok(b),
            other => Err(FilterError::Eval(format!(
                "expression must evaluate to a boolean, got {other}"
            ))),
        }
    }

    /// Evaluate to a string, rejecting any other result type.
    pub fn eval_string(&self, scope: &Scope) -> Result<String, FilterError> {
        match self.eval(scope)? {
            Value::String(s) => Ok(s),
            other => Err(FilterError::Eval(format!(
                "expression must evaluate to a string, got {other}"
            ))),
        }
    }
}

/// Size-bounded cache of compiled programs keyed by source text.
///
/// Admission-time validation guarantees cached sources compile, so a miss
/// after eviction simply recompiles.
#[derive(Debug)]
pub struct ProgramCache {
    programs: RwLock<HashMap<String, Arc<Program>>>,
    capacity: usize,
}

impl ProgramCache {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            programs: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Fetch the compiled form of `source`, compiling on miss.
    pub fn get(&self, source: &str) -> Result<Arc<Program>, FilterError> {
        if let Some(program) = self
            .programs
            .read()
            .expect("filter cache lock poisoned")
            .get(source)
        {
            return Ok(Arc::clone(program));
        }

        let program = Arc::new(Program::compile(source)?);
        let mut programs = self.programs.write().expect("filter cache lock poisoned");
        if programs.len() >= self.capacity {
            // The cache holds at most one program per live subscription;
            // overflow means churn, so dropping everything is acceptable.
            programs.clear();
        }
        programs.insert(source.to_string(), Arc::clone(&program));
        Ok(program)
    }
}

impl Default for ProgramCache {
    fn default() -> Self {
        Self::new(256)
    }
}

/// Build an evaluation scope from named JSON values.
#[must_use]
pub fn scope<const N: usize>(vars: [(&str, Value); N]) -> Scope {
    vars.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
}
