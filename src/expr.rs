//! Expression-evaluator seam.
//!
//! The engine does not define an expression language. It consults an
//! evaluator in exactly two places: when building a node's configuration
//! snapshot ([`crate::schema::build_configuration`]) and when a component
//! asks for its expression environment through a context. What the
//! evaluator receives is always the same: the raw expression string and an
//! environment map assembled by the engine (input event data, node
//! metadata, previous-execution outputs).

use miette::Diagnostic;
use serde_json::{Map, Value};
use thiserror::Error;

/// Errors surfaced by an expression evaluator.
#[derive(Debug, Error, Diagnostic)]
pub enum ExprError {
    /// The expression failed to parse or evaluate.
    #[error("expression error in {expr:?}: {message}")]
    #[diagnostic(code(loomwork::expr::evaluate))]
    Evaluate { expr: String, message: String },
}

/// Pluggable expression evaluation.
///
/// Implementations are expected to be cheap to call and side-effect free;
/// the engine may evaluate the same expression more than once while
/// building a configuration snapshot.
pub trait ExpressionEvaluator: Send + Sync {
    /// Evaluate `expr` against `env`, returning the resolved value.
    fn evaluate(&self, expr: &str, env: &Map<String, Value>) -> Result<Value, ExprError>;
}

/// Default evaluator: returns the expression text verbatim.
///
/// Useful for deployments without an embedded expression engine and for
/// tests; configuration values simply pass through untouched.
#[derive(Clone, Copy, Debug, Default)]
pub struct LiteralEvaluator;

impl ExpressionEvaluator for LiteralEvaluator {
    fn evaluate(&self, expr: &str, _env: &Map<String, Value>) -> Result<Value, ExprError> {
        Ok(Value::String(expr.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_evaluator_passes_through() {
        let env = Map::new();
        let out = LiteralEvaluator.evaluate("{{ $.user.id }}", &env).unwrap();
        assert_eq!(out, Value::String("{{ $.user.id }}".into()));
    }
}
