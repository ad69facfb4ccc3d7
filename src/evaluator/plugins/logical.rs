use super::super::{EvaluationContext, ExpressionEvaluator, Scope};
use crate::core::{Result, Value};
use crate::sql::{BinaryOperator, Expr, UnaryOperator};

/// AND / OR / NOT with SQL three-valued logic.
pub struct LogicalEvaluator;

impl ExpressionEvaluator for LogicalEvaluator {
    fn name(&self) -> &'static str {
        "LOGICAL"
    }

    fn can_evaluate(&self, expr: &Expr) -> bool {
        matches!(
            expr,
            Expr::BinaryOp {
                op: BinaryOperator::And | BinaryOperator::Or,
                ..
            } | Expr::UnaryOp {
                op: UnaryOperator::Not,
                ..
            }
        )
    }

    fn evaluate(&self, expr: &Expr, scope: &Scope<'_>, context: &EvaluationContext<'_>) -> Result<Value> {
        match expr {
            Expr::BinaryOp { left, op, right } => {
                let left_val = truth(&context.evaluate(left, scope)?);
                // Short circuit where the outcome is already decided.
                match (op, left_val) {
                    (BinaryOperator::And, Some(false)) => return Ok(Value::Boolean(false)),
                    (BinaryOperator::Or, Some(true)) => return Ok(Value::Boolean(true)),
                    _ => {}
                }
                let right_val = truth(&context.evaluate(right, scope)?);

                let result = match op {
                    BinaryOperator::And => match (left_val, right_val) {
                        (_, Some(false)) => Some(false),
                        (Some(true), Some(true)) => Some(true),
                        _ => None,
                    },
                    _ => match (left_val, right_val) {
                        (_, Some(true)) => Some(true),
                        (Some(false), Some(false)) => Some(false),
                        _ => None,
                    },
                };
                Ok(result.map(Value::Boolean).unwrap_or(Value::Null))
            }
            Expr::UnaryOp { expr, .. } => Ok(truth(&context.evaluate(expr, scope)?)
                .map(|b| Value::Boolean(!b))
                .unwrap_or(Value::Null)),
            _ => unreachable!(),
        }
    }
}

fn truth(value: &Value) -> Option<bool> {
    match value {
        Value::Null => None,
        other => Some(other.as_bool()),
    }
}
