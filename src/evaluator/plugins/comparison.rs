use super::super::{EvaluationContext, ExpressionEvaluator, Scope};
use crate::core::{Result, Value};
use crate::sql::{BinaryOperator, Expr};
use std::cmp::Ordering;

pub struct ComparisonEvaluator;

impl ExpressionEvaluator for ComparisonEvaluator {
    fn name(&self) -> &'static str {
        "COMPARISON"
    }

    fn can_evaluate(&self, expr: &Expr) -> bool {
        matches!(expr, Expr::BinaryOp { op, .. } if op.is_comparison())
    }

    fn evaluate(&self, expr: &Expr, scope: &Scope<'_>, context: &EvaluationContext<'_>) -> Result<Value> {
        let Expr::BinaryOp { left, op, right } = expr else {
            unreachable!();
        };

        let left_val = context.evaluate(left, scope)?;
        let right_val = context.evaluate(right, scope)?;

        Ok(compare(&left_val, &right_val, *op)?
            .map(Value::Boolean)
            .unwrap_or(Value::Null))
    }
}

/// Three-valued comparison: `None` when either side is NULL.
pub fn compare(left: &Value, right: &Value, op: BinaryOperator) -> Result<Option<bool>> {
    if left.is_null() || right.is_null() {
        return Ok(None);
    }

    let ordering = match left.compare(right) {
        Ok(ordering) => ordering,
        // Values of unrelated types are simply unequal.
        Err(_) if matches!(op, BinaryOperator::Eq) => return Ok(Some(false)),
        Err(_) if matches!(op, BinaryOperator::NotEq) => return Ok(Some(true)),
        Err(e) => return Err(e),
    };

    Ok(Some(match op {
        BinaryOperator::Eq => ordering == Ordering::Equal,
        BinaryOperator::NotEq => ordering != Ordering::Equal,
        BinaryOperator::Lt => ordering == Ordering::Less,
        BinaryOperator::LtEq => ordering != Ordering::Greater,
        BinaryOperator::Gt => ordering == Ordering::Greater,
        BinaryOperator::GtEq => ordering != Ordering::Less,
        _ => unreachable!(),
    }))
}
