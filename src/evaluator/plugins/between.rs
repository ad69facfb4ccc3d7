use super::super::{EvaluationContext, ExpressionEvaluator, Scope};
use super::comparison::compare;
use crate::core::{Result, Value};
use crate::sql::{BinaryOperator, Expr};

pub struct BetweenEvaluator;

impl ExpressionEvaluator for BetweenEvaluator {
    fn name(&self) -> &'static str {
        "BETWEEN"
    }

    fn can_evaluate(&self, expr: &Expr) -> bool {
        matches!(expr, Expr::Between { .. })
    }

    fn evaluate(&self, expr: &Expr, scope: &Scope<'_>, context: &EvaluationContext<'_>) -> Result<Value> {
        let Expr::Between { expr, low, high, negated } = expr else {
            unreachable!();
        };

        let value = context.evaluate(expr, scope)?;
        let low = context.evaluate(low, scope)?;
        let high = context.evaluate(high, scope)?;

        let above = compare(&value, &low, BinaryOperator::GtEq)?;
        let below = compare(&value, &high, BinaryOperator::LtEq)?;

        Ok(match (above, below) {
            (Some(a), Some(b)) => Value::Boolean((a && b) != *negated),
            _ => Value::Null,
        })
    }
}
