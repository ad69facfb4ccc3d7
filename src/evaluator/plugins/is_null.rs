use super::super::{EvaluationContext, ExpressionEvaluator, Scope};
use crate::core::{Result, Value};
use crate::sql::Expr;

pub struct IsNullEvaluator;

impl ExpressionEvaluator for IsNullEvaluator {
    fn name(&self) -> &'static str {
        "IS_NULL"
    }

    fn can_evaluate(&self, expr: &Expr) -> bool {
        matches!(expr, Expr::IsNull { .. })
    }

    fn evaluate(&self, expr: &Expr, scope: &Scope<'_>, context: &EvaluationContext<'_>) -> Result<Value> {
        let Expr::IsNull { expr, negated } = expr else {
            unreachable!();
        };

        let value = context.evaluate(expr, scope)?;
        Ok(Value::Boolean(value.is_null() != *negated))
    }
}
