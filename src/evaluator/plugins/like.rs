use super::super::{EvaluationContext, ExpressionEvaluator, Scope};
use crate::core::{Result, Value};
use crate::expression::pattern::eval_like;
use crate::sql::Expr;

pub struct LikeEvaluator;

impl ExpressionEvaluator for LikeEvaluator {
    fn name(&self) -> &'static str {
        "LIKE"
    }

    fn can_evaluate(&self, expr: &Expr) -> bool {
        matches!(expr, Expr::Like { .. })
    }

    fn evaluate(&self, expr: &Expr, scope: &Scope<'_>, context: &EvaluationContext<'_>) -> Result<Value> {
        let Expr::Like { expr, pattern, negated } = expr else {
            unreachable!();
        };

        let text_val = context.evaluate(expr, scope)?;
        let pattern_val = context.evaluate(pattern, scope)?;

        match (&text_val, &pattern_val) {
            (Value::Text(text), Value::Text(pat)) => {
                let matched = eval_like(text, pat)?;
                Ok(Value::Boolean(matched != *negated))
            }
            _ => Ok(Value::Null),
        }
    }
}
