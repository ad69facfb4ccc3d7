use super::super::{EvaluationContext, ExpressionEvaluator, Scope};
use crate::core::{Result, Value};
use crate::sql::Expr;

pub struct InListEvaluator;

impl ExpressionEvaluator for InListEvaluator {
    fn name(&self) -> &'static str {
        "IN_LIST"
    }

    fn can_evaluate(&self, expr: &Expr) -> bool {
        matches!(expr, Expr::InList { .. })
    }

    fn evaluate(&self, expr: &Expr, scope: &Scope<'_>, context: &EvaluationContext<'_>) -> Result<Value> {
        let Expr::InList { expr, list, negated } = expr else {
            unreachable!();
        };

        let value = context.evaluate(expr, scope)?;
        if value.is_null() {
            return Ok(Value::Null);
        }

        let mut saw_null = false;
        for item in list {
            let candidate = context.evaluate(item, scope)?;
            if candidate.is_null() {
                saw_null = true;
            } else if candidate == value {
                return Ok(Value::Boolean(!*negated));
            }
        }

        if saw_null {
            Ok(Value::Null)
        } else {
            Ok(Value::Boolean(*negated))
        }
    }
}
