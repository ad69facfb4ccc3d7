use super::super::{EvaluationContext, ExpressionEvaluator, Scope};
use crate::core::{DbError, Result, Value};
use crate::sql::{BinaryOperator, Expr, UnaryOperator};

pub struct ArithmeticEvaluator;

impl ExpressionEvaluator for ArithmeticEvaluator {
    fn name(&self) -> &'static str {
        "ARITHMETIC"
    }

    fn can_evaluate(&self, expr: &Expr) -> bool {
        match expr {
            Expr::BinaryOp { op, .. } => op.is_arithmetic(),
            Expr::UnaryOp { op, .. } => *op == UnaryOperator::Minus,
            _ => false,
        }
    }

    fn evaluate(&self, expr: &Expr, scope: &Scope<'_>, context: &EvaluationContext<'_>) -> Result<Value> {
        match expr {
            Expr::BinaryOp { left, op, right } => {
                let left_val = context.evaluate(left, scope)?;
                let right_val = context.evaluate(right, scope)?;
                apply(&left_val, *op, &right_val)
            }
            Expr::UnaryOp { expr, .. } => match context.evaluate(expr, scope)? {
                Value::Null => Ok(Value::Null),
                Value::Integer(i) => i
                    .checked_neg()
                    .map(Value::Integer)
                    .ok_or_else(|| DbError::ExecutionError("Integer overflow".into())),
                Value::Float(f) => Ok(Value::Float(-f)),
                other => Err(DbError::TypeMismatch(format!("Cannot negate {}", other.type_name()))),
            },
            _ => unreachable!(),
        }
    }
}

pub fn apply(left: &Value, op: BinaryOperator, right: &Value) -> Result<Value> {
    match (left, right) {
        (Value::Null, _) | (_, Value::Null) => Ok(Value::Null),
        (Value::Integer(a), Value::Integer(b)) => {
            let result = match op {
                BinaryOperator::Plus => a.checked_add(*b),
                BinaryOperator::Minus => a.checked_sub(*b),
                BinaryOperator::Multiply => a.checked_mul(*b),
                BinaryOperator::Divide => {
                    if *b == 0 {
                        return Err(DbError::ExecutionError("Division by zero".into()));
                    }
                    a.checked_div(*b)
                }
                _ => unreachable!(),
            };
            result
                .map(Value::Integer)
                .ok_or_else(|| DbError::ExecutionError("Integer overflow".into()))
        }
        (a, b) if a.is_numeric() && b.is_numeric() => {
            let (Some(a), Some(b)) = (a.as_f64(), b.as_f64()) else {
                unreachable!();
            };
            let result = match op {
                BinaryOperator::Plus => a + b,
                BinaryOperator::Minus => a - b,
                BinaryOperator::Multiply => a * b,
                BinaryOperator::Divide => {
                    if b == 0.0 {
                        return Err(DbError::ExecutionError("Division by zero".into()));
                    }
                    a / b
                }
                _ => unreachable!(),
            };
            Ok(Value::Float(result))
        }
        (Value::Text(a), Value::Text(b)) if op == BinaryOperator::Plus => Ok(Value::Text(format!("{}{}", a, b))),
        _ => Err(DbError::TypeMismatch(format!(
            "Cannot apply {} to {} and {}",
            op,
            left.type_name(),
            right.type_name()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::{EvaluatorRegistry, RowLayout};
    use crate::sql::Params;

    #[test]
    fn test_integer_and_mixed_arithmetic() {
        assert_eq!(
            apply(&Value::Integer(7), BinaryOperator::Divide, &Value::Integer(2)).unwrap(),
            Value::Integer(3)
        );
        assert_eq!(
            apply(&Value::Integer(1), BinaryOperator::Plus, &Value::Float(0.5)).unwrap(),
            Value::Float(1.5)
        );
        assert_eq!(
            apply(&Value::Null, BinaryOperator::Plus, &Value::Integer(1)).unwrap(),
            Value::Null
        );
        assert!(apply(&Value::Integer(1), BinaryOperator::Divide, &Value::Integer(0)).is_err());
    }

    #[test]
    fn test_integer_overflow_is_an_error() {
        let err = apply(&Value::Integer(i64::MAX), BinaryOperator::Plus, &Value::Integer(1)).unwrap_err();
        assert!(matches!(err, DbError::ExecutionError(ref msg) if msg == "Integer overflow"));

        let negated = Expr::UnaryOp {
            op: UnaryOperator::Minus,
            expr: Box::new(Expr::Literal(Value::Integer(i64::MIN))),
        };
        let registry = EvaluatorRegistry::default();
        let params = Params::new();
        let layout = RowLayout::new();
        let err = EvaluationContext::new(&registry, &params)
            .evaluate(&negated, &Scope::new(&layout, &[]))
            .unwrap_err();
        assert!(matches!(err, DbError::ExecutionError(ref msg) if msg == "Integer overflow"));
    }
}
