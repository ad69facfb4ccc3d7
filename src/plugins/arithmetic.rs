use super::{ExpressionConverter, ExpressionPlugin};
use crate::core::Result;
use crate::sql::{Expr, UnaryOperator};
use sqlparser::ast as sql_ast;

pub struct ArithmeticPlugin;

impl ExpressionPlugin for ArithmeticPlugin {
    fn name(&self) -> &'static str {
        "ARITHMETIC"
    }

    fn can_handle(&self, expr: &sql_ast::Expr) -> bool {
        match expr {
            sql_ast::Expr::BinaryOp { op, .. } => matches!(
                op,
                sql_ast::BinaryOperator::Plus
                    | sql_ast::BinaryOperator::Minus
                    | sql_ast::BinaryOperator::Multiply
                    | sql_ast::BinaryOperator::Divide
            ),
            sql_ast::Expr::UnaryOp { op, .. } => matches!(op, sql_ast::UnaryOperator::Minus),
            _ => false,
        }
    }

    fn convert(&self, expr: sql_ast::Expr, converter: &ExpressionConverter) -> Result<Expr> {
        match expr {
            sql_ast::Expr::BinaryOp { left, op, right } => Ok(Expr::binary(
                converter.convert(*left)?,
                converter.convert_binary_op(&op)?,
                converter.convert(*right)?,
            )),
            sql_ast::Expr::UnaryOp { expr, .. } => Ok(Expr::UnaryOp {
                op: UnaryOperator::Minus,
                expr: Box::new(converter.convert(*expr)?),
            }),
            _ => unreachable!("ArithmeticPlugin called with non-arithmetic expression"),
        }
    }
}
