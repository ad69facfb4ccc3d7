use super::{ExpressionConverter, ExpressionPlugin};
use crate::core::Result;
use crate::sql::{Expr, UnaryOperator};
use sqlparser::ast as sql_ast;

pub struct BooleanPlugin;

impl ExpressionPlugin for BooleanPlugin {
    fn name(&self) -> &'static str {
        "BOOLEAN"
    }

    fn can_handle(&self, expr: &sql_ast::Expr) -> bool {
        match expr {
            sql_ast::Expr::BinaryOp { op, .. } => {
                matches!(op, sql_ast::BinaryOperator::And | sql_ast::BinaryOperator::Or)
            }
            sql_ast::Expr::UnaryOp { op, .. } => matches!(op, sql_ast::UnaryOperator::Not),
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
                op: UnaryOperator::Not,
                expr: Box::new(converter.convert(*expr)?),
            }),
            _ => unreachable!("BooleanPlugin called with non-boolean expression"),
        }
    }
}
