use super::{ExpressionConverter, ExpressionPlugin};
use crate::core::Result;
use crate::sql::Expr;
use sqlparser::ast as sql_ast;

pub struct ComparisonPlugin;

impl ExpressionPlugin for ComparisonPlugin {
    fn name(&self) -> &'static str {
        "COMPARISON"
    }

    fn can_handle(&self, expr: &sql_ast::Expr) -> bool {
        if let sql_ast::Expr::BinaryOp { op, .. } = expr {
            matches!(
                op,
                sql_ast::BinaryOperator::Eq
                    | sql_ast::BinaryOperator::NotEq
                    | sql_ast::BinaryOperator::Lt
                    | sql_ast::BinaryOperator::LtEq
                    | sql_ast::BinaryOperator::Gt
                    | sql_ast::BinaryOperator::GtEq
            )
        } else {
            false
        }
    }

    fn convert(&self, expr: sql_ast::Expr, converter: &ExpressionConverter) -> Result<Expr> {
        match expr {
            sql_ast::Expr::BinaryOp { left, op, right } => Ok(Expr::binary(
                converter.convert(*left)?,
                converter.convert_binary_op(&op)?,
                converter.convert(*right)?,
            )),
            _ => unreachable!("ComparisonPlugin called with non-comparison expression"),
        }
    }
}
