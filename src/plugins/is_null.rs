use super::{ExpressionConverter, ExpressionPlugin};
use crate::core::Result;
use crate::sql::Expr;
use sqlparser::ast as sql_ast;

pub struct IsNullPlugin;

impl ExpressionPlugin for IsNullPlugin {
    fn name(&self) -> &'static str {
        "IS NULL"
    }

    fn can_handle(&self, expr: &sql_ast::Expr) -> bool {
        matches!(expr, sql_ast::Expr::IsNull(_) | sql_ast::Expr::IsNotNull(_))
    }

    fn convert(&self, expr: sql_ast::Expr, converter: &ExpressionConverter) -> Result<Expr> {
        let (inner, negated) = match expr {
            sql_ast::Expr::IsNull(inner) => (inner, false),
            sql_ast::Expr::IsNotNull(inner) => (inner, true),
            _ => unreachable!("IsNullPlugin called with non-IS NULL expression"),
        };
        Ok(Expr::IsNull {
            expr: Box::new(converter.convert(*inner)?),
            negated,
        })
    }
}
