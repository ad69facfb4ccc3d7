use super::{ExpressionConverter, ExpressionPlugin};
use crate::core::{DbError, Result};
use crate::sql::{AggregateFunction, Expr};
use sqlparser::ast as sql_ast;

/// Aggregate calls: COUNT, SUM, AVG, MIN, MAX, GROUP_CONCAT.
pub struct FunctionPlugin;

impl ExpressionPlugin for FunctionPlugin {
    fn name(&self) -> &'static str {
        "FUNCTION"
    }

    fn can_handle(&self, expr: &sql_ast::Expr) -> bool {
        matches!(expr, sql_ast::Expr::Function(_))
    }

    fn convert(&self, expr: sql_ast::Expr, converter: &ExpressionConverter) -> Result<Expr> {
        let sql_ast::Expr::Function(func) = expr else {
            unreachable!("FunctionPlugin called with non-function expression");
        };

        let name = func.name.to_string();
        let aggregate = AggregateFunction::from_name(&name)
            .ok_or_else(|| DbError::UnsupportedOperation(format!("Unsupported function: {}", name)))?;

        let sql_ast::FunctionArguments::List(arg_list) = func.args else {
            return Err(DbError::ParseError(format!("{} requires arguments", name)));
        };
        let distinct = matches!(
            arg_list.duplicate_treatment,
            Some(sql_ast::DuplicateTreatment::Distinct)
        );

        let mut args = arg_list.args.into_iter();
        let arg = match (args.next(), args.next()) {
            (Some(sql_ast::FunctionArg::Unnamed(sql_ast::FunctionArgExpr::Wildcard)), None) => None,
            (Some(sql_ast::FunctionArg::Unnamed(sql_ast::FunctionArgExpr::Expr(e))), None) => {
                Some(Box::new(converter.convert(e)?))
            }
            _ => {
                return Err(DbError::UnsupportedOperation(format!(
                    "{} takes exactly one argument",
                    name
                )));
            }
        };

        Ok(Expr::Aggregate {
            func: aggregate,
            arg,
            distinct,
        })
    }
}
