// ============================================================================
// Native SQL front end: sqlparser (PostgreSQL dialect) -> relational AST
// ============================================================================

use crate::core::{DbError, Result};
use crate::plugins::ExpressionConverter;
use crate::sql::*;
use sqlparser::ast as sql_ast;
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;

pub struct SqlParserAdapter {
    dialect: PostgreSqlDialect,
    expr_converter: ExpressionConverter,
}

impl SqlParserAdapter {
    pub fn new() -> Self {
        Self {
            dialect: PostgreSqlDialect {},
            expr_converter: ExpressionConverter::new(),
        }
    }

    pub fn parse(&self, sql: &str) -> Result<Vec<Statement>> {
        let external_stmts = Parser::parse_sql(&self.dialect, sql).map_err(|e| DbError::ParseError(e.to_string()))?;

        external_stmts
            .into_iter()
            .map(|stmt| self.convert_statement(stmt))
            .collect()
    }

    /// Parse exactly one statement.
    pub fn parse_one(&self, sql: &str) -> Result<Statement> {
        let mut statements = self.parse(sql)?;
        match statements.len() {
            1 => Ok(statements.remove(0)),
            0 => Err(DbError::ParseError("No statement found".into())),
            n => Err(DbError::ParseError(format!("Expected one statement, found {}", n))),
        }
    }

    fn convert_statement(&self, stmt: sql_ast::Statement) -> Result<Statement> {
        match stmt {
            sql_ast::Statement::Insert(insert) => Ok(Statement::Insert(self.convert_insert(insert)?)),
            sql_ast::Statement::Query(query) => Ok(Statement::Select(self.convert_query(*query)?)),
            sql_ast::Statement::Delete(delete) => Ok(Statement::Delete(self.convert_delete(delete)?)),
            sql_ast::Statement::Update {
                table,
                assignments,
                selection,
                ..
            } => Ok(Statement::Update(self.convert_update(table, assignments, selection)?)),
            other => Err(DbError::UnsupportedOperation(format!(
                "Statement type not supported: {}",
                other
            ))),
        }
    }

    fn convert_insert(&self, insert: sql_ast::Insert) -> Result<InsertStmt> {
        let table = insert.table.to_string();
        let columns: Vec<String> = insert.columns.into_iter().map(|id| id.value).collect();

        let Some(source) = insert.source else {
            return Err(DbError::ParseError("INSERT requires a VALUES clause".into()));
        };
        let sql_ast::SetExpr::Values(values) = *source.body else {
            return Err(DbError::UnsupportedOperation("Only VALUES clause supported".into()));
        };

        let mut rows = values.rows.into_iter();
        let (Some(row), None) = (rows.next(), rows.next()) else {
            return Err(DbError::UnsupportedOperation("INSERT supports exactly one VALUES row".into()));
        };

        let values = row
            .into_iter()
            .map(|expr| self.expr_converter.convert(expr))
            .collect::<Result<Vec<_>>>()?;

        Ok(InsertStmt { table, columns, values })
    }

    fn convert_update(
        &self,
        table: sql_ast::TableWithJoins,
        assignments: Vec<sql_ast::Assignment>,
        selection: Option<sql_ast::Expr>,
    ) -> Result<UpdateStmt> {
        let table = self.convert_table_factor(table.relation)?;

        let assignments = assignments
            .into_iter()
            .map(|assign| {
                let column = match assign.target {
                    sql_ast::AssignmentTarget::ColumnName(col_name) => col_name
                        .0
                        .last()
                        .map(|part| part.to_string())
                        .ok_or_else(|| DbError::ParseError("Empty column name in UPDATE".into()))?,
                    _ => {
                        return Err(DbError::UnsupportedOperation(
                            "Only simple column names supported in UPDATE".into(),
                        ));
                    }
                };
                let value = self.expr_converter.convert(assign.value)?;
                Ok(Assignment { column, value })
            })
            .collect::<Result<Vec<_>>>()?;

        let selection = selection.map(|expr| self.expr_converter.convert(expr)).transpose()?;

        Ok(UpdateStmt {
            table,
            assignments,
            selection,
        })
    }

    fn convert_delete(&self, delete: sql_ast::Delete) -> Result<DeleteStmt> {
        let tables = match delete.from {
            sql_ast::FromTable::WithFromKeyword(tables) | sql_ast::FromTable::WithoutKeyword(tables) => tables,
        };
        let Some(first) = tables.into_iter().next() else {
            return Err(DbError::ParseError("DELETE requires a table".into()));
        };
        let table = self.convert_table_factor(first.relation)?;
        let selection = delete
            .selection
            .map(|expr| self.expr_converter.convert(expr))
            .transpose()?;

        Ok(DeleteStmt { table, selection })
    }

    fn convert_query(&self, query: sql_ast::Query) -> Result<SelectStmt> {
        let mut branches = Vec::new();
        self.collect_branches(*query.body, &mut branches)?;

        let order_by = self.convert_order_by(query.order_by)?;
        let (limit, offset) = self.convert_limit_clause(query.limit_clause)?;

        Ok(SelectStmt {
            branches,
            order_by,
            limit,
            offset,
        })
    }

    // UNION ALL chains flatten into a list of branches.
    fn collect_branches(&self, body: sql_ast::SetExpr, branches: &mut Vec<SelectCore>) -> Result<()> {
        match body {
            sql_ast::SetExpr::Select(select) => {
                branches.push(self.convert_select(*select)?);
                Ok(())
            }
            sql_ast::SetExpr::SetOperation {
                op: sql_ast::SetOperator::Union,
                set_quantifier: sql_ast::SetQuantifier::All,
                left,
                right,
            } => {
                self.collect_branches(*left, branches)?;
                self.collect_branches(*right, branches)
            }
            sql_ast::SetExpr::Query(query) if query.order_by.is_none() && query.limit_clause.is_none() => {
                self.collect_branches(*query.body, branches)
            }
            _ => Err(DbError::UnsupportedOperation(
                "Only SELECT and UNION ALL queries supported".into(),
            )),
        }
    }

    fn convert_select(&self, select: sql_ast::Select) -> Result<SelectCore> {
        let distinct = match select.distinct {
            None => false,
            Some(sql_ast::Distinct::Distinct) => true,
            Some(_) => return Err(DbError::UnsupportedOperation("DISTINCT ON not supported".into())),
        };

        let mut from = select.from.into_iter();
        let (Some(table), None) = (from.next(), from.next()) else {
            return Err(DbError::UnsupportedOperation(
                "SELECT requires exactly one FROM item (use JOIN for more)".into(),
            ));
        };

        let mut core = SelectCore::new(self.convert_table_factor(table.relation)?);
        core.distinct = distinct;
        core.joins = table
            .joins
            .into_iter()
            .map(|join| self.convert_join(join))
            .collect::<Result<Vec<_>>>()?;
        core.projection = select
            .projection
            .into_iter()
            .map(|item| self.convert_select_item(item))
            .collect::<Result<Vec<_>>>()?;
        core.selection = select
            .selection
            .map(|expr| self.expr_converter.convert(expr))
            .transpose()?;

        Ok(core)
    }

    fn convert_table_factor(&self, factor: sql_ast::TableFactor) -> Result<TableRef> {
        match factor {
            sql_ast::TableFactor::Table { name, alias, .. } => Ok(TableRef {
                name: extract_table_name(&name)?,
                alias: alias.map(|a| a.name.value),
            }),
            _ => Err(DbError::UnsupportedOperation("Complex table references not supported".into())),
        }
    }

    fn convert_join(&self, join: sql_ast::Join) -> Result<Join> {
        let table = self.convert_table_factor(join.relation)?;
        let (kind, constraint) = match join.join_operator {
            sql_ast::JoinOperator::Inner(c) | sql_ast::JoinOperator::Join(c) => (JoinKind::Inner, c),
            sql_ast::JoinOperator::Left(c) | sql_ast::JoinOperator::LeftOuter(c) => (JoinKind::LeftOuter, c),
            other => {
                return Err(DbError::UnsupportedOperation(format!(
                    "Unsupported join type: {:?}",
                    other
                )));
            }
        };
        let on = match constraint {
            sql_ast::JoinConstraint::On(expr) => self.expr_converter.convert(expr)?,
            _ => return Err(DbError::UnsupportedOperation("Only ON constraint supported in JOIN".into())),
        };

        Ok(Join { kind, table, on })
    }

    fn convert_order_by(&self, order_by: Option<sql_ast::OrderBy>) -> Result<Vec<OrderByItem>> {
        let Some(order_by) = order_by else {
            return Ok(Vec::new());
        };

        match order_by.kind {
            sql_ast::OrderByKind::Expressions(exprs) => exprs
                .into_iter()
                .map(|order| {
                    Ok(OrderByItem {
                        expr: self.expr_converter.convert(order.expr)?,
                        descending: order.options.asc.map(|asc| !asc).unwrap_or(false),
                    })
                })
                .collect(),
            sql_ast::OrderByKind::All(_) => Err(DbError::UnsupportedOperation("ORDER BY ALL not supported".into())),
        }
    }

    fn convert_limit_clause(&self, clause: Option<sql_ast::LimitClause>) -> Result<(Option<usize>, Option<usize>)> {
        match clause {
            None => Ok((None, None)),
            Some(sql_ast::LimitClause::LimitOffset { limit, offset, .. }) => {
                let limit = limit.map(|expr| extract_count(&expr)).transpose()?;
                let offset = offset.map(|o| extract_count(&o.value)).transpose()?;
                Ok((limit, offset))
            }
            Some(sql_ast::LimitClause::OffsetCommaLimit { offset, limit }) => {
                Ok((Some(extract_count(&limit)?), Some(extract_count(&offset)?)))
            }
        }
    }

    fn convert_select_item(&self, item: sql_ast::SelectItem) -> Result<SelectItem> {
        match item {
            sql_ast::SelectItem::Wildcard(_) => Ok(SelectItem::Wildcard),
            sql_ast::SelectItem::UnnamedExpr(expr) => Ok(SelectItem::Expr {
                expr: self.expr_converter.convert(expr)?,
                alias: None,
            }),
            sql_ast::SelectItem::ExprWithAlias { expr, alias } => Ok(SelectItem::Expr {
                expr: self.expr_converter.convert(expr)?,
                alias: Some(alias.value),
            }),
            _ => Err(DbError::UnsupportedOperation("Unsupported select item".into())),
        }
    }
}

impl Default for SqlParserAdapter {
    fn default() -> Self {
        Self::new()
    }
}

fn extract_table_name(name: &sql_ast::ObjectName) -> Result<String> {
    name.0
        .last()
        .map(|ident| ident.to_string())
        .ok_or_else(|| DbError::ParseError("Invalid table name".into()))
}

fn extract_count(expr: &sql_ast::Expr) -> Result<usize> {
    match expr {
        sql_ast::Expr::Value(value_with_span) => match &value_with_span.value {
            sql_ast::Value::Number(n, _) => n
                .parse::<usize>()
                .map_err(|_| DbError::ParseError(format!("Invalid LIMIT/OFFSET value: {}", n))),
            other => Err(DbError::UnsupportedOperation(format!(
                "Only numeric LIMIT/OFFSET supported, got: {}",
                other
            ))),
        },
        _ => Err(DbError::UnsupportedOperation("Only numeric LIMIT/OFFSET supported".into())),
    }
}
