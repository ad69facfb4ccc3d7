// ============================================================================
// SELECT execution
// ============================================================================
//
// Each branch runs scan -> nested-loop joins -> filter -> projection
// (or a single aggregate row) -> DISTINCT. Branches are concatenated
// (UNION ALL), then ordered and paged as a whole.

use super::sort::{sort_by_keys, SortKey};
use super::{ExecutionContext, Executor};
use crate::core::{DbError, Result, Row, Value};
use crate::evaluator::{EvaluationContext, RowLayout, Scope};
use crate::result::QueryResult;
use crate::sql::{AggregateFunction, Expr, JoinKind, OrderByItem, SelectCore, SelectItem, SelectStmt, Statement};
use std::collections::HashSet;

use async_trait::async_trait;

pub struct QueryExecutor;

#[async_trait]
impl Executor for QueryExecutor {
    fn name(&self) -> &'static str {
        "QUERY"
    }

    fn can_handle(&self, stmt: &Statement) -> bool {
        matches!(stmt, Statement::Select(_))
    }

    async fn execute(&self, stmt: &Statement, ctx: &ExecutionContext<'_>) -> Result<QueryResult> {
        let Statement::Select(select) = stmt else {
            unreachable!();
        };
        self.execute_select(select, ctx).await
    }
}

/// Output of one SELECT branch. `source` is kept so ORDER BY may refer to
/// columns that are not projected; it is absent for aggregate rows.
struct Projected {
    layout: RowLayout,
    columns: Vec<String>,
    exprs: Vec<Expr>,
    rows: Vec<(Option<Row>, Row)>,
}

impl QueryExecutor {
    async fn execute_select(&self, select: &SelectStmt, ctx: &ExecutionContext<'_>) -> Result<QueryResult> {
        let eval = ctx.evaluation();
        let keys: Vec<SortKey> = select
            .order_by
            .iter()
            .map(|item| SortKey {
                descending: item.descending,
            })
            .collect();

        let mut columns: Option<Vec<String>> = None;
        let mut keyed_rows: Vec<(Vec<Value>, Row)> = Vec::new();

        for branch in &select.branches {
            let projected = self.execute_core(branch, ctx, &eval).await?;

            match &columns {
                None => columns = Some(projected.columns.clone()),
                Some(first) if first.len() != projected.columns.len() => {
                    return Err(DbError::ExecutionError(format!(
                        "UNION ALL branches return {} and {} columns",
                        first.len(),
                        projected.columns.len()
                    )));
                }
                Some(_) => {}
            }

            for (source, output) in &projected.rows {
                let sort_values = select
                    .order_by
                    .iter()
                    .map(|item| order_value(item, &projected, source.as_ref(), output, &eval))
                    .collect::<Result<Vec<_>>>()?;
                keyed_rows.push((sort_values, output.clone()));
            }
        }

        if !keys.is_empty() {
            sort_by_keys(&mut keyed_rows, &keys);
        }

        let rows: Vec<Row> = keyed_rows
            .into_iter()
            .map(|(_, row)| row)
            .skip(select.offset.unwrap_or(0))
            .take(select.limit.unwrap_or(usize::MAX))
            .collect();

        Ok(QueryResult::new(columns.unwrap_or_default(), rows))
    }

    async fn execute_core(
        &self,
        core: &SelectCore,
        ctx: &ExecutionContext<'_>,
        eval: &EvaluationContext<'_>,
    ) -> Result<Projected> {
        let from_schema = ctx.catalog.get_table(&core.from.name)?;
        let mut layout = RowLayout::new();
        layout.push(core.from.binding(), from_schema.name(), from_schema.column_names());
        let mut rows = ctx.storage.scan_table(&core.from.name, &ctx.read).await?;

        for join in &core.joins {
            let schema = ctx.catalog.get_table(&join.table.name)?;
            let right_rows = ctx.storage.scan_table(&join.table.name, &ctx.read).await?;
            let width = schema.schema().column_count();
            layout.push(join.table.binding(), schema.name(), schema.column_names());

            let mut joined = Vec::new();
            for left in rows {
                let mut matched = false;
                for right in &right_rows {
                    let mut combined = left.clone();
                    combined.extend(right.iter().cloned());
                    if eval.matches(&join.on, &Scope::new(&layout, &combined))? {
                        matched = true;
                        joined.push(combined);
                    }
                }
                if !matched && join.kind == JoinKind::LeftOuter {
                    let mut padded = left;
                    padded.extend(std::iter::repeat_n(Value::Null, width));
                    joined.push(padded);
                }
            }
            rows = joined;
        }

        if let Some(condition) = &core.selection {
            let mut kept = Vec::with_capacity(rows.len());
            for row in rows {
                if eval.matches(condition, &Scope::new(&layout, &row))? {
                    kept.push(row);
                }
            }
            rows = kept;
        }

        let (columns, exprs) = expand_projection(&core.projection, &layout)?;

        let mut output = Vec::new();
        if exprs.iter().any(Expr::contains_aggregate) {
            let row = exprs
                .iter()
                .map(|expr| evaluate_aggregated(expr, &rows, &layout, eval))
                .collect::<Result<Row>>()?;
            output.push((None, row));
        } else {
            for row in rows {
                let scope = Scope::new(&layout, &row);
                let projected = exprs
                    .iter()
                    .map(|expr| eval.evaluate(expr, &scope))
                    .collect::<Result<Row>>()?;
                output.push((Some(row), projected));
            }
        }

        if core.distinct {
            let mut seen = HashSet::new();
            output.retain(|(_, row)| seen.insert(row.clone()));
        }

        Ok(Projected {
            layout,
            columns,
            exprs,
            rows: output,
        })
    }
}

fn expand_projection(items: &[SelectItem], layout: &RowLayout) -> Result<(Vec<String>, Vec<Expr>)> {
    let mut columns = Vec::new();
    let mut exprs = Vec::new();

    fn push_source(binding: &str, names: &[String], columns: &mut Vec<String>, exprs: &mut Vec<Expr>) {
        for name in names {
            columns.push(name.clone());
            exprs.push(Expr::column(binding, name.clone()));
        }
    }

    for item in items {
        match item {
            SelectItem::Wildcard => {
                for source in layout.sources() {
                    push_source(&source.binding, &source.columns, &mut columns, &mut exprs);
                }
            }
            SelectItem::QualifiedWildcard(binding) => {
                let source = layout
                    .source(binding)
                    .ok_or_else(|| DbError::TableNotFound(binding.clone()))?;
                push_source(&source.binding, &source.columns, &mut columns, &mut exprs);
            }
            SelectItem::Expr { expr, alias } => {
                let name = match (alias, expr) {
                    (Some(alias), _) => alias.clone(),
                    (None, Expr::Column { name, .. }) => name.clone(),
                    (None, other) => other.to_string(),
                };
                columns.push(name);
                exprs.push(expr.clone());
            }
        }
    }

    Ok((columns, exprs))
}

fn order_value(
    item: &OrderByItem,
    projected: &Projected,
    source: Option<&Row>,
    output: &Row,
    eval: &EvaluationContext<'_>,
) -> Result<Value> {
    if let Some(idx) = projected.exprs.iter().position(|e| e == &item.expr) {
        return Ok(output[idx].clone());
    }
    if let Expr::Column { table: None, name } = &item.expr
        && let Some(idx) = projected.columns.iter().position(|c| c.eq_ignore_ascii_case(name))
    {
        return Ok(output[idx].clone());
    }

    match source {
        Some(row) => eval.evaluate(&item.expr, &Scope::new(&projected.layout, row)),
        None => Err(DbError::ExecutionError(format!(
            "ORDER BY {} must appear in the select list",
            item.expr
        ))),
    }
}

fn evaluate_aggregated(expr: &Expr, rows: &[Row], layout: &RowLayout, eval: &EvaluationContext<'_>) -> Result<Value> {
    let substituted = substitute_aggregates(expr, rows, layout, eval)?;
    let first = rows
        .first()
        .cloned()
        .unwrap_or_else(|| vec![Value::Null; layout.width()]);
    eval.evaluate(&substituted, &Scope::new(layout, &first))
}

// Replace each aggregate call with its computed value so the surrounding
// expression can be evaluated like any other.
fn substitute_aggregates(expr: &Expr, rows: &[Row], layout: &RowLayout, eval: &EvaluationContext<'_>) -> Result<Expr> {
    let sub = |e: &Box<Expr>| substitute_aggregates(e.as_ref(), rows, layout, eval).map(Box::new);

    Ok(match expr {
        Expr::Aggregate { func, arg, distinct } => {
            Expr::Literal(compute_aggregate(*func, arg.as_deref(), *distinct, rows, layout, eval)?)
        }
        Expr::BinaryOp { left, op, right } => Expr::BinaryOp {
            left: sub(left)?,
            op: *op,
            right: sub(right)?,
        },
        Expr::UnaryOp { op, expr } => Expr::UnaryOp { op: *op, expr: sub(expr)? },
        Expr::IsNull { expr, negated } => Expr::IsNull {
            expr: sub(expr)?,
            negated: *negated,
        },
        Expr::Like { expr, pattern, negated } => Expr::Like {
            expr: sub(expr)?,
            pattern: sub(pattern)?,
            negated: *negated,
        },
        Expr::Between { expr, low, high, negated } => Expr::Between {
            expr: sub(expr)?,
            low: sub(low)?,
            high: sub(high)?,
            negated: *negated,
        },
        Expr::InList { expr, list, negated } => Expr::InList {
            expr: sub(expr)?,
            list: list
                .iter()
                .map(|e| substitute_aggregates(e, rows, layout, eval))
                .collect::<Result<Vec<_>>>()?,
            negated: *negated,
        },
        other => other.clone(),
    })
}

fn compute_aggregate(
    func: AggregateFunction,
    arg: Option<&Expr>,
    distinct: bool,
    rows: &[Row],
    layout: &RowLayout,
    eval: &EvaluationContext<'_>,
) -> Result<Value> {
    let Some(arg) = arg else {
        return match func {
            AggregateFunction::Count => Ok(Value::Integer(rows.len() as i64)),
            other => Err(DbError::ExecutionError(format!("{}(*) is not supported", other))),
        };
    };

    let mut values = Vec::with_capacity(rows.len());
    for row in rows {
        let value = eval.evaluate(arg, &Scope::new(layout, row))?;
        if !value.is_null() {
            values.push(value);
        }
    }
    if distinct {
        let mut seen = HashSet::new();
        values.retain(|v| seen.insert(v.clone()));
    }

    match func {
        AggregateFunction::Count => Ok(Value::Integer(values.len() as i64)),
        AggregateFunction::Sum => sum(&values),
        AggregateFunction::Avg => {
            if values.is_empty() {
                return Ok(Value::Null);
            }
            let total = sum(&values)?
                .as_f64()
                .ok_or_else(|| DbError::TypeMismatch("AVG requires numeric values".into()))?;
            Ok(Value::Float(total / values.len() as f64))
        }
        AggregateFunction::Min => Ok(extreme(values, std::cmp::Ordering::Less)),
        AggregateFunction::Max => Ok(extreme(values, std::cmp::Ordering::Greater)),
        AggregateFunction::GroupConcat => {
            if values.is_empty() {
                return Ok(Value::Null);
            }
            let parts: Vec<String> = values.iter().map(ToString::to_string).collect();
            Ok(Value::Text(parts.join(",")))
        }
    }
}

fn sum(values: &[Value]) -> Result<Value> {
    if values.is_empty() {
        return Ok(Value::Null);
    }
    if values.iter().all(|v| matches!(v, Value::Integer(_))) {
        let mut total: i64 = 0;
        for value in values {
            if let Value::Integer(i) = value {
                total = total
                    .checked_add(*i)
                    .ok_or_else(|| DbError::ExecutionError("Integer overflow in SUM".into()))?;
            }
        }
        return Ok(Value::Integer(total));
    }

    let mut total = 0.0;
    for value in values {
        total += value
            .as_f64()
            .ok_or_else(|| DbError::TypeMismatch(format!("Cannot sum {}", value.type_name())))?;
    }
    Ok(Value::Float(total))
}

fn extreme(values: Vec<Value>, wanted: std::cmp::Ordering) -> Value {
    values
        .into_iter()
        .reduce(|best, candidate| {
            if super::sort::compare_values(&candidate, &best) == wanted {
                candidate
            } else {
                best
            }
        })
        .unwrap_or(Value::Null)
}
