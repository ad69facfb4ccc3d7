pub mod plugins;

use crate::core::{DbError, Result, Value};
use crate::sql::{Expr, Params};

/// Evaluates one family of expressions. Implementations recurse into
/// sub-expressions through [`EvaluationContext::evaluate`].
pub trait ExpressionEvaluator: Send + Sync {
    fn name(&self) -> &'static str;

    fn can_evaluate(&self, expr: &Expr) -> bool;

    fn evaluate(&self, expr: &Expr, scope: &Scope<'_>, context: &EvaluationContext<'_>) -> Result<Value>;
}

/// Column positions of one table inside a joined row.
#[derive(Debug, Clone)]
pub struct SourceLayout {
    pub binding: String,
    pub table: String,
    pub columns: Vec<String>,
    pub offset: usize,
}

/// How a (possibly joined) row is laid out: the concatenation of the
/// columns of every source, in join order.
#[derive(Debug, Clone, Default)]
pub struct RowLayout {
    sources: Vec<SourceLayout>,
}

impl RowLayout {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, binding: &str, table: &str, columns: Vec<String>) {
        let offset = self.width();
        self.sources.push(SourceLayout {
            binding: binding.to_string(),
            table: table.to_string(),
            columns,
            offset,
        });
    }

    pub fn width(&self) -> usize {
        self.sources.iter().map(|s| s.columns.len()).sum()
    }

    pub fn sources(&self) -> &[SourceLayout] {
        &self.sources
    }

    pub fn source(&self, binding: &str) -> Option<&SourceLayout> {
        self.sources
            .iter()
            .find(|s| s.binding.eq_ignore_ascii_case(binding))
            .or_else(|| self.sources.iter().find(|s| s.table.eq_ignore_ascii_case(binding)))
    }

    pub fn resolve(&self, table: Option<&str>, name: &str) -> Result<usize> {
        if let Some(table) = table {
            let source = self
                .source(table)
                .ok_or_else(|| DbError::TableNotFound(table.to_string()))?;
            return source
                .columns
                .iter()
                .position(|c| c.eq_ignore_ascii_case(name))
                .map(|i| source.offset + i)
                .ok_or_else(|| DbError::ColumnNotFound(name.to_string(), source.table.clone()));
        }

        let mut found = None;
        for source in &self.sources {
            if let Some(i) = source.columns.iter().position(|c| c.eq_ignore_ascii_case(name)) {
                if found.is_some() {
                    return Err(DbError::ExecutionError(format!("Column reference '{}' is ambiguous", name)));
                }
                found = Some(source.offset + i);
            }
        }
        found.ok_or_else(|| DbError::ColumnNotFound(name.to_string(), "<query>".into()))
    }
}

/// A row being evaluated together with its layout.
pub struct Scope<'a> {
    pub layout: &'a RowLayout,
    pub row: &'a [Value],
}

impl<'a> Scope<'a> {
    pub fn new(layout: &'a RowLayout, row: &'a [Value]) -> Self {
        Self { layout, row }
    }
}

pub struct EvaluationContext<'a> {
    registry: &'a EvaluatorRegistry,
    params: &'a Params,
}

impl<'a> EvaluationContext<'a> {
    pub fn new(registry: &'a EvaluatorRegistry, params: &'a Params) -> Self {
        Self { registry, params }
    }

    pub fn evaluate(&self, expr: &Expr, scope: &Scope<'_>) -> Result<Value> {
        match expr {
            Expr::Column { table, name } => {
                let idx = scope.layout.resolve(table.as_deref(), name)?;
                return scope
                    .row
                    .get(idx)
                    .cloned()
                    .ok_or_else(|| DbError::ExecutionError(format!("Row too short for column '{}'", name)));
            }
            Expr::Literal(value) => return Ok(value.clone()),
            Expr::Parameter(param) => return self.params.get(param).cloned(),
            Expr::Aggregate { .. } => {
                return Err(DbError::ExecutionError(format!(
                    "Aggregate {} is not allowed here",
                    expr
                )));
            }
            _ => {}
        }

        if let Some(evaluator) = self.registry.find_evaluator(expr) {
            return evaluator.evaluate(expr, scope, self);
        }

        Err(DbError::UnsupportedOperation(format!(
            "No evaluator found for expression: {}",
            expr
        )))
    }

    /// WHERE / ON semantics: NULL counts as false.
    pub fn matches(&self, expr: &Expr, scope: &Scope<'_>) -> Result<bool> {
        Ok(self.evaluate(expr, scope)?.as_bool())
    }
}

pub struct EvaluatorRegistry {
    evaluators: Vec<Box<dyn ExpressionEvaluator>>,
}

impl EvaluatorRegistry {
    pub fn new() -> Self {
        Self {
            evaluators: Vec::new(),
        }
    }

    pub fn register(&mut self, evaluator: Box<dyn ExpressionEvaluator>) {
        log::trace!("Registered evaluator: {}", evaluator.name());
        self.evaluators.push(evaluator);
    }

    pub fn with_default_evaluators() -> Self {
        use plugins::*;

        let mut registry = Self::new();
        registry.register(Box::new(comparison::ComparisonEvaluator));
        registry.register(Box::new(arithmetic::ArithmeticEvaluator));
        registry.register(Box::new(logical::LogicalEvaluator));
        registry.register(Box::new(like::LikeEvaluator));
        registry.register(Box::new(between::BetweenEvaluator));
        registry.register(Box::new(in_list::InListEvaluator));
        registry.register(Box::new(is_null::IsNullEvaluator));
        registry
    }

    fn find_evaluator(&self, expr: &Expr) -> Option<&dyn ExpressionEvaluator> {
        self.evaluators
            .iter()
            .find(|ev| ev.can_evaluate(expr))
            .map(|boxed| &**boxed)
    }
}

impl Default for EvaluatorRegistry {
    fn default() -> Self {
        Self::with_default_evaluators()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::{BinaryOperator, ParamRef};

    fn layout() -> RowLayout {
        let mut layout = RowLayout::new();
        layout.push("m", "MEMBER", vec!["ID".into(), "USERNAME".into(), "AGE".into()]);
        layout.push("t", "TEAM", vec!["ID".into(), "NAME".into()]);
        layout
    }

    #[test]
    fn test_column_resolution() {
        let layout = layout();
        assert_eq!(layout.resolve(Some("t"), "name").unwrap(), 4);
        assert_eq!(layout.resolve(None, "age").unwrap(), 2);
        assert!(layout.resolve(None, "id").is_err());
        assert!(layout.resolve(Some("x"), "id").is_err());
    }

    #[test]
    fn test_predicate_with_parameters() {
        let layout = layout();
        let row = vec![
            Value::Integer(1),
            Value::from("member1"),
            Value::Integer(20),
            Value::Integer(10),
            Value::from("teamA"),
        ];
        let registry = EvaluatorRegistry::default();
        let params = Params::positional(vec![Value::Integer(18)]);
        let ctx = EvaluationContext::new(&registry, &params);

        let expr = Expr::and(
            Expr::binary(
                Expr::column("m", "AGE"),
                BinaryOperator::Gt,
                Expr::Parameter(ParamRef::Positional(1)),
            ),
            Expr::Like {
                expr: Box::new(Expr::column("t", "NAME")),
                pattern: Box::new(Expr::literal("team%")),
                negated: false,
            },
        );
        assert!(ctx.matches(&expr, &Scope::new(&layout, &row)).unwrap());
    }
}
