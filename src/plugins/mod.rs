//! Conversion of `sqlparser` expressions into relational [`Expr`]s, one
//! plugin per expression family.

pub mod arithmetic;
pub mod between;
pub mod boolean;
pub mod comparison;
pub mod function;
pub mod in_list;
pub mod is_null;
pub mod like;
pub mod nested;

use crate::core::{DbError, Result, Value};
use crate::sql::{BinaryOperator, Expr, ParamRef};
use sqlparser::ast as sql_ast;

pub trait ExpressionPlugin: Send + Sync {
    fn name(&self) -> &'static str;

    fn can_handle(&self, expr: &sql_ast::Expr) -> bool;

    fn convert(&self, expr: sql_ast::Expr, converter: &ExpressionConverter) -> Result<Expr>;
}

pub struct ExpressionPluginRegistry {
    plugins: Vec<Box<dyn ExpressionPlugin>>,
}

impl ExpressionPluginRegistry {
    pub fn new() -> Self {
        Self { plugins: Vec::new() }
    }

    pub fn register(&mut self, plugin: Box<dyn ExpressionPlugin>) {
        log::trace!("Registered expression plugin: {}", plugin.name());
        self.plugins.push(plugin);
    }

    pub fn with_default_plugins() -> Self {
        let mut registry = Self::new();

        // Nested goes first so parentheses are unwrapped before anything else.
        registry.register(Box::new(nested::NestedPlugin));
        registry.register(Box::new(function::FunctionPlugin));
        registry.register(Box::new(like::LikePlugin));
        registry.register(Box::new(between::BetweenPlugin));
        registry.register(Box::new(is_null::IsNullPlugin));
        registry.register(Box::new(arithmetic::ArithmeticPlugin));
        registry.register(Box::new(comparison::ComparisonPlugin));
        registry.register(Box::new(in_list::InListPlugin));
        registry.register(Box::new(boolean::BooleanPlugin));

        registry
    }

    pub fn find_plugin(&self, expr: &sql_ast::Expr) -> Option<&dyn ExpressionPlugin> {
        self.plugins
            .iter()
            .find(|plugin| plugin.can_handle(expr))
            .map(|boxed| &**boxed)
    }
}

impl Default for ExpressionPluginRegistry {
    fn default() -> Self {
        Self::with_default_plugins()
    }
}

pub struct ExpressionConverter {
    registry: ExpressionPluginRegistry,
}

impl ExpressionConverter {
    pub fn new() -> Self {
        Self {
            registry: ExpressionPluginRegistry::with_default_plugins(),
        }
    }

    pub fn convert(&self, expr: sql_ast::Expr) -> Result<Expr> {
        match &expr {
            sql_ast::Expr::Identifier(ident) => {
                return Ok(Expr::unqualified(ident.value.clone()));
            }
            sql_ast::Expr::CompoundIdentifier(idents) => {
                return match idents.as_slice() {
                    [.., table, column] => Ok(Expr::column(table.value.clone(), column.value.clone())),
                    _ => Err(DbError::ParseError(format!("Invalid column reference: {}", expr))),
                };
            }
            sql_ast::Expr::Value(val) => {
                return self.convert_value(&val.value);
            }
            _ => {}
        }

        if let Some(plugin) = self.registry.find_plugin(&expr) {
            return plugin.convert(expr, self);
        }

        Err(DbError::UnsupportedOperation(format!(
            "No plugin found for expression: {}",
            expr
        )))
    }

    /// Literals become [`Expr::Literal`], `$n` placeholders become parameters.
    pub fn convert_value(&self, val: &sql_ast::Value) -> Result<Expr> {
        let value = match val {
            sql_ast::Value::Number(n, _) => {
                if let Ok(i) = n.parse::<i64>() {
                    Value::Integer(i)
                } else if let Ok(f) = n.parse::<f64>() {
                    Value::Float(f)
                } else {
                    return Err(DbError::TypeMismatch(format!("Invalid number: {}", n)));
                }
            }
            sql_ast::Value::SingleQuotedString(s) | sql_ast::Value::DoubleQuotedString(s) => Value::Text(s.clone()),
            sql_ast::Value::Boolean(b) => Value::Boolean(*b),
            sql_ast::Value::Null => Value::Null,
            sql_ast::Value::Placeholder(p) => return parse_placeholder(p),
            _ => {
                return Err(DbError::UnsupportedOperation(format!(
                    "Unsupported value: {}",
                    val
                )));
            }
        };
        Ok(Expr::Literal(value))
    }

    pub fn convert_binary_op(&self, op: &sql_ast::BinaryOperator) -> Result<BinaryOperator> {
        Ok(match op {
            sql_ast::BinaryOperator::Eq => BinaryOperator::Eq,
            sql_ast::BinaryOperator::NotEq => BinaryOperator::NotEq,
            sql_ast::BinaryOperator::Lt => BinaryOperator::Lt,
            sql_ast::BinaryOperator::LtEq => BinaryOperator::LtEq,
            sql_ast::BinaryOperator::Gt => BinaryOperator::Gt,
            sql_ast::BinaryOperator::GtEq => BinaryOperator::GtEq,
            sql_ast::BinaryOperator::And => BinaryOperator::And,
            sql_ast::BinaryOperator::Or => BinaryOperator::Or,
            sql_ast::BinaryOperator::Plus => BinaryOperator::Plus,
            sql_ast::BinaryOperator::Minus => BinaryOperator::Minus,
            sql_ast::BinaryOperator::Multiply => BinaryOperator::Multiply,
            sql_ast::BinaryOperator::Divide => BinaryOperator::Divide,
            other => {
                return Err(DbError::UnsupportedOperation(format!(
                    "Unsupported operator: {}",
                    other
                )));
            }
        })
    }
}

impl Default for ExpressionConverter {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_placeholder(placeholder: &str) -> Result<Expr> {
    if let Some(index) = placeholder.strip_prefix('$') {
        let index = index
            .parse::<usize>()
            .map_err(|_| DbError::ParseError(format!("Invalid placeholder: {}", placeholder)))?;
        return Ok(Expr::Parameter(ParamRef::Positional(index)));
    }
    if let Some(name) = placeholder.strip_prefix(':') {
        return Ok(Expr::Parameter(ParamRef::Named(name.to_string())));
    }
    Err(DbError::ParseError(format!("Unsupported placeholder: {}", placeholder)))
}
