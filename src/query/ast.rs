//! Syntax tree of the object query language.

use crate::core::Value;
use crate::sql::{AggregateFunction, BinaryOperator, ParamRef};

#[derive(Debug, Clone, PartialEq)]
pub enum QueryStatement {
    Select(SelectQuery),
    Update(UpdateQuery),
    Delete(DeleteQuery),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectQuery {
    pub distinct: bool,
    pub items: Vec<SelectItem>,
    pub from: RangeVariable,
    pub joins: Vec<JoinClause>,
    pub filter: Option<QueryExpr>,
    pub order_by: Vec<OrderItem>,
}

/// `Entity alias` in a FROM clause.
#[derive(Debug, Clone, PartialEq)]
pub struct RangeVariable {
    pub entity: String,
    pub alias: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    Inner,
    Left,
}

#[derive(Debug, Clone, PartialEq)]
pub struct JoinClause {
    pub join_type: JoinType,
    pub fetch: bool,
    pub path: Vec<String>,
    pub alias: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SelectItem {
    Expr(QueryExpr),
    /// `NEW pkg.Dto(arg, ...)`
    Constructor { class: String, args: Vec<QueryExpr> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderItem {
    pub expr: QueryExpr,
    pub descending: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateQuery {
    pub target: RangeVariable,
    pub assignments: Vec<(Vec<String>, QueryExpr)>,
    pub filter: Option<QueryExpr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeleteQuery {
    pub target: RangeVariable,
    pub filter: Option<QueryExpr>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum QueryExpr {
    /// Alias or alias-rooted path; a single segment may also name an
    /// entity type where one is expected (`TYPE(i) = Book`).
    Path(Vec<String>),
    Literal(Value),
    Parameter(ParamRef),
    Binary {
        left: Box<QueryExpr>,
        op: BinaryOperator,
        right: Box<QueryExpr>,
    },
    Not(Box<QueryExpr>),
    Negate(Box<QueryExpr>),
    IsNull {
        expr: Box<QueryExpr>,
        negated: bool,
    },
    Like {
        expr: Box<QueryExpr>,
        pattern: Box<QueryExpr>,
        negated: bool,
    },
    InList {
        expr: Box<QueryExpr>,
        list: Vec<QueryExpr>,
        negated: bool,
    },
    Between {
        expr: Box<QueryExpr>,
        low: Box<QueryExpr>,
        high: Box<QueryExpr>,
        negated: bool,
    },
    /// `arg == None` is `COUNT(*)`.
    Aggregate {
        func: AggregateFunction,
        arg: Option<Box<QueryExpr>>,
        distinct: bool,
    },
    /// `TYPE(alias)`
    Type(String),
}

impl QueryExpr {
    pub fn path(segments: &[&str]) -> Self {
        QueryExpr::Path(segments.iter().map(|s| s.to_string()).collect())
    }

    pub fn binary(left: QueryExpr, op: BinaryOperator, right: QueryExpr) -> Self {
        QueryExpr::Binary {
            left: Box::new(left),
            op,
            right: Box::new(right),
        }
    }

    pub fn contains_aggregate(&self) -> bool {
        match self {
            QueryExpr::Aggregate { .. } => true,
            QueryExpr::Path(_) | QueryExpr::Literal(_) | QueryExpr::Parameter(_) | QueryExpr::Type(_) => false,
            QueryExpr::Binary { left, right, .. } => left.contains_aggregate() || right.contains_aggregate(),
            QueryExpr::Not(e) | QueryExpr::Negate(e) | QueryExpr::IsNull { expr: e, .. } => e.contains_aggregate(),
            QueryExpr::Like { expr, pattern, .. } => expr.contains_aggregate() || pattern.contains_aggregate(),
            QueryExpr::InList { expr, list, .. } => {
                expr.contains_aggregate() || list.iter().any(QueryExpr::contains_aggregate)
            }
            QueryExpr::Between { expr, low, high, .. } => {
                expr.contains_aggregate() || low.contains_aggregate() || high.contains_aggregate()
            }
        }
    }
}
