//! Object query language: parsing, and translation into relational
//! statements against the mapped tables.

pub mod ast;
pub mod lexer;
pub mod parser;
pub mod translate;

pub use ast::QueryStatement;
pub use parser::parse;
pub use translate::{EntityShape, FetchShape, FetchTarget, ResultShape, SelectPlan, Translated, Translator, TypeTag};

use crate::core::{Result, Value};
use crate::entity::{EmbeddedValue, EntityHandle};
use crate::metadata::Metamodel;

/// Parse and translate `query` without running it.
pub fn check(model: &Metamodel, query: &str) -> Result<()> {
    Translator::new(model).translate(query).map(|_| ())
}

/// One item of a query result row.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryValue {
    Entity(EntityHandle),
    Scalar(Value),
    /// `None` when every field is NULL.
    Embedded(Option<EmbeddedValue>),
    /// `NEW pkg.Class(...)`
    Object { class: String, args: Vec<QueryValue> },
    /// A row with more than one select item.
    Tuple(Vec<QueryValue>),
}

impl QueryValue {
    pub fn as_entity(&self) -> Option<EntityHandle> {
        match self {
            QueryValue::Entity(handle) => Some(*handle),
            _ => None,
        }
    }

    pub fn as_scalar(&self) -> Option<&Value> {
        match self {
            QueryValue::Scalar(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_embedded(&self) -> Option<&EmbeddedValue> {
        match self {
            QueryValue::Embedded(value) => value.as_ref(),
            _ => None,
        }
    }

    pub fn as_tuple(&self) -> Option<&[QueryValue]> {
        match self {
            QueryValue::Tuple(items) => Some(items),
            _ => None,
        }
    }

    /// Constructor arguments of a `NEW` result.
    pub fn as_object(&self, class: &str) -> Option<&[QueryValue]> {
        match self {
            QueryValue::Object { class: c, args } if c == class => Some(args),
            _ => None,
        }
    }
}
