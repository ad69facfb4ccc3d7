pub mod ast;

pub use ast::{
    AggregateFunction, Assignment, BinaryOperator, DeleteStmt, Expr, InsertStmt, Join, JoinKind, OrderByItem,
    ParamRef, Params, SelectCore, SelectItem, SelectStmt, Statement, TableRef, UnaryOperator, UpdateStmt,
};
