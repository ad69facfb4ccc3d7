// ============================================================================
// Object query translation
// ============================================================================
//
// An object query becomes one relational SELECT (or one statement per table
// for bulk UPDATE/DELETE) plus a description of how each output row maps
// back to entities, embedded values and scalars.
//
// Every output column is aliased: `c<n>` for result columns, `o<n>` for
// ordering keys. Ordering refers to the `o<n>` names so it still applies
// after the branches of a table-per-class union are concatenated.

use super::ast::*;
use super::parser::parse;
use crate::core::{DbError, Result, Value};
use crate::metadata::{Attribute, AttributeKind, ElementMapping, ElementShape, EntityType, Metamodel, RelationshipMapping};
use crate::sql::{
    Assignment, BinaryOperator, DeleteStmt, Expr, Join, JoinKind, OrderByItem, ParamRef, SelectCore,
    SelectItem as SqlSelectItem, SelectStmt, Statement, TableRef, UnaryOperator, UpdateStmt,
};
use std::collections::HashMap;

/// SQL alias of the FROM entity.
const ROOT: &str = "t0";

/// How the concrete type of an entity row is determined.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeTag {
    Fixed(String),
    /// Discriminator column, looked up among the entity's columns.
    Discriminator(String),
    /// Output column holding the concrete type name of a union branch.
    Branch(usize),
}

/// Output columns `start..start + columns.len()` hold `columns` of one entity.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityShape {
    /// Declared type; rows may be of any concrete subtype.
    pub entity: String,
    pub start: usize,
    pub columns: Vec<String>,
    pub tag: TypeTag,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResultShape {
    Entity(EntityShape),
    Scalar(usize),
    Embedded { embeddable: String, fields: Vec<(String, usize)> },
    Constructor { class: String, args: Vec<ResultShape> },
}

#[derive(Debug, Clone, PartialEq)]
pub enum FetchTarget {
    Entity(EntityShape),
    Elements {
        /// In the order of the element shape's columns.
        columns: Vec<usize>,
        position: Option<usize>,
    },
}

/// An association populated from the same rows by `JOIN FETCH`.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchShape {
    pub owner: EntityShape,
    pub attribute: String,
    pub target: FetchTarget,
}

#[derive(Debug, Clone)]
pub struct SelectPlan {
    pub statement: SelectStmt,
    pub shapes: Vec<ResultShape>,
    pub fetches: Vec<FetchShape>,
}

#[derive(Debug, Clone)]
pub enum Translated {
    Select(SelectPlan),
    /// Bulk update or delete: one statement per table of the target hierarchy.
    Bulk(Vec<Statement>),
}

pub struct Translator<'m> {
    model: &'m Metamodel,
}

impl<'m> Translator<'m> {
    pub fn new(model: &'m Metamodel) -> Self {
        Self { model }
    }

    pub fn translate(&self, query: &str) -> Result<Translated> {
        match parse(query)? {
            QueryStatement::Select(select) => self.select(&select).map(Translated::Select),
            QueryStatement::Update(update) => self.bulk_update(&update).map(Translated::Bulk),
            QueryStatement::Delete(delete) => self.bulk_delete(&delete).map(Translated::Bulk),
        }
    }

    pub fn select(&self, query: &SelectQuery) -> Result<SelectPlan> {
        let declared = entity(self.model, &query.from.entity)?;
        let branches = self.branch_types(declared)?;

        let aggregated = query.items.iter().any(|item| match item {
            SelectItem::Expr(expr) => expr.contains_aggregate(),
            SelectItem::Constructor { args, .. } => args.iter().any(QueryExpr::contains_aggregate),
        });
        if aggregated && branches.len() > 1 {
            return Err(DbError::Translation(format!(
                "Aggregates over the table-per-class hierarchy '{}' are not supported",
                declared.name
            )));
        }

        let mut cores = Vec::with_capacity(branches.len());
        let mut layout = None;
        for branch in branches {
            let mut scope = Scope::new(self.model, declared, branch, &query.from.alias, false);
            let (core, shapes, fetches) = scope.select_core(query, declared)?;
            cores.push(core);
            layout.get_or_insert((shapes, fetches));
        }
        let (shapes, fetches) = layout.unwrap_or_default();

        let order_by = query
            .order_by
            .iter()
            .enumerate()
            .map(|(i, item)| OrderByItem {
                expr: Expr::unqualified(format!("o{}", i)),
                descending: item.descending,
            })
            .collect();

        Ok(SelectPlan {
            statement: SelectStmt {
                branches: cores,
                order_by,
                limit: None,
                offset: None,
            },
            shapes,
            fetches,
        })
    }

    /// All instances of `entity` (polymorphically) whose `column` equals `param`.
    pub fn rows_where(&self, entity_name: &str, column: &str, param: ParamRef) -> Result<SelectPlan> {
        let declared = entity(self.model, entity_name)?;
        let mut cores = Vec::new();
        let mut shape = None;
        for branch in self.branch_types(declared)? {
            let mut scope = Scope::new(self.model, declared, branch, "this", false);
            let entity_shape = scope.project_entity(&declared.name, ROOT)?;
            let mut core = SelectCore::new(TableRef::aliased(branch.table_name()?, ROOT));
            core.and_where(Expr::eq(Expr::column(ROOT, column), Expr::Parameter(param.clone())));
            if let Some(filter) = scope.discriminator_filter(declared, ROOT) {
                core.and_where(filter);
            }
            core.projection = scope.projection;
            cores.push(core);
            shape.get_or_insert(entity_shape);
        }
        let shape = shape.ok_or_else(|| DbError::Translation(format!("'{}' has no concrete types", entity_name)))?;

        Ok(SelectPlan {
            statement: SelectStmt {
                branches: cores,
                order_by: Vec::new(),
                limit: None,
                offset: None,
            },
            shapes: vec![ResultShape::Entity(shape)],
            fetches: Vec::new(),
        })
    }

    fn bulk_update(&self, query: &UpdateQuery) -> Result<Vec<Statement>> {
        let declared = entity(self.model, &query.target.entity)?;
        let mut statements = Vec::new();
        for branch in self.branch_types(declared)? {
            let mut scope = Scope::new(self.model, declared, branch, &query.target.alias, true);
            let mut assignments = Vec::with_capacity(query.assignments.len());
            for (path, value) in &query.assignments {
                let column = scope.assigned_column(path)?;
                let value = scope.scalar(value)?;
                assignments.push(Assignment { column, value });
            }
            let selection = scope.bulk_selection(declared, query.filter.as_ref())?;
            statements.push(Statement::Update(UpdateStmt {
                table: TableRef::aliased(branch.table_name()?, ROOT),
                assignments,
                selection,
            }));
        }
        Ok(statements)
    }

    fn bulk_delete(&self, query: &DeleteQuery) -> Result<Vec<Statement>> {
        let declared = entity(self.model, &query.target.entity)?;
        let mut statements = Vec::new();
        for branch in self.branch_types(declared)? {
            let mut scope = Scope::new(self.model, declared, branch, &query.target.alias, true);
            let selection = scope.bulk_selection(declared, query.filter.as_ref())?;
            statements.push(Statement::Delete(DeleteStmt {
                table: TableRef::aliased(branch.table_name()?, ROOT),
                selection,
            }));
        }
        Ok(statements)
    }

    /// Types whose tables a query over `declared` reads: every concrete
    /// table of a table-per-class hierarchy, otherwise just `declared`.
    fn branch_types(&self, declared: &'m EntityType) -> Result<Vec<&'m EntityType>> {
        if !declared.is_table_per_class() {
            return Ok(vec![declared]);
        }
        let concrete = self.model.concrete_types(&declared.name);
        if concrete.is_empty() {
            return Err(DbError::Translation(format!(
                "'{}' has no concrete types to query",
                declared.name
            )));
        }
        Ok(concrete)
    }
}

fn entity<'m>(model: &'m Metamodel, name: &str) -> Result<&'m EntityType> {
    model
        .entity(name)
        .ok_or_else(|| DbError::Translation(format!("Unknown entity type '{}'", name)))
}

#[derive(Debug, Clone)]
enum Binding {
    Entity { entity: String, sql: String },
    Elements { mapping: ElementMapping, sql: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PathUse {
    Select,
    Condition,
    Bulk,
}

enum PathTarget {
    Column(Expr),
    /// An entity bound to a SQL alias.
    Bound { entity: String, sql: String },
    /// An owning to-one reference read from its foreign key.
    ForeignKey(Expr),
    Embedded { embeddable: String, fields: Vec<(String, Expr)> },
}

enum Operand {
    Value(Expr),
    /// Key of an entity-valued expression.
    Entity(Expr),
    Embedded(Vec<Expr>),
}

struct PendingFetch {
    owner_entity: String,
    owner_sql: String,
    attribute: String,
    target: Binding,
}

/// Translation state of one SELECT branch or bulk statement.
struct Scope<'m> {
    model: &'m Metamodel,
    /// Table-per-class type this branch reads, or the declared type.
    branch: &'m EntityType,
    bulk: bool,
    aliases: HashMap<String, Binding>,
    joins: Vec<Join>,
    implicit: HashMap<(String, String), Binding>,
    projection: Vec<SqlSelectItem>,
    next_table: usize,
}

impl<'m> Scope<'m> {
    /// `alias` is bound to `declared`; columns are read from `branch`'s table.
    fn new(model: &'m Metamodel, declared: &EntityType, branch: &'m EntityType, alias: &str, bulk: bool) -> Self {
        let mut aliases = HashMap::new();
        aliases.insert(
            alias.to_string(),
            Binding::Entity {
                entity: declared.name.clone(),
                sql: ROOT.to_string(),
            },
        );
        Self {
            model,
            branch,
            bulk,
            aliases,
            joins: Vec::new(),
            implicit: HashMap::new(),
            projection: Vec::new(),
            next_table: 1,
        }
    }

    fn entity(&self, name: &str) -> Result<&'m EntityType> {
        entity(self.model, name)
    }

    fn next_alias(&mut self) -> String {
        let alias = format!("t{}", self.next_table);
        self.next_table += 1;
        alias
    }

    fn project(&mut self, expr: Expr) -> usize {
        let idx = self.projection.len();
        self.projection.push(SqlSelectItem::aliased(expr, format!("c{}", idx)));
        idx
    }

    fn select_core(
        &mut self,
        query: &SelectQuery,
        declared: &'m EntityType,
    ) -> Result<(SelectCore, Vec<ResultShape>, Vec<FetchShape>)> {
        let mut pending = Vec::new();
        for join in &query.joins {
            if let Some(fetch) = self.explicit_join(join)? {
                pending.push(fetch);
            }
        }

        let mut shapes = Vec::with_capacity(query.items.len());
        for item in &query.items {
            shapes.push(self.select_item(item)?);
        }

        let mut fetches = Vec::with_capacity(pending.len());
        for fetch in pending {
            let owner = self.project_entity(&fetch.owner_entity, &fetch.owner_sql)?;
            let target = match &fetch.target {
                Binding::Entity { entity, sql } => FetchTarget::Entity(self.project_entity(entity, sql)?),
                Binding::Elements { mapping, sql } => {
                    let columns = mapping
                        .shape
                        .columns()
                        .into_iter()
                        .map(|column| self.project(Expr::column(sql.as_str(), column)))
                        .collect();
                    let position = mapping
                        .position_column()
                        .map(|column| self.project(Expr::column(sql.as_str(), column)));
                    FetchTarget::Elements { columns, position }
                }
            };
            fetches.push(FetchShape {
                owner,
                attribute: fetch.attribute,
                target,
            });
        }

        let mut selection = match &query.filter {
            Some(filter) => Some(self.scalar(filter)?),
            None => None,
        };
        if let Some(filter) = self.discriminator_filter(declared, ROOT) {
            selection = Some(match selection {
                Some(existing) => Expr::and(existing, filter),
                None => filter,
            });
        }

        let mut order_keys = Vec::with_capacity(query.order_by.len());
        for (i, item) in query.order_by.iter().enumerate() {
            let key = self.scalar(&item.expr)?;
            order_keys.push(SqlSelectItem::aliased(key, format!("o{}", i)));
        }

        let mut projection = std::mem::take(&mut self.projection);
        projection.extend(order_keys);

        let core = SelectCore {
            distinct: query.distinct,
            projection,
            from: TableRef::aliased(self.branch.table_name()?, ROOT),
            joins: std::mem::take(&mut self.joins),
            selection,
        };
        Ok((core, shapes, fetches))
    }

    fn select_item(&mut self, item: &SelectItem) -> Result<ResultShape> {
        match item {
            SelectItem::Expr(expr) => self.item_shape(expr),
            SelectItem::Constructor { class, args } => {
                let args = args.iter().map(|arg| self.item_shape(arg)).collect::<Result<Vec<_>>>()?;
                Ok(ResultShape::Constructor {
                    class: class.clone(),
                    args,
                })
            }
        }
    }

    fn item_shape(&mut self, expr: &QueryExpr) -> Result<ResultShape> {
        let QueryExpr::Path(segments) = expr else {
            let value = self.scalar(expr)?;
            return Ok(ResultShape::Scalar(self.project(value)));
        };
        match self.resolve_path(segments, PathUse::Select)? {
            PathTarget::Column(column) | PathTarget::ForeignKey(column) => Ok(ResultShape::Scalar(self.project(column))),
            PathTarget::Bound { entity, sql } => Ok(ResultShape::Entity(self.project_entity(&entity, &sql)?)),
            PathTarget::Embedded { embeddable, fields } => {
                let fields = fields
                    .into_iter()
                    .map(|(field, column)| (field, self.project(column)))
                    .collect();
                Ok(ResultShape::Embedded { embeddable, fields })
            }
        }
    }

    /// Project every column an instance of `entity_name` (or any subtype)
    /// can have.
    fn project_entity(&mut self, entity_name: &str, sql: &str) -> Result<EntityShape> {
        let entity = self.entity(entity_name)?;
        let columns = self.model.polymorphic_columns(&entity.name);
        let union_branch = entity.is_table_per_class();
        let own_columns = self.branch.columns();

        let start = self.projection.len();
        for column in &columns {
            let present = !union_branch || own_columns.iter().any(|c| c.eq_ignore_ascii_case(column));
            let expr = if present {
                Expr::column(sql, column.as_str())
            } else {
                Expr::Literal(Value::Null)
            };
            self.project(expr);
        }

        let tag = if union_branch {
            TypeTag::Branch(self.project(Expr::literal(self.branch.name.as_str())))
        } else if let Some(column) = entity.discriminator_column() {
            TypeTag::Discriminator(column.to_string())
        } else {
            TypeTag::Fixed(entity.name.clone())
        };

        Ok(EntityShape {
            entity: entity.name.clone(),
            start,
            columns,
            tag,
        })
    }

    /// Restricts a single-table subtype to the rows of its concrete types.
    fn discriminator_filter(&self, entity: &EntityType, sql: &str) -> Option<Expr> {
        let column = entity.discriminator_column()?;
        if entity.name == entity.root {
            return None;
        }
        let values: Vec<Expr> = self
            .model
            .concrete_types(&entity.name)
            .into_iter()
            .filter_map(|e| e.discriminator.as_deref().map(Expr::literal))
            .collect();
        if values.is_empty() {
            return Some(Expr::literal(false));
        }
        Some(Expr::InList {
            expr: Box::new(Expr::column(sql, column)),
            list: values,
            negated: false,
        })
    }

    // ------------------------------------------------------------------------
    // Joins
    // ------------------------------------------------------------------------

    fn explicit_join(&mut self, join: &JoinClause) -> Result<Option<PendingFetch>> {
        let Some((attribute_name, owner_path)) = join.path.split_last() else {
            return Err(DbError::Translation("Empty join path".into()));
        };
        let PathTarget::Bound { entity: owner_entity, sql: owner_sql } = self.resolve_path(owner_path, PathUse::Select)?
        else {
            return Err(DbError::Translation(format!(
                "'{}' does not denote an entity",
                owner_path.join(".")
            )));
        };
        let owner = self.entity(&owner_entity)?;
        let attribute = owner.attribute(attribute_name).ok_or_else(|| {
            DbError::Translation(format!("'{}' has no attribute '{}'", owner.name, attribute_name))
        })?;

        let kind = match join.join_type {
            JoinType::Inner => JoinKind::Inner,
            JoinType::Left => JoinKind::LeftOuter,
        };
        let binding = self.join_attribute(owner, &owner_sql, attribute, kind)?;

        if let Some(alias) = &join.alias {
            if self.aliases.contains_key(alias) {
                return Err(DbError::Translation(format!(
                    "Identification variable '{}' is declared twice",
                    alias
                )));
            }
            self.aliases.insert(alias.clone(), binding.clone());
        }

        Ok(join.fetch.then(|| PendingFetch {
            owner_entity,
            owner_sql,
            attribute: attribute.name.clone(),
            target: binding,
        }))
    }

    fn implicit_join(&mut self, owner: &EntityType, owner_sql: &str, attribute: &Attribute) -> Result<Binding> {
        let cache_key = (owner_sql.to_string(), attribute.name.clone());
        if let Some(binding) = self.implicit.get(&cache_key) {
            return Ok(binding.clone());
        }
        let binding = self.join_attribute(owner, owner_sql, attribute, JoinKind::Inner)?;
        self.implicit.insert(cache_key, binding.clone());
        Ok(binding)
    }

    fn join_attribute(
        &mut self,
        owner: &EntityType,
        owner_sql: &str,
        attribute: &Attribute,
        kind: JoinKind,
    ) -> Result<Binding> {
        let owner_key = Expr::column(owner_sql, owner.id.column.as_str());

        let rel = match &attribute.kind {
            AttributeKind::Elements(mapping) => {
                let sql = self.next_alias();
                self.joins.push(Join {
                    kind,
                    table: TableRef::aliased(&mapping.table, &sql),
                    on: Expr::eq(Expr::column(sql.as_str(), mapping.join_column.as_str()), owner_key),
                });
                return Ok(Binding::Elements {
                    mapping: mapping.clone(),
                    sql,
                });
            }
            AttributeKind::Relationship(rel) => rel,
            _ => {
                return Err(DbError::Translation(format!(
                    "'{}.{}' is not an association",
                    owner.name, attribute.name
                )));
            }
        };

        let target = self.entity(&rel.target)?;
        if target.is_table_per_class() {
            return Err(DbError::Translation(format!(
                "'{}.{}' targets the table-per-class hierarchy '{}', which cannot be joined",
                owner.name, attribute.name, target.name
            )));
        }
        let sql = self.next_alias();
        let target_key = Expr::column(sql.as_str(), target.id.column.as_str());

        let mut on = match &rel.mapping {
            RelationshipMapping::JoinColumn { column: Some(fk) } => {
                Expr::eq(target_key, Expr::column(owner_sql, fk.as_str()))
            }
            RelationshipMapping::TargetJoinColumn { column } => {
                Expr::eq(Expr::column(sql.as_str(), column.as_str()), owner_key)
            }
            RelationshipMapping::JoinTable {
                table,
                join_column,
                inverse_column,
            } => {
                let link = self.next_alias();
                self.joins.push(Join {
                    kind,
                    table: TableRef::aliased(table, &link),
                    on: Expr::eq(Expr::column(link.as_str(), join_column.as_str()), owner_key),
                });
                Expr::eq(target_key, Expr::column(link.as_str(), inverse_column.as_str()))
            }
            RelationshipMapping::MappedBy { attribute: owning } => {
                let owning_rel = target.attribute(owning).and_then(Attribute::relationship);
                match owning_rel.map(|r| &r.mapping) {
                    Some(RelationshipMapping::JoinColumn { column: Some(fk) }) => {
                        Expr::eq(Expr::column(sql.as_str(), fk.as_str()), owner_key)
                    }
                    Some(RelationshipMapping::JoinTable {
                        table,
                        join_column,
                        inverse_column,
                    }) => {
                        let link = self.next_alias();
                        self.joins.push(Join {
                            kind,
                            table: TableRef::aliased(table, &link),
                            on: Expr::eq(Expr::column(link.as_str(), inverse_column.as_str()), owner_key),
                        });
                        Expr::eq(target_key, Expr::column(link.as_str(), join_column.as_str()))
                    }
                    _ => {
                        return Err(DbError::Translation(format!(
                            "Cannot join '{}.{}' through '{}.{}'",
                            owner.name, attribute.name, target.name, owning
                        )));
                    }
                }
            }
            RelationshipMapping::JoinColumn { column: None } => {
                return Err(DbError::Mapping(format!(
                    "'{}.{}' has no resolved join column",
                    owner.name, attribute.name
                )));
            }
        };
        if let Some(filter) = self.discriminator_filter(target, &sql) {
            on = Expr::and(on, filter);
        }

        self.joins.push(Join {
            kind,
            table: TableRef::aliased(target.table_name()?, &sql),
            on,
        });
        Ok(Binding::Entity {
            entity: target.name.clone(),
            sql,
        })
    }

    // ------------------------------------------------------------------------
    // Paths
    // ------------------------------------------------------------------------

    fn resolve_path(&mut self, segments: &[String], usage: PathUse) -> Result<PathTarget> {
        let Some((alias, rest)) = segments.split_first() else {
            return Err(DbError::Translation("Empty path".into()));
        };
        let Some(binding) = self.aliases.get(alias).cloned() else {
            if let Some(constant) = self.model.enum_constant(segments) {
                return Ok(PathTarget::Column(Expr::Literal(Value::Text(constant?))));
            }
            return Err(DbError::Translation(format!("Unknown identification variable '{}'", alias)));
        };

        match binding {
            Binding::Elements { mapping, sql } => element_path(&mapping, &sql, rest, segments),
            Binding::Entity { entity, sql } => self.entity_path(&entity, sql, rest, segments, usage),
        }
    }

    fn entity_path(
        &mut self,
        entity_name: &str,
        sql: String,
        rest: &[String],
        segments: &[String],
        usage: PathUse,
    ) -> Result<PathTarget> {
        let mut current = self.entity(entity_name)?;
        let mut sql = sql;
        if rest.is_empty() {
            return Ok(PathTarget::Bound {
                entity: current.name.clone(),
                sql,
            });
        }

        let not_navigable = |segment: &str| {
            DbError::Translation(format!(
                "Cannot navigate past '{}' in '{}'",
                segment,
                segments.join(".")
            ))
        };

        for (i, segment) in rest.iter().enumerate() {
            let last = i + 1 == rest.len();

            if current.is_id(segment) {
                if !last {
                    return Err(not_navigable(segment.as_str()));
                }
                return Ok(PathTarget::Column(Expr::column(sql.as_str(), current.id.column.as_str())));
            }

            let attribute = current.attribute(segment).ok_or_else(|| {
                DbError::Translation(format!("'{}' has no attribute '{}'", current.name, segment))
            })?;

            match &attribute.kind {
                AttributeKind::Basic(basic) => {
                    if !last {
                        return Err(not_navigable(segment.as_str()));
                    }
                    return Ok(PathTarget::Column(Expr::column(sql.as_str(), basic.column.as_str())));
                }
                AttributeKind::Embedded(embedded) => {
                    if last {
                        return Ok(PathTarget::Embedded {
                            embeddable: embedded.embeddable.clone(),
                            fields: embedded
                                .fields
                                .iter()
                                .map(|f| (f.field.clone(), Expr::column(sql.as_str(), f.column.as_str())))
                                .collect(),
                        });
                    }
                    let field_name = &rest[i + 1];
                    if i + 2 != rest.len() {
                        return Err(not_navigable(field_name.as_str()));
                    }
                    let field = embedded.fields.iter().find(|f| &f.field == field_name).ok_or_else(|| {
                        DbError::Translation(format!(
                            "Embeddable '{}' has no field '{}'",
                            embedded.embeddable, field_name
                        ))
                    })?;
                    return Ok(PathTarget::Column(Expr::column(sql.as_str(), field.column.as_str())));
                }
                AttributeKind::Relationship(rel) if !rel.cardinality.is_collection() => {
                    let target = self.entity(&rel.target)?;
                    if let Some(fk) = attribute.join_column() {
                        if i + 2 == rest.len() && target.is_id(&rest[i + 1]) {
                            return Ok(PathTarget::Column(Expr::column(sql.as_str(), fk)));
                        }
                        if last && usage != PathUse::Select {
                            return Ok(PathTarget::ForeignKey(Expr::column(sql.as_str(), fk)));
                        }
                    }
                    if usage == PathUse::Bulk {
                        return Err(DbError::Translation(format!(
                            "Bulk statements cannot navigate '{}'",
                            segments.join(".")
                        )));
                    }
                    let Binding::Entity { entity, sql: joined } = self.implicit_join(current, &sql, attribute)? else {
                        return Err(not_navigable(segment.as_str()));
                    };
                    current = self.entity(&entity)?;
                    sql = joined;
                    if last {
                        return Ok(PathTarget::Bound { entity, sql });
                    }
                }
                AttributeKind::Relationship(_) | AttributeKind::Elements(_) => {
                    if !last || usage != PathUse::Select {
                        return Err(DbError::Translation(format!(
                            "Collection-valued path '{}' must be joined explicitly",
                            segments.join(".")
                        )));
                    }
                    return match self.implicit_join(current, &sql, attribute)? {
                        Binding::Entity { entity, sql } => Ok(PathTarget::Bound { entity, sql }),
                        Binding::Elements { mapping, sql } => element_path(&mapping, &sql, &[], segments),
                    };
                }
            }
        }

        Err(DbError::Translation(format!("Cannot resolve '{}'", segments.join("."))))
    }

    /// Column a bulk `SET` assigns.
    fn assigned_column(&mut self, path: &[String]) -> Result<String> {
        match self.resolve_path(path, PathUse::Bulk)? {
            PathTarget::Column(Expr::Column { name, .. }) | PathTarget::ForeignKey(Expr::Column { name, .. }) => Ok(name),
            _ => Err(DbError::Translation(format!(
                "'{}' cannot be assigned in a bulk update",
                path.join(".")
            ))),
        }
    }

    fn bulk_selection(&mut self, declared: &'m EntityType, filter: Option<&QueryExpr>) -> Result<Option<Expr>> {
        let mut selection = match filter {
            Some(filter) => Some(self.scalar(filter)?),
            None => None,
        };
        if let Some(restriction) = self.discriminator_filter(declared, ROOT) {
            selection = Some(match selection {
                Some(existing) => Expr::and(existing, restriction),
                None => restriction,
            });
        }
        Ok(selection)
    }

    // ------------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------------

    fn scalar(&mut self, expr: &QueryExpr) -> Result<Expr> {
        match self.operand(expr)? {
            Operand::Value(e) | Operand::Entity(e) => Ok(e),
            Operand::Embedded(_) => Err(DbError::Translation(
                "Embedded values can only be tested with IS [NOT] NULL".into(),
            )),
        }
    }

    fn operand(&mut self, expr: &QueryExpr) -> Result<Operand> {
        let usage = if self.bulk { PathUse::Bulk } else { PathUse::Condition };
        Ok(match expr {
            QueryExpr::Path(segments) => match self.resolve_path(segments, usage)? {
                PathTarget::Column(column) => Operand::Value(column),
                PathTarget::ForeignKey(column) => Operand::Entity(column),
                PathTarget::Bound { entity, sql } => {
                    let entity = self.entity(&entity)?;
                    Operand::Entity(Expr::column(sql.as_str(), entity.id.column.as_str()))
                }
                PathTarget::Embedded { fields, .. } => Operand::Embedded(fields.into_iter().map(|(_, e)| e).collect()),
            },
            QueryExpr::Literal(value) => Operand::Value(Expr::Literal(value.clone())),
            QueryExpr::Parameter(param) => Operand::Value(Expr::Parameter(param.clone())),
            QueryExpr::Binary { left, op, right } => Operand::Value(self.binary(left, *op, right)?),
            QueryExpr::Not(inner) => Operand::Value(Expr::UnaryOp {
                op: UnaryOperator::Not,
                expr: Box::new(self.scalar(inner)?),
            }),
            QueryExpr::Negate(inner) => Operand::Value(Expr::UnaryOp {
                op: UnaryOperator::Minus,
                expr: Box::new(self.scalar(inner)?),
            }),
            QueryExpr::IsNull { expr, negated } => match self.operand(expr)? {
                Operand::Embedded(fields) => {
                    let all_null = fields
                        .into_iter()
                        .map(Expr::is_null)
                        .reduce(Expr::and)
                        .unwrap_or(Expr::literal(true));
                    Operand::Value(if *negated {
                        Expr::UnaryOp {
                            op: UnaryOperator::Not,
                            expr: Box::new(all_null),
                        }
                    } else {
                        all_null
                    })
                }
                Operand::Value(e) | Operand::Entity(e) => Operand::Value(Expr::IsNull {
                    expr: Box::new(e),
                    negated: *negated,
                }),
            },
            QueryExpr::Like { expr, pattern, negated } => Operand::Value(Expr::Like {
                expr: Box::new(self.scalar(expr)?),
                pattern: Box::new(self.scalar(pattern)?),
                negated: *negated,
            }),
            QueryExpr::InList { expr, list, negated } => {
                let (expr, list) = match expr.as_ref() {
                    QueryExpr::Type(alias) => (
                        self.type_of(alias)?,
                        list.iter().map(|e| self.type_operand(e)).collect::<Result<Vec<_>>>()?,
                    ),
                    other => (
                        self.scalar(other)?,
                        list.iter().map(|e| self.scalar(e)).collect::<Result<Vec<_>>>()?,
                    ),
                };
                Operand::Value(Expr::InList {
                    expr: Box::new(expr),
                    list,
                    negated: *negated,
                })
            }
            QueryExpr::Between {
                expr,
                low,
                high,
                negated,
            } => Operand::Value(Expr::Between {
                expr: Box::new(self.scalar(expr)?),
                low: Box::new(self.scalar(low)?),
                high: Box::new(self.scalar(high)?),
                negated: *negated,
            }),
            QueryExpr::Aggregate { func, arg, distinct } => {
                let arg = match arg {
                    Some(arg) => Some(Box::new(self.scalar(arg)?)),
                    None => None,
                };
                Operand::Value(Expr::Aggregate {
                    func: *func,
                    arg,
                    distinct: *distinct,
                })
            }
            QueryExpr::Type(alias) => Operand::Value(self.type_of(alias)?),
        })
    }

    fn binary(&mut self, left: &QueryExpr, op: BinaryOperator, right: &QueryExpr) -> Result<Expr> {
        if let QueryExpr::Type(alias) = left {
            return Ok(Expr::binary(self.type_of(alias)?, op, self.type_operand(right)?));
        }
        if let QueryExpr::Type(alias) = right {
            return Ok(Expr::binary(self.type_operand(left)?, op, self.type_of(alias)?));
        }
        Ok(Expr::binary(self.scalar(left)?, op, self.scalar(right)?))
    }

    /// `TYPE(alias)`: the discriminator column, or the concrete type name
    /// when rows of one table all share a type.
    fn type_of(&self, alias: &str) -> Result<Expr> {
        let Some(Binding::Entity { entity, sql }) = self.aliases.get(alias) else {
            return Err(DbError::Translation(format!(
                "TYPE() needs an entity identification variable, got '{}'",
                alias
            )));
        };
        let entity = self.entity(entity)?;
        if let Some(column) = entity.discriminator_column() {
            return Ok(Expr::column(sql.as_str(), column));
        }
        if entity.is_table_per_class() {
            return Ok(Expr::literal(self.branch.name.as_str()));
        }
        Ok(Expr::literal(entity.name.as_str()))
    }

    /// An entity type name compared against `TYPE(...)`.
    fn type_operand(&mut self, expr: &QueryExpr) -> Result<Expr> {
        match expr {
            QueryExpr::Path(segments) if segments.len() == 1 && !self.aliases.contains_key(&segments[0]) => {
                let entity = self.entity(&segments[0])?;
                let name = match (entity.discriminator_column(), &entity.discriminator) {
                    (Some(_), Some(value)) => value.as_str(),
                    _ => entity.name.as_str(),
                };
                Ok(Expr::literal(name))
            }
            other => self.scalar(other),
        }
    }
}

fn element_path(mapping: &ElementMapping, sql: &str, rest: &[String], segments: &[String]) -> Result<PathTarget> {
    match (&mapping.shape, rest) {
        (ElementShape::Basic { column, .. }, []) => Ok(PathTarget::Column(Expr::column(sql, column.as_str()))),
        (ElementShape::Embeddable { embeddable, fields }, []) => Ok(PathTarget::Embedded {
            embeddable: embeddable.clone(),
            fields: fields
                .iter()
                .map(|f| (f.field.clone(), Expr::column(sql, f.column.as_str())))
                .collect(),
        }),
        (ElementShape::Embeddable { embeddable, fields }, [field_name]) => {
            let field = fields.iter().find(|f| &f.field == field_name).ok_or_else(|| {
                DbError::Translation(format!("Embeddable '{}' has no field '{}'", embeddable, field_name))
            })?;
            Ok(PathTarget::Column(Expr::column(sql, field.column.as_str())))
        }
        _ => Err(DbError::Translation(format!("Cannot resolve '{}'", segments.join(".")))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::DataType;
    use crate::metadata::{
        ElementCollectionDescriptor, EmbeddableDescriptor, EntityDescriptor, InheritanceStrategy, KeyStrategy,
        RelationshipDescriptor,
    };

    fn model() -> Metamodel {
        Metamodel::builder()
            .embeddable(
                EmbeddableDescriptor::new("Address")
                    .field("city", DataType::Text)
                    .field("street", DataType::Text),
            )
            .entity(
                EntityDescriptor::new("Team")
                    .id("id", DataType::Integer, KeyStrategy::Sequence)
                    .basic("name", DataType::Text)
                    .relationship(RelationshipDescriptor::one_to_many("members", "Member", "team")),
            )
            .entity(
                EntityDescriptor::new("Member")
                    .id("id", DataType::Integer, KeyStrategy::Sequence)
                    .basic("username", DataType::Text)
                    .basic("age", DataType::Integer)
                    .embedded("address", "Address")
                    .relationship(RelationshipDescriptor::many_to_one("team", "Team").join_column("TEAM_ID"))
                    .element_collection(ElementCollectionDescriptor::basic(
                        "favoriteFoods",
                        "FAVORITE_FOOD",
                        "MEMBER_ID",
                        "FOOD_NAME",
                        DataType::Text,
                    )),
            )
            .entity(
                EntityDescriptor::new("Item")
                    .abstract_type()
                    .id("id", DataType::Integer, KeyStrategy::Sequence)
                    .basic("name", DataType::Text)
                    .basic("price", DataType::Integer)
                    .root(InheritanceStrategy::TablePerClass),
            )
            .entity(EntityDescriptor::new("Book").subtype_of("Item").basic("author", DataType::Text))
            .entity(EntityDescriptor::new("Movie").subtype_of("Item").basic("director", DataType::Text))
            .entity(
                EntityDescriptor::new("Product")
                    .abstract_type()
                    .id("id", DataType::Integer, KeyStrategy::Sequence)
                    .basic("name", DataType::Text)
                    .root(InheritanceStrategy::SingleTable {
                        discriminator_column: "DTYPE".into(),
                    }),
            )
            .entity(
                EntityDescriptor::new("Album")
                    .subtype_of("Product")
                    .discriminator("A")
                    .basic("artist", DataType::Text),
            )
            .entity(EntityDescriptor::new("Shirt").subtype_of("Product").discriminator("S"))
            .build()
            .unwrap()
    }

    fn select(model: &Metamodel, query: &str) -> SelectPlan {
        match Translator::new(model).translate(query).unwrap() {
            Translated::Select(plan) => plan,
            Translated::Bulk(_) => panic!("expected a select"),
        }
    }

    #[test]
    fn test_entity_select_with_implicit_join() {
        let model = model();
        let plan = select(&model, "SELECT m FROM Member m WHERE m.team.name = :teamName ORDER BY m.age DESC");

        assert_eq!(
            plan.statement.to_string(),
            "SELECT t0.id AS c0, t0.username AS c1, t0.age AS c2, t0.city AS c3, t0.street AS c4, \
             t0.TEAM_ID AS c5, t0.age AS o0 FROM Member t0 INNER JOIN Team t1 ON (t1.id = t0.TEAM_ID) \
             WHERE (t1.name = :teamName) ORDER BY o0 DESC"
        );
        let [ResultShape::Entity(shape)] = plan.shapes.as_slice() else {
            panic!("expected one entity");
        };
        assert_eq!(shape.start, 0);
        assert_eq!(shape.tag, TypeTag::Fixed("Member".into()));
    }

    #[test]
    fn test_entity_comparison_uses_foreign_key() {
        let model = model();
        let plan = select(&model, "SELECT m FROM Member m WHERE m.team = :team AND m.team.id = 3");
        let core = &plan.statement.branches[0];
        assert!(core.joins.is_empty());
        assert_eq!(
            core.selection.as_ref().unwrap().to_string(),
            "((t0.TEAM_ID = :team) AND (t0.TEAM_ID = 3))"
        );
    }

    #[test]
    fn test_projections() {
        let model = model();
        let plan = select(
            &model,
            "SELECT NEW jpql.MemberDTO(m.username, m.age), m.address, COUNT(m) FROM Member m",
        );
        assert_eq!(plan.shapes.len(), 3);
        assert_eq!(
            plan.shapes[0],
            ResultShape::Constructor {
                class: "jpql.MemberDTO".into(),
                args: vec![ResultShape::Scalar(0), ResultShape::Scalar(1)]
            }
        );
        assert_eq!(
            plan.shapes[1],
            ResultShape::Embedded {
                embeddable: "Address".into(),
                fields: vec![("city".into(), 2), ("street".into(), 3)]
            }
        );
        assert_eq!(plan.shapes[2], ResultShape::Scalar(4));
    }

    #[test]
    fn test_table_per_class_union() {
        let model = model();
        let plan = select(&model, "SELECT i FROM Item i WHERE i.price > 10 ORDER BY i.name");

        assert_eq!(plan.statement.branches.len(), 2);
        let book = plan.statement.branches[0].to_string();
        let movie = plan.statement.branches[1].to_string();
        assert!(book.contains("NULL AS c4"), "{}", book);
        assert!(book.contains("'Book' AS c5"), "{}", book);
        assert!(book.contains("FROM Book t0"), "{}", book);
        assert!(movie.contains("t0.director AS c4"), "{}", movie);
        assert!(movie.contains("'Movie' AS c5"), "{}", movie);

        let [ResultShape::Entity(shape)] = plan.shapes.as_slice() else {
            panic!("expected one entity");
        };
        assert_eq!(shape.columns, vec!["id", "name", "price", "author", "director"]);
        assert_eq!(shape.tag, TypeTag::Branch(5));
    }

    #[test]
    fn test_single_table_subtype_filter() {
        let model = model();
        let plan = select(&model, "SELECT a FROM Album a WHERE TYPE(a) IN (Album, Shirt)");
        let core = &plan.statement.branches[0];
        assert_eq!(core.from.name, "Product");
        assert_eq!(
            core.selection.as_ref().unwrap().to_string(),
            "(t0.DTYPE IN ('A', 'S') AND t0.DTYPE IN ('A'))"
        );
        let [ResultShape::Entity(shape)] = plan.shapes.as_slice() else {
            panic!("expected one entity");
        };
        assert_eq!(shape.tag, TypeTag::Discriminator("DTYPE".into()));
    }

    #[test]
    fn test_collection_joins_and_fetch() {
        let model = model();
        let plan = select(
            &model,
            "SELECT t FROM Team t JOIN FETCH t.members WHERE t.name = 'team1'",
        );
        let core = &plan.statement.branches[0];
        assert_eq!(core.joins.len(), 1);
        assert_eq!(core.joins[0].on.to_string(), "(t1.TEAM_ID = t0.id)");
        assert_eq!(plan.fetches.len(), 1);
        assert_eq!(plan.fetches[0].attribute, "members");

        let plan = select(&model, "SELECT f FROM Member m JOIN m.favoriteFoods f WHERE m.username = 'kim'");
        assert_eq!(plan.shapes, vec![ResultShape::Scalar(0)]);
        assert_eq!(plan.statement.branches[0].joins[0].table.name, "FAVORITE_FOOD");
    }

    #[test]
    fn test_translation_errors() {
        let model = model();
        let translator = Translator::new(&model);
        for query in [
            "SELECT x FROM Nope x",
            "SELECT m FROM Member m WHERE m.nickname = 'a'",
            "SELECT m FROM Member m WHERE z.username = 'a'",
            "SELECT m FROM Member m WHERE m.favoriteFoods = 'a'",
            "SELECT m FROM Member m WHERE m.username.length = 3",
            "SELECT COUNT(i) FROM Item i",
            "SELECT m FROM Member m WHERE m.address = :a",
            "UPDATE Member m SET m.team.name = 'x'",
        ] {
            assert!(
                matches!(translator.translate(query), Err(DbError::Translation(_))),
                "{} should not translate",
                query
            );
        }
    }

    #[test]
    fn test_bulk_statements() {
        let model = model();
        let translator = Translator::new(&model);

        let Translated::Bulk(statements) = translator
            .translate("UPDATE Member m SET m.age = m.age + 1 WHERE m.team = :team")
            .unwrap()
        else {
            panic!("expected bulk statements");
        };
        assert_eq!(
            statements[0].to_string(),
            "UPDATE Member t0 SET age = (t0.age + 1) WHERE (t0.TEAM_ID = :team)"
        );

        let Translated::Bulk(statements) = translator.translate("DELETE FROM Item i WHERE i.price < 5").unwrap() else {
            panic!("expected bulk statements");
        };
        let tables: Vec<&str> = statements.iter().filter_map(Statement::table_name).collect();
        assert_eq!(tables, vec!["Book", "Movie"]);
    }

    #[test]
    fn test_enum_literals() {
        let model = Metamodel::builder()
            .enumeration(crate::metadata::EnumDescriptor::new("jpql.MemberType", &["ADMIN", "USER"]))
            .entity(
                EntityDescriptor::new("Member")
                    .id("id", DataType::Integer, KeyStrategy::Sequence)
                    .enumerated("type", "jpql.MemberType"),
            )
            .build()
            .unwrap();

        for query in [
            "SELECT m FROM Member m WHERE m.type = jpql.MemberType.ADMIN",
            "SELECT m FROM Member m WHERE m.type = MemberType.ADMIN",
        ] {
            let plan = select(&model, query);
            assert_eq!(
                plan.statement.branches[0].selection.as_ref().unwrap().to_string(),
                "(t0.type = 'ADMIN')"
            );
        }

        let translator = Translator::new(&model);
        for query in [
            "SELECT m FROM Member m WHERE m.type = jpql.MemberType.GUEST",
            "SELECT m FROM Member m WHERE m.type = jpql.Unknown.ADMIN",
        ] {
            assert!(
                matches!(translator.translate(query), Err(DbError::Translation(_))),
                "{} should not translate",
                query
            );
        }
    }

    #[test]
    fn test_rows_where() {
        let model = model();
        let plan = Translator::new(&model)
            .rows_where("Member", "TEAM_ID", ParamRef::Positional(1))
            .unwrap();
        assert_eq!(
            plan.statement.branches[0].selection.as_ref().unwrap().to_string(),
            "(t0.TEAM_ID = $1)"
        );
    }
}
