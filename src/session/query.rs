use super::unit_of_work::UnitOfWork;
use crate::core::{DbError, Result, Value};
use crate::entity::EntityHandle;
use crate::parser::SqlParserAdapter;
use crate::query::{QueryValue, Translated, Translator};
use crate::sql::{Params, Statement};

enum QuerySource {
    /// Object query text, translated at execution.
    Object(String),
    Native { sql: String, entity: Option<String> },
}

/// A query bound to the unit of work that runs it.
///
/// In [`FlushMode::Auto`](crate::config::FlushMode::Auto) pending changes
/// are flushed before the query runs, so results reflect them.
pub struct Query<'u> {
    unit: &'u mut UnitOfWork,
    source: QuerySource,
    params: Params,
    first_result: Option<usize>,
    max_results: Option<usize>,
}

impl UnitOfWork {
    pub fn create_query(&mut self, query: &str) -> Query<'_> {
        Query::new(self, QuerySource::Object(query.to_string()))
    }

    /// Query registered with the metamodel under `name`.
    pub fn create_named_query(&mut self, name: &str) -> Result<Query<'_>> {
        let query = self
            .model
            .named_query(name)
            .ok_or_else(|| DbError::Mapping(format!("No named query '{}'", name)))?
            .to_string();
        Ok(Query::new(self, QuerySource::Object(query)))
    }

    /// SQL passed to the data source as written. With `entity`, result rows
    /// are materialized as instances of that type.
    pub fn create_native_query(&mut self, sql: &str, entity: Option<&str>) -> Query<'_> {
        Query::new(
            self,
            QuerySource::Native {
                sql: sql.to_string(),
                entity: entity.map(str::to_string),
            },
        )
    }
}

impl<'u> Query<'u> {
    fn new(unit: &'u mut UnitOfWork, source: QuerySource) -> Self {
        Self {
            unit,
            source,
            params: Params::new(),
            first_result: None,
            max_results: None,
        }
    }

    /// Bind `:name`.
    pub fn bind(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.params.set_named(name, value);
        self
    }

    /// Bind `?index` (object queries) or `$index` (native SQL), from 1.
    pub fn bind_positional(mut self, index: usize, value: impl Into<Value>) -> Self {
        self.params.set_positional(index, value);
        self
    }

    /// Bind `:name` to an instance, compared by key.
    pub fn bind_entity(self, name: &str, handle: EntityHandle) -> Result<Self> {
        let key = self.unit.key_of(handle)?;
        Ok(self.bind(name, key))
    }

    pub fn first_result(mut self, offset: usize) -> Self {
        self.first_result = Some(offset);
        self
    }

    pub fn max_results(mut self, limit: usize) -> Self {
        self.max_results = Some(limit);
        self
    }

    /// One value per row: the single select item, or a tuple of them.
    pub async fn result_list(self) -> Result<Vec<QueryValue>> {
        let Query {
            unit,
            source,
            params,
            first_result,
            max_results,
        } = self;

        match source {
            QuerySource::Object(query) => {
                let model = unit.model.clone();
                let mut plan = match Translator::new(&model).translate(&query)? {
                    Translated::Select(plan) => plan,
                    Translated::Bulk(_) => {
                        return Err(DbError::IllegalState(
                            "UPDATE and DELETE queries run through execute_update".into(),
                        ));
                    }
                };
                plan.statement.offset = first_result;
                plan.statement.limit = max_results;
                unit.auto_flush().await?;
                unit.run_select(&plan, &params).await
            }
            QuerySource::Native { sql, entity } => {
                let Statement::Select(mut select) = SqlParserAdapter::new().parse_one(&sql)? else {
                    return Err(DbError::IllegalState(
                        "Native statements other than SELECT run through execute_update".into(),
                    ));
                };
                if first_result.is_some() {
                    select.offset = first_result;
                }
                if max_results.is_some() {
                    select.limit = max_results;
                }
                unit.auto_flush().await?;
                unit.run_native(select, entity.as_deref(), &params).await
            }
        }
    }

    /// `None` for no rows; more than one row is [`DbError::NonUniqueResult`].
    pub async fn single_result(self) -> Result<Option<QueryValue>> {
        let mut results = self.result_list().await?;
        match results.len() {
            0 | 1 => Ok(results.pop()),
            n => Err(DbError::NonUniqueResult(n)),
        }
    }

    /// Run a bulk UPDATE or DELETE and return the number of rows it touched.
    /// Bulk statements bypass the unit of work: tracked instances keep their
    /// state until refreshed.
    pub async fn execute_update(self) -> Result<usize> {
        let Query { unit, source, params, .. } = self;

        let statements = match source {
            QuerySource::Object(query) => {
                let model = unit.model.clone();
                match Translator::new(&model).translate(&query)? {
                    Translated::Bulk(statements) => statements,
                    Translated::Select(_) => {
                        return Err(DbError::IllegalState("SELECT queries run through result_list".into()));
                    }
                }
            }
            QuerySource::Native { sql, .. } => {
                let statement = SqlParserAdapter::new().parse_one(&sql)?;
                if statement.is_query() {
                    return Err(DbError::IllegalState("SELECT queries run through result_list".into()));
                }
                vec![statement]
            }
        };

        unit.auto_flush().await?;
        let mut affected = 0;
        for statement in &statements {
            match unit.round_trip(statement, &params).await {
                Ok(result) => affected += result.affected_rows,
                Err(error) => return unit.fail(error).await,
            }
        }
        Ok(affected)
    }
}
