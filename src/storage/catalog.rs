use super::TableSchema;
use crate::core::{DbError, ForeignKey, Result};
use std::collections::HashMap;
use std::sync::Arc;

/// Table metadata. Cheap to clone; every change produces a new catalog
/// (copy-on-write) so readers never block.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    tables: Arc<HashMap<String, TableSchema>>,
}

/// A foreign key column pointing at some table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundReference {
    pub table: String,
    pub column: String,
    pub target: ForeignKey,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(self, schema: TableSchema) -> Result<Self> {
        let key = schema.name().to_ascii_lowercase();
        if self.tables.contains_key(&key) {
            return Err(DbError::TableExists(schema.name().to_string()));
        }

        for column in schema.schema().columns() {
            if let Some(fk) = &column.references {
                let self_reference = fk.table.eq_ignore_ascii_case(schema.name());
                if !self_reference && !self.table_exists(&fk.table) {
                    return Err(DbError::TableNotFound(fk.table.clone()));
                }
            }
        }

        let mut tables = (*self.tables).clone();
        tables.insert(key, schema);
        Ok(Self {
            tables: Arc::new(tables),
        })
    }

    pub fn get_table(&self, name: &str) -> Result<&TableSchema> {
        self.tables
            .get(&name.to_ascii_lowercase())
            .ok_or_else(|| DbError::TableNotFound(name.to_string()))
    }

    pub fn table_exists(&self, name: &str) -> bool {
        self.tables.contains_key(&name.to_ascii_lowercase())
    }

    pub fn list_tables(&self) -> Vec<&str> {
        self.tables.values().map(|t| t.name()).collect()
    }

    /// Every foreign key column, in any table, that references `table`.
    pub fn references_to(&self, table: &str) -> Vec<InboundReference> {
        let mut refs = Vec::new();
        for schema in self.tables.values() {
            for column in schema.schema().columns() {
                if let Some(fk) = &column.references
                    && fk.table.eq_ignore_ascii_case(table)
                {
                    refs.push(InboundReference {
                        table: schema.name().to_string(),
                        column: column.name.clone(),
                        target: fk.clone(),
                    });
                }
            }
        }
        refs
    }
}
