use super::{Table, TableSchema};
use crate::core::{DbError, Result, Row, Snapshot, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Row storage. Each table carries its own lock so writers on different
/// tables never contend.
#[derive(Default)]
pub struct InMemoryStorage {
    tables: HashMap<String, Arc<RwLock<Table>>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_table(&mut self, schema: TableSchema) -> Result<()> {
        let key = schema.name().to_ascii_lowercase();
        if self.tables.contains_key(&key) {
            return Err(DbError::TableExists(schema.name().to_string()));
        }
        self.tables.insert(key, Arc::new(RwLock::new(Table::new(schema))));
        Ok(())
    }

    pub fn get_table(&self, name: &str) -> Result<Arc<RwLock<Table>>> {
        self.tables
            .get(&name.to_ascii_lowercase())
            .cloned()
            .ok_or_else(|| DbError::TableNotFound(name.to_string()))
    }

    pub fn table_exists(&self, name: &str) -> bool {
        self.tables.contains_key(&name.to_ascii_lowercase())
    }

    pub async fn insert_row(&self, table_name: &str, row: Row, snapshot: &Snapshot) -> Result<usize> {
        let handle = self.get_table(table_name)?;
        let mut table = handle.write().await;
        table.insert(row, snapshot)
    }

    pub async fn scan_table(&self, table_name: &str, snapshot: &Snapshot) -> Result<Vec<Row>> {
        let handle = self.get_table(table_name)?;
        let table = handle.read().await;
        Ok(table.scan(snapshot))
    }

    /// Scan with row ids, for UPDATE/DELETE.
    pub async fn scan_table_with_ids(&self, table_name: &str, snapshot: &Snapshot) -> Result<Vec<(usize, Row)>> {
        let handle = self.get_table(table_name)?;
        let table = handle.read().await;
        Ok(table.scan_with_ids(snapshot))
    }

    pub async fn update_row(
        &self,
        table_name: &str,
        id: usize,
        new_row: Row,
        read: &Snapshot,
        write: &Snapshot,
    ) -> Result<()> {
        let handle = self.get_table(table_name)?;
        let mut table = handle.write().await;
        table.update(id, new_row, read, write)
    }

    pub async fn delete_row(&self, table_name: &str, id: usize, read: &Snapshot, write: &Snapshot) -> Result<()> {
        let handle = self.get_table(table_name)?;
        let mut table = handle.write().await;
        table.delete(id, read, write)
    }

    pub async fn lookup(&self, table_name: &str, column: &str, value: &Value, snapshot: &Snapshot) -> Result<Vec<Row>> {
        let handle = self.get_table(table_name)?;
        let table = handle.read().await;
        table.lookup(column, value, snapshot)
    }

    pub async fn lookup_live(&self, table_name: &str, column: &str, value: &Value, write: &Snapshot) -> Result<Vec<Row>> {
        let handle = self.get_table(table_name)?;
        let table = handle.read().await;
        table.lookup_live(column, value, write)
    }

    pub async fn lookup_stable(&self, table_name: &str, column: &str, value: &Value, write: &Snapshot) -> Result<Vec<Row>> {
        let handle = self.get_table(table_name)?;
        let table = handle.read().await;
        table.lookup_stable(column, value, write)
    }

    pub async fn get_schema(&self, table_name: &str) -> Result<TableSchema> {
        let handle = self.get_table(table_name)?;
        let table = handle.read().await;
        Ok(table.schema().clone())
    }

    pub async fn row_count(&self, table_name: &str) -> Result<usize> {
        let handle = self.get_table(table_name)?;
        let table = handle.read().await;
        Ok(table.row_count())
    }
}
