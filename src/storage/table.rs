use crate::core::{Column, DbError, Result, Row, Schema, Snapshot, Value};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MvccRow {
    pub row: Row,
    pub xmin: u64,         // Transaction ID that created this version
    pub xmax: Option<u64>, // Transaction ID that deleted/superseded this version
}

/// A table whose rows are chains of MVCC versions.
///
/// Index entries are never removed: an index maps a value to every row id that
/// ever carried it, and lookups re-check the visible version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Table {
    schema: TableSchema,
    rows: BTreeMap<usize, Vec<MvccRow>>,
    next_row_id: usize,
    indexes: HashMap<String, BTreeMap<Value, BTreeSet<usize>>>,
}

impl Table {
    pub fn new(schema: TableSchema) -> Self {
        let indexes = schema
            .schema()
            .columns()
            .iter()
            .filter(|col| col.primary_key || col.unique || col.references.is_some())
            .map(|col| (col.name.to_ascii_lowercase(), BTreeMap::new()))
            .collect();

        Self {
            schema,
            rows: BTreeMap::new(),
            next_row_id: 0,
            indexes,
        }
    }

    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    pub fn insert(&mut self, row: Row, snapshot: &Snapshot) -> Result<usize> {
        self.validate_row(&row)?;
        self.check_uniqueness(&row, None, snapshot)?;

        let id = self.next_row_id;
        self.next_row_id += 1;

        self.update_indexes(id, &row);
        self.rows.insert(
            id,
            vec![MvccRow {
                row,
                xmin: snapshot.tx_id,
                xmax: None,
            }],
        );

        Ok(id)
    }

    /// Replace the visible version of row `id` with `new_row`.
    ///
    /// `read` is the transaction's begin snapshot, `write` reflects the current
    /// transaction table and is used for conflict and uniqueness checks.
    pub fn update(&mut self, id: usize, new_row: Row, read: &Snapshot, write: &Snapshot) -> Result<()> {
        self.validate_row(&new_row)?;
        self.check_uniqueness(&new_row, Some(id), write)?;

        let latest = self.lock_latest_version(id, read, write)?;
        if let Some(versions) = self.rows.get_mut(&id) {
            versions[latest].xmax = Some(write.tx_id);
            versions.push(MvccRow {
                row: new_row.clone(),
                xmin: write.tx_id,
                xmax: None,
            });
        }
        self.update_indexes(id, &new_row);
        Ok(())
    }

    pub fn delete(&mut self, id: usize, read: &Snapshot, write: &Snapshot) -> Result<()> {
        let latest = self.lock_latest_version(id, read, write)?;
        if let Some(versions) = self.rows.get_mut(&id) {
            versions[latest].xmax = Some(write.tx_id);
        }
        Ok(())
    }

    /// Find the newest non-aborted version of `id` and make sure this
    /// transaction may supersede it (first updater wins).
    fn lock_latest_version(&self, id: usize, read: &Snapshot, write: &Snapshot) -> Result<usize> {
        let versions = self.rows.get(&id).ok_or_else(|| {
            DbError::ExecutionError(format!("Row {} not found in '{}'", id, self.schema.name()))
        })?;

        let latest = versions
            .iter()
            .rposition(|version| !write.is_aborted(version.xmin))
            .ok_or_else(|| {
                DbError::ExecutionError(format!("Row {} not found in '{}'", id, self.schema.name()))
            })?;
        let version = &versions[latest];

        if !self.is_visible(version, read) {
            return Err(DbError::ExecutionError(format!(
                "Write-write conflict on table '{}': row was changed by a concurrent transaction",
                self.schema.name()
            )));
        }
        if let Some(xmax) = version.xmax
            && xmax != write.tx_id
            && !write.is_aborted(xmax)
        {
            return Err(DbError::ExecutionError(format!(
                "Write-write conflict on table '{}': row is locked by transaction {}",
                self.schema.name(),
                xmax
            )));
        }

        Ok(latest)
    }

    pub fn scan(&self, snapshot: &Snapshot) -> Vec<Row> {
        self.scan_with_ids(snapshot)
            .into_iter()
            .map(|(_, row)| row)
            .collect()
    }

    pub fn scan_with_ids(&self, snapshot: &Snapshot) -> Vec<(usize, Row)> {
        let mut results = Vec::new();
        for (id, versions) in &self.rows {
            if let Some(version) = versions.iter().rev().find(|v| self.is_visible(v, snapshot)) {
                results.push((*id, version.row.clone()));
            }
        }
        results
    }

    pub fn get_visible_row(&self, id: usize, snapshot: &Snapshot) -> Option<Row> {
        self.rows.get(&id).and_then(|versions| {
            versions
                .iter()
                .rev()
                .find(|v| self.is_visible(v, snapshot))
                .map(|v| v.row.clone())
        })
    }

    /// Visible rows whose `column` equals `value`, using an index when present.
    pub fn lookup(&self, column: &str, value: &Value, snapshot: &Snapshot) -> Result<Vec<Row>> {
        let col_idx = self.column_index(column)?;

        if let Some(index) = self.indexes.get(&column.to_ascii_lowercase()) {
            let Some(ids) = index.get(value) else {
                return Ok(Vec::new());
            };
            return Ok(ids
                .iter()
                .filter_map(|id| self.get_visible_row(*id, snapshot))
                .filter(|row| &row[col_idx] == value)
                .collect());
        }

        Ok(self
            .scan(snapshot)
            .into_iter()
            .filter(|row| &row[col_idx] == value)
            .collect())
    }

    /// Rows with `column = value` that a writer must still account for:
    /// versions whose creator has not aborted and whose deletion is neither
    /// committed nor made by `write`'s own transaction. Uncommitted inserts of
    /// other transactions are included.
    pub fn lookup_live(&self, column: &str, value: &Value, write: &Snapshot) -> Result<Vec<Row>> {
        let col_idx = self.column_index(column)?;
        Ok(self
            .versions_with(col_idx, value)
            .filter(|version| self.is_version_live(version, write))
            .map(|version| version.row.clone())
            .collect())
    }

    /// Rows with `column = value` that are committed (or written by `write`'s
    /// own transaction) and that no transaction has deleted. A pending update
    /// that keeps the value does not count as a deletion.
    pub fn lookup_stable(&self, column: &str, value: &Value, write: &Snapshot) -> Result<Vec<Row>> {
        let col_idx = self.column_index(column)?;
        let mut rows = Vec::new();
        for versions in self.chains_with(col_idx, value) {
            let stable = versions.iter().find(|version| {
                if &version.row[col_idx] != value {
                    return false;
                }
                let created = version.xmin == write.tx_id || write.is_committed(version.xmin);
                let kept = match version.xmax {
                    None => true,
                    Some(xmax) if write.is_aborted(xmax) => true,
                    Some(xmax) => versions
                        .iter()
                        .any(|next| next.xmin == xmax && &next.row[col_idx] == value),
                };
                created && kept
            });
            if let Some(version) = stable {
                rows.push(version.row.clone());
            }
        }
        Ok(rows)
    }

    fn versions_with<'t>(&'t self, col_idx: usize, value: &'t Value) -> impl Iterator<Item = &'t MvccRow> + 't {
        self.chains_with(col_idx, value)
            .flat_map(|versions| versions.iter())
            .filter(move |version| &version.row[col_idx] == value)
    }

    /// Version chains of rows that may carry `value` in column `col_idx`.
    fn chains_with(&self, col_idx: usize, value: &Value) -> impl Iterator<Item = &Vec<MvccRow>> + '_ {
        let ids: Vec<usize> = match self.schema.schema().columns().get(col_idx) {
            Some(column) => match self.indexes.get(&column.name.to_ascii_lowercase()) {
                Some(index) => index.get(value).map(|ids| ids.iter().copied().collect()).unwrap_or_default(),
                None => self.rows.keys().copied().collect(),
            },
            None => Vec::new(),
        };
        ids.into_iter().filter_map(|id| self.rows.get(&id))
    }

    fn check_uniqueness(&self, row: &Row, ignore_id: Option<usize>, snapshot: &Snapshot) -> Result<()> {
        for (col_idx, column) in self.schema.schema().columns().iter().enumerate() {
            if !(column.primary_key || column.unique) {
                continue;
            }
            let value = &row[col_idx];
            if value.is_null() {
                continue;
            }

            let candidates: Vec<usize> = match self.indexes.get(&column.name.to_ascii_lowercase()) {
                Some(index) => index.get(value).map(|ids| ids.iter().copied().collect()).unwrap_or_default(),
                None => self.rows.keys().copied().collect(),
            };

            for id in candidates {
                if ignore_id == Some(id) {
                    continue;
                }
                let Some(versions) = self.rows.get(&id) else {
                    continue;
                };
                let conflict = versions
                    .iter()
                    .any(|version| &version.row[col_idx] == value && self.is_version_live(version, snapshot));
                if conflict {
                    return Err(DbError::ConstraintViolation(format!(
                        "Unique constraint violation: column '{}.{}' already contains value {}",
                        self.schema.name(),
                        column.name,
                        value
                    )));
                }
            }
        }
        Ok(())
    }

    // A version is a uniqueness candidate unless its creator aborted or its
    // deletion is committed (or performed by this very transaction).
    fn is_version_live(&self, row: &MvccRow, snapshot: &Snapshot) -> bool {
        if snapshot.is_aborted(row.xmin) {
            return false;
        }
        match row.xmax {
            None => true,
            Some(xmax) if xmax == snapshot.tx_id => false,
            Some(xmax) if snapshot.is_aborted(xmax) => true,
            Some(xmax) => !snapshot.is_committed(xmax),
        }
    }

    fn is_visible(&self, row: &MvccRow, snapshot: &Snapshot) -> bool {
        if row.xmin == snapshot.tx_id {
            return row.xmax != Some(snapshot.tx_id);
        }

        if !snapshot.is_committed(row.xmin) {
            return false;
        }

        match row.xmax {
            None => true,
            Some(xmax) if xmax == snapshot.tx_id => false,
            Some(xmax) => !snapshot.is_committed(xmax),
        }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_index(&self, column: &str) -> Result<usize> {
        self.schema
            .schema()
            .find_column_index(column)
            .ok_or_else(|| DbError::ColumnNotFound(column.to_string(), self.schema.name().to_string()))
    }

    fn validate_row(&self, row: &Row) -> Result<()> {
        let columns = self.schema.schema().columns();
        if row.len() != columns.len() {
            return Err(DbError::ExecutionError(format!(
                "Expected {} columns, got {}",
                columns.len(),
                row.len()
            )));
        }
        for (column, value) in columns.iter().zip(row.iter()) {
            column.validate(value)?;
        }
        Ok(())
    }

    fn update_indexes(&mut self, id: usize, row: &Row) {
        for (col_name, index) in &mut self.indexes {
            if let Some(col_idx) = self.schema.schema().find_column_index(col_name) {
                index.entry(row[col_idx].clone()).or_default().insert(id);
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableSchema {
    name: String,
    schema: Schema,
}

impl TableSchema {
    pub fn new(name: impl Into<String>, columns: Vec<Column>) -> Self {
        Self {
            name: name.into(),
            schema: Schema::new(columns),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn column_names(&self) -> Vec<String> {
        self.schema.columns().iter().map(|c| c.name.clone()).collect()
    }
}
