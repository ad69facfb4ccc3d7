use super::plan::WriteKind;
use std::fmt;

/// What a flush wrote.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlushReport {
    pub inserts: usize,
    pub updates: usize,
    pub deletes: usize,
    pub collection_writes: usize,
    /// Rendered SQL of every statement, in issue order.
    pub statements: Vec<String>,
}

impl FlushReport {
    pub fn record(&mut self, kind: WriteKind, sql: String) {
        match kind {
            WriteKind::Insert => self.inserts += 1,
            WriteKind::Update => self.updates += 1,
            WriteKind::Delete => self.deletes += 1,
            WriteKind::Collection => self.collection_writes += 1,
        }
        self.statements.push(sql);
    }

    pub fn statement_count(&self) -> usize {
        self.statements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }
}

impl fmt::Display for FlushReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} inserts, {} updates, {} deletes, {} collection writes",
            self.inserts, self.updates, self.deletes, self.collection_writes
        )
    }
}
