//! In-process destination for dry runs and tests.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use crate::loader::{Destination, LoadError, TableName};
use crate::table::{Cell, CleanTable, ColumnDef};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoredTable {
    pub columns: Vec<ColumnDef>,
    pub rows: Vec<Vec<Cell>>,
}

/// Keeps every table in memory behind a mutex. Writes are staged and only
/// swapped in once every batch has succeeded, which mirrors the rollback
/// behaviour of the Postgres destination.
#[derive(Debug, Default)]
pub struct MemoryDestination {
    tables: Mutex<HashMap<String, StoredTable>>,
    failing: Mutex<HashSet<String>>,
    count_skew: Mutex<HashMap<String, i64>>,
}

impl MemoryDestination {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every write to `table` fail after its first batch.
    pub fn fail_writes_to(&self, table: &str) {
        if let Ok(mut failing) = self.failing.lock() {
            failing.insert(table.to_string());
        }
    }

    /// Offsets the count reported for `table`, to exercise verification.
    pub fn skew_row_count(&self, table: &str, delta: i64) {
        if let Ok(mut skew) = self.count_skew.lock() {
            skew.insert(table.to_string(), delta);
        }
    }

    /// Pre-populates a table, as if an earlier run had loaded it.
    pub fn seed(&self, table: &str, stored: StoredTable) {
        if let Ok(mut tables) = self.tables.lock() {
            tables.insert(table.to_string(), stored);
        }
    }

    pub fn table(&self, table: &str) -> Option<StoredTable> {
        self.tables.lock().ok()?.get(table).cloned()
    }

    pub fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .tables
            .lock()
            .map(|t| t.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }

    fn tables(&self) -> Result<MutexGuard<'_, HashMap<String, StoredTable>>, LoadError> {
        self.tables
            .lock()
            .map_err(|_| LoadError::Rejected("memory destination lock poisoned".into()))
    }

    fn write(
        &self,
        table: &TableName,
        rows: &CleanTable,
        batch_size: usize,
        truncate: bool,
    ) -> Result<u64, LoadError> {
        let key = table.to_string();
        let fail = self
            .failing
            .lock()
            .map(|f| f.contains(&key))
            .unwrap_or(false);

        let mut staged = if truncate {
            StoredTable::default()
        } else {
            self.tables()?.get(&key).cloned().unwrap_or_default()
        };
        staged.columns = rows.columns().to_vec();

        let all_rows = rows.rows()?;
        for batch in all_rows.chunks(batch_size.max(1)) {
            staged.rows.extend(batch.iter().cloned());
            if fail {
                return Err(LoadError::Rejected(format!(
                    "injected failure after first batch of {key}"
                )));
            }
        }
        if fail {
            return Err(LoadError::Rejected(format!("injected failure writing {key}")));
        }

        self.tables()?.insert(key, staged);
        Ok(all_rows.len() as u64)
    }
}

#[async_trait]
impl Destination for MemoryDestination {
    async fn replace_table(
        &self,
        table: &TableName,
        rows: &CleanTable,
        batch_size: usize,
    ) -> Result<u64, LoadError> {
        self.write(table, rows, batch_size, true)
    }

    async fn append_rows(
        &self,
        table: &TableName,
        rows: &CleanTable,
        batch_size: usize,
    ) -> Result<u64, LoadError> {
        self.write(table, rows, batch_size, false)
    }

    async fn row_count(&self, table: &TableName) -> Result<u64, LoadError> {
        let key = table.to_string();
        let count = self
            .tables()?
            .get(&key)
            .map_or(0, |t| t.rows.len() as i64);
        let skew = self
            .count_skew
            .lock()
            .ok()
            .and_then(|s| s.get(&key).copied())
            .unwrap_or(0);
        Ok((count + skew).max(0) as u64)
    }

    async fn test_connection(&self) -> Result<String, LoadError> {
        Ok("in-memory destination".to_string())
    }
}
