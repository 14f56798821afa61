//! Replaces destination tables with freshly transformed rows.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::table::CleanTable;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("`{0}` is not a plain SQL identifier")]
    InvalidIdentifier(String),

    #[error("could not read transformed rows: {0}")]
    Table(#[from] polars::prelude::PolarsError),

    #[error("destination rejected the load: {0}")]
    Rejected(String),
}

/// Table name plus optional schema. Both parts are validated as plain
/// identifiers, so they can be quoted into SQL safely.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableName {
    pub schema: Option<String>,
    pub table: String,
}

impl TableName {
    pub fn new(schema: Option<&str>, table: &str) -> Result<Self, LoadError> {
        if let Some(schema) = schema {
            validate_identifier(schema)?;
        }
        validate_identifier(table)?;
        Ok(Self {
            schema: schema.map(str::to_string),
            table: table.to_string(),
        })
    }

    pub fn quoted(&self) -> String {
        match &self.schema {
            Some(schema) => format!("\"{schema}\".\"{}\"", self.table),
            None => format!("\"{}\"", self.table),
        }
    }
}

impl std::fmt::Display for TableName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.schema {
            Some(schema) => write!(f, "{schema}.{}", self.table),
            None => f.write_str(&self.table),
        }
    }
}

pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

pub fn validate_identifier(name: &str) -> Result<(), LoadError> {
    if is_identifier(name) {
        Ok(())
    } else {
        Err(LoadError::InvalidIdentifier(name.to_string()))
    }
}

/// Where clean tables end up. Implementations must make `replace_table`
/// all-or-nothing: either the table holds exactly the new rows, or it is left
/// as it was.
#[async_trait]
pub trait Destination: Send + Sync {
    /// Empties `table` and inserts every row of `rows`, `batch_size` rows per
    /// statement, inside one transaction. Returns the number of rows inserted.
    async fn replace_table(
        &self,
        table: &TableName,
        rows: &CleanTable,
        batch_size: usize,
    ) -> Result<u64, LoadError>;

    /// Inserts without truncating. Not used by the `replace` strategy.
    async fn append_rows(
        &self,
        table: &TableName,
        rows: &CleanTable,
        batch_size: usize,
    ) -> Result<u64, LoadError>;

    async fn row_count(&self, table: &TableName) -> Result<u64, LoadError>;

    /// Cheap round trip proving the destination is reachable. Returns a
    /// human-readable server description.
    async fn test_connection(&self) -> Result<String, LoadError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadStatus {
    Succeeded,
    Skipped,
    Failed,
    /// Inserted, but the post-load count disagreed or could not be read.
    VerificationFailed,
}

impl LoadStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            LoadStatus::Succeeded => "succeeded",
            LoadStatus::Skipped => "skipped",
            LoadStatus::Failed => "failed",
            LoadStatus::VerificationFailed => "verification_failed",
        }
    }
}

/// How a post-load count mismatch is treated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationPolicy {
    /// Reported as `VerificationFailed`, which counts as success.
    #[default]
    Advisory,
    /// Reported as `Failed`.
    Strict,
}

#[derive(Debug, Clone, Copy)]
pub struct LoadOptions {
    pub batch_size: usize,
    pub verification: VerificationPolicy,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            batch_size: 5000,
            verification: VerificationPolicy::Advisory,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LoadResult {
    pub dataset_name: String,
    pub destination_table: String,
    pub rows_attempted: u64,
    pub rows_loaded: u64,
    pub status: LoadStatus,
    pub error_detail: Option<String>,
}

impl LoadResult {
    pub fn skipped(dataset_name: &str, destination_table: &str, detail: impl Into<String>) -> Self {
        Self {
            dataset_name: dataset_name.to_string(),
            destination_table: destination_table.to_string(),
            rows_attempted: 0,
            rows_loaded: 0,
            status: LoadStatus::Skipped,
            error_detail: Some(detail.into()),
        }
    }

    pub fn failed(dataset_name: &str, destination_table: &str, detail: impl Into<String>) -> Self {
        Self {
            dataset_name: dataset_name.to_string(),
            destination_table: destination_table.to_string(),
            rows_attempted: 0,
            rows_loaded: 0,
            status: LoadStatus::Failed,
            error_detail: Some(detail.into()),
        }
    }
}

/// Truncates and reloads one table, then checks the row count.
///
/// Never returns an error: every failure is folded into the returned
/// `LoadResult` so the caller can move on to the next dataset.
pub async fn load(
    destination: &dyn Destination,
    dataset_name: &str,
    table: &TableName,
    rows: &CleanTable,
    options: LoadOptions,
) -> LoadResult {
    let attempted = rows.len() as u64;
    let mut result = LoadResult {
        dataset_name: dataset_name.to_string(),
        destination_table: table.to_string(),
        rows_attempted: attempted,
        rows_loaded: 0,
        status: LoadStatus::Failed,
        error_detail: None,
    };

    let inserted = match destination
        .replace_table(table, rows, options.batch_size.max(1))
        .await
    {
        Ok(inserted) => inserted,
        Err(err) => {
            error!(dataset = dataset_name, table = %table, error = %err, "load rolled back");
            result.error_detail = Some(err.to_string());
            return result;
        }
    };

    match destination.row_count(table).await {
        Ok(count) if count == attempted => {
            result.rows_loaded = count;
            result.status = LoadStatus::Succeeded;
            info!(dataset = dataset_name, table = %table, rows = count, "table reloaded");
        }
        Ok(count) => {
            let detail = format!(
                "expected {attempted} rows in {table}, found {count} (insert reported {inserted})"
            );
            warn!(dataset = dataset_name, table = %table, expected = attempted, found = count, "row count mismatch after load");
            result.rows_loaded = count;
            result.status = match options.verification {
                VerificationPolicy::Advisory => LoadStatus::VerificationFailed,
                VerificationPolicy::Strict => LoadStatus::Failed,
            };
            result.error_detail = Some(detail);
        }
        Err(err) => {
            warn!(dataset = dataset_name, table = %table, error = %err, "could not verify row count");
            result.rows_loaded = inserted;
            result.status = LoadStatus::VerificationFailed;
            result.error_detail = Some(format!("verification query failed: {err}"));
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifiers_are_plain_sql_names() {
        assert!(is_identifier("sleep_data"));
        assert!(is_identifier("_garmin2"));
        assert!(!is_identifier("2fast"));
        assert!(!is_identifier("sleep-data"));
        assert!(!is_identifier("x\"; DROP TABLE y; --"));
        assert!(!is_identifier(""));
    }

    #[test]
    fn table_names_quote_each_part() -> Result<(), LoadError> {
        let name = TableName::new(Some("garmin"), "uds_data")?;
        assert_eq!(name.quoted(), "\"garmin\".\"uds_data\"");
        assert_eq!(name.to_string(), "garmin.uds_data");
        assert!(TableName::new(Some("bad schema"), "t").is_err());
        Ok(())
    }
}
