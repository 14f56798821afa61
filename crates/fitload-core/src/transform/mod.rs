pub mod coerce;
pub mod datasets;
pub mod dedup;
pub mod derive;
pub mod rules;

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use polars::prelude::*;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::aggregator::{RawRecord, RawRecordSet};
use crate::table::{build_series, normalize_frame, read_cells, Cell, CleanTable, ColumnType};
use coerce::{coerce, Coerced};
use rules::ColumnRule;

#[derive(Debug, Error)]
pub enum TransformError {
    #[error("{dataset}: no rows survived transformation ({input} input records)")]
    NoRows { dataset: &'static str, input: usize },

    #[error("{dataset}: derived step changed the row count from {before} to {after}")]
    RowCountChanged {
        dataset: &'static str,
        before: usize,
        after: usize,
    },

    #[error("frame operation failed: {0}")]
    Polars(#[from] PolarsError),
}

/// Per-dataset cleaning rules.
///
/// Implementations only describe the dataset; `transform` runs the steps in
/// their fixed order: projection, coercion, null-column elision, canonical
/// sort and derivation, de-duplication.
pub trait DatasetTransformer: Send + Sync {
    fn code_identifier(&self) -> &'static str;

    fn description(&self) -> &'static str;

    fn columns(&self) -> &'static [ColumnRule];

    /// Date columns establishing canonical row order, in order of
    /// preference. The first one that survived elision is used.
    fn sort_keys(&self) -> &'static [&'static str] {
        &[]
    }

    /// Key columns for keyed de-duplication. Empty means whole-row.
    fn primary_key(&self) -> &'static [&'static str] {
        &[]
    }

    /// Record-level filter applied during projection.
    fn keep_record(&self, _record: &RawRecord) -> bool {
        true
    }

    /// Adds derived columns. Must not add, remove or reorder rows.
    fn derive(&self, frame: DataFrame) -> Result<DataFrame, TransformError> {
        Ok(frame)
    }
}

impl std::fmt::Debug for dyn DatasetTransformer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatasetTransformer")
            .field("code", &self.code_identifier())
            .finish()
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct TransformStats {
    pub input_records: usize,
    pub filtered_records: usize,
    pub incomplete_rows: usize,
    pub coercion_failures: BTreeMap<String, usize>,
    pub elided_columns: Vec<String>,
    pub duplicates_removed: usize,
    pub output_rows: usize,
}

#[derive(Debug)]
pub struct TransformOutput {
    pub table: CleanTable,
    pub stats: TransformStats,
}

static TRANSFORMERS: Lazy<Vec<&'static dyn DatasetTransformer>> = Lazy::new(|| {
    vec![
        &datasets::activities::SummarizedActivities as &dyn DatasetTransformer,
        &datasets::sleep::SleepData as &dyn DatasetTransformer,
        &datasets::daily::ACUTE_TRAINING_LOAD as &dyn DatasetTransformer,
        &datasets::daily::MAXMET as &dyn DatasetTransformer,
        &datasets::daily::RACE_PREDICTIONS as &dyn DatasetTransformer,
        &datasets::daily::TRAINING_HISTORY as &dyn DatasetTransformer,
        &datasets::daily::UDS as &dyn DatasetTransformer,
    ]
});

pub fn all_transformers() -> &'static [&'static dyn DatasetTransformer] {
    TRANSFORMERS.as_slice()
}

pub fn transformer_for(code: &str) -> Option<&'static dyn DatasetTransformer> {
    all_transformers()
        .iter()
        .find(|t| t.code_identifier() == code)
        .copied()
}

/// Runs every step for one dataset and hands back the clean table.
pub fn transform(
    transformer: &dyn DatasetTransformer,
    raw: RawRecordSet,
) -> Result<TransformOutput, TransformError> {
    let dataset = transformer.code_identifier();
    let rules = transformer.columns();
    let mut stats = TransformStats {
        input_records: raw.len(),
        ..TransformStats::default()
    };

    // 1 + 2: projection onto canonical columns, then typed coercion.
    let mut data: Vec<Vec<Cell>> = vec![Vec::with_capacity(raw.len()); rules.len()];
    let mut order: Vec<usize> = Vec::with_capacity(raw.len());
    for (position, record) in raw.records.into_iter().enumerate() {
        if !transformer.keep_record(&record) {
            stats.filtered_records += 1;
            continue;
        }

        let mut row = Vec::with_capacity(rules.len());
        for rule in rules {
            let value = rule
                .sources
                .iter()
                .filter_map(|key| record.lookup(key))
                .find(|v| !v.is_null());
            match coerce(value, rule) {
                Coerced::Value(cell) => row.push(cell),
                Coerced::Failed => {
                    *stats
                        .coercion_failures
                        .entry(rule.name.to_string())
                        .or_insert(0) += 1;
                    row.push(Cell::Null);
                }
            }
        }

        if let Some(missing) = rules
            .iter()
            .zip(&row)
            .find(|(rule, cell)| rule.required && cell.is_null())
            .map(|(rule, _)| rule.name)
        {
            debug!(
                dataset,
                path = %record.source.display(),
                index = record.index,
                column = missing,
                "dropping row without required value"
            );
            stats.incomplete_rows += 1;
            continue;
        }

        for (column, cell) in data.iter_mut().zip(row) {
            column.push(cell);
        }
        order.push(position);
    }

    for (column, failures) in &stats.coercion_failures {
        warn!(dataset, column = column.as_str(), failures, "values could not be coerced");
    }

    if order.is_empty() {
        return Err(TransformError::NoRows {
            dataset,
            input: stats.input_records,
        });
    }

    let mut columns: Vec<Column> = Vec::with_capacity(rules.len());
    for (rule, cells) in rules.iter().zip(&data) {
        columns.push(build_series(rule.name, rule.column_type, cells)?.into());
    }
    let frame = DataFrame::new(columns)?;

    // 3: columns the source never provided this run are dropped.
    let height = frame.height();
    let (kept, elided): (Vec<Column>, Vec<Column>) = frame
        .get_columns()
        .iter()
        .cloned()
        .partition(|c| c.null_count() < height);
    stats.elided_columns = elided.iter().map(|c| c.name().to_string()).collect();
    if !stats.elided_columns.is_empty() {
        debug!(dataset, columns = ?stats.elided_columns, "elided all-null columns");
    }
    if kept.is_empty() {
        return Err(TransformError::NoRows {
            dataset,
            input: stats.input_records,
        });
    }
    let frame = DataFrame::new(kept)?;

    // 4: canonical order, then derived columns.
    let (frame, order) = match derive::first_present(&frame, transformer.sort_keys()) {
        Some(key) => sort_canonical(frame, order, key)?,
        None => (frame, order),
    };
    let derived = transformer.derive(frame)?;
    if derived.height() != height {
        return Err(TransformError::RowCountChanged {
            dataset,
            before: height,
            after: derived.height(),
        });
    }
    let (derived, _) = normalize_frame(&derived)?;

    // 5: de-duplication. Unkeyed datasets compare canonical columns only, so
    // order-dependent derived values cannot keep duplicates apart.
    let canonical: Vec<&str> = rules
        .iter()
        .map(|rule| rule.name)
        .filter(|name| !stats.elided_columns.iter().any(|e| e == name))
        .collect();
    let key = match transformer.primary_key() {
        [] => canonical.as_slice(),
        key => key,
    };
    let deduped = dedup::deduplicate_rows(&derived, &order, key)?;
    stats.duplicates_removed = deduped.removed;

    let (frame, defs) = normalize_frame(&deduped.frame)?;
    let table = CleanTable::new(defs, frame)?;
    stats.output_rows = table.len();

    info!(
        dataset,
        input = stats.input_records,
        filtered = stats.filtered_records,
        incomplete = stats.incomplete_rows,
        duplicates = stats.duplicates_removed,
        rows = stats.output_rows,
        columns = table.columns().len(),
        "transformed dataset"
    );

    Ok(TransformOutput { table, stats })
}

/// Stable ascending sort on `key`, nulls last.
fn sort_canonical(
    frame: DataFrame,
    order: Vec<usize>,
    key: &str,
) -> Result<(DataFrame, Vec<usize>), TransformError> {
    let column = frame.column(key)?;
    let column_type = ColumnType::from_dtype(column.dtype());
    let sort_values: Vec<Option<i64>> = read_cells(column, column_type)?
        .iter()
        .map(|cell| {
            cell.as_timestamp()
                .map(|ts| ts.and_utc().timestamp_micros())
                .or_else(|| cell.as_i64())
                .or_else(|| cell.as_f64().map(|v| v as i64))
        })
        .collect();

    let mut permutation: Vec<usize> = (0..frame.height()).collect();
    permutation.sort_by_key(|&row| match sort_values[row] {
        Some(v) => (false, v),
        None => (true, 0),
    });

    let indices = IdxCa::from_vec(
        "idx".into(),
        permutation.iter().map(|&i| i as IdxSize).collect(),
    );
    let sorted = frame.take(&indices)?;
    let order = permutation.iter().map(|&i| order[i]).collect();
    Ok((sorted, order))
}
