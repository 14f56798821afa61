//! Building blocks for dataset-specific derived columns.
//!
//! Every helper reads the frame in its current row order, which the driver has
//! already put into canonical order, and appends or replaces whole columns.
//! A helper whose inputs were elided earlier leaves the frame untouched.

use std::collections::HashMap;

use chrono::{Datelike, NaiveDate};
use polars::prelude::*;
use tracing::debug;

use super::rules::round_to;
use crate::table::{read_cells, Cell, ColumnType};

/// Lower bound (inclusive) of a right-open bin. The last bin is unbounded.
#[derive(Debug, Clone, Copy)]
pub struct Bin {
    pub lower: f64,
    pub label: &'static str,
}

const MONTH_ABBREVIATIONS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

fn has_column(frame: &DataFrame, name: &str) -> bool {
    let present = frame.get_column_names().iter().any(|c| c.as_str() == name);
    if !present {
        debug!(column = name, "derived input column absent, skipping");
    }
    present
}

fn float_values(frame: &DataFrame, name: &str) -> PolarsResult<Vec<Option<f64>>> {
    let column = frame.column(name)?.cast(&DataType::Float64)?;
    Ok(column.f64()?.iter().collect())
}

fn temporal_dates(frame: &DataFrame, name: &str) -> PolarsResult<Vec<Option<NaiveDate>>> {
    let column = frame.column(name)?;
    let column_type = match column.dtype() {
        DataType::Date => ColumnType::Date,
        _ => ColumnType::Timestamp,
    };
    Ok(read_cells(column, column_type)?
        .iter()
        .map(Cell::as_date)
        .collect())
}

fn group_keys(frame: &DataFrame, columns: &[&str]) -> PolarsResult<Vec<String>> {
    let mut keys = vec![String::new(); frame.height()];
    for name in columns {
        let column = frame.column(name)?;
        let rendered = column.cast(&DataType::String)?;
        for (key, value) in keys.iter_mut().zip(rendered.str()?.iter()) {
            key.push_str(value.unwrap_or("\u{0}"));
            key.push('\u{1f}');
        }
    }
    Ok(keys)
}

/// First of `candidates` present in the frame.
pub fn first_present<'a>(frame: &DataFrame, candidates: &[&'a str]) -> Option<&'a str> {
    let names = frame.get_column_names();
    candidates
        .iter()
        .copied()
        .find(|candidate| names.iter().any(|c| c.as_str() == *candidate))
}

/// `target = round(source * factor, digits)`.
pub fn scale_column(
    frame: &mut DataFrame,
    source: &str,
    target: &str,
    factor: f64,
    digits: u32,
) -> PolarsResult<()> {
    if !has_column(frame, source) {
        return Ok(());
    }
    let values: Vec<Option<f64>> = float_values(frame, source)?
        .into_iter()
        .map(|v| v.map(|v| round_to(v * factor, digits)))
        .collect();
    frame.with_column(Series::new(target.into(), values))?;
    Ok(())
}

/// Assigns each value to a named bin plus a 1-based ordinal for sorting.
/// Nulls and values below the first bin get nulls.
pub fn bucket(
    frame: &mut DataFrame,
    source: &str,
    label_column: &str,
    id_column: &str,
    bins: &[Bin],
) -> PolarsResult<()> {
    if !has_column(frame, source) {
        return Ok(());
    }
    let values = float_values(frame, source)?;
    let mut labels: Vec<Option<&str>> = Vec::with_capacity(values.len());
    let mut ids: Vec<Option<i64>> = Vec::with_capacity(values.len());
    for value in values {
        let slot = value.and_then(|v| bins.iter().rposition(|bin| v >= bin.lower));
        labels.push(slot.map(|i| bins[i].label));
        ids.push(slot.map(|i| i as i64 + 1));
    }
    frame.with_column(Series::new(label_column.into(), labels))?;
    frame.with_column(Series::new(id_column.into(), ids))?;
    Ok(())
}

/// Calendar date of a timestamp column.
pub fn date_of(frame: &mut DataFrame, source: &str, target: &str) -> PolarsResult<()> {
    if !has_column(frame, source) {
        return Ok(());
    }
    let dates: Vec<Cell> = temporal_dates(frame, source)?
        .into_iter()
        .map(|d| d.map_or(Cell::Null, Cell::Date))
        .collect();
    let series = crate::table::build_series(target, ColumnType::Date, &dates)?;
    frame.with_column(series)?;
    Ok(())
}

/// Adds `year`, `month_numeric`, `month` (abbreviated name), ISO
/// `week_of_year` and the ISO week-numbering `iso_year` from a date or
/// timestamp column. Weeks group on `iso_year`: 2024-12-30 is week 1 of 2025.
pub fn date_parts(frame: &mut DataFrame, source: &str) -> PolarsResult<()> {
    if !has_column(frame, source) {
        return Ok(());
    }
    let dates = temporal_dates(frame, source)?;
    let years: Vec<Option<i64>> = dates.iter().map(|d| d.map(|d| d.year() as i64)).collect();
    let months: Vec<Option<i64>> = dates.iter().map(|d| d.map(|d| d.month() as i64)).collect();
    let names: Vec<Option<&str>> = dates
        .iter()
        .map(|d| d.map(|d| MONTH_ABBREVIATIONS[d.month0() as usize]))
        .collect();
    let weeks: Vec<Option<i64>> = dates
        .iter()
        .map(|d| d.map(|d| d.iso_week().week() as i64))
        .collect();
    let iso_years: Vec<Option<i64>> = dates
        .iter()
        .map(|d| d.map(|d| d.iso_week().year() as i64))
        .collect();

    frame.with_column(Series::new("year".into(), years))?;
    frame.with_column(Series::new("month_numeric".into(), months))?;
    frame.with_column(Series::new("month".into(), names))?;
    frame.with_column(Series::new("week_of_year".into(), weeks))?;
    frame.with_column(Series::new("iso_year".into(), iso_years))?;
    Ok(())
}

/// Running total of `value` within each group, in frame order.
/// `cumulative` includes the current row; `prior` is the total before it.
/// Null values contribute nothing but still receive totals.
pub fn cumulative_by_group(
    frame: &mut DataFrame,
    value: &str,
    group_by: &[&str],
    cumulative: &str,
    prior: &str,
) -> PolarsResult<()> {
    if !has_column(frame, value) || !group_by.iter().all(|g| has_column(frame, g)) {
        return Ok(());
    }
    let values = float_values(frame, value)?;
    let keys = group_keys(frame, group_by)?;

    let mut totals: HashMap<&str, f64> = HashMap::new();
    let mut running = Vec::with_capacity(values.len());
    let mut before = Vec::with_capacity(values.len());
    for (key, value) in keys.iter().zip(values) {
        let total = totals.entry(key.as_str()).or_insert(0.0);
        before.push(round_to(*total, 2));
        *total += value.unwrap_or(0.0);
        running.push(round_to(*total, 2));
    }

    frame.with_column(Series::new(cumulative.into(), running))?;
    frame.with_column(Series::new(prior.into(), before))?;
    Ok(())
}

/// Elapsed time between two timestamp columns as decimal hours and as
/// `HH:MM:SS` text.
pub fn duration_between(
    frame: &mut DataFrame,
    start: &str,
    end: &str,
    hours_column: &str,
    formatted_column: &str,
) -> PolarsResult<()> {
    if !has_column(frame, start) || !has_column(frame, end) {
        return Ok(());
    }
    let starts = read_cells(frame.column(start)?, ColumnType::Timestamp)?;
    let ends = read_cells(frame.column(end)?, ColumnType::Timestamp)?;

    let mut hours: Vec<Option<f64>> = Vec::with_capacity(starts.len());
    let mut formatted: Vec<Option<String>> = Vec::with_capacity(starts.len());
    for (s, e) in starts.iter().zip(&ends) {
        let seconds = match (s.as_timestamp(), e.as_timestamp()) {
            (Some(s), Some(e)) if e >= s => Some((e - s).num_seconds()),
            _ => None,
        };
        hours.push(seconds.map(|secs| round_to(secs as f64 / 3600.0, 1)));
        formatted.push(seconds.map(format_hms));
    }

    frame.with_column(Series::new(hours_column.into(), hours))?;
    frame.with_column(Series::new(
        formatted_column.into(),
        formatted.iter().map(|v| v.as_deref()).collect::<Vec<Option<&str>>>(),
    ))?;
    Ok(())
}

pub fn format_hms(total_seconds: i64) -> String {
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;
    format!("{hours:02}:{minutes:02}:{seconds:02}")
}
