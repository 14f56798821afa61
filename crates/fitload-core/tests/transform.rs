use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use chrono::NaiveDate;
use fitload_core::aggregator::{RawRecord, RawRecordSet};
use fitload_core::table::{Cell, CleanTable, ColumnType};
use fitload_core::transform::{transform, transformer_for, DatasetTransformer, TransformError};
use serde_json::{json, Value};

fn records(values: Vec<Value>) -> RawRecordSet {
    let source: Arc<Path> = Arc::from(Path::new("fixture.json"));
    RawRecordSet {
        records: values
            .into_iter()
            .enumerate()
            .map(|(index, value)| RawRecord {
                source: Arc::clone(&source),
                index,
                fields: value.as_object().cloned().expect("fixture records are objects"),
            })
            .collect(),
        ..RawRecordSet::default()
    }
}

fn column(table: &CleanTable, name: &str) -> Vec<Cell> {
    let index = table
        .column_names()
        .iter()
        .position(|n| *n == name)
        .unwrap_or_else(|| panic!("column {name} missing from {:?}", table.column_names()));
    table.column_cells().expect("cells").swap_remove(index)
}

fn transformer(code: &str) -> &'static dyn DatasetTransformer {
    transformer_for(code).expect("registered transformer")
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

fn epoch_ms(y: i32, m: u32, d: u32, h: u32) -> i64 {
    date(y, m, d)
        .and_hms_opt(h, 0, 0)
        .expect("valid time")
        .and_utc()
        .timestamp_millis()
}

#[test]
fn registry_knows_every_shipped_dataset() {
    for code in [
        "summarized_activities",
        "sleep_data",
        "acute_training_load",
        "maxmet_data",
        "race_predictions",
        "training_history",
        "uds_data",
    ] {
        assert_eq!(transformer(code).code_identifier(), code);
        assert!(!transformer(code).description().is_empty());
    }
    assert!(transformer_for("heart_rate_variability").is_none());
}

#[test]
fn sleep_rows_are_flattened_converted_and_sorted() -> Result<()> {
    let raw = records(vec![
        json!({
            "calendarDate": "2024-01-02",
            "sleepStartTimestampGMT": "2024-01-01T22:30:00.0",
            "sleepEndTimestampGMT": "2024-01-02T06:45:30.0",
            "deepSleepSeconds": 5400,
            "remSleepSeconds": "3960",
            "sleepScores": {"overallScore": 82, "insight": "POSITIVE_RESTFUL"}
        }),
        json!({
            "calendarDate": "2024-01-01",
            "deepSleepSeconds": 3600,
            "sleepScores": {"overallScore": 70}
        }),
    ]);

    let output = transform(transformer("sleep_data"), raw)?;
    let table = &output.table;
    assert_eq!(table.len(), 2);

    assert_eq!(
        column(table, "calendar_date"),
        vec![Cell::Date(date(2024, 1, 1)), Cell::Date(date(2024, 1, 2))]
    );
    assert_eq!(
        column(table, "deep_sleep_hours"),
        vec![Cell::Float(1.0), Cell::Float(1.5)]
    );
    assert_eq!(column(table, "rem_sleep_hours"), vec![Cell::Null, Cell::Float(1.1)]);
    assert_eq!(
        column(table, "overall_score"),
        vec![Cell::Integer(70), Cell::Integer(82)]
    );
    assert_eq!(
        column(table, "insight"),
        vec![Cell::Text("NONE".into()), Cell::Text("POSITIVE_RESTFUL".into())]
    );
    assert_eq!(
        column(table, "feedback"),
        vec![Cell::Text("NONE".into()), Cell::Text("NONE".into())]
    );
    assert_eq!(
        column(table, "sleep_duration_hours"),
        vec![Cell::Null, Cell::Float(8.3)]
    );
    assert_eq!(
        column(table, "sleep_duration_formatted"),
        vec![Cell::Null, Cell::Text("08:15:30".into())]
    );

    let types: Vec<(String, ColumnType)> = table
        .columns()
        .iter()
        .map(|c| (c.name.clone(), c.column_type))
        .collect();
    assert!(types.contains(&("calendar_date".into(), ColumnType::Date)));
    assert!(types.contains(&("sleep_start_gmt".into(), ColumnType::Timestamp)));
    assert!(output.stats.elided_columns.contains(&"light_sleep_hours".to_string()));
    Ok(())
}

#[test]
fn activities_derive_over_canonical_order_and_dedup_by_id() -> Result<()> {
    let raw = records(vec![
        json!({
            "activityId": 1,
            "startTimeLocal": epoch_ms(2024, 1, 3, 7),
            "distance": 500_000,
            "duration": 1_800_000
        }),
        json!({
            "activityId": 2,
            "startTimeLocal": epoch_ms(2024, 1, 1, 7),
            "distance": 1_000_000,
            "duration": 3_600_000
        }),
        json!({
            "activityId": 1,
            "startTimeLocal": epoch_ms(2024, 1, 3, 7)
        }),
        json!({
            "activityId": "not-a-number",
            "startTimeLocal": epoch_ms(2024, 1, 2, 7),
            "duration": 600_000
        }),
    ]);

    let output = transform(transformer("summarized_activities"), raw)?;
    let table = &output.table;

    assert_eq!(column(table, "activity_id"), vec![Cell::Integer(2), Cell::Integer(1)]);
    assert_eq!(
        column(table, "distance_group"),
        vec![Cell::Text("5-7 miles".into()), Cell::Text("3-5 miles".into())]
    );
    assert_eq!(
        column(table, "distance_group_id"),
        vec![Cell::Integer(3), Cell::Integer(2)]
    );
    assert_eq!(
        column(table, "activity_date"),
        vec![Cell::Date(date(2024, 1, 1)), Cell::Date(date(2024, 1, 3))]
    );
    assert_eq!(column(table, "week_of_year"), vec![Cell::Integer(1), Cell::Integer(1)]);
    assert_eq!(
        column(table, "month"),
        vec![Cell::Text("Jan".into()), Cell::Text("Jan".into())]
    );
    assert_eq!(
        column(table, "weekly_cumulative_minutes"),
        vec![Cell::Float(60.0), Cell::Float(90.0)]
    );
    assert_eq!(
        column(table, "weekly_minutes_prior"),
        vec![Cell::Float(0.0), Cell::Float(60.0)]
    );

    let stats = &output.stats;
    assert_eq!(stats.input_records, 4);
    assert_eq!(stats.incomplete_rows, 1);
    assert_eq!(stats.coercion_failures.get("activity_id"), Some(&1));
    assert_eq!(stats.duplicates_removed, 1);
    assert_eq!(stats.output_rows, 2);
    assert!(stats.elided_columns.contains(&"calories".to_string()));
    Ok(())
}

#[test]
fn weeks_spanning_new_year_group_by_iso_week_year() -> Result<()> {
    let raw = records(vec![
        json!({"activityId": 1, "startTimeLocal": epoch_ms(2024, 1, 1, 7), "duration": 3_600_000}),
        json!({"activityId": 2, "startTimeLocal": epoch_ms(2024, 12, 30, 7), "duration": 1_800_000}),
    ]);

    let output = transform(transformer("summarized_activities"), raw)?;
    let table = &output.table;

    assert_eq!(column(table, "week_of_year"), vec![Cell::Integer(1), Cell::Integer(1)]);
    assert_eq!(column(table, "iso_year"), vec![Cell::Integer(2024), Cell::Integer(2025)]);
    assert_eq!(column(table, "year"), vec![Cell::Integer(2024), Cell::Integer(2024)]);
    assert_eq!(
        column(table, "weekly_cumulative_minutes"),
        vec![Cell::Float(60.0), Cell::Float(30.0)]
    );
    assert_eq!(
        column(table, "weekly_minutes_prior"),
        vec![Cell::Float(0.0), Cell::Float(0.0)]
    );
    Ok(())
}

#[test]
fn canonical_order_is_stable_with_missing_dates_last() -> Result<()> {
    let raw = records(vec![
        json!({"activityId": 9, "startTimeLocal": epoch_ms(2024, 3, 2, 7), "duration": 600_000}),
        json!({"activityId": 5, "duration": 600_000}),
        json!({"activityId": 7, "startTimeLocal": epoch_ms(2024, 3, 1, 7), "duration": 600_000}),
        json!({"activityId": 3, "startTimeLocal": epoch_ms(2024, 3, 1, 7), "duration": 600_000}),
    ]);

    let output = transform(transformer("summarized_activities"), raw)?;
    assert_eq!(
        column(&output.table, "activity_id"),
        vec![Cell::Integer(7), Cell::Integer(3), Cell::Integer(9), Cell::Integer(5)]
    );
    assert_eq!(output.stats.duplicates_removed, 0);
    Ok(())
}

#[test]
fn activities_without_local_time_sort_on_gmt() -> Result<()> {
    let raw = records(vec![
        json!({"activityId": 1, "startTimeGmt": epoch_ms(2024, 1, 3, 7), "duration": 1_800_000}),
        json!({"activityId": 2, "startTimeGmt": epoch_ms(2024, 1, 1, 7), "duration": 3_600_000}),
    ]);

    let output = transform(transformer("summarized_activities"), raw)?;
    let table = &output.table;

    assert!(output.stats.elided_columns.contains(&"start_time_local".to_string()));
    assert_eq!(column(table, "activity_id"), vec![Cell::Integer(2), Cell::Integer(1)]);
    assert_eq!(
        column(table, "activity_date"),
        vec![Cell::Date(date(2024, 1, 1)), Cell::Date(date(2024, 1, 3))]
    );
    assert_eq!(
        column(table, "weekly_cumulative_minutes"),
        vec![Cell::Float(60.0), Cell::Float(90.0)]
    );
    Ok(())
}

#[test]
fn acute_training_load_filters_and_requires_ratio() -> Result<()> {
    let raw = records(vec![
        json!({"timestamp": epoch_ms(2024, 2, 1, 12), "acwrStatus": "NONE", "dailyAcuteChronicWorkloadRatio": 0.0}),
        json!({"timestamp": epoch_ms(2024, 2, 2, 12), "acwrStatus": "OPTIMAL", "dailyAcuteChronicWorkloadRatio": 1.1}),
        json!({"timestamp": epoch_ms(2024, 2, 3, 12), "acwrStatus": "HIGH"}),
    ]);

    let output = transform(transformer("acute_training_load"), raw)?;
    assert_eq!(output.stats.filtered_records, 1);
    assert_eq!(output.stats.incomplete_rows, 1);
    assert_eq!(
        column(&output.table, "calendar_date"),
        vec![Cell::Date(date(2024, 2, 2))]
    );
    Ok(())
}

#[test]
fn identical_daily_records_collapse() -> Result<()> {
    let day = json!({"calendarDate": "2024-03-01", "totalSteps": 9000});
    let raw = records(vec![day.clone(), day, json!({"calendarDate": "2024-03-02"})]);

    let output = transform(transformer("uds_data"), raw)?;
    assert_eq!(output.table.len(), 2);
    assert_eq!(output.stats.duplicates_removed, 1);
    assert_eq!(
        column(&output.table, "total_steps"),
        vec![Cell::Integer(9000), Cell::Null]
    );
    Ok(())
}

#[test]
fn nothing_surviving_is_an_error() {
    let raw = records(vec![json!({"deepSleepSeconds": 100}), json!({"calendarDate": ""})]);
    let err = transform(transformer("sleep_data"), raw).expect_err("no usable rows");
    assert!(matches!(err, TransformError::NoRows { input: 2, .. }));
}
