use anyhow::Result;
use fitload_core::loader::{
    load, LoadOptions, LoadStatus, TableName, VerificationPolicy,
};
use fitload_core::memory::{MemoryDestination, StoredTable};
use fitload_core::table::{Cell, CleanTable, ColumnDef, ColumnType};

fn table(rows: i64) -> Result<CleanTable> {
    let columns = vec![
        ColumnDef {
            name: "id".into(),
            column_type: ColumnType::Integer,
        },
        ColumnDef {
            name: "label".into(),
            column_type: ColumnType::Text,
        },
    ];
    let ids: Vec<Cell> = (0..rows).map(Cell::Integer).collect();
    let labels: Vec<Cell> = (0..rows)
        .map(|i| if i % 2 == 0 { Cell::Text(format!("row {i}")) } else { Cell::Null })
        .collect();
    Ok(CleanTable::from_cells(columns, &[ids, labels])?)
}

fn options(batch_size: usize) -> LoadOptions {
    LoadOptions {
        batch_size,
        verification: VerificationPolicy::Advisory,
    }
}

#[tokio::test]
async fn reload_replaces_previous_contents() -> Result<()> {
    let destination = MemoryDestination::new();
    let name = TableName::new(Some("garmin"), "sleep_data")?;

    let first = load(&destination, "sleep_data", &name, &table(7)?, options(3)).await;
    assert_eq!(first.status, LoadStatus::Succeeded);
    assert_eq!(first.rows_loaded, 7);

    let second = load(&destination, "sleep_data", &name, &table(4)?, options(3)).await;
    assert_eq!(second.status, LoadStatus::Succeeded);
    assert_eq!(second.rows_attempted, 4);
    assert_eq!(destination.table("garmin.sleep_data").map(|t| t.rows.len()), Some(4));
    Ok(())
}

#[tokio::test]
async fn failed_write_leaves_old_rows_in_place() -> Result<()> {
    let destination = MemoryDestination::new();
    let name = TableName::new(Some("garmin"), "uds_data")?;
    let previous = StoredTable {
        columns: table(1)?.columns().to_vec(),
        rows: vec![vec![Cell::Integer(99), Cell::Null]],
    };
    destination.seed("garmin.uds_data", previous.clone());
    destination.fail_writes_to("garmin.uds_data");

    let result = load(&destination, "uds_data", &name, &table(10)?, options(2)).await;
    assert_eq!(result.status, LoadStatus::Failed);
    assert_eq!(result.rows_loaded, 0);
    assert!(result
        .error_detail
        .as_deref()
        .is_some_and(|d| d.contains("injected failure")));
    assert_eq!(destination.table("garmin.uds_data"), Some(previous));
    Ok(())
}

#[tokio::test]
async fn count_mismatch_follows_verification_policy() -> Result<()> {
    let destination = MemoryDestination::new();
    let name = TableName::new(None, "maxmet_data")?;
    destination.skew_row_count("maxmet_data", -1);

    let advisory = load(&destination, "maxmet_data", &name, &table(5)?, options(100)).await;
    assert_eq!(advisory.status, LoadStatus::VerificationFailed);
    assert_eq!(advisory.rows_loaded, 4);
    assert!(advisory.error_detail.is_some());

    let strict = load(
        &destination,
        "maxmet_data",
        &name,
        &table(5)?,
        LoadOptions {
            batch_size: 100,
            verification: VerificationPolicy::Strict,
        },
    )
    .await;
    assert_eq!(strict.status, LoadStatus::Failed);
    Ok(())
}

#[tokio::test]
async fn empty_table_loads_zero_rows() -> Result<()> {
    let destination = MemoryDestination::new();
    let name = TableName::new(Some("garmin"), "race_predictions")?;

    let result = load(&destination, "race_predictions", &name, &table(0)?, options(10)).await;
    assert_eq!(result.status, LoadStatus::Succeeded);
    assert_eq!(result.rows_loaded, 0);
    Ok(())
}
