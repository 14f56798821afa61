use std::fs;
use std::path::PathBuf;

use anyhow::Result;
use fitload_core::aggregator::aggregate;
use serde_json::json;

fn write(dir: &tempfile::TempDir, name: &str, contents: &str) -> Result<PathBuf> {
    let path = dir.path().join(name);
    fs::write(&path, contents)?;
    Ok(path)
}

#[test]
fn arrays_and_objects_concatenate_in_path_order() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let paths = vec![
        write(&dir, "1.json", &json!([{"n": 1}, {"n": 2}]).to_string())?,
        write(&dir, "2.json", &json!({"n": 3}).to_string())?,
        write(&dir, "3.json", &json!([{"n": 4}]).to_string())?,
    ];

    let set = aggregate(&paths);
    let values: Vec<i64> = set
        .records
        .iter()
        .filter_map(|r| r.fields.get("n").and_then(|v| v.as_i64()))
        .collect();
    assert_eq!(values, vec![1, 2, 3, 4]);
    assert_eq!(set.files.iter().map(|f| f.records).sum::<usize>(), set.len());
    assert!(set.skipped_files.is_empty());

    assert_eq!(&*set.records[2].source, paths[1].as_path());
    assert_eq!(set.records[1].index, 1);
    Ok(())
}

#[test]
fn malformed_files_are_skipped_not_fatal() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let paths = vec![
        write(&dir, "a.json", "{not json")?,
        write(&dir, "b.json", "42")?,
        write(&dir, "c.json", &json!([{"ok": true}]).to_string())?,
        dir.path().join("vanished.json"),
    ];

    let set = aggregate(&paths);
    assert_eq!(set.len(), 1);
    assert_eq!(set.files.len(), 1);
    let skipped: Vec<&PathBuf> = set.skipped_files.iter().map(|s| &s.path).collect();
    assert_eq!(skipped, vec![&paths[0], &paths[1], &paths[3]]);
    assert!(set.skipped_files[0].reason.contains("invalid JSON"));
    assert!(set.skipped_files[1].reason.contains("array or object"));
    Ok(())
}

#[test]
fn non_object_elements_are_dropped_with_diagnostics() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = write(&dir, "mixed.json", r#"[{"a": 1}, "stray", null, {"a": 2}]"#)?;

    let set = aggregate(&[path.clone()]);
    assert_eq!(set.len(), 2);
    assert_eq!(set.files[0].records, 2);
    let dropped: Vec<usize> = set.dropped_records.iter().map(|d| d.index).collect();
    assert_eq!(dropped, vec![1, 2]);
    assert_eq!(set.records[1].index, 3);
    Ok(())
}

#[test]
fn identical_files_are_still_aggregated() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let body = json!([{"calendarDate": "2024-01-01"}]).to_string();
    let paths = vec![write(&dir, "x.json", &body)?, write(&dir, "y.json", &body)?];

    let set = aggregate(&paths);
    assert_eq!(set.len(), 2);
    assert_eq!(set.files[0].hash, set.files[1].hash);
    Ok(())
}
