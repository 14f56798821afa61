use std::fs;
use std::path::Path;

use anyhow::Result;
use fitload_core::error::PipelineError;
use fitload_core::locator::locate;

fn touch(root: &Path, relative: &str) -> Result<()> {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, "[]")?;
    Ok(())
}

#[test]
fn recursive_pattern_finds_nested_exports_in_order() -> Result<()> {
    let dir = tempfile::tempdir()?;
    touch(dir.path(), "b/DI-Connect-Wellness/2024_sleepData.json")?;
    touch(dir.path(), "a/DI-Connect-Wellness/2023_sleepData.json")?;
    touch(dir.path(), "a/DI-Connect-Wellness/2022_sleepData.json")?;
    touch(dir.path(), "a/DI-Connect-Metrics/TrainingHistory_1.json")?;
    fs::create_dir_all(dir.path().join("c/DI-Connect-Wellness/odd_sleepData.json"))?;

    let found = locate(dir.path(), "**/DI-Connect-Wellness/*sleepData.json")?;
    let relative: Vec<String> = found
        .iter()
        .map(|p| {
            p.strip_prefix(dir.path())
                .map(|r| r.to_string_lossy().into_owned())
                .unwrap_or_default()
        })
        .collect();

    assert_eq!(
        relative,
        vec![
            "a/DI-Connect-Wellness/2022_sleepData.json",
            "a/DI-Connect-Wellness/2023_sleepData.json",
            "b/DI-Connect-Wellness/2024_sleepData.json",
        ]
    );
    assert_eq!(found, locate(dir.path(), "**/DI-Connect-Wellness/*sleepData.json")?);
    Ok(())
}

#[test]
fn no_match_is_an_empty_list() -> Result<()> {
    let dir = tempfile::tempdir()?;
    touch(dir.path(), "DI-Connect-Fitness/user_summarizedActivities.json")?;
    assert!(locate(dir.path(), "**/DI-Connect-Aggregator/UDSFile_*.json")?.is_empty());
    Ok(())
}

#[test]
fn root_must_be_an_existing_directory() -> Result<()> {
    let dir = tempfile::tempdir()?;
    touch(dir.path(), "file.json")?;

    let err = locate(&dir.path().join("file.json"), "*.json").expect_err("file root");
    assert!(matches!(err, PipelineError::InvalidPath { .. }));

    let err = locate(&dir.path().join("missing"), "*.json").expect_err("missing root");
    assert!(matches!(err, PipelineError::InvalidPath { .. }));
    Ok(())
}

#[test]
fn glob_metacharacters_in_root_are_literal() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let root = dir.path().join("Raw Data [export]");
    touch(&root, "DI-Connect-Metrics/MetricsMaxMetData_1.json")?;

    let found = locate(&root, "**/MetricsMaxMetData_*.json")?;
    assert_eq!(found.len(), 1);
    Ok(())
}
