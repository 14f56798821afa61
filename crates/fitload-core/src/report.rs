//! Outcome of one pipeline run.

use chrono::{DateTime, Utc};
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Table};
use serde::Serialize;
use uuid::Uuid;

use crate::aggregator::SkippedFile;
use crate::loader::{LoadResult, LoadStatus};
use crate::transform::TransformStats;

/// Everything known about one dataset after its attempt.
#[derive(Debug, Clone, Serialize)]
pub struct DatasetReport {
    #[serde(flatten)]
    pub load: LoadResult,
    pub files_found: usize,
    pub rows_extracted: usize,
    pub skipped_files: Vec<SkippedFile>,
    pub transform: Option<TransformStats>,
}

impl DatasetReport {
    pub fn from_load(load: LoadResult) -> Self {
        Self {
            load,
            files_found: 0,
            rows_extracted: 0,
            skipped_files: Vec::new(),
            transform: None,
        }
    }

    pub fn status(&self) -> LoadStatus {
        self.load.status
    }

    /// Advisory verification failures still count as loaded.
    pub fn succeeded(&self) -> bool {
        matches!(
            self.load.status,
            LoadStatus::Succeeded | LoadStatus::VerificationFailed
        )
    }

    pub fn failed(&self) -> bool {
        self.load.status == LoadStatus::Failed
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: i64,
    pub datasets: Vec<DatasetReport>,
}

impl PipelineReport {
    pub fn new(run_id: Uuid, started_at: DateTime<Utc>, datasets: Vec<DatasetReport>) -> Self {
        let finished_at = Utc::now();
        Self {
            run_id,
            started_at,
            finished_at,
            duration_ms: (finished_at - started_at).num_milliseconds(),
            datasets,
        }
    }

    pub fn attempted(&self) -> usize {
        self.datasets.len()
    }

    pub fn succeeded(&self) -> usize {
        self.datasets.iter().filter(|d| d.succeeded()).count()
    }

    pub fn failed(&self) -> usize {
        self.datasets.iter().filter(|d| d.failed()).count()
    }

    pub fn dataset(&self, name: &str) -> Option<&DatasetReport> {
        self.datasets.iter().find(|d| d.load.dataset_name == name)
    }

    /// Partial success is normal; only strict runs fail on a failed dataset.
    pub fn exit_success(&self, strict: bool) -> bool {
        !strict || self.failed() == 0
    }

    pub fn summary_line(&self) -> String {
        format!(
            "{}/{} succeeded in {:.2}s",
            self.succeeded(),
            self.attempted(),
            self.duration_ms as f64 / 1000.0
        )
    }

    pub fn render_table(&self) -> Table {
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .apply_modifier(UTF8_ROUND_CORNERS)
            .set_header(vec!["Dataset", "Status", "Extracted", "Loaded", "Table", "Detail"]);

        for dataset in &self.datasets {
            table.add_row(vec![
                dataset.load.dataset_name.clone(),
                dataset.load.status.as_str().to_string(),
                dataset.rows_extracted.to_string(),
                dataset.load.rows_loaded.to_string(),
                dataset.load.destination_table.clone(),
                dataset
                    .load
                    .error_detail
                    .clone()
                    .unwrap_or_else(|| "-".to_string()),
            ]);
        }
        table
    }

    /// Status table followed by the `N/M succeeded` line.
    pub fn render(&self) -> String {
        format!("{}\n{}", self.render_table(), self.summary_line())
    }
}
