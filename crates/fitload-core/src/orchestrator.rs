//! Runs locate, aggregate, transform and load for each selected dataset, one
//! at a time, and collects the outcomes into a report.

use chrono::Utc;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::aggregator::aggregate;
use crate::config::{Config, DatasetSpec, LoadStrategy};
use crate::error::PipelineError;
use crate::loader::{load, Destination, LoadOptions, LoadResult};
use crate::locator::locate;
use crate::report::{DatasetReport, PipelineReport};
use crate::transform::transform;

pub struct Orchestrator<'a> {
    config: &'a Config,
    destination: &'a dyn Destination,
}

impl<'a> Orchestrator<'a> {
    pub fn new(config: &'a Config, destination: &'a dyn Destination) -> Self {
        Self {
            config,
            destination,
        }
    }

    fn load_options(&self) -> LoadOptions {
        LoadOptions {
            batch_size: self.config.etl.batch_size,
            verification: self.config.etl.verification,
        }
    }

    /// Attempts every dataset in `selection`, in order. A dataset's failure
    /// is recorded and never stops the datasets after it.
    pub async fn run(&self, selection: &[String]) -> PipelineReport {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        info!(%run_id, datasets = selection.len(), "pipeline run started");

        let mut datasets = Vec::with_capacity(selection.len());
        for name in selection {
            let span = info_span!("dataset", name = %name, %run_id);
            let report = self.run_one(name).instrument(span).await;
            datasets.push(report);
        }

        let report = PipelineReport::new(run_id, started_at, datasets);
        info!(
            %run_id,
            succeeded = report.succeeded(),
            attempted = report.attempted(),
            failed = report.failed(),
            "pipeline run finished"
        );
        report
    }

    async fn run_one(&self, name: &str) -> DatasetReport {
        let Some(spec) = self.config.dataset(name) else {
            let err = PipelineError::UnknownDataset(name.to_string());
            error!(error = %err, "dataset not configured");
            return DatasetReport::from_load(LoadResult::failed(name, "-", err.to_string()));
        };
        let table = spec.table.to_string();

        if self.config.etl.load_strategy == LoadStrategy::Append {
            warn!("append load strategy is not supported");
            return DatasetReport::from_load(LoadResult::failed(
                name,
                &table,
                "load strategy `append` is not supported; use `replace`",
            ));
        }

        match self.process(spec).await {
            Ok(report) => report,
            Err(err) => {
                error!(error = %err, "dataset failed");
                DatasetReport::from_load(LoadResult::failed(name, &table, err.to_string()))
            }
        }
    }

    async fn process(&self, spec: &DatasetSpec) -> Result<DatasetReport, PipelineError> {
        let files = locate(&self.config.raw_data, &spec.pattern)?;
        let table = spec.table.to_string();
        if files.is_empty() {
            info!(pattern = %spec.pattern, "no export files found");
            return Ok(DatasetReport::from_load(LoadResult::skipped(
                &spec.name,
                &table,
                format!("no files match {}", spec.pattern),
            )));
        }

        let raw = aggregate(&files);
        let files_found = files.len();
        let rows_extracted = raw.len();
        let skipped_files = raw.skipped_files.clone();
        let failed = |err: PipelineError, skipped_files: Vec<_>| {
            error!(error = %err, "dataset failed");
            DatasetReport {
                load: LoadResult::failed(&spec.name, &table, err.to_string()),
                files_found,
                rows_extracted,
                skipped_files,
                transform: None,
            }
        };
        if raw.is_empty() {
            return Ok(failed(
                PipelineError::NoRecords { files: files_found },
                skipped_files,
            ));
        }

        let output = match transform(spec.transformer, raw) {
            Ok(output) => output,
            Err(err) => return Ok(failed(err.into(), skipped_files)),
        };
        let load = load(
            self.destination,
            &spec.name,
            &spec.table,
            &output.table,
            self.load_options(),
        )
        .await;

        Ok(DatasetReport {
            load,
            files_found,
            rows_extracted,
            skipped_files,
            transform: Some(output.stats),
        })
    }
}
