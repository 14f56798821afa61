use polars::prelude::*;

use crate::transform::derive;
use crate::transform::rules::ColumnRule;
use crate::transform::{DatasetTransformer, TransformError};

const SECONDS_TO_HOURS: f64 = 1.0 / 3600.0;

const COLUMNS: &[ColumnRule] = &[
    ColumnRule::date("calendar_date", &["calendarDate"]).required(),
    ColumnRule::timestamp("sleep_start_gmt", &["sleepStartTimestampGMT"]),
    ColumnRule::timestamp("sleep_end_gmt", &["sleepEndTimestampGMT"]),
    ColumnRule::float("deep_sleep_hours", &["deepSleepSeconds"])
        .scaled(SECONDS_TO_HOURS)
        .rounded(1),
    ColumnRule::float("light_sleep_hours", &["lightSleepSeconds"])
        .scaled(SECONDS_TO_HOURS)
        .rounded(1),
    ColumnRule::float("rem_sleep_hours", &["remSleepSeconds"])
        .scaled(SECONDS_TO_HOURS)
        .rounded(1),
    ColumnRule::float("awake_sleep_hours", &["awakeSleepSeconds"])
        .scaled(SECONDS_TO_HOURS)
        .rounded(1),
    ColumnRule::float("unmeasurable_hours", &["unmeasurableSeconds"])
        .scaled(SECONDS_TO_HOURS)
        .rounded(1),
    ColumnRule::float("average_respiration", &["averageRespiration"]),
    ColumnRule::float("lowest_respiration", &["lowestRespiration"]),
    ColumnRule::float("highest_respiration", &["highestRespiration"]),
    ColumnRule::integer("awake_count", &["awakeCount"]),
    ColumnRule::float("avg_sleep_stress", &["avgSleepStress"]),
    ColumnRule::integer("overall_score", &["sleepScores.overallScore"]),
    ColumnRule::integer("quality_score", &["sleepScores.qualityScore"]),
    ColumnRule::integer("duration_score", &["sleepScores.durationScore"]),
    ColumnRule::integer("recovery_score", &["sleepScores.recoveryScore"]),
    ColumnRule::integer("deep_score", &["sleepScores.deepScore"]),
    ColumnRule::integer("light_score", &["sleepScores.lightScore"]),
    ColumnRule::integer("rem_score", &["sleepScores.remScore"]),
    ColumnRule::integer("awakenings_count_score", &["sleepScores.awakeningsCountScore"]),
    ColumnRule::integer("awake_time_score", &["sleepScores.awakeTimeScore"]),
    ColumnRule::integer("combined_awake_score", &["sleepScores.combinedAwakeScore"]),
    ColumnRule::integer("restfulness_score", &["sleepScores.restfulnessScore"]),
    ColumnRule::integer("interruptions_score", &["sleepScores.interruptionsScore"]),
    ColumnRule::text("insight", &["sleepScores.insight", "insight"]).fill("NONE"),
    ColumnRule::text("feedback", &["sleepScores.feedback", "feedback"]).fill("NONE"),
];

/// Nightly sleep summaries, one row per `calendar_date`.
#[derive(Debug)]
pub struct SleepData;

impl DatasetTransformer for SleepData {
    fn code_identifier(&self) -> &'static str {
        "sleep_data"
    }

    fn description(&self) -> &'static str {
        "Nightly sleep stages in hours with flattened sleep scores"
    }

    fn columns(&self) -> &'static [ColumnRule] {
        COLUMNS
    }

    fn sort_keys(&self) -> &'static [&'static str] {
        &["calendar_date"]
    }

    fn primary_key(&self) -> &'static [&'static str] {
        &["calendar_date"]
    }

    fn derive(&self, mut frame: DataFrame) -> Result<DataFrame, TransformError> {
        derive::duration_between(
            &mut frame,
            "sleep_start_gmt",
            "sleep_end_gmt",
            "sleep_duration_hours",
            "sleep_duration_formatted",
        )?;
        Ok(frame)
    }
}
