use polars::prelude::*;

use crate::transform::derive::{self, Bin};
use crate::transform::rules::ColumnRule;
use crate::transform::{DatasetTransformer, TransformError};

const CM_TO_KM: f64 = 1.0 / 100_000.0;
const MS_TO_S: f64 = 1.0 / 1000.0;
const CM_PER_MS_TO_M_PER_S: f64 = 10.0;
const CM_TO_M: f64 = 1.0 / 100.0;
const KM_TO_MILES: f64 = 0.621_371;

/// Local start time, falling back to GMT when an export lacks it.
const START_TIMES: &[&str] = &["start_time_local", "start_time_gmt"];

const COLUMNS: &[ColumnRule] = &[
    ColumnRule::integer("activity_id", &["activityId"]).required(),
    ColumnRule::text("name", &["name"]),
    ColumnRule::text("activity_type", &["activityType"]),
    ColumnRule::text("sport_type", &["sportType"]),
    ColumnRule::timestamp("start_time_local", &["startTimeLocal"]),
    ColumnRule::timestamp("start_time_gmt", &["startTimeGmt"]),
    ColumnRule::timestamp("begin_timestamp", &["beginTimestamp"]),
    ColumnRule::float("distance_km", &["distance"])
        .scaled(CM_TO_KM)
        .rounded(3),
    ColumnRule::float("duration_seconds", &["duration"]).scaled(MS_TO_S),
    ColumnRule::float("elapsed_duration_seconds", &["elapsedDuration"]).scaled(MS_TO_S),
    ColumnRule::float("moving_duration_seconds", &["movingDuration"]).scaled(MS_TO_S),
    ColumnRule::float("avg_speed_mps", &["avgSpeed"]).scaled(CM_PER_MS_TO_M_PER_S),
    ColumnRule::float("max_speed_mps", &["maxSpeed"]).scaled(CM_PER_MS_TO_M_PER_S),
    ColumnRule::float("elevation_gain_m", &["elevationGain"]).scaled(CM_TO_M),
    ColumnRule::float("elevation_loss_m", &["elevationLoss"]).scaled(CM_TO_M),
    ColumnRule::float("min_elevation_m", &["minElevation"]).scaled(CM_TO_M),
    ColumnRule::float("max_elevation_m", &["maxElevation"]).scaled(CM_TO_M),
    ColumnRule::float("calories", &["calories"]),
    ColumnRule::float("avg_hr", &["avgHr"]),
    ColumnRule::float("max_hr", &["maxHr"]),
    ColumnRule::integer("steps", &["steps"]),
    ColumnRule::float("avg_run_cadence", &["avgRunCadence"]),
    ColumnRule::float("max_run_cadence", &["maxRunCadence"]),
    ColumnRule::float("aerobic_training_effect", &["aerobicTrainingEffect"]),
    ColumnRule::float("anaerobic_training_effect", &["anaerobicTrainingEffect"]),
    ColumnRule::float("vo2_max", &["vO2MaxValue"]),
    ColumnRule::integer("lap_count", &["lapCount"]),
    ColumnRule::text("location_name", &["locationName"]),
];

pub const DISTANCE_GROUPS: [Bin; 6] = [
    Bin { lower: 0.0, label: "0-3 miles" },
    Bin { lower: 3.0, label: "3-5 miles" },
    Bin { lower: 5.0, label: "5-7 miles" },
    Bin { lower: 7.0, label: "7-10 miles" },
    Bin { lower: 10.0, label: "10-13 miles" },
    Bin { lower: 13.0, label: "13+ miles" },
];

/// Every activity in the fitness export, one row per `activity_id`.
#[derive(Debug)]
pub struct SummarizedActivities;

impl DatasetTransformer for SummarizedActivities {
    fn code_identifier(&self) -> &'static str {
        "summarized_activities"
    }

    fn description(&self) -> &'static str {
        "Summarized activities with distance groups and weekly/monthly training volume"
    }

    fn columns(&self) -> &'static [ColumnRule] {
        COLUMNS
    }

    fn sort_keys(&self) -> &'static [&'static str] {
        START_TIMES
    }

    fn primary_key(&self) -> &'static [&'static str] {
        &["activity_id"]
    }

    fn derive(&self, mut frame: DataFrame) -> Result<DataFrame, TransformError> {
        derive::scale_column(&mut frame, "distance_km", "distance_miles", KM_TO_MILES, 2)?;
        derive::bucket(
            &mut frame,
            "distance_miles",
            "distance_group",
            "distance_group_id",
            &DISTANCE_GROUPS,
        )?;

        if let Some(start) = derive::first_present(&frame, START_TIMES) {
            derive::date_of(&mut frame, start, "activity_date")?;
            derive::date_parts(&mut frame, "activity_date")?;
        }

        derive::scale_column(&mut frame, "duration_seconds", "duration_minutes", 1.0 / 60.0, 2)?;
        derive::cumulative_by_group(
            &mut frame,
            "duration_minutes",
            &["iso_year", "week_of_year"],
            "weekly_cumulative_minutes",
            "weekly_minutes_prior",
        )?;
        derive::cumulative_by_group(
            &mut frame,
            "duration_minutes",
            &["year", "month_numeric"],
            "monthly_cumulative_minutes",
            "monthly_minutes_prior",
        )?;
        Ok(frame)
    }
}
