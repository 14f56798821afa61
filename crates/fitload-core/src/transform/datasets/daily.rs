//! Daily metric datasets. They share one shape: a row per calendar day, no
//! derived columns, and at most a single-field record filter, so they are
//! described as data rather than as one type per dataset.

use serde_json::Value;

use crate::aggregator::RawRecord;
use crate::transform::rules::ColumnRule;
use crate::transform::DatasetTransformer;

/// Records whose `field` equals `value` are dropped during projection.
#[derive(Debug, Clone, Copy)]
pub struct Exclude {
    pub field: &'static str,
    pub value: &'static str,
}

#[derive(Debug)]
pub struct DailyMetrics {
    code: &'static str,
    description: &'static str,
    columns: &'static [ColumnRule],
    exclude: Option<Exclude>,
}

impl DatasetTransformer for DailyMetrics {
    fn code_identifier(&self) -> &'static str {
        self.code
    }

    fn description(&self) -> &'static str {
        self.description
    }

    fn columns(&self) -> &'static [ColumnRule] {
        self.columns
    }

    fn sort_keys(&self) -> &'static [&'static str] {
        &["calendar_date"]
    }

    fn primary_key(&self) -> &'static [&'static str] {
        &["calendar_date"]
    }

    fn keep_record(&self, record: &RawRecord) -> bool {
        match self.exclude {
            Some(Exclude { field, value }) => {
                !matches!(record.lookup(field), Some(Value::String(s)) if s == value)
            }
            None => true,
        }
    }
}

const CALENDAR_DATE: ColumnRule =
    ColumnRule::date("calendar_date", &["calendarDate", "timestamp"]).required();

pub static ACUTE_TRAINING_LOAD: DailyMetrics = DailyMetrics {
    code: "acute_training_load",
    description: "Acute and chronic training load with workload ratio",
    columns: &[
        CALENDAR_DATE,
        ColumnRule::timestamp("recorded_at", &["timestamp"]),
        ColumnRule::float(
            "daily_acute_chronic_workload_ratio",
            &["dailyAcuteChronicWorkloadRatio"],
        )
        .required(),
        ColumnRule::float("daily_training_load_acute", &["dailyTrainingLoadAcute"]),
        ColumnRule::float("daily_training_load_chronic", &["dailyTrainingLoadChronic"]),
        ColumnRule::float("max_training_load_chronic", &["maxTrainingLoadChronic"]),
        ColumnRule::float("min_training_load_chronic", &["minTrainingLoadChronic"]),
        ColumnRule::text("acwr_status", &["acwrStatus"]),
        ColumnRule::text("acwr_status_feedback", &["acwrStatusFeedback"]),
    ],
    exclude: Some(Exclude {
        field: "acwrStatus",
        value: "NONE",
    }),
};

pub static MAXMET: DailyMetrics = DailyMetrics {
    code: "maxmet_data",
    description: "VO2 max estimates and fitness age",
    columns: &[
        CALENDAR_DATE,
        ColumnRule::text("sport", &["sport"]),
        ColumnRule::text("sub_sport", &["subSport"]),
        ColumnRule::float("vo2_max", &["vo2MaxValue"]),
        ColumnRule::float("fitness_age", &["fitnessAge"]),
        ColumnRule::text("max_met_category", &["maxMetCategory"]),
        ColumnRule::boolean("calibrated_data", &["calibratedData"]),
        ColumnRule::timestamp("updated_at", &["updateTimestamp", "timestamp"]),
    ],
    exclude: None,
};

pub static RACE_PREDICTIONS: DailyMetrics = DailyMetrics {
    code: "race_predictions",
    description: "Predicted race times in seconds",
    columns: &[
        CALENDAR_DATE,
        ColumnRule::integer("race_time_5k", &["raceTime5K"]),
        ColumnRule::integer("race_time_10k", &["raceTime10K"]),
        ColumnRule::integer("race_time_half", &["raceTimeHalf"]),
        ColumnRule::integer("race_time_marathon", &["raceTimeMarathon"]),
        ColumnRule::timestamp("recorded_at", &["timestamp"]),
    ],
    exclude: None,
};

pub static TRAINING_HISTORY: DailyMetrics = DailyMetrics {
    code: "training_history",
    description: "Daily training status",
    columns: &[
        CALENDAR_DATE,
        ColumnRule::text("training_status", &["trainingStatus"]),
        ColumnRule::text(
            "training_status_feedback",
            &["trainingStatus2FeedbackPhrase", "trainingStatusFeedbackPhrase"],
        ),
        ColumnRule::text("sport", &["sport"]),
        ColumnRule::text("fitness_level_trend", &["fitnessLevelTrend"]),
        ColumnRule::timestamp("recorded_at", &["timestamp"]),
    ],
    exclude: None,
};

pub static UDS: DailyMetrics = DailyMetrics {
    code: "uds_data",
    description: "User daily summary: steps, calories, heart rate and intensity minutes",
    columns: &[
        CALENDAR_DATE,
        ColumnRule::integer("total_steps", &["totalSteps"]),
        ColumnRule::integer("daily_step_goal", &["dailyStepGoal"]),
        ColumnRule::float("total_distance_meters", &["totalDistanceMeters"]),
        ColumnRule::float("total_kilocalories", &["totalKilocalories"]),
        ColumnRule::float("active_kilocalories", &["activeKilocalories"]),
        ColumnRule::float("bmr_kilocalories", &["bmrKilocalories"]),
        ColumnRule::integer("highly_active_seconds", &["highlyActiveSeconds"]),
        ColumnRule::integer("active_seconds", &["activeSeconds"]),
        ColumnRule::integer("moderate_intensity_minutes", &["moderateIntensityMinutes"]),
        ColumnRule::integer("vigorous_intensity_minutes", &["vigorousIntensityMinutes"]),
        ColumnRule::integer("resting_heart_rate", &["restingHeartRate"]),
        ColumnRule::integer("min_heart_rate", &["minHeartRate"]),
        ColumnRule::integer("max_heart_rate", &["maxHeartRate"]),
        ColumnRule::float("floors_ascended_meters", &["floorsAscendedInMeters"]),
        ColumnRule::float("floors_descended_meters", &["floorsDescendedInMeters"]),
    ],
    exclude: None,
};
