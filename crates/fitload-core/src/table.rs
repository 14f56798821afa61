use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Utc};
use polars::prelude::*;
use serde::Serialize;

/// Logical type of a canonical column. Drives both polars storage and the
/// SQL type bound at load time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    Text,
    Integer,
    Float,
    Boolean,
    Timestamp,
    Date,
}

impl ColumnType {
    pub fn polars_dtype(self) -> DataType {
        match self {
            ColumnType::Text => DataType::String,
            ColumnType::Integer => DataType::Int64,
            ColumnType::Float => DataType::Float64,
            ColumnType::Boolean => DataType::Boolean,
            ColumnType::Timestamp => DataType::Datetime(TimeUnit::Microseconds, None),
            ColumnType::Date => DataType::Date,
        }
    }

    pub fn sql_type(self) -> &'static str {
        match self {
            ColumnType::Text => "TEXT",
            ColumnType::Integer => "BIGINT",
            ColumnType::Float => "DOUBLE PRECISION",
            ColumnType::Boolean => "BOOLEAN",
            ColumnType::Timestamp => "TIMESTAMP",
            ColumnType::Date => "DATE",
        }
    }

    /// Canonical type for a polars dtype. Anything without a natural mapping
    /// is carried as text.
    pub fn from_dtype(dtype: &DataType) -> ColumnType {
        match dtype {
            DataType::String => ColumnType::Text,
            DataType::Boolean => ColumnType::Boolean,
            DataType::Int32 | DataType::Int64 | DataType::UInt32 | DataType::UInt64 => {
                ColumnType::Integer
            }
            DataType::Float32 | DataType::Float64 => ColumnType::Float,
            DataType::Date => ColumnType::Date,
            DataType::Datetime(_, _) => ColumnType::Timestamp,
            _ => ColumnType::Text,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnDef {
    pub name: String,
    pub column_type: ColumnType,
}

/// A single typed value. `Null` is untyped; the column type decides which SQL
/// null gets bound.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Null,
    Text(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Timestamp(NaiveDateTime),
    Date(NaiveDate),
}

impl Cell {
    pub fn is_null(&self) -> bool {
        matches!(self, Cell::Null)
    }

    pub fn as_text(&self) -> Option<String> {
        match self {
            Cell::Text(value) => Some(value.clone()),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Cell::Integer(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Cell::Float(value) => Some(*value),
            Cell::Integer(value) => Some(*value as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Cell::Boolean(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<NaiveDateTime> {
        match self {
            Cell::Timestamp(value) => Some(*value),
            Cell::Date(value) => value.and_hms_opt(0, 0, 0),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Cell::Date(value) => Some(*value),
            Cell::Timestamp(value) => Some(value.date()),
            _ => None,
        }
    }
}

const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

pub fn micros_to_datetime(micros: i64) -> Option<NaiveDateTime> {
    DateTime::<Utc>::from_timestamp_micros(micros).map(|dt| dt.naive_utc())
}

pub fn days_to_date(days: i32) -> Option<NaiveDate> {
    NaiveDate::from_num_days_from_ce_opt(days.checked_add(UNIX_EPOCH_DAYS_FROM_CE)?)
}

pub fn date_to_days(date: NaiveDate) -> i32 {
    date.num_days_from_ce() - UNIX_EPOCH_DAYS_FROM_CE
}

/// Builds one polars column of `column_type` from typed cells. Cells of the
/// wrong kind are stored as null.
pub fn build_series(name: &str, column_type: ColumnType, cells: &[Cell]) -> PolarsResult<Series> {
    let series = match column_type {
        ColumnType::Text => {
            let values: Vec<Option<String>> = cells.iter().map(Cell::as_text).collect();
            Series::new(
                name.into(),
                values.iter().map(|v| v.as_deref()).collect::<Vec<Option<&str>>>(),
            )
        }
        ColumnType::Integer => {
            let values: Vec<Option<i64>> = cells.iter().map(Cell::as_i64).collect();
            Series::new(name.into(), values)
        }
        ColumnType::Float => {
            let values: Vec<Option<f64>> = cells.iter().map(Cell::as_f64).collect();
            Series::new(name.into(), values)
        }
        ColumnType::Boolean => {
            let values: Vec<Option<bool>> = cells.iter().map(Cell::as_bool).collect();
            Series::new(name.into(), values)
        }
        ColumnType::Timestamp => {
            let values: Vec<Option<i64>> = cells
                .iter()
                .map(|c| c.as_timestamp().map(|ts| ts.and_utc().timestamp_micros()))
                .collect();
            Series::new(name.into(), values).cast(&column_type.polars_dtype())?
        }
        ColumnType::Date => {
            let values: Vec<Option<i32>> = cells
                .iter()
                .map(|c| c.as_date().map(date_to_days))
                .collect();
            Series::new(name.into(), values).cast(&column_type.polars_dtype())?
        }
    };
    Ok(series)
}

/// Reads every value of a column back into typed cells, casting to the
/// storage dtype of `column_type` first.
pub fn read_cells(column: &Column, column_type: ColumnType) -> PolarsResult<Vec<Cell>> {
    let cells = match column_type {
        ColumnType::Text => column
            .cast(&DataType::String)?
            .str()?
            .iter()
            .map(|v| v.map_or(Cell::Null, |s| Cell::Text(s.to_string())))
            .collect(),
        ColumnType::Integer => column
            .cast(&DataType::Int64)?
            .i64()?
            .iter()
            .map(|v| v.map_or(Cell::Null, Cell::Integer))
            .collect(),
        ColumnType::Float => column
            .cast(&DataType::Float64)?
            .f64()?
            .iter()
            .map(|v| v.map_or(Cell::Null, Cell::Float))
            .collect(),
        ColumnType::Boolean => column
            .cast(&DataType::Boolean)?
            .bool()?
            .iter()
            .map(|v| v.map_or(Cell::Null, Cell::Boolean))
            .collect(),
        ColumnType::Timestamp => column
            .cast(&column_type.polars_dtype())?
            .cast(&DataType::Int64)?
            .i64()?
            .iter()
            .map(|v| {
                v.and_then(micros_to_datetime)
                    .map_or(Cell::Null, Cell::Timestamp)
            })
            .collect(),
        ColumnType::Date => column
            .cast(&DataType::Int32)?
            .i32()?
            .iter()
            .map(|v| v.and_then(days_to_date).map_or(Cell::Null, Cell::Date))
            .collect(),
    };
    Ok(cells)
}

/// Casts every column to the storage dtype of its canonical type and returns
/// the matching column declarations.
pub fn normalize_frame(frame: &DataFrame) -> PolarsResult<(DataFrame, Vec<ColumnDef>)> {
    let mut columns = Vec::with_capacity(frame.width());
    let mut defs = Vec::with_capacity(frame.width());
    for column in frame.get_columns() {
        let column_type = ColumnType::from_dtype(column.dtype());
        let target = column_type.polars_dtype();
        let column = if column.dtype() == &target {
            column.clone()
        } else {
            column.cast(&target)?
        };
        defs.push(ColumnDef {
            name: column.name().to_string(),
            column_type,
        });
        columns.push(column);
    }
    Ok((DataFrame::new(columns)?, defs))
}

/// Column-major typed cells for a frame whose dtypes are already canonical.
pub fn frame_cells(frame: &DataFrame) -> PolarsResult<Vec<Vec<Cell>>> {
    frame
        .get_columns()
        .iter()
        .map(|column| read_cells(column, ColumnType::from_dtype(column.dtype())))
        .collect()
}

/// Rectangular, typed output of a transformer. Every row has a value (maybe
/// null) for every declared column; the declared columns and the frame's
/// columns are always the same list in the same order.
#[derive(Debug, Clone)]
pub struct CleanTable {
    columns: Vec<ColumnDef>,
    frame: DataFrame,
}

impl CleanTable {
    /// Wraps a frame whose columns all appear in `columns`, in order.
    pub fn new(columns: Vec<ColumnDef>, frame: DataFrame) -> PolarsResult<Self> {
        let frame_names: Vec<&str> = frame
            .get_columns()
            .iter()
            .map(|c| c.name().as_str())
            .collect();
        let declared: Vec<&str> = columns.iter().map(|c| c.name.as_str()).collect();
        if frame_names != declared {
            return Err(PolarsError::ComputeError(
                format!("frame columns {frame_names:?} do not match declared columns {declared:?}")
                    .into(),
            ));
        }
        Ok(Self { columns, frame })
    }

    /// Builds a table from column-major cells.
    pub fn from_cells(columns: Vec<ColumnDef>, data: &[Vec<Cell>]) -> PolarsResult<Self> {
        let mut series: Vec<Column> = Vec::with_capacity(columns.len());
        for (def, cells) in columns.iter().zip(data) {
            series.push(build_series(&def.name, def.column_type, cells)?.into());
        }
        let frame = DataFrame::new(series)?;
        Self::new(columns, frame)
    }

    pub fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn frame(&self) -> &DataFrame {
        &self.frame
    }

    pub fn len(&self) -> usize {
        self.frame.height()
    }

    pub fn is_empty(&self) -> bool {
        self.frame.height() == 0
    }

    /// Column-major typed cells.
    pub fn column_cells(&self) -> PolarsResult<Vec<Vec<Cell>>> {
        self.columns
            .iter()
            .map(|def| read_cells(self.frame.column(&def.name)?, def.column_type))
            .collect()
    }

    /// Row-major typed cells, in table order.
    pub fn rows(&self) -> PolarsResult<Vec<Vec<Cell>>> {
        let by_column = self.column_cells()?;
        let mut rows = Vec::with_capacity(self.len());
        for row in 0..self.len() {
            rows.push(by_column.iter().map(|col| col[row].clone()).collect());
        }
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defs() -> Vec<ColumnDef> {
        vec![
            ColumnDef {
                name: "calendar_date".into(),
                column_type: ColumnType::Date,
            },
            ColumnDef {
                name: "started_at".into(),
                column_type: ColumnType::Timestamp,
            },
            ColumnDef {
                name: "score".into(),
                column_type: ColumnType::Integer,
            },
        ]
    }

    #[test]
    fn cells_survive_the_frame() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 9).expect("date");
        let ts = date.and_hms_opt(22, 15, 30).expect("time");
        let table = CleanTable::from_cells(
            defs(),
            &[
                vec![Cell::Date(date), Cell::Null],
                vec![Cell::Timestamp(ts), Cell::Null],
                vec![Cell::Integer(81), Cell::Null],
            ],
        )
        .expect("table");

        assert_eq!(table.len(), 2);
        let rows = table.rows().expect("rows");
        assert_eq!(
            rows[0],
            vec![Cell::Date(date), Cell::Timestamp(ts), Cell::Integer(81)]
        );
        assert!(rows[1].iter().all(Cell::is_null));
    }

    #[test]
    fn mismatched_declaration_is_rejected() {
        let frame = df!["other" => [1i64]].expect("frame");
        assert!(CleanTable::new(defs(), frame).is_err());
    }

    #[test]
    fn day_conversions_are_inverse() {
        let date = NaiveDate::from_ymd_opt(1969, 12, 31).expect("date");
        assert_eq!(date_to_days(date), -1);
        assert_eq!(days_to_date(-1), Some(date));
    }
}
