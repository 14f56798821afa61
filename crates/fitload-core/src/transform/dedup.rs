use std::collections::HashMap;

use polars::prelude::*;

use crate::table::{frame_cells, Cell};

/// Rows that survived de-duplication.
#[derive(Debug)]
pub struct Deduplicated {
    pub frame: DataFrame,
    /// Aggregation position of every surviving row, in output order.
    pub order: Vec<usize>,
    pub removed: usize,
}

/// Collapses duplicate rows.
///
/// Without a key, rows identical across every column collapse to the first.
/// With a key, rows sharing the key collapse to the one with the fewest nulls;
/// equally complete rows resolve to the earliest aggregation position in
/// `order`. Surviving rows keep their relative order in `frame`.
pub fn deduplicate_rows(
    frame: &DataFrame,
    order: &[usize],
    key: &[&str],
) -> PolarsResult<Deduplicated> {
    let columns = frame_cells(frame)?;
    let names: Vec<&str> = frame
        .get_columns()
        .iter()
        .map(|c| c.name().as_str())
        .collect();
    let key_indices: Option<Vec<usize>> = if key.is_empty() {
        None
    } else {
        key.iter()
            .map(|k| names.iter().position(|n| n == k))
            .collect()
    };

    let height = frame.height();
    let mut best: HashMap<String, usize> = HashMap::with_capacity(height);
    let mut first_seen: Vec<String> = Vec::new();

    for row in 0..height {
        let row_key = match &key_indices {
            Some(indices) => render_key(indices.iter().map(|&i| &columns[i][row])),
            None => render_key(columns.iter().map(|col| &col[row])),
        };
        match best.get_mut(&row_key) {
            Some(kept) => {
                if key_indices.is_some() && beats(&columns, order, row, *kept) {
                    *kept = row;
                }
            }
            None => {
                best.insert(row_key.clone(), row);
                first_seen.push(row_key);
            }
        }
    }

    let mut keep: Vec<usize> = first_seen.iter().map(|k| best[k]).collect();
    keep.sort_unstable();

    let removed = height - keep.len();
    let indices = IdxCa::from_vec(
        "idx".into(),
        keep.iter().map(|&i| i as IdxSize).collect(),
    );
    Ok(Deduplicated {
        frame: frame.take(&indices)?,
        order: keep.iter().map(|&i| order[i]).collect(),
        removed,
    })
}

/// Convenience wrapper treating frame order as aggregation order.
pub fn deduplicate(frame: &DataFrame, key: &[&str]) -> PolarsResult<DataFrame> {
    let order: Vec<usize> = (0..frame.height()).collect();
    Ok(deduplicate_rows(frame, &order, key)?.frame)
}

fn beats(columns: &[Vec<Cell>], order: &[usize], candidate: usize, kept: usize) -> bool {
    let nulls = |row: usize| columns.iter().filter(|col| col[row].is_null()).count();
    let (candidate_nulls, kept_nulls) = (nulls(candidate), nulls(kept));
    candidate_nulls < kept_nulls
        || (candidate_nulls == kept_nulls && order[candidate] < order[kept])
}

fn render_key<'a>(cells: impl Iterator<Item = &'a Cell>) -> String {
    let mut key = String::new();
    for cell in cells {
        key.push_str(&format!("{cell:?}"));
        key.push('\u{1f}');
    }
    key
}
