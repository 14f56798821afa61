use crate::table::ColumnType;

/// Maps provider keys onto one canonical column.
///
/// `sources` are tried in order and the first non-null value wins, which
/// lets one rule cover key renames across export versions. Dotted sources
/// address nested objects. `scale` and `round` only apply to `Float`
/// columns; `fill` only to `Text` columns.
#[derive(Debug, Clone, Copy)]
pub struct ColumnRule {
    pub name: &'static str,
    pub column_type: ColumnType,
    pub sources: &'static [&'static str],
    pub scale: Option<f64>,
    pub round: Option<u32>,
    pub required: bool,
    pub fill: Option<&'static str>,
}

impl ColumnRule {
    pub const fn new(
        name: &'static str,
        column_type: ColumnType,
        sources: &'static [&'static str],
    ) -> Self {
        Self {
            name,
            column_type,
            sources,
            scale: None,
            round: None,
            required: false,
            fill: None,
        }
    }

    pub const fn text(name: &'static str, sources: &'static [&'static str]) -> Self {
        Self::new(name, ColumnType::Text, sources)
    }

    pub const fn integer(name: &'static str, sources: &'static [&'static str]) -> Self {
        Self::new(name, ColumnType::Integer, sources)
    }

    pub const fn float(name: &'static str, sources: &'static [&'static str]) -> Self {
        Self::new(name, ColumnType::Float, sources)
    }

    pub const fn boolean(name: &'static str, sources: &'static [&'static str]) -> Self {
        Self::new(name, ColumnType::Boolean, sources)
    }

    pub const fn timestamp(name: &'static str, sources: &'static [&'static str]) -> Self {
        Self::new(name, ColumnType::Timestamp, sources)
    }

    pub const fn date(name: &'static str, sources: &'static [&'static str]) -> Self {
        Self::new(name, ColumnType::Date, sources)
    }

    pub const fn scaled(mut self, factor: f64) -> Self {
        self.scale = Some(factor);
        self
    }

    pub const fn rounded(mut self, digits: u32) -> Self {
        self.round = Some(digits);
        self
    }

    pub const fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub const fn fill(mut self, value: &'static str) -> Self {
        self.fill = Some(value);
        self
    }
}

pub fn round_to(value: f64, digits: u32) -> f64 {
    let factor = 10f64.powi(digits as i32);
    (value * factor).round() / factor
}
