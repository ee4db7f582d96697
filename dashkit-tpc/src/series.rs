//! Data series definitions of a tile

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Row filter applied to a report table column
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FilteringExpr {
    pub op: String,
    pub args: Vec<String>,
}

impl FilteringExpr {
    pub fn new(op: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            op: op.into(),
            args,
        }
    }

    /// `column == value` filter
    pub fn eq(value: impl Into<String>) -> Self {
        Self::new("eq", vec![value.into()])
    }
}

/// What a data series shows: a column of the report, possibly filtered
///
/// A negative `filtering_colno` means "no column" (the row index is used).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SeriesSpec {
    pub data_colno: i32,
    pub filtering_colno: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filtering_expr: Option<FilteringExpr>,
    /// Display name overriding the generated one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub static_name: Option<String>,
}

impl SeriesSpec {
    pub fn new(data_colno: i32, filtering_colno: i32, filtering_expr: Option<FilteringExpr>) -> Self {
        Self {
            data_colno,
            filtering_colno,
            filtering_expr,
            static_name: None,
        }
    }

    /// Canonical identity: the spec without presentation-only fields
    pub fn for_default_options(&self) -> SeriesSpec {
        SeriesSpec {
            static_name: None,
            ..self.clone()
        }
    }
}

/// A series spec bound to its series id inside a tile
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeriesConfig {
    pub series_id: Uuid,
    pub series_spec: SeriesSpec,
}

impl SeriesConfig {
    /// New config with a fresh series id
    pub fn new(series_spec: SeriesSpec) -> Self {
        Self {
            series_id: Uuid::new_v4(),
            series_spec,
        }
    }
}

/// Deduplicate by canonical identity, keeping first-seen order
pub fn unique_series_specs(specs: impl IntoIterator<Item = SeriesSpec>) -> Vec<SeriesSpec> {
    let mut seen: Vec<SeriesSpec> = Vec::new();
    let mut res = Vec::new();
    for spec in specs {
        let key = spec.for_default_options();
        if seen.contains(&key) {
            continue;
        }
        seen.push(key);
        res.push(spec);
    }
    res
}
