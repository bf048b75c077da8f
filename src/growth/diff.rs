//! Additive adjustments to growth factors (`growdiff_*` reform sections)

use std::collections::BTreeMap;

use serde_json::Value;

use crate::error::{TaxError, TaxResult};

/// Year-indexed additive differences per growth category
///
/// A difference set for year `Y` applies to `Y` and every later year until
/// another year is set for the same category.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GrowthDiff {
    diffs: BTreeMap<String, BTreeMap<i32, f64>>,
}

impl GrowthDiff {
    pub fn is_empty(&self) -> bool {
        self.diffs.is_empty()
    }

    pub fn set(&mut self, category: &str, year: i32, diff: f64) {
        self.diffs
            .entry(category.to_string())
            .or_default()
            .insert(year, diff);
    }

    pub fn categories(&self) -> impl Iterator<Item = &str> {
        self.diffs.keys().map(|s| s.as_str())
    }

    /// Difference in effect for `category` in `year` (0 if none)
    pub fn difference(&self, category: &str, year: i32) -> f64 {
        self.diffs
            .get(category)
            .and_then(|by_year| by_year.range(..=year).next_back())
            .map(|(_, d)| *d)
            .unwrap_or(0.0)
    }

    /// Parse a `growdiff_*` section: `{ "_CPI": { "2019": [0.01] } }`
    ///
    /// The leading marker character and the one-element list wrapper are
    /// both optional.
    pub fn from_json(section: &Value) -> TaxResult<Self> {
        let mut diff = GrowthDiff::default();
        let obj = match section {
            Value::Null => return Ok(diff),
            Value::Object(obj) => obj,
            _ => return Err(TaxError::config("growdiff section must be an object")),
        };
        for (key, by_year) in obj {
            let category = key.trim_start_matches('_');
            let by_year = by_year.as_object().ok_or_else(|| {
                TaxError::config(format!("growdiff entry {} must map years to values", key))
            })?;
            for (year_str, value) in by_year {
                let year: i32 = year_str.parse().map_err(|_| {
                    TaxError::config(format!("growdiff {} has non-integer year `{}`", key, year_str))
                })?;
                let number = match value {
                    Value::Array(items) if items.len() == 1 => items[0].as_f64(),
                    other => other.as_f64(),
                }
                .ok_or_else(|| {
                    TaxError::config(format!("growdiff {} {} must be a number", key, year))
                })?;
                diff.set(category, year, number);
            }
        }
        Ok(diff)
    }
}
