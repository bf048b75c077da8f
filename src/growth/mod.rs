//! Growth factors used to extrapolate record data and index policy parameters
//!
//! The table is immutable once loaded. Several populations and parameter
//! stores may share one instance behind an `Arc`.

mod diff;
pub mod loader;

pub use diff::GrowthDiff;

use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

use crate::error::{TaxError, TaxResult};
use loader::{read_year_columns, DEFAULT_GROWFACTORS_CSV};

/// Category whose factor minus one gives the price inflation rate
pub const DEFAULT_PRICE_CATEGORY: &str = "CPI";

/// Category whose factor minus one gives the wage growth rate
pub const DEFAULT_WAGE_CATEGORY: &str = "SALARY";

/// Per-category multiplicative growth factors indexed by year
#[derive(Debug, Clone, PartialEq)]
pub struct GrowthFactorTable {
    first_year: i32,
    last_year: i32,
    factors: BTreeMap<String, Vec<f64>>,
    price_category: String,
    wage_category: String,
}

impl GrowthFactorTable {
    /// Load the embedded default table
    pub fn default_table() -> TaxResult<Self> {
        Self::from_reader(DEFAULT_GROWFACTORS_CSV.as_bytes())
    }

    /// Load a table from a CSV file
    pub fn from_path<P: AsRef<Path>>(path: P) -> TaxResult<Self> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(file)
    }

    /// Load a table from any reader (string buffer, file, ...)
    pub fn from_reader<R: Read>(reader: R) -> TaxResult<Self> {
        let raw = read_year_columns(reader, "growth factor table")?;
        let first_year = raw.years[0];
        let last_year = raw.years[raw.years.len() - 1];

        for (name, values) in &raw.columns {
            if let Some(v) = values.iter().find(|v| !(v.is_finite() && **v > 0.0)) {
                return Err(TaxError::config(format!(
                    "growth factor {} must be positive and finite, found {}",
                    name, v
                )));
            }
        }

        let table = Self {
            first_year,
            last_year,
            factors: raw.columns,
            price_category: DEFAULT_PRICE_CATEGORY.to_string(),
            wage_category: DEFAULT_WAGE_CATEGORY.to_string(),
        };
        log::info!(
            "loaded growth factors for {}..={} ({} categories)",
            first_year,
            last_year,
            table.factors.len()
        );
        Ok(table)
    }

    /// Choose which categories drive price inflation and wage growth
    pub fn with_rate_categories(mut self, price: &str, wage: &str) -> TaxResult<Self> {
        for cat in [price, wage] {
            if !self.factors.contains_key(cat) {
                return Err(TaxError::UnknownCategory(cat.to_string()));
            }
        }
        self.price_category = price.to_string();
        self.wage_category = wage.to_string();
        Ok(self)
    }

    pub fn first_year(&self) -> i32 {
        self.first_year
    }

    pub fn last_year(&self) -> i32 {
        self.last_year
    }

    /// Category names in sorted order
    pub fn categories(&self) -> impl Iterator<Item = &str> {
        self.factors.keys().map(|s| s.as_str())
    }

    pub fn has_category(&self, category: &str) -> bool {
        self.factors.contains_key(category)
    }

    /// Fail with the first category name the table does not carry
    pub fn validate_categories<'a, I>(&self, categories: I) -> TaxResult<()>
    where
        I: IntoIterator<Item = &'a str>,
    {
        for cat in categories {
            if !self.has_category(cat) {
                return Err(TaxError::UnknownCategory(cat.to_string()));
            }
        }
        Ok(())
    }

    fn check_year(&self, year: i32) -> TaxResult<usize> {
        if year < self.first_year || year > self.last_year {
            return Err(TaxError::YearOutOfRange {
                year,
                first: self.first_year,
                last: self.last_year,
            });
        }
        Ok((year - self.first_year) as usize)
    }

    /// Growth factor for `category` in `year`
    pub fn factor_value(&self, category: &str, year: i32) -> TaxResult<f64> {
        let column = self
            .factors
            .get(category)
            .ok_or_else(|| TaxError::UnknownCategory(category.to_string()))?;
        let idx = self.check_year(year)?;
        Ok(column[idx])
    }

    /// Rates (factor - 1) of `category` for every year in `[y0, y1]`
    fn rates(&self, category: &str, y0: i32, y1: i32) -> TaxResult<Vec<f64>> {
        if y1 < y0 {
            return Err(TaxError::config(format!(
                "rate range end {} precedes start {}",
                y1, y0
            )));
        }
        let column = self
            .factors
            .get(category)
            .ok_or_else(|| TaxError::UnknownCategory(category.to_string()))?;
        let start = self.check_year(y0)?;
        let end = self.check_year(y1)?;
        Ok(column[start..=end].iter().map(|f| f - 1.0).collect())
    }

    /// Price inflation rates for `[y0, y1]` inclusive
    pub fn price_inflation_rates(&self, y0: i32, y1: i32) -> TaxResult<Vec<f64>> {
        self.rates(&self.price_category, y0, y1)
    }

    /// Wage growth rates for `[y0, y1]` inclusive
    pub fn wage_growth_rates(&self, y0: i32, y1: i32) -> TaxResult<Vec<f64>> {
        self.rates(&self.wage_category, y0, y1)
    }

    /// New table with additive growth differences applied
    ///
    /// The receiver is left untouched so populations already sharing it
    /// keep their view of the baseline growth path.
    pub fn with_difference(&self, diff: &GrowthDiff) -> TaxResult<Self> {
        let mut table = self.clone();
        for category in diff.categories() {
            let column = table
                .factors
                .get_mut(category)
                .ok_or_else(|| TaxError::UnknownCategory(category.to_string()))?;
            for (i, value) in column.iter_mut().enumerate() {
                let year = self.first_year + i as i32;
                let adj = diff.difference(category, year);
                *value += adj;
                if *value <= 0.0 {
                    return Err(TaxError::config(format!(
                        "growth difference drives {} factor in {} to {}",
                        category, year, value
                    )));
                }
            }
        }
        Ok(table)
    }
}
