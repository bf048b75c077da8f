//! Year-keyed sample weights (`WT<year>` columns)

use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

use super::table::DataTable;
use crate::error::{TaxError, TaxResult};

/// Prefix of every weight column
pub const WEIGHT_PREFIX: &str = "WT";

/// Full-sample weights, one column per year
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WeightTable {
    len: usize,
    columns: BTreeMap<i32, Vec<f64>>,
}

impl WeightTable {
    pub fn from_path<P: AsRef<Path>>(path: P) -> TaxResult<Self> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(file)
    }

    pub fn from_reader<R: Read>(reader: R) -> TaxResult<Self> {
        Self::from_table(&DataTable::from_reader(reader)?)
    }

    /// Pick the `WT<year>` columns out of a table; other columns are skipped
    pub fn from_table(table: &DataTable) -> TaxResult<Self> {
        let mut columns = BTreeMap::new();
        for name in table.column_names() {
            let year = name
                .strip_prefix(WEIGHT_PREFIX)
                .and_then(|y| y.parse::<i32>().ok());
            match (year, table.column(name)) {
                (Some(year), Some(values)) => {
                    columns.insert(year, values.to_vec());
                }
                _ => log::warn!("weights column {} is not a {}<year> column", name, WEIGHT_PREFIX),
            }
        }
        Self::from_columns(columns)
    }

    pub fn from_columns(columns: BTreeMap<i32, Vec<f64>>) -> TaxResult<Self> {
        let len = columns.values().next().map_or(0, |v| v.len());
        for (year, values) in &columns {
            if values.len() != len {
                return Err(TaxError::LengthMismatch {
                    name: format!("{}{}", WEIGHT_PREFIX, year),
                    expected: len,
                    actual: values.len(),
                });
            }
            if let Some(w) = values.iter().find(|w| !(w.is_finite() && **w >= 0.0)) {
                return Err(TaxError::config(format!(
                    "{}{} has invalid weight {}",
                    WEIGHT_PREFIX, year, w
                )));
            }
        }
        Ok(Self { len, columns })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn years(&self) -> impl Iterator<Item = i32> + '_ {
        self.columns.keys().copied()
    }

    pub fn column(&self, year: i32) -> Option<&[f64]> {
        self.columns.get(&year).map(|v| v.as_slice())
    }

    /// Weights matched to a population drawn from the full sample
    ///
    /// When the population has as many rows as the table the table is used
    /// as is. Otherwise the rows at `row_index` are selected and each year's
    /// column is scaled so it sums to the full-sample total.
    pub fn reconcile(&self, row_index: &[usize]) -> TaxResult<WeightTable> {
        if row_index.len() == self.len {
            return Ok(self.clone());
        }
        if let Some(&bad) = row_index.iter().find(|&&r| r >= self.len) {
            return Err(TaxError::state(format!(
                "record row {} has no weight (table has {} rows)",
                bad, self.len
            )));
        }

        let mut columns = BTreeMap::new();
        for (&year, full) in &self.columns {
            let full_sum: f64 = full.iter().sum();
            let mut sub: Vec<f64> = row_index.iter().map(|&r| full[r]).collect();
            let sub_sum: f64 = sub.iter().sum();
            if sub_sum > 0.0 {
                let factor = full_sum / sub_sum;
                sub.iter_mut().for_each(|w| *w *= factor);
            }
            columns.insert(year, sub);
        }
        log::debug!(
            "reconciled {} full-sample weights to {} records",
            self.len,
            row_index.len()
        );
        Ok(WeightTable {
            len: row_index.len(),
            columns,
        })
    }

    /// Weights for `year` spread over `n` records
    ///
    /// A column of the wrong length is replaced by its mean for every record.
    pub fn weights_for_year(&self, year: i32, n: usize) -> Option<Vec<f64>> {
        let col = self.columns.get(&year)?;
        if col.len() == n {
            Some(col.clone())
        } else if col.is_empty() {
            Some(vec![0.0; n])
        } else {
            let mean = col.iter().sum::<f64>() / col.len() as f64;
            Some(vec![mean; n])
        }
    }
}
