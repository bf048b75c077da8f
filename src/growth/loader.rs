//! CSV loading for year-indexed factor tables
//!
//! Both the growth factor table and the panel blow-up table share the same
//! layout: a `YEAR` column followed by one numeric column per category.

use std::collections::BTreeMap;
use std::io::Read;

use crate::error::{TaxError, TaxResult};

/// Embedded default growth factors (data/growfactors.csv)
pub const DEFAULT_GROWFACTORS_CSV: &str = include_str!("../../data/growfactors.csv");

/// Name of the year column in every factor table
pub const YEAR_COLUMN: &str = "YEAR";

/// Raw year-indexed columns as read from CSV
#[derive(Debug, Clone)]
pub(crate) struct YearColumns {
    pub years: Vec<i32>,
    pub columns: BTreeMap<String, Vec<f64>>,
}

/// Read a year-indexed factor table from any reader
///
/// `what` names the table in error messages.
pub(crate) fn read_year_columns<R: Read>(reader: R, what: &str) -> TaxResult<YearColumns> {
    let mut csv_reader = csv::Reader::from_reader(reader);
    let headers = csv_reader.headers()?.clone();

    let year_idx = headers
        .iter()
        .position(|h| h.trim() == YEAR_COLUMN)
        .ok_or_else(|| TaxError::config(format!("{} has no {} column", what, YEAR_COLUMN)))?;

    let names: Vec<String> = headers.iter().map(|h| h.trim().to_string()).collect();
    let mut years = Vec::new();
    let mut columns: BTreeMap<String, Vec<f64>> = names
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != year_idx)
        .map(|(_, n)| (n.clone(), Vec::new()))
        .collect();

    for (row_num, result) in csv_reader.records().enumerate() {
        let record = result?;
        let year: i32 = record[year_idx].trim().parse().map_err(|_| {
            TaxError::config(format!(
                "{}: row {} has non-integer year `{}`",
                what,
                row_num + 1,
                &record[year_idx]
            ))
        })?;
        years.push(year);

        for (i, cell) in record.iter().enumerate() {
            if i == year_idx {
                continue;
            }
            let value: f64 = cell.trim().parse().map_err(|_| {
                TaxError::config(format!(
                    "{}: year {} column {} has non-numeric value `{}`",
                    what, year, names[i], cell
                ))
            })?;
            if let Some(col) = columns.get_mut(&names[i]) {
                col.push(value);
            }
        }
    }

    if years.is_empty() {
        return Err(TaxError::config(format!("{} contains no rows", what)));
    }
    for pair in years.windows(2) {
        if pair[1] != pair[0] + 1 {
            return Err(TaxError::config(format!(
                "{} years must be contiguous and ascending ({} followed by {})",
                what, pair[0], pair[1]
            )));
        }
    }

    Ok(YearColumns { years, columns })
}
