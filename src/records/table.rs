//! Columnar numeric table read from CSV
//!
//! Every record source (cross-section, full panel, subsample) is first read
//! into a `DataTable`. Rows remember their position in the original source
//! so a subsample can be matched against full-sample weights.

use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

use crate::error::{TaxError, TaxResult};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataTable {
    names: Vec<String>,
    columns: BTreeMap<String, Vec<f64>>,
    row_index: Vec<usize>,
}

impl DataTable {
    pub fn from_path<P: AsRef<Path>>(path: P) -> TaxResult<Self> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(file)
    }

    /// Read a CSV with a header row; blank cells read as zero
    pub fn from_reader<R: Read>(reader: R) -> TaxResult<Self> {
        let mut csv_reader = csv::Reader::from_reader(reader);
        let names: Vec<String> = csv_reader
            .headers()?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();

        let mut values: Vec<Vec<f64>> = vec![Vec::new(); names.len()];
        for (row_num, result) in csv_reader.records().enumerate() {
            let record = result?;
            for (i, cell) in record.iter().enumerate() {
                let cell = cell.trim();
                let v = if cell.is_empty() {
                    0.0
                } else {
                    cell.parse::<f64>().map_err(|_| {
                        TaxError::config(format!(
                            "row {} column {} has non-numeric value `{}`",
                            row_num + 1,
                            names[i],
                            cell
                        ))
                    })?
                };
                values[i].push(v);
            }
        }

        Self::from_columns(names.into_iter().zip(values).collect())
    }

    /// Build from named columns of equal length
    pub fn from_columns(columns: Vec<(String, Vec<f64>)>) -> TaxResult<Self> {
        let len = columns.first().map_or(0, |(_, v)| v.len());
        let mut table = DataTable {
            names: Vec::with_capacity(columns.len()),
            columns: BTreeMap::new(),
            row_index: (0..len).collect(),
        };
        for (name, values) in columns {
            if values.len() != len {
                return Err(TaxError::LengthMismatch {
                    name,
                    expected: len,
                    actual: values.len(),
                });
            }
            if table.columns.insert(name.clone(), values).is_some() {
                return Err(TaxError::config(format!("duplicate column {}", name)));
            }
            table.names.push(name);
        }
        Ok(table)
    }

    pub fn len(&self) -> usize {
        self.row_index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.row_index.is_empty()
    }

    /// Column names in source order
    pub fn column_names(&self) -> &[String] {
        &self.names
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }

    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.columns.get(name).map(|v| v.as_slice())
    }

    pub fn column_mut(&mut self, name: &str) -> Option<&mut Vec<f64>> {
        self.columns.get_mut(name)
    }

    /// Replace or add a column
    pub fn set_column(&mut self, name: &str, values: Vec<f64>) -> TaxResult<()> {
        if values.len() != self.len() {
            return Err(TaxError::LengthMismatch {
                name: name.to_string(),
                expected: self.len(),
                actual: values.len(),
            });
        }
        if self.columns.insert(name.to_string(), values).is_none() {
            self.names.push(name.to_string());
        }
        Ok(())
    }

    /// Position of each row in the original source
    pub fn row_index(&self) -> &[usize] {
        &self.row_index
    }

    /// Subset of rows by position in this table, keeping source positions
    pub fn select_rows(&self, rows: &[usize]) -> TaxResult<Self> {
        if let Some(&bad) = rows.iter().find(|&&r| r >= self.len()) {
            return Err(TaxError::state(format!(
                "row {} out of range for a table of {} rows",
                bad,
                self.len()
            )));
        }
        let columns = self
            .columns
            .iter()
            .map(|(name, values)| (name.clone(), rows.iter().map(|&r| values[r]).collect()))
            .collect();
        Ok(DataTable {
            names: self.names.clone(),
            columns,
            row_index: rows.iter().map(|&r| self.row_index[r]).collect(),
        })
    }

    /// Rows whose `column` equals `value`, renumbered from zero
    pub fn rows_where(&self, column: &str, value: f64) -> TaxResult<Self> {
        let col = self
            .column(column)
            .ok_or_else(|| TaxError::MissingVariables(column.to_string()))?;
        let rows: Vec<usize> = (0..col.len()).filter(|&i| col[i] == value).collect();
        let mut table = self.select_rows(&rows)?;
        table.row_index = (0..rows.len()).collect();
        Ok(table)
    }
}
