//! Distribution and difference tables over calculated results
//!
//! Rows group records either into weighted deciles of an income measure
//! or into fixed income bins. Bins are left-inclusive: edges `[a, b, c]`
//! give rows `[a, b)` and `[b, c)`. Every table ends its main block with
//! an `ALL` row.

use std::io::Write;

use crate::calc::Calculator;
use crate::error::{TaxError, TaxResult};
use crate::records::PopulationKind;

pub const STANDARD_INCOME_BINS: [f64; 14] = [
    -9e99, -1e-9, 1e-9, 10e3, 20e3, 30e3, 40e3, 50e3, 75e3, 100e3, 200e3, 500e3, 1e6, 9e99,
];

pub const STANDARD_ROW_NAMES: [&str; 14] = [
    "<0K", "=0K", "0-10K", "10-20K", "20-30K", "30-40K", "40-50K", "50-75K", "75-100K",
    "100-200K", "200-500K", "500-1000K", ">1000K", "ALL",
];

pub const DECILE_ROW_NAMES: [&str; 16] = [
    "0-10n", "0-10z", "0-10p", "10-20", "20-30", "30-40", "40-50", "50-60", "60-70", "70-80",
    "80-90", "90-100", "ALL", "90-95", "95-99", "Top 1%",
];

pub const DIFF_TABLE_COLUMNS: [&str; 9] = [
    "count",
    "tax_cut",
    "perc_cut",
    "tax_inc",
    "perc_inc",
    "mean",
    "tot_change",
    "share_of_change",
    "pc_aftertaxinc",
];

/// How records are split into table rows
#[derive(Debug, Clone, PartialEq)]
pub enum Grouping {
    /// Ten equal-weight groups, with the bottom decile split by income sign
    /// and the top decile split into 90-95, 95-99 and the top 1%
    WeightedDeciles,
    /// Left-inclusive income bins; labels must have one entry per bin
    IncomeBins { edges: Vec<f64>, labels: Vec<String> },
}

impl Grouping {
    pub fn standard_income_bins() -> Self {
        Grouping::IncomeBins {
            edges: STANDARD_INCOME_BINS.to_vec(),
            labels: STANDARD_ROW_NAMES[..STANDARD_ROW_NAMES.len() - 1]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

/// Labelled rows of named columns
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<(String, Vec<f64>)>,
}

impl Table {
    pub fn row(&self, label: &str) -> Option<&[f64]> {
        self.rows
            .iter()
            .find(|(l, _)| l == label)
            .map(|(_, v)| v.as_slice())
    }

    pub fn value(&self, label: &str, column: &str) -> Option<f64> {
        let col = self.columns.iter().position(|c| c == column)?;
        self.row(label).map(|r| r[col])
    }

    pub fn write_csv<W: Write>(&self, writer: W) -> TaxResult<()> {
        let mut wtr = csv::Writer::from_writer(writer);
        let mut header = vec!["row"];
        header.extend(self.columns.iter().map(|c| c.as_str()));
        wtr.write_record(&header)?;
        for (label, values) in &self.rows {
            let mut record = vec![label.clone()];
            record.extend(values.iter().map(|v| v.to_string()));
            wtr.write_record(&record)?;
        }
        wtr.flush()?;
        Ok(())
    }
}

/// Index of the row each record falls in, plus the row labels
///
/// For deciles the labels exclude `ALL` and the top-decile total; those
/// are added when the table is assembled.
fn assign_rows(income: &[f64], weight: &[f64], grouping: &Grouping) -> TaxResult<(Vec<usize>, Vec<String>)> {
    match grouping {
        Grouping::IncomeBins { edges, labels } => {
            if edges.len() < 2 || labels.len() != edges.len() - 1 {
                return Err(TaxError::config(format!(
                    "{} bin edges need {} labels, got {}",
                    edges.len(),
                    edges.len().saturating_sub(1),
                    labels.len()
                )));
            }
            let rows = income
                .iter()
                .map(|x| {
                    edges
                        .windows(2)
                        .position(|e| *x >= e[0] && *x < e[1])
                        .ok_or_else(|| TaxError::config(format!("income {} is outside every bin", x)))
                })
                .collect::<TaxResult<Vec<usize>>>()?;
            Ok((rows, labels.clone()))
        }
        Grouping::WeightedDeciles => {
            let mut order: Vec<usize> = (0..income.len()).collect();
            order.sort_by(|&a, &b| income[a].total_cmp(&income[b]));
            let total: f64 = weight.iter().sum();
            let width = total / 10.0;

            // 0-2 bottom decile by sign, 3-10 deciles two to nine, 11-13 top detail
            let mut rows = vec![0; income.len()];
            let mut cumsum = 0.0;
            for &i in &order {
                cumsum += weight[i];
                let position = if width > 0.0 { cumsum / width } else { 0.0 };
                rows[i] = if position < 1.0 {
                    if income[i] < -1e-9 {
                        0
                    } else if income[i] < 1e-9 {
                        1
                    } else {
                        2
                    }
                } else if position < 9.0 {
                    2 + position.floor() as usize
                } else if position < 9.5 {
                    11
                } else if position < 9.9 {
                    12
                } else {
                    13
                };
            }
            let labels = DECILE_ROW_NAMES
                .iter()
                .filter(|l| !matches!(**l, "ALL" | "90-100"))
                .map(|s| s.to_string())
                .collect();
            Ok((rows, labels))
        }
    }
}

/// Per-row sums of additive columns, with `ALL` (and the top decile for
/// decile grouping) inserted in display order
fn additive_rows(
    rows: &[usize],
    labels: Vec<String>,
    grouping: &Grouping,
    values: &[Vec<f64>],
) -> Vec<(String, Vec<f64>)> {
    let mut sums = vec![vec![0.0; values.len()]; labels.len()];
    for (i, &row) in rows.iter().enumerate() {
        for (c, column) in values.iter().enumerate() {
            sums[row][c] += column[i];
        }
    }
    let total_of = |range: &[Vec<f64>]| -> Vec<f64> {
        (0..values.len())
            .map(|c| range.iter().map(|r| r[c]).sum())
            .collect()
    };
    let all = total_of(&sums);
    let mut out: Vec<(String, Vec<f64>)> = labels.into_iter().zip(sums.iter().cloned()).collect();
    match grouping {
        Grouping::WeightedDeciles => {
            let top = total_of(&sums[11..]);
            let detail = out.split_off(11);
            out.push(("90-100".to_string(), top));
            out.push(("ALL".to_string(), all));
            out.extend(detail);
        }
        Grouping::IncomeBins { .. } => out.push(("ALL".to_string(), all)),
    }
    out
}

fn weighted(values: &[f64], weight: &[f64]) -> Vec<f64> {
    values.iter().zip(weight).map(|(v, w)| v * w).collect()
}

/// Weighted sums of `vars` by row, with a leading `weight` column
pub fn distribution_table(
    calc: &Calculator,
    kind: PopulationKind,
    income_measure: &str,
    vars: &[&str],
    grouping: &Grouping,
) -> TaxResult<Table> {
    let records = calc.records(kind)?;
    let weight = records.weights();
    let income = records.values(income_measure)?;
    let (rows, labels) = assign_rows(&income, weight, grouping)?;

    let mut values = vec![weight.to_vec()];
    for var in vars {
        values.push(weighted(&records.values(var)?, weight));
    }
    let mut columns = vec!["weight".to_string()];
    columns.extend(vars.iter().map(|v| v.to_string()));
    Ok(Table {
        columns,
        rows: additive_rows(&rows, labels, grouping, &values),
    })
}

/// Change in `tax_var` from `baseline` to `reform`, grouped by baseline income
///
/// After-tax income is `income_measure - tax_var` in each calculator.
/// Both calculators must hold the same records in the same order.
pub fn difference_table(
    baseline: &Calculator,
    reform: &Calculator,
    kind: PopulationKind,
    income_measure: &str,
    tax_var: &str,
    grouping: &Grouping,
) -> TaxResult<Table> {
    let base = baseline.records(kind)?;
    let refm = reform.records(kind)?;
    let weight = base.weights();
    let same_weights = weight.len() == refm.weights().len()
        && weight
            .iter()
            .zip(refm.weights())
            .all(|(a, b)| (a - b).abs() <= 1e-9 * a.abs().max(1.0));
    if !same_weights {
        return Err(TaxError::state(format!(
            "baseline and reform {} records differ",
            kind.as_str()
        )));
    }

    let income1 = base.values(income_measure)?;
    let income2 = refm.values(income_measure)?;
    let tax1 = base.values(tax_var)?;
    let tax2 = refm.values(tax_var)?;
    let diff: Vec<f64> = tax2.iter().zip(&tax1).map(|(b, a)| b - a).collect();
    let (rows, labels) = assign_rows(&income1, weight, grouping)?;

    let flag = |pred: fn(f64) -> bool| -> Vec<f64> {
        diff.iter()
            .zip(weight)
            .map(|(d, w)| if pred(*d) { *w } else { 0.0 })
            .collect()
    };
    let aftertax = |inc: &[f64], tax: &[f64]| -> Vec<f64> {
        inc.iter().zip(tax).zip(weight).map(|((i, t), w)| (i - t) * w).collect()
    };
    let values = vec![
        weight.to_vec(),
        flag(|d| d < 0.0),
        flag(|d| d > 0.0),
        weighted(&diff, weight),
        aftertax(&income1, &tax1),
        aftertax(&income2, &tax2),
    ];
    let additive = additive_rows(&rows, labels, grouping, &values);

    let total_change = additive
        .iter()
        .find(|(l, _)| l == "ALL")
        .map_or(0.0, |(_, v)| v[3]);
    let pct = |part: f64, whole: f64| if whole > 0.0 { 100.0 * part / whole } else { 0.0 };
    let rows = additive
        .into_iter()
        .map(|(label, v)| {
            let (count, cut, inc, tot, at1, at2) = (v[0], v[1], v[2], v[3], v[4], v[5]);
            let share = if total_change == 0.0 {
                f64::NAN
            } else {
                100.0 * tot / total_change
            };
            let pc_aftertax = if at1 == 0.0 {
                f64::NAN
            } else {
                100.0 * (at2 / at1 - 1.0)
            };
            let mean = if count > 0.0 { tot / count } else { 0.0 };
            let row = vec![
                count,
                cut,
                pct(cut, count),
                inc,
                pct(inc, count),
                mean,
                tot,
                share,
                pc_aftertax,
            ];
            (label, row)
        })
        .collect();
    Ok(Table {
        columns: DIFF_TABLE_COLUMNS.iter().map(|c| c.to_string()).collect(),
        rows,
    })
}
