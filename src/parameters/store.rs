//! Year-indexed policy parameter store
//!
//! Every parameter is held as one row per year over the store horizon
//! `[start_year, start_year + num_years)`. Rows past the last explicit
//! year are derived with [`expand`], compounding the price or wage growth
//! rate when the parameter is inflation-indexed.
//!
//! Cloning a store is a deep copy. Two pipelines that must diverge
//! (baseline and reform) each hold their own clone, so a reform applied to
//! one can never leak into the other.

use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

use super::data::{Indexing, ParamKind, ParameterSpec, ValidValues};
use super::expand::expand;
use super::reform::{Reform, ReformValue, CPI_SUFFIX};
use crate::error::{TaxError, TaxResult};
use crate::growth::GrowthFactorTable;

/// Embedded current-law policy (data/current_law_policy.json)
pub const DEFAULT_POLICY_JSON: &str = include_str!("../../data/current_law_policy.json");

/// Years covered by the current-law store
pub const DEFAULT_NUM_YEARS: usize = 14;

/// Growth rates used for indexing, one per horizon year
#[derive(Debug, Clone, PartialEq)]
pub struct IndexRates {
    pub price: Vec<f64>,
    pub wage: Vec<f64>,
}

impl IndexRates {
    /// Rates for `num_years` years starting at `start_year`
    pub fn from_growth(
        growth: &GrowthFactorTable,
        start_year: i32,
        num_years: usize,
    ) -> TaxResult<Self> {
        if num_years == 0 {
            return Err(TaxError::config("parameter horizon must cover at least one year"));
        }
        let last = start_year + num_years as i32 - 1;
        Ok(Self {
            price: growth.price_inflation_rates(start_year, last)?,
            wage: growth.wage_growth_rates(start_year, last)?,
        })
    }

    /// Same rate every year
    pub fn constant(price: f64, wage: f64, num_years: usize) -> Self {
        Self {
            price: vec![price; num_years],
            wage: vec![wage; num_years],
        }
    }

    fn for_indexing(&self, indexing: Indexing) -> &[f64] {
        match indexing {
            Indexing::Price => &self.price,
            Indexing::Wage => &self.wage,
        }
    }
}

/// One policy parameter expanded over the store horizon
#[derive(Debug, Clone)]
pub struct Parameter {
    name: String,
    long_name: String,
    kind: ParamKind,
    col_label: Vec<String>,
    indexing: Indexing,
    cpi_inflatable: bool,
    cpi_inflated: bool,
    valid_values: Option<ValidValues>,
    /// Index of the last row set explicitly (by the file or a reform)
    explicit_through: usize,
    rows: Vec<Vec<f64>>,
}

impl Parameter {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn long_name(&self) -> &str {
        &self.long_name
    }

    pub fn kind(&self) -> ParamKind {
        self.kind
    }

    pub fn col_label(&self) -> &[String] {
        &self.col_label
    }

    pub fn indexing(&self) -> Indexing {
        self.indexing
    }

    pub fn is_cpi_inflated(&self) -> bool {
        self.cpi_inflated
    }

    pub fn is_cpi_inflatable(&self) -> bool {
        self.cpi_inflatable
    }

    /// Last year with an explicitly set value
    pub fn last_explicit_year(&self, start_year: i32) -> i32 {
        start_year + self.explicit_through as i32
    }

    fn check_values(&self, values: &[f64]) -> TaxResult<()> {
        if let Some(range) = &self.valid_values {
            if let Some(v) = values.iter().find(|v| !range.contains(**v)) {
                return Err(TaxError::config(format!(
                    "value {} for {} is outside [{}, {}]",
                    v,
                    self.name,
                    range.min.map_or("-inf".to_string(), |m| m.to_string()),
                    range.max.map_or("inf".to_string(), |m| m.to_string()),
                )));
            }
        }
        if self.kind == ParamKind::Integer {
            if let Some(v) = values.iter().find(|v| v.fract() != 0.0) {
                return Err(TaxError::config(format!(
                    "integer parameter {} cannot take value {}",
                    self.name, v
                )));
            }
        }
        Ok(())
    }

    fn bracket_index(&self, suffix: &str) -> Option<usize> {
        self.col_label.iter().position(|l| l == suffix)
    }

    /// Bracket count for column overrides (tiers share a bracket label)
    fn tiers(&self) -> usize {
        match self.kind {
            ParamKind::Matrix(_, t) => t,
            _ => 1,
        }
    }
}

/// Resolved changes to one parameter in one year
#[derive(Debug, Default)]
struct Event {
    row: Option<Vec<f64>>,
    /// (bracket, values for that bracket)
    brackets: Vec<(usize, Vec<f64>)>,
    indexing: Option<bool>,
}

impl Event {
    fn sets_values(&self) -> bool {
        self.row.is_some() || !self.brackets.is_empty()
    }
}

/// Year-indexed policy parameters with a current-year cursor
#[derive(Debug, Clone)]
pub struct ParameterStore {
    start_year: i32,
    num_years: usize,
    current_year: i32,
    rates: IndexRates,
    params: BTreeMap<String, Parameter>,
}

impl ParameterStore {
    /// Current-law policy indexed by the given growth table
    pub fn current_law(growth: &GrowthFactorTable) -> TaxResult<Self> {
        Self::from_reader(DEFAULT_POLICY_JSON.as_bytes(), growth, DEFAULT_NUM_YEARS)
    }

    /// Load a policy file, taking index rates from `growth`
    pub fn from_path<P: AsRef<Path>>(
        path: P,
        growth: &GrowthFactorTable,
        num_years: usize,
    ) -> TaxResult<Self> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(file, growth, num_years)
    }

    /// Load policy JSON from any reader, taking index rates from `growth`
    pub fn from_reader<R: Read>(
        reader: R,
        growth: &GrowthFactorTable,
        num_years: usize,
    ) -> TaxResult<Self> {
        let specs: BTreeMap<String, ParameterSpec> = serde_json::from_reader(reader)?;
        let start_year = common_start_year(&specs)?;
        let rates = IndexRates::from_growth(growth, start_year, num_years)?;
        Self::from_specs(specs, rates)
    }

    /// Load policy JSON with explicit index rates (horizon = rates length)
    pub fn from_reader_with_rates<R: Read>(reader: R, rates: IndexRates) -> TaxResult<Self> {
        let specs: BTreeMap<String, ParameterSpec> = serde_json::from_reader(reader)?;
        Self::from_specs(specs, rates)
    }

    /// Build from parsed parameter metadata
    pub fn from_specs(specs: BTreeMap<String, ParameterSpec>, rates: IndexRates) -> TaxResult<Self> {
        let start_year = common_start_year(&specs)?;
        let num_years = rates.price.len();
        if num_years == 0 || rates.wage.len() != num_years {
            return Err(TaxError::config(format!(
                "index rates must cover the same non-empty horizon ({} price, {} wage)",
                rates.price.len(),
                rates.wage.len()
            )));
        }

        let mut params = BTreeMap::new();
        for (key, spec) in specs {
            let name = key.trim_start_matches('_').to_string();
            let (kind, raw) = spec.parse_rows(&name)?;
            if spec.cpi_inflated && !spec.cpi_inflatable {
                return Err(TaxError::config(format!(
                    "parameter {} is CPI-indexed but not inflatable",
                    name
                )));
            }
            let rows = expand(
                &raw,
                num_years,
                spec.cpi_inflated,
                rates.for_indexing(spec.indexing),
            )?;
            let param = Parameter {
                long_name: spec.long_name,
                kind,
                col_label: spec.col_label,
                indexing: spec.indexing,
                cpi_inflatable: spec.cpi_inflatable,
                cpi_inflated: spec.cpi_inflated,
                valid_values: spec.valid_values,
                explicit_through: raw.len().min(num_years) - 1,
                rows,
                name: name.clone(),
            };
            for row in &raw {
                param.check_values(row)?;
            }
            params.insert(name, param);
        }

        log::info!(
            "loaded {} policy parameters for {}..{}",
            params.len(),
            start_year,
            start_year + num_years as i32 - 1
        );
        Ok(Self {
            start_year,
            num_years,
            current_year: start_year,
            rates,
            params,
        })
    }

    pub fn start_year(&self) -> i32 {
        self.start_year
    }

    /// Last year of the horizon
    pub fn end_year(&self) -> i32 {
        self.start_year + self.num_years as i32 - 1
    }

    pub fn num_years(&self) -> usize {
        self.num_years
    }

    pub fn current_year(&self) -> i32 {
        self.current_year
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.params.keys().map(|s| s.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.params.contains_key(name.trim_start_matches('_'))
    }

    pub fn parameter(&self, name: &str) -> TaxResult<&Parameter> {
        self.params
            .get(name.trim_start_matches('_'))
            .ok_or_else(|| TaxError::UnknownParameter(name.to_string()))
    }

    /// Price inflation rate for `year`
    pub fn inflation_rate(&self, year: i32) -> TaxResult<f64> {
        Ok(self.rates.price[self.year_index(year)?])
    }

    /// Wage growth rate for `year`
    pub fn wage_growth_rate(&self, year: i32) -> TaxResult<f64> {
        Ok(self.rates.wage[self.year_index(year)?])
    }

    fn year_index(&self, year: i32) -> TaxResult<usize> {
        if year < self.start_year || year > self.end_year() {
            return Err(TaxError::YearOutOfRange {
                year,
                first: self.start_year,
                last: self.end_year(),
            });
        }
        Ok((year - self.start_year) as usize)
    }

    /// Full row (all brackets) of `name` for `year`
    pub fn value(&self, name: &str, year: i32) -> TaxResult<&[f64]> {
        let param = self.parameter(name)?;
        let idx = self.year_index(year)?;
        Ok(&param.rows[idx])
    }

    /// Single value of a scalar parameter
    pub fn scalar(&self, name: &str, year: i32) -> TaxResult<f64> {
        let param = self.parameter(name)?;
        if !param.kind.is_scalar() {
            return Err(TaxError::config(format!(
                "parameter {} is {:?}, not a scalar",
                param.name, param.kind
            )));
        }
        Ok(self.value(name, year)?[0])
    }

    /// Per-entity values of a vector parameter, selected by bracket index
    ///
    /// `selector[i]` picks the bracket for entity `i` (e.g. its age group).
    pub fn value_by_bracket(&self, name: &str, year: i32, selector: &[i32]) -> TaxResult<Vec<f64>> {
        let row = self.value(name, year)?;
        selector
            .iter()
            .map(|&b| {
                usize::try_from(b)
                    .ok()
                    .and_then(|b| row.get(b).copied())
                    .ok_or_else(|| {
                        TaxError::config(format!(
                            "bracket {} out of range for {} ({} brackets)",
                            b,
                            name,
                            row.len()
                        ))
                    })
            })
            .collect()
    }

    /// Move the current-year cursor
    pub fn set_year(&mut self, year: i32) -> TaxResult<()> {
        self.year_index(year)?;
        self.current_year = year;
        Ok(())
    }

    pub fn increment_year(&mut self) -> TaxResult<()> {
        self.set_year(self.current_year + 1)
    }

    /// Read-only snapshot of the current year
    pub fn view(&self) -> PolicyView<'_> {
        PolicyView {
            store: self,
            year: self.current_year,
        }
    }

    /// Apply `reform` to this store's own arrays
    ///
    /// Every override is validated before any array is touched: target
    /// years must lie in `[current_year, end_year]`, names must resolve, and
    /// values must fit the parameter's width and valid range. Callers
    /// holding a baseline that must not change should apply the reform to a
    /// clone.
    pub fn implement_reform(&mut self, reform: &Reform) -> TaxResult<()> {
        let mut plan: BTreeMap<String, BTreeMap<i32, Event>> = BTreeMap::new();
        for (key, by_year) in reform.iter() {
            for (&year, value) in by_year {
                self.check_reform_year(year)?;
                self.resolve(key, year, value, &mut plan)?;
            }
        }

        for (name, events) in &plan {
            // resolved names always exist
            if let Some(param) = self.params.get_mut(name) {
                apply_events(param, events, self.start_year, &self.rates)?;
            }
        }

        log::info!(
            "implemented reform on {} parameter(s) from {}",
            plan.len(),
            reform.first_year().unwrap_or(self.current_year)
        );
        Ok(())
    }

    fn check_reform_year(&self, year: i32) -> TaxResult<()> {
        if year < self.current_year {
            return Err(TaxError::RetroactiveReform {
                year,
                current: self.current_year,
            });
        }
        if year > self.end_year() {
            return Err(TaxError::YearOutOfRange {
                year,
                first: self.start_year,
                last: self.end_year(),
            });
        }
        Ok(())
    }

    /// Turn one raw reform key into an event on a known parameter
    fn resolve(
        &self,
        key: &str,
        year: i32,
        value: &ReformValue,
        plan: &mut BTreeMap<String, BTreeMap<i32, Event>>,
    ) -> TaxResult<()> {
        let name = key.trim_start_matches('_');

        if let Some(base) = name.strip_suffix(CPI_SUFFIX) {
            if let Some(param) = self.params.get(base) {
                let flag = match value {
                    ReformValue::Bool(b) => *b,
                    ReformValue::Values(v) if v.len() == 1 => v[0] != 0.0,
                    _ => {
                        return Err(TaxError::config(format!(
                            "indexing override {} must be a boolean",
                            key
                        )))
                    }
                };
                if matches!(param.kind, ParamKind::Integer | ParamKind::Boolean) {
                    return Err(TaxError::config(format!(
                        "integer or boolean parameter {} cannot be CPI-indexed",
                        base
                    )));
                }
                if flag && !param.cpi_inflatable {
                    return Err(TaxError::config(format!(
                        "parameter {} is not CPI-inflatable",
                        base
                    )));
                }
                event(plan, base, year).indexing = Some(flag);
                return Ok(());
            }
        }

        if let Some(param) = self.params.get(name) {
            let row = match (value, param.kind) {
                (ReformValue::Bool(b), ParamKind::Boolean) => vec![if *b { 1.0 } else { 0.0 }],
                (ReformValue::Bool(_), _) => {
                    return Err(TaxError::config(format!(
                        "parameter {} takes numbers, not a boolean",
                        name
                    )))
                }
                (ReformValue::Values(v), _) => v.clone(),
            };
            if row.len() != param.kind.width() {
                return Err(TaxError::config(format!(
                    "reform for {} in {} has {} value(s), expected {}",
                    name,
                    year,
                    row.len(),
                    param.kind.width()
                )));
            }
            if param.kind == ParamKind::Boolean && row.iter().any(|v| *v != 0.0 && *v != 1.0) {
                return Err(TaxError::config(format!("boolean parameter {} needs 0 or 1", name)));
            }
            param.check_values(&row)?;
            event(plan, name, year).row = Some(row);
            return Ok(());
        }

        // bracket suffix: longest parameter name that prefixes the key
        let found = self
            .params
            .values()
            .filter(|p| !p.col_label.is_empty())
            .filter_map(|p| {
                name.strip_prefix(p.name.as_str())
                    .and_then(|rest| rest.strip_prefix('_'))
                    .and_then(|suffix| p.bracket_index(suffix))
                    .map(|b| (p, b))
            })
            .max_by_key(|(p, _)| p.name.len());

        let (param, bracket) = found.ok_or_else(|| TaxError::UnknownParameter(key.to_string()))?;
        let values = match value {
            ReformValue::Values(v) if v.len() == param.tiers() => v.clone(),
            _ => {
                return Err(TaxError::config(format!(
                    "bracket override {} needs {} number(s)",
                    key,
                    param.tiers()
                )))
            }
        };
        param.check_values(&values)?;
        event(plan, &param.name, year).brackets.push((bracket, values));
        Ok(())
    }
}

fn event<'a>(
    plan: &'a mut BTreeMap<String, BTreeMap<i32, Event>>,
    name: &str,
    year: i32,
) -> &'a mut Event {
    plan.entry(name.to_string())
        .or_default()
        .entry(year)
        .or_default()
}

/// Splice resolved events into a parameter, re-deriving later rows
///
/// Events are applied in ascending year order. A value event makes its
/// year the last explicit row; an indexing-only event leaves explicit rows
/// alone and re-derives only what follows them.
fn apply_events(
    param: &mut Parameter,
    events: &BTreeMap<i32, Event>,
    start_year: i32,
    rates: &IndexRates,
) -> TaxResult<()> {
    let horizon = param.rows.len();
    let years: Vec<(i32, bool)> = events.iter().map(|(y, e)| (*y, e.sets_values())).collect();

    for (pos, (&year, ev)) in events.iter().enumerate() {
        let idx = (year - start_year) as usize;
        // an indexing-only event keeps its own year's row, so derive it here
        let until = match years.get(pos + 1) {
            Some(&(next, true)) => (next - start_year) as usize,
            Some(&(next, false)) => ((next - start_year) as usize + 1).min(horizon),
            None => horizon,
        };

        if let Some(flag) = ev.indexing {
            param.cpi_inflated = flag;
        }

        let from = if ev.sets_values() {
            let mut row = ev.row.clone().unwrap_or_else(|| param.rows[idx].clone());
            let tiers = param.tiers();
            for (bracket, values) in &ev.brackets {
                row[bracket * tiers..(bracket + 1) * tiers].copy_from_slice(values);
            }
            param.rows[idx] = row;
            param.explicit_through = idx;
            idx + 1
        } else {
            idx.max(param.explicit_through) + 1
        };

        if from < until {
            let derived = expand(
                &param.rows[..from],
                until,
                param.cpi_inflated,
                rates.for_indexing(param.indexing),
            )?;
            param.rows[from..until].clone_from_slice(&derived[from..until]);
        }
        log::debug!(
            "reform sets {} in {} (indexed: {})",
            param.name,
            year,
            param.cpi_inflated
        );
    }
    Ok(())
}

/// Every parameter must start in the same year
fn common_start_year(specs: &BTreeMap<String, ParameterSpec>) -> TaxResult<i32> {
    let mut years = specs.iter().map(|(k, s)| (k, s.start_year));
    let (_, first) = years
        .next()
        .ok_or_else(|| TaxError::config("policy file defines no parameters"))?;
    if let Some((name, y)) = years.find(|(_, y)| *y != first) {
        return Err(TaxError::config(format!(
            "parameter {} starts in {}, others start in {}",
            name, y, first
        )));
    }
    Ok(first)
}

/// Parameter values for one year, handed to formulas
#[derive(Debug, Clone, Copy)]
pub struct PolicyView<'a> {
    store: &'a ParameterStore,
    year: i32,
}

impl<'a> PolicyView<'a> {
    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn scalar(&self, name: &str) -> TaxResult<f64> {
        self.store.scalar(name, self.year)
    }

    /// Integer parameter as a count (negative values clamp to 0)
    pub fn count(&self, name: &str) -> TaxResult<usize> {
        Ok(self.scalar(name)?.max(0.0) as usize)
    }

    pub fn flag(&self, name: &str) -> TaxResult<bool> {
        Ok(self.scalar(name)? != 0.0)
    }

    pub fn row(&self, name: &str) -> TaxResult<&'a [f64]> {
        self.store.value(name, self.year)
    }

    pub fn by_bracket(&self, name: &str, selector: &[i32]) -> TaxResult<Vec<f64>> {
        self.store.value_by_bracket(name, self.year, selector)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const POLICY: &str = r#"{
        "_rate": {
            "start_year": 2017, "row_label": ["2017"], "col_label": "",
            "valid_values": {"min": 0, "max": 1},
            "value": [0.1]
        },
        "_thd": {
            "start_year": 2017, "row_label": ["2017", "2018"], "col_label": "",
            "cpi_inflated": true, "cpi_inflatable": true,
            "value": [1000.0, 1100.0]
        },
        "_brk": {
            "start_year": 2017, "row_label": ["2017"],
            "col_label": ["general", "senior", "super_senior"],
            "cpi_inflatable": true,
            "value": [[100.0, 200.0, 300.0]]
        },
        "_wage_thd": {
            "start_year": 2017, "row_label": ["2017"], "col_label": "",
            "cpi_inflated": true, "cpi_inflatable": true, "indexing": "wage",
            "value": [500.0]
        },
        "_limit": {
            "start_year": 2017, "row_label": ["2017"], "col_label": "",
            "integer_value": true, "value": [8]
        },
        "_switch": {
            "start_year": 2017, "row_label": ["2017"], "col_label": "",
            "boolean_value": true, "value": [false]
        }
    }"#;

    fn store() -> ParameterStore {
        let rates = IndexRates {
            price: vec![0.02, 0.03, 0.04, 0.05, 0.06],
            wage: vec![0.05; 5],
        };
        ParameterStore::from_reader_with_rates(POLICY.as_bytes(), rates).unwrap()
    }

    #[test]
    fn test_horizon() {
        let s = store();
        assert_eq!(s.start_year(), 2017);
        assert_eq!(s.end_year(), 2021);
        assert_eq!(s.current_year(), 2017);
        assert!(s.contains("_rate"));
        assert!(s.value("rate", 2016).unwrap_err().is_temporal());
        assert!(s.value("rate", 2022).is_err());
        assert!(matches!(s.value("nope", 2017), Err(TaxError::UnknownParameter(_))));
    }

    #[test]
    fn test_non_indexed_values_do_not_drift() {
        let s = store();
        for year in 2017..=2021 {
            assert_eq!(s.scalar("rate", year).unwrap(), 0.1);
            assert_eq!(s.value("brk", year).unwrap(), &[100.0, 200.0, 300.0]);
        }
    }

    #[test]
    fn test_indexed_values_compound() {
        let s = store();
        assert_eq!(s.scalar("thd", 2018).unwrap(), 1100.0);
        let y19 = s.scalar("thd", 2019).unwrap();
        assert_relative_eq!(y19, 1100.0 * 1.03, epsilon = 1e-9);
        assert_relative_eq!(s.scalar("thd", 2020).unwrap(), y19 * 1.04, epsilon = 1e-9);
        assert_relative_eq!(
            s.scalar("thd", 2021).unwrap(),
            y19 * 1.04 * 1.05,
            epsilon = 1e-9
        );
        // wage-indexed parameters use the wage path
        assert_relative_eq!(s.scalar("wage_thd", 2018).unwrap(), 525.0, epsilon = 1e-9);
    }

    #[test]
    fn test_value_by_bracket() {
        let s = store();
        let v = s.value_by_bracket("brk", 2017, &[0, 2, 1, 0]).unwrap();
        assert_eq!(v, vec![100.0, 300.0, 200.0, 100.0]);
        assert!(s.value_by_bracket("brk", 2017, &[3]).is_err());
        assert!(s.value_by_bracket("brk", 2017, &[-1]).is_err());
        assert!(s.scalar("brk", 2017).is_err());
    }

    #[test]
    fn test_year_cursor() {
        let mut s = store();
        s.set_year(2021).unwrap();
        assert!(s.increment_year().is_err());
        assert_eq!(s.current_year(), 2021);
        assert!(s.set_year(2016).is_err());
        s.set_year(2018).unwrap();
        s.increment_year().unwrap();
        assert_eq!(s.view().year(), 2019);
    }

    #[test]
    fn test_reform_scalar_from_year_forward() {
        let mut s = store();
        let reform = Reform::new()
            .with("_rate", 2019, ReformValue::Values(vec![0.2]))
            .with("_rate", 2021, ReformValue::Values(vec![0.25]));
        s.implement_reform(&reform).unwrap();
        assert_eq!(s.scalar("rate", 2018).unwrap(), 0.1);
        assert_eq!(s.scalar("rate", 2019).unwrap(), 0.2);
        assert_eq!(s.scalar("rate", 2020).unwrap(), 0.2);
        assert_eq!(s.scalar("rate", 2021).unwrap(), 0.25);
    }

    #[test]
    fn test_reform_indexed_value_re_expands() {
        let mut s = store();
        let reform = Reform::new().with("_thd", 2019, ReformValue::Values(vec![2000.0]));
        s.implement_reform(&reform).unwrap();
        assert_eq!(s.scalar("thd", 2018).unwrap(), 1100.0);
        assert_eq!(s.scalar("thd", 2019).unwrap(), 2000.0);
        assert_relative_eq!(s.scalar("thd", 2020).unwrap(), 2080.0, epsilon = 1e-9);
    }

    #[test]
    fn test_reform_indexing_switch_keeps_explicit_values() {
        let mut s = store();
        let reform = Reform::new().with("_thd_cpi", 2017, ReformValue::Bool(false));
        s.implement_reform(&reform).unwrap();
        // explicit 2018 value survives, later years now hold it
        assert_eq!(s.scalar("thd", 2017).unwrap(), 1000.0);
        assert_eq!(s.scalar("thd", 2018).unwrap(), 1100.0);
        assert_eq!(s.scalar("thd", 2021).unwrap(), 1100.0);
        assert!(!s.parameter("thd").unwrap().is_cpi_inflated());

        let on = Reform::new().with("_brk_cpi", 2019, ReformValue::Bool(true));
        s.implement_reform(&on).unwrap();
        assert_eq!(s.value("brk", 2019).unwrap()[0], 100.0);
        assert_relative_eq!(s.value("brk", 2020).unwrap()[0], 104.0, epsilon = 1e-9);
    }

    #[test]
    fn test_reform_value_then_indexing_switch() {
        let mut s = store();
        let reform = Reform::new()
            .with("_thd", 2019, ReformValue::Values(vec![2000.0]))
            .with("_thd_cpi", 2020, ReformValue::Bool(false));
        s.implement_reform(&reform).unwrap();
        assert_eq!(s.scalar("thd", 2019).unwrap(), 2000.0);
        // 2020 still grows from the new 2019 value, then indexing stops
        assert_relative_eq!(s.scalar("thd", 2020).unwrap(), 2080.0, epsilon = 1e-9);
        assert_relative_eq!(s.scalar("thd", 2021).unwrap(), 2080.0, epsilon = 1e-9);

        let mut s = store();
        let switches = Reform::new()
            .with("_brk_cpi", 2018, ReformValue::Bool(true))
            .with("_brk_cpi", 2020, ReformValue::Bool(false));
        s.implement_reform(&switches).unwrap();
        assert_relative_eq!(s.value("brk", 2019).unwrap()[0], 103.0, epsilon = 1e-9);
        assert_relative_eq!(s.value("brk", 2020).unwrap()[0], 103.0 * 1.04, epsilon = 1e-9);
        assert_relative_eq!(s.value("brk", 2021).unwrap()[0], 103.0 * 1.04, epsilon = 1e-9);
    }

    #[test]
    fn test_reform_bracket_suffix_replaces_one_column() {
        let mut s = store();
        let reform = Reform::new().with("_brk_senior", 2018, ReformValue::Values(vec![250.0]));
        s.implement_reform(&reform).unwrap();
        assert_eq!(s.value("brk", 2017).unwrap(), &[100.0, 200.0, 300.0]);
        assert_eq!(s.value("brk", 2018).unwrap(), &[100.0, 250.0, 300.0]);
        assert_eq!(s.value("brk", 2021).unwrap(), &[100.0, 250.0, 300.0]);
    }

    #[test]
    fn test_reform_temporal_validity() {
        let mut s = store();
        s.set_year(2019).unwrap();
        let past = Reform::new().with("_rate", 2018, ReformValue::Values(vec![0.2]));
        let err = s.implement_reform(&past).unwrap_err();
        assert!(matches!(err, TaxError::RetroactiveReform { year: 2018, current: 2019 }));

        let now = Reform::new().with("_rate", 2019, ReformValue::Values(vec![0.2]));
        s.implement_reform(&now).unwrap();
        assert_eq!(s.view().scalar("rate").unwrap(), 0.2);

        let beyond = Reform::new().with("_rate", 2030, ReformValue::Values(vec![0.2]));
        assert!(s.implement_reform(&beyond).unwrap_err().is_temporal());
    }

    #[test]
    fn test_reform_validation_is_atomic() {
        let mut s = store();
        let reform = Reform::new()
            .with("_rate", 2018, ReformValue::Values(vec![0.3]))
            .with("_thd", 2016, ReformValue::Values(vec![1.0]));
        assert!(s.implement_reform(&reform).is_err());
        assert_eq!(s.scalar("rate", 2018).unwrap(), 0.1);
    }

    #[test]
    fn test_reform_rejections() {
        let mut s = store();
        let cases = [
            Reform::new().with("_nope", 2018, ReformValue::Values(vec![1.0])),
            Reform::new().with("_rate", 2018, ReformValue::Values(vec![1.5])),
            Reform::new().with("_brk", 2018, ReformValue::Values(vec![1.0, 2.0])),
            Reform::new().with("_brk_nobody", 2018, ReformValue::Values(vec![1.0])),
            Reform::new().with("_limit_cpi", 2018, ReformValue::Bool(true)),
            Reform::new().with("_switch_cpi", 2018, ReformValue::Bool(true)),
            Reform::new().with("_rate_cpi", 2018, ReformValue::Bool(true)),
            Reform::new().with("_limit", 2018, ReformValue::Values(vec![7.5])),
            Reform::new().with("_rate", 2018, ReformValue::Bool(true)),
        ];
        for reform in &cases {
            assert!(s.implement_reform(reform).is_err(), "{:?}", reform);
        }
    }

    #[test]
    fn test_boolean_and_integer_reforms() {
        let mut s = store();
        let reform = Reform::new()
            .with("_switch", 2019, ReformValue::Bool(true))
            .with("_limit", 2020, ReformValue::Values(vec![4.0]));
        s.implement_reform(&reform).unwrap();
        s.set_year(2020).unwrap();
        assert!(s.view().flag("switch").unwrap());
        assert_eq!(s.view().count("limit").unwrap(), 4);
    }

    #[test]
    fn test_clone_is_independent() {
        let base = store();
        let mut reformed = base.clone();
        let reform = Reform::new().with("_rate", 2017, ReformValue::Values(vec![0.5]));
        reformed.implement_reform(&reform).unwrap();
        assert_eq!(base.scalar("rate", 2017).unwrap(), 0.1);
        assert_eq!(reformed.scalar("rate", 2017).unwrap(), 0.5);
    }

    #[test]
    fn test_current_law_loads() {
        let growth = GrowthFactorTable::default_table().unwrap();
        let s = ParameterStore::current_law(&growth).unwrap();
        assert_eq!(s.start_year(), 2017);
        assert_eq!(s.num_years(), DEFAULT_NUM_YEARS);
        assert_eq!(s.value("tbrk1", 2017).unwrap().len(), 3);
        assert_eq!(s.scalar("Loss_CFLimit", 2020).unwrap(), 8.0);
        assert_eq!(s.scalar("cess_rate", 2025).unwrap(), 0.04);
    }
}
