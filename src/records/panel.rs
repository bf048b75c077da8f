//! Panel stepping for longitudinal corporate data
//!
//! Each step extracts the next assessment year's observations from the
//! retained full panel, scales them by that year's blow-up factors and
//! merges the previous year's computed ledgers onto them by entity id.
//! Entities are classified three ways:
//! - continuing: ledger targets take the carried values
//! - new entrant: ledger targets start at zero
//! - dropped: no current-year row, nothing to attach results to

use std::collections::{BTreeMap, BTreeSet};
use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use super::population::FilingPopulation;
use super::schema::{VarType, VariableSchema, ASSESSMENT_YEAR_VAR};
use super::table::DataTable;
use crate::error::{TaxError, TaxResult};
use crate::growth::loader::read_year_columns;

/// Embedded default blow-up factors (data/cit_panel_blowup.csv)
pub const DEFAULT_PANEL_BLOWUP_CSV: &str = include_str!("../../data/cit_panel_blowup.csv");

/// Offset between the panel year and the blow-up row it is scaled by
pub const DEFAULT_BLOWUP_YEAR_OFFSET: i32 = 4;

/// Number of loss slots carried forward
pub const LOSS_WINDOW: usize = 8;

/// Number of MAT credit slots carried forward
pub const MAT_WINDOW: usize = 10;

/// Depreciation block rates (percent) that carry a closing written-down value
pub const DEPRECIATION_BLOCKS: [u32; 7] = [15, 30, 40, 50, 60, 80, 100];

/// Year-indexed multipliers applied to panel rows on extraction
#[derive(Debug, Clone, PartialEq)]
pub struct PanelBlowupTable {
    first_year: i32,
    last_year: i32,
    columns: BTreeMap<String, Vec<f64>>,
}

impl PanelBlowupTable {
    pub fn default_table() -> TaxResult<Self> {
        Self::from_reader(DEFAULT_PANEL_BLOWUP_CSV.as_bytes())
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> TaxResult<Self> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(file)
    }

    pub fn from_reader<R: Read>(reader: R) -> TaxResult<Self> {
        let raw = read_year_columns(reader, "panel blow-up table")?;
        let first_year = raw.years[0];
        let last_year = raw.years[raw.years.len() - 1];
        log::info!(
            "loaded panel blow-up factors for {}..={} ({} columns)",
            first_year,
            last_year,
            raw.columns.len()
        );
        Ok(Self {
            first_year,
            last_year,
            columns: raw.columns,
        })
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.contains_key(column)
    }

    pub fn factor(&self, column: &str, year: i32) -> TaxResult<f64> {
        let values = self
            .columns
            .get(column)
            .ok_or_else(|| TaxError::UnknownCategory(column.to_string()))?;
        if year < self.first_year || year > self.last_year {
            return Err(TaxError::YearOutOfRange {
                year,
                first: self.first_year,
                last: self.last_year,
            });
        }
        Ok(values[(year - self.first_year) as usize])
    }
}

/// One calculated variable carried onto next year's read variable
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CarryPair {
    pub source: String,
    pub target: String,
    /// Ledger slots start at zero for new entrants
    pub ledger: bool,
}

impl CarryPair {
    pub fn new(source: impl Into<String>, target: impl Into<String>, ledger: bool) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            ledger,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CarryforwardSpec {
    pub pairs: Vec<CarryPair>,
}

impl CarryforwardSpec {
    /// Loss chain, MAT credit chain and closing written-down values
    pub fn corporate_default() -> Self {
        let mut pairs = Vec::new();
        for i in 1..=LOSS_WINDOW {
            pairs.push(CarryPair::new(format!("newloss{}", i), format!("LOSS_LAG{}", i), true));
        }
        for i in 1..=MAT_WINDOW {
            pairs.push(CarryPair::new(format!("NEW_MAT_CR{}", i), format!("MAT_LAG{}", i), true));
        }
        for rate in DEPRECIATION_BLOCKS {
            pairs.push(CarryPair::new(
                format!("close_wdv_pm{}", rate),
                format!("PWR_DOWN_VAL_1ST_DAY_PY_{}P", rate),
                false,
            ));
        }
        Self { pairs }
    }
}

/// How a corporate population steps through its panel
#[derive(Debug, Clone)]
pub struct PanelConfig {
    pub blowup: Arc<PanelBlowupTable>,
    pub blowup_year_offset: i32,
    pub carryforward: CarryforwardSpec,
    pub id_var: String,
    pub year_var: String,
}

impl PanelConfig {
    pub fn new(blowup: Arc<PanelBlowupTable>, carryforward: CarryforwardSpec) -> Self {
        Self {
            blowup,
            blowup_year_offset: DEFAULT_BLOWUP_YEAR_OFFSET,
            carryforward,
            id_var: "ID_NO".to_string(),
            year_var: ASSESSMENT_YEAR_VAR.to_string(),
        }
    }

    /// Embedded blow-up table with the corporate carryforward pairs
    pub fn corporate_default() -> TaxResult<Self> {
        Ok(Self::new(
            Arc::new(PanelBlowupTable::default_table()?),
            CarryforwardSpec::corporate_default(),
        ))
    }

    /// Check every named variable against the schema
    pub fn validate(&self, schema: &VariableSchema) -> TaxResult<()> {
        for var in [&self.id_var, &self.year_var] {
            if !schema.is_read(var) {
                return Err(TaxError::UnknownVariable(var.clone()));
            }
        }
        for pair in &self.carryforward.pairs {
            if !schema.is_calc(&pair.source) {
                return Err(TaxError::UnknownVariable(pair.source.clone()));
            }
            match schema.read_var(&pair.target) {
                Some(v) if v.var_type == VarType::Float => {}
                Some(_) => {
                    return Err(TaxError::config(format!(
                        "carryforward target {} must be a float variable",
                        pair.target
                    )))
                }
                None => return Err(TaxError::UnknownVariable(pair.target.clone())),
            }
        }
        for (_, column) in schema.panel_growth_vars() {
            if !self.blowup.has_column(column) {
                return Err(TaxError::UnknownCategory(column.to_string()));
            }
        }
        Ok(())
    }
}

/// Retained panel and cursor of a panel-backed population
#[derive(Debug, Clone)]
pub struct PanelState {
    pub(crate) full: Arc<DataTable>,
    pub panel_year: i32,
    pub last_panel_year: i32,
}

/// Validate the panel and extract its first year
pub(crate) fn start(
    full: Arc<DataTable>,
    config: &PanelConfig,
    schema: &VariableSchema,
) -> TaxResult<(PanelState, DataTable)> {
    config.validate(schema)?;
    let years = full
        .column(&config.year_var)
        .ok_or_else(|| TaxError::MissingVariables(config.year_var.clone()))?;
    if !full.has_column(&config.id_var) {
        return Err(TaxError::MissingVariables(config.id_var.clone()));
    }
    let first = years.iter().fold(f64::INFINITY, |a, &b| a.min(b));
    let last = years.iter().fold(f64::NEG_INFINITY, |a, &b| a.max(b));
    if !first.is_finite() {
        return Err(TaxError::config("panel data contains no rows"));
    }
    let (first, last) = (first as i32, last as i32);

    let table = extract(&full, first, config, schema)?;
    log::info!("panel covers {}..={}; starting at {}", first, last, first);
    Ok((
        PanelState {
            full,
            panel_year: first,
            last_panel_year: last,
        },
        table,
    ))
}

/// Rows observed in `panel_year`, scaled by that year's blow-up factors
pub(crate) fn extract(
    full: &DataTable,
    panel_year: i32,
    config: &PanelConfig,
    schema: &VariableSchema,
) -> TaxResult<DataTable> {
    let mut table = full.rows_where(&config.year_var, panel_year as f64)?;
    let blowup_year = panel_year + config.blowup_year_offset;
    for (var, column) in schema.panel_growth_vars() {
        let factor = config.blowup.factor(column, blowup_year)?;
        if let Some(values) = table.column_mut(var) {
            values.iter_mut().for_each(|v| *v *= factor);
        }
    }
    Ok(table)
}

/// Per-entity values computed in the outgoing year
#[derive(Debug, Clone, Default)]
pub(crate) struct CarryRecord {
    pairs: Vec<CarryPair>,
    rows: BTreeMap<i64, Vec<f64>>,
}

impl CarryRecord {
    pub(crate) fn collect(pop: &FilingPopulation, config: &PanelConfig) -> TaxResult<Self> {
        let ids = pop.values(&config.id_var)?;
        let pairs: Vec<CarryPair> = config
            .carryforward
            .pairs
            .iter()
            .filter(|p| pop.has_column(&p.source))
            .cloned()
            .collect();
        let sources = pairs
            .iter()
            .map(|p| pop.float(&p.source))
            .collect::<TaxResult<Vec<&[f64]>>>()?;

        let mut rows = BTreeMap::new();
        for (i, id) in ids.iter().enumerate() {
            let values = sources.iter().map(|s| s[i]).collect();
            if rows.insert(*id as i64, values).is_some() {
                return Err(TaxError::state(format!(
                    "duplicate {} {} in panel year",
                    config.id_var, id
                )));
            }
        }
        Ok(Self { pairs, rows })
    }

    pub(crate) fn len(&self) -> usize {
        self.rows.len()
    }
}

/// Entity counts from one merge
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeSummary {
    pub continuing: usize,
    pub entrants: usize,
    pub dropped: usize,
}

/// Attach carried values to the extracted rows
pub(crate) fn merge(
    mut table: DataTable,
    carry: &CarryRecord,
    config: &PanelConfig,
) -> TaxResult<(DataTable, MergeSummary)> {
    let ids: Vec<i64> = table
        .column(&config.id_var)
        .ok_or_else(|| TaxError::MissingVariables(config.id_var.clone()))?
        .iter()
        .map(|v| *v as i64)
        .collect();
    let mut seen = BTreeSet::new();
    for id in &ids {
        if !seen.insert(*id) {
            return Err(TaxError::state(format!(
                "duplicate {} {} in panel extract",
                config.id_var, id
            )));
        }
    }

    let n = table.len();
    let mut summary = MergeSummary::default();
    for (k, pair) in carry.pairs.iter().enumerate() {
        let mut target = table
            .column(&pair.target)
            .map(|c| c.to_vec())
            .unwrap_or_else(|| vec![0.0; n]);
        for (i, id) in ids.iter().enumerate() {
            match carry.rows.get(id) {
                Some(values) => target[i] = values[k],
                None if pair.ledger => target[i] = 0.0,
                None => {}
            }
        }
        table.set_column(&pair.target, target)?;
    }

    summary.continuing = ids.iter().filter(|id| carry.rows.contains_key(id)).count();
    summary.entrants = n - summary.continuing;
    summary.dropped = carry.len() - summary.continuing;
    log::debug!(
        "panel merge: {} continuing, {} new, {} dropped",
        summary.continuing,
        summary.entrants,
        summary.dropped
    );
    Ok((table, summary))
}
