//! Scenario runner for baseline-versus-reform comparisons
//!
//! Holds one prepared baseline calculator, then runs any number of reform
//! files against it without reloading data. Each run works on its own
//! deep copies, so the baseline is never changed by a reform.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use rayon::prelude::*;
use serde::Serialize;

use crate::calc::Calculator;
use crate::error::{TaxError, TaxResult};
use crate::growth::GrowthFactorTable;
use crate::parameters::{ParameterStore, ReformFile, DEFAULT_NUM_YEARS, DEFAULT_POLICY_JSON};
use crate::records::{
    AdvanceMode, DataSource, FilingPopulation, PanelConfig, PopulationKind, VariableSchema,
    WeightTable,
};

/// Files for one population
#[derive(Debug, Clone)]
pub struct PopulationInput {
    pub data: PathBuf,
    pub weights: Option<PathBuf>,
    /// Variable schema; the embedded default for the kind when absent
    pub schema: Option<PathBuf>,
}

impl PopulationInput {
    pub fn new(data: impl Into<PathBuf>) -> Self {
        Self {
            data: data.into(),
            weights: None,
            schema: None,
        }
    }
}

/// Everything needed to build a baseline calculator from disk
#[derive(Debug, Clone)]
pub struct BaselineConfig {
    /// Growth factor CSV; the embedded table when absent
    pub growfactors: Option<PathBuf>,
    /// Policy JSON; embedded current law when absent
    pub policy: Option<PathBuf>,
    pub start_year: i32,
    pub num_years: usize,
    pub pit: Option<PopulationInput>,
    pub cit: Option<PopulationInput>,
    pub gst: Option<PopulationInput>,
    /// Step corporate records through panel years instead of extrapolating
    pub cit_panel: bool,
}

impl Default for BaselineConfig {
    fn default() -> Self {
        Self {
            growfactors: None,
            policy: None,
            start_year: 2017,
            num_years: DEFAULT_NUM_YEARS,
            pit: None,
            cit: None,
            gst: None,
            cit_panel: false,
        }
    }
}

impl BaselineConfig {
    pub fn build(&self) -> TaxResult<Calculator> {
        let growth = Arc::new(match &self.growfactors {
            Some(path) => GrowthFactorTable::from_path(path)?,
            None => GrowthFactorTable::default_table()?,
        });
        let policy = self.policy_store(&growth)?;

        let mut populations = Vec::new();
        for (kind, input) in [
            (PopulationKind::Individual, &self.pit),
            (PopulationKind::Corporate, &self.cit),
            (PopulationKind::Consumption, &self.gst),
        ] {
            if let Some(input) = input {
                populations.push(self.load(kind, input, &growth)?);
            }
        }
        if populations.is_empty() {
            return Err(TaxError::config("no PIT, CIT or GST data given"));
        }
        Calculator::new(policy, populations)
    }

    /// Policy file (or embedded current law) over `num_years`
    fn policy_store(&self, growth: &GrowthFactorTable) -> TaxResult<ParameterStore> {
        match &self.policy {
            Some(path) => ParameterStore::from_path(path, growth, self.num_years),
            None => {
                ParameterStore::from_reader(DEFAULT_POLICY_JSON.as_bytes(), growth, self.num_years)
            }
        }
    }

    fn load(
        &self,
        kind: PopulationKind,
        input: &PopulationInput,
        growth: &Arc<GrowthFactorTable>,
    ) -> TaxResult<FilingPopulation> {
        let schema = match &input.schema {
            Some(path) => VariableSchema::from_path(kind, path)?,
            None => VariableSchema::default_for(kind)?,
        };
        let weights = input
            .weights
            .as_ref()
            .map(WeightTable::from_path)
            .transpose()?;
        let mode = if kind == PopulationKind::Corporate && self.cit_panel {
            AdvanceMode::Panel(PanelConfig::corporate_default()?)
        } else {
            AdvanceMode::CrossSection {
                growth: Some(Arc::clone(growth)),
            }
        };
        FilingPopulation::from_source(
            Arc::new(schema),
            DataSource::Path(input.data.clone()),
            weights,
            self.start_year,
            mode,
        )
    }
}

/// Weighted totals for one year
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct YearTotals {
    pub year: i32,
    pub totals: BTreeMap<String, f64>,
}

/// Baseline and reform totals for every simulated year
#[derive(Debug, Clone, Serialize)]
pub struct ReformRun {
    pub name: String,
    pub baseline: Vec<YearTotals>,
    pub reform: Vec<YearTotals>,
}

impl ReformRun {
    /// Reform minus baseline for `var` in `year`
    pub fn change(&self, year: i32, var: &str) -> Option<f64> {
        let pick = |rows: &[YearTotals]| {
            rows.iter()
                .find(|r| r.year == year)
                .and_then(|r| r.totals.get(var).copied())
        };
        Some(pick(&self.reform)? - pick(&self.baseline)?)
    }
}

/// Pre-loaded baseline for efficient batch reform runs
///
/// # Example
/// ```ignore
/// let runner = ScenarioRunner::new(baseline);
/// let run = runner.run_reform("flat", &ReformFile::from_path("flat.json")?, 2025, &["pitax"])?;
/// ```
#[derive(Debug, Clone)]
pub struct ScenarioRunner {
    baseline: Calculator,
}

impl ScenarioRunner {
    pub fn new(baseline: Calculator) -> Self {
        Self { baseline }
    }

    pub fn baseline(&self) -> &Calculator {
        &self.baseline
    }

    /// Run baseline and reform from the baseline's year through `last_year`
    ///
    /// `growdiff_baseline` applies to both runs, `growdiff_response` only
    /// to the reform run.
    pub fn run_reform(
        &self,
        name: &str,
        file: &ReformFile,
        last_year: i32,
        vars: &[&str],
    ) -> TaxResult<ReformRun> {
        let (mut base_calc, mut reform_calc) = self.prepare(file)?;
        let baseline = simulate(&mut base_calc, last_year, vars)?;
        let reform = simulate(&mut reform_calc, last_year, vars)?;
        log::info!("reform {} simulated {} year(s)", name, reform.len());
        Ok(ReformRun {
            name: name.to_string(),
            baseline,
            reform,
        })
    }

    /// Baseline and reform calculators, both calculated for `year`
    pub fn calculators_for_year(
        &self,
        file: &ReformFile,
        year: i32,
    ) -> TaxResult<(Calculator, Calculator)> {
        let (mut base, mut reform) = self.prepare(file)?;
        for calc in [&mut base, &mut reform] {
            calc.advance_to_year(year)?;
            calc.calc_all()?;
        }
        Ok((base, reform))
    }

    fn prepare(&self, file: &ReformFile) -> TaxResult<(Calculator, Calculator)> {
        let mut base = self.baseline.clone();
        base.apply_growth_difference(&file.growdiff_baseline)?;
        let mut reform = base.fork_with_reform(&file.policy)?;
        reform.apply_growth_difference(&file.growdiff_response)?;
        Ok((base, reform))
    }

    /// Run many reform files in parallel
    ///
    /// Results come back in input order. Each reform fails on its own.
    pub fn run_batch(
        &self,
        reforms: &[(String, ReformFile)],
        last_year: i32,
        vars: &[&str],
    ) -> Vec<TaxResult<ReformRun>> {
        reforms
            .par_iter()
            .map(|(name, file)| self.run_reform(name, file, last_year, vars))
            .collect()
    }
}

/// Calculate every year up to `last_year`, collecting weighted totals
pub fn simulate(calc: &mut Calculator, last_year: i32, vars: &[&str]) -> TaxResult<Vec<YearTotals>> {
    let mut rows = Vec::new();
    loop {
        calc.calc_all()?;
        let totals = vars
            .iter()
            .map(|v| Ok((v.to_string(), calc.weighted_total(v)?)))
            .collect::<TaxResult<BTreeMap<String, f64>>>()?;
        rows.push(YearTotals {
            year: calc.current_year(),
            totals,
        });
        if calc.current_year() >= last_year {
            break;
        }
        calc.increment_year()?;
    }
    Ok(rows)
}
