//! Calculator: one policy store driving one or more populations
//!
//! A calculator owns its `ParameterStore` and its populations outright.
//! Cloning a calculator is a deep copy, so a baseline and a reform never
//! share arrays. Use [`Calculator::fork_with_reform`] to diverge.

use std::collections::BTreeMap;
use std::sync::Arc;

use super::formula::FormulaSequence;
use crate::error::{TaxError, TaxResult};
use crate::growth::GrowthDiff;
use crate::parameters::{ParameterStore, Reform};
use crate::records::{FilingPopulation, PopulationKind};

#[derive(Debug, Clone)]
struct Stage {
    records: FilingPopulation,
    formulas: Arc<FormulaSequence>,
}

/// Tax calculator over individual, corporate and consumption records
#[derive(Debug, Clone)]
pub struct Calculator {
    policy: ParameterStore,
    stages: BTreeMap<PopulationKind, Stage>,
}

impl Calculator {
    /// Pair each population with its built-in formula sequence
    pub fn new(policy: ParameterStore, populations: Vec<FilingPopulation>) -> TaxResult<Self> {
        let pairs = populations
            .into_iter()
            .map(|p| {
                let seq = FormulaSequence::default_for(p.kind());
                (p, seq)
            })
            .collect();
        Self::with_sequences(policy, pairs)
    }

    /// Build from explicit (population, formula sequence) pairs
    ///
    /// At most one population of each kind. Every population must sit in
    /// the same year, and the policy cursor is moved to that year.
    pub fn with_sequences(
        mut policy: ParameterStore,
        pairs: Vec<(FilingPopulation, FormulaSequence)>,
    ) -> TaxResult<Self> {
        let year = match pairs.first() {
            Some((p, _)) => p.current_year(),
            None => return Err(TaxError::config("calculator needs at least one population")),
        };

        let mut stages = BTreeMap::new();
        for (records, formulas) in pairs {
            let kind = records.kind();
            if records.current_year() != year {
                return Err(TaxError::config(format!(
                    "{} records are in {}, other records are in {}",
                    kind.as_str(),
                    records.current_year(),
                    year
                )));
            }
            formulas.validate(records.schema(), &policy)?;
            let stage = Stage {
                records,
                formulas: Arc::new(formulas),
            };
            if stages.insert(kind, stage).is_some() {
                return Err(TaxError::config(format!(
                    "more than one {} population",
                    kind.as_str()
                )));
            }
        }

        policy.set_year(year)?;
        Ok(Self { policy, stages })
    }

    pub fn current_year(&self) -> i32 {
        self.policy.current_year()
    }

    pub fn policy(&self) -> &ParameterStore {
        &self.policy
    }

    pub fn kinds(&self) -> impl Iterator<Item = PopulationKind> + '_ {
        self.stages.keys().copied()
    }

    pub fn records(&self, kind: PopulationKind) -> TaxResult<&FilingPopulation> {
        self.stage(kind).map(|s| &s.records)
    }

    fn stage(&self, kind: PopulationKind) -> TaxResult<&Stage> {
        self.stages
            .get(&kind)
            .ok_or_else(|| TaxError::config(format!("no {} population loaded", kind.as_str())))
    }

    /// Evaluate every formula, in order, for every population
    ///
    /// Changing calculated variables are zeroed first, so nothing computed
    /// for an earlier year leaks into this one.
    pub fn calc_all(&mut self) -> TaxResult<()> {
        let view = self.policy.view();
        for (kind, stage) in self.stages.iter_mut() {
            if stage.records.array_length() == 0 {
                return Err(TaxError::state(format!(
                    "{} population is empty in {}",
                    kind.as_str(),
                    view.year()
                )));
            }
            stage.records.zero_out_changing_calculated();
            for formula in stage.formulas.formulas() {
                for (name, values) in formula.evaluate(&stage.records, view)? {
                    stage.records.set_float(&name, values)?;
                }
            }
            log::debug!(
                "calculated {} {} records for {}",
                stage.records.array_length(),
                kind.as_str(),
                view.year()
            );
        }
        Ok(())
    }

    /// Advance the policy and every population by one year
    ///
    /// Populations are advanced on copies and committed together, so a
    /// failure in any of them leaves the calculator unchanged.
    pub fn increment_year(&mut self) -> TaxResult<()> {
        let next = self.current_year() + 1;
        if next > self.policy.end_year() {
            return Err(TaxError::YearOutOfRange {
                year: next,
                first: self.policy.start_year(),
                last: self.policy.end_year(),
            });
        }
        let mut advanced = BTreeMap::new();
        for (kind, stage) in &self.stages {
            let mut records = stage.records.clone();
            records.increment_year()?;
            advanced.insert(*kind, records);
        }
        for (kind, records) in advanced {
            if let Some(stage) = self.stages.get_mut(&kind) {
                stage.records = records;
            }
        }
        self.policy.set_year(next)?;
        log::debug!("advanced calculator to {}", next);
        Ok(())
    }

    /// Step forward until `year` is current
    pub fn advance_to_year(&mut self, year: i32) -> TaxResult<()> {
        if year < self.current_year() {
            return Err(TaxError::YearOutOfRange {
                year,
                first: self.current_year(),
                last: self.policy.end_year(),
            });
        }
        while self.current_year() < year {
            self.increment_year()?;
        }
        Ok(())
    }

    /// Apply `reform` to this calculator's own policy store
    pub fn implement_reform(&mut self, reform: &Reform) -> TaxResult<()> {
        self.policy.implement_reform(reform)
    }

    /// Deep copy with `reform` applied; `self` is left untouched
    pub fn fork_with_reform(&self, reform: &Reform) -> TaxResult<Self> {
        let mut fork = self.clone();
        fork.implement_reform(reform)?;
        Ok(fork)
    }

    /// Apply `diff` to the growth path of every cross-section population
    pub fn apply_growth_difference(&mut self, diff: &GrowthDiff) -> TaxResult<()> {
        let mut adjusted = BTreeMap::new();
        for (kind, stage) in &self.stages {
            let mut records = stage.records.clone();
            records.apply_growth_difference(diff)?;
            adjusted.insert(*kind, records);
        }
        for (kind, records) in adjusted {
            if let Some(stage) = self.stages.get_mut(&kind) {
                stage.records = records;
            }
        }
        Ok(())
    }

    /// Copy of one variable's array
    pub fn array(&self, kind: PopulationKind, var: &str) -> TaxResult<Vec<f64>> {
        self.records(kind)?.values(var)
    }

    /// Weighted sum of `var` in the only population that declares it
    pub fn weighted_total(&self, var: &str) -> TaxResult<f64> {
        let mut owners = self
            .stages
            .iter()
            .filter(|(_, s)| s.records.schema().contains(var))
            .map(|(k, _)| *k);
        match (owners.next(), owners.next()) {
            (Some(kind), None) => self.weighted_total_in(kind, var),
            (None, _) => Err(TaxError::UnknownVariable(var.to_string())),
            (Some(a), Some(b)) => Err(TaxError::config(format!(
                "{} is declared by both {} and {} records",
                var,
                a.as_str(),
                b.as_str()
            ))),
        }
    }

    /// `sum(var * weight)` over one population
    pub fn weighted_total_in(&self, kind: PopulationKind, var: &str) -> TaxResult<f64> {
        let records = self.records(kind)?;
        let values = records.column(var)?;
        Ok(records
            .weights()
            .iter()
            .enumerate()
            .map(|(i, w)| values.get_f64(i) * w)
            .sum())
    }

    pub fn total_weight(&self, kind: PopulationKind) -> TaxResult<f64> {
        Ok(self.records(kind)?.weights().iter().sum())
    }
}
