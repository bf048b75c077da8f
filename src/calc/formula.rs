//! Array-at-a-time tax formulas with declared inputs and outputs
//!
//! A formula reads whole arrays and returns whole arrays. It can only see
//! the variables and parameters it declares, so a sequence's dependency
//! order can be checked before anything runs.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use crate::error::{TaxError, TaxResult};
use crate::parameters::{ParameterStore, PolicyView};
use crate::records::{FilingPopulation, PopulationKind, VarType, VariableSchema};

/// Computed arrays, one per declared output
pub type Outputs = Vec<(String, Vec<f64>)>;

type ComputeFn = dyn Fn(&Frame<'_>) -> TaxResult<Outputs> + Send + Sync;

/// Empty name list for formulas without parameters or inputs
pub const NONE: [&str; 0] = [];

#[derive(Clone)]
pub struct Formula {
    name: String,
    inputs: Vec<String>,
    params: Vec<String>,
    outputs: Vec<String>,
    compute: Arc<ComputeFn>,
}

impl fmt::Debug for Formula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Formula")
            .field("name", &self.name)
            .field("inputs", &self.inputs)
            .field("params", &self.params)
            .field("outputs", &self.outputs)
            .finish()
    }
}

fn names<I, S>(items: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    items.into_iter().map(Into::into).collect()
}

impl Formula {
    pub fn new<I, P, O, F>(name: &str, inputs: I, params: P, outputs: O, compute: F) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
        P: IntoIterator,
        P::Item: Into<String>,
        O: IntoIterator,
        O::Item: Into<String>,
        F: Fn(&Frame<'_>) -> TaxResult<Outputs> + Send + Sync + 'static,
    {
        Self {
            name: name.to_string(),
            inputs: names(inputs),
            params: names(params),
            outputs: names(outputs),
            compute: Arc::new(compute),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn inputs(&self) -> &[String] {
        &self.inputs
    }

    pub fn params(&self) -> &[String] {
        &self.params
    }

    pub fn outputs(&self) -> &[String] {
        &self.outputs
    }

    /// Run against one population and one year of policy
    ///
    /// The returned arrays are checked against the declared outputs.
    pub fn evaluate(&self, records: &FilingPopulation, policy: PolicyView<'_>) -> TaxResult<Outputs> {
        let frame = Frame {
            formula: self,
            records,
            policy,
        };
        let outputs = (self.compute)(&frame)?;
        let n = records.array_length();
        for (name, values) in &outputs {
            if !self.outputs.contains(name) {
                return Err(TaxError::state(format!(
                    "formula {} wrote undeclared variable {}",
                    self.name, name
                )));
            }
            if values.len() != n {
                return Err(TaxError::LengthMismatch {
                    name: name.clone(),
                    expected: n,
                    actual: values.len(),
                });
            }
        }
        Ok(outputs)
    }
}

/// What a formula is allowed to read
pub struct Frame<'a> {
    formula: &'a Formula,
    records: &'a FilingPopulation,
    policy: PolicyView<'a>,
}

impl<'a> Frame<'a> {
    /// Number of records
    pub fn len(&self) -> usize {
        self.records.array_length()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_input(&self, name: &str) -> TaxResult<()> {
        if self.formula.inputs.iter().any(|i| i == name) {
            Ok(())
        } else {
            Err(TaxError::state(format!(
                "formula {} reads undeclared variable {}",
                self.formula.name, name
            )))
        }
    }

    fn check_param(&self, name: &str) -> TaxResult<()> {
        if self.formula.params.iter().any(|p| p == name) {
            Ok(())
        } else {
            Err(TaxError::state(format!(
                "formula {} reads undeclared parameter {}",
                self.formula.name, name
            )))
        }
    }

    pub fn var(&self, name: &str) -> TaxResult<&'a [f64]> {
        self.check_input(name)?;
        self.records.float(name)
    }

    pub fn int(&self, name: &str) -> TaxResult<&'a [i32]> {
        self.check_input(name)?;
        self.records.int(name)
    }

    /// Element-wise sum of several float inputs
    pub fn sum(&self, names: &[&str]) -> TaxResult<Vec<f64>> {
        let mut total = vec![0.0; self.len()];
        for name in names {
            add_assign(&mut total, self.var(name)?);
        }
        Ok(total)
    }

    pub fn scalar(&self, name: &str) -> TaxResult<f64> {
        self.check_param(name)?;
        self.policy.scalar(name)
    }

    pub fn count(&self, name: &str) -> TaxResult<usize> {
        self.check_param(name)?;
        self.policy.count(name)
    }

    pub fn row(&self, name: &str) -> TaxResult<&'a [f64]> {
        self.check_param(name)?;
        self.policy.row(name)
    }

    pub fn by_bracket(&self, name: &str, selector: &[i32]) -> TaxResult<Vec<f64>> {
        self.check_param(name)?;
        self.policy.by_bracket(name, selector)
    }
}

pub(crate) fn add_assign(total: &mut [f64], values: &[f64]) {
    total.iter_mut().zip(values).for_each(|(t, v)| *t += v);
}

pub(crate) fn zip_with(a: &[f64], b: &[f64], f: impl Fn(f64, f64) -> f64) -> Vec<f64> {
    a.iter().zip(b).map(|(x, y)| f(*x, *y)).collect()
}

pub(crate) fn scale(values: &[f64], factor: f64) -> Vec<f64> {
    values.iter().map(|v| v * factor).collect()
}

/// Ordered formulas for one kind of population
#[derive(Debug, Clone)]
pub struct FormulaSequence {
    kind: PopulationKind,
    formulas: Vec<Formula>,
}

impl FormulaSequence {
    pub fn new(kind: PopulationKind, formulas: Vec<Formula>) -> Self {
        Self { kind, formulas }
    }

    /// Built-in sequence for `kind`
    pub fn default_for(kind: PopulationKind) -> Self {
        match kind {
            PopulationKind::Individual => super::pit::sequence(),
            PopulationKind::Corporate => super::cit::sequence(),
            PopulationKind::Consumption => super::gst::sequence(),
        }
    }

    pub fn kind(&self) -> PopulationKind {
        self.kind
    }

    pub fn formulas(&self) -> &[Formula] {
        &self.formulas
    }

    pub fn len(&self) -> usize {
        self.formulas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.formulas.is_empty()
    }

    /// Check the declared dependency order against a schema and a store
    ///
    /// Outputs must be float calculated variables. A calculated input must
    /// be produced by an earlier formula. Parameters must exist.
    pub fn validate(&self, schema: &VariableSchema, policy: &ParameterStore) -> TaxResult<()> {
        if schema.kind() != self.kind {
            return Err(TaxError::config(format!(
                "{} formulas cannot run on {} records",
                self.kind.as_str(),
                schema.kind().as_str()
            )));
        }
        let mut produced: BTreeSet<&str> = BTreeSet::new();
        for formula in &self.formulas {
            for input in &formula.inputs {
                if schema.is_calc(input) {
                    if !produced.contains(input.as_str()) {
                        return Err(TaxError::config(format!(
                            "formula {} reads {} before it is computed",
                            formula.name, input
                        )));
                    }
                } else if !schema.is_read(input) {
                    return Err(TaxError::UnknownVariable(input.clone()));
                }
            }
            for param in &formula.params {
                if !policy.contains(param) {
                    return Err(TaxError::UnknownParameter(param.clone()));
                }
            }
            for output in &formula.outputs {
                match schema.calc_var(output) {
                    Some(v) if v.var_type() == VarType::Float => {}
                    Some(_) => {
                        return Err(TaxError::config(format!(
                            "formula {} output {} is not a float variable",
                            formula.name, output
                        )))
                    }
                    None => {
                        return Err(TaxError::config(format!(
                            "formula {} output {} is not a calculated variable",
                            formula.name, output
                        )))
                    }
                }
                produced.insert(output.as_str());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::growth::GrowthFactorTable;
    use crate::records::{AdvanceMode, DataTable};

    const SCHEMA: &str = r#"{
        "read": {"ID": {"type": "int", "required": true}, "A": {"type": "float"}},
        "calc": {"B": {"type": "float"}, "C": {"type": "float"}, "N": {"type": "int"}}
    }"#;

    fn schema() -> VariableSchema {
        VariableSchema::from_reader(PopulationKind::Individual, SCHEMA.as_bytes()).unwrap()
    }

    fn policy() -> ParameterStore {
        ParameterStore::current_law(&GrowthFactorTable::default_table().unwrap()).unwrap()
    }

    fn double_a() -> Formula {
        Formula::new("double_a", ["A"], NONE, ["B"], |f| {
            Ok(vec![("B".to_string(), scale(f.var("A")?, 2.0))])
        })
    }

    fn b_plus_rate() -> Formula {
        Formula::new("b_plus_rate", ["B"], ["rate2"], ["C"], |f| {
            let rate = f.scalar("rate2")?;
            Ok(vec![("C".to_string(), f.var("B")?.iter().map(|b| b + rate).collect())])
        })
    }

    #[test]
    fn test_validate_order() {
        let (s, p) = (schema(), policy());
        let ok = FormulaSequence::new(PopulationKind::Individual, vec![double_a(), b_plus_rate()]);
        assert!(ok.validate(&s, &p).is_ok());

        let reversed =
            FormulaSequence::new(PopulationKind::Individual, vec![b_plus_rate(), double_a()]);
        assert!(matches!(reversed.validate(&s, &p), Err(TaxError::Config(_))));

        let wrong_kind = FormulaSequence::new(PopulationKind::Corporate, vec![double_a()]);
        assert!(wrong_kind.validate(&s, &p).is_err());
    }

    #[test]
    fn test_validate_names() {
        let (s, p) = (schema(), policy());
        let bad_param = Formula::new("f", ["A"], ["no_such_rate"], ["B"], |_| Ok(vec![]));
        let seq = FormulaSequence::new(PopulationKind::Individual, vec![bad_param]);
        assert!(matches!(seq.validate(&s, &p), Err(TaxError::UnknownParameter(_))));

        let int_out = Formula::new("f", ["A"], NONE, ["N"], |_| Ok(vec![]));
        let seq = FormulaSequence::new(PopulationKind::Individual, vec![int_out]);
        assert!(seq.validate(&s, &p).is_err());

        let read_out = Formula::new("f", NONE, NONE, ["A"], |_| Ok(vec![]));
        let seq = FormulaSequence::new(PopulationKind::Individual, vec![read_out]);
        assert!(seq.validate(&s, &p).is_err());
    }

    #[test]
    fn test_frame_enforces_declarations() {
        let records = FilingPopulation::from_source(
            Arc::new(schema()),
            DataTable::from_reader("ID,A\n1,3\n".as_bytes()).unwrap().into(),
            None,
            2017,
            AdvanceMode::CrossSection { growth: None },
        )
        .unwrap();
        let p = policy();

        let out = double_a().evaluate(&records, p.view()).unwrap();
        assert_eq!(out, vec![("B".to_string(), vec![6.0])]);

        let sneaky = Formula::new("sneaky", NONE, NONE, ["B"], |f| {
            Ok(vec![("B".to_string(), f.var("A")?.to_vec())])
        });
        assert!(matches!(sneaky.evaluate(&records, p.view()), Err(TaxError::State(_))));

        let wrong_len = Formula::new("short", NONE, NONE, ["B"], |_| {
            Ok(vec![("B".to_string(), vec![])])
        });
        assert!(matches!(
            wrong_len.evaluate(&records, p.view()),
            Err(TaxError::LengthMismatch { .. })
        ));
    }
}
