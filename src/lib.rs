//! taxsim - microsimulation engine for personal, corporate and consumption tax
//!
//! This library provides:
//! - Year-indexed policy parameters with inflation indexing and reforms
//! - Growth-factor extrapolation and panel stepping of filing populations
//! - Loss and MAT-credit carryforward ledgers
//! - Declared-order formula sequences for PIT, CIT and GST
//! - Distribution and difference tables, and batch reform comparisons

pub mod calc;
pub mod error;
pub mod growth;
pub mod ledger;
pub mod parameters;
pub mod records;
pub mod scenario;
pub mod tables;

// Re-export commonly used types
pub use calc::Calculator;
pub use error::{TaxError, TaxResult};
pub use growth::{GrowthDiff, GrowthFactorTable};
pub use parameters::{ParameterStore, Reform, ReformFile, ReformValue};
pub use records::{AdvanceMode, DataTable, FilingPopulation, PopulationKind, VariableSchema, WeightTable};
pub use scenario::{BaselineConfig, PopulationInput, ScenarioRunner};
