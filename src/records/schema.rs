//! Immutable variable metadata for one kind of filing population
//!
//! A schema is loaded once and shared behind an `Arc`. It answers which
//! variables are read from data, which are required, which are computed,
//! and which growth category extrapolates each read variable.

use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

use serde::Deserialize;

use crate::error::{TaxError, TaxResult};

pub const DEFAULT_PIT_SCHEMA: &str = include_str!("../../data/pit_variables.json");
pub const DEFAULT_CIT_SCHEMA: &str = include_str!("../../data/cit_variables.json");
pub const DEFAULT_GST_SCHEMA: &str = include_str!("../../data/gst_variables.json");

/// Variable holding the assessment year of each record
pub const ASSESSMENT_YEAR_VAR: &str = "ASSESSMENT_YEAR";

/// Which tax the population is filed for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PopulationKind {
    /// Personal income tax filers
    Individual,
    /// GST-paying consumers
    Consumption,
    /// Corporate income tax filers
    Corporate,
}

impl PopulationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PopulationKind::Individual => "pit",
            PopulationKind::Consumption => "gst",
            PopulationKind::Corporate => "cit",
        }
    }
}

/// Storage type of a variable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarType {
    Int,
    Float,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReadVar {
    pub var_type: VarType,
    pub desc: String,
    pub required: bool,
    /// Growth factor category for cross-section extrapolation
    pub growth: Option<String>,
    /// Blow-up table column for panel extraction
    pub panel_growth: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalcType {
    Int,
    Float,
    /// Float that is not reset before each calculation
    UnchangingFloat,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CalcVar {
    pub calc_type: CalcType,
    pub desc: String,
}

impl CalcVar {
    pub fn var_type(&self) -> VarType {
        match self.calc_type {
            CalcType::Int => VarType::Int,
            CalcType::Float | CalcType::UnchangingFloat => VarType::Float,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawSchema {
    #[serde(default)]
    read: BTreeMap<String, RawVar>,
    #[serde(default)]
    calc: BTreeMap<String, RawVar>,
}

#[derive(Debug, Deserialize)]
struct RawVar {
    #[serde(rename = "type")]
    var_type: String,
    #[serde(default)]
    desc: String,
    #[serde(default)]
    required: bool,
    #[serde(default)]
    growth: Option<String>,
    #[serde(default)]
    panel_growth: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VariableSchema {
    kind: PopulationKind,
    read: BTreeMap<String, ReadVar>,
    calc: BTreeMap<String, CalcVar>,
}

impl VariableSchema {
    pub fn pit_default() -> TaxResult<Self> {
        Self::from_reader(PopulationKind::Individual, DEFAULT_PIT_SCHEMA.as_bytes())
    }

    pub fn cit_default() -> TaxResult<Self> {
        Self::from_reader(PopulationKind::Corporate, DEFAULT_CIT_SCHEMA.as_bytes())
    }

    pub fn gst_default() -> TaxResult<Self> {
        Self::from_reader(PopulationKind::Consumption, DEFAULT_GST_SCHEMA.as_bytes())
    }

    /// Embedded schema for `kind`
    pub fn default_for(kind: PopulationKind) -> TaxResult<Self> {
        match kind {
            PopulationKind::Individual => Self::pit_default(),
            PopulationKind::Consumption => Self::gst_default(),
            PopulationKind::Corporate => Self::cit_default(),
        }
    }

    pub fn from_path<P: AsRef<Path>>(kind: PopulationKind, path: P) -> TaxResult<Self> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(kind, file)
    }

    pub fn from_reader<R: Read>(kind: PopulationKind, reader: R) -> TaxResult<Self> {
        let raw: RawSchema = serde_json::from_reader(reader)?;

        let mut read = BTreeMap::new();
        for (name, v) in raw.read {
            let var_type = match v.var_type.as_str() {
                "int" => VarType::Int,
                "float" => VarType::Float,
                other => {
                    return Err(TaxError::config(format!(
                        "read variable {} has unknown type `{}`",
                        name, other
                    )))
                }
            };
            if var_type == VarType::Int && (v.growth.is_some() || v.panel_growth.is_some()) {
                return Err(TaxError::config(format!(
                    "integer variable {} cannot be extrapolated",
                    name
                )));
            }
            read.insert(
                name,
                ReadVar {
                    var_type,
                    desc: v.desc,
                    required: v.required,
                    growth: v.growth,
                    panel_growth: v.panel_growth,
                },
            );
        }

        let mut calc = BTreeMap::new();
        for (name, v) in raw.calc {
            if read.contains_key(&name) {
                return Err(TaxError::config(format!(
                    "variable {} is declared both read and calculated",
                    name
                )));
            }
            if v.growth.is_some() || v.required {
                return Err(TaxError::config(format!(
                    "calculated variable {} cannot be required or extrapolated",
                    name
                )));
            }
            let calc_type = match v.var_type.as_str() {
                "int" => CalcType::Int,
                "float" => CalcType::Float,
                "unchanging_float" => CalcType::UnchangingFloat,
                other => {
                    return Err(TaxError::config(format!(
                        "calculated variable {} has unknown type `{}`",
                        name, other
                    )))
                }
            };
            calc.insert(name, CalcVar { calc_type, desc: v.desc });
        }

        log::debug!(
            "loaded {} schema: {} read, {} calculated variables",
            kind.as_str(),
            read.len(),
            calc.len()
        );
        Ok(Self { kind, read, calc })
    }

    pub fn kind(&self) -> PopulationKind {
        self.kind
    }

    pub fn read_var(&self, name: &str) -> Option<&ReadVar> {
        self.read.get(name)
    }

    pub fn calc_var(&self, name: &str) -> Option<&CalcVar> {
        self.calc.get(name)
    }

    pub fn is_read(&self, name: &str) -> bool {
        self.read.contains_key(name)
    }

    pub fn is_calc(&self, name: &str) -> bool {
        self.calc.contains_key(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.is_read(name) || self.is_calc(name)
    }

    /// Storage type of any declared variable
    pub fn var_type(&self, name: &str) -> Option<VarType> {
        self.read
            .get(name)
            .map(|v| v.var_type)
            .or_else(|| self.calc.get(name).map(|v| v.var_type()))
    }

    pub fn is_integer(&self, name: &str) -> bool {
        self.var_type(name) == Some(VarType::Int)
    }

    /// Read variables kept when present in a source
    pub fn usable_read(&self) -> impl Iterator<Item = &str> {
        self.read.keys().map(|s| s.as_str())
    }

    /// Read variables a source must provide
    pub fn must_read(&self) -> impl Iterator<Item = &str> {
        self.read
            .iter()
            .filter(|(_, v)| v.required)
            .map(|(k, _)| k.as_str())
    }

    pub fn calculated(&self) -> impl Iterator<Item = &str> {
        self.calc.keys().map(|s| s.as_str())
    }

    /// Calculated variables reset to zero before every calculation
    pub fn changing_calculated(&self) -> impl Iterator<Item = &str> {
        self.calc
            .iter()
            .filter(|(_, v)| v.calc_type == CalcType::Float)
            .map(|(k, _)| k.as_str())
    }

    /// (variable, growth category) for every extrapolated read variable
    pub fn growth_vars(&self) -> impl Iterator<Item = (&str, &str)> {
        self.read
            .iter()
            .filter_map(|(k, v)| v.growth.as_deref().map(|g| (k.as_str(), g)))
    }

    /// (variable, blow-up column) for every panel-extrapolated variable
    pub fn panel_growth_vars(&self) -> impl Iterator<Item = (&str, &str)> {
        self.read
            .iter()
            .filter_map(|(k, v)| v.panel_growth.as_deref().map(|g| (k.as_str(), g)))
    }
}
