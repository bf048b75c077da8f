//! Policy parameter metadata matching the current-law JSON format

use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::error::{TaxError, TaxResult};

/// Which growth rate compounds an inflation-indexed parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Indexing {
    /// Price inflation (CPI)
    #[default]
    Price,
    /// Wage growth
    Wage,
}

/// Shape of one year's value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Float,
    Integer,
    Boolean,
    /// One value per bracket (e.g. age group)
    Vector(usize),
    /// Brackets by tiers, stored row-major
    Matrix(usize, usize),
}

impl ParamKind {
    /// Number of stored values per year
    pub fn width(&self) -> usize {
        match self {
            ParamKind::Float | ParamKind::Integer | ParamKind::Boolean => 1,
            ParamKind::Vector(n) => *n,
            ParamKind::Matrix(b, t) => b * t,
        }
    }

    pub fn is_scalar(&self) -> bool {
        self.width() == 1 && !matches!(self, ParamKind::Vector(_))
    }
}

/// Allowed value range
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct ValidValues {
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
}

impl ValidValues {
    pub fn contains(&self, value: f64) -> bool {
        self.min.map_or(true, |m| value >= m) && self.max.map_or(true, |m| value <= m)
    }
}

/// One entry of the policy parameter file
#[derive(Debug, Clone, Deserialize)]
pub struct ParameterSpec {
    #[serde(default)]
    pub long_name: String,

    #[serde(default)]
    pub description: String,

    /// First year covered by `value`
    pub start_year: i32,

    /// Year labels, one per row of `value`
    #[serde(default)]
    pub row_label: Vec<String>,

    /// Bracket labels ("" for scalars)
    #[serde(default, deserialize_with = "labels")]
    pub col_label: Vec<String>,

    #[serde(default)]
    pub cpi_inflated: bool,

    #[serde(default)]
    pub cpi_inflatable: bool,

    #[serde(default)]
    pub integer_value: bool,

    #[serde(default)]
    pub boolean_value: bool,

    #[serde(default)]
    pub indexing: Indexing,

    #[serde(default)]
    pub valid_values: Option<ValidValues>,

    /// One row per year: a number, a boolean, a list or a list of lists
    pub value: Vec<Value>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawLabels {
    One(String),
    Many(Vec<String>),
}

fn labels<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    Ok(match RawLabels::deserialize(deserializer)? {
        RawLabels::One(s) if s.is_empty() => Vec::new(),
        RawLabels::One(s) => vec![s],
        RawLabels::Many(v) => v,
    })
}

impl ParameterSpec {
    /// Determine the kind and flatten every row of `value`
    pub fn parse_rows(&self, name: &str) -> TaxResult<(ParamKind, Vec<Vec<f64>>)> {
        if self.value.is_empty() {
            return Err(TaxError::config(format!("parameter {} has no values", name)));
        }
        if self.integer_value && self.boolean_value {
            return Err(TaxError::config(format!(
                "parameter {} cannot be both integer and boolean",
                name
            )));
        }
        if self.cpi_inflated && (self.integer_value || self.boolean_value) {
            return Err(TaxError::config(format!(
                "integer or boolean parameter {} cannot be CPI-indexed",
                name
            )));
        }

        let shape = row_shape(name, &self.value[0])?;
        let mut rows = Vec::with_capacity(self.value.len());
        for (i, raw) in self.value.iter().enumerate() {
            if row_shape(name, raw)? != shape {
                return Err(TaxError::config(format!(
                    "parameter {} row {} does not match the shape of the first row",
                    name, i
                )));
            }
            let expected = match shape {
                (0, _) => 1,
                (n, 0) => n,
                (b, t) => b * t,
            };
            let mut flat = Vec::with_capacity(expected);
            flatten_into(name, raw, &mut flat)?;
            if flat.len() != expected {
                return Err(TaxError::config(format!(
                    "parameter {} row {} is ragged",
                    name, i
                )));
            }
            rows.push(flat);
        }

        if (self.boolean_value || self.integer_value) && shape.0 != 0 {
            return Err(TaxError::config(format!(
                "integer or boolean parameter {} must be a scalar",
                name
            )));
        }

        let kind = match shape {
            _ if self.boolean_value => ParamKind::Boolean,
            _ if self.integer_value => ParamKind::Integer,
            (0, _) => ParamKind::Float,
            (n, 0) => ParamKind::Vector(n),
            (b, t) => ParamKind::Matrix(b, t),
        };

        if self.integer_value {
            if let Some(v) = rows.iter().flatten().find(|v| v.fract() != 0.0) {
                return Err(TaxError::config(format!(
                    "integer parameter {} has non-integer value {}",
                    name, v
                )));
            }
        }
        if !self.col_label.is_empty() {
            let brackets = match kind {
                ParamKind::Matrix(b, _) => b,
                k => k.width(),
            };
            if self.col_label.len() != brackets {
                return Err(TaxError::config(format!(
                    "parameter {} has {} column labels for {} brackets",
                    name,
                    self.col_label.len(),
                    brackets
                )));
            }
        }
        Ok((kind, rows))
    }
}

/// (outer length, inner length); (0, 0) is a scalar
fn row_shape(name: &str, raw: &Value) -> TaxResult<(usize, usize)> {
    match raw {
        Value::Number(_) | Value::Bool(_) => Ok((0, 0)),
        Value::Array(items) => {
            let inner = match items.first() {
                Some(Value::Array(first)) => first.len(),
                _ => 0,
            };
            Ok((items.len(), inner))
        }
        _ => Err(TaxError::config(format!(
            "parameter {} has a non-numeric value",
            name
        ))),
    }
}

fn flatten_into(name: &str, raw: &Value, out: &mut Vec<f64>) -> TaxResult<()> {
    match raw {
        Value::Bool(b) => out.push(if *b { 1.0 } else { 0.0 }),
        Value::Number(n) => out.push(n.as_f64().ok_or_else(|| {
            TaxError::config(format!("parameter {} has an unrepresentable number", name))
        })?),
        Value::Array(items) => {
            for item in items {
                flatten_into(name, item, out)?;
            }
        }
        _ => {
            return Err(TaxError::config(format!(
                "parameter {} has a non-numeric value",
                name
            )))
        }
    }
    Ok(())
}
