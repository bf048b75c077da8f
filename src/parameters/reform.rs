//! Policy reforms and the JSON reform file
//!
//! A reform maps a parameter key to year-keyed overrides. Keys keep their
//! raw form (`_rate2`, `_tbrk1_senior`, `_tbrk1_cpi`); the parameter store
//! resolves suffixes against its own metadata when the reform is applied.

use std::collections::BTreeMap;
use std::path::Path;

use serde_json::{Map, Value};

use crate::error::{TaxError, TaxResult};
use crate::growth::GrowthDiff;

/// Suffix marking an indexing override (`_tbrk1_cpi`)
pub const CPI_SUFFIX: &str = "_cpi";

/// Top-level sections accepted in a reform file
pub const REFORM_SECTIONS: [&str; 6] = [
    "policy",
    "consumption",
    "behavior",
    "growdiff_baseline",
    "growdiff_response",
    "growmodel",
];

/// New value for one parameter in one year
#[derive(Debug, Clone, PartialEq)]
pub enum ReformValue {
    /// Flattened row (one element for scalars, one per bracket otherwise)
    Values(Vec<f64>),
    /// Boolean parameter value, or an indexing switch for `_cpi` keys
    Bool(bool),
}

/// Parameter overrides keyed by raw parameter key then year
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reform {
    changes: BTreeMap<String, BTreeMap<i32, ReformValue>>,
}

impl Reform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Add an override, replacing any earlier one for the same key and year
    pub fn set(&mut self, key: &str, year: i32, value: ReformValue) -> &mut Self {
        self.changes
            .entry(key.to_string())
            .or_default()
            .insert(year, value);
        self
    }

    /// Builder form of [`Reform::set`]
    pub fn with(mut self, key: &str, year: i32, value: ReformValue) -> Self {
        self.set(key, year, value);
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &BTreeMap<i32, ReformValue>)> {
        self.changes.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Earliest year any override targets
    pub fn first_year(&self) -> Option<i32> {
        self.changes
            .values()
            .filter_map(|by_year| by_year.keys().next().copied())
            .min()
    }

    /// Parse a `policy` section: `{ "_rate2": { "2019": [0.06] } }`
    pub fn from_json(section: &Value) -> TaxResult<Self> {
        let mut reform = Reform::new();
        let obj = match section {
            Value::Null => return Ok(reform),
            Value::Object(obj) => obj,
            _ => return Err(TaxError::config("policy section must be an object")),
        };
        for (key, by_year) in obj {
            let by_year = by_year.as_object().ok_or_else(|| {
                TaxError::config(format!("reform entry {} must map years to values", key))
            })?;
            for (year_str, raw) in by_year {
                let year: i32 = year_str.trim().parse().map_err(|_| {
                    TaxError::config(format!("reform {} has non-integer year `{}`", key, year_str))
                })?;
                reform.set(key, year, parse_value(key, raw)?);
            }
        }
        Ok(reform)
    }
}

/// Strip the one-element year wrapper, then flatten
fn parse_value(key: &str, raw: &Value) -> TaxResult<ReformValue> {
    let inner = match raw {
        Value::Array(items) if items.len() == 1 => &items[0],
        other => other,
    };
    if let Value::Bool(b) = inner {
        return Ok(ReformValue::Bool(*b));
    }
    let mut values = Vec::new();
    flatten_numbers(key, inner, &mut values)?;
    if values.is_empty() {
        return Err(TaxError::config(format!("reform {} has an empty value", key)));
    }
    Ok(ReformValue::Values(values))
}

fn flatten_numbers(key: &str, raw: &Value, out: &mut Vec<f64>) -> TaxResult<()> {
    match raw {
        Value::Number(n) => {
            out.push(n.as_f64().ok_or_else(|| {
                TaxError::config(format!("reform {} has an unrepresentable number", key))
            })?);
            Ok(())
        }
        Value::Array(items) => items.iter().try_for_each(|v| flatten_numbers(key, v, out)),
        _ => Err(TaxError::config(format!(
            "reform {} must hold numbers or a boolean",
            key
        ))),
    }
}

/// Remove `//` comments that are not inside a string literal
pub fn strip_comments(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for line in text.lines() {
        let mut in_string = false;
        let mut escaped = false;
        let mut cut = line.len();
        let bytes = line.as_bytes();
        for (i, &b) in bytes.iter().enumerate() {
            if in_string {
                match b {
                    _ if escaped => escaped = false,
                    b'\\' => escaped = true,
                    b'"' => in_string = false,
                    _ => {}
                }
            } else if b == b'"' {
                in_string = true;
            } else if b == b'/' && bytes.get(i + 1) == Some(&b'/') {
                cut = i;
                break;
            }
        }
        out.push_str(&line[..cut]);
        out.push('\n');
    }
    out
}

/// Parsed reform file
#[derive(Debug, Clone, Default)]
pub struct ReformFile {
    pub policy: Reform,
    pub growdiff_baseline: GrowthDiff,
    pub growdiff_response: GrowthDiff,
    /// Retained but not modelled
    pub consumption: Map<String, Value>,
    pub behavior: Map<String, Value>,
    pub growmodel: Map<String, Value>,
}

impl ReformFile {
    pub fn from_path<P: AsRef<Path>>(path: P) -> TaxResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text)
    }

    /// Parse reform JSON text, comments allowed
    pub fn parse(text: &str) -> TaxResult<Self> {
        let cleaned = strip_comments(text);
        let root: Value = serde_json::from_str(&cleaned)?;
        let obj = root
            .as_object()
            .ok_or_else(|| TaxError::config("reform file must hold a JSON object"))?;

        if let Some(bad) = obj.keys().find(|k| !REFORM_SECTIONS.contains(&k.as_str())) {
            return Err(TaxError::config(format!(
                "reform file has unknown top-level key `{}`",
                bad
            )));
        }

        let section = |name: &str| obj.get(name).cloned().unwrap_or(Value::Null);
        let object_section = |name: &str| -> TaxResult<Map<String, Value>> {
            match obj.get(name) {
                None | Some(Value::Null) => Ok(Map::new()),
                Some(Value::Object(m)) => Ok(m.clone()),
                Some(_) => Err(TaxError::config(format!("{} section must be an object", name))),
            }
        };

        let file = ReformFile {
            policy: Reform::from_json(&section("policy"))?,
            growdiff_baseline: GrowthDiff::from_json(&section("growdiff_baseline"))?,
            growdiff_response: GrowthDiff::from_json(&section("growdiff_response"))?,
            consumption: object_section("consumption")?,
            behavior: object_section("behavior")?,
            growmodel: object_section("growmodel")?,
        };

        for (name, map) in [
            ("consumption", &file.consumption),
            ("behavior", &file.behavior),
            ("growmodel", &file.growmodel),
        ] {
            if !map.is_empty() {
                log::warn!("reform file {} section is ignored ({} entries)", name, map.len());
            }
        }
        Ok(file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_policy_values() {
        let reform = Reform::from_json(&json!({
            "_rate2": { "2019": [0.06], "2021": [0.07] },
            "_tbrk1": { "2020": [[300000, 350000, 550000]] },
            "_tbrk1_cpi": { "2020": true },
            "_tbrk2_senior": { "2022": [600000] }
        }))
        .unwrap();

        let entries: BTreeMap<_, _> = reform.iter().collect();
        assert_eq!(entries["_rate2"][&2019], ReformValue::Values(vec![0.06]));
        assert_eq!(
            entries["_tbrk1"][&2020],
            ReformValue::Values(vec![300000.0, 350000.0, 550000.0])
        );
        assert_eq!(entries["_tbrk1_cpi"][&2020], ReformValue::Bool(true));
        assert_eq!(entries["_tbrk2_senior"][&2022], ReformValue::Values(vec![600000.0]));
        assert_eq!(reform.first_year(), Some(2019));
    }

    #[test]
    fn test_bad_policy_shapes() {
        assert!(Reform::from_json(&json!({ "_rate2": [0.1] })).is_err());
        assert!(Reform::from_json(&json!({ "_rate2": { "x": [0.1] } })).is_err());
        assert!(Reform::from_json(&json!({ "_rate2": { "2019": ["a"] } })).is_err());
        assert!(Reform::from_json(&json!({ "_rate2": { "2019": [] } })).is_err());
    }

    #[test]
    fn test_strip_comments() {
        let text = "{ // header\n  \"url\": \"http://x\", // trailing\n}\n";
        let cleaned = strip_comments(text);
        assert!(cleaned.contains("\"http://x\""));
        assert!(!cleaned.contains("header"));
        assert!(!cleaned.contains("trailing"));
    }

    #[test]
    fn test_reform_file() {
        let text = r#"
        // raise the second slab rate
        {
            "policy": { "_rate2": { "2019": [0.06] } },
            "growdiff_response": { "_CPI": { "2020": [0.01] } },
            "behavior": {}
        }
        "#;
        let file = ReformFile::parse(text).unwrap();
        assert!(!file.policy.is_empty());
        assert!(file.growdiff_baseline.is_empty());
        assert_eq!(file.growdiff_response.difference("CPI", 2021), 0.01);
    }

    #[test]
    fn test_reform_file_rejects_unknown_key() {
        let err = ReformFile::parse(r#"{ "polcy": {} }"#).unwrap_err();
        assert!(matches!(err, TaxError::Config(_)));
        assert!(ReformFile::parse("[1, 2]").is_err());
    }
}
