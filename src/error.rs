//! Error taxonomy for the simulation engine
//!
//! Three families of failure exist and none of them is retried:
//! - configuration errors (bad sources, missing columns, malformed reforms,
//!   unknown names), raised at construction or load time
//! - temporal errors (a year outside a table's range, a reform aimed at a
//!   year the engine has already finalized)
//! - state errors (panel exhausted, arrays out of step after a merge)

use thiserror::Error;

/// Crate-wide result alias
pub type TaxResult<T> = Result<T, TaxError>;

#[derive(Debug, Error)]
pub enum TaxError {
    // ---- Configuration ----
    #[error("configuration error: {0}")]
    Config(String),

    #[error("unknown policy parameter `{0}`")]
    UnknownParameter(String),

    #[error("unknown growth factor category `{0}`")]
    UnknownCategory(String),

    #[error("unknown variable `{0}`")]
    UnknownVariable(String),

    #[error("data source is missing required variable(s): {0}")]
    MissingVariables(String),

    #[error("unsupported data source: {0}")]
    UnsupportedSource(String),

    // ---- Temporal validity ----
    #[error("year {year} is outside the covered range [{first}, {last}]")]
    YearOutOfRange { year: i32, first: i32, last: i32 },

    #[error("reform targets year {year} but the current year is already {current}")]
    RetroactiveReform { year: i32, current: i32 },

    #[error("need {needed} growth rates to expand to the horizon, got {available}")]
    InsufficientRates { needed: usize, available: usize },

    // ---- State ----
    #[error("state error: {0}")]
    State(String),

    #[error("array `{name}` has length {actual}, expected {expected}")]
    LengthMismatch {
        name: String,
        expected: usize,
        actual: usize,
    },

    #[error("panel data has no rows beyond year {last_panel_year}")]
    NoRemainingPanelYears { last_panel_year: i32 },

    // ---- Wrapped ----
    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl TaxError {
    /// Shorthand for a configuration error with a formatted message
    pub fn config(msg: impl Into<String>) -> Self {
        TaxError::Config(msg.into())
    }

    /// Shorthand for a state error with a formatted message
    pub fn state(msg: impl Into<String>) -> Self {
        TaxError::State(msg.into())
    }

    /// Whether this error belongs to the temporal-validity family
    pub fn is_temporal(&self) -> bool {
        matches!(
            self,
            TaxError::YearOutOfRange { .. }
                | TaxError::RetroactiveReform { .. }
                | TaxError::InsufficientRates { .. }
        )
    }
}
