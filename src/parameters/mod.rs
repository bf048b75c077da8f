//! Policy parameters: metadata, year expansion, reforms

pub mod data;
mod expand;
pub mod reform;
mod store;

pub use data::{Indexing, ParamKind, ParameterSpec, ValidValues};
pub use expand::expand;
pub use reform::{strip_comments, Reform, ReformFile, ReformValue};
pub use store::{
    IndexRates, Parameter, ParameterStore, PolicyView, DEFAULT_NUM_YEARS, DEFAULT_POLICY_JSON,
};
