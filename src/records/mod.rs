//! Filing-unit records: schemas, tables, weights and year advancement

pub mod panel;
mod population;
pub mod schema;
mod table;
mod weights;

pub use panel::{
    CarryPair, CarryforwardSpec, MergeSummary, PanelBlowupTable, PanelConfig, PanelState,
    DEFAULT_BLOWUP_YEAR_OFFSET, LOSS_WINDOW, MAT_WINDOW,
};
pub use population::{AdvanceMode, Column, DataSource, FilingPopulation};
pub use schema::{CalcType, CalcVar, PopulationKind, ReadVar, VarType, VariableSchema};
pub use table::DataTable;
pub use weights::{WeightTable, WEIGHT_PREFIX};
