//! Tax calculation: declared formula sequences run by a [`Calculator`]

mod cit;
mod common;
pub mod formula;
mod gst;
mod pipeline;
mod pit;

pub use common::{BP_HEADS, CG_HEADS};
pub use formula::{Formula, FormulaSequence, Frame, Outputs, NONE};
pub use gst::ITEMS as GST_ITEMS;
pub use pipeline::Calculator;
pub use pit::slab_tax;
