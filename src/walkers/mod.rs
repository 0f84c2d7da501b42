//! Walkers module - walkers, the population and its history.

mod walker;
mod population;
mod history;

pub use walker::{Walker, WEIGHT_THRESHOLD};
pub use population::{comb, Population};
pub use history::HistoryBuffer;
