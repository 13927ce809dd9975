// error handling
pub mod error;

// physical constants of the readout
pub mod constants;

// grid module
pub mod grid {
    pub mod axis;
    pub mod charge_grid;
}

pub use error::{ReadoutError, Result};
pub use grid::axis::{Axis, AxisKind};
pub use grid::charge_grid::{BinRange, CellId, CellIndex, ChargeGrid};
