//! QMC module - the AFQMC driver.

mod driver;

pub use driver::Afqmc;
