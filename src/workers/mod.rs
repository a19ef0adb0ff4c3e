//! Background workers.

pub mod recovery_sweep;

pub use recovery_sweep::{RecoverySweep, SweepConfig};
