//! Configuration: types, file persistence, setup wizard.

pub mod persistence;
pub mod setup;
pub mod types;
