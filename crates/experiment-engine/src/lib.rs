//! Experiment grid orchestration.
//!
//! Expands an experiment plan into (dataset, calibrator, repeat)
//! combinations, runs each unit in isolation (rayon worker pool), and
//! collects one record per unit into an append-only results table.
//! A failing unit becomes a Failed row; it never stops the batch.

pub mod data;
pub mod plan;
pub mod records;
pub mod runner;

pub use data::*;
pub use plan::*;
pub use records::*;
pub use runner::run_grid;
