pub mod aggregation;
pub mod orchestrator;
pub mod percent;
pub mod report;
pub mod runner;
pub mod valuation;
pub mod window;

pub use report::RunReport;
pub use runner::{Reconciler, RunError, RunMode, RunSettings};
