mod estimate;
mod metrics;
mod scheduler;

pub use estimate::estimate_peak_bytes;
pub use metrics::BudgetTracker;
pub use scheduler::{BatchRunHandle, RunContext, start};
