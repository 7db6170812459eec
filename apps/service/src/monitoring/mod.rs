/// Monitoring engine - probing, due-set selection, transition detection and
/// history aggregation. Dispatch itself lives in the orchestrator.
pub mod checker;
pub mod executor;
pub mod scheduler;
pub mod stats;
pub mod transition;
pub mod types;
pub mod validation;

pub use executor::MonitoringExecutor;
pub use scheduler::MonitoringScheduler;
pub use types::CheckResult;
