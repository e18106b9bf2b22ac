//! Materialization engine, step executors, execution coordinator, and
//! observability for a compiled plan (C4-C7).

pub mod context;
pub mod coordinator;
pub mod executor;
pub mod materialize;
pub mod observability;

pub use context::ExecutionContext;
pub use coordinator::{Coordinator, RunResult, Strategy};
pub use executor::{StepExecutor, StepResult, StepStatus};
pub use observability::{ObservabilityManager, PerformanceSummary};
