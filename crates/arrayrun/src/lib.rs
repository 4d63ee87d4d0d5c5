pub mod batch;
pub mod common;
pub mod exec;

pub type Error = common::error::RunError;
pub type Result<T> = std::result::Result<T, Error>;

// Reexports
pub use batch::BatchPlan;
pub use batch::slurm::{JobArraySubmitter, SubmitParams};
pub use exec::process::{ExecutionOutcome, run_command};
pub use exec::{CaptureMode, DefaultHooks, ExecContext, ExecutionHooks, Invocation, Lifecycle};
