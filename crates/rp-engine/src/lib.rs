//! Rampart execution engine.
//!
//! A playbook is an immutable directed graph of steps. Running one walks
//! the graph depth-first from its trigger step, evaluating condition
//! expressions against the run's variable bindings and delegating
//! side-effecting steps to an [`ActionCollaborator`]. The outcome is an
//! [`ExecutionResult`]: ordered step results, final variables, and an
//! append-only log, all serializable for audit storage.
//!
//! The engine never panics on playbook content. Malformed graphs,
//! unknown step types, and unparsable condition expressions surface as
//! failed steps or a failed run, never as an `Err` from
//! [`PlaybookRunner::run`].

pub mod context;
pub mod dispatch;
pub mod expr;
pub mod playbook;
pub mod result;
pub mod runner;

pub use context::{
    Correlation, ExecutionContext, ExecutionStatus, LogEntry, LogLevel, StepResult, StepStatus,
};
pub use dispatch::{
    ActionCollaborator, ActionError, ActionOutcome, Route, StepDispatcher, StepOutcome,
};
pub use expr::ExprError;
pub use playbook::{Playbook, PlaybookStatus, Step, StepConfig, StepKind, ValidationIssue};
pub use result::ExecutionResult;
pub use runner::PlaybookRunner;
