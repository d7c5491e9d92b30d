//! HTTP front end for the workflow runtime

pub mod api;
pub mod executions;

pub use api::{configure, AppState};
pub use executions::{ExecutionResponse, Executions, PausedAtForm, ResponseStatus};
