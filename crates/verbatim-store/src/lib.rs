//! SQLite persistence for jobs and execution records.

mod database;
mod error;
mod row_helpers;
mod schema;

pub mod executions;
pub mod jobs;

pub use database::Database;
pub use error::StoreError;
pub use executions::{ExecutionRepo, ExecutionRow};
pub use jobs::{JobRepo, JobRow};
