//! Process isolation and execution

pub mod executor;

pub use executor::{ExecState, ExitOutcome, IsolatedExecutor, Isolation};
