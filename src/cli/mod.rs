//! Command-line interface: argument parsing and the run driver

pub mod args;
pub mod runner;

pub use args::{Args, Commands, RunArgs};
pub use runner::{RunRequest, Runner};
