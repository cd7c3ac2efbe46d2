//! Docker Image Runner Library
//!
//! Pulls an image from a Docker Registry v2 endpoint, assembles its layers into a
//! temporary root filesystem and runs one command inside it with its own root and
//! PID namespace.

pub mod cli;
pub mod common;
pub mod config;
pub mod error;
pub mod image;
pub mod logging;
pub mod registry;
pub mod rootfs;
pub mod runtime;

pub use config::{RegistryConfig, RunConfig};
pub use error::{Result, RunnerError};
pub use logging::Logger;
