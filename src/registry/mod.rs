//! Registry module for Docker registry interactions
//!
//! This module provides anonymous token authentication and a client for the
//! Docker Registry HTTP API v2 read path (manifests and blobs).

pub mod auth;
pub mod client;

pub use auth::Auth;
pub use client::{RegistryClient, RegistryClientBuilder};
