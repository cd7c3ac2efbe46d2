//! Shared traits used across modules

pub mod traits;

pub use traits::BlobSource;
