//! SHA256 digest utilities for optional layer verification

use crate::error::{Result, RunnerError};
use sha2::{Digest, Sha256};

/// Outcome of checking a blob against its descriptor digest
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verification {
    Verified,
    /// The digest uses an algorithm other than sha256
    Unsupported(String),
}

pub struct DigestUtils;

impl DigestUtils {
    /// Compute SHA256 digest from byte data
    pub fn compute_sha256(data: &[u8]) -> String {
        hex::encode(Sha256::digest(data))
    }

    /// Compute full Docker digest (with sha256: prefix) from byte data
    pub fn compute_docker_digest(data: &[u8]) -> String {
        format!("sha256:{}", Self::compute_sha256(data))
    }

    /// Validate SHA256 hex string (64 characters, all hex)
    pub fn is_valid_sha256_hex(digest: &str) -> bool {
        digest.len() == 64 && digest.chars().all(|c| c.is_ascii_hexdigit())
    }

    /// Verify data matches the expected `algorithm:hex` digest
    pub fn verify(data: &[u8], expected_digest: &str) -> Result<Verification> {
        let Some((algorithm, hex_part)) = expected_digest.split_once(':') else {
            return Err(RunnerError::Layer(format!(
                "Malformed digest (missing algorithm prefix): {}",
                expected_digest
            )));
        };

        if algorithm != "sha256" {
            return Ok(Verification::Unsupported(algorithm.to_string()));
        }

        if !Self::is_valid_sha256_hex(hex_part) {
            return Err(RunnerError::Layer(format!(
                "Invalid SHA256 digest: {}",
                expected_digest
            )));
        }

        let computed = Self::compute_sha256(data);
        if !computed.eq_ignore_ascii_case(hex_part) {
            return Err(RunnerError::DigestMismatch {
                digest: expected_digest.to_string(),
                computed: format!("sha256:{}", computed),
            });
        }

        Ok(Verification::Verified)
    }
}
