//! Image reference parsing (`name[:tag]`)

use crate::error::{Result, RunnerError};
use std::fmt;
use std::str::FromStr;

pub const DEFAULT_TAG: &str = "latest";

/// A Docker Hub image reference such as `busybox` or `alpine:3.19`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageReference {
    name: String,
    tag: String,
}

impl ImageReference {
    pub fn parse(reference: &str) -> Result<Self> {
        let mut parts = reference.split(':');
        let name = parts.next().unwrap_or_default();
        let tag = parts.next();

        if parts.next().is_some() {
            return Err(RunnerError::InvalidReference(format!(
                "'{}' contains more than one ':'",
                reference
            )));
        }

        if name.is_empty() {
            return Err(RunnerError::InvalidReference(format!(
                "'{}' has an empty image name",
                reference
            )));
        }

        let tag = match tag {
            Some("") => {
                return Err(RunnerError::InvalidReference(format!(
                    "'{}' has an empty tag",
                    reference
                )));
            }
            Some(tag) => tag,
            None => DEFAULT_TAG,
        };

        Ok(Self {
            name: name.to_string(),
            tag: tag.to_string(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Repository path inside the registry, e.g. `library/busybox`
    pub fn repository(&self, namespace: &str) -> String {
        if namespace.is_empty() {
            self.name.clone()
        } else {
            format!("{}/{}", namespace, self.name)
        }
    }
}

impl FromStr for ImageReference {
    type Err = RunnerError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.tag)
    }
}
