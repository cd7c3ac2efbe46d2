//! Configuration module for registry endpoints and run settings

use crate::error::{Result, RunnerError};
use std::env;
use std::path::PathBuf;
use url::Url;

pub const DEFAULT_AUTH_URL: &str = "https://auth.docker.io/token";
pub const DEFAULT_SERVICE: &str = "registry.docker.io";
pub const DEFAULT_REGISTRY_URL: &str = "https://registry.hub.docker.com";
pub const DEFAULT_NAMESPACE: &str = "library";

/// Endpoints of the token service and the registry API
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryConfig {
    pub auth_url: String,
    pub service: String,
    pub registry_url: String,
    pub namespace: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            auth_url: DEFAULT_AUTH_URL.to_string(),
            service: DEFAULT_SERVICE.to_string(),
            registry_url: DEFAULT_REGISTRY_URL.to_string(),
            namespace: DEFAULT_NAMESPACE.to_string(),
        }
    }
}

impl RegistryConfig {
    /// Docker Hub defaults, overridden by `DOCKER_RUNNER_*` environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(auth_url) = env::var("DOCKER_RUNNER_AUTH_URL") {
            config.auth_url = auth_url;
        }
        if let Ok(service) = env::var("DOCKER_RUNNER_SERVICE") {
            config.service = service;
        }
        if let Ok(registry_url) = env::var("DOCKER_RUNNER_REGISTRY_URL") {
            config.registry_url = registry_url;
        }
        if let Ok(namespace) = env::var("DOCKER_RUNNER_NAMESPACE") {
            config.namespace = namespace;
        }

        config.validate()?;
        Ok(config)
    }

    /// Point both endpoints at one base URL, as a local test registry does
    pub fn for_registry(base_url: &str) -> Result<Self> {
        let base = base_url.trim_end_matches('/');
        let config = Self {
            auth_url: format!("{}/token", base),
            registry_url: base.to_string(),
            ..Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        for (name, value) in [("auth URL", &self.auth_url), ("registry URL", &self.registry_url)] {
            let parsed = Url::parse(value)
                .map_err(|e| RunnerError::Config(format!("Invalid {} '{}': {}", name, value, e)))?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(RunnerError::Config(format!(
                    "{} must use http:// or https://: {}",
                    name, value
                )));
            }
        }

        if self.service.is_empty() {
            return Err(RunnerError::Config("Token service cannot be empty".to_string()));
        }

        Ok(())
    }

    /// Registry base URL without a trailing slash
    pub fn registry_base(&self) -> &str {
        self.registry_url.trim_end_matches('/')
    }
}

/// Settings for a single run
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub registry: RegistryConfig,
    pub verbose: bool,
    pub quiet: bool,
    pub verify_digests: bool,
    /// Prefix of the temporary root directory name
    pub root_prefix: String,
    /// Parent directory for the root; the system temp dir when unset
    pub root_parent: Option<PathBuf>,
    /// chroot and PID namespace for the child. Needs CAP_SYS_ADMIN and CAP_SYS_CHROOT.
    pub isolate: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            registry: RegistryConfig::default(),
            verbose: false,
            quiet: false,
            verify_digests: false,
            root_prefix: "docker-runner-".to_string(),
            root_parent: None,
            isolate: true,
        }
    }
}
