//! Registry API client: manifest and blob downloads with a bearer token

use crate::common::BlobSource;
use crate::config::RegistryConfig;
use crate::error::handlers::{HttpErrorHandler, NetworkErrorHandler, RegistryRequest};
use crate::error::{Result, RunnerError};
use crate::image::{ImageReference, Manifest, DOCKER_MANIFEST_V2};
use crate::logging::Logger;
use crate::registry::auth::Auth;
use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::{Client, Response, StatusCode};

pub struct RegistryClientBuilder {
    config: RegistryConfig,
    output: Logger,
    token: Option<String>,
}

impl RegistryClientBuilder {
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            config,
            output: Logger::new_quiet(),
            token: None,
        }
    }

    pub fn with_logger(mut self, output: Logger) -> Self {
        self.output = output;
        self
    }

    /// Use an already issued token instead of requesting one
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Build the client, fetching a pull token for `reference` unless one was supplied
    pub async fn build(self, reference: &ImageReference) -> Result<RegistryClient> {
        self.config.validate()?;

        let client = Client::builder()
            .build()
            .map_err(|e| RunnerError::Config(format!("Failed to create HTTP client: {}", e)))?;

        let token = match self.token {
            Some(token) => token,
            None => {
                let auth = Auth::new(client.clone(), self.config.clone(), self.output.clone());
                auth.fetch_token(reference).await?
            }
        };

        Ok(RegistryClient {
            client,
            config: self.config,
            output: self.output,
            token,
        })
    }
}

/// Client bound to one bearer token, reused for every request in a run
pub struct RegistryClient {
    client: Client,
    config: RegistryConfig,
    output: Logger,
    token: String,
}

impl RegistryClient {
    pub fn builder(config: RegistryConfig) -> RegistryClientBuilder {
        RegistryClientBuilder::new(config)
    }

    pub fn manifest_url(&self, reference: &ImageReference) -> String {
        format!(
            "{}/v2/{}/manifests/{}",
            self.config.registry_base(),
            reference.repository(&self.config.namespace),
            reference.tag()
        )
    }

    pub fn blob_url(&self, reference: &ImageReference, digest: &str) -> String {
        format!(
            "{}/v2/{}/blobs/{}",
            self.config.registry_base(),
            reference.repository(&self.config.namespace),
            digest
        )
    }

    /// Download and decode the v2 manifest for the reference's tag
    pub async fn pull_manifest(&self, reference: &ImageReference) -> Result<Manifest> {
        let url = self.manifest_url(reference);
        self.output.verbose(&format!("Pulling manifest for {}", reference));
        self.output.detail(&format!("GET {}", url));

        let request = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .header(ACCEPT, DOCKER_MANIFEST_V2);

        let response = request
            .send()
            .await
            .map_err(|e| NetworkErrorHandler::handle_network_error(RegistryRequest::Manifest, &e))?;
        let response = self.expect_ok(response, RegistryRequest::Manifest).await?;

        if let Some(content_type) = response.headers().get("Content-Type") {
            self.output.detail(&format!(
                "Manifest type: {}",
                content_type.to_str().unwrap_or("unknown")
            ));
        }

        let data = response
            .bytes()
            .await
            .map_err(|e| NetworkErrorHandler::handle_network_error(RegistryRequest::Manifest, &e))?;

        Manifest::from_slice(&data)
            .map_err(|e| HttpErrorHandler::handle_decode_error(RegistryRequest::Manifest, &e))
    }

    /// Download a blob's raw (still compressed) bytes
    pub async fn pull_blob(&self, reference: &ImageReference, digest: &str) -> Result<Vec<u8>> {
        let url = self.blob_url(reference, digest);
        self.output.detail(&format!("GET {}", url));

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| NetworkErrorHandler::handle_network_error(RegistryRequest::Blob, &e))?;
        let response = self.expect_ok(response, RegistryRequest::Blob).await?;

        let data = response
            .bytes()
            .await
            .map_err(|e| NetworkErrorHandler::handle_network_error(RegistryRequest::Blob, &e))?;

        self.output.debug(&format!(
            "Pulled blob {} ({})",
            digest,
            self.output.format_size(data.len() as u64)
        ));

        Ok(data.to_vec())
    }

    async fn expect_ok(&self, response: Response, request: RegistryRequest) -> Result<Response> {
        let status = response.status();
        if status == StatusCode::OK {
            return Ok(response);
        }

        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Failed to read error response".to_string());
        self.output.error(&format!(
            "{} failed: HTTP {} - {}",
            request.context(),
            status,
            error_text
        ));

        Err(HttpErrorHandler::handle_status(request, status, &error_text))
    }
}

#[async_trait]
impl BlobSource for RegistryClient {
    async fn fetch_blob(&self, reference: &ImageReference, digest: &str) -> Result<Vec<u8>> {
        self.pull_blob(reference, digest).await
    }
}
