//! Anonymous bearer-token authentication against the registry token service

use crate::config::RegistryConfig;
use crate::error::handlers::{HttpErrorHandler, NetworkErrorHandler, RegistryRequest};
use crate::error::{Result, RunnerError};
use crate::image::ImageReference;
use crate::logging::Logger;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use url::Url;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: Option<String>,
    access_token: Option<String>,
    // Informational; tokens are never refreshed within a run
    expires_in: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct Auth {
    client: Client,
    config: RegistryConfig,
    output: Logger,
}

impl Auth {
    pub fn new(client: Client, config: RegistryConfig, output: Logger) -> Self {
        Self {
            client,
            config,
            output,
        }
    }

    /// Token endpoint URL with the pull scope for `reference`'s repository
    pub fn token_url(&self, reference: &ImageReference) -> Result<Url> {
        let scope = format!(
            "repository:{}:pull",
            reference.repository(&self.config.namespace)
        );
        let url = Url::parse_with_params(
            &self.config.auth_url,
            &[("service", self.config.service.as_str()), ("scope", scope.as_str())],
        )?;
        Ok(url)
    }

    /// Request a pull token for the image's repository. Only a 200 response is accepted.
    pub async fn fetch_token(&self, reference: &ImageReference) -> Result<String> {
        let url = self.token_url(reference)?;
        self.output.detail(&format!("Requesting token from: {}", url));

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| NetworkErrorHandler::handle_network_error(RegistryRequest::Token, &e))?;

        let status = response.status();
        if status != StatusCode::OK {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error response".to_string());
            self.output.error(&format!(
                "Token request failed with status {}: {}",
                status, error_text
            ));
            return Err(HttpErrorHandler::handle_status(
                RegistryRequest::Token,
                status,
                &error_text,
            ));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| NetworkErrorHandler::handle_network_error(RegistryRequest::Token, &e))?;
        let token_response: TokenResponse = serde_json::from_slice(&body)
            .map_err(|e| HttpErrorHandler::handle_decode_error(RegistryRequest::Token, &e))?;

        let token = token_response
            .token
            .or(token_response.access_token)
            .filter(|token| !token.is_empty())
            .ok_or_else(|| RunnerError::Auth("Token response did not contain a token".to_string()))?;

        self.output
            .detail(&format!("Token obtained (length: {} chars)", token.len()));
        if let Some(expires_in) = token_response.expires_in {
            self.output
                .detail(&format!("Token expires in {} seconds", expires_in));
        }

        Ok(token)
    }
}
