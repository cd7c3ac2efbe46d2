//! Standardized translation of HTTP and transport failures into pipeline errors

use crate::error::RunnerError;
use reqwest::StatusCode;

/// Registry request kinds, each failing into its own error category
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryRequest {
    Token,
    Manifest,
    Blob,
}

impl RegistryRequest {
    pub fn context(&self) -> &'static str {
        match self {
            RegistryRequest::Token => "token request",
            RegistryRequest::Manifest => "manifest pull",
            RegistryRequest::Blob => "blob pull",
        }
    }

    fn into_error(self, message: String) -> RunnerError {
        match self {
            RegistryRequest::Token => RunnerError::Auth(message),
            RegistryRequest::Manifest => RunnerError::Manifest(message),
            RegistryRequest::Blob => RunnerError::Layer(message),
        }
    }
}

/// Standard error handler for non-success HTTP responses
pub struct HttpErrorHandler;

impl HttpErrorHandler {
    pub fn handle_status(
        request: RegistryRequest,
        status: StatusCode,
        error_text: &str,
    ) -> RunnerError {
        let context = request.context();
        let error_msg = match status.as_u16() {
            401 => format!("Unauthorized during {}: {}", context, error_text),
            403 => format!("Access denied during {}: {}", context, error_text),
            404 => format!("Not found during {}: {}", context, error_text),
            429 => format!("Rate limited during {}: {}", context, error_text),
            500 => format!("Registry server error during {}: {}", context, error_text),
            502 | 503 => format!("Registry unavailable during {}: {}", context, error_text),
            _ => format!("{} failed (status {}): {}", context, status, error_text),
        };

        request.into_error(error_msg)
    }

    /// Body could not be decoded into the expected JSON shape
    pub fn handle_decode_error(request: RegistryRequest, error: &dyn std::fmt::Display) -> RunnerError {
        request.into_error(format!(
            "Failed to decode {} response: {}",
            request.context(),
            error
        ))
    }
}

/// Network error categorization and handling
pub struct NetworkErrorHandler;

impl NetworkErrorHandler {
    pub fn handle_network_error(request: RegistryRequest, error: &reqwest::Error) -> RunnerError {
        let context = request.context();
        let message = if error.is_connect() {
            format!("Connection error during {}: {}", context, error)
        } else if error.is_body() || error.is_decode() {
            format!("Failed to read {} response body: {}", context, error)
        } else if error.to_string().contains("certificate") {
            format!("TLS certificate error during {}: {}", context, error)
        } else {
            format!("{} network error: {}", context, error)
        };

        request.into_error(message)
    }
}
