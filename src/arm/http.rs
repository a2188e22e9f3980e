//! HTTP utilities for ARM REST API calls

use crate::error::ApiError;
use anyhow::{Context, Result};
use reqwest::{Client, RequestBuilder};
use serde_json::Value;
use std::time::Duration;
use uuid::Uuid;

/// Maximum length of response body to log (to avoid logging sensitive data)
const MAX_LOG_BODY_LENGTH: usize = 200;

/// Per-request timeout; ARM control-plane calls answer well within this.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Header ARM echoes back in its own logs, useful when filing support cases
pub const CLIENT_REQUEST_ID_HEADER: &str = "x-ms-client-request-id";

/// Sanitize response body for logging
/// Truncates long responses and strips control characters
pub(crate) fn sanitize_for_log(body: &str) -> String {
    let truncated = if body.len() > MAX_LOG_BODY_LENGTH {
        let mut end = MAX_LOG_BODY_LENGTH;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... [truncated, {} bytes total]", &body[..end], body.len())
    } else {
        body.to_string()
    };

    truncated.replace(|c: char| !c.is_ascii_graphic() && c != ' ', "")
}

/// Pull `error.code` / `error.message` out of an ARM error body when present.
pub(crate) fn arm_error_message(body: &str) -> String {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let error = parsed.as_ref().and_then(|v| v.get("error"));

    let code = error.and_then(|e| e.get("code")).and_then(|v| v.as_str());
    let message = error.and_then(|e| e.get("message")).and_then(|v| v.as_str());

    match (code, message) {
        (Some(code), Some(message)) => sanitize_for_log(&format!("{code}: {message}")),
        (Some(code), None) => code.to_string(),
        (None, Some(message)) => sanitize_for_log(message),
        (None, None) => sanitize_for_log(body),
    }
}

/// HTTP client wrapper for ARM API calls
#[derive(Clone)]
pub struct ArmHttpClient {
    client: Client,
}

impl ArmHttpClient {
    /// Create a new HTTP client
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .user_agent(format!("azstack/{}", crate::VERSION))
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client })
    }

    /// Make a GET request; `token` is omitted for anonymous metadata calls
    pub async fn get(&self, url: &str, token: Option<&str>) -> Result<Value, ApiError> {
        tracing::debug!("GET {}", url);
        let request = with_token(self.client.get(url), token);
        self.execute("GET", request).await
    }

    /// Make a POST request with an optional JSON body
    pub async fn post(&self, url: &str, token: &str, body: Option<&Value>) -> Result<Value, ApiError> {
        tracing::debug!("POST {}", url);

        let mut request = self.client.post(url).bearer_auth(token);
        match body {
            Some(body) => request = request.json(body),
            // ARM rejects bodiless POSTs without a length
            None => request = request.header(reqwest::header::CONTENT_LENGTH, 0),
        }

        self.execute("POST", request).await
    }

    /// POST an `application/x-www-form-urlencoded` body (token endpoints)
    pub async fn post_form(&self, url: &str, form: &[(&str, &str)]) -> Result<Value, ApiError> {
        tracing::debug!("POST (form) {}", url);
        let request = self.client.post(url).form(form);
        self.execute("POST", request).await
    }

    async fn execute(&self, verb: &str, request: RequestBuilder) -> Result<Value, ApiError> {
        let request_id = Uuid::new_v4();
        let response = request
            .header(CLIENT_REQUEST_ID_HEADER, request_id.to_string())
            .send()
            .await
            .map_err(ApiError::from)?;

        let status = response.status();
        let body = response.text().await.map_err(ApiError::from)?;

        if !status.is_success() {
            // Security: Only log sanitized/truncated error body to avoid leaking sensitive data
            tracing::error!(
                "API error: {} {} (request id {}) - {}",
                verb,
                status,
                request_id,
                sanitize_for_log(&body)
            );
            return Err(ApiError::from_status(status.as_u16(), arm_error_message(&body)));
        }

        // register and other actions may answer 202 with no body
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }

        serde_json::from_str(&body).map_err(|e| ApiError::Decode(e.to_string()))
    }
}

fn with_token(request: RequestBuilder, token: Option<&str>) -> RequestBuilder {
    match token {
        Some(token) => request.bearer_auth(token),
        None => request,
    }
}

/// Format an ARM API error for display
/// Security: Sanitizes error messages to avoid leaking sensitive API details
pub fn format_arm_error(error: &anyhow::Error) -> String {
    if let Some(api) = error.downcast_ref::<ApiError>() {
        return match api {
            ApiError::Authorization(_) => {
                "Permission denied. Check the service principal's role assignments.".to_string()
            }
            ApiError::TransientNetwork(_) => {
                "Azure Resource Manager temporarily unavailable. Please try again.".to_string()
            }
            ApiError::Rejected { status: 404, .. } => "Resource not found.".to_string(),
            ApiError::Rejected { status: 409, .. } => {
                "Resource conflict. The resource may already exist or be in use.".to_string()
            }
            ApiError::Rejected { status, message } => {
                format!("Request rejected ({}): {}", status, truncate(message, 120))
            }
            ApiError::Decode(_) => "Unexpected response from Azure Resource Manager.".to_string(),
            ApiError::InvalidEndpoint(message) => format!("Invalid endpoint {}", truncate(message, 120)),
        };
    }

    truncate(&error.to_string(), 120)
}

fn truncate(message: &str, max: usize) -> String {
    let sanitized: String = message
        .chars()
        .filter(|c| c.is_ascii_graphic() || *c == ' ')
        .take(max)
        .collect();

    if sanitized.len() < message.len() {
        format!("{}...", sanitized)
    } else {
        sanitized
    }
}
