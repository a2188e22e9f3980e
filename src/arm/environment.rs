//! ARM environment discovery
//!
//! Azure Stack stamps publish their login endpoint and token audience at
//! `{endpoint}/metadata/endpoints`. Public Azure answers the same call, so
//! one code path serves both.

use super::http::ArmHttpClient;
use crate::error::ApiError;
use serde::Deserialize;
use url::Url;

const METADATA_API_VERSION: &str = "2015-01-01";

/// Public Azure Resource Manager endpoint
pub const PUBLIC_ARM_ENDPOINT: &str = "https://management.azure.com";

/// Endpoints needed to authenticate against and call an ARM instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArmEnvironment {
    /// Resource manager base URL, without trailing slash
    pub resource_manager: String,
    /// AAD / ADFS authority base URL, without trailing slash
    pub login_endpoint: String,
    /// Resource (audience) to request tokens for
    pub audience: String,
}

#[derive(Debug, Deserialize)]
struct MetadataEndpoints {
    authentication: MetadataAuthentication,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MetadataAuthentication {
    login_endpoint: String,
    #[serde(default)]
    audiences: Vec<String>,
}

/// Normalize a user-supplied endpoint to `scheme://host[:port][/path]` with
/// no trailing slash.
pub fn normalize_endpoint(endpoint: &str) -> Result<String, ApiError> {
    let url = Url::parse(endpoint.trim())
        .map_err(|e| ApiError::InvalidEndpoint(format!("'{endpoint}': {e}")))?;
    if !matches!(url.scheme(), "https" | "http") || url.host_str().is_none() {
        return Err(ApiError::InvalidEndpoint(format!(
            "'{endpoint}' must be an http(s) URL"
        )));
    }
    Ok(url.as_str().trim_end_matches('/').to_string())
}

/// Fetch and parse the metadata document for `endpoint`.
pub async fn discover(http: &ArmHttpClient, endpoint: &str) -> Result<ArmEnvironment, ApiError> {
    let resource_manager = normalize_endpoint(endpoint)?;
    let url = format!(
        "{}/metadata/endpoints?api-version={}",
        resource_manager, METADATA_API_VERSION
    );

    let document = http.get(&url, None).await?;
    let environment = parse_metadata(&resource_manager, document)?;

    tracing::info!(
        "Discovered ARM environment: login={}, audience={}",
        environment.login_endpoint,
        environment.audience
    );
    Ok(environment)
}

fn parse_metadata(resource_manager: &str, document: serde_json::Value) -> Result<ArmEnvironment, ApiError> {
    let metadata: MetadataEndpoints =
        serde_json::from_value(document).map_err(|e| ApiError::Decode(e.to_string()))?;

    let audience = metadata
        .authentication
        .audiences
        .into_iter()
        .next()
        .ok_or_else(|| ApiError::Decode("metadata lists no token audiences".to_string()))?;

    Ok(ArmEnvironment {
        resource_manager: resource_manager.to_string(),
        login_endpoint: metadata
            .authentication
            .login_endpoint
            .trim_end_matches('/')
            .to_string(),
        audience,
    })
}
