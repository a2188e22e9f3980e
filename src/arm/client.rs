//! ARM Client
//!
//! Main client for interacting with Azure Resource Manager, combining
//! authentication and HTTP functionality.

use super::auth::{ArmCredentials, ServicePrincipal};
use super::environment::{self, ArmEnvironment};
use super::http::ArmHttpClient;
use crate::error::ApiError;
use crate::resource::AzureResourceId;
use anyhow::{Context, Result};
use serde_json::Value;

/// Main ARM client
#[derive(Clone)]
pub struct ArmClient {
    pub credentials: ArmCredentials,
    pub http: ArmHttpClient,
    /// Resource manager base URL, without trailing slash
    pub endpoint: String,
    pub subscription_id: String,
}

impl ArmClient {
    /// Discover the environment behind `endpoint` and authenticate as `principal`
    pub async fn connect(endpoint: &str, subscription_id: &str, principal: ServicePrincipal) -> Result<Self> {
        let http = ArmHttpClient::new()?;
        let environment: ArmEnvironment = environment::discover(&http, endpoint)
            .await
            .with_context(|| format!("Failed to discover ARM metadata at {}", endpoint))?;

        let credentials = ArmCredentials::service_principal(http.clone(), &environment, principal);
        credentials
            .get_token()
            .await
            .context("Failed to acquire ARM access token")?;

        Ok(Self {
            credentials,
            http,
            endpoint: environment.resource_manager,
            subscription_id: subscription_id.to_string(),
        })
    }

    /// Create a client that presents an already-issued bearer token
    pub fn with_token(endpoint: &str, subscription_id: &str, token: &str) -> Result<Self> {
        let http = ArmHttpClient::new()?;
        let endpoint = environment::normalize_endpoint(endpoint)?;
        Ok(Self {
            credentials: ArmCredentials::static_token(http.clone(), token),
            http,
            endpoint,
            subscription_id: subscription_id.to_string(),
        })
    }

    /// Get the current access token
    pub async fn get_token(&self) -> Result<String, ApiError> {
        self.credentials.get_token().await
    }

    /// Make a GET request to an ARM API
    pub async fn get(&self, url: &str) -> Result<Value, ApiError> {
        let token = self.get_token().await?;
        self.http.get(url, Some(&token)).await
    }

    /// Make a POST request to an ARM API
    pub async fn post(&self, url: &str, body: Option<&Value>) -> Result<Value, ApiError> {
        let token = self.get_token().await?;
        self.http.post(url, &token, body).await
    }

    // =========================================================================
    // URL helpers
    // =========================================================================

    /// Build a URL for an absolute ARM path (e.g. a resource ID)
    pub fn arm_url(&self, path: &str, api_version: &str) -> String {
        let separator = if path.contains('?') { '&' } else { '?' };
        format!(
            "{}{}{}api-version={}",
            self.endpoint, path, separator, api_version
        )
    }

    /// Build a subscription-scoped URL
    pub fn subscription_url(&self, suffix: &str, api_version: &str) -> String {
        self.arm_url(
            &format!("/subscriptions/{}{}", self.subscription_id, suffix),
            api_version,
        )
    }

    /// Build the URL addressing a parsed resource ID
    pub fn resource_url(&self, id: &AzureResourceId, api_version: &str) -> String {
        self.arm_url(&id.to_string(), api_version)
    }

    /// GET a resource by its ID string.
    ///
    /// The ID is parsed first so that malformed IDs never reach the wire.
    pub async fn get_resource(&self, id: &str, api_version: &str) -> Result<Value> {
        let parsed = AzureResourceId::parse(id)?;
        if !parsed.subscription_id.eq_ignore_ascii_case(&self.subscription_id) {
            tracing::warn!(
                "Resource {} belongs to subscription {}, client is on {}",
                parsed.name(),
                parsed.subscription_id,
                self.subscription_id
            );
        }

        let url = self.resource_url(&parsed, api_version);
        Ok(self.get(&url).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> ArmClient {
        ArmClient::with_token("https://management.local.azurestack.external/", "sub1", "tok").unwrap()
    }

    #[test]
    fn test_endpoint_is_normalized() {
        assert_eq!(client().endpoint, "https://management.local.azurestack.external");
    }

    #[test]
    fn test_subscription_url() {
        assert_eq!(
            client().subscription_url("/providers", "2018-05-01"),
            "https://management.local.azurestack.external/subscriptions/sub1/providers?api-version=2018-05-01"
        );
    }

    #[test]
    fn test_resource_url_from_id() {
        let id = AzureResourceId::parse(
            "/subscriptions/sub1/resourceGroups/rg1/providers/Microsoft.Network/virtualNetworks/vnet1",
        )
        .unwrap();
        assert_eq!(
            client().resource_url(&id, "2017-10-01"),
            "https://management.local.azurestack.external/subscriptions/sub1/resourceGroups/rg1/providers/Microsoft.Network/virtualNetworks/vnet1?api-version=2017-10-01"
        );
    }

    #[tokio::test]
    async fn test_get_resource_rejects_malformed_id() {
        let err = client()
            .get_resource("/subscriptions/sub1/resourceGroups/rg1", "2017-10-01")
            .await
            .unwrap_err();
        assert!(err
            .downcast_ref::<crate::error::MalformedResourceId>()
            .is_some());
    }
}
