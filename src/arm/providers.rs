//! ARM Resource Providers
//!
//! List and register resource provider namespaces on the client's
//! subscription.

use super::client::ArmClient;
use crate::error::ApiError;
use crate::registration::{ProviderApi, ProviderRegistrationStatus};
use async_trait::async_trait;
use serde::Deserialize;
use url::Url;

/// Resources API version supported by both public Azure and Azure Stack hybrid profiles
pub const PROVIDERS_API_VERSION: &str = "2018-05-01";

/// Safety stop for `nextLink` chains
const MAX_PAGES: usize = 100;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProviderListPage {
    #[serde(default)]
    value: Vec<ProviderRegistrationStatus>,
    #[serde(default)]
    next_link: Option<String>,
}

impl ArmClient {
    /// URL listing every provider visible to the subscription
    pub fn providers_url(&self) -> String {
        self.subscription_url("/providers", PROVIDERS_API_VERSION)
    }

    /// URL registering one provider namespace
    pub fn provider_register_url(&self, namespace: &str) -> String {
        self.subscription_url(
            &format!("/providers/{}/register", urlencoding::encode(namespace)),
            PROVIDERS_API_VERSION,
        )
    }

    /// Whether `link` has the same scheme, host and port as the endpoint
    fn is_own_origin(&self, link: &str) -> bool {
        match (Url::parse(link), Url::parse(&self.endpoint)) {
            (Ok(link), Ok(endpoint)) => link.origin() == endpoint.origin(),
            _ => false,
        }
    }

    /// List all providers (auto-paginate)
    pub async fn list_providers(&self) -> Result<Vec<ProviderRegistrationStatus>, ApiError> {
        let mut all = Vec::new();
        let mut url = self.providers_url();

        for _ in 0..MAX_PAGES {
            let response = self.get(&url).await?;
            let page: ProviderListPage =
                serde_json::from_value(response).map_err(|e| ApiError::Decode(e.to_string()))?;
            all.extend(page.value);

            match page.next_link.filter(|link| !link.is_empty()) {
                Some(next) => {
                    // the bearer token goes wherever nextLink points
                    if !self.is_own_origin(&next) {
                        return Err(ApiError::Decode(format!(
                            "nextLink points outside {}",
                            self.endpoint
                        )));
                    }
                    url = next;
                }
                None => {
                    tracing::debug!("Listed {} resource providers", all.len());
                    return Ok(all);
                }
            }
        }

        Err(ApiError::Decode(format!(
            "provider list did not terminate after {} pages",
            MAX_PAGES
        )))
    }

    /// Request registration of a namespace
    pub async fn register(&self, namespace: &str) -> Result<ProviderRegistrationStatus, ApiError> {
        tracing::info!("Registering resource provider {}", namespace);
        let response = self.post(&self.provider_register_url(namespace), None).await?;

        // ARM answers with the provider document; some stamps answer 202 with no body
        if response.is_null() {
            return Ok(ProviderRegistrationStatus::new(
                namespace,
                crate::registration::RegistrationState::Registering,
            ));
        }
        serde_json::from_value(response).map_err(|e| ApiError::Decode(e.to_string()))
    }
}

#[async_trait]
impl ProviderApi for ArmClient {
    async fn list_resource_providers(&self) -> Result<Vec<ProviderRegistrationStatus>, ApiError> {
        self.list_providers().await
    }

    async fn register_provider(&self, namespace: &str) -> Result<(), ApiError> {
        let status = self.register(namespace).await?;
        tracing::debug!("{} is now {}", status.namespace, status.registration_state);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registration::RegistrationState;
    use serde_json::json;

    fn client() -> ArmClient {
        ArmClient::with_token("https://management.azure.com", "sub1", "tok").unwrap()
    }

    #[test]
    fn test_register_url() {
        assert_eq!(
            client().provider_register_url("Microsoft.Network"),
            "https://management.azure.com/subscriptions/sub1/providers/Microsoft.Network/register?api-version=2018-05-01"
        );
    }

    #[test]
    fn test_next_link_origin() {
        let c = client();
        assert!(c.is_own_origin("https://management.azure.com/subscriptions/sub1/providers?page=2"));
        assert!(!c.is_own_origin("https://management.azure.com.attacker.example/providers"));
        assert!(!c.is_own_origin("http://management.azure.com/subscriptions/sub1/providers"));
        assert!(!c.is_own_origin("/subscriptions/sub1/providers"));
    }

    #[test]
    fn test_page_parsing() {
        let page: ProviderListPage = serde_json::from_value(json!({
            "value": [
                {"id": "/subscriptions/sub1/providers/Microsoft.Network", "namespace": "Microsoft.Network", "registrationState": "Registered", "resourceTypes": []},
                {"namespace": "Microsoft.Storage", "registrationState": "NotRegistered"}
            ],
            "nextLink": "https://management.azure.com/subscriptions/sub1/providers?page=2"
        }))
        .unwrap();
        assert_eq!(page.value.len(), 2);
        assert_eq!(page.value[1].registration_state, RegistrationState::NotRegistered);
        assert!(page.next_link.is_some());
    }
}
