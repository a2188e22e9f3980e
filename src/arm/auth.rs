//! ARM Authentication
//!
//! Service-principal (client credentials) tokens from the environment's
//! login endpoint, or a caller-supplied bearer token.
//!
//! AAD authorities take the tenant in the token path. Disconnected Azure
//! Stack stamps authenticate against ADFS, whose login endpoint ends in
//! `/adfs` and has a single token endpoint with no tenant segment.

use super::environment::ArmEnvironment;
use super::http::ArmHttpClient;
use crate::error::ApiError;
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Token expiry buffer - refresh tokens this much before they actually expire
/// This prevents using tokens that are about to expire during a request
const TOKEN_EXPIRY_BUFFER_SECS: i64 = 60;

/// Default token TTL if the token endpoint does not report one
const DEFAULT_TOKEN_TTL_SECS: i64 = 30 * 60;

/// Service principal used for the client-credentials grant
#[derive(Clone)]
pub struct ServicePrincipal {
    pub tenant_id: String,
    pub client_id: String,
    pub client_secret: String,
}

impl std::fmt::Debug for ServicePrincipal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServicePrincipal")
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &"***")
            .finish()
    }
}

enum TokenSource {
    ClientCredentials {
        token_url: String,
        audience: String,
        principal: ServicePrincipal,
    },
    Static(String),
}

/// ARM credentials holder with token caching
#[derive(Clone)]
pub struct ArmCredentials {
    source: Arc<TokenSource>,
    http: ArmHttpClient,
    token_cache: Arc<RwLock<Option<CachedToken>>>,
}

#[derive(Clone)]
struct CachedToken {
    token: String,
    /// When this token expires (with buffer applied)
    expires_at: DateTime<Utc>,
}

impl CachedToken {
    fn is_valid(&self) -> bool {
        Utc::now() < self.expires_at
    }
}

impl ArmCredentials {
    /// Credentials that run the client-credentials grant against `environment`
    pub fn service_principal(
        http: ArmHttpClient,
        environment: &ArmEnvironment,
        principal: ServicePrincipal,
    ) -> Self {
        let token_url = token_url(&environment.login_endpoint, &principal.tenant_id);
        Self {
            source: Arc::new(TokenSource::ClientCredentials {
                token_url,
                audience: environment.audience.clone(),
                principal,
            }),
            http,
            token_cache: Arc::new(RwLock::new(None)),
        }
    }

    /// Credentials backed by an already-issued bearer token
    pub fn static_token(http: ArmHttpClient, token: &str) -> Self {
        Self {
            source: Arc::new(TokenSource::Static(token.to_string())),
            http,
            token_cache: Arc::new(RwLock::new(None)),
        }
    }

    /// Get an access token for API calls
    /// Security: Checks token expiry before returning cached token
    pub async fn get_token(&self) -> Result<String, ApiError> {
        let (token_url, audience, principal) = match self.source.as_ref() {
            TokenSource::Static(token) => return Ok(token.clone()),
            TokenSource::ClientCredentials {
                token_url,
                audience,
                principal,
            } => (token_url, audience, principal),
        };

        {
            let cache = self.token_cache.read().await;
            if let Some(cached) = cache.as_ref() {
                if cached.is_valid() {
                    return Ok(cached.token.clone());
                }
                tracing::debug!("Cached token expired, fetching new token");
            }
        }

        let form = [
            ("grant_type", "client_credentials"),
            ("client_id", principal.client_id.as_str()),
            ("client_secret", principal.client_secret.as_str()),
            ("resource", audience.as_str()),
        ];
        let response = self.http.post_form(token_url, &form).await.map_err(|e| match e {
            // token endpoints answer bad secrets with 400/401
            ApiError::Rejected { status, message } if (400..500).contains(&status) => {
                ApiError::Authorization(format!("token request failed ({status}): {message}"))
            }
            other => other,
        })?;

        let cached = parse_token_response(&response, Utc::now())?;
        let token = cached.token.clone();

        {
            let mut cache = self.token_cache.write().await;
            *cache = Some(cached);
        }

        tracing::debug!("New token cached for audience {}", audience);
        Ok(token)
    }
}

/// OAuth2 token endpoint for an AAD or ADFS login endpoint
fn token_url(login_endpoint: &str, tenant_id: &str) -> String {
    let login_endpoint = login_endpoint.trim_end_matches('/');
    let is_adfs = login_endpoint
        .rsplit('/')
        .next()
        .is_some_and(|segment| segment.eq_ignore_ascii_case("adfs"));

    if is_adfs {
        format!("{login_endpoint}/oauth2/token")
    } else {
        format!("{login_endpoint}/{tenant_id}/oauth2/token")
    }
}

/// Read `access_token` and `expires_in` from a token endpoint response.
/// ADFS and AAD v1 report `expires_in` as a string, v2 as a number.
fn parse_token_response(response: &Value, now: DateTime<Utc>) -> Result<CachedToken, ApiError> {
    let token = response
        .get("access_token")
        .and_then(|v| v.as_str())
        .ok_or_else(|| ApiError::Decode("token response has no access_token".to_string()))?;

    let ttl = response
        .get("expires_in")
        .and_then(|v| v.as_i64().or_else(|| v.as_str().and_then(|s| s.parse().ok())))
        .unwrap_or(DEFAULT_TOKEN_TTL_SECS);

    Ok(CachedToken {
        token: token.to_string(),
        expires_at: now + Duration::seconds(ttl - TOKEN_EXPIRY_BUFFER_SECS),
    })
}
