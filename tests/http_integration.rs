//! Integration tests for the ARM client using wiremock
//!
//! These tests drive `ArmClient` against mocked resource manager endpoints,
//! covering pagination, status classification, environment discovery and a
//! full registration run.

use azstack::arm::auth::ServicePrincipal;
use azstack::arm::client::ArmClient;
use azstack::arm::http::CLIENT_REQUEST_ID_HEADER;
use azstack::registration::{reconcile, ReconcilePolicy, RegistrationState, RequiredProviderSet, RetryPolicy};
use azstack::{ApiError, ReconcileError};
use serde_json::json;
use std::time::Duration;
use tokio::time::Instant;
use tokio_test::{assert_err, assert_ok};
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{bearer_token, body_string_contains, header_exists, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const PROVIDERS_PATH: &str = "/subscriptions/sub1/providers";

fn client(server: &MockServer) -> ArmClient {
    ArmClient::with_token(&server.uri(), "sub1", "test-token").expect("client should build")
}

fn provider(namespace: &str, state: &str) -> serde_json::Value {
    json!({
        "id": format!("{PROVIDERS_PATH}/{namespace}"),
        "namespace": namespace,
        "registrationState": state,
        "resourceTypes": []
    })
}

fn fast_policy() -> ReconcilePolicy {
    ReconcilePolicy {
        retry: RetryPolicy::immediate(2),
        poll_interval: Duration::ZERO,
        concurrency: 1,
    }
}

/// Test module for provider listing and registration calls
mod provider_api_tests {
    use super::*;

    #[tokio::test]
    async fn test_list_sends_token_and_request_id() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(PROVIDERS_PATH))
            .and(query_param("api-version", "2018-05-01"))
            .and(bearer_token("test-token"))
            .and(header_exists(CLIENT_REQUEST_ID_HEADER))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": [provider("Microsoft.Network", "Registered")]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let providers = assert_ok!(client(&server).list_providers().await);

        assert_eq!(providers.len(), 1);
        assert_eq!(providers[0].namespace, "Microsoft.Network");
        assert_eq!(providers[0].registration_state, RegistrationState::Registered);
    }

    #[tokio::test]
    async fn test_list_follows_next_link() {
        let server = MockServer::start().await;
        let next_link = format!(
            "{}{}?api-version=2018-05-01&%24skiptoken=page2",
            server.uri(),
            PROVIDERS_PATH
        );

        // page two first: a more specific matcher must be mounted before the catch-all
        Mock::given(method("GET"))
            .and(path(PROVIDERS_PATH))
            .and(query_param("$skiptoken", "page2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": [provider("Microsoft.Storage", "NotRegistered")]
            })))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path(PROVIDERS_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": [provider("Microsoft.Network", "Registered")],
                "nextLink": next_link
            })))
            .expect(1)
            .mount(&server)
            .await;

        let providers = client(&server).list_providers().await.unwrap();

        let namespaces: Vec<_> = providers.iter().map(|p| p.namespace.as_str()).collect();
        assert_eq!(namespaces, vec!["Microsoft.Network", "Microsoft.Storage"]);
        assert_eq!(providers[1].registration_state, RegistrationState::NotRegistered);
    }

    #[tokio::test]
    async fn test_list_refuses_foreign_next_link() {
        let server = MockServer::start().await;
        let elsewhere = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(PROVIDERS_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": [provider("Microsoft.Network", "Registered")],
                "nextLink": format!("{}{}?page=2", elsewhere.uri(), PROVIDERS_PATH)
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"value": []})))
            .expect(0)
            .mount(&elsewhere)
            .await;

        let err = assert_err!(client(&server).list_providers().await);
        assert!(matches!(err, ApiError::Decode(ref message) if message.contains("nextLink")));
    }

    #[tokio::test]
    async fn test_register_posts_to_namespace() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/subscriptions/sub1/providers/Microsoft.Storage/register"))
            .and(bearer_token("test-token"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(provider("Microsoft.Storage", "Registering")),
            )
            .expect(1)
            .mount(&server)
            .await;

        let status = client(&server).register("Microsoft.Storage").await.unwrap();
        assert_eq!(status.registration_state, RegistrationState::Registering);
    }

    #[tokio::test]
    async fn test_register_accepted_without_body() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/subscriptions/sub1/providers/Microsoft.Network/register"))
            .respond_with(ResponseTemplate::new(202))
            .mount(&server)
            .await;

        let status = client(&server).register("Microsoft.Network").await.unwrap();
        assert_eq!(status.namespace, "Microsoft.Network");
        assert_eq!(status.registration_state, RegistrationState::Registering);
    }
}

/// Test module for HTTP status classification
mod error_classification_tests {
    use super::*;

    #[tokio::test]
    async fn test_403_is_authorization() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(PROVIDERS_PATH))
            .respond_with(ResponseTemplate::new(403).set_body_json(json!({
                "error": {
                    "code": "AuthorizationFailed",
                    "message": "The client does not have authorization to perform action"
                }
            })))
            .mount(&server)
            .await;

        let err = client(&server).list_providers().await.unwrap_err();
        match err {
            ApiError::Authorization(message) => assert!(message.contains("AuthorizationFailed")),
            other => panic!("expected Authorization, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_503_and_429_are_transient() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(PROVIDERS_PATH))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(PROVIDERS_PATH))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let arm = client(&server);
        assert!(arm.list_providers().await.unwrap_err().is_transient());
        assert!(arm.list_providers().await.unwrap_err().is_transient());
    }

    #[tokio::test]
    async fn test_404_is_rejected() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/subscriptions/sub1/providers/Microsoft.Bogus/register"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "error": {"code": "InvalidResourceNamespace", "message": "not found"}
            })))
            .mount(&server)
            .await;

        let err = assert_err!(client(&server).register("Microsoft.Bogus").await);
        assert!(matches!(err, ApiError::Rejected { status: 404, .. }));
    }

    #[tokio::test]
    async fn test_malformed_body_is_decode_error() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(PROVIDERS_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>proxy login</html>"))
            .mount(&server)
            .await;

        let err = client(&server).list_providers().await.unwrap_err();
        assert!(matches!(err, ApiError::Decode(_)));
    }
}

/// Test module for metadata discovery and service principal login
mod environment_tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_discovers_login_endpoint() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/metadata/endpoints"))
            .and(query_param("api-version", "2015-01-01"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "galleryEndpoint": "https://portal.local.azurestack.external:30015/",
                "graphEndpoint": "https://graph.windows.net/",
                "authentication": {
                    "loginEndpoint": format!("{}/", server.uri()),
                    "audiences": ["https://management.tenant.onmicrosoft.com/abc"]
                }
            })))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/tenant1/oauth2/token"))
            .and(body_string_contains("grant_type=client_credentials"))
            .and(body_string_contains("client_id=app1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "token_type": "Bearer",
                "expires_in": "3599",
                "access_token": "issued-token"
            })))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path(PROVIDERS_PATH))
            .and(bearer_token("issued-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"value": []})))
            .expect(1)
            .mount(&server)
            .await;

        let arm = ArmClient::connect(
            &server.uri(),
            "sub1",
            ServicePrincipal {
                tenant_id: "tenant1".into(),
                client_id: "app1".into(),
                client_secret: "secret".into(),
            },
        )
        .await
        .unwrap();

        // the cached token is reused, so the token mock is hit exactly once
        assert!(arm.list_providers().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_connect_maps_bad_secret_to_authorization() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/metadata/endpoints"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "authentication": {
                    "loginEndpoint": server.uri(),
                    "audiences": ["https://management.azure.com/"]
                }
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/tenant1/oauth2/token"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": "invalid_client",
                "error_description": "AADSTS7000215: Invalid client secret provided."
            })))
            .mount(&server)
            .await;

        let err = ArmClient::connect(
            &server.uri(),
            "sub1",
            ServicePrincipal {
                tenant_id: "tenant1".into(),
                client_id: "app1".into(),
                client_secret: "wrong".into(),
            },
        )
        .await
        .err()
        .expect("connect should fail");

        assert!(matches!(
            err.downcast_ref::<ApiError>(),
            Some(ApiError::Authorization(_))
        ));
    }
}

/// Test module for registration runs against a mocked subscription
mod reconcile_tests {
    use super::*;

    #[tokio::test]
    async fn test_reconcile_registers_missing_provider() {
        let server = MockServer::start().await;

        // first status query: storage missing
        Mock::given(method("GET"))
            .and(path(PROVIDERS_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": [
                    provider("Microsoft.Network", "Registered"),
                    provider("Microsoft.Storage", "NotRegistered")
                ]
            })))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path(PROVIDERS_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": [
                    provider("Microsoft.Network", "Registered"),
                    provider("Microsoft.Storage", "Registered")
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/subscriptions/sub1/providers/Microsoft.Storage/register"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(provider("Microsoft.Storage", "Registering")),
            )
            .expect(1)
            .mount(&server)
            .await;

        let required = RequiredProviderSet::new(["Microsoft.Network", "Microsoft.Storage"]);
        let report = reconcile(
            &client(&server),
            &required,
            &fast_policy(),
            Instant::now() + Duration::from_secs(30),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(report.registered, vec!["Microsoft.Storage"]);
        assert_eq!(report.rounds, 2);
    }

    #[tokio::test]
    async fn test_reconcile_stops_on_forbidden_register() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(PROVIDERS_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"value": []})))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/subscriptions/sub1/providers/Microsoft.Network/register"))
            .respond_with(ResponseTemplate::new(403).set_body_json(json!({
                "error": {"code": "AuthorizationFailed", "message": "no register permission"}
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/subscriptions/sub1/providers/Microsoft.Storage/register"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let required = RequiredProviderSet::new(["Microsoft.Network", "Microsoft.Storage"]);
        let err = reconcile(
            &client(&server),
            &required,
            &fast_policy(),
            Instant::now() + Duration::from_secs(30),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

        assert!(matches!(
            err,
            ReconcileError::Authorization { namespace: Some(ref ns), .. } if ns == "Microsoft.Network"
        ));
    }
}
