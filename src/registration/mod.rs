//! Resource provider registration
//!
//! Azure refuses to create resources of a type until the owning resource
//! provider namespace (e.g. `Microsoft.Network`) is registered on the
//! subscription. This module computes which required namespaces still need
//! registering and drives them to `Registered`.
//!
//! # Module Structure
//!
//! - [`reconciler`] - The register/re-query loop with deadline and cancellation
//! - [`retry`] - Bounded exponential backoff for transient failures
//!
//! The cloud side is abstracted behind [`ProviderApi`], implemented for real
//! endpoints by [`crate::arm::client::ArmClient`] and by fakes in tests.

pub mod reconciler;
pub mod retry;

pub use reconciler::{ensure_registered, plan, reconcile, ReconcilePolicy, ReconcileReport};
pub use retry::RetryPolicy;

use crate::error::ApiError;
use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

/// Namespaces registered by default before provisioning networking and storage.
pub const DEFAULT_REQUIRED_PROVIDERS: &[&str] = &["Microsoft.Network", "Microsoft.Storage"];

/// Registration state of a resource provider on a subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum RegistrationState {
    #[default]
    NotRegistered,
    Registering,
    Registered,
    Unregistering,
}

impl RegistrationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotRegistered => "NotRegistered",
            Self::Registering => "Registering",
            Self::Registered => "Registered",
            Self::Unregistering => "Unregistering",
        }
    }

    /// Case-insensitive. ARM also reports `Unregistered`; that and any value
    /// we do not recognise count as not registered.
    pub fn from_wire(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "registered" => Self::Registered,
            "registering" => Self::Registering,
            "unregistering" => Self::Unregistering,
            _ => Self::NotRegistered,
        }
    }
}

impl FromStr for RegistrationState {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from_wire(s))
    }
}

impl<'de> Deserialize<'de> for RegistrationState {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::from_wire(&raw))
    }
}

impl fmt::Display for RegistrationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of the subscription's provider list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderRegistrationStatus {
    pub namespace: String,
    #[serde(default)]
    pub registration_state: RegistrationState,
}

impl ProviderRegistrationStatus {
    pub fn new(namespace: &str, registration_state: RegistrationState) -> Self {
        Self {
            namespace: namespace.to_string(),
            registration_state,
        }
    }
}

/// Ordered, de-duplicated set of provider namespaces this system depends on.
///
/// Duplicates are detected ignoring ASCII case; the first spelling is kept.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RequiredProviderSet {
    namespaces: Vec<String>,
}

impl RequiredProviderSet {
    pub fn new<I, S>(namespaces: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = Self::default();
        for ns in namespaces {
            set.insert(ns.as_ref());
        }
        set
    }

    /// Insert a namespace, returning false if already present.
    pub fn insert(&mut self, namespace: &str) -> bool {
        let namespace = namespace.trim();
        if namespace.is_empty() || self.contains(namespace) {
            return false;
        }
        self.namespaces.push(namespace.to_string());
        true
    }

    pub fn contains(&self, namespace: &str) -> bool {
        self.namespaces
            .iter()
            .any(|ns| ns.eq_ignore_ascii_case(namespace))
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.namespaces.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.namespaces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.namespaces.is_empty()
    }
}

/// Capability to query and register resource providers on a subscription.
#[async_trait]
pub trait ProviderApi: Send + Sync {
    /// Current registration status of every provider visible to the subscription.
    async fn list_resource_providers(&self) -> Result<Vec<ProviderRegistrationStatus>, ApiError>;

    /// Request registration of a namespace. Idempotent.
    async fn register_provider(&self, namespace: &str) -> Result<(), ApiError>;
}

/// Required namespaces that are missing from `current` or not yet `Registered`,
/// in the required set's order and spelling.
pub fn pending_providers(
    required: &RequiredProviderSet,
    current: &[ProviderRegistrationStatus],
) -> Vec<String> {
    required
        .iter()
        .filter(|ns| state_of(current, ns) != Some(RegistrationState::Registered))
        .map(str::to_string)
        .collect()
}

/// Look up the state of a namespace, ignoring ASCII case.
pub fn state_of(current: &[ProviderRegistrationStatus], namespace: &str) -> Option<RegistrationState> {
    current
        .iter()
        .find(|s| s.namespace.eq_ignore_ascii_case(namespace))
        .map(|s| s.registration_state)
}
