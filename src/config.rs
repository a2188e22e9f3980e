//! Configuration Management
//!
//! Provider settings come from three layers, later ones winning:
//! `~/.config/azstack/config.json`, `ARM_*` environment variables, and
//! command-line flags (applied by the binary). The client secret is only
//! ever read from the environment and never written to disk.

use crate::arm::environment::PUBLIC_ARM_ENDPOINT;
use crate::registration::{ReconcilePolicy, RequiredProviderSet, RetryPolicy, DEFAULT_REQUIRED_PROVIDERS};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default overall registration deadline
const DEFAULT_REGISTRATION_TIMEOUT_SECS: u64 = 600;

/// User configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    /// Resource manager endpoint (Azure Stack stamp or public Azure)
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub subscription_id: Option<String>,
    #[serde(default)]
    pub tenant_id: Option<String>,
    #[serde(default)]
    pub client_id: Option<String>,
    /// Namespaces to register; defaults to networking and storage
    #[serde(default)]
    pub required_providers: Option<Vec<String>>,
    #[serde(default)]
    pub skip_provider_registration: bool,
    #[serde(default)]
    pub registration_timeout_secs: Option<u64>,
    #[serde(default)]
    pub max_attempts: Option<u32>,
    #[serde(default)]
    pub initial_backoff_ms: Option<u64>,
    #[serde(default)]
    pub poll_interval_secs: Option<u64>,
    #[serde(default)]
    pub concurrency: Option<usize>,
}

impl Config {
    /// Get the config file path
    fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("azstack").join("config.json"))
    }

    /// Load configuration from disk, falling back to defaults
    pub fn load() -> Self {
        let Some(path) = Self::config_path() else {
            return Self::default();
        };

        match Self::load_from(&path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Ignoring config file {:?}: {:#}", path, e);
                Self::default()
            }
        }
    }

    /// Load configuration from a specific file; a missing file is not an error
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
    }

    /// Overlay `ARM_*` environment variables
    pub fn apply_env(&mut self) {
        self.apply_env_with(|key| std::env::var(key).ok());
    }

    /// Overlay variables from `lookup`; empty values are ignored
    pub fn apply_env_with<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("ARM_ENDPOINT") {
            self.endpoint = Some(v);
        }
        if let Some(v) = get("ARM_SUBSCRIPTION_ID") {
            self.subscription_id = Some(v);
        }
        if let Some(v) = get("ARM_TENANT_ID") {
            self.tenant_id = Some(v);
        }
        if let Some(v) = get("ARM_CLIENT_ID") {
            self.client_id = Some(v);
        }
        if let Some(v) = get("ARM_SKIP_PROVIDER_REGISTRATION") {
            match v.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" => self.skip_provider_registration = true,
                "0" | "false" | "no" => self.skip_provider_registration = false,
                other => tracing::warn!("Ignoring ARM_SKIP_PROVIDER_REGISTRATION={}", other),
            }
        }
    }

    /// Get effective endpoint (CLI > env > config > public Azure)
    pub fn effective_endpoint(&self) -> String {
        self.endpoint
            .clone()
            .unwrap_or_else(|| PUBLIC_ARM_ENDPOINT.to_string())
    }

    /// Required providers, configured or default
    pub fn required_provider_set(&self) -> RequiredProviderSet {
        match &self.required_providers {
            Some(list) => RequiredProviderSet::new(list),
            None => RequiredProviderSet::new(DEFAULT_REQUIRED_PROVIDERS),
        }
    }

    pub fn registration_timeout(&self) -> Duration {
        Duration::from_secs(
            self.registration_timeout_secs
                .unwrap_or(DEFAULT_REGISTRATION_TIMEOUT_SECS),
        )
    }

    /// Reconciler tuning with configured overrides
    pub fn reconcile_policy(&self) -> ReconcilePolicy {
        let defaults = ReconcilePolicy::default();
        let retry_defaults = RetryPolicy::default();

        ReconcilePolicy {
            retry: RetryPolicy {
                max_attempts: self.max_attempts.unwrap_or(retry_defaults.max_attempts).max(1),
                initial_delay: self
                    .initial_backoff_ms
                    .map(Duration::from_millis)
                    .unwrap_or(retry_defaults.initial_delay),
                ..retry_defaults
            },
            poll_interval: self
                .poll_interval_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.poll_interval),
            concurrency: self.concurrency.unwrap_or(defaults.concurrency).max(1),
        }
    }
}
