//! ARM API interaction module
//!
//! This module provides the core functionality for interacting with Azure
//! Resource Manager and Azure Stack control planes, including environment
//! discovery, authentication, HTTP client, and resource provider management.
//!
//! # Module Structure
//!
//! - [`environment`] - Metadata-endpoint discovery (login endpoint, audience)
//! - [`auth`] - Service principal tokens with caching
//! - [`client`] - Main ARM client for making API requests
//! - [`http`] - HTTP utilities for REST API calls
//! - [`providers`] - Resource provider listing and registration
//!
//! # Example
//!
//! ```ignore
//! use azstack::arm::client::ArmClient;
//!
//! async fn example(principal: ServicePrincipal) -> anyhow::Result<()> {
//!     let client = ArmClient::connect("https://management.local.azurestack.external", "sub", principal).await?;
//!     let providers = client.list_providers().await?;
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod client;
pub mod environment;
pub mod http;
pub mod providers;
