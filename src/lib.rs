//! azstack - Azure Stack / Azure Resource Manager provider core
//!
//! - [`resource`] - ARM resource ID parsing
//! - [`registration`] - Resource provider registration reconciler
//! - [`arm`] - ARM REST client implementing [`registration::ProviderApi`]
//! - [`config`] - Provider configuration (file, environment, CLI)

pub mod arm;
pub mod config;
pub mod error;
pub mod registration;
pub mod resource;

pub use error::{ApiError, IncompleteCause, MalformedResourceId, ReconcileError};
pub use resource::{AzureResourceId, ResourceGroupId};

/// Version injected at compile time via AZSTACK_VERSION env var (set by CI/CD),
/// or "dev" for local builds.
pub const VERSION: &str = match option_env!("AZSTACK_VERSION") {
    Some(v) => v,
    None => "dev",
};
