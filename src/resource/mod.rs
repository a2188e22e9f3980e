//! Resource identifiers
//!
//! Every import and lookup path receives resources as opaque ARM ID
//! strings; [`id`] turns them into structured segments before any
//! follow-up API call is made.

pub mod id;

pub use id::{AzureResourceId, ResourceGroupId};
