//! Core traits for the DDNS updater
//!
//! This module defines the abstract interfaces that all implementations must follow.
//!
//! - [`IpEndpoint`] / [`IpResolver`]: Find the current public IP
//! - [`DnsProvider`]: Push the IP to a DDNS provider
//! - [`StateStore`]: Persistent state across restarts

pub mod dns_provider;
pub mod ip_resolver;
pub mod state_store;

pub use dns_provider::{DnsProvider, DnsProviderFactory};
pub use ip_resolver::{IpEndpoint, IpResolver};
pub use state_store::{StateRecord, StateStore, StateStoreFactory};
