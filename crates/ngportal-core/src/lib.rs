// # ngportal-core
//
// Core library for the NGPortal dynamic DNS updater.
//
// ## Architecture Overview
//
// This library keeps a published hostname pointed at the host's public IP:
// - **IpEndpoint / IpResolver**: Find the public IP via ordered IP-echo services
// - **DnsProvider**: Push the IP to a DDNS provider's update endpoint
// - **StateStore**: Remember the last accepted IP across restarts
// - **Scheduler**: Periodic single-flight ticks with cooperative cancellation
// - **DdnsEngine**: Orchestrates resolve → compare → update → persist per tick
// - **ProviderRegistry**: Plugin-based registry for providers and state stores
//
// ## Design Principles
//
// 1. **Separation of Concerns**: Core logic is separate from implementations
// 2. **Single Flight**: At most one provider call in flight per engine
// 3. **Plugin-Based**: Providers are registered dynamically, no hard-coded if-else
// 4. **Library-First**: The daemon is a thin shell around this crate
// 5. **Idempotency**: An unchanged IP never reaches the provider

pub mod config;
pub mod engine;
pub mod error;
pub mod registry;
pub mod resolver;
pub mod scheduler;
pub mod settings;
pub mod state;
pub mod status;
pub mod traits;

// Re-export core types for convenience
pub use config::{AuthToken, DdnsConfig, EngineConfig, ProviderKind, ResolverConfig, StateStoreConfig};
pub use engine::{DdnsEngine, EngineEvent};
pub use error::{Error, FailureReason, ProviderError, ResolutionError, Result};
pub use registry::ProviderRegistry;
pub use resolver::FallbackResolver;
pub use scheduler::{Scheduler, TickContext};
pub use settings::DdnsSettings;
pub use state::{FileStateStore, MemoryStateStore};
pub use status::{EngineStatus, Phase, UpdateAttempt, UpdateOutcome};
pub use traits::{DnsProvider, IpEndpoint, IpResolver, StateRecord, StateStore};
