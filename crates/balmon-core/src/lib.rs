// # balmon-core
//
// Core library for the balance change monitor.
//
// ## Architecture Overview
//
// This library provides everything except the concrete integrations:
// - **ValueSource**: Trait for reading the current balance of a location
// - **Notifier** / **CommandTransport**: Traits for the chat bot side
// - **StateStore**: Trait for persisting the last known balance per location
// - **reconcile()**: Pure change detection over a batch of observations
// - **MonitorContext**: Explicit context object shared by passes and commands
// - **CommandDispatcher**: Enumerated command parsing and handling
// - **Scheduler**: Single-threaded loop over polling and the periodic pass
// - **SourceRegistry**: Plugin-based registry for value sources
//
// ## Design Principles
//
// 1. **Separation of Concerns**: Core logic is separate from integrations
// 2. **Serialized State**: One loop owns the context, so state writes never overlap
// 3. **Plugin-Based**: Sources are registered dynamically, no hard-coded if-else
// 4. **Library-First**: All core functionality can be used as a library
// 5. **Explicit Failures**: Every external call returns a `Result`, and every
//    failure is at least logged

pub mod traits;
pub mod engine;
pub mod registry;
pub mod config;
pub mod error;
pub mod state;
pub mod report;
pub mod context;
pub mod dispatch;
pub mod scheduler;

// Re-export core types for convenience
pub use traits::{
    Audience, BalanceMap, CommandTransport, InboundMessage, LocationBalance, Notifier,
    StateStore, ValueSource,
};
pub use engine::{reconcile, Classification, NotificationPolicy, Observation, Outcome, Reading};
pub use registry::SourceRegistry;
pub use config::{LocationConfig, MonitorConfig, ScheduleConfig, SourceConfig, StateStoreConfig};
pub use context::MonitorContext;
pub use dispatch::{Command, CommandDispatcher};
pub use scheduler::Scheduler;
pub use error::{Error, Result};
pub use state::{FileStateStore, MemoryStateStore};
