//! Core traits for the balance monitor
//!
//! This module defines the abstract interfaces that all implementations must follow.
//!
//! - [`ValueSource`]: Read the current balance of a location
//! - [`Notifier`]: Deliver text to an audience
//! - [`CommandTransport`]: Poll for inbound commands
//! - [`StateStore`]: Persist the last known balance per location

pub mod value_source;
pub mod notifier;
pub mod command_transport;
pub mod state_store;

pub use value_source::{ValueSource, ValueSourceFactory};
pub use notifier::{Audience, Notifier};
pub use command_transport::{CommandTransport, InboundMessage};
pub use state_store::{BalanceMap, LocationBalance, StateStore};
