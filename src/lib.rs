// src/lib.rs
//! NSM Callout Forwarder Library
//!
//! A network service forwarder whose data-plane decisions are made by an
//! external callout program.
//!
//! # Architecture
//!
//! The crate is structured into several key modules:
//!
//! - **model**: Mechanism, connection and request values
//! - **delegate**: The callout program protocol and subprocess gateway
//! - **pipeline**: Request/close chain, negotiation and address augmentation
//! - **forwarder**: Chain assembly and the startup policy
//! - **observability**: Tracing and metrics
//! - **utils**: Configuration and errors

// Public module exports
pub mod delegate;
pub mod forwarder;
pub mod model;
pub mod observability;
pub mod pipeline;
pub mod utils;

// Re-export commonly used types
pub use delegate::{Delegate, DelegateGateway, Verb};
pub use forwarder::Forwarder;
pub use model::{Connection, ConnectionRequest, Mechanism, MechanismClass};
pub use pipeline::{Downstream, RequestContext};
pub use utils::config::ForwarderConfig;
pub use utils::errors::{ForwarderError, Result};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
