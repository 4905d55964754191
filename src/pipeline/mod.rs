// src/pipeline/mod.rs
//! Request/close interceptor pipeline
//!
//! - **Chain**: ordered composition of stages ending in a `Downstream`
//! - **Context**: per-request side channel, cancellation and diagnostics
//! - **Augmentation**: server-side stage capturing preferences and
//!   stamping `dst_ip`
//! - **Negotiation**: client-side stage consulting the delegate
//! - **Loopback**: local terminal hop
//!
//! # Architecture
//!
//! ```text
//! caller
//!   │  ConnectionRequest
//!   ▼
//! Augmentation(endpoint)   ── preferences → side channel
//!   ▼
//! Augmentation(mechanism)  ◄─ reply: dst_ip stamped here
//!   ▼
//! Negotiation              ── mechanism / request / close → delegate
//!   ▼
//! Downstream (next hop)
//! ```

pub mod augmentation;
pub mod chain;
pub mod context;
pub mod loopback;
pub mod negotiation;

// Re-export commonly used types
pub use augmentation::{augment, AddressAugmentationStage, Augmentation, AugmentationRole};
pub use chain::{Chain, ChainBuilder, Downstream, Next, Stage};
pub use context::{ContextKey, Diagnostics, MechanismPreferences, RequestContext};
pub use loopback::LoopbackEndpoint;
pub use negotiation::NegotiationStage;
