// src/model/mod.rs
//! Values flowing through the pipeline
//!
//! - **Mechanism**: how a connection is realised in the data plane
//! - **Connection**: the connection produced by the downstream chain
//! - **ConnectionRequest**: what a caller asks for, and what the delegate
//!   is told about the outcome

pub mod connection;
pub mod mechanism;

pub use connection::{Connection, ConnectionRequest};
pub use mechanism::{Mechanism, MechanismClass, DST_IP, KERNEL_MECHANISM};
