// src/delegate/mod.rs
//! External delegate ("callout") program
//!
//! Mechanism selection and data-plane bookkeeping are delegated to an
//! external program invoked as `<program> <verb>`:
//!
//! - **init**: once at startup; failure is fatal
//! - **mechanism**: prints the candidate mechanisms as a JSON array
//! - **request**: reads the negotiated connection and the caller's
//!   preferences as JSON on stdin
//! - **close**: reads the connection being torn down as JSON on stdin
//!
//! Exit status 0 is success. Anything else fails the call with the
//! combined stdout/stderr as the message.
//!
//! # Architecture
//!
//! ```text
//! NegotiationStage ──► Delegate (trait)
//!                          │
//!                   DelegateGateway
//!                          │
//!             ┌────────────┴────────────┐
//!        writer task                reader (caller task)
//!        payload → stdin            stdout + stderr + wait
//!                          │
//!                 timeout / cancellation
//!                   SIGTERM → SIGKILL
//! ```

pub mod gateway;
pub mod process;
pub mod protocol;

pub use gateway::{Delegate, DelegateGateway};
pub use process::Invocation;
pub use protocol::{DelegateOutput, Verb};
