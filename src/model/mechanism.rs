// src/model/mechanism.rs
//! Mechanism descriptor
//!
//! Describes how a data-plane connection is realised. The forwarder never
//! interprets parameters beyond `dst_ip`; the delegate owns their meaning.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Mechanism type for kernel interfaces
pub const KERNEL_MECHANISM: &str = "kernel";

/// Parameter carrying the address a remote peer should send to
pub const DST_IP: &str = "dst_ip";

/// Mechanism class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MechanismClass {
    Local,
    Remote,
}

/// Candidate or negotiated data-plane mechanism
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mechanism {
    #[serde(rename = "cls", alias = "class")]
    pub class: MechanismClass,

    #[serde(rename = "type")]
    pub mechanism_type: String,

    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
}

impl Mechanism {
    pub fn new(class: MechanismClass, mechanism_type: impl Into<String>) -> Self {
        Self {
            class,
            mechanism_type: mechanism_type.into(),
            parameters: BTreeMap::new(),
        }
    }

    pub fn local(mechanism_type: impl Into<String>) -> Self {
        Self::new(MechanismClass::Local, mechanism_type)
    }

    pub fn remote(mechanism_type: impl Into<String>) -> Self {
        Self::new(MechanismClass::Remote, mechanism_type)
    }

    /// REMOTE kernel mechanism pointing peers at `dst_ip`
    pub fn kernel_remote(dst_ip: impl Into<String>) -> Self {
        Self::remote(KERNEL_MECHANISM).with_parameter(DST_IP, dst_ip)
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    pub fn is_remote(&self) -> bool {
        self.class == MechanismClass::Remote
    }

    pub fn dst_ip(&self) -> Option<&str> {
        self.parameters.get(DST_IP).map(String::as_str)
    }

    /// Set `dst_ip`, leaving every other parameter untouched
    pub fn set_dst_ip(&mut self, dst_ip: impl Into<String>) {
        self.parameters.insert(DST_IP.to_string(), dst_ip.into());
    }
}
