// src/model/connection.rs
//! Connection and connection request values
//!
//! Fields the forwarder does not use are kept in `extra` so that a
//! connection handed to the delegate is the connection the peer produced.

use crate::model::mechanism::Mechanism;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// A network service connection as returned by the downstream chain
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Connection {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub network_service: String,

    /// Negotiated mechanism, absent until some peer chose one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mechanism: Option<Mechanism>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Connection {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn with_network_service(mut self, network_service: impl Into<String>) -> Self {
        self.network_service = network_service.into();
        self
    }

    pub fn with_mechanism(mut self, mechanism: Mechanism) -> Self {
        self.mechanism = Some(mechanism);
        self
    }
}

/// Request travelling down the chain
///
/// Also the payload of the delegate `request` verb, where the preferences
/// are the caller's original list rather than the delegate's candidates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConnectionRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection: Option<Connection>,

    #[serde(default, alias = "mechanismPreferences")]
    pub mechanism_preferences: Vec<Mechanism>,
}

impl ConnectionRequest {
    pub fn new(connection: Option<Connection>, mechanism_preferences: Vec<Mechanism>) -> Self {
        Self {
            connection,
            mechanism_preferences,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_unknown_fields_preserved() {
        let raw = json!({
            "id": "conn-1",
            "network_service": "xconnectns",
            "path": {"index": 1, "path_segments": []},
            "context": {"ip_context": {"src_ip_addr": "172.16.0.1/32"}}
        });
        let conn: Connection = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(conn.id, "conn-1");
        assert!(conn.mechanism.is_none());
        assert!(conn.extra.contains_key("path"));

        let back = serde_json::to_value(&conn).unwrap();
        assert_eq!(back, raw);
    }

    #[test]
    fn test_request_payload_shape() {
        let request = ConnectionRequest::new(
            Some(Connection::new("conn-2").with_mechanism(Mechanism::local("kernel"))),
            vec![Mechanism::remote("kernel")],
        );
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["connection"]["id"], "conn-2");
        assert_eq!(value["connection"]["mechanism"]["cls"], "LOCAL");
        assert_eq!(value["mechanism_preferences"][0]["cls"], "REMOTE");
    }

    #[test]
    fn test_request_without_connection() {
        let request = ConnectionRequest::new(None, vec![]);
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value, json!({"mechanism_preferences": []}));
    }

    #[test]
    fn test_empty_fields_omitted() {
        let value = serde_json::to_value(Connection::default()).unwrap();
        assert_eq!(value, json!({}));

        let back: Connection = serde_json::from_value(value).unwrap();
        assert_eq!(back, Connection::default());
    }

    #[test]
    fn test_camel_case_alias() {
        let raw = r#"{"mechanismPreferences": [{"cls": "LOCAL", "type": "kernel"}]}"#;
        let request: ConnectionRequest = serde_json::from_str(raw).unwrap();
        assert_eq!(request.mechanism_preferences.len(), 1);
    }
}
