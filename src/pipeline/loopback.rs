// src/pipeline/loopback.rs
//! Loopback endpoint
//!
//! A `Downstream` that answers locally: it accepts the first mechanism it
//! is offered and echoes the connection back. Used where no remote hop is
//! wired in.

use crate::model::{Connection, ConnectionRequest};
use crate::pipeline::chain::Downstream;
use crate::pipeline::context::RequestContext;
use crate::utils::errors::Result;
use async_trait::async_trait;
use tracing::debug;
use ulid::Ulid;

#[derive(Debug, Clone, Default)]
pub struct LoopbackEndpoint {
    network_service: String,
}

impl LoopbackEndpoint {
    pub fn new(network_service: impl Into<String>) -> Self {
        Self {
            network_service: network_service.into(),
        }
    }
}

#[async_trait]
impl Downstream for LoopbackEndpoint {
    async fn request(&self, _ctx: &RequestContext, request: ConnectionRequest) -> Result<Connection> {
        let mut conn = request
            .connection
            .unwrap_or_else(|| Connection::new(Ulid::new().to_string()));

        if conn.network_service.is_empty() {
            conn.network_service = self.network_service.clone();
        }
        if conn.mechanism.is_none() {
            conn.mechanism = request.mechanism_preferences.into_iter().next();
        }

        debug!(connection = %conn.id, mechanism = ?conn.mechanism, "Loopback accepted");
        Ok(conn)
    }

    async fn close(&self, _ctx: &RequestContext, conn: Connection) -> Result<()> {
        debug!(connection = %conn.id, "Loopback closed");
        Ok(())
    }
}
