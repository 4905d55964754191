// src/pipeline/augmentation.rs
//! Server-side address augmentation stage
//!
//! Two instances of this stage sit in the server chain, each with its own
//! role:
//!
//! - **Endpoint**: chain entry; captures the caller's mechanism preferences
//!   in the side channel before anything downstream can rewrite them
//! - **Mechanism**: stamps this node's address into the negotiated
//!   mechanism on the way back, so the remote peer knows where to send

use crate::model::{Connection, ConnectionRequest, Mechanism};
use crate::observability;
use crate::pipeline::chain::{Next, Stage};
use crate::pipeline::context::{MechanismPreferences, RequestContext};
use crate::utils::errors::Result;
use async_trait::async_trait;
use tracing::{debug, info};

/// Position of an augmentation stage in the chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AugmentationRole {
    Endpoint,
    Mechanism { node_address: String },
}

impl AugmentationRole {
    pub fn label(&self) -> &'static str {
        match self {
            AugmentationRole::Endpoint => "endpoint",
            AugmentationRole::Mechanism { .. } => "mechanism",
        }
    }
}

/// What `augment` did to a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Augmentation {
    /// REMOTE mechanism got `dst_ip`
    SetDstIp,
    /// No mechanism came back; a REMOTE kernel one was created
    Synthesized,
    /// LOCAL mechanism, left alone
    Unchanged,
}

impl Augmentation {
    pub fn as_str(self) -> &'static str {
        match self {
            Augmentation::SetDstIp => "set_dst_ip",
            Augmentation::Synthesized => "synthesized",
            Augmentation::Unchanged => "unchanged",
        }
    }
}

/// Stamp `node_address` into the connection's mechanism
pub fn augment(conn: &mut Connection, node_address: &str) -> Augmentation {
    match conn.mechanism.as_mut() {
        Some(mechanism) if mechanism.is_remote() => {
            mechanism.set_dst_ip(node_address);
            Augmentation::SetDstIp
        }
        Some(_) => Augmentation::Unchanged,
        None => {
            debug!(connection = %conn.id, "No mechanism negotiated, synthesising remote kernel");
            conn.mechanism = Some(Mechanism::kernel_remote(node_address));
            Augmentation::Synthesized
        }
    }
}

/// Address augmentation stage
#[derive(Debug, Clone)]
pub struct AddressAugmentationStage {
    role: AugmentationRole,
}

impl AddressAugmentationStage {
    /// Chain-entry instance
    pub fn endpoint() -> Self {
        Self {
            role: AugmentationRole::Endpoint,
        }
    }

    /// Mechanism-owning instance stamping `node_address` as `dst_ip`
    pub fn mechanism(node_address: impl Into<String>) -> Self {
        Self {
            role: AugmentationRole::Mechanism {
                node_address: node_address.into(),
            },
        }
    }

    pub fn role(&self) -> &AugmentationRole {
        &self.role
    }
}

#[async_trait]
impl Stage for AddressAugmentationStage {
    fn name(&self) -> &'static str {
        match self.role {
            AugmentationRole::Endpoint => "augmentation(endpoint)",
            AugmentationRole::Mechanism { .. } => "augmentation(mechanism)",
        }
    }

    async fn request(
        &self,
        ctx: RequestContext,
        request: ConnectionRequest,
        next: Next<'_>,
    ) -> Result<Connection> {
        let ctx = match self.role {
            AugmentationRole::Endpoint if !request.mechanism_preferences.is_empty() => {
                ctx.with_value::<MechanismPreferences>(request.mechanism_preferences.clone())
            }
            _ => ctx,
        };

        let mut conn = next.request(ctx, request).await?;

        if let AugmentationRole::Mechanism { node_address } = &self.role {
            let action = augment(&mut conn, node_address);
            observability::record_augmentation(action.as_str());
        }

        Ok(conn)
    }

    async fn close(&self, ctx: RequestContext, conn: Connection, next: Next<'_>) -> Result<()> {
        info!(role = self.role.label(), connection = %conn.id, "Close");
        next.close(ctx, conn).await
    }
}
