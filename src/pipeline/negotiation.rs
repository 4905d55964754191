// src/pipeline/negotiation.rs
//! Client-side negotiation stage
//!
//! Asks the delegate which mechanisms to offer, forwards the request to the
//! next hop, then tells the delegate what came back together with the
//! caller's original preferences.
//!
//! # Failure policy
//!
//! Availability wins over delegate consistency:
//!
//! - `mechanism` failure: logged and recorded, the request goes out with
//!   the preferences it already had
//! - `request` / `close` failure: logged and recorded, never replaces the
//!   downstream outcome
//! - downstream failure: always returned to the caller
//! - cancellation: ends the request with `Cancelled`; nothing further is
//!   forwarded or reported to the delegate
//!
//! Recorded failures land in the request's `Diagnostics` and in metrics.

use crate::delegate::{Delegate, Verb};
use crate::model::{Connection, ConnectionRequest};
use crate::pipeline::chain::{Next, Stage};
use crate::pipeline::context::{MechanismPreferences, RequestContext};
use crate::utils::errors::{ForwarderError, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Negotiates mechanisms through the delegate
pub struct NegotiationStage {
    delegate: Arc<dyn Delegate>,

    /// Serialises the `request` and `close` delegate calls
    mutation_lock: Mutex<()>,
}

impl NegotiationStage {
    pub fn new(delegate: Arc<dyn Delegate>) -> Self {
        Self {
            delegate,
            mutation_lock: Mutex::new(()),
        }
    }
}

#[async_trait]
impl Stage for NegotiationStage {
    fn name(&self) -> &'static str {
        "negotiation"
    }

    async fn request(
        &self,
        ctx: RequestContext,
        mut request: ConnectionRequest,
        next: Next<'_>,
    ) -> Result<Connection> {
        match self.delegate.mechanisms(ctx.cancellation()).await {
            Ok(mechanisms) => {
                debug!("Delegate offered {} mechanism(s)", mechanisms.len());
                request.mechanism_preferences = mechanisms;
            }
            Err(e @ ForwarderError::Cancelled { .. }) => return Err(e),
            Err(e) => {
                warn!("Mechanism callout failed, keeping caller preferences: {}", e);
                ctx.diagnostics().record(e);
            }
        }
        if ctx.is_cancelled() {
            return Err(ForwarderError::Cancelled {
                verb: Verb::Mechanism,
            });
        }

        let result = next.request(ctx.clone(), request).await;
        if ctx.is_cancelled() {
            debug!("Request cancelled, skipping request callout");
            return Err(ForwarderError::Cancelled {
                verb: Verb::Request,
            });
        }

        let original = ctx
            .value::<MechanismPreferences>()
            .cloned()
            .unwrap_or_default();
        let record = ConnectionRequest::new(result.as_ref().ok().cloned(), original);

        let reported = {
            let _guard = self.mutation_lock.lock().await;
            self.delegate.request(&record, ctx.cancellation()).await
        };
        if let Err(e) = reported {
            warn!("Request callout failed: {}", e);
            ctx.diagnostics().record(e);
        }

        result
    }

    async fn close(&self, ctx: RequestContext, conn: Connection, next: Next<'_>) -> Result<()> {
        let reported = {
            let _guard = self.mutation_lock.lock().await;
            self.delegate.close(&conn, ctx.cancellation()).await
        };
        if let Err(e) = reported {
            warn!(connection = %conn.id, "Close callout failed: {}", e);
            ctx.diagnostics().record(e);
        }

        next.close(ctx, conn).await
    }
}
