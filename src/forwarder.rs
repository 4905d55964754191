// src/forwarder.rs
//! Forwarder assembly and startup policy
//!
//! `Forwarder::start` is the only way to get a running pipeline. It runs
//! the delegate `init` verb first and refuses to continue if that fails:
//! a node that cannot prepare its data plane must not accept connections.
//! After startup every other delegate failure is non-fatal (see
//! `NegotiationStage`).
//!
//! Contexts handed out by `Forwarder::context` are tied to the forwarder's
//! shutdown token, so `shutdown` cancels every request still in flight.

use crate::delegate::{Delegate, DelegateGateway};
use crate::model::{Connection, ConnectionRequest};
use crate::observability;
use crate::pipeline::{
    AddressAugmentationStage, Chain, Downstream, NegotiationStage, RequestContext,
};
use crate::utils::config::ForwarderConfig;
use crate::utils::errors::Result;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// The assembled request/close pipeline of one forwarder
pub struct Forwarder {
    config: ForwarderConfig,
    chain: Chain,
    shutdown: CancellationToken,
}

impl Forwarder {
    /// Initialise the delegate configured in `config` and build the chain
    /// in front of `downstream`
    pub async fn start(config: ForwarderConfig, downstream: Arc<dyn Downstream>) -> Result<Self> {
        let delegate = Arc::new(DelegateGateway::from_config(&config.delegate));
        Self::start_with_delegate(config, delegate, downstream).await
    }

    /// Like `start`, with an explicit delegate
    pub async fn start_with_delegate(
        config: ForwarderConfig,
        delegate: Arc<dyn Delegate>,
        downstream: Arc<dyn Downstream>,
    ) -> Result<Self> {
        let shutdown = CancellationToken::new();

        info!("Initialising delegate");
        if let Err(e) = delegate.init(&shutdown).await {
            error!("Delegate init failed, refusing to start: {}", e);
            observability::record_delegate_failure(&e);
            return Err(e);
        }

        if config.node.pod_ip.is_empty() {
            warn!("No pod address configured, remote mechanisms will carry an empty dst_ip");
        }

        let chain = build_chain(&config.node.pod_ip, delegate, downstream);
        info!(stages = ?chain.stage_names(), "Pipeline ready");

        Ok(Self {
            config,
            chain,
            shutdown,
        })
    }

    /// Fresh request context, cancelled when the forwarder shuts down
    pub fn context(&self) -> RequestContext {
        RequestContext::with_cancellation(self.shutdown.child_token())
    }

    /// Cancel every outstanding request and delegate call
    pub fn shutdown(&self) {
        info!("Cancelling in-flight requests");
        self.shutdown.cancel();
    }

    pub async fn request(&self, ctx: RequestContext, request: ConnectionRequest) -> Result<Connection> {
        self.chain.request(&ctx, request).await
    }

    pub async fn close(&self, ctx: RequestContext, conn: Connection) -> Result<()> {
        self.chain.close(&ctx, conn).await
    }

    pub fn config(&self) -> &ForwarderConfig {
        &self.config
    }

    pub fn chain(&self) -> &Chain {
        &self.chain
    }
}

/// Server chain around a client chain
///
/// ```text
/// server: augmentation(endpoint) → augmentation(mechanism) → client
/// client: negotiation → downstream
/// ```
pub fn build_chain(
    node_address: &str,
    delegate: Arc<dyn Delegate>,
    downstream: Arc<dyn Downstream>,
) -> Chain {
    let client = Chain::builder()
        .stage(NegotiationStage::new(delegate))
        .build(downstream);

    Chain::builder()
        .stage(AddressAugmentationStage::endpoint())
        .stage(AddressAugmentationStage::mechanism(node_address))
        .build(Arc::new(client))
}
