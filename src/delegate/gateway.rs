// src/delegate/gateway.rs
//! Delegate gateway
//!
//! `Delegate` is the seam the pipeline talks to. `DelegateGateway` is the
//! production implementation: it runs `<program> <verb>` once per call and
//! keeps no state between calls. The gateway never retries; callers decide
//! what a failure means.

use crate::delegate::process::{self, Invocation};
use crate::delegate::protocol::{self, DelegateOutput, Verb};
use crate::model::{Connection, ConnectionRequest, Mechanism};
use crate::observability;
use crate::utils::config::DelegateConfig;
use crate::utils::errors::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// The external decision program, one call per verb
#[async_trait]
pub trait Delegate: Send + Sync {
    /// Run `verb` with an optional stdin payload
    async fn invoke(
        &self,
        verb: Verb,
        payload: Option<Vec<u8>>,
        cancel: &CancellationToken,
    ) -> Result<DelegateOutput>;

    /// Prepare the data plane; a failure here must stop startup
    async fn init(&self, cancel: &CancellationToken) -> Result<()> {
        let output = self.invoke(Verb::Init, None, cancel).await?;
        log_output(Verb::Init, &output);
        Ok(())
    }

    /// Candidate mechanisms, in preference order
    async fn mechanisms(&self, cancel: &CancellationToken) -> Result<Vec<Mechanism>> {
        let output = self.invoke(Verb::Mechanism, None, cancel).await?;
        log_output(Verb::Mechanism, &output);
        protocol::decode_mechanisms(&output.stdout)
    }

    /// Report a negotiated connection together with the caller's preferences
    async fn request(&self, record: &ConnectionRequest, cancel: &CancellationToken) -> Result<()> {
        let payload = protocol::encode_payload(Verb::Request, record)?;
        let output = self.invoke(Verb::Request, Some(payload), cancel).await?;
        log_output(Verb::Request, &output);
        Ok(())
    }

    /// Report a connection being torn down
    async fn close(&self, conn: &Connection, cancel: &CancellationToken) -> Result<()> {
        let payload = protocol::encode_payload(Verb::Close, conn)?;
        let output = self.invoke(Verb::Close, Some(payload), cancel).await?;
        log_output(Verb::Close, &output);
        Ok(())
    }
}

fn log_output(verb: Verb, output: &DelegateOutput) {
    let text = output.combined();
    if !text.is_empty() {
        info!(verb = %verb, "Delegate output:\n{}", text);
    }
}

/// Runs the delegate program as a subprocess
#[derive(Debug, Clone)]
pub struct DelegateGateway {
    program: PathBuf,
    timeout: Duration,
    kill_grace: Duration,
}

impl DelegateGateway {
    /// Gateway for `program` with default timeouts
    pub fn new(program: impl Into<PathBuf>) -> Self {
        let defaults = DelegateConfig::default();
        Self {
            program: program.into(),
            timeout: defaults.timeout(),
            kill_grace: defaults.kill_grace(),
        }
    }

    pub fn from_config(config: &DelegateConfig) -> Self {
        Self {
            program: config.program.clone(),
            timeout: config.timeout(),
            kill_grace: config.kill_grace(),
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }
}

#[async_trait]
impl Delegate for DelegateGateway {
    async fn invoke(
        &self,
        verb: Verb,
        payload: Option<Vec<u8>>,
        cancel: &CancellationToken,
    ) -> Result<DelegateOutput> {
        info!(verb = %verb, program = %self.program.display(), "Calling delegate");

        let started = Instant::now();
        let result = process::run(
            Invocation {
                program: self.program.clone(),
                verb,
                payload,
                timeout: self.timeout,
                kill_grace: self.kill_grace,
            },
            cancel,
        )
        .await;

        let elapsed = started.elapsed();
        observability::record_delegate_call(verb, elapsed);
        debug!(verb = %verb, ?elapsed, ok = result.is_ok(), "Delegate returned");

        result
    }
}
