// src/pipeline/chain.rs
//! Ordered chain of request/close stages
//!
//! A stage receives the request together with `Next`, the rest of the
//! chain. It may transform the request, call `next`, and transform the
//! reply; not calling `next` short-circuits. Order is fixed when the chain
//! is built and the last hop is a `Downstream`.

use crate::model::{Connection, ConnectionRequest};
use crate::pipeline::context::RequestContext;
use crate::utils::errors::Result;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

/// Whatever sits after the chain: the remote hop, or another chain
#[async_trait]
pub trait Downstream: Send + Sync {
    async fn request(&self, ctx: &RequestContext, request: ConnectionRequest)
        -> Result<Connection>;

    async fn close(&self, ctx: &RequestContext, conn: Connection) -> Result<()>;
}

/// One unit of the chain
#[async_trait]
pub trait Stage: Send + Sync {
    /// Name used in log lines
    fn name(&self) -> &'static str;

    async fn request(
        &self,
        ctx: RequestContext,
        request: ConnectionRequest,
        next: Next<'_>,
    ) -> Result<Connection>;

    async fn close(&self, ctx: RequestContext, conn: Connection, next: Next<'_>) -> Result<()>;
}

/// The remainder of a chain, from the point of view of one stage
#[derive(Clone, Copy)]
pub struct Next<'a> {
    stages: &'a [Arc<dyn Stage>],
    terminal: &'a dyn Downstream,
}

impl<'a> Next<'a> {
    pub async fn request(self, ctx: RequestContext, request: ConnectionRequest) -> Result<Connection> {
        match self.stages.split_first() {
            Some((stage, rest)) => stage.request(ctx, request, self.advance(rest)).await,
            None => self.terminal.request(&ctx, request).await,
        }
    }

    pub async fn close(self, ctx: RequestContext, conn: Connection) -> Result<()> {
        match self.stages.split_first() {
            Some((stage, rest)) => stage.close(ctx, conn, self.advance(rest)).await,
            None => self.terminal.close(&ctx, conn).await,
        }
    }

    fn advance(self, rest: &'a [Arc<dyn Stage>]) -> Next<'a> {
        Next {
            stages: rest,
            terminal: self.terminal,
        }
    }
}

impl fmt::Debug for Next<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.stages.iter().map(|stage| stage.name()).collect();
        f.debug_struct("Next").field("stages", &names).finish()
    }
}

/// Builds a `Chain`; stages run in the order they were added
#[derive(Default)]
pub struct ChainBuilder {
    stages: Vec<Arc<dyn Stage>>,
}

impl ChainBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stage(mut self, stage: impl Stage + 'static) -> Self {
        self.stages.push(Arc::new(stage));
        self
    }

    pub fn build(self, terminal: Arc<dyn Downstream>) -> Chain {
        Chain {
            stages: self.stages,
            terminal,
        }
    }
}

/// An immutable, ordered chain of stages
#[derive(Clone)]
pub struct Chain {
    stages: Vec<Arc<dyn Stage>>,
    terminal: Arc<dyn Downstream>,
}

impl Chain {
    pub fn builder() -> ChainBuilder {
        ChainBuilder::new()
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|stage| stage.name()).collect()
    }

    fn head(&self) -> Next<'_> {
        Next {
            stages: &self.stages,
            terminal: self.terminal.as_ref(),
        }
    }
}

impl fmt::Debug for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chain")
            .field("stages", &self.stage_names())
            .finish()
    }
}

#[async_trait]
impl Downstream for Chain {
    async fn request(
        &self,
        ctx: &RequestContext,
        request: ConnectionRequest,
    ) -> Result<Connection> {
        self.head().request(ctx.clone(), request).await
    }

    async fn close(&self, ctx: &RequestContext, conn: Connection) -> Result<()> {
        self.head().close(ctx.clone(), conn).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Mechanism;
    use crate::utils::errors::ForwarderError;
    use parking_lot::Mutex;

    /// Appends "<name>:in" / "<name>:out" to a shared log
    struct Tracer {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Stage for Tracer {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn request(
            &self,
            ctx: RequestContext,
            request: ConnectionRequest,
            next: Next<'_>,
        ) -> Result<Connection> {
            self.log.lock().push(format!("{}:in", self.name));
            let result = next.request(ctx, request).await;
            self.log.lock().push(format!("{}:out", self.name));
            result
        }

        async fn close(&self, ctx: RequestContext, conn: Connection, next: Next<'_>) -> Result<()> {
            self.log.lock().push(format!("{}:close", self.name));
            next.close(ctx, conn).await
        }
    }

    /// Answers without calling the rest of the chain
    struct Refuse;

    #[async_trait]
    impl Stage for Refuse {
        fn name(&self) -> &'static str {
            "refuse"
        }

        async fn request(
            &self,
            _ctx: RequestContext,
            _request: ConnectionRequest,
            _next: Next<'_>,
        ) -> Result<Connection> {
            Err(ForwarderError::DownstreamFailure("refused".into()))
        }

        async fn close(&self, _ctx: RequestContext, _conn: Connection, _next: Next<'_>) -> Result<()> {
            Ok(())
        }
    }

    struct Terminal {
        log: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Downstream for Terminal {
        async fn request(
            &self,
            _ctx: &RequestContext,
            request: ConnectionRequest,
        ) -> Result<Connection> {
            self.log.lock().push("terminal".to_string());
            let mut conn = Connection::new("t-1");
            conn.mechanism = request.mechanism_preferences.into_iter().next();
            Ok(conn)
        }

        async fn close(&self, _ctx: &RequestContext, _conn: Connection) -> Result<()> {
            self.log.lock().push("terminal:close".to_string());
            Ok(())
        }
    }

    fn tracer(name: &'static str, log: &Arc<Mutex<Vec<String>>>) -> Tracer {
        Tracer {
            name,
            log: Arc::clone(log),
        }
    }

    #[tokio::test]
    async fn test_stages_run_in_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain = Chain::builder()
            .stage(tracer("a", &log))
            .stage(tracer("b", &log))
            .build(Arc::new(Terminal { log: Arc::clone(&log) }));

        let request = ConnectionRequest::new(None, vec![Mechanism::local("kernel")]);
        let conn = chain.request(&RequestContext::new(), request).await.unwrap();

        assert_eq!(conn.mechanism, Some(Mechanism::local("kernel")));
        assert_eq!(*log.lock(), vec!["a:in", "b:in", "terminal", "b:out", "a:out"]);
    }

    #[tokio::test]
    async fn test_close_runs_in_same_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain = Chain::builder()
            .stage(tracer("a", &log))
            .stage(tracer("b", &log))
            .build(Arc::new(Terminal { log: Arc::clone(&log) }));

        chain.close(&RequestContext::new(), Connection::new("c")).await.unwrap();
        assert_eq!(*log.lock(), vec!["a:close", "b:close", "terminal:close"]);
    }

    #[tokio::test]
    async fn test_short_circuit() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain = Chain::builder()
            .stage(tracer("a", &log))
            .stage(Refuse)
            .stage(tracer("never", &log))
            .build(Arc::new(Terminal { log: Arc::clone(&log) }));

        let result = chain
            .request(&RequestContext::new(), ConnectionRequest::default())
            .await;
        assert!(matches!(result, Err(ForwarderError::DownstreamFailure(_))));
        assert_eq!(*log.lock(), vec!["a:in", "a:out"]);
    }

    #[tokio::test]
    async fn test_nested_chain_as_downstream() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let inner = Chain::builder()
            .stage(tracer("inner", &log))
            .build(Arc::new(Terminal { log: Arc::clone(&log) }));
        let outer = Chain::builder()
            .stage(tracer("outer", &log))
            .build(Arc::new(inner));

        outer
            .request(&RequestContext::new(), ConnectionRequest::default())
            .await
            .unwrap();
        assert_eq!(
            *log.lock(),
            vec!["outer:in", "inner:in", "terminal", "inner:out", "outer:out"]
        );
        assert_eq!(outer.stage_names(), vec!["outer"]);
    }
}
