//! Read coordinator: fans one read out to a shard's replicas
//!
//! The coordinator launches one task per resolved replica host. The first
//! host performs the full read, every other host a digest read. Every task
//! sends exactly one [`SenderReply`], so the reader sees one reply per host
//! in arrival order and decides when it has heard enough.

use crate::common::{with_deadline, Result};
use crate::replica::reply::SenderReply;
use crate::replica::resolver::{resolve_state, ReadState, Resolver};
use crate::replica::types::ConsistencyLevel;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Operation run against one host; the flag requests a full read.
pub type ReadOp<T> = Arc<dyn Fn(String, bool) -> BoxFuture<'static, Result<T>> + Send + Sync>;

/// Box a closure into a [`ReadOp`].
pub fn read_op<T, F, Fut>(f: F) -> ReadOp<T>
where
    F: Fn(String, bool) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T>> + Send + 'static,
{
    Arc::new(move |host, full| f(host, full).boxed())
}

pub struct ReadCoordinator<'a> {
    resolver: &'a dyn Resolver,
    class: &'a str,
    shard: &'a str,
    local_node: &'a str,
    timeout: Duration,
}

impl<'a> ReadCoordinator<'a> {
    pub fn new(
        resolver: &'a dyn Resolver,
        class: &'a str,
        shard: &'a str,
        local_node: &'a str,
        timeout: Duration,
    ) -> Self {
        Self {
            resolver,
            class,
            shard,
            local_node,
            timeout,
        }
    }

    /// Resolve replicas and launch the reads.
    ///
    /// `direct` pins the full read to a node. Fails before any RPC if too few
    /// replicas resolve. Must be called within a tokio runtime.
    pub fn pull<T: Send + 'static>(
        &self,
        ctx: &CancellationToken,
        level: ConsistencyLevel,
        op: ReadOp<T>,
        direct: Option<&str>,
    ) -> Result<(mpsc::Receiver<SenderReply<T>>, ReadState)> {
        let state = resolve_state(
            self.resolver,
            self.class,
            self.shard,
            level,
            direct,
            self.local_node,
        )?;

        let (tx, rx) = mpsc::channel(state.hosts.len());
        let token = ctx.child_token();

        tracing::debug!(
            op = "pull",
            class = self.class,
            shard = self.shard,
            level = %level,
            hosts = ?state.hosts,
            "dispatching replica reads"
        );

        for (idx, host) in state.hosts.iter().cloned().enumerate() {
            let op = Arc::clone(&op);
            let tx = tx.clone();
            let token = token.clone();
            let timeout = self.timeout;

            tokio::spawn(async move {
                let result = with_deadline(&token, timeout, &host, op(host.clone(), idx == 0)).await;
                // The reader may have given up already.
                let _ = tx.send(SenderReply { sender: host, result }).await;
            });
        }

        Ok((rx, state))
    }
}
