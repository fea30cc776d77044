//! Finder: consistent reads over a replicated class
//!
//! The finder is the entry point of the read path. Each operation resolves the
//! shard's replicas, fans the read out through a [`ReadCoordinator`], and lets
//! the [`FinderStream`] settle the replies, repairing stale replicas on the way.

use crate::common::{with_deadline, Config, Error, ReadFailure, Result};
use crate::replica::batch::{cluster, create_batch, BatchPart};
use crate::replica::client::ReplicaClient;
use crate::replica::coordinator::{read_op, ReadCoordinator};
use crate::replica::repairer::{RepairSnapshot, Repairer};
use crate::replica::reply::{BatchReply, ExistReply, FindOneReply};
use crate::replica::resolver::{Resolver, StaticResolver};
use crate::replica::stream::FinderStream;
use crate::replica::types::{
    AdditionalProperties, ConsistencyLevel, Object, Replica, SelectProperties, Stamped,
};
use futures_util::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_REPAIR_TIMEOUT: Duration = Duration::from_secs(30);

/// Outcome of one entry of a batch read. `Ok(None)` means the object does
/// not exist (or was deleted) on the agreed replicas.
pub type BatchItem = std::result::Result<Option<Object>, ReadFailure>;

/// Per-object verdicts of [`Finder::check_consistency`], aligned with the
/// checked slice.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConsistencyReport {
    verdicts: Vec<bool>,
}

impl ConsistencyReport {
    pub fn is_consistent(&self, index: usize) -> bool {
        self.verdicts.get(index).copied().unwrap_or(false)
    }

    pub fn verdicts(&self) -> &[bool] {
        &self.verdicts
    }

    pub fn all_consistent(&self) -> bool {
        self.verdicts.iter().all(|ok| *ok)
    }

    pub fn len(&self) -> usize {
        self.verdicts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.verdicts.is_empty()
    }

    /// Indices of objects found inconsistent
    pub fn inconsistent(&self) -> impl Iterator<Item = usize> + '_ {
        self.verdicts
            .iter()
            .enumerate()
            .filter(|(_, ok)| !**ok)
            .map(|(i, _)| i)
    }
}

/// Reads objects of one class at a requested consistency level.
pub struct Finder {
    class: String,
    local_node: String,
    resolver: Arc<dyn Resolver>,
    client: Arc<dyn ReplicaClient>,
    stream: FinderStream,
    read_timeout: Duration,
}

impl Finder {
    pub fn new(
        class: impl Into<String>,
        local_node: impl Into<String>,
        resolver: Arc<dyn Resolver>,
        client: Arc<dyn ReplicaClient>,
    ) -> Self {
        let class = class.into();
        let repairer = Repairer::new(
            class.clone(),
            Arc::clone(&client),
            DEFAULT_READ_TIMEOUT,
            DEFAULT_REPAIR_TIMEOUT,
        );
        Self {
            class,
            local_node: local_node.into(),
            resolver,
            client,
            stream: FinderStream { repairer },
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }

    /// Override the per-RPC read deadline and the background repair deadline.
    pub fn with_timeouts(mut self, read: Duration, repair: Duration) -> Self {
        self.read_timeout = read;
        self.stream.repairer.read_timeout = read;
        self.stream.repairer.repair_timeout = repair;
        self
    }

    /// Build a finder over a [`StaticResolver`] described by `config`.
    pub fn from_config(config: &Config, client: Arc<dyn ReplicaClient>) -> Result<Self> {
        config.validate()?;
        let resolver = Arc::new(StaticResolver::from_config(config));
        Ok(
            Self::new(config.class.clone(), config.node_name.clone(), resolver, client)
                .with_timeouts(config.read_timeout(), config.repair_timeout()),
        )
    }

    pub fn class(&self) -> &str {
        &self.class
    }

    pub fn repair_stats(&self) -> RepairSnapshot {
        self.stream.repairer.stats()
    }

    /// Wait for every repair scheduled so far.
    pub async fn wait_for_repairs(&self) {
        self.stream.repairer.wait().await
    }

    /// Stop accepting repairs and wait for the pending ones.
    pub async fn shutdown(&self) {
        self.stream.repairer.shutdown().await
    }

    fn coordinator<'a>(&'a self, shard: &'a str) -> ReadCoordinator<'a> {
        ReadCoordinator::new(
            self.resolver.as_ref(),
            &self.class,
            shard,
            &self.local_node,
            self.read_timeout,
        )
    }

    /// Read one object at `level`.
    pub async fn get_one(
        &self,
        ctx: &CancellationToken,
        level: ConsistencyLevel,
        shard: &str,
        id: Uuid,
        props: &SelectProperties,
        adds: &AdditionalProperties,
    ) -> Result<Option<Object>> {
        let client = Arc::clone(&self.client);
        let class = self.class.clone();
        let shard_name = shard.to_string();
        let props = props.clone();
        let adds = adds.clone();

        let op = read_op(move |host: String, full: bool| {
            let client = Arc::clone(&client);
            let (class, shard, props, adds) =
                (class.clone(), shard_name.clone(), props.clone(), adds.clone());
            async move {
                if full {
                    let replica = client
                        .full_read(&host, &class, &shard, id, &props, &adds)
                        .await?;
                    return Ok::<_, Error>(FindOneReply::full(replica));
                }
                let digests = client.digest_reads(&host, &class, &shard, &[id]).await?;
                let digest = digests
                    .first()
                    .ok_or_else(|| Error::Internal(format!("empty digest from {}", host)))?;
                Ok(FindOneReply::digest(id, digest))
            }
        });

        let (rx, state) = self.coordinator(shard).pull(ctx, level, op, None).map_err(|e| {
            tracing::error!(op = "pull.one", class = %self.class, shard, %id, error = %e, "cannot dispatch read");
            Error::consistency(level, ReadFailure::Replicas)
        })?;

        self.stream
            .read_one(ctx, shard, id, rx, state)
            .await
            .map(Replica::into_object)
            .map_err(|cause| Error::consistency(level, cause))
    }

    /// Read several objects of one shard at `level`. The result is aligned
    /// with `ids`; a failure to settle one object does not fail the others.
    pub async fn get_all(
        &self,
        ctx: &CancellationToken,
        level: ConsistencyLevel,
        shard: &str,
        ids: &[Uuid],
    ) -> Result<Vec<BatchItem>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let client = Arc::clone(&self.client);
        let class = self.class.clone();
        let shard_name = shard.to_string();
        let wanted: Arc<[Uuid]> = ids.into();

        let op = read_op(move |host: String, full: bool| {
            let client = Arc::clone(&client);
            let (class, shard, wanted) = (class.clone(), shard_name.clone(), Arc::clone(&wanted));
            async move {
                if full {
                    let replicas = client.full_reads(&host, &class, &shard, &wanted).await?;
                    Ok::<_, Error>(BatchReply::Full(replicas))
                } else {
                    let digests = client.digest_reads(&host, &class, &shard, &wanted).await?;
                    Ok(BatchReply::Digest(digests))
                }
            }
        });

        let (rx, state) = self.coordinator(shard).pull(ctx, level, op, None).map_err(|e| {
            tracing::error!(op = "pull.all", class = %self.class, shard, error = %e, "cannot dispatch read");
            Error::consistency(level, ReadFailure::Replicas)
        })?;

        let results = self
            .stream
            .read_batch(ctx, "get_all", shard, ids, rx, state)
            .await
            .map_err(|cause| Error::consistency(level, cause))?;

        Ok(results
            .into_iter()
            .map(|res| res.map(Replica::into_object))
            .collect())
    }

    /// Whether an object exists at `level`. Only digests travel.
    pub async fn exists(
        &self,
        ctx: &CancellationToken,
        level: ConsistencyLevel,
        shard: &str,
        id: Uuid,
    ) -> Result<bool> {
        let client = Arc::clone(&self.client);
        let class = self.class.clone();
        let shard_name = shard.to_string();

        let op = read_op(move |host: String, _full: bool| {
            let client = Arc::clone(&client);
            let (class, shard) = (class.clone(), shard_name.clone());
            async move {
                let mut digests = client.digest_reads(&host, &class, &shard, &[id]).await?;
                if digests.is_empty() {
                    return Err(Error::Internal(format!("empty digest from {}", host)));
                }
                Ok::<ExistReply, Error>(digests.swap_remove(0))
            }
        });

        let (rx, state) = self.coordinator(shard).pull(ctx, level, op, None).map_err(|e| {
            tracing::error!(op = "pull.exist", class = %self.class, shard, %id, error = %e, "cannot dispatch read");
            Error::consistency(level, ReadFailure::Replicas)
        })?;

        self.stream
            .read_existence(shard, id, rx, state)
            .await
            .map_err(|cause| Error::consistency(level, cause))
    }

    /// Read an object from one specific node, without coordination.
    pub async fn node_object(
        &self,
        ctx: &CancellationToken,
        node: &str,
        shard: &str,
        id: Uuid,
        props: &SelectProperties,
        adds: &AdditionalProperties,
    ) -> Result<Option<Object>> {
        let host = self
            .resolver
            .node_hostname(node)
            .ok_or_else(|| Error::UnresolvedNode(node.to_string()))?;

        let replica = with_deadline(
            ctx,
            self.read_timeout,
            &host,
            self.client
                .full_read(&host, &self.class, shard, id, props, adds),
        )
        .await?;
        Ok(replica.into_object())
    }

    /// Check whether the caller's copies of `objects` match the replicas at
    /// `level`, repairing stale replicas as a side effect.
    ///
    /// Every entry must be present and name its shard and node. Shards are
    /// checked concurrently; a shard that cannot be checked leaves its
    /// objects marked inconsistent.
    pub async fn check_consistency(
        &self,
        ctx: &CancellationToken,
        level: ConsistencyLevel,
        objects: &[Option<Object>],
    ) -> Result<ConsistencyReport> {
        for (i, object) in objects.iter().enumerate() {
            let Some(object) = object else {
                return Err(Error::NilObject(i));
            };
            if object.belongs_to_shard.is_empty() || object.belongs_to_node.is_empty() {
                return Err(Error::MissingShardOrNode(i));
            }
        }

        if level == ConsistencyLevel::One {
            return Ok(ConsistencyReport {
                verdicts: vec![true; objects.len()],
            });
        }

        let batch = create_batch(objects.iter().flatten());
        let mut parts = cluster(&batch);

        let checks = parts
            .iter_mut()
            .map(|part| async move {
                if let Err(e) = self.check_shard_consistency(ctx, level, part).await {
                    tracing::error!(
                        op = "check_shard_consistency",
                        class = %self.class,
                        shard = %part.shard,
                        node = %part.node,
                        error = %e,
                        "cannot check shard consistency"
                    );
                }
            });
        join_all(checks).await;

        let mut verdicts = vec![false; objects.len()];
        for part in &parts {
            for &i in &part.index {
                verdicts[i] = part.oks[i];
            }
        }
        Ok(ConsistencyReport { verdicts })
    }

    /// Check one shard's objects. The caller's copies stand in for the full
    /// read whenever it lands on their owner node.
    async fn check_shard_consistency(
        &self,
        ctx: &CancellationToken,
        level: ConsistencyLevel,
        part: &mut BatchPart<'_>,
    ) -> Result<()> {
        let (held, ids) = part.extract();
        let owner = self.resolver.node_hostname(&part.node);

        let client = Arc::clone(&self.client);
        let class = self.class.clone();
        let shard_name = part.shard.clone();
        let held_reply: Arc<Vec<Replica>> = Arc::new(held.clone());
        let wanted: Arc<[Uuid]> = ids.as_slice().into();

        let op = read_op(move |host: String, full: bool| {
            let client = Arc::clone(&client);
            let (class, shard) = (class.clone(), shard_name.clone());
            let (held, wanted) = (Arc::clone(&held_reply), Arc::clone(&wanted));
            let from_owner = owner.as_deref() == Some(host.as_str());
            async move {
                if full && from_owner {
                    Ok::<_, Error>(BatchReply::Full(held.as_ref().clone()))
                } else if full {
                    let replicas = client.full_reads(&host, &class, &shard, &wanted).await?;
                    Ok(BatchReply::Full(replicas))
                } else {
                    let digests = client.digest_reads(&host, &class, &shard, &wanted).await?;
                    Ok(BatchReply::Digest(digests))
                }
            }
        });

        let (rx, state) = self
            .coordinator(&part.shard)
            .pull(ctx, level, op, Some(part.node.as_str()))
            .map_err(|e| {
                tracing::error!(op = "pull.check", class = %self.class, shard = %part.shard, error = %e, "cannot dispatch read");
                Error::consistency(level, ReadFailure::Replicas)
            })?;

        let results = self
            .stream
            .read_batch(ctx, "check_consistency", &part.shard, &ids, rx, state)
            .await
            .map_err(|cause| Error::consistency(level, cause))?;

        for ((&i, res), mine) in part.index.iter().zip(results).zip(&held) {
            part.oks[i] = matches!(res, Ok(canonical) if canonical.stamp() == mine.stamp());
        }
        Ok(())
    }
}
