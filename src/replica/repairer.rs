//! Conflict resolution and read repair
//!
//! Once replicas disagree the repairer picks the canonical state, makes sure
//! the caller gets its payload, and schedules overwrites of every replica
//! that is strictly behind. Replies arriving after the reader settled are
//! drained in the background and repaired the same way. Overwrites run as
//! detached tasks tracked by a [`TaskTracker`]; their failures are logged and
//! counted, never returned.

use crate::common::{with_deadline, ReadFailure};
use crate::replica::client::ReplicaClient;
use crate::replica::reply::{winner, BatchReply, FindOneReply, SenderReply, Vote};
use crate::replica::types::{
    AdditionalProperties, RepairResponse, Replica, SelectProperties, Stamp, Stamped, VObject,
};
use futures_util::future::join_all;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::Receiver;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use uuid::Uuid;

/// Counters of background repair writes, one unit per object.
#[derive(Debug, Default)]
pub struct RepairStats {
    scheduled: AtomicU64,
    done: AtomicU64,
    failed: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RepairSnapshot {
    pub scheduled: u64,
    pub done: u64,
    pub failed: u64,
}

impl RepairStats {
    pub fn snapshot(&self) -> RepairSnapshot {
        RepairSnapshot {
            scheduled: self.scheduled.load(Ordering::Relaxed),
            done: self.done.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

#[derive(Clone)]
pub(crate) struct Repairer {
    pub(crate) class: String,
    client: Arc<dyn ReplicaClient>,
    tracker: TaskTracker,
    stats: Arc<RepairStats>,
    pub(crate) read_timeout: Duration,
    pub(crate) repair_timeout: Duration,
}

impl Repairer {
    pub fn new(
        class: String,
        client: Arc<dyn ReplicaClient>,
        read_timeout: Duration,
        repair_timeout: Duration,
    ) -> Self {
        Self {
            class,
            client,
            tracker: TaskTracker::new(),
            stats: Arc::new(RepairStats::default()),
            read_timeout,
            repair_timeout,
        }
    }

    pub fn stats(&self) -> RepairSnapshot {
        self.stats.snapshot()
    }

    /// Wait until every scheduled repair has finished.
    pub async fn wait(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }

    pub async fn shutdown(&self) {
        self.tracker.close();
        self.tracker.wait().await;
    }

    /// Resolve a disagreement on a single object. `content` indexes the vote
    /// that came from the full read, if that read succeeded.
    pub async fn repair_one(
        &self,
        ctx: &CancellationToken,
        shard: &str,
        id: Uuid,
        votes: &[Vote<FindOneReply>],
        content: Option<usize>,
    ) -> Result<Replica, ReadFailure> {
        let best = &votes[winner(votes)];
        let target = best.data.stamp();
        let held = content
            .map(|c| votes[c].data.data.clone())
            .filter(|replica| replica.stamp() == target);

        let latest = match held {
            Some(replica) => replica,
            None => {
                let fetched = with_deadline(
                    ctx,
                    self.read_timeout,
                    &best.sender,
                    self.client.full_read(
                        &best.sender,
                        &self.class,
                        shard,
                        id,
                        &SelectProperties::default(),
                        &AdditionalProperties::default(),
                    ),
                )
                .await;
                let replica = match fetched {
                    Ok(replica) => replica,
                    Err(e) => {
                        tracing::error!(
                            op = "repair.one",
                            replica = %best.sender,
                            class = %self.class,
                            shard,
                            %id,
                            error = %e,
                            "cannot fetch most recent object"
                        );
                        return Err(ReadFailure::Repair);
                    }
                };
                if replica.stamp() != target {
                    tracing::error!(
                        op = "repair.one",
                        replica = %best.sender,
                        class = %self.class,
                        shard,
                        %id,
                        expected = ?target,
                        got = ?replica.stamp(),
                        "no full payload matches the winning version"
                    );
                    return Err(ReadFailure::Repair);
                }
                replica
            }
        };

        for vote in votes {
            let stale = vote.data.stamp();
            if target.supersedes(&stale) {
                let update = VObject {
                    latest: latest.clone(),
                    stale,
                };
                self.schedule(shard, &vote.sender, vec![update]);
            }
        }
        Ok(latest)
    }

    /// Resolve a disagreement on existence.
    ///
    /// Only tombstones are pushed: a stale live replica would need a payload
    /// transfer, which existence checks never do.
    pub fn repair_exist(&self, shard: &str, id: Uuid, votes: &[Vote<RepairResponse>]) -> bool {
        let target = votes[winner(votes)].data.stamp();

        for vote in votes {
            let stale = vote.data.stamp();
            if !target.supersedes(&stale) {
                continue;
            }
            if target.deleted {
                let update = VObject {
                    latest: Replica::tombstone(id, target.version, target.update_time),
                    stale,
                };
                self.schedule(shard, &vote.sender, vec![update]);
            } else {
                tracing::debug!(
                    op = "repair.exist",
                    replica = %vote.sender,
                    shard,
                    %id,
                    "stale replica left for a full read to repair"
                );
            }
        }
        target.exists()
    }

    /// Resolve a batch object by object. Returns one entry per id; a failure
    /// on one object leaves its siblings untouched.
    pub async fn repair_batch(
        &self,
        ctx: &CancellationToken,
        shard: &str,
        ids: &[Uuid],
        votes: &[Vote<BatchReply>],
        content: Option<usize>,
    ) -> Vec<Result<Replica, ReadFailure>> {
        let held = content.and_then(|c| votes[c].data.full_data());
        let mut results: Vec<Result<Replica, ReadFailure>> = match held {
            Some(held) => held.iter().cloned().map(Ok).collect(),
            None => vec![Err(ReadFailure::Repair); ids.len()],
        };

        // Winning stamp per object; objects whose winner is not the full
        // read are fetched from the winner, grouped by host.
        let mut targets: Vec<Stamp> = Vec::with_capacity(ids.len());
        let mut fetch: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
        for i in 0..ids.len() {
            let mut best = content.unwrap_or(0);
            for (j, vote) in votes.iter().enumerate() {
                if vote.data.stamp_at(i).supersedes(&votes[best].data.stamp_at(i)) {
                    best = j;
                }
            }
            let target = votes[best].data.stamp_at(i);
            if held.map_or(true, |held| held[i].stamp() != target) {
                fetch.entry(votes[best].sender.as_str()).or_default().push(i);
            }
            targets.push(target);
        }

        let fetches = fetch.into_iter().map(|(host, positions)| async move {
            let wanted: Vec<Uuid> = positions.iter().map(|&i| ids[i]).collect();
            let res = with_deadline(
                ctx,
                self.read_timeout,
                host,
                self.client.full_reads(host, &self.class, shard, &wanted),
            )
            .await;
            (host, positions, res)
        });

        for (host, positions, res) in join_all(fetches).await {
            let replicas = match res {
                Ok(replicas) if replicas.len() == positions.len() => replicas,
                Ok(replicas) => {
                    tracing::error!(
                        op = "repair.batch",
                        replica = host,
                        shard,
                        expected = positions.len(),
                        got = replicas.len(),
                        "unexpected number of objects"
                    );
                    for i in positions {
                        results[i] = Err(ReadFailure::Repair);
                    }
                    continue;
                }
                Err(e) => {
                    tracing::error!(
                        op = "repair.batch",
                        replica = host,
                        shard,
                        error = %e,
                        "cannot fetch most recent objects"
                    );
                    for i in positions {
                        results[i] = Err(ReadFailure::Repair);
                    }
                    continue;
                }
            };
            for (i, replica) in positions.into_iter().zip(replicas) {
                if replica.stamp() == targets[i] {
                    results[i] = Ok(replica);
                } else {
                    tracing::error!(
                        op = "repair.batch",
                        replica = host,
                        shard,
                        id = %ids[i],
                        "no full payload matches the winning version"
                    );
                    results[i] = Err(ReadFailure::Repair);
                }
            }
        }

        for vote in votes {
            let updates: Vec<VObject> = results
                .iter()
                .enumerate()
                .filter_map(|(i, res)| {
                    let stale = vote.data.stamp_at(i);
                    match res {
                        Ok(latest) if targets[i].supersedes(&stale) => Some(VObject {
                            latest: latest.clone(),
                            stale,
                        }),
                        _ => None,
                    }
                })
                .collect();
            if !updates.is_empty() {
                self.schedule(shard, &vote.sender, updates);
            }
        }

        results
    }

    /// Repair replicas behind a read that already settled.
    ///
    /// `behind` maps one reply to the overwrites its sender needs. It is
    /// applied to the votes already received, then to every reply still in
    /// flight on `rx`, which is drained by a tracked background task.
    pub fn repair_behind<T, F>(
        &self,
        shard: &str,
        votes: &[Vote<T>],
        mut rx: Receiver<SenderReply<T>>,
        mut behind: F,
    ) where
        T: Send + 'static,
        F: FnMut(&T) -> Vec<VObject> + Send + 'static,
    {
        for vote in votes {
            let updates = behind(&vote.data);
            if !updates.is_empty() {
                self.schedule(shard, &vote.sender, updates);
            }
        }

        let repairer = self.clone();
        let shard = shard.to_string();
        self.tracker.spawn(async move {
            while let Some(reply) = rx.recv().await {
                match reply.result {
                    Ok(data) => {
                        let updates = behind(&data);
                        if !updates.is_empty() {
                            repairer.schedule(&shard, &reply.sender, updates);
                        }
                    }
                    Err(e) => tracing::debug!(
                        op = "repair.late",
                        replica = %reply.sender,
                        class = %repairer.class,
                        %shard,
                        error = %e,
                        "late replica read failed"
                    ),
                }
            }
        });
    }

    /// Overwrite stale objects on `host` in the background.
    fn schedule(&self, shard: &str, host: &str, updates: Vec<VObject>) {
        let n = updates.len() as u64;
        self.stats.scheduled.fetch_add(n, Ordering::Relaxed);

        let client = Arc::clone(&self.client);
        let stats = Arc::clone(&self.stats);
        let class = self.class.clone();
        let shard = shard.to_string();
        let host = host.to_string();
        let timeout = self.repair_timeout;

        self.tracker.spawn(async move {
            let res = tokio::time::timeout(timeout, client.overwrite(&host, &class, &shard, &updates))
                .await
                .unwrap_or_else(|_| Err(crate::Error::Timeout(format!("overwrite on {}", host))));

            match res {
                Ok(responses) => {
                    let mut failed = 0u64;
                    for r in responses.iter().filter(|r| r.err.is_some()) {
                        failed += 1;
                        tracing::warn!(
                            op = "repair.overwrite",
                            replica = %host,
                            %class,
                            %shard,
                            id = %r.id,
                            error = r.err.as_deref().unwrap_or_default(),
                            "replica rejected repair"
                        );
                    }
                    stats.failed.fetch_add(failed, Ordering::Relaxed);
                    stats.done.fetch_add(n.saturating_sub(failed), Ordering::Relaxed);
                }
                Err(e) => {
                    stats.failed.fetch_add(n, Ordering::Relaxed);
                    tracing::warn!(
                        op = "repair.overwrite",
                        replica = %host,
                        %class,
                        %shard,
                        objects = n,
                        error = %e,
                        "could not repair replica"
                    );
                }
            }
        });
    }
}
