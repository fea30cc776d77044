//! Readers consuming the coordinator's reply channel
//!
//! Each reader collects replies until enough of them agree with the full
//! read, then leaves the replies still in flight to the [`Repairer`]. Failed
//! replies are skipped as long as the remaining ones can still satisfy the
//! level. When the channel closes without agreement the repairer settles the
//! disagreement.

use crate::common::ReadFailure;
use crate::replica::reply::{agreeing, BatchReply, ExistReply, FindOneReply, SenderReply, Vote};
use crate::replica::repairer::Repairer;
use crate::replica::resolver::ReadState;
use crate::replica::types::{Replica, Stamped, VObject};
use tokio::sync::mpsc::Receiver;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

pub(crate) struct FinderStream {
    pub(crate) repairer: Repairer,
}

impl FinderStream {
    pub async fn read_one(
        &self,
        ctx: &CancellationToken,
        shard: &str,
        id: Uuid,
        mut rx: Receiver<SenderReply<FindOneReply>>,
        mut state: ReadState,
    ) -> Result<Replica, ReadFailure> {
        let mut votes: Vec<Vote<FindOneReply>> = Vec::with_capacity(state.hosts.len());
        let mut content = None;

        while let Some(reply) = rx.recv().await {
            state.received();
            match reply.result {
                Ok(data) => {
                    if !data.digest_read {
                        content = Some(votes.len());
                    }
                    votes.push(Vote {
                        sender: reply.sender,
                        data,
                    });
                }
                Err(e) => tracing::warn!(
                    op = "get",
                    replica = %reply.sender,
                    class = %self.repairer.class,
                    shard,
                    %id,
                    error = %e,
                    "replica read failed"
                ),
            }

            if let Some(c) = content {
                let target = votes[c].data.stamp();
                if agreeing(&votes, target) >= state.required {
                    let latest = votes[c].data.data.clone();
                    let repaired = latest.clone();
                    self.repairer.repair_behind(shard, &votes, rx, move |data| {
                        let stale = data.stamp();
                        if target.supersedes(&stale) {
                            vec![VObject {
                                latest: repaired.clone(),
                                stale,
                            }]
                        } else {
                            Vec::new()
                        }
                    });
                    return Ok(latest);
                }
            }
            if !state.can_succeed(votes.len()) {
                return Err(ReadFailure::Read);
            }
        }

        if votes.len() < state.required {
            return Err(ReadFailure::Read);
        }
        self.repairer
            .repair_one(ctx, shard, id, &votes, content)
            .await
    }

    pub async fn read_existence(
        &self,
        shard: &str,
        id: Uuid,
        mut rx: Receiver<SenderReply<ExistReply>>,
        mut state: ReadState,
    ) -> Result<bool, ReadFailure> {
        let mut votes: Vec<Vote<ExistReply>> = Vec::with_capacity(state.hosts.len());

        while let Some(reply) = rx.recv().await {
            state.received();
            match reply.result {
                Ok(data) => {
                    let target = data.stamp();
                    votes.push(Vote {
                        sender: reply.sender,
                        data,
                    });
                    if agreeing(&votes, target) >= state.required {
                        self.repairer.repair_behind(shard, &votes, rx, move |data| {
                            let stale = data.stamp();
                            if target.deleted && target.supersedes(&stale) {
                                vec![VObject {
                                    latest: Replica::tombstone(
                                        id,
                                        target.version,
                                        target.update_time,
                                    ),
                                    stale,
                                }]
                            } else {
                                Vec::new()
                            }
                        });
                        return Ok(target.exists());
                    }
                }
                Err(e) => tracing::warn!(
                    op = "exists",
                    replica = %reply.sender,
                    class = %self.repairer.class,
                    shard,
                    %id,
                    error = %e,
                    "replica digest read failed"
                ),
            }
            if !state.can_succeed(votes.len()) {
                return Err(ReadFailure::Read);
            }
        }

        if votes.len() < state.required {
            return Err(ReadFailure::Read);
        }
        Ok(self.repairer.repair_exist(shard, id, &votes))
    }

    /// Collect a batch read. Returns one entry per id, in `ids` order.
    pub async fn read_batch(
        &self,
        ctx: &CancellationToken,
        op: &'static str,
        shard: &str,
        ids: &[Uuid],
        mut rx: Receiver<SenderReply<BatchReply>>,
        mut state: ReadState,
    ) -> Result<Vec<Result<Replica, ReadFailure>>, ReadFailure> {
        let n = ids.len();
        let mut votes: Vec<Vote<BatchReply>> = Vec::with_capacity(state.hosts.len());
        let mut content = None;

        while let Some(reply) = rx.recv().await {
            state.received();
            match reply.result {
                Ok(data) if data.len() == n => {
                    if !data.is_digest() {
                        content = Some(votes.len());
                    }
                    votes.push(Vote {
                        sender: reply.sender,
                        data,
                    });
                }
                Ok(data) => tracing::warn!(
                    op,
                    replica = %reply.sender,
                    class = %self.repairer.class,
                    shard,
                    expected = n,
                    got = data.len(),
                    "replica returned a misaligned batch"
                ),
                Err(e) => tracing::warn!(
                    op,
                    replica = %reply.sender,
                    class = %self.repairer.class,
                    shard,
                    error = %e,
                    "replica batch read failed"
                ),
            }

            if let Some(c) = content {
                let agreed = (0..n).all(|i| {
                    let held = votes[c].data.stamp_at(i);
                    votes.iter().filter(|v| v.data.stamp_at(i) == held).count() >= state.required
                });
                if agreed {
                    if let Some(held) = votes[c].data.full_data() {
                        let latest = held.to_vec();
                        let repaired = latest.clone();
                        self.repairer.repair_behind(shard, &votes, rx, move |data| {
                            if data.len() != repaired.len() {
                                return Vec::new();
                            }
                            repaired
                                .iter()
                                .enumerate()
                                .filter_map(|(i, latest)| {
                                    let stale = data.stamp_at(i);
                                    latest.stamp().supersedes(&stale).then(|| VObject {
                                        latest: latest.clone(),
                                        stale,
                                    })
                                })
                                .collect()
                        });
                        return Ok(latest.into_iter().map(Ok).collect());
                    }
                }
            }
            if !state.can_succeed(votes.len()) {
                return Err(ReadFailure::Read);
            }
        }

        if votes.len() < state.required {
            return Err(ReadFailure::Read);
        }
        Ok(self
            .repairer
            .repair_batch(ctx, shard, ids, &votes, content)
            .await)
    }
}
