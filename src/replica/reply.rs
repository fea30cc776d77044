//! Replies flowing from replica tasks back to the reader

use crate::common::Result;
use crate::replica::types::{RepairResponse, Replica, Stamp, Stamped};
use uuid::Uuid;

/// Outcome of one operation against one replica host.
#[derive(Debug)]
pub struct SenderReply<T> {
    /// Host that answered
    pub sender: String,
    pub result: Result<T>,
}

/// Reply to a single-object read.
#[derive(Debug, Clone)]
pub struct FindOneReply {
    pub data: Replica,
    pub digest_read: bool,
}

impl FindOneReply {
    pub fn full(data: Replica) -> Self {
        Self {
            data,
            digest_read: false,
        }
    }

    /// Digest reads carry no payload, only the stamp.
    pub fn digest(id: Uuid, digest: &RepairResponse) -> Self {
        let stamp = digest.stamp();
        Self {
            data: Replica {
                id,
                version: stamp.version,
                update_time: stamp.update_time,
                deleted: stamp.deleted,
                object: None,
            },
            digest_read: true,
        }
    }
}

impl Stamped for FindOneReply {
    fn stamp(&self) -> Stamp {
        self.data.stamp()
    }
}

/// Reply to an existence check
pub type ExistReply = RepairResponse;

/// Reply to a batch read: full objects from one host, digests from the rest.
#[derive(Debug, Clone)]
pub enum BatchReply {
    Full(Vec<Replica>),
    Digest(Vec<RepairResponse>),
}

impl BatchReply {
    pub fn is_digest(&self) -> bool {
        matches!(self, BatchReply::Digest(_))
    }

    pub fn len(&self) -> usize {
        match self {
            BatchReply::Full(xs) => xs.len(),
            BatchReply::Digest(xs) => xs.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stamp_at(&self, i: usize) -> Stamp {
        let stamp = match self {
            BatchReply::Full(xs) => xs.get(i).map(Stamped::stamp),
            BatchReply::Digest(xs) => xs.get(i).map(Stamped::stamp),
        };
        stamp.unwrap_or_default()
    }

    pub fn full_data(&self) -> Option<&[Replica]> {
        match self {
            BatchReply::Full(xs) => Some(xs),
            BatchReply::Digest(_) => None,
        }
    }
}

/// A reply recorded by the reader
#[derive(Debug, Clone)]
pub(crate) struct Vote<T> {
    pub sender: String,
    pub data: T,
}

/// Number of votes whose stamp equals `stamp`.
pub(crate) fn agreeing<T: Stamped>(votes: &[Vote<T>], stamp: Stamp) -> usize {
    votes.iter().filter(|v| v.data.stamp() == stamp).count()
}

/// Index of the vote holding the canonical stamp. Earlier votes win ties, so
/// a vote placed first is kept unless something strictly supersedes it.
pub(crate) fn winner<T: Stamped>(votes: &[Vote<T>]) -> usize {
    let mut best = 0;
    for (i, vote) in votes.iter().enumerate().skip(1) {
        if vote.data.stamp().supersedes(&votes[best].data.stamp()) {
            best = i;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vote(sender: &str, version: u64, deleted: bool) -> Vote<RepairResponse> {
        Vote {
            sender: sender.into(),
            data: RepairResponse {
                id: Uuid::nil(),
                version,
                update_time: version as i64 * 10,
                deleted,
                err: None,
            },
        }
    }

    #[test]
    fn test_winner_and_agreement() {
        let votes = vec![vote("a", 3, false), vote("b", 5, false), vote("c", 5, false)];
        let w = winner(&votes);
        assert_eq!(votes[w].sender, "b");
        assert_eq!(agreeing(&votes, votes[w].data.stamp()), 2);
    }

    #[test]
    fn test_winner_tombstone() {
        let votes = vec![vote("a", 5, false), vote("b", 5, true)];
        assert_eq!(votes[winner(&votes)].sender, "b");
    }

    #[test]
    fn test_batch_reply_stamp_out_of_range() {
        let reply = BatchReply::Digest(vec![]);
        assert!(reply.is_digest());
        assert_eq!(reply.stamp_at(3), Stamp::default());
    }
}
