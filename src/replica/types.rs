//! Replicated object model shared by the coordinator, repairer and finder

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Properties to project on a full read (empty = all)
pub type SelectProperties = Vec<String>;

/// Extra metadata a full read should include
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdditionalProperties {
    #[serde(default)]
    pub vector: bool,
    #[serde(default)]
    pub creation_time: bool,
    #[serde(default)]
    pub last_update_time: bool,
}

/// Minimum number of agreeing replicas before a read is authoritative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ConsistencyLevel {
    One,
    #[default]
    Quorum,
    All,
}

impl ConsistencyLevel {
    /// Number of replies required out of `replicas` replicas (never zero).
    pub fn required(&self, replicas: usize) -> usize {
        let n = match self {
            ConsistencyLevel::One => 1,
            ConsistencyLevel::Quorum => replicas / 2 + 1,
            ConsistencyLevel::All => replicas,
        };
        n.max(1)
    }
}

impl fmt::Display for ConsistencyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConsistencyLevel::One => write!(f, "ONE"),
            ConsistencyLevel::Quorum => write!(f, "QUORUM"),
            ConsistencyLevel::All => write!(f, "ALL"),
        }
    }
}

impl FromStr for ConsistencyLevel {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ONE" => Ok(ConsistencyLevel::One),
            "QUORUM" => Ok(ConsistencyLevel::Quorum),
            "ALL" => Ok(ConsistencyLevel::All),
            _ => Err(crate::Error::InvalidConfig(format!(
                "unknown consistency level: {}",
                s
            ))),
        }
    }
}

/// A stored object as seen by one replica.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Object {
    pub id: Uuid,
    #[serde(default)]
    pub class: String,
    #[serde(default)]
    pub properties: serde_json::Value,
    /// Monotonic counter bumped on every write
    #[serde(default)]
    pub version: u64,
    /// Last update time (unix millis)
    #[serde(default)]
    pub last_update_time_unix: i64,
    #[serde(default)]
    pub belongs_to_shard: String,
    #[serde(default)]
    pub belongs_to_node: String,
}

impl Object {
    pub fn stamp(&self) -> Stamp {
        Stamp {
            version: self.version,
            update_time: self.last_update_time_unix,
            deleted: false,
        }
    }
}

/// Version metadata used to compare replicas of the same object.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Stamp {
    pub version: u64,
    pub update_time: i64,
    pub deleted: bool,
}

impl Stamp {
    /// Returns true if `self` should replace `other` as the canonical state.
    ///
    /// Greatest version wins, then greatest update time. A tombstone beats a
    /// live object of equal or lower version.
    pub fn supersedes(&self, other: &Stamp) -> bool {
        match (self.deleted, other.deleted) {
            (true, false) => self.version >= other.version,
            (false, true) => self.version > other.version,
            _ => {
                (self.version, self.update_time).cmp(&(other.version, other.update_time))
                    == Ordering::Greater
            }
        }
    }

    /// Whether a replica holding this stamp has a live object.
    pub fn exists(&self) -> bool {
        !self.deleted && (self.version > 0 || self.update_time > 0)
    }
}

/// Anything carrying a [`Stamp`]
pub trait Stamped {
    fn stamp(&self) -> Stamp;
}

/// Result of a full read: the object, a tombstone, or nothing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Replica {
    pub id: Uuid,
    #[serde(default)]
    pub version: u64,
    #[serde(default)]
    pub update_time: i64,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default)]
    pub object: Option<Object>,
}

impl Replica {
    pub fn from_object(object: Object) -> Self {
        Self {
            id: object.id,
            version: object.version,
            update_time: object.last_update_time_unix,
            deleted: false,
            object: Some(object),
        }
    }

    /// Replica that has never seen the object
    pub fn missing(id: Uuid) -> Self {
        Self {
            id,
            version: 0,
            update_time: 0,
            deleted: false,
            object: None,
        }
    }

    pub fn tombstone(id: Uuid, version: u64, update_time: i64) -> Self {
        Self {
            id,
            version,
            update_time,
            deleted: true,
            object: None,
        }
    }

    /// The live object, if any.
    pub fn into_object(self) -> Option<Object> {
        if self.deleted {
            None
        } else {
            self.object
        }
    }
}

impl Stamped for Replica {
    fn stamp(&self) -> Stamp {
        Stamp {
            version: self.version,
            update_time: self.update_time,
            deleted: self.deleted,
        }
    }
}

/// Digest of one object on one replica, also used as the per-object answer to
/// an overwrite.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepairResponse {
    pub id: Uuid,
    #[serde(default)]
    pub version: u64,
    #[serde(default)]
    pub update_time: i64,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub err: Option<String>,
}

impl RepairResponse {
    pub fn of(id: Uuid, stamp: Stamp) -> Self {
        Self {
            id,
            version: stamp.version,
            update_time: stamp.update_time,
            deleted: stamp.deleted,
            err: None,
        }
    }
}

impl Stamped for RepairResponse {
    fn stamp(&self) -> Stamp {
        Stamp {
            version: self.version,
            update_time: self.update_time,
            deleted: self.deleted,
        }
    }
}

/// Repair write: replace `stale` with `latest`, only if the target still holds
/// `stale`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VObject {
    pub latest: Replica,
    pub stale: Stamp,
}

/// Routing tuple of a batch partition
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ShardDesc {
    pub name: String,
    pub node: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stamp(version: u64, update_time: i64, deleted: bool) -> Stamp {
        Stamp {
            version,
            update_time,
            deleted,
        }
    }

    #[test]
    fn test_required() {
        assert_eq!(ConsistencyLevel::One.required(3), 1);
        assert_eq!(ConsistencyLevel::Quorum.required(3), 2);
        assert_eq!(ConsistencyLevel::Quorum.required(4), 3);
        assert_eq!(ConsistencyLevel::All.required(3), 3);
        assert_eq!(ConsistencyLevel::All.required(0), 1);
    }

    #[test]
    fn test_level_parse_and_display() {
        assert_eq!("quorum".parse::<ConsistencyLevel>().unwrap(), ConsistencyLevel::Quorum);
        assert_eq!("ALL".parse::<ConsistencyLevel>().unwrap(), ConsistencyLevel::All);
        assert!("TWO".parse::<ConsistencyLevel>().is_err());
        assert_eq!(ConsistencyLevel::One.to_string(), "ONE");
        assert_eq!(serde_json::to_string(&ConsistencyLevel::All).unwrap(), "\"ALL\"");
    }

    #[test]
    fn test_version_beats_update_time() {
        assert!(stamp(5, 1, false).supersedes(&stamp(3, 100, false)));
        assert!(!stamp(3, 100, false).supersedes(&stamp(5, 1, false)));
        assert!(stamp(5, 2, false).supersedes(&stamp(5, 1, false)));
        assert!(!stamp(5, 1, false).supersedes(&stamp(5, 1, false)));
    }

    #[test]
    fn test_tombstone_wins_ties() {
        let live = stamp(5, 10, false);
        let dead = stamp(5, 1, true);
        assert!(dead.supersedes(&live));
        assert!(!live.supersedes(&dead));
        assert!(stamp(6, 0, false).supersedes(&dead));
        assert!(!stamp(4, 0, true).supersedes(&live));
    }

    #[test]
    fn test_exists() {
        assert!(!Stamp::default().exists());
        assert!(stamp(1, 0, false).exists());
        assert!(!stamp(3, 9, true).exists());
    }
}
