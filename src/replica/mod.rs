//! Replicated read path: coordination, conflict resolution and read repair

pub mod batch;
pub mod client;
pub mod coordinator;
pub mod finder;
mod repairer;
pub mod reply;
pub mod resolver;
mod stream;
pub mod types;

pub use batch::{cluster, create_batch, Batch, BatchPart};
pub use client::ReplicaClient;
pub use coordinator::{read_op, ReadCoordinator, ReadOp};
pub use finder::{BatchItem, ConsistencyReport, Finder};
pub use repairer::{RepairSnapshot, RepairStats};
pub use reply::{BatchReply, ExistReply, FindOneReply, SenderReply};
pub use resolver::{resolve_state, ReadState, Resolver, StaticResolver};
pub use types::{
    AdditionalProperties, ConsistencyLevel, Object, RepairResponse, Replica, SelectProperties,
    ShardDesc, Stamp, Stamped, VObject,
};
