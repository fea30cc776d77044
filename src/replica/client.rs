use crate::common::Result;
use crate::replica::types::{
    AdditionalProperties, RepairResponse, Replica, SelectProperties, VObject,
};
use async_trait::async_trait;
use uuid::Uuid;

/// RPC capability against a single replica host.
///
/// Implementations must be safe to call concurrently for different hosts.
/// Callers bound every call with a deadline and drop the future on
/// cancellation.
#[async_trait]
pub trait ReplicaClient: Send + Sync {
    /// Read one object in full.
    async fn full_read(
        &self,
        host: &str,
        class: &str,
        shard: &str,
        id: Uuid,
        props: &SelectProperties,
        adds: &AdditionalProperties,
    ) -> Result<Replica>;

    /// Read several objects in full, aligned with `ids`.
    async fn full_reads(
        &self,
        host: &str,
        class: &str,
        shard: &str,
        ids: &[Uuid],
    ) -> Result<Vec<Replica>>;

    /// Read version metadata only, aligned with `ids`.
    async fn digest_reads(
        &self,
        host: &str,
        class: &str,
        shard: &str,
        ids: &[Uuid],
    ) -> Result<Vec<RepairResponse>>;

    /// Replace stale objects on `host`. Per-object failures are reported in
    /// the `err` field of the matching response.
    async fn overwrite(
        &self,
        host: &str,
        class: &str,
        shard: &str,
        updates: &[VObject],
    ) -> Result<Vec<RepairResponse>>;
}
