//! HTTP replica client
//!
//! Speaks JSON to the replica endpoints of each node:
//!
//! ```text
//! GET  /replicas/indices/{class}/shards/{shard}/objects/{id}   full read
//! POST /replicas/indices/{class}/shards/{shard}/mget           full reads
//! POST /replicas/indices/{class}/shards/{shard}/digest         digest reads
//! PUT  /replicas/indices/{class}/shards/{shard}/overwrite      repair writes
//! ```

use crate::common::{encode_segment, Error, Result};
use crate::replica::{
    AdditionalProperties, RepairResponse, Replica, ReplicaClient, SelectProperties, VObject,
};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use uuid::Uuid;

pub struct HttpReplicaClient {
    client: Client,
    scheme: &'static str,
}

impl HttpReplicaClient {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            scheme: "http",
        })
    }

    /// Use an existing reqwest client (shared pools, custom TLS...).
    pub fn with_client(client: Client) -> Self {
        Self {
            client,
            scheme: "http",
        }
    }

    fn shard_url(&self, host: &str, class: &str, shard: &str) -> String {
        let base = if host.contains("://") {
            host.trim_end_matches('/').to_string()
        } else {
            format!("{}://{}", self.scheme, host)
        };
        format!(
            "{}/replicas/indices/{}/shards/{}",
            base,
            encode_segment(class),
            encode_segment(shard)
        )
    }

    async fn send<T: DeserializeOwned>(req: RequestBuilder) -> Result<T> {
        let resp = req.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(status_error(status, body));
        }
        Ok(resp.json::<T>().await?)
    }
}

fn status_error(status: StatusCode, body: String) -> Error {
    let body = body.trim();
    if body.is_empty() {
        Error::Http(format!("status {}", status))
    } else {
        Error::Http(format!("status {}: {}", status, body))
    }
}

fn additional_query(adds: &AdditionalProperties) -> String {
    let mut out = Vec::new();
    if adds.vector {
        out.push("vector");
    }
    if adds.creation_time {
        out.push("creationTimeUnix");
    }
    if adds.last_update_time {
        out.push("lastUpdateTimeUnix");
    }
    out.join(",")
}

#[async_trait]
impl ReplicaClient for HttpReplicaClient {
    async fn full_read(
        &self,
        host: &str,
        class: &str,
        shard: &str,
        id: Uuid,
        props: &SelectProperties,
        adds: &AdditionalProperties,
    ) -> Result<Replica> {
        let url = format!("{}/objects/{}", self.shard_url(host, class, shard), id);
        let mut query: Vec<(&str, String)> = Vec::new();
        if !props.is_empty() {
            query.push(("props", props.join(",")));
        }
        let additional = additional_query(adds);
        if !additional.is_empty() {
            query.push(("additional", additional));
        }
        Self::send(self.client.get(url).query(&query)).await
    }

    async fn full_reads(
        &self,
        host: &str,
        class: &str,
        shard: &str,
        ids: &[Uuid],
    ) -> Result<Vec<Replica>> {
        let url = format!("{}/mget", self.shard_url(host, class, shard));
        Self::send(self.client.post(url).json(ids)).await
    }

    async fn digest_reads(
        &self,
        host: &str,
        class: &str,
        shard: &str,
        ids: &[Uuid],
    ) -> Result<Vec<RepairResponse>> {
        let url = format!("{}/digest", self.shard_url(host, class, shard));
        Self::send(self.client.post(url).json(ids)).await
    }

    async fn overwrite(
        &self,
        host: &str,
        class: &str,
        shard: &str,
        updates: &[VObject],
    ) -> Result<Vec<RepairResponse>> {
        let url = format!("{}/overwrite", self.shard_url(host, class, shard));
        Self::send(self.client.put(url).json(updates)).await
    }
}
