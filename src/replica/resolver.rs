//! Replica resolution: node names to hosts, shards to replica sets

use crate::common::{Config, Error, Result};
use crate::replica::types::ConsistencyLevel;
use std::collections::BTreeMap;

/// Maps logical node names to reachable hosts.
///
/// Must be deterministic for a given cluster view.
pub trait Resolver: Send + Sync {
    /// Host address of `node`, or `None` if it is currently unresolvable.
    fn node_hostname(&self, node: &str) -> Option<String>;

    /// Names of the nodes replicating `shard` of `class`.
    fn shard_replicas(&self, class: &str, shard: &str) -> Result<Vec<String>>;
}

/// Resolver backed by fixed maps, typically built from [`Config`].
#[derive(Debug, Clone, Default)]
pub struct StaticResolver {
    nodes: BTreeMap<String, String>,
    shards: BTreeMap<String, Vec<String>>,
}

impl StaticResolver {
    pub fn new(nodes: BTreeMap<String, String>, shards: BTreeMap<String, Vec<String>>) -> Self {
        Self { nodes, shards }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.nodes.clone(), config.shards.clone())
    }

    pub fn with_node(mut self, node: impl Into<String>, host: impl Into<String>) -> Self {
        self.nodes.insert(node.into(), host.into());
        self
    }

    pub fn with_shard<I, S>(mut self, shard: impl Into<String>, replicas: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.shards
            .insert(shard.into(), replicas.into_iter().map(Into::into).collect());
        self
    }
}

impl Resolver for StaticResolver {
    fn node_hostname(&self, node: &str) -> Option<String> {
        self.nodes.get(node).filter(|h| !h.is_empty()).cloned()
    }

    fn shard_replicas(&self, _class: &str, shard: &str) -> Result<Vec<String>> {
        self.shards
            .get(shard)
            .cloned()
            .ok_or_else(|| Error::ShardNotFound(shard.to_string()))
    }
}

/// Coordination state of one read: who to ask and how many must answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadState {
    pub level: ConsistencyLevel,
    /// Replies required to satisfy `level`
    pub required: usize,
    /// Resolved hosts, preferred full-read target first
    pub hosts: Vec<String>,
    /// Node names parallel to `hosts`
    pub nodes: Vec<String>,
    /// Replies not yet received; one read is dispatched per host
    pub outstanding: usize,
}

impl ReadState {
    /// Record the arrival of one reply.
    pub fn received(&mut self) {
        self.outstanding = self.outstanding.saturating_sub(1);
    }

    /// Whether `ok` successful replies plus the outstanding ones can still
    /// reach the required count.
    pub fn can_succeed(&self, ok: usize) -> bool {
        ok + self.outstanding >= self.required
    }

    /// Host of `node`, if it resolved.
    pub fn host_of(&self, node: &str) -> Option<&str> {
        self.nodes
            .iter()
            .position(|n| n == node)
            .map(|i| self.hosts[i].as_str())
    }
}

/// Resolve the replica set of `shard`.
///
/// The preferred node (`direct`, else `local`) comes first when it is a
/// replica; unresolvable nodes are skipped. Fails if fewer hosts resolve than
/// `level` requires.
pub fn resolve_state(
    resolver: &dyn Resolver,
    class: &str,
    shard: &str,
    level: ConsistencyLevel,
    direct: Option<&str>,
    local: &str,
) -> Result<ReadState> {
    let replicas = resolver.shard_replicas(class, shard)?;
    let preferred = direct.filter(|d| !d.is_empty()).unwrap_or(local);

    let mut ordered: Vec<&String> = Vec::with_capacity(replicas.len());
    ordered.extend(replicas.iter().filter(|n| n.as_str() == preferred));
    ordered.extend(replicas.iter().filter(|n| n.as_str() != preferred));

    let (mut hosts, mut nodes) = (Vec::new(), Vec::new());
    for node in ordered {
        match resolver.node_hostname(node) {
            Some(host) => {
                hosts.push(host);
                nodes.push(node.clone());
            }
            None => tracing::debug!(%node, %shard, "skipping unresolvable replica"),
        }
    }

    let required = level.required(replicas.len());
    if hosts.len() < required {
        return Err(Error::InsufficientReplicas {
            shard: shard.to_string(),
            needed: required,
            available: hosts.len(),
        });
    }

    Ok(ReadState {
        level,
        required,
        outstanding: hosts.len(),
        hosts,
        nodes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver() -> StaticResolver {
        StaticResolver::default()
            .with_node("n1", "h1")
            .with_node("n2", "h2")
            .with_node("n3", "h3")
            .with_shard("s1", ["n1", "n2", "n3"])
    }

    #[test]
    fn test_local_node_first() {
        let st = resolve_state(&resolver(), "C", "s1", ConsistencyLevel::Quorum, None, "n2")
            .unwrap();
        assert_eq!(st.hosts, vec!["h2", "h1", "h3"]);
        assert_eq!(st.required, 2);
        assert_eq!(st.outstanding, 3);
        assert_eq!(st.host_of("n3"), Some("h3"));
    }

    #[test]
    fn test_outstanding_replies() {
        let mut st = resolve_state(&resolver(), "C", "s1", ConsistencyLevel::Quorum, None, "n1")
            .unwrap();
        assert!(st.can_succeed(0));

        // one failure: two replies left, both must succeed
        st.received();
        assert!(st.can_succeed(0));
        st.received();
        assert!(!st.can_succeed(0));
        assert!(st.can_succeed(1));
        st.received();
        st.received();
        assert_eq!(st.outstanding, 0);
        assert!(st.can_succeed(2));
        assert!(!st.can_succeed(1));
    }

    #[test]
    fn test_direct_node_overrides_local() {
        let st = resolve_state(&resolver(), "C", "s1", ConsistencyLevel::All, Some("n3"), "n2")
            .unwrap();
        assert_eq!(st.nodes, vec!["n3", "n1", "n2"]);
        assert_eq!(st.required, 3);
    }

    #[test]
    fn test_non_replica_local_keeps_order() {
        let st = resolve_state(&resolver(), "C", "s1", ConsistencyLevel::One, None, "other")
            .unwrap();
        assert_eq!(st.hosts, vec!["h1", "h2", "h3"]);
        assert_eq!(st.required, 1);
    }

    #[test]
    fn test_insufficient_replicas() {
        let r = StaticResolver::default()
            .with_node("n1", "h1")
            .with_shard("s1", ["n1", "n2", "n3"]);
        assert!(resolve_state(&r, "C", "s1", ConsistencyLevel::One, None, "n1").is_ok());
        let err = resolve_state(&r, "C", "s1", ConsistencyLevel::Quorum, None, "n1").unwrap_err();
        assert!(matches!(
            err,
            Error::InsufficientReplicas {
                needed: 2,
                available: 1,
                ..
            }
        ));
    }

    #[test]
    fn test_unknown_shard() {
        let err = resolve_state(&resolver(), "C", "s9", ConsistencyLevel::One, None, "n1")
            .unwrap_err();
        assert!(matches!(err, Error::ShardNotFound(_)));
    }
}
