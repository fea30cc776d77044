//! Batch partitioning by owning shard
//!
//! A batch of objects is split into one [`BatchPart`] per shard. Parts borrow
//! the original objects and remember their original positions, so results can
//! be written back per index without any part touching another's entries.

use crate::replica::types::{Object, Replica, ShardDesc};
use std::collections::HashMap;
use uuid::Uuid;

/// A flat batch of objects, each annotated with its shard and node.
#[derive(Debug, Clone)]
pub struct Batch<'a> {
    data: Vec<&'a Object>,
}

impl<'a> Batch<'a> {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// The members of a batch that belong to one shard.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchPart<'a> {
    pub shard: String,
    /// Node owning the shard's copy held by the caller
    pub node: String,
    /// The whole original batch
    pub data: &'a [&'a Object],
    /// Positions in `data` that belong to this part, in original order
    pub index: Vec<usize>,
    /// Per-object verdicts, sized to the whole batch
    pub oks: Vec<bool>,
}

impl<'a> BatchPart<'a> {
    pub fn desc(&self) -> ShardDesc {
        ShardDesc {
            name: self.shard.clone(),
            node: self.node.clone(),
        }
    }

    /// Objects of this part in `index` order
    pub fn objects(&self) -> impl Iterator<Item = &'a Object> + '_ {
        self.index.iter().map(|&i| self.data[i])
    }

    pub fn object_ids(&self) -> Vec<Uuid> {
        self.objects().map(|o| o.id).collect()
    }

    /// Held objects as full-read replicas, plus their ids.
    pub fn extract(&self) -> (Vec<Replica>, Vec<Uuid>) {
        self.objects()
            .map(|o| (Replica::from_object(o.clone()), o.id))
            .unzip()
    }
}

pub fn create_batch<'a, I>(objects: I) -> Batch<'a>
where
    I: IntoIterator<Item = &'a Object>,
{
    Batch {
        data: objects.into_iter().collect(),
    }
}

/// Split a batch into per-shard parts, in order of first appearance.
pub fn cluster<'a>(batch: &'a Batch<'_>) -> Vec<BatchPart<'a>> {
    let n = batch.data.len();
    let mut parts: Vec<BatchPart<'a>> = Vec::new();
    let mut by_shard: HashMap<&str, usize> = HashMap::new();

    for (i, object) in batch.data.iter().enumerate() {
        let shard = object.belongs_to_shard.as_str();
        let at = *by_shard.entry(shard).or_insert_with(|| {
            parts.push(BatchPart {
                shard: shard.to_string(),
                node: object.belongs_to_node.clone(),
                data: &batch.data,
                index: Vec::new(),
                oks: vec![false; n],
            });
            parts.len() - 1
        });
        parts[at].index.push(i);
    }

    parts
}

#[cfg(test)]
mod tests {
    use super::*;

    fn object(n: u128, shard: &str, node: &str) -> Object {
        Object {
            id: Uuid::from_u128(n),
            class: "C".into(),
            properties: serde_json::Value::Null,
            version: 1,
            last_update_time_unix: 1,
            belongs_to_shard: shard.into(),
            belongs_to_node: node.into(),
        }
    }

    #[test]
    fn test_empty_batch() {
        let data: Vec<Object> = vec![];
        let batch = create_batch(&data);
        assert!(batch.is_empty());
        assert!(cluster(&batch).is_empty());
    }

    #[test]
    fn test_single_shard() {
        const N: usize = 9;
        let data: Vec<Object> = (0..N as u128).map(|i| object(i, "S1", "N1")).collect();
        let ids: Vec<Uuid> = data.iter().map(|o| o.id).collect();

        let batch = create_batch(&data);
        let parts = cluster(&batch);
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].shard, "S1");
        assert_eq!(parts[0].node, "N1");
        assert_eq!(parts[0].index, (0..N).collect::<Vec<_>>());
        assert_eq!(parts[0].oks, vec![false; N]);
        assert_eq!(parts[0].data.len(), N);
        assert_eq!(parts[0].object_ids(), ids);
    }

    #[test]
    fn test_two_shards() {
        const N: usize = 9;
        let mut data: Vec<Object> = (0..N as u128).map(|i| object(i, "S1", "N1")).collect();
        for i in [0, 2, 5] {
            data[i].belongs_to_shard = "S2".into();
            data[i].belongs_to_node = "N2".into();
        }
        data[3].belongs_to_shard = "S2".into();
        data[4].belongs_to_node = "N2".into();
        let ids: Vec<Uuid> = data.iter().map(|o| o.id).collect();

        let batch = create_batch(&data);
        let mut parts = cluster(&batch);
        parts.sort_by_key(|p| p.index.len());
        assert_eq!(parts.len(), 2);

        assert_eq!(parts[0].desc(), ShardDesc { name: "S2".into(), node: "N2".into() });
        assert_eq!(parts[0].object_ids(), vec![ids[0], ids[2], ids[3], ids[5]]);
        assert_eq!(parts[0].oks.len(), N);

        assert_eq!(parts[1].desc(), ShardDesc { name: "S1".into(), node: "N1".into() });
        assert_eq!(
            parts[1].object_ids(),
            vec![ids[1], ids[4], ids[6], ids[7], ids[8]]
        );
        assert_eq!(parts[1].oks.len(), N);
    }

    #[test]
    fn test_parts_cover_every_index_once() {
        let shards = ["a", "b", "c"];
        let data: Vec<Object> = (0..30u128)
            .map(|i| object(i, shards[(i * 7 % 3) as usize], "n"))
            .collect();
        let batch = create_batch(&data);

        let mut seen: Vec<usize> = cluster(&batch)
            .into_iter()
            .flat_map(|p| p.index)
            .collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..30).collect::<Vec<_>>());
    }

    #[test]
    fn test_extract() {
        let data = vec![object(1, "S1", "N1"), object(2, "S1", "N1")];
        let batch = create_batch(&data);
        let parts = cluster(&batch);
        let (replicas, ids) = parts[0].extract();
        assert_eq!(ids, vec![Uuid::from_u128(1), Uuid::from_u128(2)]);
        assert_eq!(replicas[1].object.as_ref(), Some(&data[1]));
    }
}
