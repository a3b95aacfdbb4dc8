use crate::group::{PlannedRename, StampGroup};
use crate::queue::WorkQueue;
use crate::stamp::StampIdentity;
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy)]
struct Slot {
    shard: usize,
    position: usize,
}

/// Only the scan phase holds a `GroupIndex`; `into_shards` consumes it.
#[derive(Debug)]
pub struct GroupIndex {
    shards: Vec<WorkQueue>,
    slots: HashMap<String, Slot>,
    created: usize,
}

impl GroupIndex {
    pub fn new(shard_count: usize) -> Self {
        let shard_count = shard_count.max(1);
        Self {
            shards: (0..shard_count).map(WorkQueue::new).collect(),
            slots: HashMap::new(),
            created: 0,
        }
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    pub fn group_count(&self) -> usize {
        self.slots.len()
    }

    pub fn get(&self, key: &str) -> Option<&StampGroup> {
        let slot = self.slots.get(key)?;
        self.shards.get(slot.shard)?.get(slot.position)
    }

    pub fn add_or_merge(
        &mut self,
        identity: StampIdentity,
        path: PathBuf,
    ) -> Option<&StampGroup> {
        let extension = identity.extension.clone();
        let slot = match self.slots.get(&identity.key).copied() {
            Some(slot) => slot,
            None => {
                let shard = self.created % self.shards.len();
                self.created += 1;
                debug!(key = %identity.key, shard, "新しいスタンプグループ");
                let key = identity.key.clone();
                let position = self.shards[shard].push(StampGroup::new(identity));
                let slot = Slot { shard, position };
                self.slots.insert(key, slot);
                slot
            }
        };

        let group = self.shards.get_mut(slot.shard)?.get_mut(slot.position)?;
        if !group.push(path.clone(), extension) {
            warn!(path = %path.display(), key = %group.key(), "同じパスが重複して追加されました");
        }
        Some(group)
    }

    pub fn plan(&mut self, uppercase: bool) -> Vec<PlannedRename> {
        self.shards
            .iter_mut()
            .flat_map(WorkQueue::groups_mut)
            .flat_map(|group| group.sequence(uppercase))
            .collect()
    }

    pub fn into_shards(self) -> Vec<WorkQueue> {
        self.shards
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(stamp: &str, ext: &str) -> StampIdentity {
        StampIdentity {
            key: format!("img/{stamp}"),
            class_tag: "img".to_string(),
            stamp: stamp.to_string(),
            extension: ext.to_string(),
        }
    }

    #[test]
    fn same_identity_is_merged_into_one_group() {
        let mut index = GroupIndex::new(2);
        index.add_or_merge(identity("20230101_101500", "jpg"), PathBuf::from("/in/a.jpg"));
        let group = index
            .add_or_merge(identity("20230101_101500", "png"), PathBuf::from("/in/b.png"))
            .expect("group");
        assert_eq!(group.len(), 2);
        assert_eq!(index.group_count(), 1);
    }

    #[test]
    fn repeated_path_is_a_no_op() {
        let mut index = GroupIndex::new(1);
        index.add_or_merge(identity("20230101_101500", "jpg"), PathBuf::from("/in/a.jpg"));
        index.add_or_merge(identity("20230101_101500", "jpg"), PathBuf::from("/in/a.jpg"));
        let group = index.get("img/20230101_101500").expect("group");
        assert_eq!(group.len(), 1);
    }

    #[test]
    fn new_groups_are_assigned_round_robin() {
        let mut index = GroupIndex::new(3);
        for (i, stamp) in ["a", "b", "c", "d"].iter().enumerate() {
            index.add_or_merge(identity(stamp, "jpg"), PathBuf::from(format!("/in/{i}.jpg")));
        }
        // merging into an existing group must not advance the counter
        index.add_or_merge(identity("a", "jpg"), PathBuf::from("/in/extra.jpg"));
        index.add_or_merge(identity("e", "jpg"), PathBuf::from("/in/4.jpg"));

        let shards = index.into_shards();
        let keys: Vec<Vec<String>> = shards
            .into_iter()
            .map(|queue| queue.map(|group| group.key().to_string()).collect())
            .collect();
        assert_eq!(
            keys,
            vec![
                vec!["img/a".to_string(), "img/d".to_string()],
                vec!["img/b".to_string(), "img/e".to_string()],
                vec!["img/c".to_string()],
            ]
        );
    }

    #[test]
    fn plan_covers_every_shard() {
        let mut index = GroupIndex::new(2);
        index.add_or_merge(identity("a", "jpg"), PathBuf::from("/in/2.jpg"));
        index.add_or_merge(identity("b", "png"), PathBuf::from("/in/3.png"));
        index.add_or_merge(identity("a", "jpg"), PathBuf::from("/in/1.jpg"));

        let mut planned: Vec<_> = index
            .plan(false)
            .into_iter()
            .map(|p| (p.source, p.destination))
            .collect();
        planned.sort();
        assert_eq!(
            planned,
            vec![
                (PathBuf::from("/in/1.jpg"), PathBuf::from("/in/img_a000.jpg")),
                (PathBuf::from("/in/2.jpg"), PathBuf::from("/in/img_a001.jpg")),
                (PathBuf::from("/in/3.png"), PathBuf::from("/in/img_b000.png")),
            ]
        );
    }

    #[test]
    fn zero_shards_falls_back_to_one() {
        let index = GroupIndex::new(0);
        assert_eq!(index.shard_count(), 1);
    }
}
