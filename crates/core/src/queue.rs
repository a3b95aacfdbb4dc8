use crate::group::StampGroup;
use std::collections::VecDeque;

#[derive(Debug, Default)]
pub struct WorkQueue {
    id: usize,
    groups: VecDeque<StampGroup>,
}

impl WorkQueue {
    pub fn new(id: usize) -> Self {
        Self {
            id,
            groups: VecDeque::new(),
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn path_count(&self) -> usize {
        self.groups.iter().map(StampGroup::len).sum()
    }

    pub fn pop(&mut self) -> Option<StampGroup> {
        self.groups.pop_front()
    }

    pub(crate) fn push(&mut self, group: StampGroup) -> usize {
        self.groups.push_back(group);
        self.groups.len() - 1
    }

    pub(crate) fn get_mut(&mut self, slot: usize) -> Option<&mut StampGroup> {
        self.groups.get_mut(slot)
    }

    pub(crate) fn get(&self, slot: usize) -> Option<&StampGroup> {
        self.groups.get(slot)
    }

    pub(crate) fn groups_mut(&mut self) -> impl Iterator<Item = &mut StampGroup> {
        self.groups.iter_mut()
    }
}

impl Iterator for WorkQueue {
    type Item = StampGroup;

    fn next(&mut self) -> Option<Self::Item> {
        self.pop()
    }
}
