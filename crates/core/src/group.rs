use crate::stamp::StampIdentity;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupMember {
    pub path: PathBuf,
    pub extension: String,
}

#[derive(Debug, Clone)]
pub struct StampGroup {
    identity: StampIdentity,
    members: Vec<GroupMember>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedRename {
    pub seq: usize,
    pub source: PathBuf,
    pub destination: PathBuf,
}

impl PlannedRename {
    pub fn is_unchanged(&self) -> bool {
        self.source == self.destination
    }
}

impl StampGroup {
    pub fn new(identity: StampIdentity) -> Self {
        Self {
            identity,
            members: Vec::new(),
        }
    }

    pub fn identity(&self) -> &StampIdentity {
        &self.identity
    }

    pub fn key(&self) -> &str {
        &self.identity.key
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn push(&mut self, path: PathBuf, extension: String) -> bool {
        if self.members.iter().any(|member| member.path == path) {
            return false;
        }
        self.members.push(GroupMember { path, extension });
        true
    }

    pub fn sequence(&mut self, uppercase: bool) -> Vec<PlannedRename> {
        self.members.sort_by(|a, b| a.path.cmp(&b.path));

        self.members
            .iter()
            .enumerate()
            .map(|(seq, member)| {
                let name = self.identity.file_name(seq, &member.extension, uppercase);
                let destination = match member.path.parent() {
                    Some(parent) => parent.join(name),
                    None => PathBuf::from(name),
                };
                PlannedRename {
                    seq,
                    source: member.path.clone(),
                    destination,
                }
            })
            .collect()
    }
}
