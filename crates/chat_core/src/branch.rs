//! BranchTree - the branch arena.
//!
//! Branches form a forest rooted at branch 0. Ids are assigned
//! monotonically and never reused, so every non-root branch points to a
//! strictly smaller source id and ancestor walks terminate.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ChatError;
use crate::message::MessageId;
use crate::store::MessageStore;

/// Stable handle of a branch: its index in the arena.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct BranchId(pub u32);

impl BranchId {
    /// The root branch every conversation starts with.
    pub const ROOT: BranchId = BranchId(0);

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for BranchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One continuation path: an ordered message sequence plus the branch it
/// was forked from (`None` for the root).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Branch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<BranchId>,
    #[serde(default)]
    pub messages: Vec<MessageId>,
}

/// Arena of every branch in a conversation, addressed by [`BranchId`].
///
/// The tree owns branch order; per-record membership bookkeeping lives on
/// the message records, so mutating operations take the store alongside.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BranchTree {
    branches: Vec<Branch>,
}

impl Default for BranchTree {
    fn default() -> Self {
        Self::new()
    }
}

impl BranchTree {
    /// Create a tree holding just an empty root branch.
    pub fn new() -> Self {
        BranchTree {
            branches: vec![Branch {
                source: None,
                messages: Vec::new(),
            }],
        }
    }

    pub fn len(&self) -> usize {
        self.branches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.branches.is_empty()
    }

    pub fn get(&self, id: BranchId) -> Option<&Branch> {
        self.branches.get(id.index())
    }

    /// Like [`get`](Self::get), but missing branches are an error.
    pub fn branch(&self, id: BranchId) -> Result<&Branch, ChatError> {
        self.get(id).ok_or(ChatError::BranchNotFound(id))
    }

    pub fn ids(&self) -> impl Iterator<Item = BranchId> + '_ {
        (0..self.branches.len() as u32).map(BranchId)
    }

    /// Fork `source` at `at`: a new branch starts with the source's prefix
    /// up to and including that message.
    ///
    /// Every copied record learns its new membership and the fork point
    /// records the new branch. The copy is of ids only; appending to either
    /// branch afterwards leaves the other untouched.
    pub fn fork(
        &mut self,
        store: &mut MessageStore,
        source: BranchId,
        at: &MessageId,
    ) -> Result<BranchId, ChatError> {
        let src = self.branch(source)?;
        let cut = src
            .messages
            .iter()
            .position(|m| m == at)
            .ok_or_else(|| ChatError::MessageNotFound(at.clone()))?;
        let prefix: Vec<MessageId> = src.messages[..=cut].to_vec();

        // Resolve the whole prefix before mutating anything.
        for id in &prefix {
            if !store.contains(id) {
                return Err(ChatError::MessageNotFound(id.clone()));
            }
        }

        let id = BranchId(self.branches.len() as u32);
        for message in &prefix {
            if let Some(record) = store.get_mut(message) {
                record.branches.insert(id);
            }
        }
        if let Some(record) = store.get_mut(at) {
            record.fork_points.insert(id);
        }
        self.branches.push(Branch {
            source: Some(source),
            messages: prefix,
        });

        log::debug!("forked branch {} from branch {} at message {}", id, source, at);
        Ok(id)
    }

    /// Append an existing record to the end of `branch` and record the
    /// membership. A record can sit on a branch only once.
    pub fn append(
        &mut self,
        store: &mut MessageStore,
        branch: BranchId,
        message: &MessageId,
    ) -> Result<(), ChatError> {
        if self.get(branch).is_none() {
            return Err(ChatError::BranchNotFound(branch));
        }
        let record = store
            .get_mut(message)
            .ok_or_else(|| ChatError::MessageNotFound(message.clone()))?;
        if record.branches.contains(&branch) {
            return Err(ChatError::AlreadyOnBranch {
                message: message.clone(),
                branch,
            });
        }
        record.branches.insert(branch);
        self.branches[branch.index()].messages.push(message.clone());
        Ok(())
    }

    /// Drop `message` from `branch`'s sequence, if present.
    pub(crate) fn remove_from(&mut self, branch: BranchId, message: &MessageId) {
        if let Some(b) = self.branches.get_mut(branch.index()) {
            b.messages.retain(|m| m != message);
        }
    }

    /// Branch ids from `branch` up to and including the root, in walk
    /// order. Terminates in at most `len()` steps on any valid tree.
    pub fn ancestor_chain(&self, branch: BranchId) -> Result<Vec<BranchId>, ChatError> {
        let mut chain = Vec::new();
        let mut cursor = Some(branch);
        while let Some(id) = cursor {
            if chain.len() >= self.branches.len() {
                return Err(ChatError::InvalidState(format!(
                    "ancestry of branch {} does not terminate at the root",
                    branch
                )));
            }
            chain.push(id);
            cursor = self.branch(id)?.source;
        }
        Ok(chain)
    }

    /// Ancestors of `branch` (itself included) as a set, for membership
    /// tests.
    pub fn ancestor_set(&self, branch: BranchId) -> Result<HashSet<BranchId>, ChatError> {
        Ok(self.ancestor_chain(branch)?.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Role;

    fn seeded() -> (BranchTree, MessageStore, Vec<MessageId>) {
        let mut tree = BranchTree::new();
        let mut store = MessageStore::new();
        let mut ids = Vec::new();
        for (role, text) in [
            (Role::User, "hello"),
            (Role::Assistant, "hi there"),
            (Role::User, "tell me more"),
        ] {
            let id = store.insert(role, text);
            tree.append(&mut store, BranchId::ROOT, &id).unwrap();
            ids.push(id);
        }
        (tree, store, ids)
    }

    #[test]
    fn new_tree_has_one_empty_root() {
        let tree = BranchTree::new();
        assert_eq!(tree.len(), 1);
        let root = tree.branch(BranchId::ROOT).unwrap();
        assert!(root.source.is_none());
        assert!(root.messages.is_empty());
    }

    #[test]
    fn fork_copies_prefix_through_the_fork_message() {
        let (mut tree, mut store, ids) = seeded();
        let forked = tree.fork(&mut store, BranchId::ROOT, &ids[1]).unwrap();

        assert_eq!(forked, BranchId(1));
        assert_eq!(tree.branch(forked).unwrap().messages, ids[..2].to_vec());
        assert_eq!(tree.branch(forked).unwrap().source, Some(BranchId::ROOT));

        // Copied records know the new branch; the fork point is recorded.
        assert!(store.get(&ids[0]).unwrap().is_on(forked));
        assert!(store.get(&ids[1]).unwrap().is_on(forked));
        assert!(!store.get(&ids[2]).unwrap().is_on(forked));
        assert!(store.get(&ids[1]).unwrap().fork_points.contains(&forked));
    }

    #[test]
    fn branches_diverge_after_fork() {
        let (mut tree, mut store, ids) = seeded();
        let forked = tree.fork(&mut store, BranchId::ROOT, &ids[1]).unwrap();

        let on_root = store.insert(Role::Assistant, "root only");
        tree.append(&mut store, BranchId::ROOT, &on_root).unwrap();

        assert_eq!(tree.branch(BranchId::ROOT).unwrap().messages.len(), 4);
        assert_eq!(tree.branch(forked).unwrap().messages.len(), 2);
        assert!(!store.get(&on_root).unwrap().is_on(forked));
    }

    #[test]
    fn fork_at_unknown_message_fails() {
        let (mut tree, mut store, _) = seeded();
        let missing = MessageId::from("ffffffff");
        let err = tree.fork(&mut store, BranchId::ROOT, &missing).unwrap_err();
        assert!(matches!(err, ChatError::MessageNotFound(_)));
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn fork_of_unknown_branch_fails() {
        let (mut tree, mut store, ids) = seeded();
        let err = tree.fork(&mut store, BranchId(9), &ids[0]).unwrap_err();
        assert!(matches!(err, ChatError::BranchNotFound(BranchId(9))));
    }

    #[test]
    fn append_rejects_duplicate_membership() {
        let (mut tree, mut store, ids) = seeded();
        let err = tree.append(&mut store, BranchId::ROOT, &ids[0]).unwrap_err();
        assert!(matches!(err, ChatError::AlreadyOnBranch { .. }));
        assert_eq!(tree.branch(BranchId::ROOT).unwrap().messages.len(), 3);
    }

    #[test]
    fn ancestor_chain_walks_to_the_root() {
        let (mut tree, mut store, ids) = seeded();
        let first = tree.fork(&mut store, BranchId::ROOT, &ids[1]).unwrap();
        let second = tree.fork(&mut store, first, &ids[0]).unwrap();

        let chain = tree.ancestor_chain(second).unwrap();
        assert_eq!(chain, vec![second, first, BranchId::ROOT]);

        let set = tree.ancestor_set(second).unwrap();
        assert!(set.contains(&BranchId::ROOT));
        assert!(set.contains(&second));
        assert!(!set.contains(&BranchId(9)));
    }

    #[test]
    fn branch_ids_are_monotonic() {
        let (mut tree, mut store, ids) = seeded();
        let a = tree.fork(&mut store, BranchId::ROOT, &ids[0]).unwrap();
        let b = tree.fork(&mut store, BranchId::ROOT, &ids[2]).unwrap();
        assert_eq!(a, BranchId(1));
        assert_eq!(b, BranchId(2));
    }
}
