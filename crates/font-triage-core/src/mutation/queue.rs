use crate::error::Result;
use crate::model::CandidateId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Pending rename/removal intents, keyed by candidate identity.
///
/// The two intents are independent: an identity can be unqueued, have a
/// pending rename, a pending removal, or both. When both are set the removal
/// wins at apply time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MutationQueue {
    renames: BTreeMap<CandidateId, String>,
    removals: BTreeSet<CandidateId>,
}

/// What gets persisted for one identity: descriptive data only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct StoredIntent {
    rename: Option<String>,
    remove: bool,
}

/// The work apply will do for one identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlannedOp {
    Rename(String),
    Remove,
}

impl MutationQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue or overwrite a rename. The target is stored trimmed. Returns
    /// `false` when the same target was already pending.
    pub fn queue_rename(&mut self, id: CandidateId, name: impl Into<String>) -> bool {
        let name = name.into().trim().to_string();
        match self.renames.get(&id) {
            Some(existing) if *existing == name => false,
            _ => {
                self.renames.insert(id, name);
                true
            }
        }
    }

    pub fn queue_removal(&mut self, id: CandidateId) -> bool {
        self.removals.insert(id)
    }

    pub fn cancel_rename(&mut self, id: &CandidateId) -> bool {
        self.renames.remove(id).is_some()
    }

    pub fn cancel_removal(&mut self, id: &CandidateId) -> bool {
        self.removals.remove(id)
    }

    /// Drop every intent for `id`.
    pub fn cancel(&mut self, id: &CandidateId) -> bool {
        let renamed = self.cancel_rename(id);
        let removed = self.cancel_removal(id);
        renamed || removed
    }

    pub fn pending_rename(&self, id: &CandidateId) -> Option<&str> {
        self.renames.get(id).map(String::as_str)
    }

    pub fn is_removal_pending(&self, id: &CandidateId) -> bool {
        self.removals.contains(id)
    }

    pub fn is_empty(&self) -> bool {
        self.renames.is_empty() && self.removals.is_empty()
    }

    /// Distinct identities with at least one pending intent, in sorted order.
    pub fn pending_ids(&self) -> BTreeSet<CandidateId> {
        self.renames
            .keys()
            .chain(self.removals.iter())
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.pending_ids().len()
    }

    /// The single operation apply performs for `id`; removal takes precedence.
    pub fn planned_op(&self, id: &CandidateId) -> Option<PlannedOp> {
        if self.removals.contains(id) {
            Some(PlannedOp::Remove)
        } else {
            self.renames.get(id).map(|name| PlannedOp::Rename(name.clone()))
        }
    }

    /// Whether `id` has exactly the same intents here as in `other`.
    pub fn same_intent(&self, other: &MutationQueue, id: &CandidateId) -> bool {
        self.renames.get(id) == other.renames.get(id)
            && self.removals.contains(id) == other.removals.contains(id)
    }

    pub fn renames(&self) -> impl Iterator<Item = (&CandidateId, &str)> {
        self.renames.iter().map(|(id, name)| (id, name.as_str()))
    }

    pub fn removals(&self) -> impl Iterator<Item = &CandidateId> {
        self.removals.iter()
    }

    pub fn to_entries(&self) -> Result<Vec<(String, String)>> {
        self.pending_ids()
            .into_iter()
            .map(|id| -> Result<(String, String)> {
                let stored = StoredIntent {
                    rename: self.renames.get(&id).cloned(),
                    remove: self.removals.contains(&id),
                };
                Ok((id.0, serde_json::to_string(&stored)?))
            })
            .collect()
    }

    pub fn from_entries(entries: &[(String, String)]) -> Result<Self> {
        let mut queue = Self::new();
        for (key, value) in entries {
            let stored: StoredIntent = serde_json::from_str(value)?;
            let id = CandidateId(key.clone());
            if let Some(name) = stored.rename {
                queue.queue_rename(id.clone(), name);
            }
            if stored.remove {
                queue.queue_removal(id);
            }
        }
        Ok(queue)
    }
}
