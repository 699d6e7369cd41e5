use crate::classify::{Classifier, MatchResult};
use crate::error::{Error, Result};
use crate::index::ReferenceIndex;
use crate::model::{CandidateId, CandidateRecord};
use crate::mutation::{ApplyEngine, ApplyReport, MutationQueue, PermissionBroker};
use crate::progress::ProgressReporter;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

/// Everything one triage pass works on: an index snapshot, the live candidate
/// set, pending intents and the single-writer apply slot.
///
/// Methods take `&self` so a session can be shared; classification only reads
/// the snapshot, and apply serializes itself through the engine guard.
pub struct TriageSession {
    index: Arc<ReferenceIndex>,
    classifier: Classifier,
    candidates: Mutex<BTreeMap<CandidateId, CandidateRecord>>,
    queue: Mutex<MutationQueue>,
    engine: ApplyEngine,
}

impl TriageSession {
    pub fn new(
        index: Arc<ReferenceIndex>,
        classifier: Classifier,
        staging_dir_name: &str,
        candidates: Vec<CandidateRecord>,
    ) -> Self {
        Self {
            index,
            classifier,
            candidates: Mutex::new(by_id(candidates)),
            queue: Mutex::new(MutationQueue::new()),
            engine: ApplyEngine::new(staging_dir_name),
        }
    }

    pub fn index(&self) -> &Arc<ReferenceIndex> {
        &self.index
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    /// Swap in the result of a rescan. Pending intents are kept; any whose
    /// identity disappeared are dropped at the next apply.
    pub fn replace_candidates(&self, candidates: Vec<CandidateRecord>) -> Result<()> {
        *lock(&self.candidates)? = by_id(candidates);
        Ok(())
    }

    /// Snapshot of the live candidate set in identity order.
    pub fn candidates(&self) -> Result<Vec<CandidateRecord>> {
        Ok(lock(&self.candidates)?.values().cloned().collect())
    }

    pub fn candidate_count(&self) -> Result<usize> {
        Ok(lock(&self.candidates)?.len())
    }

    pub fn classify_all(&self, reporter: &dyn ProgressReporter) -> Result<Vec<MatchResult>> {
        let candidates = self.candidates()?;
        Ok(self.classifier.classify_all(&candidates, &self.index, reporter))
    }

    pub fn queue_rename(&self, id: &CandidateId, name: &str) -> Result<bool> {
        self.ensure_live(id)?;
        Ok(lock(&self.queue)?.queue_rename(id.clone(), name))
    }

    pub fn queue_removal(&self, id: &CandidateId) -> Result<bool> {
        self.ensure_live(id)?;
        Ok(lock(&self.queue)?.queue_removal(id.clone()))
    }

    pub fn cancel(&self, id: &CandidateId) -> Result<bool> {
        Ok(lock(&self.queue)?.cancel(id))
    }

    pub fn pending(&self) -> Result<MutationQueue> {
        Ok(lock(&self.queue)?.clone())
    }

    pub fn restore_queue(&self, queue: MutationQueue) -> Result<()> {
        *lock(&self.queue)? = queue;
        Ok(())
    }

    /// Commit every pending intent, then drop finished identities from the
    /// queue and consumed candidates from the live set.
    ///
    /// An intent changed while the apply ran was not the one executed, so it
    /// stays queued.
    pub fn apply(
        &self,
        broker: &dyn PermissionBroker,
        reporter: &dyn ProgressReporter,
    ) -> Result<ApplyReport> {
        let guard = self.engine.begin()?;

        let snapshot = self.pending()?;
        let live = lock(&self.candidates)?.clone();
        let report = self.engine.execute(&guard, &snapshot, &live, broker, reporter)?;

        let mut queue = lock(&self.queue)?;
        let mut candidates = lock(&self.candidates)?;
        for (id, outcome) in &report.outcomes {
            if outcome.clears_intent() {
                if queue.same_intent(&snapshot, id) {
                    queue.cancel(id);
                } else {
                    debug!("Keeping {}: intent changed during apply", id);
                }
            }
            if outcome.consumed_candidate() {
                candidates.remove(id);
            }
        }
        info!(
            "Reconciled apply: {} candidates live, {} identities still queued",
            candidates.len(),
            queue.len()
        );
        Ok(report)
    }

    fn ensure_live(&self, id: &CandidateId) -> Result<()> {
        if lock(&self.candidates)?.contains_key(id) {
            Ok(())
        } else {
            debug!("Rejecting intent for unknown candidate {}", id);
            Err(Error::UnknownCandidate(id.to_string()))
        }
    }
}

fn by_id(candidates: Vec<CandidateRecord>) -> BTreeMap<CandidateId, CandidateRecord> {
    candidates.into_iter().map(|c| (c.id.clone(), c)).collect()
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|e| Error::Other(format!("Failed to lock session state: {}", e)))
}
