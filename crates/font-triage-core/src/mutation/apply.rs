use super::queue::{MutationQueue, PlannedOp};
use super::{Permission, PermissionBroker};
use crate::error::{Error, Result};
use crate::model::{CandidateId, CandidateRecord};
use crate::progress::{Phase, ProgressEvent, ProgressReporter};
use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tracing::{debug, info, warn};

const MAX_STAGING_ATTEMPTS: usize = 1000;

/// Result of applying one identity's intent.
#[derive(Debug, Clone, PartialEq)]
pub enum ItemOutcome {
    Renamed { to: PathBuf },
    /// Moved into the recoverable staging directory.
    Removed { staged_at: PathBuf },
    /// Target empty or unchanged; nothing to do.
    NoOp,
    /// Not attempted; the intent stays queued.
    Skipped { reason: String },
    /// Attempted and failed; the intent stays queued.
    Failed { error: String },
    /// The identity is no longer in the live candidate set.
    Missing,
}

impl ItemOutcome {
    /// Whether the intent is finished and should leave the queue.
    pub fn clears_intent(&self) -> bool {
        matches!(
            self,
            ItemOutcome::Renamed { .. } | ItemOutcome::Removed { .. } | ItemOutcome::NoOp | ItemOutcome::Missing
        )
    }

    /// Whether the candidate's original file is gone from disk.
    pub fn consumed_candidate(&self) -> bool {
        matches!(self, ItemOutcome::Renamed { .. } | ItemOutcome::Removed { .. })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApplyReport {
    pub renamed: usize,
    pub removed: usize,
    pub skipped: usize,
    /// First failure observed, in apply order.
    pub first_error: Option<String>,
    pub outcomes: Vec<(CandidateId, ItemOutcome)>,
}

impl ApplyReport {
    pub fn failed(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, o)| matches!(o, ItemOutcome::Failed { .. }))
            .count()
    }

    fn record(&mut self, id: CandidateId, outcome: ItemOutcome) {
        match &outcome {
            ItemOutcome::Renamed { .. } => self.renamed += 1,
            ItemOutcome::Removed { .. } => self.removed += 1,
            ItemOutcome::Skipped { .. } => self.skipped += 1,
            ItemOutcome::Failed { error } => {
                if self.first_error.is_none() {
                    self.first_error = Some(format!("{}: {}", id, error));
                }
            }
            ItemOutcome::NoOp | ItemOutcome::Missing => {}
        }
        self.outcomes.push((id, outcome));
    }
}

/// Held for the duration of one apply; releases the single-writer slot on drop.
pub struct ApplyGuard<'a> {
    flag: &'a AtomicBool,
}

impl Drop for ApplyGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Commits queued intents to disk, one at a time.
///
/// Renames are done as create-new + copy + remove-original so that a crash
/// leaves a duplicate, never a gap. Removals are moves into a staging
/// directory inside the same parent; nothing is ever deleted outright.
#[derive(Debug)]
pub struct ApplyEngine {
    in_flight: AtomicBool,
    staging_dir_name: String,
}

impl ApplyEngine {
    pub fn new(staging_dir_name: impl Into<String>) -> Self {
        Self {
            in_flight: AtomicBool::new(false),
            staging_dir_name: staging_dir_name.into(),
        }
    }

    pub fn staging_dir_name(&self) -> &str {
        &self.staging_dir_name
    }

    pub fn is_running(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Claim the single-writer slot. A second caller is rejected, not queued.
    pub fn begin(&self) -> Result<ApplyGuard<'_>> {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| Error::ApplyInProgress)?;
        Ok(ApplyGuard {
            flag: &self.in_flight,
        })
    }

    /// Run preflight, then every rename, then every removal.
    ///
    /// Returns `Err` only for whole-batch preconditions; per-item failures
    /// are recorded in the report.
    pub fn execute(
        &self,
        _guard: &ApplyGuard<'_>,
        queue: &MutationQueue,
        live: &BTreeMap<CandidateId, CandidateRecord>,
        broker: &dyn PermissionBroker,
        reporter: &dyn ProgressReporter,
    ) -> Result<ApplyReport> {
        let start = Instant::now();
        let mut report = ApplyReport::default();

        let mut plan: Vec<(&CandidateRecord, PlannedOp)> = Vec::new();
        for id in queue.pending_ids() {
            match (live.get(&id), queue.planned_op(&id)) {
                (Some(candidate), Some(op)) => plan.push((candidate, op)),
                _ => {
                    warn!("Dropping intent for {}: not in the live candidate set", id);
                    report.record(id, ItemOutcome::Missing);
                }
            }
        }

        // Rename phase before removal phase; identity order within each.
        plan.sort_by_key(|(_, op)| matches!(op, PlannedOp::Remove));

        self.preflight(&plan, broker)?;

        let total = plan.len();
        reporter.on_phase_start(Phase::Apply, total);
        info!("Applying {} queued operations", total);

        for (done, (candidate, op)) in plan.into_iter().enumerate() {
            let outcome = match op {
                PlannedOp::Rename(target) => rename_candidate(candidate, &target),
                PlannedOp::Remove => self.remove_candidate(candidate),
            };
            match &outcome {
                ItemOutcome::Failed { error } => warn!("Apply failed for {}: {}", candidate.id, error),
                ItemOutcome::Skipped { reason } => warn!("Skipped {}: {}", candidate.id, reason),
                other => debug!("{}: {:?}", candidate.id, other),
            }
            reporter.on_progress(&ProgressEvent {
                phase: Phase::Apply,
                processed_count: done + 1,
                total_count: total,
                current_label: &candidate.file_name,
            });
            report.record(candidate.id.clone(), outcome);
        }

        reporter.on_phase_complete(Phase::Apply, total, start.elapsed().as_secs_f64());
        info!(
            "Apply finished: {} renamed, {} removed, {} skipped, {} failed",
            report.renamed,
            report.removed,
            report.skipped,
            report.failed()
        );
        Ok(report)
    }

    /// Every touched parent must be writable before anything is mutated.
    fn preflight(
        &self,
        plan: &[(&CandidateRecord, PlannedOp)],
        broker: &dyn PermissionBroker,
    ) -> Result<()> {
        let dirs: BTreeSet<&Path> = plan
            .iter()
            .map(|(candidate, _)| candidate.parent_dir.as_path())
            .collect();

        for dir in dirs {
            match broker.request_write(dir)? {
                Permission::Granted => debug!("Write permission granted for {}", dir.display()),
                Permission::Denied => {
                    warn!("Write permission denied for {}, aborting apply", dir.display());
                    return Err(Error::PermissionDenied(dir.to_path_buf()));
                }
            }
        }
        Ok(())
    }

    fn remove_candidate(&self, candidate: &CandidateRecord) -> ItemOutcome {
        let source = candidate.path();
        let staging = candidate.parent_dir.join(&self.staging_dir_name);

        let staged = match fs::create_dir_all(&staging)
            .and_then(|_| copy_to_staging(&source, &staging, candidate))
        {
            Ok(staged) => staged,
            Err(e) => {
                return ItemOutcome::Failed {
                    error: format!("could not stage copy: {}", e),
                }
            }
        };

        match fs::remove_file(&source) {
            Ok(()) => {
                info!("Removed {} (staged at {})", source.display(), staged.display());
                ItemOutcome::Removed { staged_at: staged }
            }
            Err(e) => ItemOutcome::Failed {
                error: format!(
                    "staged at {} but could not remove original: {}",
                    staged.display(),
                    e
                ),
            },
        }
    }
}

fn rename_candidate(candidate: &CandidateRecord, target: &str) -> ItemOutcome {
    let target = target.trim();
    if target.is_empty() || target == candidate.file_name {
        return ItemOutcome::NoOp;
    }
    if target.contains(['/', '\\']) || target == "." || target == ".." {
        return ItemOutcome::Skipped {
            reason: format!("target name '{}' contains a path separator", target),
        };
    }

    let source = candidate.path();
    let destination = candidate.parent_dir.join(target);

    if let Err(e) = copy_to_new(&source, &destination) {
        let error = if e.kind() == io::ErrorKind::AlreadyExists {
            format!("destination '{}' already exists", destination.display())
        } else {
            format!("could not write '{}': {}", destination.display(), e)
        };
        return ItemOutcome::Failed { error };
    }

    match fs::remove_file(&source) {
        Ok(()) => {
            info!("Renamed {} -> {}", source.display(), destination.display());
            ItemOutcome::Renamed { to: destination }
        }
        Err(e) => ItemOutcome::Failed {
            error: format!(
                "copied to {} but could not remove original: {}",
                destination.display(),
                e
            ),
        },
    }
}

/// Create `destination` (failing if it exists) and fill it from `source`.
/// A partial destination is removed on failure; `source` is never touched.
fn copy_to_new(source: &Path, destination: &Path) -> io::Result<()> {
    let mut output = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(destination)?;

    let copied = File::open(source)
        .and_then(|mut input| io::copy(&mut input, &mut output))
        .and_then(|_| output.sync_all());

    if let Err(e) = copied {
        drop(output);
        if let Err(cleanup) = fs::remove_file(destination) {
            warn!("Could not clean up {}: {}", destination.display(), cleanup);
        }
        return Err(e);
    }
    Ok(())
}

/// Copy into `staging` under a timestamped name, bumping a counter until the
/// name is free.
fn copy_to_staging(source: &Path, staging: &Path, candidate: &CandidateRecord) -> io::Result<PathBuf> {
    let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S").to_string();
    let stem = candidate.file_stem();
    let extension = match candidate.file_name.rsplit_once('.') {
        Some((s, ext)) if !s.is_empty() => format!(".{}", ext),
        _ => String::new(),
    };

    for attempt in 0..MAX_STAGING_ATTEMPTS {
        let name = if attempt == 0 {
            format!("{}.{}{}", stem, stamp, extension)
        } else {
            format!("{}.{}-{}{}", stem, stamp, attempt, extension)
        };
        let staged = staging.join(name);
        match copy_to_new(source, &staged) {
            Ok(()) => return Ok(staged),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e),
        }
    }
    Err(io::Error::new(
        io::ErrorKind::AlreadyExists,
        format!("no free staging name for {} in {}", stem, staging.display()),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::SilentReporter;
    use crate::FsPermissionBroker;
    use tempfile::tempdir;

    fn candidate_at(dir: &Path, file_name: &str, content: &[u8]) -> CandidateRecord {
        let path = dir.join(file_name);
        fs::write(&path, content).unwrap();
        CandidateRecord {
            id: CandidateId::from_path(&path),
            file_name: file_name.to_string(),
            parent_dir: dir.to_path_buf(),
            byte_size: content.len() as u64,
            metadata: None,
            extraction_error: None,
        }
    }

    fn live(candidates: &[CandidateRecord]) -> BTreeMap<CandidateId, CandidateRecord> {
        candidates.iter().map(|c| (c.id.clone(), c.clone())).collect()
    }

    #[test]
    fn test_begin_rejects_second_apply_until_guard_drops() {
        let engine = ApplyEngine::new(".staging");
        let guard = engine.begin().unwrap();
        assert!(engine.is_running());
        assert!(matches!(engine.begin(), Err(Error::ApplyInProgress)));
        drop(guard);
        assert!(!engine.is_running());
        assert!(engine.begin().is_ok());
    }

    #[test]
    fn test_rename_noop_and_separator_rules() {
        let tmp = tempdir().unwrap();
        let c = candidate_at(tmp.path(), "A.otf", b"a");
        assert_eq!(rename_candidate(&c, "   "), ItemOutcome::NoOp);
        assert_eq!(rename_candidate(&c, " A.otf "), ItemOutcome::NoOp);
        assert!(matches!(rename_candidate(&c, "sub/B.otf"), ItemOutcome::Skipped { .. }));
        assert!(matches!(rename_candidate(&c, "sub\\B.otf"), ItemOutcome::Skipped { .. }));
        assert!(tmp.path().join("A.otf").exists());
    }

    #[test]
    fn test_rename_copies_then_removes_original() {
        let tmp = tempdir().unwrap();
        let c = candidate_at(tmp.path(), "A.otf", b"font bytes");
        let outcome = rename_candidate(&c, "B.otf");
        assert_eq!(outcome, ItemOutcome::Renamed { to: tmp.path().join("B.otf") });
        assert!(!tmp.path().join("A.otf").exists());
        assert_eq!(fs::read(tmp.path().join("B.otf")).unwrap(), b"font bytes");
    }

    #[test]
    fn test_rename_collision_leaves_both_files_untouched() {
        let tmp = tempdir().unwrap();
        let c = candidate_at(tmp.path(), "A.otf", b"new");
        fs::write(tmp.path().join("B.otf"), b"existing").unwrap();
        let outcome = rename_candidate(&c, "B.otf");
        assert!(matches!(outcome, ItemOutcome::Failed { .. }));
        assert_eq!(fs::read(tmp.path().join("A.otf")).unwrap(), b"new");
        assert_eq!(fs::read(tmp.path().join("B.otf")).unwrap(), b"existing");
    }

    #[test]
    fn test_removal_stages_unique_copies() {
        let tmp = tempdir().unwrap();
        let engine = ApplyEngine::new(".staging");

        let first = candidate_at(tmp.path(), "A.otf", b"one");
        let ItemOutcome::Removed { staged_at: staged_one } = engine.remove_candidate(&first) else {
            panic!("expected removal");
        };
        let second = candidate_at(tmp.path(), "A.otf", b"two");
        let ItemOutcome::Removed { staged_at: staged_two } = engine.remove_candidate(&second) else {
            panic!("expected removal");
        };

        assert_ne!(staged_one, staged_two);
        assert!(!tmp.path().join("A.otf").exists());
        assert!(staged_one.starts_with(tmp.path().join(".staging")));
        let mut contents = vec![fs::read(&staged_one).unwrap(), fs::read(&staged_two).unwrap()];
        contents.sort();
        assert_eq!(contents, vec![b"one".to_vec(), b"two".to_vec()]);
        assert!(staged_one.to_string_lossy().ends_with(".otf"));
    }

    #[test]
    fn test_execute_prefers_removal_and_reports_missing() {
        let tmp = tempdir().unwrap();
        let engine = ApplyEngine::new(".staging");
        let c = candidate_at(tmp.path(), "A.otf", b"a");

        let mut queue = MutationQueue::new();
        queue.queue_rename(c.id.clone(), "B.otf");
        queue.queue_removal(c.id.clone());
        queue.queue_removal(CandidateId("/gone/X.otf".to_string()));

        let guard = engine.begin().unwrap();
        let report = engine
            .execute(&guard, &queue, &live(&[c]), &FsPermissionBroker, &SilentReporter)
            .unwrap();

        assert_eq!(report.removed, 1);
        assert_eq!(report.renamed, 0);
        assert!(!tmp.path().join("B.otf").exists());
        assert!(report
            .outcomes
            .iter()
            .any(|(id, o)| id.as_str() == "/gone/X.otf" && *o == ItemOutcome::Missing));
    }
}
