mod common;

use common::{candidate_on_disk, index_of};
use font_triage_core::{
    Classifier, ClassifyConfig, Error, FsPermissionBroker, ItemOutcome, Permission,
    PermissionBroker, SilentReporter, TriageSession,
};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::tempdir;

const STAGING: &str = ".font-triage-removed";

fn session(candidates: Vec<font_triage_core::CandidateRecord>) -> TriageSession {
    TriageSession::new(
        Arc::new(index_of(Vec::new())),
        Classifier::new(&ClassifyConfig::default()).unwrap(),
        STAGING,
        candidates,
    )
}

/// Grants everything except one directory, and records what it was asked.
struct DenyDir {
    denied: PathBuf,
    asked: Mutex<Vec<PathBuf>>,
}

impl PermissionBroker for DenyDir {
    fn request_write(&self, dir: &Path) -> io::Result<Permission> {
        self.asked.lock().unwrap().push(dir.to_path_buf());
        if dir == self.denied {
            Ok(Permission::Denied)
        } else {
            Ok(Permission::Granted)
        }
    }
}

#[test]
fn test_denied_directory_aborts_before_any_mutation() {
    let tmp = tempdir().unwrap();
    let dir_a = tmp.path().join("a");
    let dir_b = tmp.path().join("b");
    let in_a = candidate_on_disk(&dir_a, "Alpha.otf", b"alpha");
    let in_b = candidate_on_disk(&dir_b, "Beta.otf", b"beta");
    let session = session(vec![in_a.clone(), in_b.clone()]);

    session.queue_rename(&in_a.id, "Alpha-Renamed.otf").unwrap();
    session.queue_removal(&in_b.id).unwrap();

    let broker = DenyDir {
        denied: dir_b.clone(),
        asked: Mutex::new(Vec::new()),
    };
    let result = session.apply(&broker, &SilentReporter);
    assert!(matches!(result, Err(Error::PermissionDenied(ref d)) if *d == dir_b));

    assert!(dir_a.join("Alpha.otf").exists());
    assert!(!dir_a.join("Alpha-Renamed.otf").exists());
    assert!(dir_b.join("Beta.otf").exists());
    assert!(!dir_b.join(STAGING).exists());

    let pending = session.pending().unwrap();
    assert_eq!(pending.pending_rename(&in_a.id), Some("Alpha-Renamed.otf"));
    assert!(pending.is_removal_pending(&in_b.id));
    assert_eq!(session.candidate_count().unwrap(), 2);
}

#[test]
fn test_each_directory_is_asked_once() {
    let tmp = tempdir().unwrap();
    let first = candidate_on_disk(tmp.path(), "One.otf", b"1");
    let second = candidate_on_disk(tmp.path(), "Two.otf", b"2");
    let session = session(vec![first.clone(), second.clone()]);
    session.queue_removal(&first.id).unwrap();
    session.queue_removal(&second.id).unwrap();

    let broker = DenyDir {
        denied: tmp.path().join("elsewhere"),
        asked: Mutex::new(Vec::new()),
    };
    let report = session.apply(&broker, &SilentReporter).unwrap();
    assert_eq!(report.removed, 2);
    assert_eq!(*broker.asked.lock().unwrap(), vec![tmp.path().to_path_buf()]);
}

#[test]
fn test_collision_fails_one_item_and_applies_the_rest() {
    let tmp = tempdir().unwrap();
    let a = candidate_on_disk(tmp.path(), "A.otf", b"a");
    let b = candidate_on_disk(tmp.path(), "B.otf", b"b");
    fs::write(tmp.path().join("Taken.otf"), b"occupied").unwrap();
    let session = session(vec![a.clone(), b.clone()]);

    session.queue_rename(&a.id, "Taken.otf").unwrap();
    session.queue_rename(&b.id, "B-Regular.otf").unwrap();

    let report = session.apply(&FsPermissionBroker, &SilentReporter).unwrap();
    assert_eq!(report.renamed, 1);
    assert_eq!(report.failed(), 1);
    assert!(report.first_error.as_deref().unwrap().contains("already exists"));

    assert_eq!(fs::read(tmp.path().join("Taken.otf")).unwrap(), b"occupied");
    assert_eq!(fs::read(tmp.path().join("A.otf")).unwrap(), b"a");
    assert_eq!(fs::read(tmp.path().join("B-Regular.otf")).unwrap(), b"b");

    let pending = session.pending().unwrap();
    assert_eq!(pending.pending_rename(&a.id), Some("Taken.otf"));
    assert_eq!(pending.len(), 1);
}

#[test]
fn test_removal_takes_precedence_over_rename() {
    let tmp = tempdir().unwrap();
    let c = candidate_on_disk(tmp.path(), "Both.otf", b"both");
    let session = session(vec![c.clone()]);
    session.queue_rename(&c.id, "Renamed.otf").unwrap();
    session.queue_removal(&c.id).unwrap();

    let report = session.apply(&FsPermissionBroker, &SilentReporter).unwrap();
    assert_eq!(report.removed, 1);
    assert_eq!(report.renamed, 0);
    assert!(!tmp.path().join("Renamed.otf").exists());
    assert!(!tmp.path().join("Both.otf").exists());
    assert_eq!(fs::read_dir(tmp.path().join(STAGING)).unwrap().count(), 1);
    assert!(session.pending().unwrap().is_empty());
}

#[test]
fn test_requeueing_same_intent_is_idempotent() {
    let tmp = tempdir().unwrap();
    let c = candidate_on_disk(tmp.path(), "Same.otf", b"same");
    let session = session(vec![c.clone()]);

    assert!(session.queue_rename(&c.id, "Other.otf").unwrap());
    assert!(!session.queue_rename(&c.id, "Other.otf").unwrap());
    assert!(session.queue_removal(&c.id).unwrap());
    assert!(!session.queue_removal(&c.id).unwrap());
    assert_eq!(session.pending().unwrap().len(), 1);
}

#[test]
fn test_cancelled_intent_is_not_applied() {
    let tmp = tempdir().unwrap();
    let c = candidate_on_disk(tmp.path(), "Keep.otf", b"keep");
    let session = session(vec![c.clone()]);
    session.queue_removal(&c.id).unwrap();
    assert!(session.cancel(&c.id).unwrap());

    let report = session.apply(&FsPermissionBroker, &SilentReporter).unwrap();
    assert!(report.outcomes.is_empty());
    assert!(tmp.path().join("Keep.otf").exists());
}

#[test]
fn test_vanished_candidate_is_reported_missing_and_dropped() {
    let tmp = tempdir().unwrap();
    let gone = candidate_on_disk(tmp.path(), "Gone.otf", b"gone");
    let stay = candidate_on_disk(tmp.path(), "Stay.otf", b"stay");
    let session = session(vec![gone.clone(), stay.clone()]);
    session.queue_removal(&gone.id).unwrap();

    session.replace_candidates(vec![stay]).unwrap();
    let report = session.apply(&FsPermissionBroker, &SilentReporter).unwrap();

    assert_eq!(report.outcomes, vec![(gone.id.clone(), ItemOutcome::Missing)]);
    assert!(session.pending().unwrap().is_empty());
    assert!(tmp.path().join("Gone.otf").exists());
}

#[test]
fn test_renames_run_before_removals() {
    let tmp = tempdir().unwrap();
    let old = candidate_on_disk(tmp.path(), "A-Old.otf", b"old");
    let new = candidate_on_disk(tmp.path(), "Z-New.otf", b"new");
    let session = session(vec![old.clone(), new.clone()]);

    session.queue_removal(&old.id).unwrap();
    session.queue_rename(&new.id, "A-Old.otf").unwrap();

    let report = session.apply(&FsPermissionBroker, &SilentReporter).unwrap();
    assert_eq!(report.outcomes[0].0, new.id);
    assert!(matches!(report.outcomes[0].1, ItemOutcome::Failed { .. }));
    assert_eq!(report.removed, 1);

    assert!(!tmp.path().join("A-Old.otf").exists());
    assert!(tmp.path().join("Z-New.otf").exists());
    assert_eq!(session.pending().unwrap().pending_rename(&new.id), Some("A-Old.otf"));
}
