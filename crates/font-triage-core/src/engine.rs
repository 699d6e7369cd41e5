use crate::classify::Classifier;
use crate::config::AppConfig;
use crate::error::{Error, Result};
use crate::extract::{Extractor, SfntExtractor};
use crate::index::{BuildReport, IndexMeta, IndexStore};
use crate::mutation::{ApplyReport, MutationQueue, PermissionBroker};
use crate::progress::{CancelToken, ProgressReporter};
use crate::scanner;
use crate::session::TriageSession;
use crate::storage::{RecordStore, SqliteStore, INTENT_COLLECTION};
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{debug, info};

const INTENTS_META_KEY: &str = "intents_saved_at";

/// Wires configuration, the persistent store and the extractor together and
/// hands out sessions.
pub struct TriageEngine<S: RecordStore = SqliteStore> {
    config: AppConfig,
    index_store: IndexStore<S>,
    extractor: Box<dyn Extractor>,
    cancel: CancelToken,
}

#[derive(Debug)]
pub struct SessionStats {
    pub scan_duration: Duration,
    pub candidates: usize,
    pub extraction_failures: usize,
    pub restored_intents: usize,
}

impl TriageEngine<SqliteStore> {
    /// Open the configured SQLite database.
    pub fn open(config: AppConfig) -> Result<Self> {
        let store = SqliteStore::open(&config.db_path)?;
        Ok(Self::with_store(config, store))
    }
}

impl<S: RecordStore> TriageEngine<S> {
    pub fn with_store(config: AppConfig, store: S) -> Self {
        Self {
            config,
            index_store: IndexStore::new(store),
            extractor: Box::new(SfntExtractor),
            cancel: CancelToken::new(),
        }
    }

    pub fn with_extractor(mut self, extractor: Box<dyn Extractor>) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        self.index_store.store()
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Build the reference index from the configured reference root.
    pub fn build_index(&self, reporter: &dyn ProgressReporter) -> Result<BuildReport> {
        let root = self
            .config
            .reference_root
            .as_deref()
            .ok_or_else(|| Error::Other("reference_root is not configured".to_string()))?;
        self.cancel.reset();
        self.index_store
            .build(Path::new(root), &self.config, self.extractor.as_ref(), reporter, &self.cancel)
    }

    pub fn rebuild_index(&self, reporter: &dyn ProgressReporter) -> Result<BuildReport> {
        self.cancel.reset();
        self.index_store
            .rebuild(&self.config, self.extractor.as_ref(), reporter, &self.cancel)
    }

    pub fn index_info(&self) -> Result<Option<IndexMeta>> {
        self.index_store.load_meta()
    }

    /// Load the committed index, scan candidates and restore persisted intents.
    pub fn open_session(&self, reporter: &dyn ProgressReporter) -> Result<(TriageSession, SessionStats)> {
        let index = self.index_store.load()?.ok_or(Error::IndexNotBuilt)?;
        let classifier = Classifier::new(&self.config.classify)?;

        self.cancel.reset();
        let scan_start = Instant::now();
        let candidates =
            scanner::scan_candidates(&self.config, self.extractor.as_ref(), reporter, &self.cancel)?;
        let scan_duration = scan_start.elapsed();

        let extraction_failures = candidates.iter().filter(|c| c.metadata.is_none()).count();
        let candidate_count = candidates.len();
        let session = TriageSession::new(index, classifier, &self.config.staging_dir_name, candidates);

        let queue = self.load_intents()?;
        let restored_intents = queue.len();
        session.restore_queue(queue)?;
        debug!("Restored {} pending intents", restored_intents);

        Ok((
            session,
            SessionStats {
                scan_duration,
                candidates: candidate_count,
                extraction_failures,
                restored_intents,
            },
        ))
    }

    pub fn load_intents(&self) -> Result<MutationQueue> {
        let entries = self.store().get_all(INTENT_COLLECTION)?;
        MutationQueue::from_entries(&entries)
    }

    /// Persist the session's pending intents, replacing what was stored.
    pub fn save_intents(&self, session: &TriageSession) -> Result<usize> {
        let entries = session.pending()?.to_entries()?;
        let now = chrono::Utc::now().to_rfc3339();
        let count = self
            .store()
            .replace_collection(INTENT_COLLECTION, &entries, (INTENTS_META_KEY, &now))?;
        debug!("Saved {} pending intents", count);
        Ok(count)
    }

    /// Apply the session's queue and persist whatever is still pending.
    pub fn apply(
        &self,
        session: &TriageSession,
        broker: &dyn PermissionBroker,
        reporter: &dyn ProgressReporter,
    ) -> Result<ApplyReport> {
        let report = session.apply(broker, reporter)?;
        let remaining = self.save_intents(session)?;
        info!("{} identities remain queued after apply", remaining);
        Ok(report)
    }
}
