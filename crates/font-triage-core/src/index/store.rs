use super::{IndexMeta, ReferenceIndex};
use crate::config::AppConfig;
use crate::error::{Error, Result};
use crate::extract::Extractor;
use crate::model::ReferenceRecord;
use crate::progress::{CancelToken, Phase, ProgressReporter};
use crate::scanner::{self, enumerate_fonts};
use crate::storage::{RecordStore, REFERENCE_COLLECTION};
use std::path::{Component, Path};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const INDEX_META_KEY: &str = "reference_index";

#[derive(Debug)]
pub struct BuildReport {
    pub meta: IndexMeta,
    pub indexed: usize,
    /// Files whose extraction failed; counted, never indexed.
    pub failed: usize,
    pub duration: Duration,
}

/// Durable, replace-on-rebuild home of the reference index.
///
/// A build accumulates every record in memory and commits once. Until that
/// commit succeeds, `load` keeps returning the previous snapshot.
pub struct IndexStore<S: RecordStore> {
    store: S,
    current: RwLock<Option<Arc<ReferenceIndex>>>,
}

impl<S: RecordStore> IndexStore<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            current: RwLock::new(None),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Enumerate and extract `root`, then atomically replace the stored index.
    pub fn build(
        &self,
        root: &Path,
        config: &AppConfig,
        extractor: &dyn Extractor,
        reporter: &dyn ProgressReporter,
        cancel: &CancelToken,
    ) -> Result<BuildReport> {
        let start = Instant::now();
        info!("Building reference index from {}", root.display());

        let paths = enumerate_fonts(
            root,
            &config.font_extensions,
            &config.ignore_patterns,
            Some(&config.staging_dir_name),
        )?;
        let extracted = scanner::extract_files(&paths, extractor, Phase::Build, reporter, cancel)?;

        let mut records = Vec::with_capacity(extracted.len());
        let mut failed = 0usize;
        for file in extracted {
            match file.metadata {
                Ok(metadata) => records.push(ReferenceRecord {
                    path: relative_key(root, &file.path),
                    metadata,
                    byte_size: file.byte_size,
                }),
                Err(e) => {
                    warn!("Excluding {} from index: {}", file.path.display(), e);
                    failed += 1;
                }
            }
        }

        let meta = IndexMeta {
            root_label: root.to_string_lossy().into_owned(),
            item_count: records.len(),
            failed_count: failed,
            last_built_at: chrono::Utc::now().to_rfc3339(),
        };

        let entries = records
            .iter()
            .map(|r| -> Result<(String, String)> {
                Ok((r.path.clone(), serde_json::to_string(r)?))
            })
            .collect::<Result<Vec<_>>>()?;
        let meta_json = serde_json::to_string(&meta)?;
        self.store
            .replace_collection(REFERENCE_COLLECTION, &entries, (INDEX_META_KEY, &meta_json))?;

        let indexed = records.len();
        let index = Arc::new(ReferenceIndex::new(meta.clone(), records));
        *self.current.write().map_err(|e| Error::Other(e.to_string()))? = Some(index);

        info!(
            "Reference index committed: {} records, {} failed extractions",
            indexed, failed
        );
        Ok(BuildReport {
            meta,
            indexed,
            failed,
            duration: start.elapsed(),
        })
    }

    /// Last committed index, or `None` if nothing was ever built.
    pub fn load(&self) -> Result<Option<Arc<ReferenceIndex>>> {
        if let Some(index) = self.current.read().map_err(|e| Error::Other(e.to_string()))?.as_ref() {
            return Ok(Some(Arc::clone(index)));
        }

        let meta = match self.load_meta()? {
            Some(meta) => meta,
            None => return Ok(None),
        };
        let records = self
            .store
            .get_all(REFERENCE_COLLECTION)?
            .into_iter()
            .map(|(_, value)| serde_json::from_str::<ReferenceRecord>(&value))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        debug!("Loaded {} reference records from store", records.len());

        let index = Arc::new(ReferenceIndex::new(meta, records));
        *self.current.write().map_err(|e| Error::Other(e.to_string()))? = Some(Arc::clone(&index));
        Ok(Some(index))
    }

    pub fn load_meta(&self) -> Result<Option<IndexMeta>> {
        match self.store.get_meta(INDEX_META_KEY)? {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    /// Discard the in-memory snapshot and rebuild from the recorded root.
    pub fn rebuild(
        &self,
        config: &AppConfig,
        extractor: &dyn Extractor,
        reporter: &dyn ProgressReporter,
        cancel: &CancelToken,
    ) -> Result<BuildReport> {
        let meta = self.load_meta()?.ok_or(Error::IndexNotBuilt)?;
        *self.current.write().map_err(|e| Error::Other(e.to_string()))? = None;
        self.build(Path::new(&meta.root_label), config, extractor, reporter, cancel)
    }
}

/// Path of `path` relative to `root`, always `/`-separated.
fn relative_key(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}
