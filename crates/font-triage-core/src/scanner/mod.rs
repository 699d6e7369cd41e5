pub mod walk;

pub use walk::enumerate_fonts;

use crate::config::{self, AppConfig};
use crate::error::{Error, Result};
use crate::extract::Extractor;
use crate::model::{CandidateId, CandidateRecord, FontMetadata};
use crate::progress::{CancelToken, Phase, ProgressEvent, ProgressReporter};
use rayon::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Outcome of reading and extracting one file.
#[derive(Debug)]
pub struct ExtractedFile {
    pub path: PathBuf,
    pub byte_size: u64,
    pub metadata: Result<FontMetadata>,
}

/// Read and extract each path on the rayon pool, reporting progress per item.
///
/// Cancellation is honoured between items; an item already being extracted
/// runs to completion. Per-item failures are kept in the result, never dropped.
pub fn extract_files(
    paths: &[PathBuf],
    extractor: &dyn Extractor,
    phase: Phase,
    reporter: &dyn ProgressReporter,
    cancel: &CancelToken,
) -> Result<Vec<ExtractedFile>> {
    let total = paths.len();
    let processed = AtomicUsize::new(0);
    let start = Instant::now();
    reporter.on_phase_start(phase, total);

    let results: Vec<Option<ExtractedFile>> = paths
        .par_iter()
        .map(|path| {
            if cancel.is_cancelled() {
                return None;
            }
            let extracted = extract_file(path, extractor);
            let done = processed.fetch_add(1, Ordering::Relaxed) + 1;
            reporter.on_progress(&ProgressEvent {
                phase,
                processed_count: done,
                total_count: total,
                current_label: &path.to_string_lossy(),
            });
            Some(extracted)
        })
        .collect();

    if cancel.is_cancelled() {
        info!("{} cancelled after {} of {} items", phase, processed.into_inner(), total);
        return Err(Error::Cancelled);
    }

    let extracted: Vec<ExtractedFile> = results.into_iter().flatten().collect();
    reporter.on_phase_complete(phase, extracted.len(), start.elapsed().as_secs_f64());
    Ok(extracted)
}

fn extract_file(path: &Path, extractor: &dyn Extractor) -> ExtractedFile {
    match fs::read(path) {
        Ok(bytes) => {
            let metadata = extractor.extract(&bytes).map_err(Error::from);
            if let Err(e) = &metadata {
                warn!("Extraction failed for {}: {}", path.display(), e);
            } else {
                debug!("Extracted {}", path.display());
            }
            ExtractedFile {
                path: path.to_path_buf(),
                byte_size: bytes.len() as u64,
                metadata,
            }
        }
        Err(e) => {
            warn!("Error reading {}: {}", path.display(), e);
            ExtractedFile {
                path: path.to_path_buf(),
                byte_size: 0,
                metadata: Err(Error::Io(e)),
            }
        }
    }
}

/// Enumerate the configured candidate roots and extract every font found.
pub fn scan_candidates(
    config: &AppConfig,
    extractor: &dyn Extractor,
    reporter: &dyn ProgressReporter,
    cancel: &CancelToken,
) -> Result<Vec<CandidateRecord>> {
    let roots = config::non_overlapping_directories(config.candidate_roots.clone());
    info!("Scanning candidate roots: {:?}", roots);

    let mut paths = Vec::new();
    for root in &roots {
        paths.extend(enumerate_fonts(
            Path::new(root),
            &config.font_extensions,
            &config.ignore_patterns,
            Some(&config.staging_dir_name),
        )?);
    }

    let extracted = extract_files(&paths, extractor, Phase::Scan, reporter, cancel)?;
    let candidates: Vec<CandidateRecord> = extracted.into_iter().map(into_candidate).collect();
    info!("Scan found {} candidates", candidates.len());
    Ok(candidates)
}

fn into_candidate(file: ExtractedFile) -> CandidateRecord {
    let file_name = file
        .path
        .file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_default();
    let parent_dir = file.path.parent().map(Path::to_path_buf).unwrap_or_default();
    let (metadata, extraction_error) = match file.metadata {
        Ok(m) => (Some(m), None),
        Err(e) => (None, Some(e.to_string())),
    };
    CandidateRecord {
        id: CandidateId::from_path(&file.path),
        file_name,
        parent_dir,
        byte_size: file.byte_size,
        metadata,
        extraction_error,
    }
}
