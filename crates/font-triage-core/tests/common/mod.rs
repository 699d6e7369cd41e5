#![allow(dead_code)]

use font_triage_core::{
    CandidateId, CandidateRecord, ExtractError, Extractor, FontMetadata, IndexMeta,
    ReferenceIndex, ReferenceRecord,
};
use std::fs;
use std::path::{Path, PathBuf};

/// Reads fixtures written as JSON `FontMetadata` instead of real font bytes.
pub struct JsonExtractor;

impl Extractor for JsonExtractor {
    fn extract(&self, bytes: &[u8]) -> Result<FontMetadata, ExtractError> {
        serde_json::from_slice(bytes).map_err(|e| ExtractError::Malformed(e.to_string()))
    }
}

pub fn meta(family: &str, subfamily: &str, ps: &str, revision: f64, glyphs: u32) -> FontMetadata {
    FontMetadata {
        family: Some(family.to_string()),
        subfamily: Some(subfamily.to_string()),
        postscript_name: Some(ps.to_string()),
        full_name: Some(format!("{} {}", family, subfamily)),
        revision,
        glyph_count: glyphs,
        ..Default::default()
    }
}

pub fn write_font(root: &Path, relative: &str, metadata: &FontMetadata) -> PathBuf {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, serde_json::to_vec(metadata).unwrap()).unwrap();
    path
}

pub fn reference(path: &str, metadata: FontMetadata) -> ReferenceRecord {
    ReferenceRecord {
        path: path.to_string(),
        metadata,
        byte_size: 4096,
    }
}

pub fn index_of(records: Vec<ReferenceRecord>) -> ReferenceIndex {
    ReferenceIndex::new(
        IndexMeta {
            root_label: "/reference".to_string(),
            item_count: records.len(),
            failed_count: 0,
            last_built_at: "2026-10-19T00:00:00Z".to_string(),
        },
        records,
    )
}

pub fn candidate(file_name: &str, metadata: Option<FontMetadata>) -> CandidateRecord {
    CandidateRecord {
        id: CandidateId(format!("/incoming/{}", file_name)),
        file_name: file_name.to_string(),
        parent_dir: PathBuf::from("/incoming"),
        byte_size: 4096,
        metadata,
        extraction_error: None,
    }
}

/// Candidate backed by a real file in `dir`.
pub fn candidate_on_disk(dir: &Path, file_name: &str, content: &[u8]) -> CandidateRecord {
    fs::create_dir_all(dir).unwrap();
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
