use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};

/// Container flavour as declared by the sfnt header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FontFormat {
    TrueType,
    OpenTypeCff,
    Collection,
    Unknown,
}

/// Everything the classifier needs to know about one font face.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FontMetadata {
    pub family: Option<String>,
    pub subfamily: Option<String>,
    pub preferred_family: Option<String>,
    pub preferred_subfamily: Option<String>,
    pub postscript_name: Option<String>,
    pub full_name: Option<String>,
    /// Free-text version string. Informational only.
    pub version: Option<String>,
    pub revision: f64,
    pub glyph_count: u32,
    pub feature_tags: BTreeSet<String>,
    pub table_tags: BTreeSet<String>,
    pub format: Option<FontFormat>,
}

impl FontMetadata {
    /// Preferred (typographic) family when present, else the legacy family.
    pub fn effective_family(&self) -> Option<&str> {
        non_empty(&self.preferred_family).or_else(|| non_empty(&self.family))
    }

    pub fn effective_subfamily(&self) -> Option<&str> {
        non_empty(&self.preferred_subfamily).or_else(|| non_empty(&self.subfamily))
    }

    pub fn postscript_name(&self) -> Option<&str> {
        non_empty(&self.postscript_name)
    }

    pub fn full_name(&self) -> Option<&str> {
        non_empty(&self.full_name)
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// One curated item in the reference collection, keyed by its relative path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceRecord {
    pub path: String,
    pub metadata: FontMetadata,
    pub byte_size: u64,
}

/// Identity of a candidate: its absolute path for the lifetime of a scan session.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CandidateId(pub String);

impl CandidateId {
    pub fn from_path(path: &Path) -> Self {
        CandidateId(path.to_string_lossy().into_owned())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CandidateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One unreviewed item found by a scan.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateRecord {
    pub id: CandidateId,
    pub file_name: String,
    /// Writable parent location, required for mutation.
    pub parent_dir: PathBuf,
    pub byte_size: u64,
    /// `None` when extraction failed; see `extraction_error`.
    pub metadata: Option<FontMetadata>,
    pub extraction_error: Option<String>,
}

impl CandidateRecord {
    pub fn path(&self) -> PathBuf {
        self.parent_dir.join(&self.file_name)
    }

    /// File name without its final extension.
    pub fn file_stem(&self) -> &str {
        match self.file_name.rsplit_once('.') {
            Some((stem, _)) if !stem.is_empty() => stem,
            _ => &self.file_name,
        }
    }

    /// Full name when extraction produced one, else the file stem.
    pub fn display_name(&self) -> &str {
        self.metadata
            .as_ref()
            .and_then(|m| m.full_name())
            .unwrap_or_else(|| self.file_stem())
    }
}
