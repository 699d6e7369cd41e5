use crate::config::ClassifyConfig;
use crate::error::{Error, Result};
use crate::index::ReferenceIndex;
use crate::model::{CandidateId, CandidateRecord, FontMetadata, ReferenceRecord};
use crate::progress::{Phase, ProgressEvent, ProgressReporter};
use rayon::prelude::*;
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

/// Revisions are rounded to 3 decimals on extraction; anything smaller is noise.
const REVISION_EPSILON: f64 = 1e-6;

/// Confidence tier at which a candidate was paired with a reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum MatchLevel {
    /// L1: identical PostScript name.
    PostScriptName,
    /// L2: identical full name.
    FullName,
    /// L3: identical (family, subfamily), preferred names first.
    FamilyStyle,
    /// L4: family only, style unconfirmed.
    FamilyOnly,
    /// L5: nothing matched.
    Unmatched,
}

impl MatchLevel {
    pub fn tier(self) -> u8 {
        match self {
            MatchLevel::PostScriptName => 1,
            MatchLevel::FullName => 2,
            MatchLevel::FamilyStyle => 3,
            MatchLevel::FamilyOnly => 4,
            MatchLevel::Unmatched => 5,
        }
    }

    /// L1 to L3: the reference is the same face.
    pub fn is_confirmed(self) -> bool {
        self.tier() <= 3
    }
}

impl fmt::Display for MatchLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.tier())
    }
}

/// Suggested triage action for one candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Verdict {
    Conflict,
    Problem,
    Skip,
    Upgrade,
    Review,
    New,
}

impl Verdict {
    pub const ALL: [Verdict; 6] = [
        Verdict::Conflict,
        Verdict::Problem,
        Verdict::Review,
        Verdict::Upgrade,
        Verdict::New,
        Verdict::Skip,
    ];

    /// Higher is more severe: CONFLICT > PROBLEM > REVIEW > UPGRADE > NEW > SKIP.
    pub fn severity(self) -> u8 {
        match self {
            Verdict::Conflict => 5,
            Verdict::Problem => 4,
            Verdict::Review => 3,
            Verdict::Upgrade => 2,
            Verdict::New => 1,
            Verdict::Skip => 0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Verdict::Conflict => "CONFLICT",
            Verdict::Problem => "PROBLEM",
            Verdict::Skip => "SKIP",
            Verdict::Upgrade => "UPGRADE",
            Verdict::Review => "REVIEW",
            Verdict::New => "NEW",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Verdict {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Verdict::ALL
            .into_iter()
            .find(|v| v.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| Error::Other(format!("unknown verdict '{}'", s)))
    }
}

/// Outcome of classifying one candidate. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchResult {
    pub candidate_id: CandidateId,
    /// Path of the matched reference record, if any.
    pub reference_path: Option<String>,
    pub level: MatchLevel,
    pub verdict: Verdict,
    pub version_delta: Option<f64>,
    pub glyph_delta: Option<i64>,
    pub size_delta: Option<i64>,
    /// Symmetric difference of structural table tags.
    pub table_delta: BTreeSet<String>,
    pub feature_delta: BTreeSet<String>,
    pub name_conflict: bool,
    pub trial_keyword: bool,
}

struct Deltas {
    version: f64,
    glyph: i64,
}

/// Pairs candidates with the reference index and assigns verdicts.
///
/// Holds no mutable state; one classifier can be shared across threads and
/// classifying the same inputs always yields the same result.
#[derive(Debug, Clone)]
pub struct Classifier {
    glyph_threshold: i64,
    trial_keywords: Vec<String>,
    conflict_pattern: Regex,
}

impl Classifier {
    pub fn new(config: &ClassifyConfig) -> Result<Self> {
        Ok(Self {
            glyph_threshold: config.glyph_delta_threshold.abs(),
            trial_keywords: config
                .trial_keywords
                .iter()
                .map(|k| k.trim().to_lowercase())
                .filter(|k| !k.is_empty())
                .collect(),
            conflict_pattern: Regex::new(&config.conflict_suffix_pattern)?,
        })
    }

    pub fn classify(&self, candidate: &CandidateRecord, index: &ReferenceIndex) -> MatchResult {
        let name_conflict = self.has_name_conflict(candidate);
        let trial_keyword = self.has_trial_keyword(candidate);

        let (level, reference) = match &candidate.metadata {
            Some(meta) => find_match(meta, index),
            None => (MatchLevel::Unmatched, None),
        };

        let mut result = MatchResult {
            candidate_id: candidate.id.clone(),
            reference_path: reference.map(|r| r.path.clone()),
            level,
            verdict: Verdict::New,
            version_delta: None,
            glyph_delta: None,
            size_delta: None,
            table_delta: BTreeSet::new(),
            feature_delta: BTreeSet::new(),
            name_conflict,
            trial_keyword,
        };

        let deltas = match (&candidate.metadata, reference) {
            (Some(meta), Some(reference)) => {
                let version =
                    ((meta.revision - reference.metadata.revision) * 1000.0).round() / 1000.0;
                let glyph = meta.glyph_count as i64 - reference.metadata.glyph_count as i64;
                result.version_delta = Some(version);
                result.glyph_delta = Some(glyph);
                result.size_delta = Some(candidate.byte_size as i64 - reference.byte_size as i64);
                result.table_delta = symmetric_difference(&meta.table_tags, &reference.metadata.table_tags);
                result.feature_delta =
                    symmetric_difference(&meta.feature_tags, &reference.metadata.feature_tags);
                Some(Deltas { version, glyph })
            }
            _ => None,
        };

        result.verdict = self.verdict(candidate, level, name_conflict, deltas.as_ref());
        result
    }

    /// Classify every candidate against one snapshot on the rayon pool.
    /// Output order matches input order.
    pub fn classify_all(
        &self,
        candidates: &[CandidateRecord],
        index: &ReferenceIndex,
        reporter: &dyn ProgressReporter,
    ) -> Vec<MatchResult> {
        let total = candidates.len();
        let processed = AtomicUsize::new(0);
        let start = Instant::now();
        reporter.on_phase_start(Phase::Classify, total);

        let results: Vec<MatchResult> = candidates
            .par_iter()
            .map(|candidate| {
                let result = self.classify(candidate, index);
                let done = processed.fetch_add(1, Ordering::Relaxed) + 1;
                reporter.on_progress(&ProgressEvent {
                    phase: Phase::Classify,
                    processed_count: done,
                    total_count: total,
                    current_label: &candidate.file_name,
                });
                result
            })
            .collect();

        reporter.on_phase_complete(Phase::Classify, total, start.elapsed().as_secs_f64());
        results
    }

    /// Duplicate-counter suffix on the file stem, e.g. `Name~001.otf`.
    pub fn has_name_conflict(&self, candidate: &CandidateRecord) -> bool {
        self.conflict_pattern.is_match(candidate.file_stem())
    }

    pub fn has_trial_keyword(&self, candidate: &CandidateRecord) -> bool {
        let mut haystacks = vec![candidate.file_name.to_lowercase()];
        if let Some(meta) = &candidate.metadata {
            for value in [&meta.full_name, &meta.postscript_name, &meta.version]
                .into_iter()
                .flatten()
            {
                haystacks.push(value.to_lowercase());
            }
        }
        self.trial_keywords
            .iter()
            .any(|keyword| haystacks.iter().any(|h| h.contains(keyword.as_str())))
    }

    fn verdict(
        &self,
        candidate: &CandidateRecord,
        level: MatchLevel,
        name_conflict: bool,
        deltas: Option<&Deltas>,
    ) -> Verdict {
        if name_conflict {
            return Verdict::Conflict;
        }
        match &candidate.metadata {
            Some(meta) if meta.glyph_count > 0 => {}
            _ => return Verdict::Problem,
        }

        match (level, deltas) {
            (level, Some(d)) if level.is_confirmed() => {
                let newer = d.version > REVISION_EPSILON;
                let older = d.version < -REVISION_EPSILON;
                let gained = d.glyph > 0 && d.glyph >= self.glyph_threshold;
                let lost = d.glyph < 0 && -d.glyph >= self.glyph_threshold;

                if (newer && lost) || (older && gained) {
                    Verdict::Review
                } else if newer || gained {
                    Verdict::Upgrade
                } else {
                    Verdict::Skip
                }
            }
            (MatchLevel::Unmatched, _) => Verdict::New,
            _ => Verdict::Review,
        }
    }
}

/// Walk the cascade L1..L4; the first level with any hit wins.
fn find_match<'a>(
    meta: &FontMetadata,
    index: &'a ReferenceIndex,
) -> (MatchLevel, Option<&'a ReferenceRecord>) {
    let family = meta.effective_family();

    let tiers: [(MatchLevel, &[usize]); 4] = [
        (
            MatchLevel::PostScriptName,
            meta.postscript_name().map(|ps| index.by_postscript(ps)).unwrap_or(&[]),
        ),
        (
            MatchLevel::FullName,
            meta.full_name().map(|n| index.by_full_name(n)).unwrap_or(&[]),
        ),
        (
            MatchLevel::FamilyStyle,
            match (family, meta.effective_subfamily()) {
                (Some(f), Some(s)) => index.by_style(f, s),
                _ => &[][..],
            },
        ),
        (
            MatchLevel::FamilyOnly,
            family.map(|f| index.by_family(f)).unwrap_or(&[]),
        ),
    ];

    for (level, positions) in tiers {
        if let Some(reference) = best_of(index, positions) {
            return (level, Some(reference));
        }
    }
    (MatchLevel::Unmatched, None)
}

/// Highest revision wins; on a tie the earliest in path order is kept.
fn best_of<'a>(index: &'a ReferenceIndex, positions: &[usize]) -> Option<&'a ReferenceRecord> {
    let mut best: Option<&ReferenceRecord> = None;
    for record in positions.iter().filter_map(|&pos| index.get(pos)) {
        best = match best {
            Some(current) if record.metadata.revision <= current.metadata.revision => Some(current),
            _ => Some(record),
        };
    }
    best
}

fn symmetric_difference(a: &BTreeSet<String>, b: &BTreeSet<String>) -> BTreeSet<String> {
    a.symmetric_difference(b).cloned().collect()
}
