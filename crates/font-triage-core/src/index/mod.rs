pub mod store;

pub use store::{BuildReport, IndexStore};

use crate::model::ReferenceRecord;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Descriptive metadata committed alongside the records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexMeta {
    /// Root the index was built from; also where `rebuild` rescans.
    pub root_label: String,
    pub item_count: usize,
    pub failed_count: usize,
    pub last_built_at: String,
}

/// Immutable snapshot of the reference collection with lookup tables for
/// each match level. Records are held in path order and every lookup returns
/// positions in that order, which is what makes tie-breaking reproducible.
#[derive(Debug)]
pub struct ReferenceIndex {
    meta: IndexMeta,
    records: Vec<ReferenceRecord>,
    by_postscript: HashMap<String, Vec<usize>>,
    by_full_name: HashMap<String, Vec<usize>>,
    by_style: HashMap<String, Vec<usize>>,
    by_family: HashMap<String, Vec<usize>>,
}

impl ReferenceIndex {
    pub fn new(meta: IndexMeta, mut records: Vec<ReferenceRecord>) -> Self {
        records.sort_by(|a, b| a.path.cmp(&b.path));

        let mut by_postscript: HashMap<String, Vec<usize>> = HashMap::new();
        let mut by_full_name: HashMap<String, Vec<usize>> = HashMap::new();
        let mut by_style: HashMap<String, Vec<usize>> = HashMap::new();
        let mut by_family: HashMap<String, Vec<usize>> = HashMap::new();

        for (pos, record) in records.iter().enumerate() {
            let m = &record.metadata;
            if let Some(ps) = m.postscript_name() {
                by_postscript.entry(ps.to_string()).or_default().push(pos);
            }
            if let Some(full) = m.full_name() {
                by_full_name.entry(full.to_string()).or_default().push(pos);
            }
            if let Some(family) = m.effective_family() {
                by_family.entry(family.to_string()).or_default().push(pos);
                if let Some(style) = m.effective_subfamily() {
                    by_style.entry(style_key(family, style)).or_default().push(pos);
                }
            }
        }

        Self {
            meta,
            records,
            by_postscript,
            by_full_name,
            by_style,
            by_family,
        }
    }

    pub fn meta(&self) -> &IndexMeta {
        &self.meta
    }

    pub fn records(&self) -> &[ReferenceRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, pos: usize) -> Option<&ReferenceRecord> {
        self.records.get(pos)
    }

    pub fn by_postscript(&self, name: &str) -> &[usize] {
        lookup(&self.by_postscript, name)
    }

    pub fn by_full_name(&self, name: &str) -> &[usize] {
        lookup(&self.by_full_name, name)
    }

    pub fn by_style(&self, family: &str, subfamily: &str) -> &[usize] {
        lookup(&self.by_style, &style_key(family, subfamily))
    }

    pub fn by_family(&self, family: &str) -> &[usize] {
        lookup(&self.by_family, family)
    }
}

fn lookup<'a>(map: &'a HashMap<String, Vec<usize>>, key: &str) -> &'a [usize] {
    map.get(key).map(Vec::as_slice).unwrap_or(&[])
}

fn style_key(family: &str, subfamily: &str) -> String {
    format!("{}\u{0}{}", family, subfamily)
}
