use crate::classify::{MatchResult, Verdict};
use crate::model::{CandidateId, CandidateRecord};
use std::collections::{BTreeMap, HashMap};

pub type ResultsById<'a> = HashMap<&'a CandidateId, &'a MatchResult>;

#[derive(Debug, Clone, PartialEq)]
pub struct FamilySummary {
    pub key: String,
    /// Most severe verdict among all members, regardless of any filter.
    pub verdict: Option<Verdict>,
    pub member_count: usize,
    /// Members whose own verdict passes the filter.
    pub filtered_count: usize,
}

/// Preferred family, else family, else display name.
pub fn family_key(candidate: &CandidateRecord) -> String {
    candidate
        .metadata
        .as_ref()
        .and_then(|m| m.effective_family())
        .unwrap_or_else(|| candidate.display_name())
        .to_string()
}

/// Every candidate lands in exactly one group. Groups and members keep a
/// stable order: keys sorted, members in input order.
pub fn group_by_family(candidates: &[CandidateRecord]) -> BTreeMap<String, Vec<&CandidateRecord>> {
    let mut groups: BTreeMap<String, Vec<&CandidateRecord>> = BTreeMap::new();
    for candidate in candidates {
        groups.entry(family_key(candidate)).or_default().push(candidate);
    }
    groups
}

pub fn index_results(results: &[MatchResult]) -> ResultsById<'_> {
    results.iter().map(|r| (&r.candidate_id, r)).collect()
}

/// Most severe member verdict. `None` only when no member has a result.
pub fn summarize_group(members: &[&CandidateRecord], results: &ResultsById<'_>) -> Option<Verdict> {
    members
        .iter()
        .filter_map(|c| results.get(&c.id))
        .map(|r| r.verdict)
        .max_by_key(|v| v.severity())
}

/// One summary per family, most severe first, then by key.
///
/// `filter` selects which member verdicts count toward `filtered_count`;
/// `None` counts every member with a result.
pub fn summarize_families(
    candidates: &[CandidateRecord],
    results: &[MatchResult],
    filter: Option<&[Verdict]>,
) -> Vec<FamilySummary> {
    let by_id = index_results(results);
    let mut summaries: Vec<FamilySummary> = group_by_family(candidates)
        .into_iter()
        .map(|(key, members)| {
            let filtered_count = members
                .iter()
                .filter_map(|c| by_id.get(&c.id))
                .filter(|r| filter.map_or(true, |allowed| allowed.contains(&r.verdict)))
                .count();
            FamilySummary {
                verdict: summarize_group(&members, &by_id),
                member_count: members.len(),
                filtered_count,
                key,
            }
        })
        .collect();

    summaries.sort_by(|a, b| {
        let severity = |s: &FamilySummary| s.verdict.map(|v| v.severity()).unwrap_or(0);
        severity(b).cmp(&severity(a)).then_with(|| a.key.cmp(&b.key))
    });
    summaries
}
