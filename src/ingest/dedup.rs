// src/ingest/dedup.rs
//! Per-run identity index keyed by tender id.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::ingest::types::Tender;

/// How a repeated id is resolved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DedupPolicy {
    /// Keep the first occurrence, drop later ones.
    #[default]
    FirstSeenWins,
    /// Replace the kept tender when both carry a revision and the incoming one is strictly newer.
    /// The replacement keeps the first-seen position.
    LatestRevisionWins,
}

impl DedupPolicy {
    fn prefers_incoming(self, kept: &Tender, incoming: &Tender) -> bool {
        match self {
            DedupPolicy::FirstSeenWins => false,
            DedupPolicy::LatestRevisionWins => match (kept.revised_at(), incoming.revised_at()) {
                (Some(old), Some(new)) => new > old,
                _ => false,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Kept,
    Duplicate,
    Replaced,
}

#[derive(Debug, Default)]
pub struct Deduplicator {
    policy: DedupPolicy,
    index: HashMap<String, usize>,
    tenders: Vec<Tender>,
    duplicates: u64,
    replaced: u64,
}

impl Deduplicator {
    pub fn new(policy: DedupPolicy) -> Self {
        Self {
            policy,
            ..Default::default()
        }
    }

    pub fn insert(&mut self, tender: Tender) -> Admission {
        match self.index.get(tender.id()) {
            Some(&slot) => {
                self.duplicates += 1;
                if self.policy.prefers_incoming(&self.tenders[slot], &tender) {
                    self.tenders[slot] = tender;
                    self.replaced += 1;
                    Admission::Replaced
                } else {
                    Admission::Duplicate
                }
            }
            None => {
                self.index.insert(tender.id().to_string(), self.tenders.len());
                self.tenders.push(tender);
                Admission::Kept
            }
        }
    }

    pub fn len(&self) -> usize {
        self.tenders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tenders.is_empty()
    }

    /// Occurrences collapsed into an existing id (dropped or replacing).
    pub fn duplicates(&self) -> u64 {
        self.duplicates
    }

    pub fn replaced(&self) -> u64 {
        self.replaced
    }

    /// Kept tenders in first-seen order.
    pub fn into_tenders(self) -> Vec<Tender> {
        self.tenders
    }
}

/// One-shot helper over a whole sequence.
pub fn dedupe<I>(policy: DedupPolicy, tenders: I) -> Vec<Tender>
where
    I: IntoIterator<Item = Tender>,
{
    let mut d = Deduplicator::new(policy);
    for t in tenders {
        d.insert(t);
    }
    d.into_tenders()
}
