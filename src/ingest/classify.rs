// src/ingest/classify.rs
//! Defense-equipment classification: CPV division first, buyer allowlist as fallback.

use std::sync::Arc;

use once_cell::sync::OnceCell;
use regex::Regex;
use serde::{Deserialize, Deserializer};
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

use crate::ingest::types::{CpvCode, Notice, Tender};

/// CPV division for security, fire-fighting, police and defence equipment.
pub const DEFENSE_CPV_DIVISION: &str = "35";

/// Which rule produced a verdict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rule {
    Cpv,
    /// Carries the allowlist entry that matched, as configured.
    Buyer(String),
    NoMatch,
}

impl Rule {
    pub fn is_defense(&self) -> bool {
        !matches!(self, Rule::NoMatch)
    }
}

#[derive(Debug, Clone)]
struct AllowlistEntry {
    label: String,
    // folded key padded with one space on each side
    padded_key: String,
}

/// Known defense-sector contracting authorities. Read-only after construction.
#[derive(Debug, Clone, Default)]
pub struct BuyerAllowlist {
    entries: Vec<AllowlistEntry>,
}

impl BuyerAllowlist {
    /// Keeps the given order. Blank entries and entries folding to an existing key are
    /// skipped with a warning.
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut entries: Vec<AllowlistEntry> = Vec::new();
        for (position, name) in names.into_iter().enumerate() {
            let label = name.as_ref().trim();
            let key = match_key(label);
            if key.is_empty() {
                tracing::warn!(target: "ingest", position, "blank defense buyer entry ignored");
                continue;
            }
            let padded_key = format!(" {key} ");
            if let Some(first) = entries.iter().find(|e| e.padded_key == padded_key) {
                tracing::warn!(
                    target: "ingest",
                    position,
                    entry = label,
                    same_as = first.label.as_str(),
                    "duplicate defense buyer entry ignored"
                );
                continue;
            }
            entries.push(AllowlistEntry {
                label: label.to_string(),
                padded_key,
            });
        }
        Self { entries }
    }

    /// Entry labels in configured order.
    pub fn entries(&self) -> impl Iterator<Item = &str> + '_ {
        self.entries.iter().map(|e| e.label.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// First entry whose folded form equals the folded buyer name or occurs in it on
    /// word boundaries.
    pub fn find(&self, buyer_name: &str) -> Option<&str> {
        let key = match_key(buyer_name);
        if key.is_empty() {
            return None;
        }
        let padded = format!(" {key} ");
        self.entries
            .iter()
            .find(|e| padded.contains(&e.padded_key))
            .map(|e| e.label.as_str())
    }
}

impl<'de> Deserialize<'de> for BuyerAllowlist {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Vec::<String>::deserialize(deserializer).map(BuyerAllowlist::new)
    }
}

/// Fold a name for comparison: decode entities, lowercase, strip diacritics,
/// turn punctuation into spaces, collapse whitespace.
///
/// Composed and decomposed spellings fold to the same key.
pub fn match_key(s: &str) -> String {
    let decoded = html_escape::decode_html_entities(s);
    let mut out = String::with_capacity(decoded.len());
    for c in decoded
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .flat_map(char::to_lowercase)
    {
        match fold_ligature(c) {
            Some(rep) => out.push_str(rep),
            None if c.is_alphanumeric() => out.push(c),
            None => out.push(' '),
        }
    }

    static RE_WS: OnceCell<Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| Regex::new(r"\s+").expect("static whitespace regex"));
    re_ws.replace_all(&out, " ").trim().to_string()
}

// letters NFD leaves whole
fn fold_ligature(c: char) -> Option<&'static str> {
    let rep = match c {
        'œ' => "oe",
        'æ' => "ae",
        'ß' => "ss",
        'ø' => "o",
        'đ' => "d",
        'ł' => "l",
        _ => return None,
    };
    Some(rep)
}

/// CPV rule alone. Codes shorter than two characters never match.
pub fn is_defense_cpv(cpv: Option<&CpvCode>) -> bool {
    cpv.and_then(CpvCode::division) == Some(DEFENSE_CPV_DIVISION)
}

/// Pure, total classifier. The allowlist is injected and shared read-only.
#[derive(Debug, Clone)]
pub struct Classifier {
    allowlist: Arc<BuyerAllowlist>,
}

impl Classifier {
    pub fn new(allowlist: Arc<BuyerAllowlist>) -> Self {
        Self { allowlist }
    }

    pub fn allowlist(&self) -> &BuyerAllowlist {
        &self.allowlist
    }

    pub fn rule(&self, notice: &Notice) -> Rule {
        if is_defense_cpv(notice.cpv.as_ref()) {
            return Rule::Cpv;
        }
        match self.allowlist.find(&notice.buyer.name) {
            Some(entry) => Rule::Buyer(entry.to_string()),
            None => Rule::NoMatch,
        }
    }

    pub fn classify(&self, notice: &Notice) -> bool {
        self.rule(notice).is_defense()
    }

    /// Classify once and freeze the result into a [`Tender`].
    pub fn label(&self, notice: Notice) -> Tender {
        let rule = self.rule(&notice);
        if let Rule::Buyer(entry) = &rule {
            tracing::trace!(target: "ingest", id = %notice.id, %entry, "buyer allowlist match");
        }
        Tender::from_notice(notice, rule.is_defense())
    }
}
