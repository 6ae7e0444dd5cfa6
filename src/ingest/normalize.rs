// src/ingest/normalize.rs
//! Raw record → [`Notice`] mapping with explicit required/optional field contracts.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::ingest::error::NormalizationError;
use crate::ingest::types::{Buyer, CpvCode, Notice, RawNoticeRecord};

/// Fields this crate reads from a bulletin record. Everything else is ignored.
#[derive(Debug, Default, Deserialize)]
struct NoticeFields {
    #[serde(default)]
    idweb: Option<Value>,
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    objet: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    nomacheteur: Option<String>,
    #[serde(default)]
    buyer: Option<RawBuyer>,
    #[serde(default)]
    cpv: Option<String>,
    #[serde(default)]
    code_cpv: Option<String>,
    #[serde(default)]
    dateparution: Option<String>,
    #[serde(default)]
    datelimitereponse: Option<String>,
    #[serde(default)]
    nature_libelle: Option<String>,
    #[serde(default)]
    url_avis: Option<String>,
    #[serde(default)]
    date_maj: Option<String>,
    #[serde(default)]
    revised_at: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawBuyer {
    #[serde(default)]
    name: Option<String>,
}

/// Map one raw record into a notice. Pure; safe to call concurrently.
pub fn normalize(raw: &RawNoticeRecord) -> Result<Notice, NormalizationError> {
    if !raw.0.is_object() {
        return Err(NormalizationError::Malformed(
            "record is not a JSON object".to_string(),
        ));
    }
    let f = NoticeFields::deserialize(&raw.0)
        .map_err(|e| NormalizationError::Malformed(e.to_string()))?;

    let id = extract_id(&f)?;
    let title = [f.objet, f.title]
        .into_iter()
        .flatten()
        .find(|t| !t.trim().is_empty())
        .ok_or_else(|| NormalizationError::MissingTitle { id: id.clone() })?;

    let buyer_name = f
        .nomacheteur
        .or_else(|| f.buyer.and_then(|b| b.name))
        .unwrap_or_default();
    if buyer_name.trim().is_empty() {
        tracing::debug!(target: "ingest", %id, "notice has no buyer name");
    }

    let cpv = f
        .cpv
        .as_deref()
        .and_then(CpvCode::parse)
        .or_else(|| f.code_cpv.as_deref().and_then(CpvCode::parse));

    let revised_at = f.date_maj.or(f.revised_at).and_then(|s| {
        let parsed = parse_revision(&s);
        if parsed.is_none() {
            tracing::debug!(target: "ingest", %id, value = %s, "unparseable revision date ignored");
        }
        parsed
    });

    Ok(Notice {
        id,
        title,
        buyer: Buyer { name: buyer_name },
        cpv,
        publication_date: f.dateparution,
        response_deadline: f.datelimitereponse,
        notice_kind: f.nature_libelle,
        url: f.url_avis,
        revised_at,
    })
}

fn extract_id(f: &NoticeFields) -> Result<String, NormalizationError> {
    let value = [&f.idweb, &f.id]
        .into_iter()
        .flatten()
        .find(|v| !v.is_null());
    match value {
        None => Err(NormalizationError::MissingId),
        Some(Value::String(s)) => {
            let t = s.trim();
            if t.is_empty() {
                Err(NormalizationError::MissingId)
            } else {
                Ok(t.to_string())
            }
        }
        Some(Value::Number(n)) => Ok(n.to_string()),
        Some(other) => Err(NormalizationError::Malformed(format!(
            "identifier must be a string or number, got {other}"
        ))),
    }
}

/// RFC 3339 timestamp or plain `YYYY-MM-DD` (midnight UTC).
pub fn parse_revision(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|naive| naive.and_utc())
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(v: Value) -> RawNoticeRecord {
        RawNoticeRecord(v)
    }

    #[test]
    fn idweb_preferred_over_id() {
        let n = normalize(&raw(json!({"idweb": "24-100", "id": "x", "objet": "T"}))).unwrap();
        assert_eq!(n.id, "24-100");
    }

    #[test]
    fn numeric_id_is_stringified() {
        let n = normalize(&raw(json!({"id": 4711, "title": "T"}))).unwrap();
        assert_eq!(n.id, "4711");
    }

    #[test]
    fn boolean_id_is_malformed() {
        let e = normalize(&raw(json!({"id": true, "title": "T"}))).unwrap_err();
        assert!(matches!(e, NormalizationError::Malformed(_)));
    }

    #[test]
    fn mistyped_known_field_is_malformed() {
        let e = normalize(&raw(json!({"idweb": "1", "objet": 12}))).unwrap_err();
        assert!(matches!(e, NormalizationError::Malformed(_)));
    }

    #[test]
    fn revision_dates_parse() {
        assert!(parse_revision("2024-05-01T10:00:00+02:00").is_some());
        assert_eq!(
            parse_revision("2024-05-01").unwrap().to_rfc3339(),
            "2024-05-01T00:00:00+00:00"
        );
        assert!(parse_revision("yesterday").is_none());
    }

    #[test]
    fn nested_buyer_is_accepted() {
        let n = normalize(&raw(
            json!({"idweb": "1", "objet": "T", "buyer": {"name": "Marine nationale"}}),
        ))
        .unwrap();
        assert_eq!(n.buyer.name, "Marine nationale");
    }
}
