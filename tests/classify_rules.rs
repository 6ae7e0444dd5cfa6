// tests/classify_rules.rs
use std::sync::Arc;

use boamp_ingest::ingest::classify::{BuyerAllowlist, Classifier, Rule};
use boamp_ingest::ingest::normalize::normalize;
use boamp_ingest::ingest::types::{Notice, RawNoticeRecord};
use serde_json::json;

fn classifier() -> Classifier {
    Classifier::new(Arc::new(BuyerAllowlist::new([
        "Direction Générale de l'Armement",
        "Marine nationale",
    ])))
}

fn notice(cpv: Option<&str>, buyer: &str) -> Notice {
    let mut v = json!({ "idweb": "24-1", "objet": "Objet", "nomacheteur": buyer });
    if let Some(c) = cpv {
        v["cpv"] = json!(c);
    }
    normalize(&RawNoticeRecord(v)).expect("valid notice")
}

#[test]
fn cpv_division_35_wins_before_buyer_lookup() {
    let c = classifier();
    let n = notice(Some("35120000"), "Communauté d'agglomération du Grand Avignon");
    assert_eq!(c.rule(&n), Rule::Cpv);
    assert!(c.classify(&n));
}

#[test]
fn cpv_rule_fires_even_for_allowlisted_buyer() {
    let c = classifier();
    let n = notice(Some("35700000"), "Marine nationale");
    assert_eq!(c.rule(&n), Rule::Cpv);
}

#[test]
fn buyer_fallback_without_cpv() {
    let c = classifier();
    let n = notice(None, "Direction Générale de l'Armement");
    assert_eq!(
        c.rule(&n),
        Rule::Buyer("Direction Générale de l'Armement".to_string())
    );
    assert!(c.classify(&n));
}

#[test]
fn buyer_fallback_ignores_case_and_accents() {
    let c = classifier();
    for name in [
        "DIRECTION GENERALE DE L'ARMEMENT",
        "direction générale de l’armement",
        "Direction generale de l armement",
        "Direction Générale de l&#039;Armement - UO Bourges",
    ] {
        assert!(c.classify(&notice(None, name)), "should match: {name}");
    }
}

#[test]
fn buyer_fallback_accepts_decomposed_accents() {
    let c = Classifier::new(Arc::new(BuyerAllowlist::new(["Ministère des Armées"])));
    let n = notice(None, "Ministe\u{0300}re des Arme\u{0301}es");
    assert_eq!(c.rule(&n), Rule::Buyer("Ministère des Armées".to_string()));

    // and the other way round: decomposed entry, composed buyer
    let c = Classifier::new(Arc::new(BuyerAllowlist::new([
        "Direction Ge\u{0301}ne\u{0301}rale de l'Armement",
    ])));
    assert!(c.classify(&notice(None, "Direction Générale de l'Armement - UO Bourges")));
}

#[test]
fn non_defense_cpv_and_unknown_buyer() {
    let c = classifier();
    let n = notice(Some("45200000"), "Ville de Nantes");
    assert_eq!(c.rule(&n), Rule::NoMatch);
    assert!(!c.classify(&n));
}

#[test]
fn non_defense_cpv_falls_back_to_buyer() {
    let c = classifier();
    assert!(c.classify(&notice(Some("45200000"), "Marine Nationale")));
}

#[test]
fn short_cpv_is_not_an_error() {
    let c = classifier();
    assert!(!c.classify(&notice(Some("3"), "Ville de Nantes")));
}

#[test]
fn classification_is_idempotent() {
    let c = classifier();
    let samples = [
        notice(Some("35120000"), "X"),
        notice(None, "Marine nationale"),
        notice(Some("45200000"), "Y"),
        notice(None, ""),
    ];
    for n in &samples {
        let first = c.classify(n);
        for _ in 0..5 {
            assert_eq!(c.classify(n), first);
        }
    }
}

#[test]
fn empty_allowlist_leaves_only_cpv_rule() {
    let c = Classifier::new(Arc::new(BuyerAllowlist::default()));
    assert!(!c.classify(&notice(None, "Direction Générale de l'Armement")));
    assert!(c.classify(&notice(Some("35000000"), "")));
}

#[test]
fn labelled_tender_keeps_verdict() {
    let c = classifier();
    let t = c.label(notice(None, "Marine nationale"));
    assert!(t.is_defense_equipment());
    assert_eq!(t.buyer().name, "Marine nationale");
}
