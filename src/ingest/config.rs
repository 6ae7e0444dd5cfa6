// src/ingest/config.rs
//! Defense buyer allowlist files: `buyers = [...]` in TOML, or JSON (array or `{"buyers": [...]}`).

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::ingest::classify::BuyerAllowlist;

pub const ENV_ALLOWLIST_PATH: &str = "DEFENSE_BUYERS_PATH";

/// Tried in order when the env var is unset.
pub const FALLBACK_PATHS: [&str; 2] = ["config/defense_buyers.toml", "config/defense_buyers.json"];

#[derive(Deserialize)]
struct BuyersTable {
    buyers: BuyerAllowlist,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum JsonAllowlist {
    List(BuyerAllowlist),
    Table(BuyersTable),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Toml,
    Json,
}

impl Format {
    fn of(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "toml" => Some(Format::Toml),
            "json" => Some(Format::Json),
            _ => None,
        }
    }
}

fn parse(content: &str, format: Format) -> Result<BuyerAllowlist> {
    Ok(match format {
        Format::Toml => toml::from_str::<BuyersTable>(content)?.buyers,
        Format::Json => match serde_json::from_str::<JsonAllowlist>(content)? {
            JsonAllowlist::List(list) => list,
            JsonAllowlist::Table(t) => t.buyers,
        },
    })
}

/// Load the allowlist from an explicit path; the format follows the file extension.
pub fn load_allowlist_from(path: &Path) -> Result<BuyerAllowlist> {
    let Some(format) = Format::of(path) else {
        bail!(
            "defense buyer allowlist {} must be a .toml or .json file",
            path.display()
        );
    };
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading defense buyer allowlist from {}", path.display()))?;
    let allowlist = parse(&content, format)
        .with_context(|| format!("parsing defense buyer allowlist {}", path.display()))?;
    tracing::debug!(
        target: "ingest",
        path = %path.display(),
        buyers = allowlist.len(),
        "defense buyer allowlist read"
    );
    Ok(allowlist)
}

/// `$DEFENSE_BUYERS_PATH` (must exist), else the first existing [`FALLBACK_PATHS`] entry,
/// else an empty allowlist (CPV rule only).
pub fn load_allowlist_default() -> Result<BuyerAllowlist> {
    if let Some(p) = std::env::var_os(ENV_ALLOWLIST_PATH) {
        let path = PathBuf::from(p);
        if !path.exists() {
            bail!(
                "{ENV_ALLOWLIST_PATH} points to {}, which does not exist",
                path.display()
            );
        }
        return load_allowlist_from(&path);
    }
    match FALLBACK_PATHS.iter().map(Path::new).find(|p| p.exists()) {
        Some(path) => load_allowlist_from(path),
        None => Ok(BuyerAllowlist::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries(list: &BuyerAllowlist) -> Vec<&str> {
        list.entries().collect()
    }

    #[test]
    fn toml_keeps_configured_order() {
        let list = parse(
            r#"buyers = [" Marine nationale ", "", "DGA", "dga"]"#,
            Format::Toml,
        )
        .unwrap();
        assert_eq!(entries(&list), vec!["Marine nationale", "DGA"]);
    }

    #[test]
    fn json_accepts_array_or_table() {
        let list = parse(r#"["Armée de Terre", "  DGA  ", ""]"#, Format::Json).unwrap();
        assert_eq!(entries(&list), vec!["Armée de Terre", "DGA"]);

        let list = parse(r#"{"buyers": ["SIMu", "DGA"]}"#, Format::Json).unwrap();
        assert_eq!(entries(&list), vec!["SIMu", "DGA"]);
    }

    #[test]
    fn wrong_shape_is_rejected() {
        assert!(parse(r#"sources = ["DGA"]"#, Format::Toml).is_err());
        assert!(parse(r#"{"sources": ["DGA"]}"#, Format::Json).is_err());
        assert!(parse("not a list", Format::Json).is_err());
    }

    #[test]
    fn format_follows_extension() {
        assert_eq!(Format::of(Path::new("a/b.TOML")), Some(Format::Toml));
        assert_eq!(Format::of(Path::new("b.json")), Some(Format::Json));
        assert_eq!(Format::of(Path::new("buyers.txt")), None);
        assert_eq!(Format::of(Path::new("buyers")), None);
    }
}
