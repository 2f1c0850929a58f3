//! Domain normalization and graded matching.
//!
//! This module decides whether an organic result belongs to the target
//! domain. Matching is graded: two domains can be equal raw, equal after
//! normalization, equal after a plural/singular pass, share a registrable
//! domain, or merely contain one another, each grade carrying its own
//! confidence.
//!
//! Key functions:
//! - `extract_domain()` - pulls a normalized domain out of a result link
//! - `normalize_domain()` - scheme/prefix/port/path stripping
//! - `match_domains()` - the full decision ladder

use serde::{Deserialize, Serialize};

/// Grade of a domain match, strongest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    Exact,
    Normalized,
    MainDomain,
    Subdomain,
    /// Containment grade. The ladder reports containment as `Subdomain`;
    /// this variant exists because the match contract names it.
    Partial,
    None,
}

/// Outcome of comparing two domains.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainMatch {
    pub matched: bool,
    pub match_type: MatchType,
    /// 0..100.
    pub confidence: u8,
    pub normalized_a: String,
    pub normalized_b: String,
}

impl DomainMatch {
    fn graded(match_type: MatchType, confidence: u8, na: String, nb: String) -> Self {
        DomainMatch {
            matched: match_type != MatchType::None,
            match_type,
            confidence,
            normalized_a: na,
            normalized_b: nb,
        }
    }

    fn none(na: String, nb: String) -> Self {
        Self::graded(MatchType::None, 0, na, nb)
    }
}

/// Lower-cased bare host of a URL-ish string: scheme, path, query,
/// fragment, port, and trailing dots removed. Prefix labels are kept.
fn host_of(input: &str) -> String {
    let mut s = input.trim().to_lowercase();

    if let Some(idx) = s.find("://") {
        s = s[idx + 3..].to_string();
    }
    if let Some(idx) = s.find(['/', '?', '#']) {
        s.truncate(idx);
    }
    if let Some(idx) = s.find(':') {
        s.truncate(idx);
    }
    s.trim_end_matches('.').to_string()
}

/// Normalizes a free-form domain or URL down to a bare host.
///
/// In order: strip the scheme, drop path/query/fragment, drop the port,
/// trim trailing dots, lower-case, and strip a single `www`/`www<digits>`/
/// `m`/`mobile` leading label.
pub fn normalize_domain(input: &str) -> String {
    let s = host_of(input);
    match s.split_once('.') {
        Some((first, rest)) if is_synonym_prefix(first) && !rest.is_empty() => rest.to_string(),
        _ => s,
    }
}

/// `www`, `www2`, `m`, `mobile` — hosting-variant labels that do not change
/// the site identity.
fn is_synonym_prefix(label: &str) -> bool {
    label == "m"
        || label == "mobile"
        || (label.starts_with("www") && label[3..].chars().all(|c| c.is_ascii_digit()))
}

/// Extracts the host domain from a result link, lower-cased but otherwise
/// untouched so the matcher can grade `www` variants as normalized rather
/// than exact.
///
/// Never panics; malformed input yields an empty string and the matcher
/// reports no match.
pub fn extract_domain(url: &str) -> String {
    let host = host_of(url);
    if host.is_empty()
        || !host
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_')
    {
        return String::new();
    }
    host
}

/// Plural/singular tolerance pass: `ies` -> `y`, then `es`, then a trailing
/// `s`, applied per label with the final label (the TLD) left alone.
fn singularize_domain(domain: &str) -> String {
    let labels: Vec<&str> = domain.split('.').collect();
    if labels.len() < 2 {
        return singularize_label(domain);
    }
    let last = labels.len() - 1;
    labels
        .iter()
        .enumerate()
        .map(|(i, label)| {
            if i == last {
                (*label).to_string()
            } else {
                singularize_label(label)
            }
        })
        .collect::<Vec<_>>()
        .join(".")
}

fn singularize_label(label: &str) -> String {
    if let Some(stem) = label.strip_suffix("ies") {
        if stem.len() >= 2 {
            return format!("{stem}y");
        }
    }
    if let Some(stem) = label.strip_suffix("es") {
        if stem.len() >= 2 {
            return stem.to_string();
        }
    }
    if let Some(stem) = label.strip_suffix('s') {
        if stem.len() >= 2 {
            return stem.to_string();
        }
    }
    label.to_string()
}

/// Last two dot-separated labels; the whole domain when it has fewer.
fn main_domain(domain: &str) -> String {
    let labels: Vec<&str> = domain.split('.').collect();
    if labels.len() <= 2 {
        domain.to_string()
    } else {
        labels[labels.len() - 2..].join(".")
    }
}

/// Compares two domains and returns a graded match. First hit on the ladder
/// wins:
///
/// 1. raw equality -> exact, 100
/// 2. normalized equality -> normalized, 95
/// 3. singularized equality (when it changed something) -> normalized, 93
/// 4. shared registrable domain -> subdomain 85 when one strictly extends
///    the other, main_domain 90 otherwise
/// 5. containment -> subdomain, 75
/// 6. none, 0
pub fn match_domains(a: &str, b: &str) -> DomainMatch {
    let na = normalize_domain(a);
    let nb = normalize_domain(b);

    if a.trim().is_empty() || b.trim().is_empty() || na.is_empty() || nb.is_empty() {
        return DomainMatch::none(na, nb);
    }

    if a == b {
        return DomainMatch::graded(MatchType::Exact, 100, na, nb);
    }
    if na == nb {
        return DomainMatch::graded(MatchType::Normalized, 95, na, nb);
    }

    let sa = singularize_domain(&na);
    let sb = singularize_domain(&nb);
    if sa == sb && (sa != na || sb != nb) {
        return DomainMatch::graded(MatchType::Normalized, 93, na, nb);
    }

    if main_domain(&na) == main_domain(&nb) {
        let a_extends_b = na.ends_with(&format!(".{nb}"));
        let b_extends_a = nb.ends_with(&format!(".{na}"));
        let match_type = if a_extends_b || b_extends_a {
            MatchType::Subdomain
        } else {
            MatchType::MainDomain
        };
        let confidence = if match_type == MatchType::Subdomain {
            85
        } else {
            90
        };
        return DomainMatch::graded(match_type, confidence, na, nb);
    }

    if na.contains(&nb) || nb.contains(&na) {
        return DomainMatch::graded(MatchType::Subdomain, 75, na, nb);
    }

    DomainMatch::none(na, nb)
}
