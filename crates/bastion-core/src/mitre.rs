//! MITRE ATT&CK helpers: id normalisation, extraction from Wazuh documents,
//! tactic labels and the built-in rule table.

use serde_json::Value;
use std::collections::BTreeSet;

/// Wazuh rules that fire on simulated techniques but ship without MITRE
/// metadata: `(rule_id, technique_id)`.
const RULE_TECHNIQUES: &[(&str, &str)] = &[
    ("5715", "T1078"),
    ("5501", "T1078"),
    ("5402", "T1078.003"),
    ("533", "T1049"),
    ("502", "T1082"),
    ("503", "T1082"),
    ("510", "T1082"),
    ("19005", "T1082"),
    ("19007", "T1082"),
    ("19008", "T1082"),
    ("19009", "T1082"),
    ("550", "T1083"),
    ("554", "T1083"),
    ("592", "T1059"),
    ("594", "T1059"),
];

/// Enterprise tactics: `(tactic_id, normalised label)`.
const TACTICS: &[(&str, &str)] = &[
    ("TA0043", "reconnaissance"),
    ("TA0042", "resource-development"),
    ("TA0001", "initial-access"),
    ("TA0002", "execution"),
    ("TA0003", "persistence"),
    ("TA0004", "privilege-escalation"),
    ("TA0005", "defense-evasion"),
    ("TA0006", "credential-access"),
    ("TA0007", "discovery"),
    ("TA0008", "lateral-movement"),
    ("TA0009", "collection"),
    ("TA0011", "command-and-control"),
    ("TA0010", "exfiltration"),
    ("TA0040", "impact"),
];

/// Document paths that may carry technique ids.
const TECHNIQUE_PATHS: &[&str] = &["rule.mitre.id", "data.mitre.id", "mitre.id"];

/// Document paths that may carry tactic names.
const TACTIC_PATHS: &[&str] = &["rule.mitre.tactic", "data.mitre.tactic", "mitre.tactic"];

/// Normalises a technique id: `technique/t1059.001 ` → `T1059.001`.
/// Bare numbers get the `T` prefix. Returns `None` for anything else.
pub fn normalize_technique_id(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let lower = trimmed.to_ascii_lowercase();
    let s = match lower.strip_prefix("technique/") {
        Some(_) => &trimmed["technique/".len()..],
        None => trimmed,
    };
    let upper = s.trim().to_ascii_uppercase();
    let digits = upper.strip_prefix('T').unwrap_or(&upper);

    let (base, sub) = match digits.split_once('.') {
        Some((base, sub)) => (base, Some(sub)),
        None => (digits, None),
    };
    if base.is_empty() || !base.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    match sub {
        Some(sub) if sub.is_empty() || !sub.chars().all(|c| c.is_ascii_digit()) => None,
        Some(sub) => Some(format!("T{}.{}", base, sub)),
        None => Some(format!("T{}", base)),
    }
}

/// Parent technique of a sub-technique (`T1059.001` → `T1059`).
pub fn parent_technique(id: &str) -> &str {
    id.split_once('.').map(|(base, _)| base).unwrap_or(id)
}

/// True when both ids name the same technique family.
pub fn same_family(a: &str, b: &str) -> bool {
    a == b || parent_technique(a) == parent_technique(b) && (!a.contains('.') || !b.contains('.'))
}

/// Technique mapped to a Wazuh rule id by the built-in table.
pub fn rule_technique(rule_id: &str) -> Option<&'static str> {
    let rule_id = rule_id.trim();
    RULE_TECHNIQUES
        .iter()
        .find(|(id, _)| *id == rule_id)
        .map(|(_, technique)| *technique)
}

/// Normalises a tactic label: `Defense Evasion` / `defense_evasion` → `defense-evasion`.
pub fn normalize_tactic(raw: &str) -> Option<String> {
    let label = raw
        .split(|c: char| c.is_whitespace() || c == '_' || c == '-')
        .filter(|p| !p.is_empty())
        .map(str::to_ascii_lowercase)
        .collect::<Vec<_>>()
        .join("-");
    (!label.is_empty()).then_some(label)
}

/// ATT&CK tactic id for a normalised label.
pub fn tactic_id(label: &str) -> Option<&'static str> {
    TACTICS
        .iter()
        .find(|(_, name)| *name == label)
        .map(|(id, _)| *id)
}

/// Looks up a dotted path as nested objects first, then as a flattened key.
pub fn lookup<'a>(source: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .try_fold(source, |node, part| node.get(part))
        .or_else(|| source.get(path))
}

fn strings_at(source: &Value, paths: &[&str]) -> Vec<String> {
    let mut out = Vec::new();
    for path in paths {
        match lookup(source, path) {
            Some(Value::String(s)) => out.push(s.clone()),
            Some(Value::Array(items)) => {
                out.extend(items.iter().filter_map(|v| v.as_str().map(str::to_string)))
            }
            _ => {}
        }
    }
    out
}

/// Distinct, normalised technique ids found on a document, sorted.
pub fn extract_technique_ids(source: &Value) -> Vec<String> {
    strings_at(source, TECHNIQUE_PATHS)
        .iter()
        .filter_map(|s| normalize_technique_id(s))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Distinct, normalised tactic labels found on a document, sorted.
pub fn extract_tactics(source: &Value) -> Vec<String> {
    strings_at(source, TACTIC_PATHS)
        .iter()
        .filter_map(|s| normalize_tactic(s))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
