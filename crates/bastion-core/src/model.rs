//! Domain records for attack steps, alerts and operations.
//!
//! Connectors hand back raw Caldera links and indexer documents; this module
//! turns them into the typed records the correlation engine works on.

use crate::mitre::{
    extract_tactics, extract_technique_ids, lookup, normalize_tactic, normalize_technique_id,
    rule_technique, same_family,
};
use crate::time::parse_timestamp;
use bastion_connectors::{CalderaLink, CalderaOperation, IndexedDocument};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

const PID_PATHS: &[&str] = &["data.audit.pid", "data.win.eventdata.processId"];
const PPID_PATHS: &[&str] = &["data.audit.ppid", "data.win.eventdata.parentProcessId"];

/// One executed action of a Caldera operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttackStep {
    /// Caldera link id, unique within the operation.
    pub link_id: String,
    /// Normalised ATT&CK technique id.
    pub technique_id: Option<String>,
    /// Normalised tactic labels.
    #[serde(default)]
    pub tactics: Vec<String>,
    /// Paw of the executing agent.
    pub agent_paw: String,
    /// Host name reported by the agent.
    pub host: Option<String>,
    /// When the step finished executing. Required for correlation.
    pub executed_at: Option<DateTime<Utc>>,
    /// When the step started.
    pub started_at: Option<DateTime<Utc>>,
    /// Human-readable ability name.
    pub ability_name: String,
    /// Process id of the executed command.
    pub pid: Option<String>,
    /// Executed command line.
    pub command: Option<String>,
    /// Caldera link status code.
    pub status: Option<i64>,
}

impl AttackStep {
    /// Builds a step from a Caldera link.
    ///
    /// The execution time is the link's `finish`, falling back to `start`
    /// and then `decide`.
    pub fn from_link(link: &CalderaLink) -> Self {
        let started_at = link.start.as_ref().and_then(parse_timestamp);
        let executed_at = link
            .finish
            .as_ref()
            .and_then(parse_timestamp)
            .or(started_at)
            .or_else(|| link.decide.as_ref().and_then(parse_timestamp));

        let tactics = link
            .ability
            .tactic
            .as_deref()
            .map(|raw| raw.split(',').filter_map(normalize_tactic).collect())
            .unwrap_or_default();

        let command = link
            .plaintext_command
            .clone()
            .or_else(|| link.command.clone())
            .filter(|c| !c.trim().is_empty());

        Self {
            link_id: link.id.clone(),
            technique_id: link
                .ability
                .technique_id
                .as_deref()
                .and_then(normalize_technique_id),
            tactics,
            agent_paw: link.paw.clone(),
            host: link.host.clone().filter(|h| !h.trim().is_empty()),
            executed_at,
            started_at,
            ability_name: link.ability.name.clone(),
            pid: link.pid.clone().filter(|p| !p.trim().is_empty()),
            command,
            status: link.status,
        }
    }

    /// Whether the step takes part in coverage: it needs both a technique and
    /// an execution time.
    pub fn is_eligible(&self) -> bool {
        self.technique_id.is_some() && self.executed_at.is_some()
    }
}

/// Agent reference carried by an alert.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlertAgent {
    pub id: Option<String>,
    pub name: Option<String>,
}

impl AlertAgent {
    /// Display label: the name, else the id.
    pub fn label(&self) -> Option<&str> {
        self.name
            .as_deref()
            .filter(|n| !n.is_empty())
            .or(self.id.as_deref().filter(|i| !i.is_empty()))
    }
}

/// ATT&CK metadata carried by an alert.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlertMitre {
    pub technique_ids: Vec<String>,
    pub tactics: Vec<String>,
}

/// Where an alert's technique ids came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TechniqueSource {
    /// MITRE fields of the alert document.
    Document,
    /// Built-in rule table.
    RuleMap,
    /// No technique known.
    None,
}

/// One detection event from the Wazuh alert index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    /// Indexer document id.
    pub id: String,
    /// Index the document was read from.
    pub index: String,
    pub rule_id: Option<String>,
    pub rule_level: i64,
    pub rule_description: Option<String>,
    pub agent: AlertAgent,
    pub mitre: AlertMitre,
    pub technique_source: TechniqueSource,
    pub pid: Option<String>,
    pub ppid: Option<String>,
    pub timestamp: DateTime<Utc>,
    /// Original document `_source`.
    pub raw: Value,
}

impl Alert {
    /// Builds an alert from an indexer document. Documents without a
    /// parseable timestamp are dropped.
    pub fn from_document(doc: &IndexedDocument) -> Option<Self> {
        let source = &doc.source;
        let timestamp = lookup(source, "@timestamp")
            .or_else(|| lookup(source, "timestamp"))
            .and_then(parse_timestamp)?;

        let rule_id = lookup(source, "rule.id").and_then(stringish);
        let rule_level = lookup(source, "rule.level")
            .and_then(|v| v.as_i64().or_else(|| v.as_str()?.trim().parse().ok()))
            .unwrap_or(0);

        let mut technique_ids = extract_technique_ids(source);
        let technique_source = if !technique_ids.is_empty() {
            TechniqueSource::Document
        } else if let Some(mapped) = rule_id.as_deref().and_then(rule_technique) {
            technique_ids.push(mapped.to_string());
            TechniqueSource::RuleMap
        } else {
            TechniqueSource::None
        };

        Some(Self {
            id: doc.id.clone(),
            index: doc.index.clone(),
            rule_id,
            rule_level,
            rule_description: lookup(source, "rule.description").and_then(stringish),
            agent: AlertAgent {
                id: lookup(source, "agent.id").and_then(stringish),
                name: lookup(source, "agent.name").and_then(stringish),
            },
            mitre: AlertMitre {
                technique_ids,
                tactics: extract_tactics(source),
            },
            technique_source,
            pid: first_stringish(source, PID_PATHS),
            ppid: first_stringish(source, PPID_PATHS),
            timestamp,
            raw: source.clone(),
        })
    }

    pub fn has_techniques(&self) -> bool {
        !self.mitre.technique_ids.is_empty()
    }

    /// True when any of the alert's techniques is in the family of `technique`.
    pub fn matches_technique(&self, technique: &str) -> bool {
        self.mitre
            .technique_ids
            .iter()
            .any(|id| same_family(id, technique))
    }

    /// True when the alert's agent name or id equals the paw or host,
    /// ignoring case and surrounding whitespace.
    pub fn matches_agent(&self, paw: &str, host: Option<&str>) -> bool {
        let wanted: Vec<String> = std::iter::once(paw)
            .chain(host)
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect();
        [self.agent.name.as_deref(), self.agent.id.as_deref()]
            .into_iter()
            .flatten()
            .map(|s| s.trim().to_lowercase())
            .any(|candidate| wanted.contains(&candidate))
    }
}

/// Operation metadata as listed by Caldera.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationMeta {
    pub id: String,
    pub name: String,
    pub state: String,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl OperationMeta {
    pub fn from_operation(op: &CalderaOperation) -> Self {
        Self {
            id: op.id.clone(),
            name: op.name.clone(),
            state: op.state.clone(),
            start: op.start.as_ref().and_then(parse_timestamp),
            end: op.finish.as_ref().and_then(parse_timestamp),
        }
    }
}

/// An operation and its steps as loaded from Caldera.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationChain {
    pub operation: OperationMeta,
    pub steps: Vec<AttackStep>,
    pub loaded_at: DateTime<Utc>,
}

/// Renders a string or number field as a string.
pub(crate) fn stringish(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn first_stringish(source: &Value, paths: &[&str]) -> Option<String> {
    paths
        .iter()
        .find_map(|path| lookup(source, path).and_then(stringish))
}
