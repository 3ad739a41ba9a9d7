//! Agent inventory: Caldera agents joined with their Wazuh counterparts and
//! recent detections on the same host.

use crate::coverage::AlertSummary;
use crate::mitre::lookup;
use crate::model::Alert;
use crate::time::parse_timestamp;
use bastion_connectors::{CalderaAgent, WazuhAgent};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};

/// An agent is alive when it beaconed within this many seconds.
pub const ALIVE_SECS: i64 = 300;
/// Alerts below this level are not listed as agent detections.
pub const DETECTION_MIN_LEVEL: i64 = 5;
/// Detections kept per agent, newest first.
pub const DETECTIONS_PER_AGENT: usize = 10;
pub const DEFAULT_ALERT_HOURS: i64 = 1;
pub const DEFAULT_ALERT_MIN_LEVEL: i64 = 7;
/// Alerts returned by the recent alerts feed.
pub const RECENT_ALERTS_LIMIT: usize = 100;

/// A detection on an agent's host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentDetection {
    pub timestamp: DateTime<Utc>,
    pub rule_id: Option<String>,
    pub rule_level: i64,
    pub description: Option<String>,
    pub technique_id: Option<String>,
}

impl From<&Alert> for AgentDetection {
    fn from(alert: &Alert) -> Self {
        Self {
            timestamp: alert.timestamp,
            rule_id: alert.rule_id.clone(),
            rule_level: alert.rule_level,
            description: alert.rule_description.clone(),
            technique_id: alert.mitre.technique_ids.first().cloned(),
        }
    }
}

/// A Caldera agent with its Wazuh match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentView {
    pub paw: String,
    pub host: String,
    pub username: Option<String>,
    pub platform: Option<String>,
    pub executors: Vec<String>,
    pub privilege: Option<String>,
    pub group: Option<String>,
    pub contact: Option<String>,
    pub sleep_min: Option<i64>,
    pub sleep_max: Option<i64>,
    pub last_seen: Option<DateTime<Utc>>,
    pub alive: bool,
    pub wazuh_matched: bool,
    pub wazuh_agent: Option<WazuhAgent>,
    pub recent_detections: Vec<AgentDetection>,
}

/// Response of the agent inventory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentInventory {
    pub success: bool,
    pub total_agents: usize,
    pub agents: Vec<AgentView>,
    pub query_time: DateTime<Utc>,
    /// Lookups that failed without failing the inventory.
    #[serde(default)]
    pub errors: Vec<String>,
}

/// Response of the recent alerts feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecentAlerts {
    pub success: bool,
    pub total: usize,
    pub alerts: Vec<AlertSummary>,
    pub detected_techniques: Vec<String>,
    pub query_time: DateTime<Utc>,
}

impl RecentAlerts {
    pub fn new(alerts: &[Alert], now: DateTime<Utc>) -> Self {
        let alerts: Vec<AlertSummary> = alerts
            .iter()
            .take(RECENT_ALERTS_LIMIT)
            .map(AlertSummary::from)
            .collect();
        let detected_techniques: BTreeSet<String> = alerts
            .iter()
            .flat_map(|a| a.technique_ids.iter().cloned())
            .collect();
        Self {
            success: true,
            total: alerts.len(),
            alerts,
            detected_techniques: detected_techniques.into_iter().collect(),
            query_time: now,
        }
    }
}

/// Whether `alert` was raised on `host`, by agent name or address.
fn raised_on(alert: &Alert, host: &str) -> bool {
    alert.agent.name.as_deref() == Some(host)
        || lookup(&alert.raw, "agent.ip").and_then(Value::as_str) == Some(host)
}

/// Joins Caldera agents to Wazuh agents by host name and attaches the
/// detections raised on each host. `alerts` are expected newest first.
pub fn match_agents(
    caldera: &[CalderaAgent],
    wazuh: &[WazuhAgent],
    alerts: &[Alert],
    now: DateTime<Utc>,
) -> Vec<AgentView> {
    let by_name: HashMap<&str, &WazuhAgent> =
        wazuh.iter().map(|a| (a.name.as_str(), a)).collect();

    caldera
        .iter()
        .map(|agent| {
            let last_seen = agent.last_seen.as_ref().and_then(parse_timestamp);
            let alive = last_seen.is_some_and(|seen| {
                now.signed_duration_since(seen) < Duration::seconds(ALIVE_SECS)
            });
            let wazuh_agent = by_name.get(agent.host.as_str()).map(|a| (*a).clone());
            let recent_detections = if agent.host.is_empty() {
                Vec::new()
            } else {
                alerts
                    .iter()
                    .filter(|a| a.rule_level >= DETECTION_MIN_LEVEL && raised_on(a, &agent.host))
                    .take(DETECTIONS_PER_AGENT)
                    .map(AgentDetection::from)
                    .collect()
            };

            AgentView {
                paw: agent.paw.clone(),
                host: agent.host.clone(),
                username: agent.username.clone(),
                platform: agent.platform.clone(),
                executors: agent.executors.clone(),
                privilege: agent.privilege.clone(),
                group: agent.group.clone(),
                contact: agent.contact.clone(),
                sleep_min: agent.sleep_min,
                sleep_max: agent.sleep_max,
                last_seen,
                alive,
                wazuh_matched: wazuh_agent.is_some(),
                wazuh_agent,
                recent_detections,
            }
        })
        .collect()
}
