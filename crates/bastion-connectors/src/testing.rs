//! Testing harness for connector implementations.
//!
//! Builders for connector configs, Wazuh alert documents and Caldera
//! operations shared by unit tests here and by downstream crates.

use crate::traits::{
    AuthConfig, CalderaAbility, CalderaAgent, CalderaLink, CalderaOperation, ConnectorConfig,
    ConnectorHealth, ConnectorResult, IndexedDocument, WazuhAgent,
};
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// Creates a test connector config with sensible defaults.
pub fn test_connector_config(name: &str, base_url: &str) -> ConnectorConfig {
    ConnectorConfig {
        name: name.to_string(),
        base_url: base_url.to_string(),
        auth: AuthConfig::None,
        timeout_secs: 30,
        max_retries: 0,
        verify_tls: true,
        headers: HashMap::new(),
    }
}

/// Builds a Wazuh alert document the way the indexer stores it.
pub fn sample_alert_document(
    id: &str,
    timestamp: DateTime<Utc>,
    rule_id: &str,
    level: i64,
    technique_ids: &[&str],
    agent_name: &str,
) -> IndexedDocument {
    let mut rule = serde_json::json!({
        "id": rule_id,
        "level": level,
        "description": format!("Test rule {}", rule_id),
    });
    if !technique_ids.is_empty() {
        rule["mitre"] = serde_json::json!({
            "id": technique_ids,
            "tactic": ["Execution"],
        });
    }

    IndexedDocument {
        id: id.to_string(),
        index: format!("wazuh-alerts-4.x-{}", timestamp.format("%Y.%m.%d")),
        source: serde_json::json!({
            "@timestamp": timestamp.to_rfc3339(),
            "rule": rule,
            "agent": { "id": "001", "name": agent_name },
            "manager": { "name": "wazuh-manager" },
        }),
    }
}

/// Builds a Caldera link for `technique_id` finished at `finish`.
pub fn sample_link(
    id: &str,
    technique_id: Option<&str>,
    finish: Option<DateTime<Utc>>,
    paw: &str,
) -> CalderaLink {
    CalderaLink {
        id: id.to_string(),
        paw: paw.to_string(),
        host: Some(format!("{}-host", paw)),
        status: Some(0),
        finish: finish.map(|ts| serde_json::json!(ts.to_rfc3339())),
        ability: CalderaAbility {
            ability_id: format!("ability-{}", id),
            name: format!("Ability {}", id),
            technique_id: technique_id.map(str::to_string),
            technique_name: None,
            tactic: Some("execution".to_string()),
        },
        ..Default::default()
    }
}

/// Builds a Caldera operation with the given chain.
pub fn sample_operation(
    id: &str,
    start: DateTime<Utc>,
    chain: Vec<CalderaLink>,
) -> CalderaOperation {
    CalderaOperation {
        id: id.to_string(),
        name: format!("Operation {}", id),
        state: "finished".to_string(),
        start: Some(serde_json::json!(start.to_rfc3339())),
        finish: None,
        chain,
    }
}

/// Builds a Caldera agent on `host` that beaconed at `last_seen`.
pub fn sample_caldera_agent(paw: &str, host: &str, last_seen: DateTime<Utc>) -> CalderaAgent {
    CalderaAgent {
        paw: paw.to_string(),
        host: host.to_string(),
        platform: Some("linux".to_string()),
        executors: vec!["sh".to_string()],
        group: Some("red".to_string()),
        last_seen: Some(serde_json::json!(last_seen.to_rfc3339())),
        ..Default::default()
    }
}

/// Builds an active Wazuh agent named `name`.
pub fn sample_wazuh_agent(id: &str, name: &str) -> WazuhAgent {
    WazuhAgent {
        id: id.to_string(),
        name: name.to_string(),
        ip: Some("10.0.0.10".to_string()),
        status: Some("active".to_string()),
        version: Some("Wazuh v4.7.0".to_string()),
        last_keep_alive: None,
    }
}

/// Asserts that a connector health check returns healthy.
pub fn assert_healthy(result: &ConnectorResult<ConnectorHealth>) {
    match result {
        Ok(ConnectorHealth::Healthy) => {}
        other => panic!("Expected Healthy, got {:?}", other),
    }
}

/// Asserts that a connector health check returns unhealthy.
pub fn assert_unhealthy(result: &ConnectorResult<ConnectorHealth>) {
    match result {
        Ok(ConnectorHealth::Unhealthy(_)) => {}
        other => panic!("Expected Unhealthy, got {:?}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_alert_document_shape() {
        let doc = sample_alert_document("a1", Utc::now(), "92000", 7, &["T1059"], "web-01");
        assert_eq!(doc.source["rule"]["mitre"]["id"][0], "T1059");
        assert_eq!(doc.source["agent"]["name"], "web-01");
        assert!(doc.index.starts_with("wazuh-alerts-4.x-"));
    }

    #[test]
    fn test_sample_alert_without_mitre() {
        let doc = sample_alert_document("a2", Utc::now(), "5715", 3, &[], "web-01");
        assert!(doc.source["rule"].get("mitre").is_none());
    }
}
