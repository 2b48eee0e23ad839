//! Prometheus file-based service discovery targets.
//!
//! Scrape targets come from blocks stored on groups (optionally replaced
//! per host); probe targets come from blocks stored on hosts. Each entry
//! of a block becomes one [`TargetRecord`](crate::types::TargetRecord).
//! An entry missing a required field is logged and skipped; the rest of
//! the block is still used.

use log::{debug, info, warn};
use serde_json::{Map, Value};

use crate::config::{BlackboxConfig, PrometheusConfig};
use crate::inventory::{self, Host, InventoryError, InventorySource};
use crate::types::{ProbeLabels, ProbeTarget, ScrapeLabels, ScrapeTarget, PROBE_JOB};
use crate::variables::{self, VariableBag};

/// Labels describing the host a block belongs to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostLabels {
    pub host: String,
    pub ip: Option<String>,
}

impl HostLabels {
    /// Reads the host name and IP from the configured variables.
    ///
    /// The inventory name of the host stands in when the host name
    /// variable is not set.
    pub fn resolve(host: &Host, vars: &VariableBag, host_name_var: &str, ip_var: &str) -> Self {
        Self {
            host: vars
                .label(host_name_var)
                .unwrap_or_else(|| host.name.clone()),
            ip: vars.label(ip_var),
        }
    }
}

fn scrape_target(
    entry: &Map<String, Value>,
    group: &str,
    labels: &HostLabels,
) -> Option<ScrapeTarget> {
    let Some(port) = variables::port_field(entry, "port") else {
        warn!(
            "Skipping scrape entry without a valid port in group '{}': {}",
            group,
            Value::Object(entry.clone())
        );
        return None;
    };
    Some(ScrapeTarget {
        labels: ScrapeLabels {
            group: group.to_string(),
            host: labels.host.clone(),
            ip: labels.ip.clone(),
            job: variables::str_field(entry, "name"),
        },
        targets: vec![format!("{}:{}", labels.host, port)],
    })
}

/// Builds one scrape target per usable entry of `block`.
pub fn build_scrape_targets(block: &Value, group: &str, labels: &HostLabels) -> Vec<ScrapeTarget> {
    variables::block_entries(block)
        .into_iter()
        .filter_map(|entry| scrape_target(entry, group, labels))
        .collect()
}

fn probe_target(
    entry: &Map<String, Value>,
    group: &str,
    labels: &HostLabels,
) -> Option<ProbeTarget> {
    let targets = variables::list_field(entry, "targets");
    let module = variables::str_field(entry, "module");
    let (Some(targets), Some(module)) = (targets, module) else {
        warn!(
            "Skipping probe entry without targets or module for host '{}': {}",
            labels.host,
            Value::Object(entry.clone())
        );
        return None;
    };
    Some(ProbeTarget {
        labels: ProbeLabels {
            group: group.to_string(),
            host: labels.host.clone(),
            ip: labels.ip.clone(),
            job: PROBE_JOB.to_string(),
            module,
        },
        targets: targets.iter().filter_map(variables::label_value).collect(),
    })
}

/// Builds one probe target per usable entry of `block`.
pub fn build_probe_targets(block: &Value, group: &str, labels: &HostLabels) -> Vec<ProbeTarget> {
    variables::block_entries(block)
        .into_iter()
        .filter_map(|entry| probe_target(entry, group, labels))
        .collect()
}

/// The first group of `host` that is not ignored, in membership order.
pub fn probe_group<'a>(host: &'a Host, ignored: &[String]) -> Option<&'a str> {
    host.group_names()
        .find(|name| !ignored.iter().any(|i| i == name))
}

/// Collects the scrape targets of every host of every configured group.
pub async fn collect_scrape_targets(
    source: &dyn InventorySource,
    config: &PrometheusConfig,
) -> Result<Vec<ScrapeTarget>, InventoryError> {
    let groups = inventory::groups_with_variable(source, &config.config_name).await?;
    info!("Found {} candidate groups for scrape targets", groups.len());

    let mut targets = Vec::new();
    for group in &groups {
        let group_vars = inventory::variables(source, &group.related.variable_data).await?;
        let Some(group_block) = group_vars.extract(&config.config_name) else {
            debug!(
                "Group '{}' ({}) has no '{}'",
                group.name, group.id, config.config_name
            );
            continue;
        };
        for host in inventory::group_hosts(source, group).await? {
            let host_vars = inventory::variables(source, &host.related.variable_data).await?;
            let block = variables::scrape_block(
                group_block,
                &host_vars,
                &config.config_name,
                config.host_override,
            );
            let labels =
                HostLabels::resolve(&host, &host_vars, &config.host_name_var, &config.ip_var);
            targets.extend(build_scrape_targets(block, &group.name, &labels));
        }
    }
    info!("Built {} scrape targets", targets.len());
    Ok(targets)
}

/// Collects the probe targets of every host carrying a probe block.
pub async fn collect_probe_targets(
    source: &dyn InventorySource,
    config: &BlackboxConfig,
) -> Result<Vec<ProbeTarget>, InventoryError> {
    let hosts = inventory::hosts_with_variable(source, &config.config_name).await?;
    info!("Found {} candidate hosts for probe targets", hosts.len());

    let mut targets = Vec::new();
    for host in &hosts {
        let Some(group) = probe_group(host, &config.ignored_groups) else {
            debug!("Host '{}' ({}) is in no usable group", host.name, host.id);
            continue;
        };
        let vars = inventory::variables(source, &host.related.variable_data).await?;
        let Some(block) = vars.extract(&config.config_name) else {
            continue;
        };
        let labels = HostLabels::resolve(host, &vars, &config.host_name_var, &config.ip_var);
        targets.extend(build_probe_targets(block, group, &labels));
    }
    info!("Built {} probe targets", targets.len());
    Ok(targets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::fake::FakeInventory;
    use serde_json::json;

    fn labels(host: &str, ip: &str) -> HostLabels {
        HostLabels {
            host: host.into(),
            ip: Some(ip.into()),
        }
    }

    #[test]
    fn test_scrape_entries() {
        let block = json!([{"name": "node", "port": 9100}, {"port": "9256"}]);
        let targets = build_scrape_targets(&block, "web", &labels("web01", "10.0.0.1"));
        assert_eq!(targets.len(), 2);
        assert_eq!(targets[0].targets, vec!["web01:9100"]);
        assert_eq!(targets[0].labels.job.as_deref(), Some("node"));
        assert_eq!(targets[0].labels.group, "web");
        assert_eq!(targets[0].labels.host, "web01");
        assert_eq!(targets[0].labels.ip.as_deref(), Some("10.0.0.1"));
        assert_eq!(targets[1].targets, vec!["web01:9256"]);
        assert_eq!(targets[1].labels.job, None);
    }

    #[test]
    fn test_scrape_entry_without_port_is_skipped() {
        let block = json!([{"name": "broken"}, {"name": "node", "port": 9100}]);
        let targets = build_scrape_targets(&block, "web", &labels("web01", "10.0.0.1"));
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].labels.job.as_deref(), Some("node"));
    }

    #[test]
    fn test_probe_entries() {
        let block = json!([{
            "module": "http_2xx",
            "targets": ["https://web01.example.org", "https://web01.example.org/health"]
        }]);
        let targets = build_probe_targets(&block, "web", &labels("web01", "10.0.0.1"));
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].labels.job, PROBE_JOB);
        assert_eq!(targets[0].labels.module, "http_2xx");
        assert_eq!(targets[0].targets.len(), 2);
    }

    #[test]
    fn test_probe_entry_missing_fields_is_skipped() {
        let block = json!([
            {"module": "icmp"},
            {"targets": ["10.0.0.1"]},
            {"module": "icmp", "targets": ["10.0.0.1"]}
        ]);
        let targets = build_probe_targets(&block, "web", &labels("web01", "10.0.0.1"));
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].targets, vec!["10.0.0.1"]);
    }

    fn host_in(groups: &[&str]) -> Host {
        let results: Vec<Value> = groups
            .iter()
            .enumerate()
            .map(|(i, g)| json!({"id": i, "name": g}))
            .collect();
        serde_json::from_value(json!({
            "id": 1,
            "name": "web01",
            "summary_fields": {"groups": {"results": results}}
        }))
        .unwrap()
    }

    #[test]
    fn test_probe_group_first_not_ignored() {
        let ignored = vec!["all".to_string(), "linux".to_string()];
        assert_eq!(probe_group(&host_in(&["all", "web", "db"]), &ignored), Some("web"));
        assert_eq!(probe_group(&host_in(&["linux", "all"]), &ignored), None);
        assert_eq!(probe_group(&host_in(&[]), &ignored), None);
    }

    #[test]
    fn test_host_name_falls_back_to_inventory_name() {
        let vars = VariableBag::from_value(json!({"ip": "10.0.0.9"})).unwrap();
        let resolved = HostLabels::resolve(&host_in(&[]), &vars, "ansible_host", "ip");
        assert_eq!(resolved, labels("web01", "10.0.0.9"));
    }

    fn prometheus(host_override: bool) -> PrometheusConfig {
        PrometheusConfig {
            host_override,
            ..PrometheusConfig::default()
        }
    }

    fn scrape_inventory() -> FakeInventory {
        let mut inventory = FakeInventory::default();
        inventory.add_group(
            1,
            "web",
            json!({"prometheus_config": [{"name": "node", "port": 9100}]}),
        );
        inventory.add_group(2, "plain", json!({"ntp": "pool"}));
        inventory.add_host(
            10,
            "web01",
            json!({"ansible_host": "web01.example.org", "ip": "10.0.0.1"}),
            &["web"],
        );
        inventory.add_host(
            11,
            "web02",
            json!({
                "ansible_host": "web02.example.org",
                "prometheus_config": [{"name": "app", "port": 8080}]
            }),
            &["web", "plain"],
        );
        inventory
    }

    #[tokio::test]
    async fn test_collect_scrape_targets_with_override() {
        let targets = collect_scrape_targets(&scrape_inventory(), &prometheus(true))
            .await
            .unwrap();
        let rendered: Vec<_> = targets
            .iter()
            .map(|t| (t.targets[0].as_str(), t.labels.job.as_deref()))
            .collect();
        assert_eq!(
            rendered,
            vec![
                ("web01.example.org:9100", Some("node")),
                ("web02.example.org:8080", Some("app")),
            ]
        );
    }

    #[tokio::test]
    async fn test_collect_scrape_targets_without_override() {
        let targets = collect_scrape_targets(&scrape_inventory(), &prometheus(false))
            .await
            .unwrap();
        assert_eq!(targets.len(), 2);
        assert!(targets.iter().all(|t| t.labels.job.as_deref() == Some("node")));
        assert_eq!(targets[1].targets, vec!["web02.example.org:9100"]);
        assert_eq!(targets[1].labels.ip, None);
    }

    #[tokio::test]
    async fn test_collect_scrape_targets_fails_on_page_error() {
        let mut inventory = scrape_inventory()
            .with_page_size(1)
            .failing_page("groups/", 2);
        inventory.add_group(3, "db", json!({"prometheus_config": [{"port": 9187}]}));
        let result = collect_scrape_targets(&inventory, &prometheus(true)).await;
        assert!(matches!(result, Err(InventoryError::Status { status: 500, .. })));
    }

    #[tokio::test]
    async fn test_collect_probe_targets() {
        let mut inventory = FakeInventory::default();
        inventory.add_group(1, "all", json!({}));
        inventory.add_group(2, "web", json!({}));
        inventory.add_host(
            10,
            "web01",
            json!({
                "ip": "10.0.0.1",
                "blackbox_config": [{"module": "http_2xx", "targets": ["https://web01"]}]
            }),
            &["all", "web"],
        );
        inventory.add_host(
            11,
            "lonely",
            json!({"blackbox_config": [{"module": "icmp", "targets": ["10.0.0.2"]}]}),
            &["all"],
        );
        inventory.add_host(12, "quiet", json!({}), &["web"]);
        let config = BlackboxConfig {
            ignored_groups: vec!["all".into()],
            ..BlackboxConfig::default()
        };

        let targets = collect_probe_targets(&inventory, &config).await.unwrap();
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].labels.group, "web");
        assert_eq!(targets[0].labels.host, "web01");
        assert_eq!(targets[0].labels.ip.as_deref(), Some("10.0.0.1"));
        assert_eq!(targets[0].targets, vec!["https://web01"]);
    }
}
