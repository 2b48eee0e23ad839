//! Notification targets declared in group variables.

use log::{debug, info, warn};
use serde_json::{Map, Value};

use crate::config::AlertmanagerConfig;
use crate::inventory::{self, InventoryError, InventorySource};
use crate::types::DesiredNotifier;
use crate::variables;

/// Values used when an entry does not set a flag itself.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NotifierDefaults {
    pub require_tls: bool,
    pub send_resolved: bool,
}

impl From<&AlertmanagerConfig> for NotifierDefaults {
    fn from(config: &AlertmanagerConfig) -> Self {
        Self {
            require_tls: config.require_tls_default,
            send_resolved: config.send_resolved_default,
        }
    }
}

fn notifier(
    entry: &Map<String, Value>,
    group: &str,
    defaults: NotifierDefaults,
) -> Option<DesiredNotifier> {
    let Some(name) = variables::str_field(entry, "name").filter(|n| !n.is_empty()) else {
        warn!("Skipping notifier without a name in group '{}'", group);
        return None;
    };
    let destination = variables::map_field(entry, "receiver-config")
        .and_then(|receiver| variables::str_field(receiver, "to"))
        .unwrap_or_default();
    let send_resolved = variables::bool_field(entry, "send-resolve")
        .or_else(|| variables::bool_field(entry, "send-resolved"))
        .unwrap_or(defaults.send_resolved);
    Some(DesiredNotifier {
        name,
        group: group.to_string(),
        destination,
        require_tls: variables::bool_field(entry, "require-tls").unwrap_or(defaults.require_tls),
        send_resolved,
    })
}

/// Reads the notifiers of one group's block.
///
/// Only entries whose `type` equals `notifier_type` are used; other types
/// are ignored.
pub fn group_notifiers(
    block: &Value,
    group: &str,
    notifier_type: &str,
    defaults: NotifierDefaults,
) -> Vec<DesiredNotifier> {
    variables::block_entries(block)
        .into_iter()
        .filter(|entry| {
            let kind = variables::str_field(entry, "type");
            if kind.as_deref() != Some(notifier_type) {
                debug!("Ignoring notifier of type {:?} in group '{}'", kind, group);
                return false;
            }
            true
        })
        .filter_map(|entry| notifier(entry, group, defaults))
        .collect()
}

/// Collects the notifiers of every group carrying a notification block.
pub async fn collect_notifiers(
    source: &dyn InventorySource,
    config: &AlertmanagerConfig,
) -> Result<Vec<DesiredNotifier>, InventoryError> {
    let defaults = NotifierDefaults::from(config);
    let groups = inventory::groups_with_variable(source, &config.config_name).await?;

    let mut notifiers = Vec::new();
    for group in &groups {
        let vars = inventory::variables(source, &group.related.variable_data).await?;
        if let Some(block) = vars.extract(&config.config_name) {
            notifiers.extend(group_notifiers(
                block,
                &group.name,
                &config.notifier_type,
                defaults,
            ));
        }
    }
    info!(
        "Found {} notifiers in {} groups",
        notifiers.len(),
        groups.len()
    );
    Ok(notifiers)
}
