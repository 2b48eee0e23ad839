//! Data structures shared across the exporter.
//!
//! These are the values the exporter produces: desired notifiers derived
//! from group variables, and the target records handed to Prometheus
//! file-based service discovery. None of them are fed back into the
//! inventory; they are recomputed on every run.

use serde::Serialize;
use sha2::{Digest, Sha256};

/// Number of hex characters of the digest kept in a managed identifier.
const DIGEST_LEN: usize = 16;

/// A notification target declared in a group's variables.
///
/// The Alertmanager receiver and route derived from this value are owned
/// by the exporter and identified by [`DesiredNotifier::managed_id`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesiredNotifier {
    /// The `name` given to the entry in the group variables.
    pub name: String,
    /// Name of the inventory group that declared the notifier.
    pub group: String,
    /// Delivery address, empty when the entry has no `receiver-config.to`.
    pub destination: String,
    pub require_tls: bool,
    pub send_resolved: bool,
}

impl DesiredNotifier {
    /// Returns the identifier of the receiver and route owned by this notifier.
    ///
    /// The identifier starts with `prefix` so it can be recognised as
    /// machine-managed, keeps group and name readable, and ends with a
    /// digest of the `(group, name)` pair so that pairs such as
    /// `("a-b", "c")` and `("a", "b-c")` never map to the same value.
    pub fn managed_id(&self, prefix: &str) -> ManagedId {
        ManagedId::new(prefix, &self.group, &self.name)
    }
}

/// Identifier of a machine-managed Alertmanager entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ManagedId(String);

impl ManagedId {
    pub fn new(prefix: &str, group: &str, name: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(group.as_bytes());
        hasher.update([0u8]);
        hasher.update(name.as_bytes());
        let digest = hex::encode(hasher.finalize());
        Self(format!(
            "{}{}-{}-{}",
            prefix,
            group,
            name,
            &digest[..DIGEST_LEN]
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ManagedId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Labels attached to a Prometheus scrape target.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScrapeLabels {
    pub group: String,
    pub host: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job: Option<String>,
}

/// Labels attached to a blackbox probe target. `job` is always
/// [`PROBE_JOB`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProbeLabels {
    pub group: String,
    pub host: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    pub job: String,
    pub module: String,
}

/// Job label of every probe target.
pub const PROBE_JOB: &str = "blackbox";

/// One entry of a Prometheus `file_sd_configs` document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TargetRecord<L> {
    pub labels: L,
    pub targets: Vec<String>,
}

pub type ScrapeTarget = TargetRecord<ScrapeLabels>;
pub type ProbeTarget = TargetRecord<ProbeLabels>;
