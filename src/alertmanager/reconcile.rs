//! Synchronises exporter-owned receivers and routes with the inventory.
//!
//! Entries whose name starts with the managed prefix belong to the
//! exporter. Each collection goes through the same three phases:
//!
//! 1. prune managed entries that no desired notifier maps to,
//! 2. update the owned fields of the remaining managed entries in place,
//! 3. append an entry for every desired notifier still missing.
//!
//! Entries without the prefix are never removed, changed or moved.

use std::collections::{HashMap, HashSet};

use log::info;
use serde_yaml::Mapping;
use thiserror::Error;

use super::document::{AlertmanagerDocument, EmailConfig, Receiver, Route};
use crate::types::{DesiredNotifier, ManagedId};

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ReconcileError {
    #[error("Managed {kind} '{id}' has no desired notifier after pruning")]
    MissingNotifier { kind: &'static str, id: String },
}

/// An entry of a collection the reconciler can own.
pub trait ManagedEntry {
    /// Singular name of the collection's entries, used in logs and errors.
    const KIND: &'static str;

    fn id(&self) -> Option<&str>;

    /// Builds a new entry owned by `notifier`.
    fn create(id: &ManagedId, notifier: &DesiredNotifier) -> Self;

    /// Overwrites the fields owned by the exporter, leaving all others alone.
    fn sync(&mut self, notifier: &DesiredNotifier);
}

impl ManagedEntry for Receiver {
    const KIND: &'static str = "receiver";

    fn id(&self) -> Option<&str> {
        Some(&self.name)
    }

    fn create(id: &ManagedId, notifier: &DesiredNotifier) -> Self {
        let mut receiver = Receiver {
            name: id.to_string(),
            ..Receiver::default()
        };
        receiver.sync(notifier);
        receiver
    }

    fn sync(&mut self, notifier: &DesiredNotifier) {
        if self.email_configs.is_empty() {
            self.email_configs.push(EmailConfig::default());
        }
        for email in &mut self.email_configs {
            email.to = Some(notifier.destination.clone());
            email.require_tls = Some(notifier.require_tls);
            email.send_resolved = Some(notifier.send_resolved);
        }
    }
}

impl ManagedEntry for Route {
    const KIND: &'static str = "route";

    fn id(&self) -> Option<&str> {
        self.receiver.as_deref()
    }

    fn create(id: &ManagedId, notifier: &DesiredNotifier) -> Self {
        let mut route = Route {
            receiver: Some(id.to_string()),
            ..Route::default()
        };
        route.sync(notifier);
        route
    }

    fn sync(&mut self, notifier: &DesiredNotifier) {
        let mut matchers = Mapping::new();
        matchers.insert("group".into(), notifier.group.clone().into());
        self.matchers = Some(matchers);
    }
}

/// Desired notifiers keyed by their managed identifier.
pub struct DesiredIndex<'a> {
    prefix: &'a str,
    by_id: HashMap<String, &'a DesiredNotifier>,
    ordered: Vec<(ManagedId, &'a DesiredNotifier)>,
}

impl<'a> DesiredIndex<'a> {
    pub fn new(notifiers: &'a [DesiredNotifier], prefix: &'a str) -> Self {
        let mut by_id = HashMap::new();
        let mut ordered = Vec::with_capacity(notifiers.len());
        for notifier in notifiers {
            let id = notifier.managed_id(prefix);
            by_id.entry(id.to_string()).or_insert(notifier);
            ordered.push((id, notifier));
        }
        Self {
            prefix,
            by_id,
            ordered,
        }
    }

    pub fn is_managed(&self, id: &str) -> bool {
        id.starts_with(self.prefix)
    }

    /// Finds the notifier owning `id`, `None` when the entry is orphaned.
    pub fn lookup(&self, id: &str) -> Option<&'a DesiredNotifier> {
        self.by_id.get(id).copied()
    }

    fn managed_id<'e, E: ManagedEntry>(&self, entry: &'e E) -> Option<&'e str> {
        entry.id().filter(|id| self.is_managed(id))
    }
}

/// Counts of what one collection went through.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PhaseStats {
    pub pruned: usize,
    pub updated: usize,
    pub inserted: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub receivers: PhaseStats,
    pub routes: PhaseStats,
}

fn prune<E: ManagedEntry>(
    entries: Vec<E>,
    index: &DesiredIndex,
    stats: &mut PhaseStats,
) -> Vec<E> {
    let before = entries.len();
    let kept: Vec<E> = entries
        .into_iter()
        .filter(|entry| match index.managed_id(entry) {
            Some(id) => index.lookup(id).is_some(),
            None => true,
        })
        .collect();
    stats.pruned = before - kept.len();
    kept
}

fn update<E: ManagedEntry>(
    entries: &mut [E],
    index: &DesiredIndex,
    stats: &mut PhaseStats,
) -> Result<(), ReconcileError> {
    for entry in entries.iter_mut() {
        let Some(id) = index.managed_id(entry) else {
            continue;
        };
        let notifier = index
            .lookup(id)
            .ok_or_else(|| ReconcileError::MissingNotifier {
                kind: E::KIND,
                id: id.to_string(),
            })?;
        entry.sync(notifier);
        stats.updated += 1;
    }
    Ok(())
}

fn insert<E: ManagedEntry>(entries: &mut Vec<E>, index: &DesiredIndex, stats: &mut PhaseStats) {
    let mut present: HashSet<String> = entries
        .iter()
        .filter_map(|entry| index.managed_id(entry))
        .map(str::to_string)
        .collect();
    for (id, notifier) in &index.ordered {
        if present.insert(id.to_string()) {
            entries.push(E::create(id, notifier));
            stats.inserted += 1;
        }
    }
}

/// Runs prune, update and insert over one collection.
pub fn reconcile_entries<E: ManagedEntry>(
    entries: Vec<E>,
    index: &DesiredIndex,
) -> Result<(Vec<E>, PhaseStats), ReconcileError> {
    let mut stats = PhaseStats::default();
    let mut entries = prune(entries, index, &mut stats);
    update(&mut entries, index, &mut stats)?;
    insert(&mut entries, index, &mut stats);
    info!(
        "Reconciled {}s: {} pruned, {} updated, {} inserted",
        E::KIND,
        stats.pruned,
        stats.updated,
        stats.inserted
    );
    Ok((entries, stats))
}

/// Brings the managed receivers and child routes of `document` in line
/// with `notifiers`.
///
/// The document is only modified once both collections reconciled
/// successfully.
pub fn reconcile(
    document: &mut AlertmanagerDocument,
    notifiers: &[DesiredNotifier],
    prefix: &str,
) -> Result<ReconcileReport, ReconcileError> {
    let index = DesiredIndex::new(notifiers, prefix);

    let (receivers, receiver_stats) = reconcile_entries(document.receivers.clone(), &index)?;

    let routes = match &document.route {
        Some(route) => Some(reconcile_entries(route.routes.clone(), &index)?),
        None if notifiers.is_empty() => None,
        None => Some(reconcile_entries(Vec::new(), &index)?),
    };

    document.receivers = receivers;
    let route_stats = match routes {
        Some((routes, stats)) => {
            *document.routes_mut() = routes;
            stats
        }
        None => PhaseStats::default(),
    };

    Ok(ReconcileReport {
        receivers: receiver_stats,
        routes: route_stats,
    })
}
