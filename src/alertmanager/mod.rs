//! Alertmanager configuration: the document model and the reconciler
//! keeping its exporter-owned entries in sync with the inventory.

pub mod document;
pub mod reconcile;

pub use document::{write_atomic, AlertmanagerDocument, DocumentError};
pub use reconcile::{reconcile, ReconcileError, ReconcileReport};
