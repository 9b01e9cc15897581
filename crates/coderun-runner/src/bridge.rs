//! The host bridge: the table product's scripting API as seen by snippets.

use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

use crate::error::BridgeError;

/// Boxed future returned by bridge methods
pub type BridgeFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, BridgeError>> + Send + 'a>>;

/// Identity of a table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableInfo {
    pub id: String,
    pub name: String,
}

/// Field metadata as the host reports it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMeta {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
}

/// Values for a new record, keyed by field id
pub type RecordFields = serde_json::Map<String, serde_json::Value>;

/// Access to the host workbook.
///
/// Implementations must be shareable across runs; every call may come from
/// a different blocking worker.
pub trait HostBridge: Send + Sync {
    /// Host UI language tag, e.g. `en-US`
    fn language(&self) -> BridgeFuture<'_, String>;

    fn active_table(&self) -> BridgeFuture<'_, TableInfo>;

    fn record_ids<'a>(&'a self, table_id: &'a str) -> BridgeFuture<'a, Vec<String>>;

    fn field_meta_list<'a>(&'a self, table_id: &'a str) -> BridgeFuture<'a, Vec<FieldMeta>>;

    /// Append a record; returns its id
    fn add_record<'a>(&'a self, table_id: &'a str, fields: RecordFields)
    -> BridgeFuture<'a, String>;
}
