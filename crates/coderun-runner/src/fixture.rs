//! A [`HostBridge`] backed by an in-memory workbook loaded from YAML.

use std::future;
use std::sync::atomic::{AtomicU64, Ordering};

use camino::Utf8Path;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::bridge::{BridgeFuture, FieldMeta, HostBridge, RecordFields, TableInfo};
use crate::error::BridgeError;

fn default_language() -> String {
    "en".to_string()
}

/// Workbook contents.
///
/// ```yaml
/// language: en
/// active_table: tbl1
/// tables:
///   - id: tbl1
///     name: Tasks
///     fields:
///       - { id: fld1, name: Title, type: text }
///     records:
///       - id: rec1
///         fields: { fld1: Write docs }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Workbook {
    #[serde(default = "default_language")]
    pub language: String,
    /// Defaults to the first table
    #[serde(default)]
    pub active_table: Option<String>,
    #[serde(default)]
    pub tables: Vec<FixtureTable>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FixtureTable {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub fields: Vec<FieldMeta>,
    #[serde(default)]
    pub records: Vec<FixtureRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FixtureRecord {
    pub id: String,
    #[serde(default)]
    pub fields: RecordFields,
}

impl Workbook {
    /// Small two-field task table
    pub fn sample() -> Self {
        let field = |id: &str, name: &str, kind: &str| FieldMeta {
            id: id.to_string(),
            name: name.to_string(),
            kind: kind.to_string(),
        };
        let record = |id: &str, title: &str, done: bool| FixtureRecord {
            id: id.to_string(),
            fields: RecordFields::from_iter([
                ("fldTitle".to_string(), title.into()),
                ("fldDone".to_string(), done.into()),
            ]),
        };
        Workbook {
            language: default_language(),
            active_table: None,
            tables: vec![FixtureTable {
                id: "tblTasks".to_string(),
                name: "Tasks".to_string(),
                fields: vec![
                    field("fldTitle", "Title", "text"),
                    field("fldDone", "Done", "checkbox"),
                ],
                records: vec![
                    record("rec1", "Write the report", false),
                    record("rec2", "Review the budget", true),
                ],
            }],
        }
    }

    fn table(&self, id: &str) -> Result<&FixtureTable, BridgeError> {
        self.tables
            .iter()
            .find(|t| t.id == id)
            .ok_or_else(|| BridgeError::UnknownTable(id.to_string()))
    }

    fn active(&self) -> Result<&FixtureTable, BridgeError> {
        match &self.active_table {
            Some(id) => self.table(id),
            None => self.tables.first().ok_or(BridgeError::NoActiveTable),
        }
    }
}

/// Bridge over a [`Workbook`]. Added records are kept in memory only.
pub struct FixtureBridge {
    workbook: RwLock<Workbook>,
    next_record: AtomicU64,
}

impl FixtureBridge {
    pub fn new(workbook: Workbook) -> Self {
        // Continue after the highest `rec<n>`
        let highest = workbook
            .tables
            .iter()
            .flat_map(|t| &t.records)
            .filter_map(|r| r.id.strip_prefix("rec")?.parse::<u64>().ok())
            .max()
            .unwrap_or(0);
        Self {
            workbook: RwLock::new(workbook),
            next_record: AtomicU64::new(highest + 1),
        }
    }

    pub fn load(path: &Utf8Path) -> Result<Self, BridgeError> {
        let text = fs_err::read_to_string(path)?;
        let workbook = serde_yaml::from_str(&text).map_err(|source| BridgeError::Fixture {
            path: path.to_owned(),
            source,
        })?;
        tracing::debug!(%path, "loaded fixture workbook");
        Ok(Self::new(workbook))
    }

    /// Copy of the current workbook contents
    pub fn workbook(&self) -> Workbook {
        self.workbook.read().clone()
    }

    fn insert(&self, table_id: &str, fields: RecordFields) -> Result<String, BridgeError> {
        let mut workbook = self.workbook.write();
        let table = workbook
            .tables
            .iter_mut()
            .find(|t| t.id == table_id)
            .ok_or_else(|| BridgeError::UnknownTable(table_id.to_string()))?;

        // Keys may be field ids or field names; stored by id
        let mut by_id = RecordFields::new();
        for (key, value) in fields {
            let field = table
                .fields
                .iter()
                .find(|f| f.id == key || f.name == key)
                .ok_or_else(|| BridgeError::UnknownField {
                    table: table_id.to_string(),
                    field: key.clone(),
                })?;
            by_id.insert(field.id.clone(), value);
        }

        let id = format!("rec{}", self.next_record.fetch_add(1, Ordering::Relaxed));
        table.records.push(FixtureRecord {
            id: id.clone(),
            fields: by_id,
        });
        tracing::debug!(table = table_id, record = %id, "record added");
        Ok(id)
    }
}

impl Default for FixtureBridge {
    fn default() -> Self {
        Self::new(Workbook::sample())
    }
}

impl HostBridge for FixtureBridge {
    fn language(&self) -> BridgeFuture<'_, String> {
        Box::pin(future::ready(Ok(self.workbook.read().language.clone())))
    }

    fn active_table(&self) -> BridgeFuture<'_, TableInfo> {
        let result = self.workbook.read().active().map(|t| TableInfo {
            id: t.id.clone(),
            name: t.name.clone(),
        });
        Box::pin(future::ready(result))
    }

    fn record_ids<'a>(&'a self, table_id: &'a str) -> BridgeFuture<'a, Vec<String>> {
        let result = self
            .workbook
            .read()
            .table(table_id)
            .map(|t| t.records.iter().map(|r| r.id.clone()).collect());
        Box::pin(future::ready(result))
    }

    fn field_meta_list<'a>(&'a self, table_id: &'a str) -> BridgeFuture<'a, Vec<FieldMeta>> {
        let result = self
            .workbook
            .read()
            .table(table_id)
            .map(|t| t.fields.clone());
        Box::pin(future::ready(result))
    }

    fn add_record<'a>(
        &'a self,
        table_id: &'a str,
        fields: RecordFields,
    ) -> BridgeFuture<'a, String> {
        Box::pin(future::ready(self.insert(table_id, fields)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn sample_workbook_answers_queries() {
        let bridge = FixtureBridge::default();
        let table = bridge.active_table().await.unwrap();
        assert_eq!(table.name, "Tasks");
        assert_eq!(
            bridge.record_ids(&table.id).await.unwrap(),
            vec!["rec1", "rec2"]
        );
        let fields = bridge.field_meta_list(&table.id).await.unwrap();
        assert_eq!(fields[0].id, "fldTitle");
        assert_eq!(bridge.language().await.unwrap(), "en");
    }

    #[tokio::test]
    async fn add_record_accepts_ids_and_names() {
        let bridge = FixtureBridge::default();
        let fields = RecordFields::from_iter([
            ("fldTitle".to_string(), json!("New row")),
            ("Done".to_string(), json!(false)),
        ]);
        let id = bridge.add_record("tblTasks", fields).await.unwrap();
        assert_eq!(id, "rec3");

        let workbook = bridge.workbook();
        let added = workbook.tables[0].records.last().unwrap();
        assert_eq!(added.id, "rec3");
        assert_eq!(added.fields["fldDone"], json!(false));
    }

    #[tokio::test]
    async fn new_record_ids_follow_the_highest_existing_one() {
        let mut workbook = Workbook::sample();
        workbook.tables[0].records.truncate(1);
        workbook.tables[0].records[0].id = "rec7".to_string();
        workbook.tables[0].records.push(FixtureRecord {
            id: "imported".to_string(),
            fields: RecordFields::new(),
        });
        let bridge = FixtureBridge::new(workbook);

        let id = bridge
            .add_record("tblTasks", RecordFields::new())
            .await
            .unwrap();
        assert_eq!(id, "rec8");

        let mut workbook = Workbook::sample();
        workbook.tables[0].records.remove(0);
        let bridge = FixtureBridge::new(workbook);
        let id = bridge
            .add_record("tblTasks", RecordFields::new())
            .await
            .unwrap();
        assert_eq!(id, "rec3");
        let ids = bridge.record_ids("tblTasks").await.unwrap();
        assert_eq!(ids, vec!["rec2", "rec3"]);
    }

    #[tokio::test]
    async fn unknown_field_and_table_are_errors() {
        let bridge = FixtureBridge::default();
        let fields = RecordFields::from_iter([("nope".to_string(), json!(1))]);
        assert!(matches!(
            bridge.add_record("tblTasks", fields).await,
            Err(BridgeError::UnknownField { .. })
        ));
        assert!(matches!(
            bridge.record_ids("tblMissing").await,
            Err(BridgeError::UnknownTable(_))
        ));
    }

    #[tokio::test]
    async fn empty_workbook_has_no_active_table() {
        let bridge = FixtureBridge::new(Workbook::default());
        assert!(matches!(
            bridge.active_table().await,
            Err(BridgeError::NoActiveTable)
        ));
    }

    #[test]
    fn load_from_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = camino::Utf8PathBuf::from_path_buf(dir.path().join("wb.yaml")).unwrap();
        std::fs::write(
            &path,
            "language: zh-CN\nactive_table: t2\ntables:\n  - id: t1\n    name: One\n  - id: t2\n    name: Two\n",
        )
        .unwrap();
        let bridge = FixtureBridge::load(&path).unwrap();
        let workbook = bridge.workbook();
        assert_eq!(workbook.language, "zh-CN");
        assert_eq!(workbook.active().unwrap().name, "Two");

        std::fs::write(&path, "bogus: true\n").unwrap();
        assert!(matches!(
            FixtureBridge::load(&path),
            Err(BridgeError::Fixture { .. })
        ));
    }
}
