//! Offline snapshot documents.
//!
//! A snapshot is two JSON files in the output directory: `model.json` holds
//! the source catalog and `data.json` the rows read by the seed and update
//! phases. Each file wraps its body in a header carrying the format version
//! and a SHA-256 checksum of the body, verified on load.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::info;

use crate::core::Catalog;
use crate::data::DataSet;
use crate::error::{MirrorError, Result};

/// Current document format.
pub const FORMAT_VERSION: u32 = 1;

pub const MODEL_FILE: &str = "model.json";
pub const DATA_FILE: &str = "data.json";

/// Document header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub format_version: u32,
    pub generated_at: DateTime<Utc>,
    /// Hex SHA-256 of the compact JSON body.
    pub checksum: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct Document {
    header: Header,
    body: serde_json::Value,
}

fn checksum(body: &serde_json::Value) -> Result<String> {
    let content = serde_json::to_string(body)?;
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    Ok(format!("{:x}", hasher.finalize()))
}

/// Serialize `body` into a headed document.
pub fn encode<T: Serialize>(body: &T) -> Result<String> {
    let body = serde_json::to_value(body)?;
    let document = Document {
        header: Header {
            format_version: FORMAT_VERSION,
            generated_at: Utc::now(),
            checksum: checksum(&body)?,
        },
        body,
    };
    Ok(serde_json::to_string_pretty(&document)?)
}

/// Parse and verify a headed document. `path` only labels errors.
pub fn decode<T: DeserializeOwned>(text: &str, path: &Path) -> Result<T> {
    let document: Document = serde_json::from_str(text)
        .map_err(|e| MirrorError::snapshot(path, format!("malformed document: {}", e)))?;

    if document.header.format_version != FORMAT_VERSION {
        return Err(MirrorError::snapshot(
            path,
            format!(
                "unsupported format version {} (expected {})",
                document.header.format_version, FORMAT_VERSION
            ),
        ));
    }
    if checksum(&document.body)? != document.header.checksum {
        return Err(MirrorError::snapshot(path, "checksum mismatch"));
    }

    serde_json::from_value(document.body)
        .map_err(|e| MirrorError::snapshot(path, format!("malformed body: {}", e)))
}

/// Write one document atomically.
fn write_document<T: Serialize>(path: &Path, body: &T) -> Result<()> {
    let content = encode(body)?;
    let temp_path = path.with_extension("tmp");
    std::fs::write(&temp_path, &content)?;
    std::fs::rename(&temp_path, path)?;
    Ok(())
}

fn read_document<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| MirrorError::snapshot(path, format!("unreadable: {}", e)))?;
    decode(&text, path)
}

/// Paths of the model and data documents under `dir`.
pub fn paths(dir: &Path) -> (PathBuf, PathBuf) {
    (dir.join(MODEL_FILE), dir.join(DATA_FILE))
}

/// Dump the source catalog and the rows read during the run.
pub fn write_snapshot(dir: &Path, catalog: &Catalog, data: &DataSet) -> Result<()> {
    let (model_path, data_path) = paths(dir);
    write_document(&model_path, catalog)?;
    write_document(&data_path, data)?;
    info!(
        "Wrote snapshot: {} tables, {} seed and {} update tables of rows to {}",
        catalog.tables().len(),
        data.seed.len(),
        data.update.len(),
        dir.display()
    );
    Ok(())
}

/// Load a snapshot written by [`write_snapshot`].
pub fn read_snapshot(dir: &Path) -> Result<(Catalog, DataSet)> {
    let (model_path, data_path) = paths(dir);
    let catalog: Catalog = read_document(&model_path)?;
    let data: DataSet = read_document(&data_path)?;
    info!(
        "Read snapshot of {} from {}: {} tables",
        catalog.database_name(),
        dir.display(),
        catalog.tables().len()
    );
    Ok((catalog, data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::schema::{Column, Database, ForeignKey, Routine, RoutineKind, Schema, Table};
    use crate::core::CatalogData;
    use chrono::NaiveDate;

    fn make_catalog() -> Catalog {
        let stamp = NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_milli_opt(8, 30, 0, 125)
            .unwrap();
        let table = |id: i32, name: &str| Table {
            id,
            schema_id: 1,
            schema: "dbo".to_string(),
            name: name.to_string(),
            has_identity: id == 1,
            history: None,
        };
        let column = |table_id: i32, table: &str, name: &str| Column {
            table_id,
            schema: "dbo".to_string(),
            table: table.to_string(),
            name: name.to_string(),
            ordinal: 1,
            data_type: "int".to_string(),
            max_length: 4,
            precision: 10,
            scale: 0,
            is_nullable: false,
            is_identity: false,
            is_computed: false,
            computed_definition: None,
            default: None,
            primary_key: Some(format!("PK_{}", table)),
            primary_key_type: Some("CLUSTERED".to_string()),
            generated: None,
        };

        let mut data = CatalogData {
            database: Some(Database {
                id: 7,
                name: "Shop".to_string(),
            }),
            schemas: vec![Schema {
                id: 1,
                name: "dbo".to_string(),
            }],
            tables: vec![table(2, "Order"), table(1, "Customer")],
            columns: vec![column(2, "Order", "Id"), column(1, "Customer", "Id")],
            foreign_keys: vec![ForeignKey {
                id: 30,
                name: "FK_Order_Customer".to_string(),
                schema: "dbo".to_string(),
                parent_table_id: 2,
                parent_table: "Order".to_string(),
                parent_columns: vec!["CustomerId".to_string()],
                referenced_schema: "dbo".to_string(),
                referenced_table: "Customer".to_string(),
                referenced_columns: vec!["Id".to_string()],
                trusted: false,
            }],
            routines: vec![Routine {
                id: 40,
                schema: "dbo".to_string(),
                name: "Orders".to_string(),
                kind: RoutineKind::View,
                definition: "CREATE VIEW dbo.Orders AS SELECT * FROM dbo.[Order]".to_string(),
                created: stamp,
                modified: Some(stamp),
            }],
            ..Default::default()
        };
        data.last_changes.insert("[dbo].[Order]".to_string(), stamp);
        Catalog::new(data)
    }

    #[test]
    fn test_snapshot_round_trip_rebuilds_lookups() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = make_catalog();
        let mut rows = DataSet::default();
        rows.seed.insert(
            "[dbo].[Customer]".to_string(),
            vec![[("Id".to_string(), "1".to_string())].into_iter().collect()],
        );

        write_snapshot(dir.path(), &catalog, &rows).unwrap();
        let (decoded, decoded_rows) = read_snapshot(dir.path()).unwrap();

        assert_eq!(decoded, catalog);
        assert_eq!(decoded_rows, rows);
        assert_eq!(decoded.id_of("[dbo].[FK_Order_Customer]"), Some(30));
        assert_eq!(decoded.kind_of(40), catalog.kind_of(40));
        assert_eq!(decoded.columns_of(1).len(), 1);
        assert!(!dir.path().join("model.tmp").exists());
    }

    #[test]
    fn test_tampered_body_is_rejected() {
        let text = encode(&make_catalog()).unwrap();
        let tampered = text.replacen("\"Customer\"", "\"Client\"", 1);
        let err = decode::<Catalog>(&tampered, Path::new("model.json")).unwrap_err();
        assert_eq!(err.exit_code(), 3);
        assert!(err.to_string().contains("checksum mismatch"));
    }

    #[test]
    fn test_version_and_syntax_errors() {
        let text = encode(&DataSet::default()).unwrap();
        let future = text.replace("\"format_version\": 1", "\"format_version\": 9");
        let err = decode::<DataSet>(&future, Path::new("data.json")).unwrap_err();
        assert!(err.to_string().contains("unsupported format version 9"));

        let err = decode::<DataSet>("{not json", Path::new("data.json")).unwrap_err();
        assert!(matches!(err, MirrorError::Snapshot { .. }));
    }

    #[test]
    fn test_missing_snapshot_is_snapshot_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_snapshot(dir.path()).unwrap_err();
        assert_eq!(err.exit_code(), 3);
    }
}
