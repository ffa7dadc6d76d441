//! SQL Server catalog reader using Tiberius.
//!
//! Every query opens its own connection, drains the first result set, and
//! drops the connection. Nothing is pooled or streamed.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use tiberius::{AuthMethod, Client, Config, EncryptionLevel, Query, Row};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::debug;
use uuid::Uuid;

use super::queries;
use crate::config::ConnectionConfig;
use crate::core::identifier::qualified;
use crate::core::schema::{
    Column, Constraint, ConstraintKind, Database, DefaultConstraint, ForeignKey, GeneratedRole,
    HistoryTable, Index, KeyColumn, ObjectId, Routine, RoutineKind, Schema, Table, TableType,
};
use crate::core::traits::{CatalogReader, RowValues, TableScope};
use crate::core::value::SqlValue;
use crate::error::{MirrorError, Result};

/// Read-only SQL Server connection descriptor.
pub struct MssqlReader {
    config: ConnectionConfig,
}

impl MssqlReader {
    pub fn new(config: ConnectionConfig) -> Self {
        Self { config }
    }

    /// Build the Tiberius configuration.
    fn build_config(&self) -> Config {
        let mut config = Config::new();
        config.host(&self.config.host);
        config.port(self.config.port);
        config.database(&self.config.database);
        config.application_name("mssql-mirror");
        config.authentication(AuthMethod::sql_server(
            &self.config.user,
            &self.config.password,
        ));

        if self.config.trust_server_cert {
            config.trust_cert();
        }

        if self.config.encrypt {
            config.encryption(EncryptionLevel::Required);
        } else {
            config.encryption(EncryptionLevel::NotSupported);
        }

        config
    }

    async fn connect(&self) -> Result<Client<Compat<TcpStream>>> {
        let context = format!(
            "connecting to {}:{}/{}",
            self.config.host, self.config.port, self.config.database
        );
        let config = self.build_config();
        let tcp = TcpStream::connect(config.get_addr())
            .await
            .map_err(|e| MirrorError::load(context.clone(), e))?;
        tcp.set_nodelay(true)
            .map_err(|e| MirrorError::load(context.clone(), e))?;

        Client::connect(config, tcp.compat_write())
            .await
            .map_err(|e| MirrorError::load(context, e))
    }

    /// Run one query on a fresh connection and return its first result set.
    async fn fetch(&self, context: &str, sql: &str, params: &[&str]) -> Result<Vec<Row>> {
        let mut client = self.connect().await?;

        let mut query = Query::new(sql);
        for param in params {
            query.bind(*param);
        }

        let stream = query
            .query(&mut client)
            .await
            .map_err(|e| MirrorError::load(context, e))?;
        let rows = stream
            .into_first_result()
            .await
            .map_err(|e| MirrorError::load(context, e))?;

        debug!("{}: {} rows from {}", context, rows.len(), self.config.database);
        Ok(rows)
    }
}

// =============================================================================
// Row decoding helpers
// =============================================================================

fn decode_err(idx: usize, e: impl ToString) -> MirrorError {
    MirrorError::load(format!("decoding column {}", idx), e)
}

fn opt_text(row: &Row, idx: usize) -> Result<Option<String>> {
    row.try_get::<&str, _>(idx)
        .map(|v| v.map(str::to_string))
        .map_err(|e| decode_err(idx, e))
}

fn text(row: &Row, idx: usize) -> Result<String> {
    opt_text(row, idx)?.ok_or_else(|| decode_err(idx, "unexpected NULL"))
}

fn opt_int(row: &Row, idx: usize) -> Result<Option<i32>> {
    row.try_get::<i32, _>(idx).map_err(|e| decode_err(idx, e))
}

fn int(row: &Row, idx: usize) -> Result<i32> {
    opt_int(row, idx)?.ok_or_else(|| decode_err(idx, "unexpected NULL"))
}

fn flag(row: &Row, idx: usize) -> Result<bool> {
    Ok(opt_int(row, idx)?.unwrap_or(0) != 0)
}

fn timestamp(row: &Row, idx: usize) -> Result<Option<NaiveDateTime>> {
    row.try_get::<NaiveDateTime, _>(idx)
        .map_err(|e| decode_err(idx, e))
}

/// Decode a row value according to its SQL Server type.
fn convert_row_value(row: &Row, idx: usize, data_type: &str) -> Result<SqlValue> {
    let dt = data_type.to_lowercase();
    let err = |e: tiberius::error::Error| decode_err(idx, e);

    let value = match dt.as_str() {
        "bit" => row.try_get::<bool, _>(idx).map_err(err)?.map(SqlValue::Bool),
        "tinyint" => row
            .try_get::<u8, _>(idx)
            .map_err(err)?
            .map(|v| SqlValue::I16(v as i16)),
        "smallint" => row.try_get::<i16, _>(idx).map_err(err)?.map(SqlValue::I16),
        "int" => row.try_get::<i32, _>(idx).map_err(err)?.map(SqlValue::I32),
        "bigint" => row.try_get::<i64, _>(idx).map_err(err)?.map(SqlValue::I64),
        "real" => row.try_get::<f32, _>(idx).map_err(err)?.map(SqlValue::F32),
        "float" => row.try_get::<f64, _>(idx).map_err(err)?.map(SqlValue::F64),
        "uniqueidentifier" => row.try_get::<Uuid, _>(idx).map_err(err)?.map(SqlValue::Uuid),
        "datetime" | "datetime2" | "smalldatetime" => row
            .try_get::<NaiveDateTime, _>(idx)
            .map_err(err)?
            .map(SqlValue::DateTime),
        "date" => row.try_get::<NaiveDate, _>(idx).map_err(err)?.map(SqlValue::Date),
        "time" => row.try_get::<NaiveTime, _>(idx).map_err(err)?.map(SqlValue::Time),
        "datetimeoffset" => row
            .try_get::<DateTime<FixedOffset>, _>(idx)
            .map_err(err)?
            .map(SqlValue::DateTimeOffset),
        "binary" | "varbinary" | "image" | "timestamp" | "rowversion" => row
            .try_get::<&[u8], _>(idx)
            .map_err(err)?
            .map(|v| SqlValue::Bytes(v.to_vec())),
        "decimal" | "numeric" | "money" | "smallmoney" => match row.try_get::<Decimal, _>(idx) {
            Ok(v) => v.map(SqlValue::Decimal),
            // money arrives as a float on some servers
            Err(_) => row.try_get::<f64, _>(idx).map_err(err)?.map(|f| {
                Decimal::try_from(f)
                    .map(SqlValue::Decimal)
                    .unwrap_or(SqlValue::F64(f))
            }),
        },
        // Character data; anything that does not decode as text renders as NULL.
        _ => row
            .try_get::<&str, _>(idx)
            .ok()
            .flatten()
            .map(|s| SqlValue::Text(s.to_string())),
    };

    Ok(value.unwrap_or(SqlValue::Null))
}

// =============================================================================
// CatalogReader implementation
// =============================================================================

#[async_trait]
impl CatalogReader for MssqlReader {
    async fn database(&self) -> Result<Option<Database>> {
        let rows = self
            .fetch("database identity", queries::DATABASE, &[self.config.database.as_str()])
            .await?;
        rows.first()
            .map(|row| -> Result<_> {
                Ok(Database {
                    id: int(row, 0)?,
                    name: text(row, 1)?,
                })
            })
            .transpose()
    }

    async fn schema_names(&self) -> Result<Vec<String>> {
        let rows = self.fetch("schema names", queries::SCHEMA_NAMES, &[]).await?;
        rows.iter().map(|row| text(row, 0)).collect()
    }

    async fn schemas(&self, names: &BTreeSet<String>) -> Result<Vec<Schema>> {
        let rows = self.fetch("schemas", &queries::schemas(names), &[]).await?;
        rows.iter()
            .map(|row| -> Result<_> {
                Ok(Schema {
                    id: int(row, 0)?,
                    name: text(row, 1)?,
                })
            })
            .collect()
    }

    async fn tables(&self, scope: &TableScope) -> Result<Vec<Table>> {
        let rows = self.fetch("tables", &queries::tables(scope), &[]).await?;
        rows.iter()
            .map(|row| -> Result<_> {
                let history = match (opt_text(row, 5)?, opt_text(row, 6)?) {
                    (Some(schema), Some(name)) => Some(HistoryTable { schema, name }),
                    _ => None,
                };
                Ok(Table {
                    id: int(row, 0)?,
                    schema_id: int(row, 1)?,
                    schema: text(row, 2)?,
                    name: text(row, 3)?,
                    has_identity: flag(row, 4)?,
                    history,
                })
            })
            .collect()
    }

    async fn columns(&self, schema_ids: &[ObjectId]) -> Result<Vec<Column>> {
        let rows = self
            .fetch("columns", &queries::columns(schema_ids), &[])
            .await?;
        rows.iter()
            .map(|row| -> Result<_> {
                let default = match (opt_text(row, 13)?, opt_text(row, 14)?) {
                    (Some(name), Some(definition)) => Some(DefaultConstraint { name, definition }),
                    _ => None,
                };
                let generated = match opt_int(row, 17)? {
                    Some(1) => Some(GeneratedRole::RowStart),
                    Some(2) => Some(GeneratedRole::RowEnd),
                    _ => None,
                };
                Ok(Column {
                    table_id: int(row, 0)?,
                    schema: text(row, 1)?,
                    table: text(row, 2)?,
                    name: text(row, 3)?,
                    ordinal: int(row, 4)?,
                    data_type: text(row, 5)?,
                    max_length: int(row, 6)?,
                    precision: int(row, 7)?,
                    scale: int(row, 8)?,
                    is_nullable: flag(row, 9)?,
                    is_identity: flag(row, 10)?,
                    is_computed: flag(row, 11)?,
                    computed_definition: opt_text(row, 12)?,
                    default,
                    primary_key: opt_text(row, 15)?,
                    primary_key_type: opt_text(row, 16)?,
                    generated,
                })
            })
            .collect()
    }

    async fn foreign_keys(&self, schema_ids: &[ObjectId]) -> Result<Vec<ForeignKey>> {
        let rows = self
            .fetch("foreign keys", &queries::foreign_keys(schema_ids), &[])
            .await?;

        let mut keys: Vec<ForeignKey> = Vec::new();
        for row in &rows {
            let id = int(row, 0)?;
            let parent_column = text(row, 5)?;
            let referenced_column = text(row, 8)?;

            match keys.last_mut() {
                Some(fk) if fk.id == id => {
                    fk.parent_columns.push(parent_column);
                    fk.referenced_columns.push(referenced_column);
                }
                _ => keys.push(ForeignKey {
                    id,
                    name: text(row, 1)?,
                    schema: text(row, 2)?,
                    parent_table_id: int(row, 3)?,
                    parent_table: text(row, 4)?,
                    parent_columns: vec![parent_column],
                    referenced_schema: text(row, 6)?,
                    referenced_table: text(row, 7)?,
                    referenced_columns: vec![referenced_column],
                    trusted: !flag(row, 9)?,
                }),
            }
        }
        Ok(keys)
    }

    async fn constraints(&self, schema_ids: &[ObjectId]) -> Result<Vec<Constraint>> {
        let rows = self
            .fetch("constraints", &queries::constraints(schema_ids), &[])
            .await?;

        let mut constraints: Vec<Constraint> = Vec::new();
        for row in &rows {
            let id = int(row, 0)?;
            let descending = flag(row, 7)?;
            let column = opt_text(row, 6)?.map(|name| KeyColumn { name, descending });

            if let Some(existing) = constraints.last_mut().filter(|c| c.id == id) {
                existing.columns.extend(column);
                continue;
            }

            let code = text(row, 5)?;
            let kind = ConstraintKind::from_code(&code)
                .ok_or_else(|| MirrorError::load("constraints", format!("unknown type {}", code)))?;
            constraints.push(Constraint {
                id,
                name: text(row, 1)?,
                schema: text(row, 2)?,
                parent_table_id: int(row, 3)?,
                table: text(row, 4)?,
                kind,
                columns: column.into_iter().collect(),
                index_type: opt_text(row, 8)?,
                definition: opt_text(row, 9)?,
                trusted: flag(row, 10)?,
            });
        }
        Ok(constraints)
    }

    async fn indexes(&self, schema_ids: &[ObjectId]) -> Result<Vec<Index>> {
        let rows = self
            .fetch("indexes", &queries::indexes(schema_ids), &[])
            .await?;

        let mut indexes: Vec<Index> = Vec::new();
        for row in &rows {
            let table_id = int(row, 0)?;
            let index_id = int(row, 1)?;
            let column = text(row, 6)?;
            let descending = flag(row, 7)?;
            let included = flag(row, 8)?;

            let continues = matches!(
                indexes.last(),
                Some(ix) if ix.table_id == table_id && ix.index_id == index_id
            );
            if !continues {
                indexes.push(Index {
                    table_id,
                    index_id,
                    name: text(row, 2)?,
                    schema: text(row, 3)?,
                    table: text(row, 4)?,
                    type_desc: text(row, 5)?,
                    columns: Vec::new(),
                    included: Vec::new(),
                    filter: opt_text(row, 9)?,
                });
            }
            let Some(index) = indexes.last_mut() else {
                continue;
            };

            if included {
                index.included.push(column);
            } else {
                index.columns.push(KeyColumn {
                    name: column,
                    descending,
                });
            }
        }
        Ok(indexes)
    }

    async fn table_types(&self, schema_ids: &[ObjectId]) -> Result<Vec<TableType>> {
        let rows = self
            .fetch("table types", &queries::table_types(schema_ids), &[])
            .await?;

        let mut types: Vec<TableType> = Vec::new();
        for row in &rows {
            let id = int(row, 0)?;
            let schema = text(row, 1)?;
            let name = text(row, 2)?;
            let column = Column {
                table_id: id,
                schema: schema.clone(),
                table: name.clone(),
                name: text(row, 3)?,
                ordinal: int(row, 4)?,
                data_type: text(row, 5)?,
                max_length: int(row, 6)?,
                precision: int(row, 7)?,
                scale: int(row, 8)?,
                is_nullable: flag(row, 9)?,
                is_identity: flag(row, 10)?,
                is_computed: false,
                computed_definition: None,
                default: None,
                primary_key: None,
                primary_key_type: None,
                generated: None,
            };

            match types.last_mut() {
                Some(tt) if tt.id == id => tt.columns.push(column.definition()),
                _ => types.push(TableType {
                    id,
                    schema,
                    name,
                    columns: vec![column.definition()],
                }),
            }
        }
        Ok(types)
    }

    async fn routines(&self, kinds: &[RoutineKind], schema_ids: &[ObjectId]) -> Result<Vec<Routine>> {
        let rows = self
            .fetch("routines", &queries::routines(kinds, schema_ids), &[])
            .await?;
        rows.iter()
            .map(|row| -> Result<_> {
                let code = text(row, 3)?;
                let kind = RoutineKind::from_code(&code)
                    .ok_or_else(|| MirrorError::load("routines", format!("unknown type {}", code)))?;
                Ok(Routine {
                    id: int(row, 0)?,
                    schema: text(row, 1)?,
                    name: text(row, 2)?,
                    kind,
                    definition: text(row, 4)?,
                    created: timestamp(row, 5)?
                        .ok_or_else(|| decode_err(5, "unexpected NULL"))?,
                    modified: timestamp(row, 6)?,
                })
            })
            .collect()
    }

    async fn last_changes(&self, schema_ids: &[ObjectId]) -> Result<BTreeMap<String, NaiveDateTime>> {
        let rows = self
            .fetch("last changes", &queries::last_changes(schema_ids), &[])
            .await?;

        let mut changes = BTreeMap::new();
        for row in &rows {
            if let Some(at) = timestamp(row, 2)? {
                changes.insert(qualified(&text(row, 0)?, &text(row, 1)?), at);
            }
        }
        Ok(changes)
    }

    async fn rows(&self, table: &Table, columns: &[&Column]) -> Result<Vec<RowValues>> {
        let names: Vec<&str> = columns.iter().map(|c| c.name.as_str()).collect();
        let sql = queries::select_rows(&table.schema, &table.name, &names);
        let context = format!("rows of {}", table.qualified_name());

        let rows = self.fetch(&context, &sql, &[]).await?;
        rows.iter()
            .map(|row| -> Result<_> {
                columns
                    .iter()
                    .enumerate()
                    .map(|(idx, col)| convert_row_value(row, idx, &col.data_type))
                    .collect()
            })
            .collect()
    }

    async fn ping(&self) -> Result<()> {
        self.fetch("health check", queries::PING, &[]).await?;
        Ok(())
    }
}
