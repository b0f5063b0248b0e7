//! SQLite document store.
//!
//! # Responsibility
//! - Persist serialized objects in the `objects` table as JSON documents.
//! - Translate repository criteria into `json_extract` comparisons.
//! - Commit flush batches inside one `IMMEDIATE` transaction.
//!
//! # Invariants
//! - `(class_name, object_id)` is unique.
//! - JSON paths and filter values are always bound, never interpolated.
//! - Read paths reject corrupt rows instead of masking them.

use crate::db::migrations::latest_version;
use crate::db::{open_db_in_memory_with, open_db_with, DbOptions};
use crate::model::identifier::Identifier;
use crate::repository::criteria::Criteria;
use crate::store::{ChangeBatch, Document, ObjectStore, StoreError, StoreOperation, StoreResult};
use log::{debug, error};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, Row, TransactionBehavior};
use serde_json::Value;
use std::path::Path;
use std::time::Instant;

const OBJECT_SELECT_SQL: &str = "SELECT
    class_name,
    object_id,
    data,
    version
FROM objects";

const OBJECTS_TABLE: &str = "objects";
const OBJECTS_COLUMNS: [&str; 6] = [
    "class_name",
    "object_id",
    "data",
    "version",
    "created_at",
    "updated_at",
];

/// SQLite-backed `ObjectStore`.
pub struct SqliteObjectStore {
    conn: Connection,
}

impl SqliteObjectStore {
    /// Opens (and migrates) a database file.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        Self::open_with(path, &DbOptions::default())
    }

    pub fn open_with(path: impl AsRef<Path>, options: &DbOptions) -> StoreResult<Self> {
        Self::try_new(open_db_with(path, options)?)
    }

    /// Opens a private in-memory database.
    pub fn open_in_memory() -> StoreResult<Self> {
        Self::open_in_memory_with(&DbOptions::default())
    }

    pub fn open_in_memory_with(options: &DbOptions) -> StoreResult<Self> {
        Self::try_new(open_db_in_memory_with(options)?)
    }

    /// Wraps a connection that is already migrated to the latest schema.
    pub fn try_new(conn: Connection) -> StoreResult<Self> {
        ensure_store_connection_ready(&conn)?;
        Ok(Self { conn })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Number of stored documents per class, ordered by class name.
    pub fn class_counts(&self) -> StoreResult<Vec<(String, u64)>> {
        let mut stmt = self.conn.prepare(
            "SELECT class_name, COUNT(*) AS total
             FROM objects
             GROUP BY class_name
             ORDER BY class_name ASC;",
        )?;
        let mut rows = stmt.query([])?;
        let mut counts = Vec::new();
        while let Some(row) = rows.next()? {
            let class_name: String = row.get("class_name")?;
            let total: i64 = row.get("total")?;
            counts.push((class_name, to_count(total)?));
        }
        Ok(counts)
    }
}

impl ObjectStore for SqliteObjectStore {
    fn load(&self, class_name: &str, identifier: &Identifier) -> StoreResult<Option<Document>> {
        let mut stmt = self.conn.prepare(&format!(
            "{OBJECT_SELECT_SQL}
             WHERE class_name = ?1
               AND object_id = ?2;"
        ))?;
        let mut rows = stmt.query(params![class_name, identifier.as_str()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_document_row(row)?));
        }
        Ok(None)
    }

    fn exists(&self, class_name: &str, identifier: &Identifier) -> StoreResult<bool> {
        row_exists(&self.conn, class_name, identifier)
    }

    fn query(&self, class_name: &str, criteria: &Criteria) -> StoreResult<Vec<Document>> {
        let mut sql = format!("{OBJECT_SELECT_SQL} WHERE class_name = ?");
        let mut bind_values = vec![SqlValue::Text(class_name.to_string())];
        push_filters(&mut sql, &mut bind_values, criteria)?;

        sql.push_str(" ORDER BY ");
        for (field, order) in &criteria.ordering {
            sql.push_str("json_extract(data, ?) ");
            sql.push_str(order.as_sql());
            sql.push_str(", ");
            bind_values.push(SqlValue::Text(json_path(field)));
        }
        sql.push_str("object_id ASC");

        if let Some(limit) = criteria.limit {
            sql.push_str(" LIMIT ?");
            bind_values.push(SqlValue::Integer(i64::from(limit)));
            if criteria.offset > 0 {
                sql.push_str(" OFFSET ?");
                bind_values.push(SqlValue::Integer(i64::from(criteria.offset)));
            }
        } else if criteria.offset > 0 {
            sql.push_str(" LIMIT -1 OFFSET ?");
            bind_values.push(SqlValue::Integer(i64::from(criteria.offset)));
        }

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut documents = Vec::new();
        while let Some(row) = rows.next()? {
            documents.push(parse_document_row(row)?);
        }
        Ok(documents)
    }

    fn count(&self, class_name: &str, criteria: &Criteria) -> StoreResult<u64> {
        let mut sql = String::from("SELECT COUNT(*) FROM objects WHERE class_name = ?");
        let mut bind_values = vec![SqlValue::Text(class_name.to_string())];
        push_filters(&mut sql, &mut bind_values, criteria)?;

        let total: i64 =
            self.conn
                .query_row(&sql, params_from_iter(bind_values), |row| row.get(0))?;
        to_count(total)
    }

    fn commit(&mut self, batch: &ChangeBatch) -> StoreResult<()> {
        if batch.is_empty() {
            return Ok(());
        }

        let started_at = Instant::now();
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        for operation in &batch.operations {
            if let Err(err) = apply_operation(&tx, operation) {
                error!(
                    "event=store_commit module=store status=error operations={} duration_ms={} error={err}",
                    batch.len(),
                    started_at.elapsed().as_millis()
                );
                return Err(err);
            }
        }
        tx.commit()?;

        debug!(
            "event=store_commit module=store status=ok operations={} duration_ms={}",
            batch.len(),
            started_at.elapsed().as_millis()
        );
        Ok(())
    }
}

fn apply_operation(conn: &Connection, operation: &StoreOperation) -> StoreResult<()> {
    match operation {
        StoreOperation::Insert {
            class_name,
            identifier,
            data,
        } => {
            let inserted = conn.execute(
                "INSERT INTO objects (class_name, object_id, data, version)
                 VALUES (?1, ?2, ?3, 1);",
                params![class_name, identifier.as_str(), encode_data(data)?],
            );
            match inserted {
                Ok(_) => Ok(()),
                Err(err) if is_primary_key_violation(&err) => Err(StoreError::DuplicateKey {
                    class_name: class_name.clone(),
                    identifier: identifier.clone(),
                }),
                Err(err) => Err(err.into()),
            }
        }
        StoreOperation::Update {
            class_name,
            identifier,
            data,
            expected_version,
        } => {
            let changed = conn.execute(
                "UPDATE objects
                 SET
                    data = ?3,
                    version = version + 1,
                    updated_at = (strftime('%s', 'now') * 1000)
                 WHERE class_name = ?1
                   AND object_id = ?2
                   AND version = ?4;",
                params![
                    class_name,
                    identifier.as_str(),
                    encode_data(data)?,
                    expected_version
                ],
            )?;
            if changed > 0 {
                return Ok(());
            }
            if row_exists(conn, class_name, identifier)? {
                return Err(StoreError::StaleVersion {
                    class_name: class_name.clone(),
                    identifier: identifier.clone(),
                    expected_version: Some(*expected_version),
                });
            }
            Err(StoreError::NotFound {
                class_name: class_name.clone(),
                identifier: identifier.clone(),
            })
        }
        StoreOperation::Delete {
            class_name,
            identifier,
            expected_version,
        } => {
            let changed = conn.execute(
                "DELETE FROM objects
                 WHERE class_name = ?1
                   AND object_id = ?2
                   AND (?3 IS NULL OR version = ?3);",
                params![class_name, identifier.as_str(), expected_version],
            )?;
            // A row that is already gone counts as deleted.
            if changed == 0 && row_exists(conn, class_name, identifier)? {
                return Err(StoreError::StaleVersion {
                    class_name: class_name.clone(),
                    identifier: identifier.clone(),
                    expected_version: *expected_version,
                });
            }
            Ok(())
        }
    }
}

fn push_filters(
    sql: &mut String,
    bind_values: &mut Vec<SqlValue>,
    criteria: &Criteria,
) -> StoreResult<()> {
    for (field, value) in &criteria.filters {
        bind_values.push(SqlValue::Text(json_path(field)));
        match json_to_sql(field, value)? {
            Some(bound) => {
                sql.push_str(" AND json_extract(data, ?) = ?");
                bind_values.push(bound);
            }
            None => sql.push_str(" AND json_extract(data, ?) IS NULL"),
        }
    }
    Ok(())
}

fn json_path(field: &str) -> String {
    format!("$.{field}")
}

/// `json_extract` yields SQL scalars; booleans come back as 0/1.
fn json_to_sql(field: &str, value: &Value) -> StoreResult<Option<SqlValue>> {
    match value {
        Value::Null => Ok(None),
        Value::Bool(flag) => Ok(Some(SqlValue::Integer(i64::from(*flag)))),
        Value::Number(number) => match (number.as_i64(), number.as_f64()) {
            (Some(integer), _) => Ok(Some(SqlValue::Integer(integer))),
            (None, Some(real)) => Ok(Some(SqlValue::Real(real))),
            (None, None) => Err(StoreError::InvalidData(format!(
                "criteria value for `{field}` is not a representable number"
            ))),
        },
        Value::String(text) => Ok(Some(SqlValue::Text(text.clone()))),
        Value::Array(_) | Value::Object(_) => Err(StoreError::InvalidData(format!(
            "criteria value for `{field}` is not a scalar"
        ))),
    }
}

fn encode_data(data: &Value) -> StoreResult<String> {
    serde_json::to_string(data).map_err(|err| StoreError::InvalidData(err.to_string()))
}

fn is_primary_key_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(failure, _)
            if failure.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
    )
}

fn row_exists(conn: &Connection, class_name: &str, identifier: &Identifier) -> StoreResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM objects
            WHERE class_name = ?1 AND object_id = ?2
        );",
        params![class_name, identifier.as_str()],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn parse_document_row(row: &Row<'_>) -> StoreResult<Document> {
    let class_name: String = row.get("class_name")?;
    let object_id: String = row.get("object_id")?;
    let data_text: String = row.get("data")?;
    let data = serde_json::from_str(&data_text).map_err(|err| {
        StoreError::InvalidData(format!(
            "objects.data for {class_name}#{object_id} is not valid JSON: {err}"
        ))
    })?;

    let version: i64 = row.get("version")?;
    if version < 1 {
        return Err(StoreError::InvalidData(format!(
            "invalid version `{version}` in objects.version for {class_name}#{object_id}"
        )));
    }

    Ok(Document {
        class_name,
        identifier: Identifier::new(object_id),
        data,
        version,
    })
}

fn to_count(total: i64) -> StoreResult<u64> {
    u64::try_from(total).map_err(|_| StoreError::InvalidData(format!("negative row count {total}")))
}

fn ensure_store_connection_ready(conn: &Connection) -> StoreResult<()> {
    let expected_version = latest_version();
    let actual_version: u32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    if actual_version != expected_version {
        return Err(StoreError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }

    if !table_exists(conn, OBJECTS_TABLE)? {
        return Err(StoreError::MissingRequiredTable(OBJECTS_TABLE));
    }

    for column in OBJECTS_COLUMNS {
        if !table_has_column(conn, OBJECTS_TABLE, column)? {
            return Err(StoreError::MissingRequiredColumn {
                table: OBJECTS_TABLE,
                column,
            });
        }
    }

    Ok(())
}

fn table_exists(conn: &Connection, table: &str) -> StoreResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> StoreResult<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table});"))?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let current: String = row.get(1)?;
        if current == column {
            return Ok(true);
        }
    }
    Ok(false)
}
