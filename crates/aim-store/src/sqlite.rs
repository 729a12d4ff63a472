//! SQLite store files.
//!
//! The database is opened read-only with a single connection that is closed
//! before returning, on success and on failure alike. Rows are mapped
//! column by column from each value's storage class, so the loader does not
//! need to know the store's schema revision. The `args` and `env` columns of
//! `mcp_servers` hold JSON text and are decoded here.

use std::path::Path;

use serde_json::{Map, Number, Value};
use sqlx::sqlite::{SqliteConnectOptions, SqliteRow};
use sqlx::{Column, ConnectOptions, Connection, Row, SqliteConnection, TypeInfo, ValueRef};

use aim_core::{EntityKind, RawDataset, RawTable};

use crate::error::StoreError;

/// Columns stored as JSON text.
const JSON_TEXT_COLUMNS: [(EntityKind, &str); 2] = [
    (EntityKind::McpServer, "args"),
    (EntityKind::McpServer, "env"),
];

/// Load every known table from the store at `path`.
pub async fn load_sqlite(path: &Path) -> Result<RawDataset, StoreError> {
    let wrap = |source: sqlx::Error| StoreError::Sqlite {
        path: path.to_path_buf(),
        source,
    };

    let mut conn = SqliteConnectOptions::new()
        .filename(path)
        .read_only(true)
        .create_if_missing(false)
        .connect()
        .await
        .map_err(wrap)?;

    let result = read_dataset(&mut conn).await;
    let closed = conn.close().await;

    let dataset = result.map_err(wrap)?;
    closed.map_err(wrap)?;
    tracing::info!(path = %path.display(), "loaded SQLite store");
    Ok(dataset)
}

async fn read_dataset(conn: &mut SqliteConnection) -> Result<RawDataset, sqlx::Error> {
    let mut dataset = RawDataset::new();
    for kind in EntityKind::ALL {
        if !table_exists(conn, kind).await? {
            tracing::debug!(table = %kind, "table absent from store");
            continue;
        }
        let table = read_table(conn, kind).await?;
        tracing::debug!(table = %kind, rows = table.row_count(), "loaded table");
        dataset.insert_table(kind, table);
    }
    Ok(dataset)
}

async fn table_exists(conn: &mut SqliteConnection, kind: EntityKind) -> Result<bool, sqlx::Error> {
    let found: Option<String> =
        sqlx::query_scalar("SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?")
            .bind(kind.table_name())
            .fetch_optional(&mut *conn)
            .await?;
    Ok(found.is_some())
}

async fn read_table(conn: &mut SqliteConnection, kind: EntityKind) -> Result<RawTable, sqlx::Error> {
    let columns: Vec<String> =
        sqlx::query_scalar("SELECT name FROM pragma_table_info(?) ORDER BY cid")
            .bind(kind.table_name())
            .fetch_all(&mut *conn)
            .await?;

    // Table names come from `EntityKind`, never from input.
    let sql = format!("SELECT * FROM \"{}\" ORDER BY rowid", kind.table_name());
    let rows = sqlx::query(&sql).fetch_all(&mut *conn).await?;

    let rows = rows
        .iter()
        .map(|row| row_to_map(kind, row))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(RawTable::with_columns(columns, rows))
}

fn row_to_map(kind: EntityKind, row: &SqliteRow) -> Result<Map<String, Value>, sqlx::Error> {
    let mut map = Map::new();
    for (i, column) in row.columns().iter().enumerate() {
        let name = column.name();
        let mut value = column_value(row, i)?;
        if JSON_TEXT_COLUMNS.iter().any(|&(k, c)| k == kind && c == name) {
            value = decode_json_text(value);
        }
        map.insert(name.to_string(), value);
    }
    Ok(map)
}

fn column_value(row: &SqliteRow, i: usize) -> Result<Value, sqlx::Error> {
    let raw = row.try_get_raw(i)?;
    if raw.is_null() {
        return Ok(Value::Null);
    }
    let storage = raw.type_info().name().to_ascii_uppercase();
    Ok(match storage.as_str() {
        "INTEGER" | "BOOLEAN" => Value::from(row.try_get::<i64, _>(i)?),
        "REAL" => Number::from_f64(row.try_get::<f64, _>(i)?)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        "BLOB" => Value::from(String::from_utf8_lossy(&row.try_get::<Vec<u8>, _>(i)?).into_owned()),
        _ => Value::from(row.try_get::<String, _>(i)?),
    })
}

/// Text holding a JSON array or object becomes that value; anything else is
/// left as-is for record conversion to reject.
fn decode_json_text(value: Value) -> Value {
    let Value::String(text) = &value else {
        return value;
    };
    match serde_json::from_str::<Value>(text) {
        Ok(decoded @ (Value::Array(_) | Value::Object(_) | Value::Null)) => decoded,
        _ => value,
    }
}
