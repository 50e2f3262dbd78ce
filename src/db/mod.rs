use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{Connection, OptionalExtension, Row, params};
use thiserror::Error;
use tracing::{debug, info};

use std::env;
use std::sync::{Mutex, MutexGuard};

use crate::device::{Device, DeviceType, DeviceUpdate};

pub const DEFAULT_TABLE: &str = "devices";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("device not found")]
    NotFound,

    #[error("a device with this name already exists")]
    DuplicateKey,

    #[error("invalid table name '{0}'")]
    InvalidTable(String),

    #[error("corrupt device record: {0}")]
    Corrupt(String),

    #[error("database connection lock poisoned")]
    Poisoned,

    #[error("database error: {0}")]
    Backend(rusqlite::Error),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        match e {
            rusqlite::Error::FromSqlConversionFailure(_, _, cause) => {
                StoreError::Corrupt(cause.to_string())
            }
            other => StoreError::Backend(other),
        }
    }
}

/// A collection of devices keyed by their unique name.
///
/// Implementations do blocking I/O; async callers run them on the blocking
/// pool.
pub trait DeviceStore: Send + Sync {
    fn list(&self) -> Result<Vec<Device>, StoreError>;

    fn get(&self, name: &str) -> Result<Device, StoreError>;

    /// Fails with `DuplicateKey` if the name is taken
    fn insert(&self, device: &Device) -> Result<Device, StoreError>;

    /// Replaces ip, type and location. The name is never touched.
    fn update_fields(&self, name: &str, update: &DeviceUpdate) -> Result<Device, StoreError>;

    fn delete(&self, name: &str) -> Result<(), StoreError>;
}

impl ToSql for DeviceType {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for DeviceType {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e: String| FromSqlError::Other(e.into()))
    }
}

/// Strip the optional `sqlite://` scheme and make relative paths absolute
pub fn resolve_database_path(db_url: &str) -> String {
    let db_path = db_url.strip_prefix("sqlite://").unwrap_or(db_url);

    // Convert relative paths to absolute to avoid issues with working directory changes
    if !db_path.starts_with('/')
        && db_path != ":memory:"
        && let Ok(cwd) = env::current_dir()
    {
        return cwd.join(db_path).to_string_lossy().to_string();
    }

    db_path.to_string()
}

pub fn new_connection(db_path: &str) -> Result<Connection, rusqlite::Error> {
    let conn = Connection::open(db_path)?;

    // Set busy timeout first (this doesn't require any locks)
    conn.busy_timeout(std::time::Duration::from_secs(30))?;

    // Try to enable WAL mode; in-memory databases stay in their own mode
    let _ = conn.pragma_update_and_check(None, "journal_mode", "WAL", |_| Ok(()));

    // NORMAL sync is safe with WAL mode
    let _ = conn.pragma_update(None, "synchronous", "NORMAL");

    Ok(conn)
}

/// Table names are interpolated into SQL, so only plain identifiers pass.
/// Keywords such as `order` are fine since the name is always quoted.
pub fn is_valid_table_name(table: &str) -> bool {
    let mut chars = table.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

pub struct SqliteDeviceStore {
    conn: Mutex<Connection>,
    /// Quoted identifier, ready to splice into statements
    table: String,
}

impl SqliteDeviceStore {
    /// Open the database and make sure the device table exists
    pub fn open(db_url: &str, table: &str) -> Result<Self, StoreError> {
        let db_path = resolve_database_path(db_url);
        info!(path = %db_path, table, "Opening device store");
        let conn = new_connection(&db_path)?;
        Self::with_connection(conn, table)
    }

    #[cfg(test)]
    pub fn in_memory() -> Self {
        let conn = Connection::open_in_memory().expect("Failed to create in-memory database");
        Self::with_connection(conn, DEFAULT_TABLE).expect("Failed to create devices table")
    }

    fn with_connection(conn: Connection, table: &str) -> Result<Self, StoreError> {
        if !is_valid_table_name(table) {
            return Err(StoreError::InvalidTable(table.to_string()));
        }
        let table = format!("\"{table}\"");
        Self::create_table_if_not_exists(&conn, &table)?;
        Ok(Self {
            conn: Mutex::new(conn),
            table,
        })
    }

    fn create_table_if_not_exists(conn: &Connection, table: &str) -> rusqlite::Result<()> {
        conn.execute(
            &format!(
                "CREATE TABLE IF NOT EXISTS {table} (
                    id INTEGER PRIMARY KEY,
                    name TEXT NOT NULL UNIQUE,
                    ip TEXT NOT NULL,
                    device_type TEXT NOT NULL,
                    location TEXT NOT NULL,
                    created_at INTEGER NOT NULL,
                    updated_at INTEGER NOT NULL
                )"
            ),
            [],
        )?;
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    fn device_from_row(row: &Row<'_>) -> rusqlite::Result<Device> {
        Ok(Device {
            name: row.get("name")?,
            ip: row.get("ip")?,
            device_type: row.get("device_type")?,
            location: row.get("location")?,
        })
    }
}

fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _)
            if err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                || err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
    )
}

impl DeviceStore for SqliteDeviceStore {
    fn list(&self) -> Result<Vec<Device>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT name, ip, device_type, location FROM {} ORDER BY id",
            self.table
        ))?;
        let devices = stmt
            .query_map([], Self::device_from_row)?
            .collect::<rusqlite::Result<Vec<Device>>>()?;
        Ok(devices)
    }

    fn get(&self, name: &str) -> Result<Device, StoreError> {
        let conn = self.lock()?;
        conn.query_row(
            &format!(
                "SELECT name, ip, device_type, location FROM {} WHERE name = ?1",
                self.table
            ),
            [name],
            Self::device_from_row,
        )
        .optional()?
        .ok_or(StoreError::NotFound)
    }

    fn insert(&self, device: &Device) -> Result<Device, StoreError> {
        let conn = self.lock()?;
        let result = conn.execute(
            &format!(
                "INSERT INTO {} (name, ip, device_type, location, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, strftime('%s', 'now'), strftime('%s', 'now'))",
                self.table
            ),
            params![device.name, device.ip, device.device_type, device.location],
        );

        match result {
            Ok(_) => {
                debug!(name = %device.name, "Inserted device");
                Ok(device.clone())
            }
            Err(e) if is_unique_violation(&e) => Err(StoreError::DuplicateKey),
            Err(e) => Err(e.into()),
        }
    }

    fn update_fields(&self, name: &str, update: &DeviceUpdate) -> Result<Device, StoreError> {
        let conn = self.lock()?;
        conn.query_row(
            &format!(
                "UPDATE {} SET ip = ?1, device_type = ?2, location = ?3,
                    updated_at = strftime('%s', 'now')
                 WHERE name = ?4
                 RETURNING name, ip, device_type, location",
                self.table
            ),
            params![update.ip, update.device_type, update.location, name],
            Self::device_from_row,
        )
        .optional()?
        .ok_or(StoreError::NotFound)
    }

    fn delete(&self, name: &str) -> Result<(), StoreError> {
        let conn = self.lock()?;
        let deleted = conn.execute(&format!("DELETE FROM {} WHERE name = ?1", self.table), [name])?;
        if deleted == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }
}
