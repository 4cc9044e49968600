//! Ban Store: the persistent record of who is banned until when.
//!
//! Records live in a single redb table keyed by the canonical dotted-quad
//! address, valued by the absolute expiry in seconds since the Unix epoch.
//! A durable store commits with immediate durability, so a successful
//! [`BanStore::put`] survives a crash. The ephemeral store uses redb's
//! in-memory backend and forgets everything on exit.

use chrono::{DateTime, TimeZone, Utc};
use redb::backends::InMemoryBackend;
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::StoreError;

/// redb table: key = address literal, value = expiry (epoch seconds).
const BANS: TableDefinition<&str, i64> = TableDefinition::new("bans");

/// Magic `--db` value selecting the ephemeral store.
pub const MEMORY_PATH: &str = ":memory:";

/// One persisted ban.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BanRecord {
    pub address: String,
    /// Absolute expiry, seconds since the Unix epoch
    pub expires_at: i64,
}

impl BanRecord {
    pub fn expiry(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.expires_at, 0).single()
    }

    /// A record expires once its expiry is strictly before `now`.
    pub fn is_expired(&self, now: i64) -> bool {
        self.expires_at < now
    }
}

/// Persistent mapping from banned address to expiry.
pub trait BanStore: Send + Sync {
    fn get(&self, address: &str) -> Result<Option<i64>, StoreError>;

    /// Upsert; returns only once the record is on stable storage (durable mode).
    fn put(&self, address: &str, expires_at: i64) -> Result<(), StoreError>;

    /// Deleting an absent key is not an error.
    fn delete(&self, address: &str) -> Result<(), StoreError>;

    /// Snapshot of every record, read in one transaction.
    fn scan(&self) -> Result<Vec<BanRecord>, StoreError>;

    fn is_durable(&self) -> bool;
}

/// Where the ban records live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Persistence {
    Durable(PathBuf),
    Ephemeral,
}

impl Persistence {
    /// Interpret a `--db` argument.
    pub fn from_arg(arg: &Path) -> Self {
        if arg.as_os_str() == MEMORY_PATH {
            Persistence::Ephemeral
        } else {
            Persistence::Durable(arg.to_path_buf())
        }
    }
}

/// [`BanStore`] backed by redb.
pub struct RedbBanStore {
    db: Database,
    durable: bool,
}

impl RedbBanStore {
    pub fn open_with(persistence: &Persistence) -> Result<Self, StoreError> {
        match persistence {
            Persistence::Durable(path) => Self::open(path),
            Persistence::Ephemeral => Self::in_memory(),
        }
    }

    /// Open (or create) a durable store at `path`.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                // Let redb report the real error if this fails
                let _ = std::fs::create_dir_all(parent);
            }
        }
        let db = Database::create(path)?;
        debug!("Opened ban database {}", path.display());
        Self::init(db, true)
    }

    /// Create an ephemeral store that lives only as long as the process.
    pub fn in_memory() -> Result<Self, StoreError> {
        let db = Database::builder().create_with_backend(InMemoryBackend::new())?;
        Self::init(db, false)
    }

    fn init(db: Database, durable: bool) -> Result<Self, StoreError> {
        // Create the table up front so read transactions never miss it.
        let txn = db.begin_write()?;
        {
            let _table = txn.open_table(BANS)?;
        }
        txn.commit()?;
        Ok(Self { db, durable })
    }
}

impl BanStore for RedbBanStore {
    fn get(&self, address: &str) -> Result<Option<i64>, StoreError> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(BANS)?;
        let value = table.get(address)?.map(|guard| guard.value());
        Ok(value)
    }

    fn put(&self, address: &str, expires_at: i64) -> Result<(), StoreError> {
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(BANS)?;
            table.insert(address, expires_at)?;
        }
        txn.commit()?;
        Ok(())
    }

    fn delete(&self, address: &str) -> Result<(), StoreError> {
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(BANS)?;
            table.remove(address)?;
        }
        txn.commit()?;
        Ok(())
    }

    fn scan(&self) -> Result<Vec<BanRecord>, StoreError> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(BANS)?;
        let mut records = Vec::new();
        for item in table.iter()? {
            let (key, value) = item?;
            records.push(BanRecord {
                address: key.value().to_string(),
                expires_at: value.value(),
            });
        }
        Ok(records)
    }

    fn is_durable(&self) -> bool {
        self.durable
    }
}
