//! Error types for the Banisher.

use thiserror::Error;

/// Failures of the persistent ban record.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("failed to open ban database: {0}")]
    Open(#[from] redb::DatabaseError),

    #[error("ban database transaction failed: {0}")]
    Transaction(#[from] redb::TransactionError),

    #[error("ban database table error: {0}")]
    Table(#[from] redb::TableError),

    #[error("ban database storage error: {0}")]
    Storage(#[from] redb::StorageError),

    #[error("ban database commit failed: {0}")]
    Commit(#[from] redb::CommitError),

    #[error("corrupt ban record for {address}")]
    Corrupt { address: String },
}

/// Failures of the kernel packet filter.
#[derive(Error, Debug)]
pub enum FilterError {
    #[error("{program} failed: {stderr}")]
    Command { program: String, stderr: String },

    #[error("failed to execute {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("no packet filter available (nft, or ipset with iptables, required)")]
    Unavailable,
}

/// Failures reported by ban and unban operations.
///
/// None of these stop the detection pipeline: the caller logs them and moves on.
#[derive(Error, Debug)]
pub enum BanError {
    #[error("failed to look up ban record: {0}")]
    Lookup(#[source] StoreError),

    #[error("failed to block address: {0}")]
    Block(#[source] FilterError),

    #[error("failed to unblock address: {0}")]
    Unblock(#[source] FilterError),

    #[error("failed to record ban: {source}{}", rollback_suffix(.rollback))]
    Persist {
        #[source]
        source: StoreError,
        /// Set when the compensating unblock failed as well.
        rollback: Option<FilterError>,
    },

    #[error("address unblocked but its record could not be deleted: {0}")]
    Forget(#[source] StoreError),
}

impl BanError {
    /// True when the firewall may now block an address without a matching record.
    pub fn left_orphan_block(&self) -> bool {
        matches!(self, BanError::Persist { rollback: Some(_), .. })
    }
}

/// Startup reconciliation failures. Always fatal.
#[derive(Error, Debug)]
pub enum RestoreError {
    #[error("failed to install packet filter: {0}")]
    Install(#[source] FilterError),

    #[error("failed to read ban records: {0}")]
    Store(#[from] StoreError),

    #[error("failed to reinstate ban on {address}: {source}")]
    Reinstate {
        address: String,
        #[source]
        source: FilterError,
    },
}

fn rollback_suffix(rollback: &Option<FilterError>) -> String {
    match rollback {
        Some(e) => format!(" (rollback also failed: {})", e),
        None => String::new(),
    }
}
