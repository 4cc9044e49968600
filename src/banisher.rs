//! Banishment Engine: keeps the packet filter and the ban records in agreement.
//!
//! Every mutation (add, remove, restore, clear) runs under a single lock that
//! covers both the firewall call and the store call, so ban-mutating operations
//! never interleave. Scans are read-only snapshots and run without the lock;
//! expired records found by a sweep are removed one by one through the locked
//! path.
//!
//! Consistency rules:
//! - `add` blocks first, then records. If the record cannot be written the
//!   block is rolled back, so a failed add leaves both sides untouched.
//! - `remove` unblocks first, then forgets. A record left behind by a failed
//!   delete is picked up again by the next sweep.

use chrono::Utc;
use std::net::Ipv4Addr;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, error, info, warn};

use crate::config::EngineConfig;
use crate::error::{BanError, FilterError, RestoreError, StoreError};
use crate::filter::FirewallFilter;
use crate::store::{BanRecord, BanStore};
use crate::whitelist::Whitelist;

/// What an [`Banisher::add`] call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    /// Newly blocked until `expires_at` (epoch seconds)
    Banned { expires_at: i64 },
    /// A record already exists; the first ban stands
    AlreadyBanned,
    Whitelisted,
    /// Not an IPv4 literal; log noise
    Malformed,
}

/// Result of one expiry sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Records past their expiry in the scanned snapshot
    pub expired: usize,
    pub removed: usize,
    pub failed: usize,
}

/// The Banishment Engine: sole owner of the packet filter and the ban store.
///
/// Every mutation of either side happens under `mutation`, so the kernel set
/// and the store agree outside of a single in-flight operation.
pub struct Banisher {
    filter: Box<dyn FirewallFilter>,
    store: Box<dyn BanStore>,
    whitelist: Whitelist,
    config: EngineConfig,
    mutation: Mutex<()>,
}

impl Banisher {
    pub fn new(
        filter: Box<dyn FirewallFilter>,
        store: Box<dyn BanStore>,
        whitelist: Whitelist,
        config: EngineConfig,
    ) -> Self {
        Self {
            filter,
            store,
            whitelist,
            config,
            mutation: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn filter_name(&self) -> &'static str {
        self.filter.name()
    }

    pub fn is_durable(&self) -> bool {
        self.store.is_durable()
    }

    /// A panic inside a critical section leaves nothing half-mutated in memory,
    /// so a poisoned lock is still usable.
    fn lock(&self) -> MutexGuard<'_, ()> {
        self.mutation.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ban_seconds(&self) -> i64 {
        i64::try_from(self.config.ban_duration.as_secs()).unwrap_or(i64::MAX)
    }

    /// Ban `address` on behalf of `rule` for the configured duration.
    pub fn add(&self, address: &str, rule: &str) -> Result<AddOutcome, BanError> {
        self.add_at(address, rule, Utc::now().timestamp())
    }

    /// [`Banisher::add`] with an explicit clock reading (epoch seconds).
    pub fn add_at(&self, address: &str, rule: &str, now: i64) -> Result<AddOutcome, BanError> {
        let addr: Ipv4Addr = match address.parse() {
            Ok(addr) => addr,
            Err(_) => {
                debug!(rule = %rule, "Ignoring malformed address {:?}", address);
                return Ok(AddOutcome::Malformed);
            }
        };
        if self.whitelist.contains(addr) {
            debug!(rule = %rule, "{} is whitelisted", addr);
            return Ok(AddOutcome::Whitelisted);
        }
        let key = addr.to_string();

        let guard = self.lock();

        if self.store.get(&key).map_err(BanError::Lookup)?.is_some() {
            return Ok(AddOutcome::AlreadyBanned);
        }

        self.filter.block(addr).map_err(BanError::Block)?;

        let expires_at = now.saturating_add(self.ban_seconds());
        if let Err(source) = self.store.put(&key, expires_at) {
            let rollback = self.filter.unblock(addr).err();
            if let Some(ref e) = rollback {
                error!("{} remains blocked without a ban record: {}", key, e);
            }
            return Err(BanError::Persist { source, rollback });
        }

        drop(guard);
        info!(rule = %rule, ip = %key, "{}: {} banned", rule, key);
        Ok(AddOutcome::Banned { expires_at })
    }

    /// Lift the ban on `address`. Lifting an absent ban succeeds.
    pub fn remove(&self, address: &str) -> Result<(), BanError> {
        let _guard = self.lock();
        self.remove_locked(address)
    }

    fn remove_locked(&self, address: &str) -> Result<(), BanError> {
        let key = match address.parse::<Ipv4Addr>() {
            Ok(addr) => {
                self.filter.unblock(addr).map_err(BanError::Unblock)?;
                addr.to_string()
            }
            Err(_) => {
                // Nothing this key names can be in the kernel set.
                warn!("Dropping ban record {:?}: not an IPv4 address", address);
                address.to_string()
            }
        };
        self.store.delete(&key).map_err(BanError::Forget)?;
        info!(ip = %key, "{} unbanned", key);
        Ok(())
    }

    /// Reconcile the firewall with the stored records. Call once, before any add.
    ///
    /// The set is emptied first, so afterwards exactly the stored addresses are
    /// blocked. Any failure aborts: a partial restore is worse than none.
    pub fn restore(&self) -> Result<usize, RestoreError> {
        let _guard = self.lock();

        self.filter.ensure_installed().map_err(RestoreError::Install)?;
        self.filter.flush().map_err(RestoreError::Install)?;

        if !self.store.is_durable() {
            debug!("Ephemeral ban store, nothing to restore");
            return Ok(0);
        }

        let records = self.store.scan()?;
        for record in &records {
            let addr: Ipv4Addr = record.address.parse().map_err(|_| StoreError::Corrupt {
                address: record.address.clone(),
            })?;
            self.filter
                .block(addr)
                .map_err(|source| RestoreError::Reinstate {
                    address: record.address.clone(),
                    source,
                })?;
        }

        info!("Restored {} ban(s) into {}", records.len(), self.filter.name());
        Ok(records.len())
    }

    /// Remove kernel-side enforcement. Stored records are kept for the next restore.
    pub fn clear(&self) -> Result<(), FilterError> {
        let _guard = self.lock();
        self.filter.teardown()
    }

    /// One expiry pass over a snapshot of the store.
    ///
    /// Each candidate is re-read under the lock before removal, so a ban that
    /// was lifted and re-added since the snapshot keeps its fresh expiry.
    pub fn sweep(&self, now: i64) -> Result<SweepReport, StoreError> {
        let records = self.store.scan()?;
        let mut report = SweepReport::default();

        for record in records.iter().filter(|r| r.is_expired(now)) {
            report.expired += 1;

            let guard = self.lock();
            let current = match self.store.get(&record.address) {
                Ok(current) => current,
                Err(e) => {
                    warn!("Failed to re-read ban record for {}: {}", record.address, e);
                    report.failed += 1;
                    continue;
                }
            };
            match current {
                Some(expires_at) if expires_at < now => match self.remove_locked(&record.address) {
                    Ok(()) => report.removed += 1,
                    Err(e) => {
                        warn!("Failed to lift expired ban on {}: {}", record.address, e);
                        report.failed += 1;
                    }
                },
                _ => debug!("Ban on {} changed since the scan, skipping", record.address),
            }
            drop(guard);
        }

        if report.expired > 0 {
            debug!(
                "Sweep: {} expired, {} removed, {} failed",
                report.expired, report.removed, report.failed
            );
        }
        Ok(report)
    }

    /// [`Banisher::sweep`] against the current time.
    pub fn sweep_now(&self) -> Result<SweepReport, StoreError> {
        self.sweep(Utc::now().timestamp())
    }

    /// Snapshot of the stored bans.
    pub fn bans(&self) -> Result<Vec<BanRecord>, StoreError> {
        self.store.scan()
    }
}
