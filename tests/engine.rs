//! Consistency properties of the Banishment Engine, exercised through the
//! public API with an in-memory packet filter.

use banisher::config::EngineConfig;
use banisher::filter::FirewallFilter;
use banisher::store::{BanRecord, BanStore, RedbBanStore};
use banisher::whitelist::Whitelist;
use banisher::{AddOutcome, BanError, Banisher, FilterError, StoreError};
use std::collections::BTreeSet;
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;
use tempfile::TempDir;

const NOW: i64 = 1_700_000_000;

/// Kernel stand-in: a set of blocked addresses plus call counters.
#[derive(Default)]
struct KernelState {
    installed: bool,
    blocked: BTreeSet<Ipv4Addr>,
}

#[derive(Clone, Default)]
struct RecordingFilter {
    state: Arc<Mutex<KernelState>>,
    blocks: Arc<AtomicUsize>,
    unblocks: Arc<AtomicUsize>,
}

impl RecordingFilter {
    fn blocked(&self) -> BTreeSet<String> {
        self.state
            .lock()
            .unwrap()
            .blocked
            .iter()
            .map(|a| a.to_string())
            .collect()
    }

    fn installed(&self) -> bool {
        self.state.lock().unwrap().installed
    }

    fn calls(&self) -> usize {
        self.blocks.load(Ordering::SeqCst) + self.unblocks.load(Ordering::SeqCst)
    }
}

impl FirewallFilter for RecordingFilter {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn ensure_installed(&self) -> Result<(), FilterError> {
        self.state.lock().unwrap().installed = true;
        Ok(())
    }

    fn flush(&self) -> Result<(), FilterError> {
        self.state.lock().unwrap().blocked.clear();
        Ok(())
    }

    fn block(&self, addr: Ipv4Addr) -> Result<(), FilterError> {
        self.blocks.fetch_add(1, Ordering::SeqCst);
        self.state.lock().unwrap().blocked.insert(addr);
        Ok(())
    }

    fn unblock(&self, addr: Ipv4Addr) -> Result<(), FilterError> {
        self.unblocks.fetch_add(1, Ordering::SeqCst);
        self.state.lock().unwrap().blocked.remove(&addr);
        Ok(())
    }

    fn teardown(&self) -> Result<(), FilterError> {
        let mut state = self.state.lock().unwrap();
        state.blocked.clear();
        state.installed = false;
        Ok(())
    }
}

/// Store that reads fine but refuses every write.
struct WriteFailingStore(RedbBanStore);

impl BanStore for WriteFailingStore {
    fn get(&self, address: &str) -> Result<Option<i64>, StoreError> {
        self.0.get(address)
    }
    fn put(&self, address: &str, _expires_at: i64) -> Result<(), StoreError> {
        Err(StoreError::Corrupt {
            address: address.to_string(),
        })
    }
    fn delete(&self, address: &str) -> Result<(), StoreError> {
        self.0.delete(address)
    }
    fn scan(&self) -> Result<Vec<BanRecord>, StoreError> {
        self.0.scan()
    }
    fn is_durable(&self) -> bool {
        false
    }
}

fn config() -> EngineConfig {
    EngineConfig {
        ban_duration: Duration::from_secs(600),
        sweep_interval: Duration::from_secs(60),
    }
}

fn engine_with_store(store: Box<dyn BanStore>, whitelist: Whitelist) -> (Banisher, RecordingFilter) {
    let filter = RecordingFilter::default();
    let engine = Banisher::new(Box::new(filter.clone()), store, whitelist, config());
    (engine, filter)
}

fn engine() -> (Banisher, RecordingFilter) {
    engine_with_store(Box::new(RedbBanStore::in_memory().unwrap()), Whitelist::default())
}

fn stored(engine: &Banisher) -> BTreeSet<String> {
    engine.bans().unwrap().into_iter().map(|r| r.address).collect()
}

#[test]
fn test_store_and_filter_agree_after_concurrent_add_remove() {
    let (engine, filter) = engine();
    let engine = Arc::new(engine);
    engine.restore().unwrap();

    let handles: Vec<_> = (0..8)
        .map(|worker| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || {
                for round in 0..50 {
                    let address = format!("198.51.100.{}", (worker * 7 + round) % 10);
                    if (worker + round) % 3 == 0 {
                        engine.remove(&address).unwrap();
                    } else {
                        engine.add_at(&address, "race", NOW).unwrap();
                    }
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(stored(&engine), filter.blocked());
}

#[test]
fn test_first_ban_wins() {
    let (engine, filter) = engine();

    assert_eq!(
        engine.add_at("1.2.3.4", "r1", NOW).unwrap(),
        AddOutcome::Banned { expires_at: NOW + 600 }
    );
    assert_eq!(engine.add_at("1.2.3.4", "r2", NOW + 5).unwrap(), AddOutcome::AlreadyBanned);

    assert_eq!(filter.blocks.load(Ordering::SeqCst), 1);
    let bans = engine.bans().unwrap();
    assert_eq!(bans.len(), 1);
    assert_eq!(bans[0].expires_at, NOW + 600);
}

#[test]
fn test_removing_unknown_address_succeeds() {
    let (engine, filter) = engine();
    engine.remove("203.0.113.200").unwrap();
    assert!(filter.blocked().is_empty());
    assert!(stored(&engine).is_empty());
}

#[test]
fn test_whitelisted_address_is_never_touched() {
    let whitelist = Whitelist::from_addresses([Ipv4Addr::new(10, 0, 0, 1)]);
    let (engine, filter) = engine_with_store(Box::new(RedbBanStore::in_memory().unwrap()), whitelist);

    assert_eq!(engine.add_at("10.0.0.1", "ssh", NOW).unwrap(), AddOutcome::Whitelisted);
    assert_eq!(filter.calls(), 0);
    assert!(stored(&engine).is_empty());
}

#[test]
fn test_restore_reinstates_exactly_the_stored_set() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("bans.redb");
    {
        let store = RedbBanStore::open(&path).unwrap();
        store.put("192.0.2.1", NOW + 10).unwrap();
        store.put("192.0.2.2", NOW + 20).unwrap();
    }

    let (engine, filter) = engine_with_store(Box::new(RedbBanStore::open(&path).unwrap()), Whitelist::default());
    // Stale kernel state from a previous run
    filter.block(Ipv4Addr::new(203, 0, 113, 99)).unwrap();

    assert_eq!(engine.restore().unwrap(), 2);
    assert!(filter.installed());
    assert_eq!(
        filter.blocked(),
        BTreeSet::from(["192.0.2.1".to_string(), "192.0.2.2".to_string()])
    );
}

#[test]
fn test_bans_survive_restart() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("bans.redb");

    {
        let (engine, filter) =
            engine_with_store(Box::new(RedbBanStore::open(&path).unwrap()), Whitelist::default());
        engine.restore().unwrap();
        engine.add_at("192.0.2.50", "ssh", NOW).unwrap();
        engine.clear().unwrap();
        assert!(!filter.installed());
    }

    let (engine, filter) = engine_with_store(Box::new(RedbBanStore::open(&path).unwrap()), Whitelist::default());
    engine.restore().unwrap();
    assert_eq!(filter.blocked(), BTreeSet::from(["192.0.2.50".to_string()]));
}

#[test]
fn test_sweep_lifts_only_expired_bans() {
    let (engine, filter) = engine();
    engine.add_at("192.0.2.1", "ssh", NOW - 1000).unwrap();
    engine.add_at("192.0.2.2", "ssh", NOW).unwrap();

    let report = engine.sweep(NOW).unwrap();
    assert_eq!(report.expired, 1);
    assert_eq!(report.removed, 1);

    let expected = BTreeSet::from(["192.0.2.2".to_string()]);
    assert_eq!(stored(&engine), expected);
    assert_eq!(filter.blocked(), expected);
}

#[test]
fn test_add_after_sweep_bans_anew() {
    let (engine, _filter) = engine();
    engine.add_at("192.0.2.1", "ssh", NOW - 1000).unwrap();
    engine.sweep(NOW).unwrap();

    assert_eq!(
        engine.add_at("192.0.2.1", "ssh", NOW).unwrap(),
        AddOutcome::Banned { expires_at: NOW + 600 }
    );
}

#[test]
fn test_failed_store_write_rolls_back_block() {
    let store = WriteFailingStore(RedbBanStore::in_memory().unwrap());
    let (engine, filter) = engine_with_store(Box::new(store), Whitelist::default());

    let err = engine.add_at("192.0.2.77", "ssh", NOW).unwrap_err();
    assert!(matches!(err, BanError::Persist { rollback: None, .. }));
    assert_eq!(filter.blocks.load(Ordering::SeqCst), 1);
    assert!(filter.blocked().is_empty());
    assert!(stored(&engine).is_empty());
}

#[test]
fn test_malformed_address_is_ignored() {
    let (engine, filter) = engine();
    for candidate in ["not-an-ip", "256.1.1.1", "1.2.3", "", "1.2.3.4.5"] {
        assert_eq!(engine.add_at(candidate, "ssh", NOW).unwrap(), AddOutcome::Malformed);
    }
    assert_eq!(filter.calls(), 0);
    assert!(stored(&engine).is_empty());
}
