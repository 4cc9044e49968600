//! # The Banisher - log-driven IPv4 banning daemon
//!
//! Follows a log stream, matches each line against ordered detection rules,
//! and bans the offending IPv4 address in the kernel packet filter for a
//! configured duration. Bans are persisted, reinstated on restart, and lifted
//! automatically when they expire.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       The Banisher                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  CLI (clap)                                                 │
//! │    └── Commands: run, list, check                           │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Config (serde_yaml)                                        │
//! │    └── Rules, whitelist, durations, dispatch bounds         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Source (journalctl, tail -F, stdin)                        │
//! │    └── Dispatcher: RuleMatcher + bounded queue + workers    │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Banisher (single lock)            Sweeper (interval)       │
//! │    ├── BanStore (redb)               └── sweep → remove     │
//! │    └── FirewallFilter                                       │
//! │          ├── NftablesFilter                                 │
//! │          └── IpsetFilter (ipset + iptables)                 │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example Usage
//!
//! ```no_run
//! use banisher::config::Config;
//! use banisher::filter::{check_root, create_filter};
//! use banisher::store::RedbBanStore;
//! use banisher::Banisher;
//!
//! fn main() -> anyhow::Result<()> {
//!     check_root()?;
//!
//!     let settings = Config::load("/etc/banisher/config.yml")?.compile()?;
//!     let engine = Banisher::new(
//!         create_filter(settings.backend)?,
//!         Box::new(RedbBanStore::in_memory()?),
//!         settings.whitelist,
//!         settings.engine,
//!     );
//!     engine.restore()?;
//!
//!     if let Some(hit) = settings.matcher.evaluate("sshd: Failed password for root from 203.0.113.9") {
//!         engine.add(&hit.address, &hit.rule)?;
//!     }
//!
//!     engine.clear()?;
//!     Ok(())
//! }
//! ```

pub mod banisher;
pub mod cli;
pub mod cmd_abstraction;
pub mod commands;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod filter;
pub mod lock;
pub mod rules;
pub mod signal;
pub mod source;
pub mod store;
pub mod sweeper;
pub mod whitelist;

pub use banisher::{AddOutcome, Banisher, SweepReport};
pub use error::{BanError, FilterError, RestoreError, StoreError};
