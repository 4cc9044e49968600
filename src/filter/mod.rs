//! Firewall Filter: kernel-level enforcement of bans (ipset+iptables, nftables).

mod ipset;
mod nftables;

use std::net::Ipv4Addr;
use std::sync::Arc;
use tracing::debug;

pub use ipset::IpsetFilter;
pub use nftables::NftablesFilter;

use crate::cmd_abstraction::{CommandExecutor, RealCommandExecutor};
use crate::config::FilterBackend;
use crate::error::FilterError;

#[cfg(test)]
use mockall::automock;

/// A named kernel set of blocked addresses plus the rule that drops their traffic.
///
/// Every call may block on a subprocess. Failures are reported, never retried.
#[cfg_attr(test, automock)]
pub trait FirewallFilter: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &'static str;

    /// Create the set and the rule referencing it if they are absent.
    fn ensure_installed(&self) -> Result<(), FilterError>;

    /// Empty the set, keeping the set and its rule in place.
    fn flush(&self) -> Result<(), FilterError>;

    /// Add an address to the set. Adding a blocked address succeeds.
    fn block(&self, addr: Ipv4Addr) -> Result<(), FilterError>;

    /// Remove an address from the set. Removing an absent address succeeds.
    fn unblock(&self, addr: Ipv4Addr) -> Result<(), FilterError>;

    /// Remove the rule, then destroy the set.
    fn teardown(&self) -> Result<(), FilterError>;
}

/// Detect the available backend (nftables preferred).
pub fn detect_backend() -> Result<FilterBackend, FilterError> {
    detect_backend_with(&RealCommandExecutor)
}

fn detect_backend_with<E: CommandExecutor + ?Sized>(executor: &E) -> Result<FilterBackend, FilterError> {
    let available = |program: &str| {
        executor
            .execute(program, &["--version".to_string()])
            .map(|o| o.success)
            .unwrap_or(false)
    };

    if available(nftables::NFT) {
        return Ok(FilterBackend::Nftables);
    }
    if available(ipset::IPSET) && available(ipset::IPTABLES) {
        return Ok(FilterBackend::Ipset);
    }
    Err(FilterError::Unavailable)
}

/// Build the firewall filter selected by configuration.
pub fn create_filter(backend: FilterBackend) -> Result<Box<dyn FirewallFilter>, FilterError> {
    let executor: Arc<dyn CommandExecutor> = Arc::new(RealCommandExecutor);
    let actual = match backend {
        FilterBackend::Auto => detect_backend()?,
        other => other,
    };
    debug!("Using {:?} firewall backend", actual);

    match actual {
        FilterBackend::Nftables => Ok(Box::new(NftablesFilter::new(executor))),
        FilterBackend::Ipset => Ok(Box::new(IpsetFilter::new(executor))),
        FilterBackend::Auto => Err(FilterError::Unavailable),
    }
}

/// Check the process runs with effective UID 0.
///
/// Manipulating netfilter needs CAP_NET_ADMIN; UID 0 covers the usual
/// root/systemd deployment.
pub fn check_root() -> anyhow::Result<()> {
    // SAFETY: geteuid() has no preconditions and cannot fail.
    let euid = unsafe { libc::geteuid() };

    if euid != 0 {
        anyhow::bail!("root privileges are required to manage the packet filter")
    }
    Ok(())
}
