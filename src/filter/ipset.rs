//! ipset + iptables backend.
//!
//! Banned addresses go into the `banisher` ipset (`hash:ip`), matched by a
//! single DROP rule at the head of the INPUT chain.

use std::net::Ipv4Addr;
use std::sync::Arc;
use tracing::{debug, info};

use super::FirewallFilter;
use crate::cmd_abstraction::{run, run_checked, CommandExecutor};
use crate::error::FilterError;

pub(super) const IPSET: &str = "ipset";
pub(super) const IPTABLES: &str = "iptables";
const SET_NAME: &str = "banisher";
const CHAIN: &str = "INPUT";

/// Match arguments of the DROP rule, after the chain name.
const RULE: [&str; 7] = ["-m", "set", "--match-set", SET_NAME, "src", "-j", "DROP"];

pub struct IpsetFilter {
    executor: Arc<dyn CommandExecutor>,
}

impl IpsetFilter {
    pub fn new(executor: Arc<dyn CommandExecutor>) -> Self {
        Self { executor }
    }

    /// iptables arguments for `op` (-C, -D) on the DROP rule.
    fn rule_args(op: &'static str) -> Vec<&'static str> {
        let mut args = vec![op, CHAIN];
        args.extend_from_slice(&RULE);
        args
    }

    fn rule_exists(&self) -> Result<bool, FilterError> {
        Ok(run(self.executor.as_ref(), IPTABLES, &Self::rule_args("-C"))?.success)
    }

    fn set_exists(&self) -> Result<bool, FilterError> {
        Ok(run(self.executor.as_ref(), IPSET, &["list", "-n", SET_NAME])?.success)
    }
}

impl FirewallFilter for IpsetFilter {
    fn name(&self) -> &'static str {
        "ipset"
    }

    fn ensure_installed(&self) -> Result<(), FilterError> {
        run_checked(self.executor.as_ref(), IPSET, &["create", SET_NAME, "hash:ip", "-exist"])?;

        if !self.rule_exists()? {
            let mut args = vec!["-I", CHAIN, "1"];
            args.extend_from_slice(&RULE);
            run_checked(self.executor.as_ref(), IPTABLES, &args)?;
            info!("Inserted iptables rule dropping members of ipset {}", SET_NAME);
        } else {
            debug!("iptables rule for ipset {} already present", SET_NAME);
        }
        Ok(())
    }

    fn flush(&self) -> Result<(), FilterError> {
        run_checked(self.executor.as_ref(), IPSET, &["flush", SET_NAME])?;
        Ok(())
    }

    fn block(&self, addr: Ipv4Addr) -> Result<(), FilterError> {
        let ip = addr.to_string();
        run_checked(self.executor.as_ref(), IPSET, &["add", SET_NAME, &ip, "-exist"])?;
        Ok(())
    }

    fn unblock(&self, addr: Ipv4Addr) -> Result<(), FilterError> {
        let ip = addr.to_string();
        run_checked(self.executor.as_ref(), IPSET, &["del", SET_NAME, &ip, "-exist"])?;
        Ok(())
    }

    fn teardown(&self) -> Result<(), FilterError> {
        // The set cannot be destroyed while the rule still references it.
        if self.rule_exists()? {
            run_checked(self.executor.as_ref(), IPTABLES, &Self::rule_args("-D"))?;
        }
        if self.set_exists()? {
            run_checked(self.executor.as_ref(), IPSET, &["flush", SET_NAME])?;
            run_checked(self.executor.as_ref(), IPSET, &["destroy", SET_NAME])?;
        }
        info!("Removed iptables rule and ipset {}", SET_NAME);
        Ok(())
    }
}
