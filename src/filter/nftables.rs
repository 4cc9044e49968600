//! nftables backend implementation.

use std::net::Ipv4Addr;
use std::sync::Arc;
use tracing::{debug, info};

use super::FirewallFilter;
use crate::cmd_abstraction::{run, run_checked, run_script, CommandExecutor};
use crate::error::FilterError;

pub(super) const NFT: &str = "nft";
const TABLE_NAME: &str = "banisher";
const SET_NAME: &str = "banished";
const CHAIN_NAME: &str = "input";

/// nft reports a missing element or object with ENOENT.
const ENOENT: &str = "No such file or directory";

/// nftables backend: `table ip banisher` holding a set and an input chain.
pub struct NftablesFilter {
    executor: Arc<dyn CommandExecutor>,
}

impl NftablesFilter {
    pub fn new(executor: Arc<dyn CommandExecutor>) -> Self {
        Self { executor }
    }

    /// Script creating table, set and chain; `add` is idempotent for all three.
    fn generate_install_script(&self) -> String {
        let mut script = String::new();
        script.push_str(&format!("add table ip {}\n", TABLE_NAME));
        script.push_str(&format!(
            "add set ip {} {} {{ type ipv4_addr; }}\n",
            TABLE_NAME, SET_NAME
        ));
        script.push_str(&format!(
            "add chain ip {} {} {{ type filter hook input priority -1; policy accept; }}\n",
            TABLE_NAME, CHAIN_NAME
        ));
        script
    }

    fn generate_rule_script(&self) -> String {
        format!(
            "add rule ip {} {} ip saddr @{} counter drop\n",
            TABLE_NAME, CHAIN_NAME, SET_NAME
        )
    }

    /// Script removing the chain (and its rule) first, then the set, then the table.
    fn generate_teardown_script(&self) -> String {
        let mut script = String::new();
        script.push_str(&format!("flush chain ip {} {}\n", TABLE_NAME, CHAIN_NAME));
        script.push_str(&format!("delete chain ip {} {}\n", TABLE_NAME, CHAIN_NAME));
        script.push_str(&format!("flush set ip {} {}\n", TABLE_NAME, SET_NAME));
        script.push_str(&format!("delete set ip {} {}\n", TABLE_NAME, SET_NAME));
        script.push_str(&format!("delete table ip {}\n", TABLE_NAME));
        script
    }

    fn table_exists(&self) -> Result<bool, FilterError> {
        Ok(run(self.executor.as_ref(), NFT, &["list", "table", "ip", TABLE_NAME])?.success)
    }

    fn rule_exists(&self) -> Result<bool, FilterError> {
        let output = run(
            self.executor.as_ref(),
            NFT,
            &["list", "chain", "ip", TABLE_NAME, CHAIN_NAME],
        )?;
        Ok(output.success && output.stdout.contains(&format!("@{}", SET_NAME)))
    }

    fn element_command(&self, verb: &str, addr: Ipv4Addr) -> Result<(), FilterError> {
        let element = format!("{{ {} }}", addr);
        let output = run(
            self.executor.as_ref(),
            NFT,
            &[verb, "element", "ip", TABLE_NAME, SET_NAME, &element],
        )?;
        if output.success || (verb == "delete" && output.stderr.contains(ENOENT)) {
            Ok(())
        } else {
            Err(FilterError::Command {
                program: NFT.to_string(),
                stderr: output.stderr.trim().to_string(),
            })
        }
    }
}

impl FirewallFilter for NftablesFilter {
    fn name(&self) -> &'static str {
        "nftables"
    }

    fn ensure_installed(&self) -> Result<(), FilterError> {
        run_script(
            self.executor.as_ref(),
            NFT,
            &["-f", "-"],
            &self.generate_install_script(),
        )?;

        if !self.rule_exists()? {
            run_script(self.executor.as_ref(), NFT, &["-f", "-"], &self.generate_rule_script())?;
            info!("Installed nftables table ip {} dropping @{}", TABLE_NAME, SET_NAME);
        } else {
            debug!("nftables rule for @{} already present", SET_NAME);
        }
        Ok(())
    }

    fn flush(&self) -> Result<(), FilterError> {
        run_checked(
            self.executor.as_ref(),
            NFT,
            &["flush", "set", "ip", TABLE_NAME, SET_NAME],
        )?;
        Ok(())
    }

    fn block(&self, addr: Ipv4Addr) -> Result<(), FilterError> {
        self.element_command("add", addr)
    }

    fn unblock(&self, addr: Ipv4Addr) -> Result<(), FilterError> {
        self.element_command("delete", addr)
    }

    fn teardown(&self) -> Result<(), FilterError> {
        if self.table_exists()? {
            run_script(
                self.executor.as_ref(),
                NFT,
                &["-f", "-"],
                &self.generate_teardown_script(),
            )?;
            info!("Removed nftables table ip {}", TABLE_NAME);
        }
        Ok(())
    }
}
