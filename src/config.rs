//! Configuration management for the Banisher.
//!
//! The YAML layout keeps the historical key names (`defaultBanishmentDuration`,
//! `IPpos`, `regexIP`) so existing configuration files load unchanged.

use anyhow::{bail, Context, Result};
use ipnet::Ipv4Net;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::Ipv4Addr;
use std::path::Path;
use std::time::Duration;

use crate::rules::{Extraction, Rule, RuleMatcher};
use crate::whitelist::Whitelist;

pub const DEFAULT_CONFIG_PATH: &str = "/etc/banisher/config.yml";
pub const DEFAULT_DB_PATH: &str = "/var/lib/banisher/db.redb";

/// `regexIP` value selecting the generic IPv4 extractor.
const GENERIC_IPV4: &str = "ipv4";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Config {
    /// Ban duration in seconds
    pub default_banishment_duration: u64,

    /// Seconds between two expiry sweeps
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval: u64,

    /// Firewall backend (auto, ipset, nftables)
    #[serde(default)]
    pub firewall: FilterBackend,

    /// Maximum number of ban requests processed concurrently
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Pending ban requests before log reading is paused
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Addresses or networks never banned
    #[serde(default)]
    pub whitelist: Vec<String>,

    pub rules: Vec<RuleConfig>,
}

/// One detection rule as written in the configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleConfig {
    pub name: String,

    #[serde(rename = "match")]
    pub pattern: String,

    /// Zero-indexed position of the offending address among the line's IPv4s
    #[serde(rename = "IPpos", alias = "ipPos", default)]
    pub ip_pos: Option<usize>,

    /// `ipv4` (generic extractor) or a custom pattern
    #[serde(rename = "regexIP", alias = "regexIp", default)]
    pub regex_ip: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FilterBackend {
    /// Auto-detect (nftables first, then ipset + iptables)
    #[default]
    Auto,
    /// ipset referenced by an iptables DROP rule
    Ipset,
    /// nftables set referenced by an input chain rule
    Nftables,
}

/// Timing parameters of the Banishment Engine, fixed for the process lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    pub ban_duration: Duration,
    pub sweep_interval: Duration,
}

/// Bounds of the ban dispatch pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchConfig {
    pub workers: usize,
    pub queue_capacity: usize,
}

/// Everything the daemon needs, compiled and validated.
#[derive(Debug, Clone)]
pub struct Settings {
    pub engine: EngineConfig,
    pub dispatch: DispatchConfig,
    pub backend: FilterBackend,
    pub matcher: RuleMatcher,
    pub whitelist: Whitelist,
}

fn default_sweep_interval() -> u64 {
    300
}

fn default_workers() -> usize {
    4
}

fn default_queue_capacity() -> usize {
    1024
}

impl Config {
    /// Load and validate configuration from a YAML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;
        let config = Self::from_yaml(&content)
            .with_context(|| format!("Invalid config file: {:?}", path.as_ref()))?;
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(content).context("Failed to parse YAML")?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        self.compile().map(|_| ())
    }

    /// Validate and compile into runtime settings.
    pub fn compile(&self) -> Result<Settings> {
        if self.default_banishment_duration == 0 {
            bail!("defaultBanishmentDuration must be a positive number of seconds");
        }
        if self.sweep_interval == 0 {
            bail!("sweepInterval must be a positive number of seconds");
        }
        if self.workers == 0 {
            bail!("workers must be at least 1");
        }
        if self.queue_capacity == 0 {
            bail!("queueCapacity must be at least 1");
        }

        Ok(Settings {
            engine: EngineConfig {
                ban_duration: Duration::from_secs(self.default_banishment_duration),
                sweep_interval: Duration::from_secs(self.sweep_interval),
            },
            dispatch: DispatchConfig {
                workers: self.workers,
                queue_capacity: self.queue_capacity,
            },
            backend: self.firewall,
            matcher: RuleMatcher::new(self.compile_rules()?),
            whitelist: self.compile_whitelist()?,
        })
    }

    fn compile_whitelist(&self) -> Result<Whitelist> {
        let mut addresses = HashSet::new();
        let mut networks: Vec<Ipv4Net> = Vec::new();

        for entry in &self.whitelist {
            let entry = entry.trim();
            let duplicate = if entry.contains('/') {
                let net: Ipv4Net = entry
                    .parse()
                    .map_err(|_| anyhow::anyhow!("{} is not a valid IPv4 network for whitelist", entry))?;
                let net = net.trunc();
                let seen = networks.contains(&net);
                networks.push(net);
                seen
            } else {
                let addr: Ipv4Addr = entry
                    .parse()
                    .map_err(|_| anyhow::anyhow!("{} is not a valid IPv4 address for whitelist", entry))?;
                !addresses.insert(addr)
            };
            if duplicate {
                bail!("{} appears multiple times in your whitelist", entry);
            }
        }

        Ok(Whitelist::new(addresses, networks))
    }

    fn compile_rules(&self) -> Result<Vec<Rule>> {
        if self.rules.is_empty() {
            bail!("at least one rule is required");
        }

        let mut names = HashSet::new();
        let mut rules = Vec::with_capacity(self.rules.len());
        for raw in &self.rules {
            rules.push(raw.compile()?);
            if !names.insert(raw.name.as_str()) {
                bail!("rule name '{}' is used more than once", raw.name);
            }
        }
        Ok(rules)
    }
}

impl RuleConfig {
    fn compile(&self) -> Result<Rule> {
        if self.name.trim().is_empty() {
            bail!("required field 'name' is empty in a rule");
        }

        let pattern = Regex::new(&self.pattern)
            .with_context(|| format!("rule '{}': failed to compile match regex {:?}", self.name, self.pattern))?;

        let extraction = match self.regex_ip.as_deref() {
            None | Some(GENERIC_IPV4) => Extraction::Position(self.ip_pos.unwrap_or(0)),
            Some(custom) => {
                if self.ip_pos.unwrap_or(0) != 0 {
                    bail!("rule '{}': IPpos cannot be combined with a custom regexIP", self.name);
                }
                let re = Regex::new(custom).with_context(|| {
                    format!("rule '{}': failed to compile regexIP {:?}", self.name, custom)
                })?;
                Extraction::Pattern(re)
            }
        };

        Ok(Rule::new(self.name.clone(), pattern, extraction))
    }
}

/// Commented example configuration (`banisher check --example`).
pub fn example_yaml() -> &'static str {
    include_str!("../templates/config.yml")
}
