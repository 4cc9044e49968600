//! Addresses that are never banned.

use ipnet::Ipv4Net;
use std::collections::HashSet;
use std::net::Ipv4Addr;

/// Read-only set of exempt addresses and networks.
#[derive(Debug, Clone, Default)]
pub struct Whitelist {
    addresses: HashSet<Ipv4Addr>,
    networks: Vec<Ipv4Net>,
}

impl Whitelist {
    pub fn new(addresses: HashSet<Ipv4Addr>, networks: Vec<Ipv4Net>) -> Self {
        Self { addresses, networks }
    }

    pub fn from_addresses<I: IntoIterator<Item = Ipv4Addr>>(addresses: I) -> Self {
        Self {
            addresses: addresses.into_iter().collect(),
            networks: Vec::new(),
        }
    }

    pub fn contains(&self, addr: Ipv4Addr) -> bool {
        self.addresses.contains(&addr) || self.networks.iter().any(|net| net.contains(&addr))
    }

    pub fn len(&self) -> usize {
        self.addresses.len() + self.networks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
