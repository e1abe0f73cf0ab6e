//! A bidirectional hostname/address registry consulted by simulated hosts.

use std::net::Ipv4Addr;
use std::sync::RwLock;

use rustc_hash::FxHashMap;

/// The global name service. Interior synchronization lets managers resolve
/// names while the controller keeps registering hosts.
#[derive(Debug, Default)]
pub struct Dns {
    inner: RwLock<Registry>,
}

#[derive(Debug, Default)]
struct Registry {
    by_name: FxHashMap<String, Ipv4Addr>,
    by_addr: FxHashMap<Ipv4Addr, String>,
}

impl Dns {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a name/address pair. Both sides must be fresh, which also
    /// makes registration the global hostname-uniqueness check.
    pub fn register(&self, name: &str, addr: Ipv4Addr) -> Result<(), DnsError> {
        // the lock is never poisoned: no code panics while holding it
        let mut registry = self.inner.write().unwrap();
        if registry.by_name.contains_key(name) {
            return Err(DnsError::NameInUse(name.to_string()));
        }
        if registry.by_addr.contains_key(&addr) {
            return Err(DnsError::AddressInUse(addr));
        }
        registry.by_name.insert(name.to_string(), addr);
        registry.by_addr.insert(addr, name.to_string());
        Ok(())
    }

    pub fn resolve(&self, name: &str) -> Option<Ipv4Addr> {
        self.inner.read().unwrap().by_name.get(name).copied()
    }

    pub fn reverse(&self, addr: Ipv4Addr) -> Option<String> {
        self.inner.read().unwrap().by_addr.get(&addr).cloned()
    }

    /// All registered pairs, sorted by name.
    pub fn entries(&self) -> Vec<(String, Ipv4Addr)> {
        let registry = self.inner.read().unwrap();
        let mut entries = registry
            .by_name
            .iter()
            .map(|(name, &addr)| (name.clone(), addr))
            .collect::<Vec<_>>();
        entries.sort();
        entries
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap().by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Reasons a registration is rejected.
#[derive(Debug, thiserror::Error)]
pub enum DnsError {
    /// The hostname is already registered.
    #[error("hostname '{0}' is already registered")]
    NameInUse(String),

    /// The address is already registered.
    #[error("address {0} is already registered")]
    AddressInUse(Ipv4Addr),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registration_resolves_both_ways() {
        let dns = Dns::new();
        let addr = Ipv4Addr::new(11, 0, 0, 1);
        dns.register("peer", addr).unwrap();
        assert_eq!(dns.resolve("peer"), Some(addr));
        assert_eq!(dns.reverse(addr), Some("peer".to_string()));
        assert_eq!(dns.resolve("stranger"), None);
        assert_eq!(dns.len(), 1);
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let dns = Dns::new();
        dns.register("peer", Ipv4Addr::new(11, 0, 0, 1)).unwrap();
        let res = dns.register("peer", Ipv4Addr::new(11, 0, 0, 2));
        assert!(matches!(res, Err(DnsError::NameInUse(..))));
    }

    #[test]
    fn duplicate_addresses_are_rejected() {
        let dns = Dns::new();
        let addr = Ipv4Addr::new(11, 0, 0, 1);
        dns.register("peer", addr).unwrap();
        let res = dns.register("other", addr);
        assert!(matches!(res, Err(DnsError::AddressInUse(..))));
    }

    #[test]
    fn entries_are_sorted_by_name() {
        let dns = Dns::new();
        dns.register("bravo", Ipv4Addr::new(11, 0, 0, 2)).unwrap();
        dns.register("alpha", Ipv4Addr::new(11, 0, 0, 1)).unwrap();
        let names = dns
            .entries()
            .into_iter()
            .map(|(name, _)| name)
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["alpha", "bravo"]);
    }
}
