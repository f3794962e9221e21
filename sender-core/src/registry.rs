//! Discovered and bonded device tracking.
//!
//! The registry keeps two independent lists:
//! - **scanned**: peers reported by "device found" events while discovery is
//!   active, deduplicated by address, in first-seen order
//! - **bonded**: the radio stack's bonded set, replaced wholesale each time
//!   discovery starts
//!
//! Stopping discovery only stops accumulation; the scanned list is kept
//! until [`DeviceRegistry::clear_scanned`] is called on teardown.

use sender_types::Peer;

/// Deduplicated, order-preserving device lists.
#[derive(Debug, Clone, Default)]
pub struct DeviceRegistry {
    scanned: Vec<Peer>,
    bonded: Vec<Peer>,
    discovering: bool,
}

impl DeviceRegistry {
    /// Create an empty registry with discovery stopped.
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin accepting "device found" events and refresh the bonded list.
    ///
    /// Previously scanned peers are kept.
    pub fn start_discovery(&mut self, bonded: impl IntoIterator<Item = Peer>) {
        self.discovering = true;
        self.refresh_bonded(bonded);
    }

    /// Stop accepting "device found" events.
    pub fn stop_discovery(&mut self) {
        self.discovering = false;
    }

    /// Replace the bonded list.
    ///
    /// Duplicate addresses in the input keep their first occurrence.
    pub fn refresh_bonded(&mut self, bonded: impl IntoIterator<Item = Peer>) {
        self.bonded.clear();
        for peer in bonded {
            if !self.bonded.contains(&peer) {
                self.bonded.push(peer);
            }
        }
    }

    /// Record a discovered peer.
    ///
    /// Returns `true` if the scanned list changed. Peers already present (by
    /// address) and peers reported while discovery is stopped are ignored.
    pub fn on_device_found(&mut self, peer: Peer) -> bool {
        if !self.discovering || self.scanned.contains(&peer) {
            return false;
        }
        self.scanned.push(peer);
        true
    }

    /// Drop all scanned peers.
    pub fn clear_scanned(&mut self) {
        self.scanned.clear();
    }

    /// Whether discovery is currently active.
    pub fn is_discovering(&self) -> bool {
        self.discovering
    }

    /// Whether `address` is in the bonded list.
    pub fn is_bonded(&self, address: &str) -> bool {
        self.bonded.iter().any(|p| p.address == address)
    }

    /// Scanned peers in first-seen order.
    pub fn scanned(&self) -> &[Peer] {
        &self.scanned
    }

    /// Bonded peers as last reported.
    pub fn bonded(&self) -> &[Peer] {
        &self.bonded
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn discovering() -> DeviceRegistry {
        let mut registry = DeviceRegistry::new();
        registry.start_discovery(Vec::new());
        registry
    }

    #[test]
    fn new_registry_is_empty_and_idle() {
        let registry = DeviceRegistry::new();
        assert!(registry.scanned().is_empty());
        assert!(registry.bonded().is_empty());
        assert!(!registry.is_discovering());
    }

    #[test]
    fn same_address_twice_is_one_peer() {
        let mut registry = discovering();

        assert!(registry.on_device_found(Peer::new("Tablet", "AA")));
        assert!(!registry.on_device_found(Peer::unnamed("AA")));

        assert_eq!(registry.scanned().len(), 1);
        assert_eq!(registry.scanned()[0].name.as_deref(), Some("Tablet"));
    }

    #[test]
    fn first_seen_order_is_preserved() {
        let mut registry = discovering();
        registry.on_device_found(Peer::unnamed("BB"));
        registry.on_device_found(Peer::unnamed("AA"));
        registry.on_device_found(Peer::unnamed("BB"));
        registry.on_device_found(Peer::unnamed("CC"));

        let addresses: Vec<&str> = registry
            .scanned()
            .iter()
            .map(|p| p.address.as_str())
            .collect();
        assert_eq!(addresses, vec!["BB", "AA", "CC"]);
    }

    #[test]
    fn found_events_ignored_before_start() {
        let mut registry = DeviceRegistry::new();
        assert!(!registry.on_device_found(Peer::unnamed("AA")));
        assert!(registry.scanned().is_empty());
    }

    #[test]
    fn stop_keeps_scanned_and_stops_accumulating() {
        let mut registry = discovering();
        registry.on_device_found(Peer::unnamed("AA"));
        registry.stop_discovery();

        assert!(!registry.on_device_found(Peer::unnamed("BB")));
        assert_eq!(registry.scanned().len(), 1);
    }

    #[test]
    fn restart_keeps_scanned_and_replaces_bonded() {
        let mut registry = DeviceRegistry::new();
        registry.start_discovery(vec![Peer::unnamed("B1"), Peer::unnamed("B2")]);
        registry.on_device_found(Peer::unnamed("AA"));
        registry.stop_discovery();

        registry.start_discovery(vec![Peer::unnamed("B3")]);

        assert_eq!(registry.scanned().len(), 1);
        assert_eq!(registry.bonded(), &[Peer::unnamed("B3")]);
        assert!(registry.is_bonded("B3"));
        assert!(!registry.is_bonded("B1"));
    }

    #[test]
    fn bonded_refresh_dedups() {
        let mut registry = DeviceRegistry::new();
        registry.refresh_bonded(vec![
            Peer::new("one", "B1"),
            Peer::new("again", "B1"),
            Peer::unnamed("B2"),
        ]);
        assert_eq!(registry.bonded().len(), 2);
        assert_eq!(registry.bonded()[0].name.as_deref(), Some("one"));
    }

    #[test]
    fn clear_scanned_empties_list() {
        let mut registry = discovering();
        registry.on_device_found(Peer::unnamed("AA"));
        registry.clear_scanned();
        assert!(registry.scanned().is_empty());
        // Discovery itself is unaffected.
        assert!(registry.on_device_found(Peer::unnamed("AA")));
    }
}
