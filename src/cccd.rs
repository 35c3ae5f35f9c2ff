//! Per-client characteristic configuration state.
//!
//! The attribute table holds the configuration of the client it is currently
//! serving. When a connection is parked or resumed, the bits of every client
//! configuration descriptor are moved in and out of a [`ClientConfigs`]
//! snapshot keyed by descriptor handle.

/// Client characteristic configuration bits of a single descriptor.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Cccd(u16);

impl Cccd {
    /// Notification bit.
    pub const NOTIFY: u16 = 0x0001;
    /// Indication bit.
    pub const INDICATE: u16 = 0x0002;

    /// Whether the client enabled notifications.
    pub fn notifications_enabled(&self) -> bool {
        self.0 & Self::NOTIFY != 0
    }

    /// Whether the client enabled indications.
    pub fn indications_enabled(&self) -> bool {
        self.0 & Self::INDICATE != 0
    }

    /// The raw descriptor value.
    pub fn raw(&self) -> u16 {
        self.0
    }
}

impl From<u16> for Cccd {
    fn from(raw: u16) -> Self {
        Cccd(raw)
    }
}

/// Saved client configuration bits for one client, indexed by descriptor
/// handle. `N` must be at least the number of client configuration
/// descriptors in the table; unused slots stay at handle zero.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientConfigs<const N: usize> {
    entries: [(u16, Cccd); N],
}

impl<const N: usize> Default for ClientConfigs<N> {
    fn default() -> Self {
        Self {
            entries: [(0, Cccd::default()); N],
        }
    }
}

impl<const N: usize> ClientConfigs<N> {
    /// Record the configuration of the descriptor at `handle`, reusing its
    /// slot if one exists.
    ///
    /// Returns `false` when all slots are taken by other descriptors.
    pub fn store(&mut self, handle: u16, value: Cccd) -> bool {
        debug_assert!(handle != 0);
        for entry in self.entries.iter_mut() {
            if entry.0 == handle || entry.0 == 0 {
                *entry = (handle, value);
                return true;
            }
        }
        false
    }

    /// The saved configuration of the descriptor at `handle`, if any.
    pub fn get(&self, handle: u16) -> Option<Cccd> {
        self.entries
            .iter()
            .find(|(h, _)| *h == handle)
            .map(|(_, cccd)| *cccd)
    }

    /// Occupied slots in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (u16, Cccd)> + '_ {
        self.entries.iter().copied().filter(|(h, _)| *h != 0)
    }

    /// Forget all saved configurations, as on bond loss.
    pub fn clear(&mut self) {
        self.entries = [(0, Cccd::default()); N];
    }
}
