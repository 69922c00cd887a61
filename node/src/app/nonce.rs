use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::crypto::Address;

/// Random nonces used by each sender. Replayed transactions are rejected.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NonceTracker {
    random_nonces: BTreeMap<Address, BTreeSet<u64>>,
}

impl NonceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// True if `nonce` has not been used by `sender` yet.
    pub fn check(&self, sender: &Address, nonce: u64) -> bool {
        self.random_nonces
            .get(sender)
            .map_or(true, |nonces| !nonces.contains(&nonce))
    }

    pub fn add(&mut self, sender: Address, nonce: u64) {
        self.random_nonces.entry(sender).or_default().insert(nonce);
    }

    /// Checks and records in one step. Returns false if the nonce was used before.
    pub fn check_and_add(&mut self, sender: Address, nonce: u64) -> bool {
        self.random_nonces.entry(sender).or_default().insert(nonce)
    }

    pub fn len(&self) -> usize {
        self.random_nonces.values().map(BTreeSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Mempool bookkeeping for `check_tx`. Reset on every commit, except for the member set.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckTxState {
    members: BTreeSet<Address>,
    tx_counts: BTreeMap<Address, u64>,
    nonce_tracker: NonceTracker,
}

impl CheckTxState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_members<I: IntoIterator<Item = Address>>(&mut self, members: I) {
        self.members = members.into_iter().collect();
    }

    pub fn is_member(&self, address: &Address) -> bool {
        self.members.contains(address)
    }

    /// Admits a transaction of `sender` carrying `nonce` into the mempool.
    /// Fails for senders outside the member set and for nonces seen since the last reset.
    pub fn add_tx(&mut self, sender: Address, nonce: u64) -> bool {
        if !self.is_member(&sender) {
            return false;
        }
        if !self.nonce_tracker.check_and_add(sender, nonce) {
            return false;
        }
        *self.tx_counts.entry(sender).or_default() += 1;
        true
    }

    pub fn tx_count(&self, sender: &Address) -> u64 {
        self.tx_counts.get(sender).copied().unwrap_or_default()
    }

    pub fn reset(&mut self) {
        self.tx_counts.clear();
        self.nonce_tracker = NonceTracker::new();
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn addr(b: u8) -> Address {
        Address::new([b; 20])
    }

    #[test]
    fn test_nonce_reuse() {
        let mut tracker = NonceTracker::new();
        assert!(tracker.check(&addr(1), 5));
        tracker.add(addr(1), 5);
        assert!(!tracker.check(&addr(1), 5));
        assert!(tracker.check(&addr(2), 5));
        assert!(!tracker.check_and_add(addr(1), 5));
        assert!(tracker.check_and_add(addr(1), 6));
        assert_eq!(tracker.len(), 2);
    }

    #[test]
    fn test_check_tx_members_and_reset() {
        let mut state = CheckTxState::new();
        state.set_members(vec![addr(1), addr(1), addr(2)]);

        assert!(!state.add_tx(addr(3), 1));
        assert!(state.add_tx(addr(1), 1));
        assert!(!state.add_tx(addr(1), 1));
        assert!(state.add_tx(addr(1), 2));
        assert_eq!(state.tx_count(&addr(1)), 2);

        state.reset();
        assert_eq!(state.tx_count(&addr(1)), 0);
        assert!(state.add_tx(addr(1), 1));
        assert!(state.is_member(&addr(2)));
    }
}
