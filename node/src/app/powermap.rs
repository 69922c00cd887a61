use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::abci::ValidatorUpdate;
use crate::crypto::{ValidatorPubkey, NON_EXISTENT_VALIDATOR};

/// Voting power every keyper contributes to the consensus validator set.
pub const KEYPER_POWER: i64 = 10;

/// Voting power per validator key.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Powermap(BTreeMap<ValidatorPubkey, i64>);

impl Powermap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a powermap from validator updates, as supplied at genesis.
    pub fn from_validator_updates(updates: &[ValidatorUpdate]) -> Self {
        let mut map = Powermap::new();
        for update in updates {
            map.add(update.pub_key, update.power);
        }
        map
    }

    /// Each entry contributes [`KEYPER_POWER`] to its validator key, or to
    /// [`NON_EXISTENT_VALIDATOR`] if it has none yet.
    pub fn for_keypers<I: IntoIterator<Item = Option<ValidatorPubkey>>>(keypers: I) -> Self {
        let mut map = Powermap::new();
        for key in keypers {
            map.add(key.unwrap_or(NON_EXISTENT_VALIDATOR), KEYPER_POWER);
        }
        map
    }

    pub fn add(&mut self, key: ValidatorPubkey, power: i64) {
        *self.0.entry(key).or_default() += power;
    }

    pub fn get(&self, key: &ValidatorPubkey) -> i64 {
        self.0.get(key).copied().unwrap_or_default()
    }

    pub fn total_power(&self) -> i64 {
        self.0.values().sum()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ValidatorPubkey, &i64)> {
        self.0.iter()
    }

    /// Updates turning `old` into `new`, in key order. Removed keys get power zero.
    pub fn diff(old: &Powermap, new: &Powermap) -> Vec<ValidatorUpdate> {
        let keys: BTreeSet<&ValidatorPubkey> = old.0.keys().chain(new.0.keys()).collect();
        keys.into_iter()
            .filter_map(|key| {
                let before = old.0.get(key);
                let after = new.0.get(key);
                match (before, after) {
                    (Some(b), Some(a)) if a == b => None,
                    (_, Some(a)) => Some(ValidatorUpdate {
                        pub_key: *key,
                        power: *a,
                    }),
                    (Some(_), None) => Some(ValidatorUpdate {
                        pub_key: *key,
                        power: 0,
                    }),
                    (None, None) => None,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn key(b: u8) -> ValidatorPubkey {
        ValidatorPubkey::new(&[b; 32]).unwrap()
    }

    #[test]
    fn test_keypers_without_key_use_sentinel() {
        let map = Powermap::for_keypers(vec![Some(key(1)), None, None]);
        assert_eq!(map.get(&key(1)), 10);
        assert_eq!(map.get(&NON_EXISTENT_VALIDATOR), 20);
        assert_eq!(map.total_power(), 30);
    }

    #[test]
    fn test_diff() {
        let old = Powermap::for_keypers(vec![Some(key(1)), Some(key(2))]);
        let new = Powermap::for_keypers(vec![Some(key(2)), Some(key(3)), Some(key(3))]);
        let updates = Powermap::diff(&old, &new);
        assert_eq!(
            updates,
            vec![
                ValidatorUpdate {
                    pub_key: key(1),
                    power: 0
                },
                ValidatorUpdate {
                    pub_key: key(3),
                    power: 20
                },
            ]
        );
        assert!(Powermap::diff(&new, &new).is_empty());
    }

    #[test]
    fn test_from_validator_updates() {
        let map = Powermap::from_validator_updates(&[
            ValidatorUpdate {
                pub_key: key(1),
                power: 5,
            },
            ValidatorUpdate {
                pub_key: key(1),
                power: 5,
            },
        ]);
        assert_eq!(map.get(&key(1)), 10);
        assert_eq!(map.len(), 1);
    }
}
