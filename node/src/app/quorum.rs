use crate::app::config::BatchConfig;

/// Number of keypers of `config` that must have checked in before the
/// validator set is handed over to them.
///
/// This is the config's threshold or the number of validators the consensus
/// engine needs to make progress (more than two thirds), whichever is
/// greater. A config without keypers requires nobody.
pub fn num_required_transition_validators(config: &BatchConfig) -> u64 {
    let n = config.keypers.len() as u64;
    if n == 0 {
        return 0;
    }
    let max_faulty = (n + 2) / 3;
    let defenders = n - max_faulty + 1;
    config.threshold.max(defenders)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::crypto::Address;

    fn config(n: u8, threshold: u64) -> BatchConfig {
        BatchConfig {
            threshold,
            keypers: (0..n).map(|b| Address::new([b; 20])).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_empty_config_requires_nobody() {
        assert_eq!(num_required_transition_validators(&config(0, 0)), 0);
    }

    #[test]
    fn test_two_thirds_floor() {
        assert_eq!(num_required_transition_validators(&config(1, 1)), 1);
        assert_eq!(num_required_transition_validators(&config(3, 1)), 3);
        assert_eq!(num_required_transition_validators(&config(4, 2)), 3);
        assert_eq!(num_required_transition_validators(&config(10, 2)), 7);
    }

    #[test]
    fn test_threshold_wins_when_higher() {
        assert_eq!(num_required_transition_validators(&config(4, 4)), 4);
    }
}
