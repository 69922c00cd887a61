use serde::{Deserialize, Serialize};

/// Heights at which protocol upgrades activate. `None` disables the fork.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForkHeights {
    #[serde(default)]
    pub check_in_update: Option<i64>,
}

impl ForkHeights {
    pub fn all_enabled() -> Self {
        ForkHeights {
            check_in_update: Some(0),
        }
    }

    pub fn all_disabled() -> Self {
        ForkHeights {
            check_in_update: None,
        }
    }
}

/// Chain specific activation condition replacing the genesis fork height.
/// If both are set, `height` takes precedence over `eon`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForkHeightOverride {
    #[serde(default)]
    pub height: Option<i64>,
    #[serde(default)]
    pub eon: Option<u64>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForkHeightOverrides {
    #[serde(default)]
    pub check_in_update: Option<ForkHeightOverride>,
}

/// Decides whether a fork is active at `height` during `eon`.
///
/// With an override only the override decides; an override with neither
/// height nor eon keeps the fork disabled. Without an override the fork is
/// active from the genesis fork height on, and never if there is none.
pub fn is_fork_active(
    fork_height: Option<i64>,
    fork_override: Option<&ForkHeightOverride>,
    height: i64,
    eon: u64,
) -> bool {
    if let Some(fork_override) = fork_override {
        if let Some(override_height) = fork_override.height {
            return height >= override_height;
        }
        if let Some(override_eon) = fork_override.eon {
            return eon >= override_eon;
        }
        return false;
    }
    match fork_height {
        Some(fork_height) => height >= fork_height,
        None => false,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_without_override() {
        assert!(!is_fork_active(None, None, 100, 100));
        assert!(!is_fork_active(Some(10), None, 9, 0));
        assert!(is_fork_active(Some(10), None, 10, 0));
        assert!(is_fork_active(Some(0), None, 0, 0));
    }

    #[test]
    fn test_override_height_beats_eon() {
        let both = ForkHeightOverride {
            height: Some(50),
            eon: Some(1),
        };
        assert!(!is_fork_active(Some(0), Some(&both), 49, 5));
        assert!(is_fork_active(None, Some(&both), 50, 0));
    }

    #[test]
    fn test_override_eon() {
        let eon = ForkHeightOverride {
            height: None,
            eon: Some(9),
        };
        assert!(!is_fork_active(Some(0), Some(&eon), 1000, 8));
        assert!(is_fork_active(None, Some(&eon), 0, 9));
    }

    #[test]
    fn test_empty_override_disables() {
        let empty = ForkHeightOverride::default();
        assert!(!is_fork_active(Some(0), Some(&empty), 1000, 1000));
    }

    #[test]
    fn test_json_names() {
        let heights: ForkHeights = serde_json::from_str(r#"{"checkInUpdate": 12}"#).unwrap();
        assert_eq!(heights.check_in_update, Some(12));
        let heights: ForkHeights = serde_json::from_str(r#"{"checkInUpdate": null}"#).unwrap();
        assert_eq!(heights, ForkHeights::all_disabled());
    }
}
