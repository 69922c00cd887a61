use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Phase {
    Off,
    Dealing,
    Accusing,
    Apologizing,
    Finalized,
}

impl Phase {
    pub fn next(self) -> Option<Phase> {
        match self {
            Phase::Off => Some(Phase::Dealing),
            Phase::Dealing => Some(Phase::Accusing),
            Phase::Accusing => Some(Phase::Apologizing),
            Phase::Apologizing => Some(Phase::Finalized),
            Phase::Finalized => None,
        }
    }
}

impl Display for Phase {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Phase::Off => "off",
            Phase::Dealing => "dealing",
            Phase::Accusing => "accusing",
            Phase::Apologizing => "apologizing",
            Phase::Finalized => "finalized",
        };
        write!(f, "{name}")
    }
}

/// Length of each DKG phase in shuttermint blocks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseLength {
    initial_off: i64,
    dealing: i64,
    accusing: i64,
    apologizing: i64,
}

impl PhaseLength {
    pub fn constant(length: i64) -> Self {
        PhaseLength {
            initial_off: 0,
            dealing: length,
            accusing: length,
            apologizing: length,
        }
    }

    /// Phase of an eon started at `eon_start_height` when looking at `height`.
    /// Every boundary belongs to the later phase.
    pub fn phase_at_height(&self, height: i64, eon_start_height: i64) -> Phase {
        let off_end = eon_start_height + self.initial_off;
        let dealing_end = off_end + self.dealing;
        let accusing_end = dealing_end + self.accusing;
        let apologizing_end = accusing_end + self.apologizing;

        if height < off_end {
            Phase::Off
        } else if height < dealing_end {
            Phase::Dealing
        } else if height < accusing_end {
            Phase::Accusing
        } else if height < apologizing_end {
            Phase::Apologizing
        } else {
            Phase::Finalized
        }
    }
}

pub fn phase_at(height: i64, eon_start_height: i64, length: i64) -> Phase {
    PhaseLength::constant(length).phase_at_height(height, eon_start_height)
}
