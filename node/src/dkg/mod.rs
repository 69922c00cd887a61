//! Distributed key generation run by the keypers of a batch config.

pub mod gammas;
pub mod phase;
pub mod pure;

pub use gammas::{Gammas, GammasError};
pub use phase::{phase_at, Phase, PhaseLength};
pub use pure::{
    AccusationMsg, ApologyMsg, DkgResult, PolyCommitmentMsg, PolyEvalMsg, PureDkg, PureDkgError,
};
