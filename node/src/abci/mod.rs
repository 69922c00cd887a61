//! # ABCI
//!
//! The interface between the consensus engine and the shuttermint application.

pub mod application;
pub mod types;

pub use application::{Application, ApplicationError};
pub use types::{Event, EventAttribute, ValidatorUpdate, CODE_ERR, CODE_OK};
