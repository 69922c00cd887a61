pub mod abci;
pub mod app;
pub mod cli;
pub mod config;
pub mod crypto;
pub mod dkg;
pub mod events;
pub mod keyper;
pub mod logging;
pub mod shmsg;
pub mod storage;
pub mod utilities;
