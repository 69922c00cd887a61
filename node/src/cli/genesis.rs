use std::path::PathBuf;

use clap::Parser;

use crate::app::genesis::GenesisAppState;
use crate::crypto::Address;

/// Writes the app state part of a genesis file.
#[derive(Debug, Clone, Parser)]
pub struct GenesisCmd {
    /// Comma separated keyper addresses.
    #[clap(long, value_delimiter = ',', required = true)]
    pub keypers: Vec<Address>,
    #[clap(long)]
    pub threshold: u64,
    #[clap(long, default_value_t = 0)]
    pub initial_eon: u64,
    /// Prints to stdout when not given.
    #[clap(long)]
    pub output: Option<PathBuf>,
}

impl GenesisCmd {
    pub fn execute(self) -> anyhow::Result<()> {
        let genesis = GenesisAppState::new(&self.keypers, self.threshold, self.initial_eon);
        genesis.batch_config()?;
        let json = genesis.to_json_pretty()?;
        match self.output {
            Some(path) => {
                std::fs::write(&path, json)?;
                println!("Genesis app state written to {}", path.display());
            }
            None => println!("{json}"),
        }
        Ok(())
    }
}
