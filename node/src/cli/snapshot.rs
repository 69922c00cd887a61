use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use serde::Serialize;

use crate::app::ShutterApp;
use crate::config::Configuration;

/// Prints a summary of a persisted shutter app state.
#[derive(Debug, Clone, Parser)]
pub struct ShowSnapshotCmd {
    #[arg(long, default_value = "default")]
    pub node_name: String,
    /// Snapshot file, defaults to the snapshot path of the node configuration.
    #[clap(short, long)]
    pub path: Option<PathBuf>,
}

#[derive(Serialize, Debug)]
struct ConfigSummary {
    keyper_config_index: u64,
    activation_block_number: u64,
    threshold: u64,
    keypers: Vec<String>,
    started: bool,
    validators_updated: bool,
}

#[derive(Serialize, Debug)]
struct SnapshotSummary {
    chain_id: String,
    last_block_height: i64,
    eon_counter: u64,
    configs: Vec<ConfigSummary>,
    dkg_eons: Vec<u64>,
    checked_in_keypers: usize,
    validators: usize,
    total_power: i64,
}

impl SnapshotSummary {
    fn new(app: &ShutterApp) -> Self {
        SnapshotSummary {
            chain_id: app.chain_id().to_string(),
            last_block_height: app.last_block_height(),
            eon_counter: app.eon_counter(),
            configs: app
                .configs()
                .iter()
                .map(|config| ConfigSummary {
                    keyper_config_index: config.keyper_config_index,
                    activation_block_number: config.activation_block_number,
                    threshold: config.threshold,
                    keypers: config.keypers.iter().map(|k| k.to_checksum()).collect(),
                    started: config.started,
                    validators_updated: config.validators_updated,
                })
                .collect(),
            dkg_eons: app.dkg_instances().map(|dkg| dkg.eon).collect(),
            checked_in_keypers: app.identities().len(),
            validators: app.validators().len(),
            total_power: app.validators().total_power(),
        }
    }
}

impl ShowSnapshotCmd {
    pub fn execute(self) -> anyhow::Result<()> {
        let path = match self.path {
            Some(path) => path,
            None => {
                let conf = Configuration::try_load_from_home_dir(&self.node_name)
                    .context("Error loading configuration file")?;
                PathBuf::from(conf.app.snapshot_path)
            }
        };
        let bytes = std::fs::read(&path)
            .with_context(|| format!("Cannot read snapshot {}", path.display()))?;
        let app = ShutterApp::from_snapshot_bytes(&bytes)?;
        let summary = SnapshotSummary::new(&app);
        println!("{}", serde_json::to_string_pretty(&summary)?);
        Ok(())
    }
}
