use anyhow::Context;
use clap::Parser;

use crate::config::{
    AppConfiguration, Configuration, KeyperConfiguration, ShuttermintConfiguration,
    StorageConfiguration, DEFAULT_DKG_PHASE_LENGTH, DEFAULT_DKG_START_BLOCK_DELTA,
    DEFAULT_PERSIST_MIN_DURATION_MS, DEFAULT_POLL_INTERVAL_MS, DEFAULT_SHUTTERMINT_URL,
};
use crate::crypto::{KeyPair, KeyperKeypair, ValidatorPubkey};
use crate::utilities::{from_hex, to_hex};

#[derive(Debug, Clone, Parser)]
pub struct InitCmd {
    #[arg(long, default_value = "default")]
    pub node_name: String,
    /// Hex encoded ed25519 public key of the validator run by this keyper.
    #[clap(long)]
    pub validator_public_key: String,
    #[clap(long, default_value = DEFAULT_SHUTTERMINT_URL)]
    pub shuttermint_url: String,
    #[clap(long, default_value_t = DEFAULT_DKG_PHASE_LENGTH)]
    pub dkg_phase_length: i64,
    #[clap(long, default_value_t = DEFAULT_DKG_START_BLOCK_DELTA)]
    pub dkg_start_block_delta: u64,
    #[clap(long, default_value_t = DEFAULT_POLL_INTERVAL_MS)]
    pub poll_interval_ms: u64,
    #[clap(long)]
    pub dev_mode: bool,
}

impl InitCmd {
    pub fn execute(self) -> anyhow::Result<()> {
        if Configuration::try_load_from_home_dir(&self.node_name).is_ok() {
            anyhow::bail!("Configuration already exists for node {}", self.node_name);
        }
        let validator_key = from_hex(&self.validator_public_key)
            .ok()
            .and_then(|bytes| ValidatorPubkey::new(&bytes).ok())
            .context("Invalid validator public key, expected 32 hex encoded bytes")?;

        let path = Configuration::root_dir()?.join(&self.node_name);
        println!("Creating shuttermint configuration in: {path:?}");

        let signing_keypair = KeyperKeypair::generate()?;
        let encryption_key = k256::SecretKey::random(&mut rand::thread_rng());

        let configuration = Configuration {
            app: AppConfiguration {
                snapshot_path: path.join("app.bin").display().to_string(),
                persist_min_duration_ms: DEFAULT_PERSIST_MIN_DURATION_MS,
                dev_mode: self.dev_mode,
            },
            keyper: KeyperConfiguration {
                signing_key: signing_keypair.to_hex(),
                encryption_key: to_hex(encryption_key.to_bytes()),
                validator_public_key: to_hex(validator_key.as_bytes()),
            },
            shuttermint: ShuttermintConfiguration {
                url: self.shuttermint_url,
                dkg_phase_length: self.dkg_phase_length,
                dkg_start_block_delta: self.dkg_start_block_delta,
                poll_interval_ms: self.poll_interval_ms,
            },
            storage: StorageConfiguration {
                sqlite_path: path.join("db").join("keyper.sqlite").display().to_string(),
                create_if_not_exists: true,
            },
        };
        std::fs::create_dir_all(path.join("db"))?;
        configuration
            .try_write_home_dir(&self.node_name)
            .context("Error creating configuration file")?;

        println!("Keyper address: {}", signing_keypair.address());
        Ok(())
    }
}
