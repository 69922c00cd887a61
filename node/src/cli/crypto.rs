use clap::Parser;

use crate::crypto::{KeyPair, KeyperKeypair};
use crate::utilities::to_hex;

#[derive(Debug, Clone, Parser)]
pub struct GenerateKeysCmd;

impl GenerateKeysCmd {
    pub fn execute(self) -> anyhow::Result<()> {
        let keypair = KeyperKeypair::generate()?;
        let encryption_key = k256::SecretKey::random(&mut rand::thread_rng());
        println!("Signing key:    {:>5}", keypair.to_hex());
        println!("Address:        {:>5}", keypair.address());
        println!("Encryption key: {:>5}", to_hex(encryption_key.to_bytes()));
        Ok(())
    }
}
