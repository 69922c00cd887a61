use clap::Parser;

mod crypto;
pub mod genesis;
pub mod init;
pub mod observe;
pub mod snapshot;

#[derive(Parser, Debug, Clone)]
#[command(name = "shuttermint", about = "Shutter keyper state machine and DKG observer")]
pub struct Cli {
    #[command(subcommand)]
    pub subcommand: Subcommand,
}

#[derive(Clone, Debug, clap::Subcommand)]
pub enum Subcommand {
    Init(init::InitCmd),
    Genesis(genesis::GenesisCmd),
    Observe(observe::ObserveCmd),
    GenerateKeys(crypto::GenerateKeysCmd),
    ShowSnapshot(snapshot::ShowSnapshotCmd),
}

impl Cli {
    pub async fn execute(self) -> anyhow::Result<()> {
        match self.subcommand {
            Subcommand::Init(cmd) => cmd.execute()?,
            Subcommand::Genesis(cmd) => cmd.execute()?,
            Subcommand::Observe(cmd) => cmd.execute().await?,
            Subcommand::GenerateKeys(cmd) => cmd.execute()?,
            Subcommand::ShowSnapshot(cmd) => cmd.execute()?,
        }
        Ok(())
    }
}
