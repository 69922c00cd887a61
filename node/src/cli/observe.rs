use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::Mutex;

use crate::config::Configuration;
use crate::keyper::sender::run_sender;
use crate::keyper::shutdown::ShutdownManager;
use crate::keyper::{KeyperConfig, Observer, RpcMessageSender, ShuttermintClient};
use crate::logging::pretty_json;
use crate::storage::ObserverDb;

/// Follows the shuttermint chain and takes part in the DKG of the local keyper.
#[derive(Debug, Clone, Parser)]
pub struct ObserveCmd {
    #[arg(long, default_value = "default")]
    pub node_name: String,
    /// Overrides the configuration file in the home directory.
    #[clap(short, long)]
    pub config_file: Option<PathBuf>,
}

impl ObserveCmd {
    pub async fn execute(self) -> anyhow::Result<()> {
        let conf = match self.config_file {
            Some(path) => Configuration::try_load(path),
            None => Configuration::try_load_from_home_dir(&self.node_name),
        }
        .context("Error loading configuration file")?;
        let keyper = KeyperConfig::from_configuration(&conf)?;
        log::info!(
            "Starting observer for keyper {} with settings {}",
            keyper.address(),
            pretty_json(&conf.shuttermint)
        );

        let db = Arc::new(Mutex::new(ObserverDb::open(&conf.storage)?));
        let client = ShuttermintClient::new(conf.shuttermint.url.clone());
        let observer = Observer::new(client.clone(), db.clone(), keyper.clone());
        let sender = RpcMessageSender::new(client, keyper.signing_keypair.clone());

        let (mut manager, _handle) = ShutdownManager::init();
        let observer_shutdown = manager.subscribe();
        manager.add_handle("observer", tokio::spawn(observer.run(observer_shutdown)));
        let sender_shutdown = manager.subscribe();
        manager.add_handle(
            "sender",
            tokio::spawn(run_sender(db, sender, keyper.poll_interval, sender_shutdown)),
        );

        let mut stream_int = signal(SignalKind::interrupt())?;
        let mut stream_term = signal(SignalKind::terminate())?;
        tokio::select! {
            _ = stream_int.recv() => log::info!("Received SIGINT"),
            _ = stream_term.recv() => log::info!("Received SIGTERM"),
        }
        manager.stop().await;
        Ok(())
    }
}
