use clap::Parser;
use easy_repl::{command, CommandStatus, Repl};

use shuttermint::app::ShutterApp;

#[derive(Parser, Debug, Clone)]
#[command()]
pub(crate) struct Args {
    #[clap(short, long)]
    pub(crate) snapshot_path: String,
}

fn main() -> anyhow::Result<()> {
    let snapshot_path = Args::parse().snapshot_path;
    let bytes = std::fs::read(&snapshot_path)?;
    let app = ShutterApp::from_snapshot_bytes(&bytes)?;

    println!(
        "Loaded chain {} at height {}",
        app.chain_id(),
        app.last_block_height()
    );

    let app = &app;
    let mut repl = Repl::builder()
        .add(
            "configs",
            command! {
                "List all keyper configs",
                () => || {
                    for config in app.configs().iter() {
                        println!(
                            "#{} activation={} threshold={} started={} validators_updated={}",
                            config.keyper_config_index,
                            config.activation_block_number,
                            config.threshold,
                            config.started,
                            config.validators_updated
                        );
                        for keyper in &config.keypers {
                            println!("    {keyper}");
                        }
                    }
                    Ok(CommandStatus::Done)
                }
            },
        )
        .add(
            "eon",
            command! {
                "Show the eon counter",
                () => || {
                    println!("Eon counter: {}", app.eon_counter());
                    println!("Current keyper config: {}", app.configs().last().keyper_config_index);
                    Ok(CommandStatus::Done)
                }
            },
        )
        .add(
            "dkg",
            command! {
                "Show the DKG of an eon",
                (eon: u64) => |eon| {
                    match app.dkg(eon) {
                        Some(dkg) => {
                            println!("Eon {} run by keyper config {}", dkg.eon, dkg.config.keyper_config_index);
                            match dkg.outcome() {
                                Some(true) => println!("Outcome: success"),
                                Some(false) => println!("Outcome: failure"),
                                None => println!("Outcome: pending"),
                            }
                        }
                        None => println!("No DKG for eon {eon}"),
                    }
                    Ok(CommandStatus::Done)
                }
            },
        )
        .add(
            "validators",
            command! {
                "List the validator powers",
                () => || {
                    for (key, power) in app.validators().iter() {
                        println!("{key} power={power}");
                    }
                    println!("Total power: {}", app.validators().total_power());
                    Ok(CommandStatus::Done)
                }
            },
        )
        .add(
            "identities",
            command! {
                "List checked in keypers",
                () => || {
                    for (keyper, validator_key) in app.identities() {
                        let checked_in = app.encryption_key(keyper).is_some();
                        println!(
                            "{keyper} {validator_key} encryption_key={} blocks_seen={}",
                            checked_in,
                            app.blocks_seen(keyper)
                        );
                    }
                    Ok(CommandStatus::Done)
                }
            },
        )
        .build()?;

    repl.run()?;
    Ok(())
}
