use log::info;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Owns the shutdown channel and the join handles of the keyper tasks.
pub struct ShutdownManager {
    shutdown_tx: broadcast::Sender<()>,
    handles: Vec<(&'static str, JoinHandle<anyhow::Result<()>>)>,
}

/// Receiving side handed to every task.
pub struct Shutdown {
    pub(crate) shutdown_signal_rcv: broadcast::Receiver<()>,
}

impl Shutdown {
    /// Resolves once shutdown was requested or the manager is gone.
    pub async fn recv(&mut self) {
        let _ = self.shutdown_signal_rcv.recv().await;
    }
}

#[derive(Clone)]
pub struct Handle {
    shutdown_tx: broadcast::Sender<()>,
}

impl Handle {
    pub fn shutdown(&self) {
        if self.shutdown_tx.send(()).is_err() {
            log::debug!("Shutdown requested but no task is listening");
        }
    }
}

impl ShutdownManager {
    pub fn init() -> (ShutdownManager, Handle) {
        let (shutdown_tx, _) = broadcast::channel(1);
        let handle = Handle {
            shutdown_tx: shutdown_tx.clone(),
        };
        let manager = Self {
            shutdown_tx,
            handles: vec![],
        };
        (manager, handle)
    }

    pub fn subscribe(&self) -> Shutdown {
        Shutdown {
            shutdown_signal_rcv: self.shutdown_tx.subscribe(),
        }
    }

    pub fn add_handle(&mut self, name: &'static str, handle: JoinHandle<anyhow::Result<()>>) {
        self.handles.push((name, handle));
    }

    /// Signals every task and waits for them to finish.
    pub async fn stop(self) {
        info!("Starting keyper shutdown");
        let _ = self.shutdown_tx.send(());
        info!("Waiting for tasks to finish");
        for (name, handle) in self.handles {
            match handle.await {
                Ok(Ok(())) => info!("Task {name} finished successfully"),
                Ok(Err(err)) => log::error!("Task {name} finished with error: {err:?}"),
                Err(err) => log::error!("Task {name} panicked: {err}"),
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn test_stop_signals_all_tasks() {
        let (mut manager, _handle) = ShutdownManager::init();
        for name in ["first", "second"] {
            let mut shutdown = manager.subscribe();
            manager.add_handle(
                name,
                tokio::spawn(async move {
                    shutdown.recv().await;
                    Ok(())
                }),
            );
        }
        tokio::time::timeout(std::time::Duration::from_secs(5), manager.stop())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_handle_wakes_subscriber() {
        let (manager, handle) = ShutdownManager::init();
        let mut shutdown = manager.subscribe();
        handle.shutdown();
        tokio::time::timeout(std::time::Duration::from_secs(5), shutdown.recv())
            .await
            .unwrap();
    }
}
