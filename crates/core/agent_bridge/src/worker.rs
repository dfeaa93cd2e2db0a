use agent_api::DeviceId;
use agent_api::SnapshotSource;
use agent_reconciler::Reconciliation;
use agent_reconciler::ReconciliationEngine;
use futures::channel::mpsc;
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::debug;
use tracing::warn;

/// The task feeding the engine with the snapshots of a device
pub struct DeviceWorker {
    device: DeviceId,
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

impl DeviceWorker {
    pub fn spawn(
        device: DeviceId,
        engine: Arc<ReconciliationEngine>,
        source: Box<dyn SnapshotSource>,
        observer: Option<mpsc::UnboundedSender<Reconciliation>>,
    ) -> Self {
        let (shutdown, shutdown_receiver) = oneshot::channel();
        let handle = tokio::spawn(run(
            device.clone(),
            engine,
            source,
            observer,
            shutdown_receiver,
        ));
        DeviceWorker {
            device,
            shutdown,
            handle,
        }
    }

    /// Stop receiving snapshots and close the source
    ///
    /// A snapshot being processed is processed to completion.
    pub async fn stop(self) {
        let _ = self.shutdown.send(());
        if let Err(err) = self.handle.await {
            warn!("The worker of device {} failed: {err}", self.device);
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

async fn run(
    device: DeviceId,
    engine: Arc<ReconciliationEngine>,
    mut source: Box<dyn SnapshotSource>,
    observer: Option<mpsc::UnboundedSender<Reconciliation>>,
    mut shutdown: oneshot::Receiver<()>,
) {
    loop {
        let next = tokio::select! {
            _ = &mut shutdown => break,
            next = source.next_snapshot() => next,
        };

        match next {
            None => {
                debug!("No more {} snapshots for device {device}", source.kind());
                break;
            }
            Some(Err(err)) => warn!("{err}"),
            Some(Ok(snapshot)) => {
                let reconciliation = engine.on_snapshot(&snapshot).await;
                if let Some(observer) = &observer {
                    let _ = observer.unbounded_send(reconciliation);
                }
            }
        }
    }

    source.close().await;
}
