use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::future::FutureExt;
use futures::future::Shared;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::time::Duration;
use tracing::debug;
use tracing::warn;

/// The state of a broker client, as reported to a [ReadinessGate]
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum BrokerState {
    /// No broker is configured
    Disabled,

    /// The client is still trying to reach the broker
    Pending,

    /// The client can be used
    Available,

    /// The client failed to reach the broker
    Unavailable,
}

/// A broker client whose availability is checked by a [ReadinessGate]
#[async_trait]
pub trait BrokerClient: Send + Sync + 'static {
    /// The current state of the client
    fn state(&self) -> BrokerState;

    /// Wait for the client to leave the pending state
    ///
    /// Return `true` if the client is then available.
    async fn settled(&self) -> bool;
}

/// The state of a [ReadinessGate]
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum GateState {
    Pending,
    Available,
    Unavailable,
}

type ReadySignal = Shared<BoxFuture<'static, bool>>;

/// Tell if a broker client can be trusted to deliver pushed snapshots
///
/// All the callers of a gate share a single wait on the broker client:
/// the first caller that finds the client pending spawns this wait,
/// the others subscribe to its outcome.
/// Once resolved, the outcome is cached for the lifetime of the gate,
/// but a client found available is always trusted, even after a failure.
pub struct ReadinessGate {
    broker: Arc<dyn BrokerClient>,
    signal: Mutex<Option<ReadySignal>>,
}

impl ReadinessGate {
    pub fn new(broker: Arc<dyn BrokerClient>) -> Self {
        ReadinessGate {
            broker,
            signal: Mutex::new(None),
        }
    }

    /// Wait, at most for the given timeout, for the broker client to be available.
    ///
    /// - Return `false` immediately if no broker is configured.
    /// - Return `true` immediately if the client is currently available.
    /// - Return the cached outcome if the gate has already been resolved.
    /// - Otherwise wait for the shared signal.
    ///
    /// A timeout only cancels this call: the signal keeps going for the other callers.
    pub async fn await_ready(&self, timeout: Duration) -> bool {
        if self.broker.state() == BrokerState::Disabled {
            debug!("No broker is configured");
            return false;
        }

        if self.broker.state() == BrokerState::Available {
            return true;
        }

        if let Some(resolved) = self.resolved() {
            return resolved;
        }

        let signal = self.signal();
        match tokio::time::timeout(timeout, signal).await {
            Ok(ready) => ready,
            Err(_) => {
                warn!(
                    "The broker client is still not available after {}s",
                    timeout.as_secs_f32()
                );
                false
            }
        }
    }

    pub fn state(&self) -> GateState {
        if self.broker.state() == BrokerState::Available {
            return GateState::Available;
        }
        match self.resolved() {
            None => GateState::Pending,
            Some(true) => GateState::Available,
            Some(false) => GateState::Unavailable,
        }
    }

    /// The outcome of the shared signal, if already created and resolved
    fn resolved(&self) -> Option<bool> {
        let signal = self.signal.lock().unwrap_or_else(PoisonError::into_inner);
        signal.as_ref().and_then(|signal| signal.peek().copied())
    }

    /// The shared signal, created on first use
    fn signal(&self) -> ReadySignal {
        let mut signal = self.signal.lock().unwrap_or_else(PoisonError::into_inner);
        signal
            .get_or_insert_with(|| {
                let broker = self.broker.clone();
                // Run in a task of its own, so the wait is not cancelled with the first caller
                let wait = tokio::spawn(async move { broker.settled().await });
                async move { wait.await.unwrap_or(false) }.boxed().shared()
            })
            .clone()
    }
}
