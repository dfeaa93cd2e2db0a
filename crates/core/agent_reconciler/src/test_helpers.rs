//! Fake feature hosts, registry and broker to test the reconciliation of devices.
use crate::BrokerClient;
use crate::BrokerState;
use crate::DeviceRegistry;
use crate::FeatureHost;
use crate::HostError;
use crate::Operation;
use crate::RegistrySyncError;
use agent_api::DeviceId;
use agent_api::DeviceMetadata;
use async_trait::async_trait;
use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;
use std::time::Duration;
use tokio::sync::watch;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A feature host that records the devices for which the feature is active
///
/// Failures can be injected per operation.
#[derive(Default)]
pub struct FakeFeatureHost {
    active: Mutex<HashSet<DeviceId>>,
    failures: Mutex<HashMap<Operation, String>>,
    calls: Mutex<Vec<(Operation, DeviceId)>>,
    delay: Option<Duration>,
}

impl FakeFeatureHost {
    pub fn new() -> Self {
        FakeFeatureHost::default()
    }

    /// Make each start and stop last for the given duration
    pub fn with_delay(self, delay: Duration) -> Self {
        FakeFeatureHost {
            delay: Some(delay),
            ..self
        }
    }

    /// Make all the forthcoming calls of this operation fail
    pub fn fail(&self, operation: Operation, reason: &str) {
        lock(&self.failures).insert(operation, reason.to_string());
    }

    /// Stop injecting failures
    pub fn recover(&self) {
        lock(&self.failures).clear();
    }

    pub fn is_active(&self, device: &DeviceId) -> bool {
        lock(&self.active).contains(device)
    }

    /// All the calls received so far, in order
    pub fn calls(&self) -> Vec<(Operation, DeviceId)> {
        lock(&self.calls).clone()
    }

    async fn call(&self, operation: Operation, device: &DeviceId) -> Result<(), HostError> {
        lock(&self.calls).push((operation, device.clone()));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(reason) = lock(&self.failures).get(&operation) {
            return Err(HostError::Failed(reason.clone()));
        }

        let mut active = lock(&self.active);
        match operation {
            Operation::Start if !active.insert(device.clone()) => Err(HostError::AlreadyActive),
            Operation::Stop if !active.remove(device) => Err(HostError::NotLoaded),
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl FeatureHost for FakeFeatureHost {
    async fn start(&self, device: &DeviceId) -> Result<(), HostError> {
        self.call(Operation::Start, device).await
    }

    async fn stop(&self, device: &DeviceId) -> Result<(), HostError> {
        self.call(Operation::Stop, device).await
    }
}

/// A registry that records all the upserts
#[derive(Default)]
pub struct FakeRegistry {
    entries: Mutex<HashMap<DeviceId, DeviceMetadata>>,
    upserts: AtomicUsize,
    failure: Mutex<Option<String>>,
}

impl FakeRegistry {
    pub fn new() -> Self {
        FakeRegistry::default()
    }

    /// Make the forthcoming upserts fail, or succeed again with `None`
    pub fn fail_with(&self, reason: Option<&str>) {
        *lock(&self.failure) = reason.map(str::to_string);
    }

    pub fn entry(&self, device: &DeviceId) -> Option<DeviceMetadata> {
        lock(&self.entries).get(device).cloned()
    }

    /// The number of upserts received so far, including the failed ones
    pub fn upserts(&self) -> usize {
        self.upserts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DeviceRegistry for FakeRegistry {
    async fn upsert(
        &self,
        device: &DeviceId,
        metadata: &DeviceMetadata,
    ) -> Result<(), RegistrySyncError> {
        self.upserts.fetch_add(1, Ordering::SeqCst);
        if let Some(reason) = lock(&self.failure).clone() {
            return Err(RegistrySyncError {
                device: device.clone(),
                reason,
            });
        }
        lock(&self.entries).insert(device.clone(), metadata.clone());
        Ok(())
    }
}

/// A broker client whose state is set by the test
pub struct FakeBroker {
    state: watch::Sender<BrokerState>,
    settled_calls: AtomicUsize,
}

impl FakeBroker {
    pub fn new(state: BrokerState) -> Self {
        FakeBroker {
            state: watch::Sender::new(state),
            settled_calls: AtomicUsize::new(0),
        }
    }

    pub fn set_state(&self, state: BrokerState) {
        self.state.send_replace(state);
    }

    /// The number of times the broker has been asked to wait for a settled state
    pub fn settled_calls(&self) -> usize {
        self.settled_calls.load(Ordering::SeqCst)
    }

    /// Wait till the broker has been asked `n` times to wait for a settled state
    pub async fn wait_for_settled_calls(&self, n: usize) {
        while self.settled_calls() < n {
            tokio::task::yield_now().await;
        }
    }
}

#[async_trait]
impl BrokerClient for FakeBroker {
    fn state(&self) -> BrokerState {
        *self.state.borrow()
    }

    async fn settled(&self) -> bool {
        self.settled_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.subscribe();
        let available = state
            .wait_for(|state| *state != BrokerState::Pending)
            .await
            .is_ok_and(|state| *state == BrokerState::Available);
        available
    }
}
