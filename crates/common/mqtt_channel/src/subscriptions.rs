use crate::MqttError;
use crate::TopicFilter;
use rumqttc::AsyncClient;
use rumqttc::QoS;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;
use tracing::debug;
use tracing::warn;

/// A handle to add and remove subscriptions on a live connection.
///
/// The active subscriptions are recorded so they can be re-issued
/// each time the connection to the broker is re-established.
#[derive(Clone)]
pub struct SubscriptionClient {
    client: AsyncClient,
    active: Arc<Mutex<BTreeMap<String, QoS>>>,
}

impl SubscriptionClient {
    pub(crate) fn new(client: AsyncClient) -> Self {
        SubscriptionClient {
            client,
            active: Arc::new(Mutex::new(BTreeMap::new())),
        }
    }

    /// Subscribe to all the patterns of the filter
    pub async fn subscribe(&self, filter: &TopicFilter) -> Result<(), MqttError> {
        for pattern in &filter.patterns {
            self.record(pattern, Some(filter.qos));
            debug!(target: "MQTT", "subscribe to {pattern}");
            self.client.subscribe(pattern, filter.qos).await?;
        }
        Ok(())
    }

    /// Unsubscribe from all the patterns of the filter
    ///
    /// Patterns that are not currently subscribed are silently ignored.
    pub async fn unsubscribe(&self, filter: &TopicFilter) -> Result<(), MqttError> {
        for pattern in &filter.patterns {
            if self.record(pattern, None) {
                debug!(target: "MQTT", "unsubscribe from {pattern}");
                self.client.unsubscribe(pattern).await?;
            }
        }
        Ok(())
    }

    /// The patterns currently subscribed
    pub fn active_patterns(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }

    /// Re-issue all the recorded subscriptions.
    ///
    /// Called from the event loop: must not await on the request queue.
    pub(crate) fn resubscribe(&self) {
        let active = self.lock().clone();
        for (pattern, qos) in active {
            if let Err(err) = self.client.try_subscribe(&pattern, qos) {
                warn!(target: "MQTT", "fail to resubscribe to {pattern}: {err}");
            }
        }
    }

    /// Record a subscription (`Some(qos)`) or its removal (`None`).
    ///
    /// Return `true` if the pattern was subscribed before the update.
    fn record(&self, pattern: &str, qos: Option<QoS>) -> bool {
        let mut active = self.lock();
        match qos {
            Some(qos) => active.insert(pattern.to_string(), qos).is_some(),
            None => active.remove(pattern).is_some(),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, QoS>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
