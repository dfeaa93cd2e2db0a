use agent_reconciler::BrokerClient;
use agent_reconciler::BrokerState;
use async_trait::async_trait;
use mqtt_channel::ConnectionStatus;
use tokio::sync::watch;

/// The broker client as seen by a [ReadinessGate](agent_reconciler::ReadinessGate)
///
/// Observe the status of an MQTT connection, if any.
#[derive(Clone)]
pub struct MqttBroker {
    status: Option<watch::Receiver<ConnectionStatus>>,
}

impl MqttBroker {
    pub fn new(status: watch::Receiver<ConnectionStatus>) -> Self {
        MqttBroker {
            status: Some(status),
        }
    }

    /// No MQTT broker is configured
    pub fn disabled() -> Self {
        MqttBroker { status: None }
    }
}

pub fn broker_state(status: ConnectionStatus) -> BrokerState {
    match status {
        ConnectionStatus::Connecting => BrokerState::Pending,
        ConnectionStatus::Connected => BrokerState::Available,
        ConnectionStatus::Failed | ConnectionStatus::Disconnected => BrokerState::Unavailable,
    }
}

#[async_trait]
impl BrokerClient for MqttBroker {
    fn state(&self) -> BrokerState {
        match &self.status {
            None => BrokerState::Disabled,
            Some(status) => broker_state(*status.borrow()),
        }
    }

    async fn settled(&self) -> bool {
        let Some(status) = &self.status else {
            return false;
        };
        let mut status = status.clone();
        let available = status
            .wait_for(|status| *status != ConnectionStatus::Connecting)
            .await
            .is_ok_and(|status| *status == ConnectionStatus::Connected);
        available
    }
}
