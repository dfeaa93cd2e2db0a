use crate::Config;
use crate::Message;
use crate::MqttError;
use crate::SubscriptionClient;
use futures::channel::mpsc;
use rumqttc::AsyncClient;
use rumqttc::ConnectionError;
use rumqttc::Event;
use rumqttc::EventLoop;
use rumqttc::Incoming;
use rumqttc::Outgoing;
use rumqttc::Packet;
use std::fmt::Display;
use std::fmt::Formatter;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::error;
use tracing::info;
use tracing::warn;

/// The state of a connection to the broker, as observed by the client event loop
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ConnectionStatus {
    /// No connection acknowledged yet, or reconnecting
    Connecting,

    /// The broker acknowledged the connection
    Connected,

    /// Too many consecutive connection errors
    ///
    /// The event loop keeps retrying in the background
    /// and moves back to `Connected` on success.
    Failed,

    /// The connection has been closed and will not be re-established
    Disconnected,
}

impl Display for ConnectionStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let status = match self {
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Failed => "failed",
            ConnectionStatus::Disconnected => "disconnected",
        };
        f.write_str(status)
    }
}

/// A connection to some MQTT server
pub struct Connection {
    /// The channel of the input messages received by this connection.
    pub received: mpsc::UnboundedReceiver<Message>,

    /// Subscriptions management
    pub subscriptions: SubscriptionClient,

    /// Close the connection from the client side
    pub disconnect: DisconnectHandle,

    /// The connection status, updated by the event loop
    pub status: watch::Receiver<ConnectionStatus>,
}

impl Connection {
    /// Open a connection to the broker
    ///
    /// Return immediately: the connection is established in the background,
    /// its progress being reported on the `status` channel.
    /// Must be called from within a tokio runtime.
    pub fn open(config: &Config) -> Connection {
        let (received_sender, received_receiver) = mpsc::unbounded();
        let (status_sender, status_receiver) = watch::channel(ConnectionStatus::Connecting);

        let (mqtt_client, event_loop) =
            AsyncClient::new(config.mqtt_options(), config.queue_capacity);
        let subscriptions = SubscriptionClient::new(mqtt_client.clone());

        tokio::spawn(Connection::receiver_loop(
            event_loop,
            subscriptions.clone(),
            received_sender,
            status_sender,
            config.initial_connection_attempts,
        ));

        Connection {
            received: received_receiver,
            subscriptions,
            disconnect: DisconnectHandle {
                client: mqtt_client,
            },
            status: status_receiver,
        }
    }

    async fn receiver_loop(
        mut event_loop: EventLoop,
        subscriptions: SubscriptionClient,
        message_sender: mpsc::UnboundedSender<Message>,
        status: watch::Sender<ConnectionStatus>,
        max_failed_attempts: usize,
    ) {
        let mut failed_attempts = 0;
        loop {
            match event_loop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    info!(target: "MQTT", "connection established");
                    failed_attempts = 0;
                    status.send_replace(ConnectionStatus::Connected);
                    subscriptions.resubscribe();
                }

                Ok(Event::Incoming(Packet::Publish(msg))) => {
                    if message_sender.unbounded_send(msg.into()).is_err() {
                        // The client is no more interested by the received messages
                        break;
                    }
                }

                Ok(Event::Incoming(Incoming::Disconnect))
                | Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                    // The connection has been closed
                    break;
                }

                Err(err) => {
                    failed_attempts += 1;
                    warn!(target: "MQTT", "connection error (attempt {failed_attempts}): {err}");
                    let next_status =
                        Connection::status_on_error(failed_attempts, max_failed_attempts);
                    let modified = status.send_if_modified(|current| {
                        let modified = *current != next_status;
                        *current = next_status;
                        modified
                    });
                    if modified && next_status == ConnectionStatus::Failed {
                        error!(target: "MQTT", "fail to connect the broker after {failed_attempts} attempts");
                    }
                    Connection::pause_on_error(&err).await;
                }
                _ => (),
            }
        }

        status.send_replace(ConnectionStatus::Disconnected);
        // No more messages will be forwarded to the client
        message_sender.close_channel();
    }

    pub(crate) fn status_on_error(
        failed_attempts: usize,
        max_failed_attempts: usize,
    ) -> ConnectionStatus {
        if failed_attempts >= max_failed_attempts {
            ConnectionStatus::Failed
        } else {
            ConnectionStatus::Connecting
        }
    }

    async fn pause_on_error(err: &ConnectionError) {
        let delay = matches!(
            err,
            ConnectionError::Io(_)
                | ConnectionError::MqttState(_)
                | ConnectionError::ConnectionRefused(_)
        );

        if delay {
            sleep(Duration::from_secs(1)).await;
        }
    }
}

/// A handle to close a connection
#[derive(Clone)]
pub struct DisconnectHandle {
    client: AsyncClient,
}

impl DisconnectHandle {
    /// Ask the event loop to disconnect from the broker
    ///
    /// The event loop stops once the disconnect request has been sent,
    /// the connection status being then `Disconnected`.
    pub async fn disconnect(&self) -> Result<(), MqttError> {
        self.client.disconnect().await?;
        Ok(())
    }
}
