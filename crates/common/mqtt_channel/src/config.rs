/// Configuration of an MQTT connection
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Config {
    /// MQTT host to connect to
    ///
    /// Default: "localhost"
    pub host: String,

    /// MQTT port to connect to. Usually it's either 1883 for insecure MQTT and
    /// 8883 for secure MQTT.
    ///
    /// Default: 1883
    pub port: u16,

    /// The session name to be use on connect
    ///
    /// If no session name is provided, a random one will be created on connect,
    /// and the session will be clean on connect.
    /// A named session is persistent.
    ///
    /// Default: None
    pub session_name: Option<String>,

    /// Capacity of the internal message queues
    ///
    /// Default: `1024`.
    pub queue_capacity: usize,

    /// Maximum size for a message payload
    ///
    /// Default: `1024 * 1024`.
    pub max_packet_size: usize,

    /// Number of consecutive connection errors after which
    /// the connection is reported as failed.
    ///
    /// The client keeps trying to reconnect in the background.
    ///
    /// Default: `3`.
    pub initial_connection_attempts: usize,
}

/// By default a client connects the local MQTT broker.
impl Default for Config {
    fn default() -> Self {
        Config {
            host: String::from("localhost"),
            port: 1883,
            session_name: None,
            queue_capacity: 1024,
            max_packet_size: 1024 * 1024,
            initial_connection_attempts: 3,
        }
    }
}

impl Config {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Config::default()
        }
    }

    /// Set the session name
    pub fn with_session_name(self, name: impl Into<String>) -> Self {
        Self {
            session_name: Some(name.into()),
            ..self
        }
    }

    /// Set the number of connection errors tolerated before the connection is reported as failed
    pub fn with_initial_connection_attempts(self, attempts: usize) -> Self {
        Self {
            initial_connection_attempts: attempts.max(1),
            ..self
        }
    }

    /// Wrap this config into an internal set of options for `rumqttc`.
    pub(crate) fn mqtt_options(&self) -> rumqttc::MqttOptions {
        let id = match &self.session_name {
            None => std::iter::repeat_with(fastrand::lowercase)
                .take(10)
                .collect(),
            Some(name) => name.clone(),
        };

        let mut mqtt_options = rumqttc::MqttOptions::new(id, &self.host, self.port);

        // There is no point to have a session with a random name that will not be reused.
        mqtt_options.set_clean_session(self.session_name.is_none());

        mqtt_options.set_max_packet_size(self.max_packet_size, self.max_packet_size);

        mqtt_options
    }
}
