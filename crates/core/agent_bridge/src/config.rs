use agent_api::DeviceId;
use agent_http_ext::PullConfig;
use camino::Utf8Path;
use camino::Utf8PathBuf;
use serde::Deserialize;
use serde::Deserializer;
use std::collections::HashSet;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

pub const DEFAULT_CONFIG_DIR: &str = "/etc/agent-bridge";
pub const CONFIG_FILE: &str = "agent-bridge.toml";

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("Fail to read {path}: {source}")]
    Read {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Fail to parse {path}: {source}")]
    Parse {
        path: Utf8PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid log level: {name:?}, supported levels are info, warn, error and debug")]
    InvalidLogLevel { name: String },

    #[error("A device id cannot be empty")]
    EmptyDeviceId,

    #[error("Device {0} is configured twice")]
    DuplicateDevice(DeviceId),

    #[error("Invalid name {name:?} for device {device}: must be a single MQTT topic level")]
    InvalidDeviceName { device: DeviceId, name: String },

    #[error("Invalid URL {url:?} for device {device}: {reason}")]
    InvalidDeviceUrl {
        device: DeviceId,
        url: String,
        reason: String,
    },
}

/// The content of `agent-bridge.toml`
///
/// All the sections are optional.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub log: LogConfig,
    pub mqtt: MqttConfig,
    pub http: HttpConfig,
    pub devices: Vec<DeviceConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
    pub client_id: Option<String>,
    #[serde(deserialize_with = "deserialize_duration")]
    pub availability_timeout: Duration,
    pub initial_connection_attempts: usize,
}

impl Default for MqttConfig {
    fn default() -> Self {
        MqttConfig {
            enabled: true,
            host: "localhost".to_string(),
            port: 1883,
            client_id: None,
            availability_timeout: Duration::from_secs(30),
            initial_connection_attempts: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    #[serde(deserialize_with = "deserialize_duration")]
    pub timeout: Duration,

    /// Zero to fetch the device info only once
    #[serde(deserialize_with = "deserialize_duration")]
    pub poll_interval: Duration,
}

impl Default for HttpConfig {
    fn default() -> Self {
        HttpConfig {
            timeout: Duration::from_secs(60),
            poll_interval: Duration::from_secs(300),
        }
    }
}

/// A device, reached over HTTP if an URL is given, over MQTT otherwise
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeviceConfig {
    pub id: DeviceId,
    pub name: String,
    pub url: Option<String>,
}

impl DeviceConfig {
    pub fn is_pulled(&self) -> bool {
        self.url.is_some()
    }
}

impl BridgeConfig {
    /// Load the configuration from `agent-bridge.toml` in the given directory
    ///
    /// A missing file is not an error: the default configuration is used then.
    pub fn load(config_dir: &Utf8Path) -> Result<Self, ConfigError> {
        let path = config_dir.join(CONFIG_FILE);
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                info!("No configuration file {path}: using the default configuration");
                return Ok(BridgeConfig::default());
            }
            Err(source) => return Err(ConfigError::Read { path, source }),
        };

        let config: BridgeConfig =
            toml::from_str(&content).map_err(|source| ConfigError::Parse { path, source })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.log.max_level()?;

        let mut ids = HashSet::new();
        for device in self.devices.iter() {
            device.validate()?;
            if !ids.insert(&device.id) {
                return Err(ConfigError::DuplicateDevice(device.id.clone()));
            }
        }
        Ok(())
    }

    pub fn mqtt_config(&self) -> mqtt_channel::Config {
        let config = mqtt_channel::Config::new(self.mqtt.host.clone(), self.mqtt.port)
            .with_initial_connection_attempts(self.mqtt.initial_connection_attempts);
        match &self.mqtt.client_id {
            Some(client_id) => config.with_session_name(client_id.clone()),
            None => config,
        }
    }

    pub fn pull_config(&self) -> PullConfig {
        PullConfig {
            timeout: self.http.timeout,
            poll_interval: Some(self.http.poll_interval).filter(|interval| !interval.is_zero()),
        }
    }
}

impl LogConfig {
    pub fn max_level(&self) -> Result<Option<tracing::Level>, ConfigError> {
        let Some(level) = &self.level else {
            return Ok(None);
        };
        tracing::Level::from_str(&level.to_uppercase())
            .map(Some)
            .map_err(|_| ConfigError::InvalidLogLevel {
                name: level.to_string(),
            })
    }
}

impl DeviceConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.id.as_str().trim().is_empty() {
            return Err(ConfigError::EmptyDeviceId);
        }

        if self.name.is_empty() || self.name.contains(['/', '+', '#']) {
            return Err(ConfigError::InvalidDeviceName {
                device: self.id.clone(),
                name: self.name.clone(),
            });
        }

        if let Some(url) = &self.url {
            let invalid_url = |reason: String| ConfigError::InvalidDeviceUrl {
                device: self.id.clone(),
                url: url.clone(),
                reason,
            };
            let parsed = url::Url::parse(url).map_err(|err| invalid_url(err.to_string()))?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(invalid_url(format!(
                    "unsupported scheme {}",
                    parsed.scheme()
                )));
            }
        }
        Ok(())
    }
}

fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let duration = String::deserialize(deserializer)?;
    humantime::parse_duration(&duration).map_err(serde::de::Error::custom)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;
    use test_case::test_case;

    #[test]
    fn parse_a_complete_configuration() {
        let toml_conf = r#"
            [log]
            level = "debug"

            [mqtt]
            host = "broker.local"
            port = 8883
            client_id = "agent-bridge"
            availability_timeout = "10s"

            [http]
            timeout = "1m"
            poll_interval = "0s"

            [[devices]]
            id = "01HF3Z"
            name = "laptop"
            url = "http://192.168.1.20:5115"

            [[devices]]
            id = "01HF40"
            name = "desktop"
        "#;

        let config: BridgeConfig = toml::from_str(toml_conf).unwrap();
        config.validate().unwrap();

        assert_eq!(config.log.max_level().unwrap(), Some(tracing::Level::DEBUG));
        assert_eq!(
            config.mqtt,
            MqttConfig {
                enabled: true,
                host: "broker.local".to_string(),
                port: 8883,
                client_id: Some("agent-bridge".to_string()),
                availability_timeout: Duration::from_secs(10),
                initial_connection_attempts: 3,
            }
        );
        assert_eq!(config.http.timeout, Duration::from_secs(60));
        assert_eq!(config.pull_config().poll_interval, None);
        assert_eq!(
            config.devices,
            vec![
                DeviceConfig {
                    id: DeviceId::new("01HF3Z"),
                    name: "laptop".to_string(),
                    url: Some("http://192.168.1.20:5115".to_string()),
                },
                DeviceConfig {
                    id: DeviceId::new("01HF40"),
                    name: "desktop".to_string(),
                    url: None,
                },
            ]
        );
        assert!(config.devices[0].is_pulled());
        assert!(!config.devices[1].is_pulled());
    }

    #[test]
    fn all_sections_are_optional() {
        let config: BridgeConfig = toml::from_str("").unwrap();

        assert_eq!(config, BridgeConfig::default());
        assert_eq!(config.mqtt.availability_timeout, Duration::from_secs(30));
        assert_eq!(
            config.pull_config(),
            PullConfig {
                timeout: Duration::from_secs(60),
                poll_interval: Some(Duration::from_secs(300)),
            }
        );
    }

    #[test]
    fn invalid_durations_are_rejected() {
        let toml_conf = r#"
            [http]
            timeout = "one minute"
        "#;

        assert!(toml::from_str::<BridgeConfig>(toml_conf).is_err());
    }

    #[test]
    fn the_mqtt_client_id_is_used_as_session_name() {
        let mut config = BridgeConfig::default();
        assert_eq!(config.mqtt_config().session_name, None);

        config.mqtt.client_id = Some("bridge".to_string());
        let mqtt_config = config.mqtt_config();
        assert_eq!(mqtt_config.session_name, Some("bridge".to_string()));
        assert_eq!(mqtt_config.host, "localhost");
        assert_eq!(mqtt_config.port, 1883);
    }

    #[test_case(r#"{ id = "", name = "laptop" }"#; "empty id")]
    #[test_case(r#"{ id = "laptop", name = "" }"#; "empty name")]
    #[test_case(r#"{ id = "laptop", name = "home/laptop" }"#; "multi-level name")]
    #[test_case(r#"{ id = "laptop", name = "lap+top" }"#; "wildcard name")]
    #[test_case(r#"{ id = "laptop", name = "laptop", url = "not an url" }"#; "invalid url")]
    #[test_case(r#"{ id = "laptop", name = "laptop", url = "ftp://laptop.local" }"#; "unsupported scheme")]
    fn invalid_devices_are_rejected(device: &str) {
        let toml_conf = format!("devices = [ {device} ]");
        let config: BridgeConfig = toml::from_str(&toml_conf).unwrap();

        assert!(config.validate().is_err());
    }

    #[test]
    fn device_ids_must_be_unique() {
        let toml_conf = r#"
            [[devices]]
            id = "laptop"
            name = "laptop"

            [[devices]]
            id = "laptop"
            name = "desktop"
        "#;
        let config: BridgeConfig = toml::from_str(toml_conf).unwrap();

        assert_matches!(
            config.validate(),
            Err(ConfigError::DuplicateDevice(id)) if id == DeviceId::new("laptop")
        );
    }

    #[test]
    fn invalid_log_level() {
        let log = LogConfig {
            level: Some("other".to_string()),
        };

        assert_eq!(
            log.max_level().unwrap_err().to_string(),
            "Invalid log level: \"other\", supported levels are info, warn, error and debug"
        );
    }

    #[test]
    fn load_the_configuration_file() -> anyhow::Result<()> {
        let (_dir, config_dir) = create_temp_config(
            r#"
            [[devices]]
            id = "laptop"
            name = "laptop"
            "#,
        )?;

        let config = BridgeConfig::load(&config_dir)?;

        assert_eq!(config.devices.len(), 1);
        Ok(())
    }

    #[test]
    fn a_missing_configuration_file_is_not_an_error() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let config_dir = Utf8PathBuf::try_from(dir.path().to_path_buf())?;

        assert_eq!(BridgeConfig::load(&config_dir)?, BridgeConfig::default());
        Ok(())
    }

    #[test]
    fn a_malformed_configuration_file_is_an_error() -> anyhow::Result<()> {
        let (_dir, config_dir) = create_temp_config("[[devices]]\nid = 42")?;

        assert_matches!(
            BridgeConfig::load(&config_dir),
            Err(ConfigError::Parse { .. })
        );
        Ok(())
    }

    // The temporary directory is returned, not to be deleted when this function ends.
    fn create_temp_config(content: &str) -> anyhow::Result<(TempDir, Utf8PathBuf)> {
        let temp_dir = TempDir::new()?;
        let config_dir = Utf8PathBuf::try_from(temp_dir.path().to_path_buf())?;
        std::fs::write(config_dir.join(CONFIG_FILE), content.as_bytes())?;
        Ok((temp_dir, config_dir))
    }
}
