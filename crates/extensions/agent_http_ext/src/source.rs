use agent_api::DeviceId;
use agent_api::DeviceInfo;
use agent_api::Snapshot;
use agent_api::SnapshotSource;
use agent_api::SourceError;
use agent_api::SourceKind;
use async_trait::async_trait;
use std::time::Duration;
use tokio::time::Interval;
use tokio::time::MissedTickBehavior;
use tracing::debug;
use url::Url;

/// How an agent HTTP API is polled
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct PullConfig {
    /// Maximum duration of a fetch
    pub timeout: Duration,

    /// Delay between two fetches; `None` to fetch only once
    pub poll_interval: Option<Duration>,
}

impl Default for PullConfig {
    fn default() -> Self {
        PullConfig {
            timeout: Duration::from_secs(60),
            poll_interval: None,
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum PullSetupError {
    #[error("Invalid agent URL {url:?}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("Fail to build the HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Fetch the snapshots of a device from its HTTP API
///
/// The first snapshot is fetched as soon as requested,
/// the following ones at the configured poll interval if any.
pub struct HttpPullSource {
    device: DeviceId,
    info_url: Url,
    client: reqwest::Client,
    timeout: Duration,
    poll_interval: Option<Duration>,
    ticks: Option<Interval>,
    fetched: bool,
    closed: bool,
}

impl HttpPullSource {
    pub fn new(device: DeviceId, url: &str, config: PullConfig) -> Result<Self, PullSetupError> {
        let info_url = info_url(url)?;
        let client = reqwest::Client::builder().build()?;
        Ok(HttpPullSource {
            device,
            info_url,
            client,
            timeout: config.timeout,
            poll_interval: config.poll_interval.filter(|interval| !interval.is_zero()),
            ticks: None,
            fetched: false,
            closed: false,
        })
    }

    pub fn info_url(&self) -> &Url {
        &self.info_url
    }

    /// Fetch the current snapshot of the device, giving up after the given timeout
    pub async fn fetch(&self, timeout: Duration) -> Result<Snapshot, SourceError> {
        debug!("GET {} for device {}", self.info_url, self.device);
        let response = self
            .client
            .get(self.info_url.clone())
            .timeout(timeout)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|err| SourceError::unavailable(&self.device, err))?;

        let body = response
            .bytes()
            .await
            .map_err(|err| SourceError::unavailable(&self.device, err))?;

        let info =
            DeviceInfo::from_json(&body).map_err(|err| SourceError::malformed(&self.device, err))?;
        Ok(info.into_snapshot(self.device.clone(), SourceKind::Pull))
    }
}

#[async_trait]
impl SnapshotSource for HttpPullSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Pull
    }

    async fn next_snapshot(&mut self) -> Option<Result<Snapshot, SourceError>> {
        if self.closed {
            return None;
        }

        if let Some(period) = self.poll_interval {
            // The first tick of an interval completes immediately
            let ticks = self.ticks.get_or_insert_with(|| {
                let mut ticks = tokio::time::interval(period);
                ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
                ticks
            });
            ticks.tick().await;
        } else if self.fetched {
            return None;
        }

        self.fetched = true;
        Some(self.fetch(self.timeout).await)
    }

    async fn close(&mut self) {
        self.closed = true;
        self.ticks = None;
    }
}

/// The URL of the device info, given the base URL of an agent
pub fn info_url(url: &str) -> Result<Url, PullSetupError> {
    let info_url = format!("{}/info", url.trim_end_matches('/'));
    Url::parse(&info_url).map_err(|source| PullSetupError::InvalidUrl {
        url: url.to_string(),
        source,
    })
}
