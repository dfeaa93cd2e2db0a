use crate::errors::MqttError;
use rumqttc::QoS;

/// The topic of a received message
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct Topic {
    pub name: String,
}

impl Topic {
    /// Build a new topic, assuming the name is valid
    ///
    /// Received topics are checked by the broker.
    pub fn new_unchecked(name: &str) -> Topic {
        let name = String::from(name);
        Topic { name }
    }
}

/// An MQTT topic filter
///
/// Subscriptions are made with an "at most once" quality of service.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct TopicFilter {
    pub patterns: Vec<String>,
    pub qos: QoS,
}

impl TopicFilter {
    /// Check if the pattern is valid and build a new topic filter.
    pub fn new(pattern: &str) -> Result<TopicFilter, MqttError> {
        let pattern = String::from(pattern);
        if !rumqttc::valid_filter(&pattern) {
            return Err(MqttError::InvalidFilter { pattern });
        }
        Ok(TopicFilter {
            patterns: vec![pattern],
            qos: QoS::AtMostOnce,
        })
    }
}
