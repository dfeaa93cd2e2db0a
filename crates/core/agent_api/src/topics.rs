//! MQTT topics used by the agents

use crate::DeviceId;

/// The root of the topics on which the agents publish their device info
pub const DEVICES_TOPIC_ROOT: &str = "hass.agent/devices";

/// The topic on which the device with the given name publishes its device info
pub fn device_topic(device_name: &str) -> String {
    format!("{DEVICES_TOPIC_ROOT}/{device_name}")
}

/// The key under which the subscription of a device is registered
pub fn subscription_key(device_id: &DeviceId) -> String {
    format!("{device_id}-apis")
}

/// Extract the device name from a device topic
pub fn device_name_of(topic: &str) -> Option<&str> {
    topic
        .strip_prefix(DEVICES_TOPIC_ROOT)
        .and_then(|suffix| suffix.strip_prefix('/'))
        .filter(|name| !name.is_empty() && !name.contains('/'))
}
