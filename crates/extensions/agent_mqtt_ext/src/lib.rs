//! Push transport: receive the device info published by the agents on an MQTT broker.
//!
//! - An [MqttPushHub] owns the connection to the broker
//!   and routes the device info to the [MqttPushSource] of each subscribed device.
//! - The [MqttBroker] reports the status of that connection to a readiness gate.
#![forbid(unsafe_code)]

mod broker;
mod push;

pub use broker::*;
pub use push::*;
