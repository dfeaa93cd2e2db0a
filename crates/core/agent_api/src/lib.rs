//! Data exchanged with the agent devices: capability sets, device metadata and snapshots.
//!
//! A device advertises its capabilities with a JSON document,
//! either served by its HTTP API (`GET /info`) or published on the MQTT topic of the device:
//!
//! ```
//! use agent_api::{DeviceId, DeviceInfo, Feature, SourceKind};
//!
//! let payload = br#"{
//!     "device": {"name": "laptop", "manufacturer": "LAB02", "model": "HASS.Agent", "sw_version": "2.0.1"},
//!     "apis": {"notifications": true, "media_player": false}
//! }"#;
//!
//! let snapshot = DeviceInfo::from_json(payload)
//!     .unwrap()
//!     .into_snapshot(DeviceId::new("laptop"), SourceKind::Push);
//!
//! assert!(snapshot.capabilities.advertises(Feature::Notifications));
//! assert!(!snapshot.capabilities.advertises(Feature::MediaPlayer));
//! ```
#![forbid(unsafe_code)]

mod capabilities;
mod device;
mod errors;
mod payload;
mod snapshot;
mod source;
pub mod topics;

pub use capabilities::*;
pub use device::*;
pub use errors::*;
pub use payload::*;
pub use snapshot::*;
pub use source::*;
