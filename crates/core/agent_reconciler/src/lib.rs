//! Keep the features loaded for each device in line with the capabilities the device advertises.
//!
//! - The [ReconciliationEngine] consumes the [Snapshot](agent_api::Snapshot)s of the devices,
//!   compares them with the last known state of each device
//!   and starts or stops features accordingly.
//! - The [FeatureLifecycleManager] runs the start and stop intents against the [FeatureHost]s,
//!   recording in the [DeviceState] only the confirmed outcomes.
//! - The [ReadinessGate] tells if a broker client can be used to receive pushed snapshots.
#![forbid(unsafe_code)]

mod engine;
mod gate;
mod lifecycle;
mod registry;
mod state;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;


pub use engine::*;
pub use gate::*;
pub use lifecycle::*;
pub use registry::*;
pub use state::*;
