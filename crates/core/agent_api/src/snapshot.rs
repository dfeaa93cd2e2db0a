use crate::CapabilitySet;
use crate::DeviceId;
use crate::DeviceMetadata;
use std::fmt::Display;
use std::fmt::Formatter;

/// How a snapshot has been received
///
/// Only used for diagnostics: the last applied snapshot wins, whatever its source.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum SourceKind {
    Pull,
    Push,
}

impl Display for SourceKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceKind::Pull => f.write_str("pull"),
            SourceKind::Push => f.write_str("push"),
        }
    }
}

/// The capabilities and metadata of a device, as observed at some point in time
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Snapshot {
    pub device_id: DeviceId,
    pub capabilities: CapabilitySet,
    pub metadata: DeviceMetadata,
    pub source: SourceKind,
}
