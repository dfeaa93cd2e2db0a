use serde::Deserialize;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Display;
use std::fmt::Formatter;
use std::str::FromStr;

/// The optional features a device can advertise and that can be loaded for that device
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub enum Feature {
    Notifications,
    MediaPlayer,
}

impl Feature {
    /// All the known features, in the order they are reconciled
    pub const ALL: [Feature; 2] = [Feature::Notifications, Feature::MediaPlayer];

    /// The name used for this feature in device payloads
    pub fn name(&self) -> &'static str {
        match self {
            Feature::Notifications => "notifications",
            Feature::MediaPlayer => "media_player",
        }
    }
}

impl Display for Feature {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(thiserror::Error, Debug, Clone, Eq, PartialEq)]
#[error("Unknown feature: {0:?}")]
pub struct UnknownFeature(pub String);

impl FromStr for Feature {
    type Err = UnknownFeature;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        Feature::ALL
            .into_iter()
            .find(|feature| feature.name() == name)
            .ok_or_else(|| UnknownFeature(name.to_string()))
    }
}

/// The capabilities advertised by a device: feature name -> advertised
///
/// Names unknown to this version are kept,
/// so two sets are equal only if they advertise exactly the same things.
#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CapabilitySet {
    apis: BTreeMap<String, bool>,
}

impl CapabilitySet {
    pub fn new() -> Self {
        CapabilitySet::default()
    }

    /// Add or update an entry
    pub fn with(mut self, name: impl Into<String>, advertised: bool) -> Self {
        self.apis.insert(name.into(), advertised);
        self
    }

    /// Add or update the entry of a known feature
    pub fn with_feature(self, feature: Feature, advertised: bool) -> Self {
        self.with(feature.name(), advertised)
    }

    /// Tell if the feature is advertised; a missing entry means not advertised.
    pub fn advertises(&self, feature: Feature) -> bool {
        self.apis.get(feature.name()).copied().unwrap_or(false)
    }

    /// The names of this set that are not known features
    pub fn unknown_names(&self) -> impl Iterator<Item = &str> {
        self.apis
            .keys()
            .map(String::as_str)
            .filter(|name| name.parse::<Feature>().is_err())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, bool)> {
        self.apis.iter().map(|(name, advertised)| (name.as_str(), *advertised))
    }

    pub fn is_empty(&self) -> bool {
        self.apis.is_empty()
    }
}

impl<const N: usize> From<[(&str, bool); N]> for CapabilitySet {
    fn from(entries: [(&str, bool); N]) -> Self {
        entries
            .into_iter()
            .fold(CapabilitySet::new(), |set, (name, advertised)| {
                set.with(name, advertised)
            })
    }
}

impl FromIterator<(Feature, bool)> for CapabilitySet {
    fn from_iter<T: IntoIterator<Item = (Feature, bool)>>(iter: T) -> Self {
        iter.into_iter()
            .fold(CapabilitySet::new(), |set, (feature, advertised)| {
                set.with_feature(feature, advertised)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("notifications", Some(Feature::Notifications))]
    #[test_case("media_player", Some(Feature::MediaPlayer))]
    #[test_case("Notifications", None; "names are case sensitive")]
    #[test_case("futuristic_feature", None)]
    fn parse_feature_name(name: &str, expected: Option<Feature>) {
        assert_eq!(name.parse::<Feature>().ok(), expected);
    }

    #[test]
    fn missing_entries_are_not_advertised() {
        let capabilities = CapabilitySet::from([("notifications", true)]);

        assert!(capabilities.advertises(Feature::Notifications));
        assert!(!capabilities.advertises(Feature::MediaPlayer));
    }

    #[test]
    fn capability_sets_are_compared_as_a_whole() {
        let explicit = CapabilitySet::from([("notifications", true), ("media_player", false)]);
        let implicit = CapabilitySet::from([("notifications", true)]);

        // Both advertise the same features, but they are not the same snapshot
        assert_eq!(
            Feature::ALL.map(|f| explicit.advertises(f)),
            Feature::ALL.map(|f| implicit.advertises(f))
        );
        assert_ne!(explicit, implicit);
    }

    #[test]
    fn unknown_names_are_kept_apart() {
        let capabilities = CapabilitySet::from([
            ("notifications", true),
            ("futuristic_feature", true),
            ("media_player", true),
        ]);

        assert_eq!(
            capabilities.unknown_names().collect::<Vec<_>>(),
            vec!["futuristic_feature"]
        );
    }

    #[test]
    fn build_from_known_features() {
        let capabilities: CapabilitySet = [(Feature::MediaPlayer, true)].into_iter().collect();
        assert_eq!(capabilities, CapabilitySet::from([("media_player", true)]));
    }
}
