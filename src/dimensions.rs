//! Content dimension presets and the combinations a node is indexed under.
//!
//! Every axis (e.g. `language`) lists its presets in configured order. A node
//! is materialized once per combination in the cartesian product of all axes
//! that have at least one preset.

use crate::error::{ConfigError, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashSet};

/// Mapping from axis name to the values of the preset chosen for that axis.
pub type DimensionCombination = BTreeMap<String, Vec<String>>;

/// One admissible value-set of an axis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DimensionPreset {
    pub identifier: String,
    /// Values in fallback order; the first one is the primary value.
    #[serde(default)]
    pub values: Vec<String>,
}

/// A named content dimension and its ordered presets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DimensionAxis {
    pub name: String,
    #[serde(default)]
    pub default_preset: Option<String>,
    #[serde(default)]
    pub presets: Vec<DimensionPreset>,
}

impl DimensionAxis {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            default_preset: None,
            presets: Vec::new(),
        }
    }

    /// Append a preset whose identifier is also its single value.
    pub fn with_preset(mut self, identifier: impl Into<String>) -> Self {
        let identifier = identifier.into();
        self.presets.push(DimensionPreset {
            values: vec![identifier.clone()],
            identifier,
        });
        self
    }
}

/// Supplies every configured dimension axis.
pub trait DimensionPresetSource: Send + Sync {
    fn all_presets(&self) -> Vec<DimensionAxis>;
}

/// Presets read from the `[[dimensions]]` configuration tables.
#[derive(Debug, Clone, Default)]
pub struct ConfiguredPresetSource {
    axes: Vec<DimensionAxis>,
}

impl ConfiguredPresetSource {
    /// Validate and wrap configured axes.
    ///
    /// Axis names must be unique, and preset identifiers must be unique within
    /// their axis, otherwise two combinations would collapse into one.
    pub fn new(axes: Vec<DimensionAxis>) -> Result<Self> {
        let mut axis_names = HashSet::new();
        for axis in &axes {
            if !axis_names.insert(axis.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "dimension {:?} is configured more than once",
                    axis.name
                ))
                .into());
            }

            let mut identifiers = HashSet::new();
            for preset in &axis.presets {
                if !identifiers.insert(preset.identifier.as_str()) {
                    return Err(ConfigError::Invalid(format!(
                        "dimension {:?} has duplicate preset {:?}",
                        axis.name, preset.identifier
                    ))
                    .into());
                }
            }

            if let Some(default) = &axis.default_preset {
                if !identifiers.contains(default.as_str()) {
                    return Err(ConfigError::Invalid(format!(
                        "dimension {:?} defaults to unknown preset {:?}",
                        axis.name, default
                    ))
                    .into());
                }
            }
        }

        Ok(Self { axes })
    }
}

impl DimensionPresetSource for ConfiguredPresetSource {
    fn all_presets(&self) -> Vec<DimensionAxis> {
        self.axes.clone()
    }
}

/// Enumerate every combination of one preset per axis.
///
/// Axes without presets do not take part in the product. Returns an empty list
/// when no axis has presets, meaning the node has a single dimension-less
/// variant. Output `i` picks preset `(i / stride) % len` on each axis, where
/// `stride` is the product of the sizes of the axes before it, so the first
/// axis varies fastest.
pub fn calculate_dimension_combinations(axes: &[DimensionAxis]) -> Vec<DimensionCombination> {
    let populated: Vec<&DimensionAxis> = axes
        .iter()
        .filter(|axis| !axis.presets.is_empty())
        .collect();
    if populated.is_empty() {
        return Vec::new();
    }

    let total: usize = populated.iter().map(|axis| axis.presets.len()).product();
    let mut combinations = Vec::with_capacity(total);

    for index in 0..total {
        let mut combination = DimensionCombination::new();
        let mut stride = 1;
        for axis in &populated {
            let size = axis.presets.len();
            let preset = &axis.presets[(index / stride) % size];
            combination.insert(axis.name.clone(), preset.values.clone());
            stride *= size;
        }
        combinations.push(combination);
    }

    combinations
}

/// Stable fingerprint of a combination, used to group index entries that
/// belong to the same dimension variant.
pub fn dimensions_hash(combination: &DimensionCombination) -> String {
    let mut hasher = Sha256::new();
    for (axis, values) in combination {
        hasher.update(axis.as_bytes());
        hasher.update([0x1f]);
        for value in values {
            hasher.update(value.as_bytes());
            hasher.update([0x1e]);
        }
        hasher.update([0x1d]);
    }
    hex::encode(&hasher.finalize()[..16])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn axis(name: &str, presets: &[&str]) -> DimensionAxis {
        presets
            .iter()
            .fold(DimensionAxis::new(name), |axis, preset| axis.with_preset(*preset))
    }

    #[test]
    fn test_product_of_uneven_axes_is_complete() {
        let axes = vec![
            axis("language", &["en", "de"]),
            axis("region", &["eu", "us", "apac"]),
        ];

        let combinations = calculate_dimension_combinations(&axes);
        assert_eq!(combinations.len(), 6);

        for language in ["en", "de"] {
            for region in ["eu", "us", "apac"] {
                let matching = combinations
                    .iter()
                    .filter(|combination| {
                        combination["language"] == vec![language.to_string()]
                            && combination["region"] == vec![region.to_string()]
                    })
                    .count();
                assert_eq!(matching, 1, "({language}, {region}) must appear exactly once");
            }
        }
    }

    #[test]
    fn test_three_axes_yield_distinct_combinations() {
        let axes = vec![
            axis("language", &["en", "de"]),
            axis("region", &["eu", "us"]),
            axis("channel", &["web", "app", "print"]),
        ];

        let combinations = calculate_dimension_combinations(&axes);
        assert_eq!(combinations.len(), 12);

        let distinct: HashSet<_> = combinations.iter().map(dimensions_hash).collect();
        assert_eq!(distinct.len(), 12);
    }

    #[test]
    fn test_first_axis_varies_fastest() {
        let axes = vec![axis("language", &["en", "de"]), axis("region", &["eu", "us"])];
        let combinations = calculate_dimension_combinations(&axes);

        let languages: Vec<&str> = combinations
            .iter()
            .map(|combination| combination["language"][0].as_str())
            .collect();
        assert_eq!(languages, ["en", "de", "en", "de"]);

        let regions: Vec<&str> = combinations
            .iter()
            .map(|combination| combination["region"][0].as_str())
            .collect();
        assert_eq!(regions, ["eu", "eu", "us", "us"]);
    }

    #[test]
    fn test_axes_without_presets_are_excluded() {
        let axes = vec![axis("language", &["en", "de"]), axis("region", &[])];
        let combinations = calculate_dimension_combinations(&axes);

        assert_eq!(combinations.len(), 2);
        assert!(combinations.iter().all(|combination| !combination.contains_key("region")));
    }

    #[test]
    fn test_no_presets_means_no_dimensionality() {
        assert!(calculate_dimension_combinations(&[]).is_empty());
        assert!(calculate_dimension_combinations(&[axis("language", &[])]).is_empty());
    }

    #[test]
    fn test_preset_values_keep_fallback_order() {
        let axes = vec![DimensionAxis {
            name: "language".into(),
            default_preset: Some("de_CH".into()),
            presets: vec![DimensionPreset {
                identifier: "de_CH".into(),
                values: vec!["de_CH".into(), "de".into()],
            }],
        }];

        let combinations = calculate_dimension_combinations(&axes);
        assert_eq!(combinations[0]["language"], vec!["de_CH", "de"]);
    }

    #[test]
    fn test_hash_depends_on_values() {
        let mut first = DimensionCombination::new();
        first.insert("language".into(), vec!["en".into()]);
        let mut second = DimensionCombination::new();
        second.insert("language".into(), vec!["de".into()]);

        assert_eq!(dimensions_hash(&first), dimensions_hash(&first.clone()));
        assert_ne!(dimensions_hash(&first), dimensions_hash(&second));
        assert_ne!(dimensions_hash(&first), dimensions_hash(&DimensionCombination::new()));
        assert_eq!(dimensions_hash(&first).len(), 32);
    }

    #[test]
    fn test_configured_source_rejects_duplicates() {
        let duplicate_axis = ConfiguredPresetSource::new(vec![
            axis("language", &["en"]),
            axis("language", &["de"]),
        ]);
        assert!(duplicate_axis.is_err());

        let duplicate_preset = ConfiguredPresetSource::new(vec![axis("language", &["en", "en"])]);
        assert!(duplicate_preset.is_err());

        let mut unknown_default = axis("language", &["en"]);
        unknown_default.default_preset = Some("fr".into());
        assert!(ConfiguredPresetSource::new(vec![unknown_default]).is_err());

        let source = ConfiguredPresetSource::new(vec![axis("language", &["en", "de"])])
            .expect("valid presets");
        assert_eq!(source.all_presets().len(), 1);
    }
}
