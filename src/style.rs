//! Style configuration and prepared binary assets.
//!
//! Each category of a [`StyleConfiguration`] is an exhaustive sum type with
//! an explicit `Default` variant, so the readiness validator can match on it
//! without nullable-field guesswork.

use serde::{Deserialize, Serialize};

/// Background selection for a generation job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum BackgroundChoice {
    /// Use the provider's stock background.
    #[default]
    Default,
    /// One of the predefined backgrounds shipped with the style catalog.
    Predefined { id: String },
    /// A caller-supplied background; requires a prepared background asset.
    Custom { element_id: String },
}

/// Where branding (a logo) should be applied in the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BrandingPosition {
    Background,
    Elements,
    Clothing,
}

/// Branding selection for a generation job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum BrandingChoice {
    /// No branding in the output.
    #[default]
    Default,
    /// Include the logo at the given position.
    Include { position: BrandingPosition },
}

/// Clothing selection for a generation job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ClothingChoice {
    /// Keep the clothing from the reference photo.
    #[default]
    Default,
    /// Swap in a catalog clothing item.
    Selected { id: String },
}

/// Pose selection for a generation job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum PoseChoice {
    /// Keep the pose from the reference photo.
    #[default]
    Default,
    /// A catalog pose.
    Selected { id: String },
}

/// Per-category style settings for one generation job.
///
/// A category left at its default imposes no asset requirement; the value
/// types of the others determine what must be prepared before the provider
/// call (see [`crate::validator::required_asset_errors`]).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StyleConfiguration {
    pub background: BackgroundChoice,
    pub branding: BrandingChoice,
    pub clothing: ClothingChoice,
    pub pose: PoseChoice,
}

/// What a prepared asset is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AssetKind {
    Background,
    ClothingOverlay,
}

/// Flags attached to a prepared asset by the upstream preparation step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AssetMetadata {
    /// The background was composited with the logo before upload.
    pub pre_branded_with_logo: bool,
}

/// A binary asset produced upstream, scoped to one job invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreparedAsset {
    pub element_id: String,
    pub kind: AssetKind,
    pub payload: Vec<u8>,
    #[serde(default)]
    pub metadata: AssetMetadata,
}

impl PreparedAsset {
    /// A prepared background asset.
    pub fn background(element_id: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            element_id: element_id.into(),
            kind: AssetKind::Background,
            payload,
            metadata: AssetMetadata::default(),
        }
    }

    /// A prepared clothing-overlay asset.
    pub fn clothing_overlay(element_id: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            element_id: element_id.into(),
            kind: AssetKind::ClothingOverlay,
            payload,
            metadata: AssetMetadata::default(),
        }
    }

    /// Set the pre-branded flag (builder pattern).
    pub fn pre_branded(mut self, flag: bool) -> Self {
        self.metadata.pre_branded_with_logo = flag;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_configuration_is_all_defaults() {
        let style = StyleConfiguration::default();
        assert_eq!(style.background, BackgroundChoice::Default);
        assert_eq!(style.branding, BrandingChoice::Default);
        assert_eq!(style.clothing, ClothingChoice::Default);
        assert_eq!(style.pose, PoseChoice::Default);
    }

    #[test]
    fn test_tagged_serialization() {
        let style = StyleConfiguration {
            background: BackgroundChoice::Custom {
                element_id: "bg-7".into(),
            },
            branding: BrandingChoice::Include {
                position: BrandingPosition::Elements,
            },
            ..Default::default()
        };
        let json = serde_json::to_value(&style).unwrap();
        assert_eq!(json["background"]["type"], "custom");
        assert_eq!(json["background"]["elementId"], "bg-7");
        assert_eq!(json["branding"]["position"], "elements");
        assert_eq!(json["clothing"]["type"], "default");
    }

    #[test]
    fn test_absent_categories_deserialize_as_default() {
        let style: StyleConfiguration =
            serde_json::from_str(r#"{"background": {"type": "predefined", "id": "studio"}}"#)
                .unwrap();
        assert_eq!(
            style.background,
            BackgroundChoice::Predefined { id: "studio".into() }
        );
        assert_eq!(style.branding, BrandingChoice::Default);
    }

    #[test]
    fn test_prepared_asset_builders() {
        let asset = PreparedAsset::background("bg-1", vec![1, 2, 3]).pre_branded(true);
        assert_eq!(asset.kind, AssetKind::Background);
        assert!(asset.metadata.pre_branded_with_logo);

        let overlay = PreparedAsset::clothing_overlay("shirt-2", vec![4]);
        assert_eq!(overlay.kind, AssetKind::ClothingOverlay);
        assert!(!overlay.metadata.pre_branded_with_logo);
    }
}
