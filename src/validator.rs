//! Asset readiness gate for generation jobs.
//!
//! A job must not reach the provider while this returns a non-empty list.

use crate::style::{
    AssetKind, BackgroundChoice, BrandingChoice, BrandingPosition, ClothingChoice, PreparedAsset,
    StyleConfiguration,
};

/// Collect every missing-asset violation for the given style configuration.
///
/// Pure and synchronous. All rules are evaluated independently and every
/// violation is reported; the caller surfaces the list verbatim as the job's
/// failure reason. An empty list means the job may proceed to the provider.
pub fn required_asset_errors(
    style: &StyleConfiguration,
    assets: &[PreparedAsset],
) -> Vec<String> {
    let mut errors = Vec::new();

    let background = assets.iter().find(|a| a.kind == AssetKind::Background);

    match &style.background {
        BackgroundChoice::Custom { element_id } => match background {
            Some(asset) if !asset.payload.is_empty() => {}
            Some(_) => errors.push(format!(
                "Custom background '{}' requested but the prepared background asset is empty",
                element_id
            )),
            None => errors.push(format!(
                "Custom background '{}' requested but no prepared background asset was provided",
                element_id
            )),
        },
        BackgroundChoice::Default | BackgroundChoice::Predefined { .. } => {}
    }

    match &style.branding {
        BrandingChoice::Include { position } => match position {
            // Logo on the background or scene elements: the prepared
            // background must exist and already carry the logo.
            BrandingPosition::Background | BrandingPosition::Elements => match background {
                None => errors.push(
                    "Branding requested but no prepared background asset was provided".to_string(),
                ),
                Some(asset) if !asset.metadata.pre_branded_with_logo => errors.push(
                    "Prepared background asset is not pre-branded with the logo".to_string(),
                ),
                Some(_) => {}
            },
            // Logo on clothing only matters when clothing is actually swapped.
            BrandingPosition::Clothing => {
                if matches!(style.clothing, ClothingChoice::Selected { .. }) {
                    let overlay = assets
                        .iter()
                        .find(|a| a.kind == AssetKind::ClothingOverlay);
                    match overlay {
                        Some(asset) if !asset.payload.is_empty() => {}
                        _ => errors.push(
                            "Clothing branding requested but no prepared clothing overlay asset was provided"
                                .to_string(),
                        ),
                    }
                }
            }
        },
        BrandingChoice::Default => {}
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::style::PreparedAsset;

    fn custom_background_style() -> StyleConfiguration {
        StyleConfiguration {
            background: BackgroundChoice::Custom {
                element_id: "bg-1".into(),
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_custom_background_without_asset() {
        let errors = required_asset_errors(&custom_background_style(), &[]);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("Custom background"));
    }

    #[test]
    fn test_custom_background_with_empty_payload() {
        let assets = vec![PreparedAsset::background("bg-1", Vec::new())];
        let errors = required_asset_errors(&custom_background_style(), &assets);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("empty"));
    }

    #[test]
    fn test_custom_background_satisfied() {
        let assets = vec![PreparedAsset::background("bg-1", vec![1, 2, 3])];
        let errors = required_asset_errors(&custom_background_style(), &assets);
        assert!(errors.is_empty());
    }

    #[test]
    fn test_default_style_requires_nothing() {
        assert!(required_asset_errors(&StyleConfiguration::default(), &[]).is_empty());
    }

    #[test]
    fn test_branding_missing_asset_vs_missing_flag_are_distinct() {
        let style = StyleConfiguration {
            branding: BrandingChoice::Include {
                position: BrandingPosition::Elements,
            },
            ..Default::default()
        };

        let missing = required_asset_errors(&style, &[]);
        assert_eq!(missing.len(), 1);
        assert!(missing[0].contains("no prepared background asset"));

        let unbranded = vec![PreparedAsset::background("bg-1", vec![1])];
        let flag_false = required_asset_errors(&style, &unbranded);
        assert_eq!(flag_false.len(), 1);
        assert!(flag_false[0].contains("not pre-branded"));
        assert_ne!(missing[0], flag_false[0]);

        let branded = vec![PreparedAsset::background("bg-1", vec![1]).pre_branded(true)];
        assert!(required_asset_errors(&style, &branded).is_empty());
    }

    #[test]
    fn test_clothing_branding_needs_overlay_only_when_clothing_set() {
        let mut style = StyleConfiguration {
            branding: BrandingChoice::Include {
                position: BrandingPosition::Clothing,
            },
            ..Default::default()
        };

        // No clothing selected: the rule does not apply.
        assert!(required_asset_errors(&style, &[]).is_empty());

        style.clothing = ClothingChoice::Selected { id: "polo".into() };
        let errors = required_asset_errors(&style, &[]);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("clothing overlay"));

        let assets = vec![PreparedAsset::clothing_overlay("polo", vec![9])];
        assert!(required_asset_errors(&style, &assets).is_empty());
    }

    #[test]
    fn test_violations_are_collected_not_short_circuited() {
        let style = StyleConfiguration {
            background: BackgroundChoice::Custom {
                element_id: "bg-1".into(),
            },
            branding: BrandingChoice::Include {
                position: BrandingPosition::Clothing,
            },
            clothing: ClothingChoice::Selected { id: "polo".into() },
            ..Default::default()
        };
        let errors = required_asset_errors(&style, &[]);
        assert_eq!(errors.len(), 2);
    }
}
