//! Provider abstraction for the generative model.
//!
//! Both pipelines talk to the same provider: generation consumes a reference
//! photo plus style settings, classification assigns a semantic type to an
//! uploaded photo. Implementations return the closed
//! [`ProviderError`](crate::ProviderError) union so the retry layer can make
//! its decision with a plain match.

use crate::error::ProviderError;
use crate::style::{PreparedAsset, StyleConfiguration};
use serde::{Deserialize, Serialize};
use std::future::Future;

/// Semantic type assigned to a reference photo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhotoKind {
    FrontView,
    SideView,
    FullBody,
    Unknown,
}

impl PhotoKind {
    pub fn as_str(&self) -> &str {
        match self {
            PhotoKind::FrontView => "front_view",
            PhotoKind::SideView => "side_view",
            PhotoKind::FullBody => "full_body",
            PhotoKind::Unknown => "unknown",
        }
    }
}

/// Classification result for one reference photo.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Classification {
    #[serde(rename = "type")]
    pub kind: PhotoKind,
    pub confidence: f32,
    pub person_count: u32,
    /// Propriety signal: the photo is suitable for professional output.
    pub appropriate: bool,
    pub well_lit: bool,
    pub plain_background: bool,
}

impl Classification {
    /// The marker written when classification failed for a photo so polling
    /// callers always see a result and a sweep can re-target it later.
    pub fn failure_marker() -> Self {
        Self {
            kind: PhotoKind::Unknown,
            confidence: 0.0,
            person_count: 0,
            appropriate: false,
            well_lit: false,
            plain_background: false,
        }
    }
}

/// Input to a generation call: the reference photo, the style settings, and
/// the binary assets prepared for this invocation.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub photo: Vec<u8>,
    pub style: StyleConfiguration,
    pub assets: Vec<PreparedAsset>,
}

/// Output of a successful generation call.
#[derive(Debug, Clone)]
pub struct GenerationOutput {
    /// Raw bytes of each generated image.
    pub images: Vec<Vec<u8>>,
}

/// The external generative-model provider.
///
/// Implementations must not be called directly by the pipeline; all access
/// goes through [`crate::retry::with_retry`] so rate-limit handling stays
/// uniform.
pub trait ImageProvider: Send + Sync {
    /// Generate styled output image(s) from a reference photo.
    fn generate(
        &self,
        request: &GenerationRequest,
    ) -> impl Future<Output = Result<GenerationOutput, ProviderError>> + Send;

    /// Classify a reference photo.
    fn classify(
        &self,
        image: &[u8],
    ) -> impl Future<Output = Result<Classification, ProviderError>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification_wire_shape() {
        let classification = Classification {
            kind: PhotoKind::FrontView,
            confidence: 0.92,
            person_count: 1,
            appropriate: true,
            well_lit: true,
            plain_background: false,
        };
        let json = serde_json::to_value(&classification).unwrap();
        assert_eq!(json["type"], "front_view");
        assert_eq!(json["personCount"], 1);
        assert_eq!(json["plainBackground"], false);
    }

    #[test]
    fn test_failure_marker_is_recognizable() {
        let marker = Classification::failure_marker();
        assert_eq!(marker.kind, PhotoKind::Unknown);
        assert_eq!(marker.confidence, 0.0);
    }
}
