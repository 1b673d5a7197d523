//! Prefilter Configuration
//!
//! [`PrefilterConfig`] mirrors the external configuration surface field for
//! field, so a JSON document written by a property panel (or by hand) loads
//! directly:
//!
//! ```json
//! {
//!     "input_cubemap": ["px.hdr", "nx.hdr", "py.hdr", "ny.hdr", "pz.hdr", "nz.hdr"],
//!     "output_format": "rgba16_float",
//!     "output_size": 256,
//!     "output_srgb": false,
//!     "brdf": "ggx",
//!     "startAlpha": 2048.0,
//!     "alphaMipDrop": 0.25
//! }
//! ```
//!
//! Missing fields take their [`Default`] values.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::{PrefilterError, Result};
use crate::prefilter::schedule::{Brdf, MipLevelDescriptor, OutputSize, compute_mip_count, plan_mip_schedule};
use crate::resources::format::RenderFormat;

/// Where the source environment comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CubemapInput {
    /// Six face images in +X, −X, +Y, −Y, +Z, −Z order.
    Faces([PathBuf; 6]),
    /// A previously saved prefiltered asset; its mip 0 is used.
    Asset(PathBuf),
}

/// Parameters of one prefilter invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrefilterConfig {
    pub input_cubemap: Option<CubemapInput>,
    pub output_format: RenderFormat,
    pub output_size: OutputSize,
    pub output_srgb: bool,
    pub brdf: Brdf,
    /// Specular power at mip 0 (Phong only).
    #[serde(rename = "startAlpha")]
    pub start_alpha: f32,
    /// Multiplicative decay of the specular power per mip (Phong only).
    #[serde(rename = "alphaMipDrop")]
    pub alpha_mip_drop: f32,
}

impl Default for PrefilterConfig {
    fn default() -> Self {
        Self {
            input_cubemap: None,
            output_format: RenderFormat::Rgba16Float,
            output_size: OutputSize::S1024,
            output_srgb: true,
            brdf: Brdf::Ggx,
            start_alpha: 2048.0,
            alpha_mip_drop: 0.25,
        }
    }
}

impl PrefilterConfig {
    pub fn from_json_str(source: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let source = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&source)
    }

    /// Rejects Phong parameters that would produce a meaningless schedule.
    pub fn validate(&self) -> Result<()> {
        if self.brdf == Brdf::Phong {
            if !self.start_alpha.is_finite() || self.start_alpha < 0.0 {
                return Err(PrefilterError::Configuration(format!(
                    "startAlpha must be a finite, non-negative number (got {})",
                    self.start_alpha
                )));
            }
            if !self.alpha_mip_drop.is_finite() || self.alpha_mip_drop <= 0.0 {
                return Err(PrefilterError::Configuration(format!(
                    "alphaMipDrop must be a finite, positive number (got {})",
                    self.alpha_mip_drop
                )));
            }
        }
        Ok(())
    }

    #[inline]
    #[must_use]
    pub fn resolution(&self) -> u32 {
        self.output_size.pixels()
    }

    #[must_use]
    pub fn mip_count(&self) -> u32 {
        compute_mip_count(self.resolution())
    }

    /// The full mip schedule for this configuration.
    #[must_use]
    pub fn schedule(&self) -> Vec<MipLevelDescriptor> {
        plan_mip_schedule(
            self.brdf,
            self.resolution(),
            self.start_alpha,
            self.alpha_mip_drop,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_configuration_surface_names() {
        let config = PrefilterConfig::from_json_str(
            r#"{
                "input_cubemap": "env.cubeasset",
                "output_format": "rgba32_float",
                "output_size": 64,
                "output_srgb": false,
                "brdf": "Phong",
                "startAlpha": 512.0,
                "alphaMipDrop": 0.5
            }"#,
        )
        .unwrap();

        assert_eq!(
            config.input_cubemap,
            Some(CubemapInput::Asset(PathBuf::from("env.cubeasset")))
        );
        assert_eq!(config.output_format, RenderFormat::Rgba32Float);
        assert_eq!(config.output_size, OutputSize::S64);
        assert!(!config.output_srgb);
        assert_eq!(config.brdf, Brdf::Phong);
        assert_eq!(config.start_alpha, 512.0);
        assert_eq!(config.alpha_mip_drop, 0.5);
    }

    #[test]
    fn face_list_input_parses() {
        let config = PrefilterConfig::from_json_str(
            r#"{ "input_cubemap": ["a", "b", "c", "d", "e", "f"] }"#,
        )
        .unwrap();
        assert!(matches!(config.input_cubemap, Some(CubemapInput::Faces(_))));
    }

    #[test]
    fn rejects_non_power_of_two_size() {
        assert!(PrefilterConfig::from_json_str(r#"{ "output_size": 100 }"#).is_err());
        assert!(PrefilterConfig::from_json_str(r#"{ "output_size": 8192 }"#).is_err());
    }

    #[test]
    fn rejects_bad_phong_decay() {
        let err = PrefilterConfig::from_json_str(r#"{ "brdf": "phong", "alphaMipDrop": 0.0 }"#);
        assert!(matches!(err, Err(PrefilterError::Configuration(_))));
    }

    #[test]
    fn ggx_ignores_phong_parameters() {
        let config = PrefilterConfig::from_json_str(r#"{ "brdf": "GGX", "alphaMipDrop": -1.0 }"#);
        assert!(config.is_ok());
    }
}
