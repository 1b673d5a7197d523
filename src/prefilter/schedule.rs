//! Mip Schedule Planner
//!
//! Derives the mip count and the per-mip convolution parameter from the
//! output resolution and the reflectance model.
//!
//! | Model | Parameter at mip `m`                 |
//! |-------|--------------------------------------|
//! | GGX   | `m / (mip_count - 1)` (roughness)    |
//! | Phong | `start * decay^m` (specular power)   |

use serde::{Deserialize, Serialize};

use crate::errors::{PrefilterError, Result};
use crate::resources::cube::mip_size;

/// Upper bound on the prefiltered mip chain length.
pub const MAX_MIP_COUNT: u32 = 6;

/// Reflectance model used as the convolution kernel shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Brdf {
    /// Specular lobe with an exponent-derived alpha.
    #[serde(alias = "Phong")]
    Phong,
    /// Microfacet lobe parameterized by roughness.
    #[default]
    #[serde(alias = "GGX")]
    Ggx,
}

impl Brdf {
    /// Name of the program implementing this model.
    #[must_use]
    pub const fn program_name(self) -> &'static str {
        match self {
            Self::Phong => "prefilter_phong",
            Self::Ggx => "prefilter_ggx",
        }
    }
}

/// Output resolution of the prefiltered cubemap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum OutputSize {
    S16 = 16,
    S32 = 32,
    S64 = 64,
    S128 = 128,
    S256 = 256,
    S512 = 512,
    #[default]
    S1024 = 1024,
    S2048 = 2048,
    S4096 = 4096,
}

impl OutputSize {
    pub const ALL: [OutputSize; 9] = [
        Self::S16,
        Self::S32,
        Self::S64,
        Self::S128,
        Self::S256,
        Self::S512,
        Self::S1024,
        Self::S2048,
        Self::S4096,
    ];

    #[inline]
    #[must_use]
    pub const fn pixels(self) -> u32 {
        self as u32
    }
}

impl TryFrom<u32> for OutputSize {
    type Error = PrefilterError;

    fn try_from(value: u32) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|size| size.pixels() == value)
            .ok_or_else(|| {
                PrefilterError::Configuration(format!(
                    "output size {value} is not one of 16, 32, 64, ..., 4096"
                ))
            })
    }
}

impl From<OutputSize> for u32 {
    fn from(size: OutputSize) -> Self {
        size.pixels()
    }
}

/// `min(6, 1 + floor(log2(resolution)))`, and at least 1.
#[must_use]
pub fn compute_mip_count(resolution: u32) -> u32 {
    if resolution == 0 {
        return 1;
    }
    (1 + resolution.ilog2()).min(MAX_MIP_COUNT)
}

/// Convolution parameter for `mip` of a `mip_count` chain.
///
/// GGX ignores `start` and `decay`; Phong ignores `mip_count`.
#[must_use]
pub fn compute_param(brdf: Brdf, mip: u32, mip_count: u32, start: f32, decay: f32) -> f32 {
    match brdf {
        Brdf::Ggx => {
            if mip_count > 1 {
                mip as f32 / (mip_count - 1) as f32
            } else {
                0.0
            }
        }
        Brdf::Phong => start * decay.powi(mip as i32),
    }
}

/// One level of the prefiltered chain.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MipLevelDescriptor {
    pub index: u32,
    pub resolution: u32,
    /// Roughness for GGX, specular power for Phong.
    pub param: f32,
}

/// Plans every level of the chain for `resolution`.
#[must_use]
pub fn plan_mip_schedule(
    brdf: Brdf,
    resolution: u32,
    start: f32,
    decay: f32,
) -> Vec<MipLevelDescriptor> {
    let mip_count = compute_mip_count(resolution);
    (0..mip_count)
        .map(|index| MipLevelDescriptor {
            index,
            resolution: mip_size(resolution, index),
            param: compute_param(brdf, index, mip_count, start, decay),
        })
        .collect()
}
