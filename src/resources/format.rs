//! Pixel Formats & Format Negotiation
//!
//! Two enumerations describe pixels in this crate:
//!
//! - [`RenderFormat`]: formats the working surface can be rendered in.
//! - [`StorageFormat`]: formats a persisted asset can be stored in.
//!
//! [`convert_storage_format`] is the single, exhaustive mapping between the
//! two. Every render format is listed in one `match`, so adding a variant
//! without deciding its storage equivalent is a compile error rather than a
//! runtime surprise.

use glam::Vec4;
use serde::{Deserialize, Serialize};

use crate::errors::{PrefilterError, Result};

/// Scalar type of each channel in a texel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentType {
    Unorm8,
    Float16,
    Float32,
}

impl ComponentType {
    #[must_use]
    pub const fn size(self) -> usize {
        match self {
            Self::Unorm8 => 1,
            Self::Float16 => 2,
            Self::Float32 => 4,
        }
    }
}

// ============================================================================
// Render formats
// ============================================================================

/// Pixel format of a render surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderFormat {
    /// 8-bit unsigned-normalized, four channels.
    Rgba8Unorm,
    Bgra8Unorm,
    /// Half-float, four channels.
    Rgba16Float,
    /// Full-float, four channels.
    Rgba32Float,
    R8Unorm,
    Rg8Unorm,
    R16Float,
    Rg16Float,
    R32Float,
    Rg32Float,
    Rgb10a2Unorm,
    Rg11b10Ufloat,
}

impl RenderFormat {
    pub const ALL: [RenderFormat; 12] = [
        Self::Rgba8Unorm,
        Self::Bgra8Unorm,
        Self::Rgba16Float,
        Self::Rgba32Float,
        Self::R8Unorm,
        Self::Rg8Unorm,
        Self::R16Float,
        Self::Rg16Float,
        Self::R32Float,
        Self::Rg32Float,
        Self::Rgb10a2Unorm,
        Self::Rg11b10Ufloat,
    ];

    /// Canonical name, shared with [`StorageFormat::name`] for structurally
    /// equivalent formats.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Rgba8Unorm => "rgba8_unorm",
            Self::Bgra8Unorm => "bgra8_unorm",
            Self::Rgba16Float => "rgba16_float",
            Self::Rgba32Float => "rgba32_float",
            Self::R8Unorm => "r8_unorm",
            Self::Rg8Unorm => "rg8_unorm",
            Self::R16Float => "r16_float",
            Self::Rg16Float => "rg16_float",
            Self::R32Float => "r32_float",
            Self::Rg32Float => "rg32_float",
            Self::Rgb10a2Unorm => "rgb10a2_unorm",
            Self::Rg11b10Ufloat => "rg11b10_ufloat",
        }
    }

    #[must_use]
    pub const fn bytes_per_pixel(self) -> u32 {
        match self {
            Self::R8Unorm => 1,
            Self::Rg8Unorm | Self::R16Float => 2,
            Self::Rgba8Unorm
            | Self::Bgra8Unorm
            | Self::Rg16Float
            | Self::R32Float
            | Self::Rgb10a2Unorm
            | Self::Rg11b10Ufloat => 4,
            Self::Rgba16Float | Self::Rg32Float => 8,
            Self::Rgba32Float => 16,
        }
    }

    /// Whether the format has an sRGB-encoded variant.
    #[must_use]
    pub const fn supports_srgb(self) -> bool {
        matches!(self, Self::Rgba8Unorm | Self::Bgra8Unorm)
    }

    /// The wgpu texture format used for the render surface.
    ///
    /// The sRGB flag only affects formats that have an sRGB variant; float
    /// formats always store linear values.
    #[must_use]
    pub const fn to_wgpu(self, srgb: bool) -> wgpu::TextureFormat {
        match self {
            Self::Rgba8Unorm if srgb => wgpu::TextureFormat::Rgba8UnormSrgb,
            Self::Rgba8Unorm => wgpu::TextureFormat::Rgba8Unorm,
            Self::Bgra8Unorm if srgb => wgpu::TextureFormat::Bgra8UnormSrgb,
            Self::Bgra8Unorm => wgpu::TextureFormat::Bgra8Unorm,
            Self::Rgba16Float => wgpu::TextureFormat::Rgba16Float,
            Self::Rgba32Float => wgpu::TextureFormat::Rgba32Float,
            Self::R8Unorm => wgpu::TextureFormat::R8Unorm,
            Self::Rg8Unorm => wgpu::TextureFormat::Rg8Unorm,
            Self::R16Float => wgpu::TextureFormat::R16Float,
            Self::Rg16Float => wgpu::TextureFormat::Rg16Float,
            Self::R32Float => wgpu::TextureFormat::R32Float,
            Self::Rg32Float => wgpu::TextureFormat::Rg32Float,
            Self::Rgb10a2Unorm => wgpu::TextureFormat::Rgb10a2Unorm,
            Self::Rg11b10Ufloat => wgpu::TextureFormat::Rg11b10Ufloat,
        }
    }
}

// ============================================================================
// Storage formats
// ============================================================================

/// Pixel format of a persisted asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageFormat {
    Rgba8Unorm,
    Bgra8Unorm,
    Rgba16Float,
    Rgba32Float,
    R8Unorm,
    Rg8Unorm,
    R16Float,
    Rg16Float,
    R32Float,
    Rg32Float,
}

impl StorageFormat {
    pub const ALL: [StorageFormat; 10] = [
        Self::Rgba8Unorm,
        Self::Bgra8Unorm,
        Self::Rgba16Float,
        Self::Rgba32Float,
        Self::R8Unorm,
        Self::Rg8Unorm,
        Self::R16Float,
        Self::Rg16Float,
        Self::R32Float,
        Self::Rg32Float,
    ];

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Rgba8Unorm => "rgba8_unorm",
            Self::Bgra8Unorm => "bgra8_unorm",
            Self::Rgba16Float => "rgba16_float",
            Self::Rgba32Float => "rgba32_float",
            Self::R8Unorm => "r8_unorm",
            Self::Rg8Unorm => "rg8_unorm",
            Self::R16Float => "r16_float",
            Self::Rg16Float => "rg16_float",
            Self::R32Float => "r32_float",
            Self::Rg32Float => "rg32_float",
        }
    }

    #[must_use]
    pub const fn channel_count(self) -> usize {
        match self {
            Self::R8Unorm | Self::R16Float | Self::R32Float => 1,
            Self::Rg8Unorm | Self::Rg16Float | Self::Rg32Float => 2,
            Self::Rgba8Unorm | Self::Bgra8Unorm | Self::Rgba16Float | Self::Rgba32Float => 4,
        }
    }

    #[must_use]
    pub const fn component_type(self) -> ComponentType {
        match self {
            Self::Rgba8Unorm | Self::Bgra8Unorm | Self::R8Unorm | Self::Rg8Unorm => {
                ComponentType::Unorm8
            }
            Self::Rgba16Float | Self::R16Float | Self::Rg16Float => ComponentType::Float16,
            Self::Rgba32Float | Self::R32Float | Self::Rg32Float => ComponentType::Float32,
        }
    }

    #[must_use]
    pub const fn bytes_per_pixel(self) -> usize {
        self.channel_count() * self.component_type().size()
    }

    /// Decodes one texel into raw channel values, in memory order.
    ///
    /// Channels the format does not have read as `0.0`. No transfer function
    /// is applied: sRGB-encoded bytes decode to their encoded value.
    #[must_use]
    pub fn decode_texel(self, bytes: &[u8]) -> Vec4 {
        let mut out = [0.0f32; 4];
        let size = self.component_type().size();
        for (c, value) in out.iter_mut().enumerate().take(self.channel_count()) {
            let chunk = &bytes[c * size..(c + 1) * size];
            *value = match self.component_type() {
                ComponentType::Unorm8 => f32::from(chunk[0]) / 255.0,
                ComponentType::Float16 => half::f16::from_le_bytes([chunk[0], chunk[1]]).to_f32(),
                ComponentType::Float32 => {
                    f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]])
                }
            };
        }
        Vec4::from_array(out)
    }

    /// Encodes raw channel values (memory order) into one texel.
    pub fn encode_texel(self, value: Vec4, out: &mut [u8]) {
        let size = self.component_type().size();
        let values = value.to_array();
        for (c, v) in values.iter().enumerate().take(self.channel_count()) {
            let chunk = &mut out[c * size..(c + 1) * size];
            match self.component_type() {
                ComponentType::Unorm8 => chunk[0] = (v.clamp(0.0, 1.0) * 255.0).round() as u8,
                ComponentType::Float16 => {
                    chunk.copy_from_slice(&half::f16::from_f32(*v).to_le_bytes());
                }
                ComponentType::Float32 => chunk.copy_from_slice(&v.to_le_bytes()),
            }
        }
    }

    /// Encodes a linear RGBA color, reordering channels for BGRA layouts and
    /// applying the sRGB transfer to color channels when `srgb` is set on an
    /// 8-bit format.
    pub fn encode_color(self, color: Vec4, srgb: bool, out: &mut [u8]) {
        let mut c = color;
        if srgb && self.component_type() == ComponentType::Unorm8 {
            c = Vec4::new(
                linear_to_srgb(c.x),
                linear_to_srgb(c.y),
                linear_to_srgb(c.z),
                c.w,
            );
        }
        if self == Self::Bgra8Unorm {
            c = Vec4::new(c.z, c.y, c.x, c.w);
        }
        self.encode_texel(c, out);
    }
}

/// Maps a render-surface format to the storage format of the final asset.
///
/// The three canonical four-channel cases map to their direct counterparts.
/// Every other render format maps to the storage format with the same
/// canonical name, if one exists; otherwise the conversion fails with
/// [`PrefilterError::UnsupportedFormat`].
pub fn convert_storage_format(render_format: RenderFormat) -> Result<StorageFormat> {
    let storage = match render_format {
        RenderFormat::Rgba8Unorm => StorageFormat::Rgba8Unorm,
        RenderFormat::Rgba16Float => StorageFormat::Rgba16Float,
        RenderFormat::Rgba32Float => StorageFormat::Rgba32Float,
        RenderFormat::Bgra8Unorm => StorageFormat::Bgra8Unorm,
        RenderFormat::R8Unorm => StorageFormat::R8Unorm,
        RenderFormat::Rg8Unorm => StorageFormat::Rg8Unorm,
        RenderFormat::R16Float => StorageFormat::R16Float,
        RenderFormat::Rg16Float => StorageFormat::Rg16Float,
        RenderFormat::R32Float => StorageFormat::R32Float,
        RenderFormat::Rg32Float => StorageFormat::Rg32Float,
        RenderFormat::Rgb10a2Unorm | RenderFormat::Rg11b10Ufloat => {
            return Err(PrefilterError::UnsupportedFormat(render_format));
        }
    };
    Ok(storage)
}

// ============================================================================
// Transfer functions
// ============================================================================

#[must_use]
pub fn linear_to_srgb(x: f32) -> f32 {
    let x = x.clamp(0.0, 1.0);
    if x <= 0.003_130_8 {
        x * 12.92
    } else {
        1.055 * x.powf(1.0 / 2.4) - 0.055
    }
}

#[must_use]
pub fn srgb_to_linear(x: f32) -> f32 {
    if x <= 0.040_45 {
        x / 12.92
    } else {
        ((x + 0.055) / 1.055).powf(2.4)
    }
}
