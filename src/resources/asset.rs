//! Persisted artifacts: the prefiltered cubemap and the BRDF lookup texture.
//!
//! # Prefiltered asset container
//!
//! ```text
//! [0..8)    magic  "PFCUBE01"
//! [8..12)   u32 LE header length N
//! [12..12+N) JSON AssetHeader
//! [..]      texel data: mip 0..mip_count, face +X..−Z, rows bottom-up
//! ```
//!
//! Both artifacts are written to a sibling `.partial` file first and renamed
//! into place, so a destination either holds a complete artifact or is left
//! untouched.

use std::path::{Path, PathBuf};

use glam::Vec4;
use serde::{Deserialize, Serialize};

use crate::errors::{PrefilterError, Result};
use crate::prefilter::schedule::Brdf;
use crate::prefilter::seam::SeamSmoother;
use crate::resources::cube::{CubeFace, full_mip_count, mip_size};
use crate::resources::format::{ComponentType, StorageFormat, srgb_to_linear};

pub const ASSET_MAGIC: &[u8; 8] = b"PFCUBE01";

/// Largest edge length a stored cube may declare.
pub const MAX_ASSET_SIZE: u32 = 4096;

/// Edge length of the BRDF lookup texture.
pub const BRDF_LUT_SIZE: u32 = 512;

/// Well-known file name of the BRDF lookup texture.
pub const BRDF_LUT_FILE_NAME: &str = "ggx_brdf.exr";

/// Metadata stored in front of the texel data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetHeader {
    pub format: StorageFormat,
    pub size: u32,
    pub mip_count: u32,
    pub srgb: bool,
    pub brdf: Brdf,
    /// Convolution parameter of each mip.
    pub params: Vec<f32>,
}

impl AssetHeader {
    /// Rejects headers whose geometry cannot describe a stored cube. Must
    /// pass before [`Self::payload_bytes`] is trusted on untrusted input.
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| -> Result<()> { Err(PrefilterError::InvalidAsset(msg)) };
        if self.size == 0 || self.mip_count == 0 {
            return invalid("empty cube".to_string());
        }
        if !self.size.is_power_of_two() {
            return invalid(format!("size {} is not a power of two", self.size));
        }
        if self.size > MAX_ASSET_SIZE {
            return invalid(format!("size {} exceeds {MAX_ASSET_SIZE}", self.size));
        }
        if self.mip_count > full_mip_count(self.size) {
            return invalid(format!(
                "{} mips do not fit a {}px cube",
                self.mip_count, self.size
            ));
        }
        if self.params.len() != self.mip_count as usize {
            return invalid(format!(
                "{} params for {} mips",
                self.params.len(),
                self.mip_count
            ));
        }
        Ok(())
    }

    #[must_use]
    pub fn face_bytes(&self, mip: u32) -> usize {
        let s = mip_size(self.size, mip) as usize;
        s * s * self.format.bytes_per_pixel()
    }

    #[must_use]
    pub fn payload_bytes(&self) -> usize {
        (0..self.mip_count).map(|mip| 6 * self.face_bytes(mip)).sum()
    }
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(std::ffi::OsStr::to_os_string).unwrap_or_default();
    name.push(".partial");
    path.with_file_name(name)
}

fn commit(path: &Path, write: impl FnOnce(&Path) -> Result<()>) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    let partial = partial_path(path);
    if let Err(err) = write(&partial) {
        let _ = std::fs::remove_file(&partial);
        return Err(err);
    }
    std::fs::rename(&partial, path)?;
    Ok(())
}

// ============================================================================
// Asset builder (mutable, pre-finalize)
// ============================================================================

/// A cube image being filled face by face.
#[derive(Debug, Clone, PartialEq)]
pub struct AssetBuilder {
    header: AssetHeader,
    levels: Vec<[Vec<u8>; 6]>,
}

impl AssetBuilder {
    /// Allocates zeroed storage for every face of every mip.
    #[must_use]
    pub fn new(header: AssetHeader) -> Self {
        let levels = (0..header.mip_count)
            .map(|mip| {
                let bytes = header.face_bytes(mip);
                std::array::from_fn(|_| vec![0u8; bytes])
            })
            .collect();
        Self { header, levels }
    }

    #[must_use]
    pub fn header(&self) -> &AssetHeader {
        &self.header
    }

    /// Writes one face of one mip; `data` must be in source rows.
    pub fn write_face(&mut self, face: CubeFace, mip: u32, data: Vec<u8>) -> Result<()> {
        let expected = self.header.face_bytes(mip);
        let slot = self
            .levels
            .get_mut(mip as usize)
            .ok_or_else(|| PrefilterError::InvalidAsset(format!("mip {mip} out of range")))?;
        if data.len() != expected {
            return Err(PrefilterError::InvalidAsset(format!(
                "face {face:?} mip {mip}: {} bytes, expected {expected}",
                data.len()
            )));
        }
        slot[face.index()] = data;
        Ok(())
    }

    #[must_use]
    pub fn face_data(&self, face: CubeFace, mip: u32) -> &[u8] {
        &self.levels[mip as usize][face.index()]
    }

    /// Applies seam smoothing to every mip and freezes the asset.
    #[must_use]
    pub fn finalize(mut self, smoother: &dyn SeamSmoother) -> PrefilteredAsset {
        let format = self.header.format;
        let bpp = format.bytes_per_pixel();
        for mip in 0..self.header.mip_count {
            let size = mip_size(self.header.size, mip);
            let level = &mut self.levels[mip as usize];

            let mut faces = std::array::from_fn(|i| {
                level[i].chunks_exact(bpp).map(|t| format.decode_texel(t)).collect::<Vec<_>>()
            });
            smoother.smooth(&mut faces, size);

            for (bytes, texels) in level.iter_mut().zip(faces.iter()) {
                for (out, texel) in bytes.chunks_exact_mut(bpp).zip(texels.iter()) {
                    format.encode_texel(*texel, out);
                }
            }
        }
        PrefilteredAsset {
            header: self.header,
            levels: self.levels,
        }
    }

    /// Freezes the asset without smoothing.
    #[must_use]
    pub fn finalize_unsmoothed(self) -> PrefilteredAsset {
        PrefilteredAsset {
            header: self.header,
            levels: self.levels,
        }
    }
}

// ============================================================================
// Prefiltered asset (immutable)
// ============================================================================

/// A finalized prefiltered cubemap.
#[derive(Debug, Clone, PartialEq)]
pub struct PrefilteredAsset {
    header: AssetHeader,
    levels: Vec<[Vec<u8>; 6]>,
}

impl PrefilteredAsset {
    #[must_use]
    pub fn header(&self) -> &AssetHeader {
        &self.header
    }

    #[inline]
    #[must_use]
    pub fn size(&self) -> u32 {
        self.header.size
    }

    #[inline]
    #[must_use]
    pub fn mip_count(&self) -> u32 {
        self.header.mip_count
    }

    #[inline]
    #[must_use]
    pub fn format(&self) -> StorageFormat {
        self.header.format
    }

    /// Raw bytes of one face of one mip, in source rows.
    #[must_use]
    pub fn face_data(&self, face: CubeFace, mip: u32) -> &[u8] {
        &self.levels[mip as usize][face.index()]
    }

    /// Decodes one mip into linear RGBA (BGRA swizzled, sRGB linearized,
    /// missing alpha set to one).
    pub fn decode_linear_level(&self, mip: u32) -> Result<[Vec<Vec4>; 6]> {
        let level = self
            .levels
            .get(mip as usize)
            .ok_or_else(|| PrefilterError::InvalidAsset(format!("mip {mip} out of range")))?;
        let format = self.header.format;
        let bpp = format.bytes_per_pixel();
        let srgb = self.header.srgb && format.component_type() == ComponentType::Unorm8;

        Ok(std::array::from_fn(|i| {
            level[i]
                .chunks_exact(bpp)
                .map(|bytes| {
                    let mut c = format.decode_texel(bytes);
                    if format == StorageFormat::Bgra8Unorm {
                        c = Vec4::new(c.z, c.y, c.x, c.w);
                    }
                    if format.channel_count() < 4 {
                        c.w = 1.0;
                    }
                    if srgb {
                        c = Vec4::new(srgb_to_linear(c.x), srgb_to_linear(c.y), srgb_to_linear(c.z), c.w);
                    }
                    c
                })
                .collect()
        }))
    }

    /// Serializes the asset into its container representation.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let header = serde_json::to_vec(&self.header)?;
        let header_len = u32::try_from(header.len())
            .map_err(|_| PrefilterError::InvalidAsset("header too large".to_string()))?;

        let mut out = Vec::with_capacity(12 + header.len() + self.header.payload_bytes());
        out.extend_from_slice(ASSET_MAGIC);
        out.extend_from_slice(&header_len.to_le_bytes());
        out.extend_from_slice(&header);
        for level in &self.levels {
            for face in level {
                out.extend_from_slice(face);
            }
        }
        Ok(out)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < 12 || &bytes[..8] != ASSET_MAGIC {
            return Err(PrefilterError::InvalidAsset("missing PFCUBE01 magic".to_string()));
        }
        let header_len = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]) as usize;
        let header_end = 12 + header_len;
        if bytes.len() < header_end {
            return Err(PrefilterError::InvalidAsset("truncated header".to_string()));
        }
        let header: AssetHeader = serde_json::from_slice(&bytes[12..header_end])?;
        header.validate()?;

        let payload = &bytes[header_end..];
        if payload.len() != header.payload_bytes() {
            return Err(PrefilterError::InvalidAsset(format!(
                "payload is {} bytes, header describes {}",
                payload.len(),
                header.payload_bytes()
            )));
        }

        let mut offset = 0;
        let mut levels = Vec::with_capacity(header.mip_count as usize);
        for mip in 0..header.mip_count {
            let n = header.face_bytes(mip);
            levels.push(std::array::from_fn(|_| {
                let face = payload[offset..offset + n].to_vec();
                offset += n;
                face
            }));
        }

        Ok(Self { header, levels })
    }

    /// Writes the asset to `path`, replacing any previous file only once the
    /// complete asset has been written.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let bytes = self.to_bytes()?;
        commit(path.as_ref(), |partial| Ok(std::fs::write(partial, &bytes)?))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_bytes(&std::fs::read(path.as_ref())?)
    }
}

// ============================================================================
// BRDF lookup texture
// ============================================================================

/// The split-sum BRDF term: `(scale, bias, 0, 1)` per texel, rows top-down
/// exactly as rendered.
#[derive(Debug, Clone, PartialEq)]
pub struct BrdfLut {
    size: u32,
    texels: Vec<[f32; 4]>,
}

impl BrdfLut {
    /// Wraps tightly packed RGBA32F bytes.
    pub fn from_rgba32f_bytes(size: u32, bytes: &[u8]) -> Result<Self> {
        let expected = (size * size) as usize * 16;
        if bytes.len() != expected {
            return Err(PrefilterError::InvalidAsset(format!(
                "BRDF LUT readback is {} bytes, expected {expected}",
                bytes.len()
            )));
        }
        let floats: Vec<f32> = bytemuck::pod_collect_to_vec(bytes);
        let texels = floats.chunks_exact(4).map(|c| [c[0], c[1], c[2], c[3]]).collect();
        Ok(Self { size, texels })
    }

    #[inline]
    #[must_use]
    pub fn size(&self) -> u32 {
        self.size
    }

    /// Texel `(x, y)` in rendered rows, or `None` outside the texture.
    #[must_use]
    pub fn texel(&self, x: u32, y: u32) -> Option<Vec4> {
        if x >= self.size || y >= self.size {
            return None;
        }
        self.texels.get((y * self.size + x) as usize).copied().map(Vec4::from_array)
    }

    /// Writes the LUT as an OpenEXR image.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let flat: Vec<f32> = self.texels.iter().flatten().copied().collect();
        let image = image::Rgba32FImage::from_raw(self.size, self.size, flat)
            .ok_or_else(|| PrefilterError::InvalidAsset("BRDF LUT size mismatch".to_string()))?;
        commit(path.as_ref(), |partial| {
            image.save_with_format(partial, image::ImageFormat::OpenExr)?;
            Ok(())
        })
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let image = image::open(path.as_ref())?.into_rgba32f();
        let (width, height) = image.dimensions();
        if width != height {
            return Err(PrefilterError::InvalidAsset(format!(
                "BRDF LUT must be square, got {width}x{height}"
            )));
        }
        let texels = image.pixels().map(|p| p.0).collect();
        Ok(Self { size: width, texels })
    }
}
