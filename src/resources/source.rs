//! Source Environment
//!
//! The immutable six-face cube image a prefilter invocation reads from.
//! Faces hold linear RGBA in source rows (bottom-up, see [`crate::resources::cube`]).

use std::path::{Path, PathBuf};

use glam::{Vec3, Vec4};

use crate::config::CubemapInput;
use crate::errors::{PrefilterError, Result};
use crate::prefilter::kernel::RadianceSource;
use crate::prefilter::seam::SeamSmoother;
use crate::resources::asset::PrefilteredAsset;
use crate::resources::cube::{CubeFace, flip_texel_rows};
use crate::resources::format::srgb_to_linear;

/// A linear-RGBA cube environment at a single resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceEnvironment {
    size: u32,
    faces: [Vec<Vec4>; 6],
}

impl SourceEnvironment {
    /// Builds an environment from six faces in source rows.
    pub fn from_faces(size: u32, faces: [Vec<Vec4>; 6]) -> Result<Self> {
        if size == 0 {
            return Err(PrefilterError::CubeMap("face size must be non-zero".to_string()));
        }
        let expected = (size * size) as usize;
        for (face, data) in CubeFace::ALL.iter().zip(faces.iter()) {
            if data.len() != expected {
                return Err(PrefilterError::CubeMap(format!(
                    "face {face:?} has {} texels, expected {expected}",
                    data.len()
                )));
            }
        }
        Ok(Self { size, faces })
    }

    /// Builds an environment by evaluating `radiance` at every texel direction.
    pub fn from_fn(size: u32, radiance: impl Fn(Vec3) -> Vec4) -> Self {
        let size = size.max(1);
        let faces = CubeFace::ALL.map(|face| {
            let mut texels = Vec::with_capacity((size * size) as usize);
            for row in 0..size {
                let y = size - 1 - row;
                for x in 0..size {
                    texels.push(radiance(face.texel_direction(x, y, size)));
                }
            }
            texels
        });
        Self { size, faces }
    }

    /// Loads the environment described by a configuration input and applies
    /// the default one-texel edge smoothing.
    pub fn load(input: &CubemapInput, smoother: &dyn SeamSmoother) -> Result<Self> {
        let env = match input {
            CubemapInput::Faces(paths) => Self::load_face_images(paths)?,
            CubemapInput::Asset(path) => Self::from_asset(&PrefilteredAsset::load(path)?)?,
        };
        Ok(env.with_smoothed_edges(smoother))
    }

    /// Loads six face images (+X, −X, +Y, −Y, +Z, −Z).
    ///
    /// 8-bit images are treated as sRGB-encoded and linearized; HDR and EXR
    /// images are taken as linear.
    pub fn load_face_images(paths: &[PathBuf; 6]) -> Result<Self> {
        let mut size = None;
        let mut faces: [Vec<Vec4>; 6] = Default::default();

        for (slot, path) in faces.iter_mut().zip(paths.iter()) {
            let (face_size, texels) = load_face_image(path)?;
            match size {
                None => size = Some(face_size),
                Some(s) if s != face_size => {
                    return Err(PrefilterError::CubeMap(format!(
                        "{} is {face_size}px, other faces are {s}px",
                        path.display()
                    )));
                }
                Some(_) => {}
            }
            *slot = texels;
        }

        log::info!("Loaded cube faces: {}px", size.unwrap_or(0));
        Self::from_faces(size.unwrap_or(0), faces)
    }

    /// Uses mip 0 of a saved prefiltered asset as a source.
    pub fn from_asset(asset: &PrefilteredAsset) -> Result<Self> {
        let faces = asset.decode_linear_level(0)?;
        Self::from_faces(asset.size(), faces)
    }

    /// Returns a copy with the seam-smoothing strategy applied.
    #[must_use]
    pub fn with_smoothed_edges(mut self, smoother: &dyn SeamSmoother) -> Self {
        smoother.smooth(&mut self.faces, self.size);
        self
    }

    #[inline]
    #[must_use]
    pub fn size(&self) -> u32 {
        self.size
    }

    /// Texels of one face in source rows.
    #[inline]
    #[must_use]
    pub fn face(&self, face: CubeFace) -> &[Vec4] {
        &self.faces[face.index()]
    }

    /// Texel at column `x`, source row `row`.
    #[inline]
    #[must_use]
    pub fn texel(&self, face: CubeFace, x: u32, row: u32) -> Vec4 {
        self.faces[face.index()][(row * self.size + x) as usize]
    }

    /// Texels of one face in GPU rows, ready for upload.
    #[must_use]
    pub fn gpu_rows(&self, face: CubeFace) -> Vec<Vec4> {
        flip_texel_rows(self.face(face), self.size as usize)
    }
}

fn load_face_image(path: &Path) -> Result<(u32, Vec<Vec4>)> {
    let image = image::open(path)?;
    let linearize = matches!(
        image,
        image::DynamicImage::ImageLuma8(_)
            | image::DynamicImage::ImageLumaA8(_)
            | image::DynamicImage::ImageRgb8(_)
            | image::DynamicImage::ImageRgba8(_)
    );
    let rgba = image.into_rgba32f();
    let (width, height) = rgba.dimensions();
    if width != height {
        return Err(PrefilterError::CubeMap(format!(
            "{} is {width}x{height}, cube faces must be square",
            path.display()
        )));
    }

    let top_down: Vec<Vec4> = rgba
        .pixels()
        .map(|p| {
            let [r, g, b, a] = p.0;
            if linearize {
                Vec4::new(srgb_to_linear(r), srgb_to_linear(g), srgb_to_linear(b), a)
            } else {
                Vec4::new(r, g, b, a)
            }
        })
        .collect();

    Ok((width, flip_texel_rows(&top_down, width as usize)))
}

// ============================================================================
// Sampling
// ============================================================================

/// Trilinear, clamp-to-edge sampler over a box-filtered mip chain of a
/// source environment, in GPU rows.
#[derive(Debug, Clone)]
pub struct EnvironmentSampler {
    levels: Vec<(u32, [Vec<Vec4>; 6])>,
}

impl EnvironmentSampler {
    #[must_use]
    pub fn new(source: &SourceEnvironment) -> Self {
        let base = CubeFace::ALL.map(|face| source.gpu_rows(face));
        let mut levels = vec![(source.size(), base)];

        while let Some((size, faces)) = levels.last() {
            if *size <= 1 {
                break;
            }
            let half = size / 2;
            let next = faces.clone().map(|texels| downsample(&texels, *size, half));
            levels.push((half, next));
        }

        Self { levels }
    }

    #[must_use]
    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    fn bilinear(&self, level: usize, face: CubeFace, u: f32, v: f32) -> Vec4 {
        let (size, faces) = &self.levels[level];
        let texels = &faces[face.index()];
        let s = *size as f32;
        let max = (*size - 1) as f32;

        let px = ((u + 1.0) * 0.5 * s - 0.5).clamp(0.0, max);
        let py = ((v + 1.0) * 0.5 * s - 0.5).clamp(0.0, max);
        let x0 = px.floor();
        let y0 = py.floor();
        let fx = px - x0;
        let fy = py - y0;
        let x0 = x0 as u32;
        let y0 = y0 as u32;
        let x1 = (x0 + 1).min(*size - 1);
        let y1 = (y0 + 1).min(*size - 1);

        let at = |x: u32, y: u32| texels[(y * size + x) as usize];
        let top = at(x0, y0).lerp(at(x1, y0), fx);
        let bottom = at(x0, y1).lerp(at(x1, y1), fx);
        top.lerp(bottom, fy)
    }
}

impl RadianceSource for EnvironmentSampler {
    fn sample(&self, dir: Vec3, lod: f32) -> Vec4 {
        let (face, u, v) = CubeFace::project(dir);
        let max_lod = (self.levels.len() - 1) as f32;
        let lod = lod.clamp(0.0, max_lod);
        let l0 = lod.floor() as usize;
        let l1 = (l0 + 1).min(self.levels.len() - 1);
        let t = lod - l0 as f32;

        let a = self.bilinear(l0, face, u, v);
        if t <= 0.0 || l0 == l1 {
            return a;
        }
        a.lerp(self.bilinear(l1, face, u, v), t)
    }

    fn base_size(&self) -> u32 {
        self.levels[0].0
    }
}

fn downsample(texels: &[Vec4], size: u32, half: u32) -> Vec<Vec4> {
    let mut out = Vec::with_capacity((half * half) as usize);
    for y in 0..half {
        for x in 0..half {
            let at = |dx: u32, dy: u32| texels[((2 * y + dy) * size + 2 * x + dx) as usize];
            out.push((at(0, 0) + at(1, 0) + at(0, 1) + at(1, 1)) * 0.25);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_fn_stores_source_rows() {
        let env = SourceEnvironment::from_fn(4, |dir| Vec4::new(dir.y, 0.0, 0.0, 1.0));
        // Row 0 is the bottom of a side face, so it looks down.
        assert!(env.texel(CubeFace::PositiveZ, 1, 0).x < 0.0);
        assert!(env.texel(CubeFace::PositiveZ, 1, 3).x > 0.0);
    }

    #[test]
    fn sampler_returns_texel_at_texel_center() {
        let env = SourceEnvironment::from_fn(8, |dir| dir.extend(1.0));
        let sampler = EnvironmentSampler::new(&env);
        let dir = CubeFace::NegativeY.texel_direction(3, 5, 8);
        let sample = sampler.sample(dir, 0.0);
        let expected = env.texel(CubeFace::NegativeY, 3, 8 - 1 - 5);
        assert!((sample - expected).abs().max_element() < 1e-5);
    }

    #[test]
    fn mip_chain_reaches_one_texel() {
        let env = SourceEnvironment::from_fn(16, |_| Vec4::ONE);
        assert_eq!(EnvironmentSampler::new(&env).level_count(), 5);
    }

    #[test]
    fn rejects_wrong_face_length() {
        let faces: [Vec<Vec4>; 6] = Default::default();
        assert!(SourceEnvironment::from_faces(2, faces).is_err());
    }
}
