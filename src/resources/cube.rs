//! Cube-face geometry and row conventions.
//!
//! # Orientation
//!
//! Two row orders appear in the pipeline:
//!
//! - **GPU rows** (top-down): row 0 is the top of the face. This is what a
//!   render target holds and what a readback returns.
//! - **Source rows** (bottom-up): row 0 is the bottom of the face. Source
//!   environments and persisted assets use this order.
//!
//! Uploading a source flips it into GPU rows; reading a face back flips it
//! into source rows again. [`flip_rows`] is that flip, and it is its own
//! inverse.
//!
//! # Face coordinates
//!
//! A texel is addressed by face coordinates `(u, v)` in `[-1, 1]`, with `v`
//! increasing downwards in GPU rows. The direction of `(u, v)` on a face is
//! `normal + u * u_axis + v * v_axis` (see [`CubeFace::basis`]).

use glam::Vec3;
use serde::{Deserialize, Serialize};

/// The six cube faces, in their fixed enumeration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CubeFace {
    PositiveX = 0,
    NegativeX = 1,
    PositiveY = 2,
    NegativeY = 3,
    PositiveZ = 4,
    NegativeZ = 5,
}

impl CubeFace {
    /// +X, −X, +Y, −Y, +Z, −Z. Used identically when writing and reading.
    pub const ALL: [CubeFace; 6] = [
        Self::PositiveX,
        Self::NegativeX,
        Self::PositiveY,
        Self::NegativeY,
        Self::PositiveZ,
        Self::NegativeZ,
    ];

    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Returns `(normal, u_axis, v_axis)` for this face.
    #[must_use]
    pub const fn basis(self) -> (Vec3, Vec3, Vec3) {
        match self {
            Self::PositiveX => (Vec3::X, Vec3::NEG_Z, Vec3::NEG_Y),
            Self::NegativeX => (Vec3::NEG_X, Vec3::Z, Vec3::NEG_Y),
            Self::PositiveY => (Vec3::Y, Vec3::X, Vec3::Z),
            Self::NegativeY => (Vec3::NEG_Y, Vec3::X, Vec3::NEG_Z),
            Self::PositiveZ => (Vec3::Z, Vec3::X, Vec3::NEG_Y),
            Self::NegativeZ => (Vec3::NEG_Z, Vec3::NEG_X, Vec3::NEG_Y),
        }
    }

    #[inline]
    #[must_use]
    pub fn normal(self) -> Vec3 {
        self.basis().0
    }

    /// Point on the unit cube surface for face coordinates `(u, v)`.
    #[inline]
    #[must_use]
    pub fn point(self, u: f32, v: f32) -> Vec3 {
        let (n, u_axis, v_axis) = self.basis();
        n + u * u_axis + v * v_axis
    }

    /// Normalized direction through the center of GPU-row texel `(x, y)`.
    #[must_use]
    pub fn texel_direction(self, x: u32, y: u32, size: u32) -> Vec3 {
        let (u, v) = texel_center(x, y, size);
        self.point(u, v).normalize()
    }

    /// The face a direction points into, with face coordinates `(u, v)`.
    #[must_use]
    pub fn project(dir: Vec3) -> (CubeFace, f32, f32) {
        let abs = dir.abs();
        let face = if abs.x >= abs.y && abs.x >= abs.z {
            if dir.x >= 0.0 { Self::PositiveX } else { Self::NegativeX }
        } else if abs.y >= abs.z {
            if dir.y >= 0.0 { Self::PositiveY } else { Self::NegativeY }
        } else if dir.z >= 0.0 {
            Self::PositiveZ
        } else {
            Self::NegativeZ
        };
        let (n, u_axis, v_axis) = face.basis();
        let major = dir.dot(n);
        (face, dir.dot(u_axis) / major, dir.dot(v_axis) / major)
    }
}

/// Face coordinates of the center of GPU-row texel `(x, y)`.
#[inline]
#[must_use]
pub fn texel_center(x: u32, y: u32, size: u32) -> (f32, f32) {
    let s = size as f32;
    (
        2.0 * (x as f32 + 0.5) / s - 1.0,
        2.0 * (y as f32 + 0.5) / s - 1.0,
    )
}

/// Nearest GPU-row texel for face coordinates `(u, v)`.
#[inline]
#[must_use]
pub fn texel_at(u: f32, v: f32, size: u32) -> (u32, u32) {
    let s = size as f32;
    let max = size.saturating_sub(1);
    let x = (((u + 1.0) * 0.5 * s).floor().max(0.0) as u32).min(max);
    let y = (((v + 1.0) * 0.5 * s).floor().max(0.0) as u32).min(max);
    (x, y)
}

/// Edge length of mip `mip` of a chain whose base is `size`.
#[inline]
#[must_use]
pub const fn mip_size(size: u32, mip: u32) -> u32 {
    match size.checked_shr(mip) {
        Some(s) if s > 0 => s,
        _ => 1,
    }
}

/// Length of a complete mip chain down to 1×1.
#[inline]
#[must_use]
pub const fn full_mip_count(size: u32) -> u32 {
    if size == 0 { 1 } else { size.ilog2() + 1 }
}

/// Reverses the row order of a tightly packed image.
///
/// `row_bytes` is the length of one row. Applying the flip twice returns the
/// original buffer.
#[must_use]
pub fn flip_rows(data: &[u8], row_bytes: usize) -> Vec<u8> {
    if row_bytes == 0 {
        return data.to_vec();
    }
    let mut flipped = Vec::with_capacity(data.len());
    for row in data.chunks_exact(row_bytes).rev() {
        flipped.extend_from_slice(row);
    }
    flipped
}

/// Typed counterpart of [`flip_rows`] for texel slices.
#[must_use]
pub fn flip_texel_rows<T: Copy>(texels: &[T], width: usize) -> Vec<T> {
    if width == 0 {
        return texels.to_vec();
    }
    let mut flipped = Vec::with_capacity(texels.len());
    for row in texels.chunks_exact(width).rev() {
        flipped.extend_from_slice(row);
    }
    flipped
}
