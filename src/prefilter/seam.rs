//! Seam smoothing across the 12 cube edges.
//!
//! Each face is filtered on its own, so neighbouring faces can disagree
//! along the edge they share. A [`SeamSmoother`] blends colors across those
//! edges. The strategy is replaceable; [`EdgeBlend`] is the default.

use glam::{Vec3, Vec4};

use crate::resources::cube::{CubeFace, texel_at, texel_center};

/// Texel width used when finalizing a prefiltered asset.
pub const ASSET_SEAM_WIDTH: u32 = 10;

/// Texel width used when preparing a source environment.
pub const SOURCE_SEAM_WIDTH: u32 = 1;

/// Blends texels across cube-face edges.
pub trait SeamSmoother: std::fmt::Debug {
    /// Smooths six faces of edge length `size`, stored in source rows.
    fn smooth(&self, faces: &mut [Vec<Vec4>; 6], size: u32);
}

/// Linear blend towards the texel mirrored across the edge.
///
/// A texel `d` texels away from an edge (0 for the edge row itself) moves
/// towards its mirror on the neighbouring face with weight
/// `0.5 * (1 - d / width)`. Edge texels on both sides therefore meet at
/// their average, and the blend fades out `width` texels into each face.
///
/// Mirrors are found by unfolding the neighbouring face about the shared
/// edge, so the pairing is exact on every edge regardless of face
/// orientation. All reads come from an unmodified snapshot, which makes the
/// result independent of face order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdgeBlend {
    pub width: u32,
}

impl EdgeBlend {
    #[must_use]
    pub const fn new(width: u32) -> Self {
        Self { width }
    }
}

impl Default for EdgeBlend {
    fn default() -> Self {
        Self::new(ASSET_SEAM_WIDTH)
    }
}

impl SeamSmoother for EdgeBlend {
    fn smooth(&self, faces: &mut [Vec<Vec4>; 6], size: u32) {
        if self.width == 0 || size < 2 {
            return;
        }
        let width = self.width.min(size / 2) as f32;
        let snapshot = faces.clone();
        let half = size as f32 * 0.5;

        for face in CubeFace::ALL {
            let (n_face, u_axis, v_axis) = face.basis();
            let neighbours = [u_axis, -u_axis, v_axis, -v_axis];

            for row in 0..size {
                let y = size - 1 - row;
                for x in 0..size {
                    let (u, v) = texel_center(x, y, size);
                    let p = face.point(u, v);
                    let index = (row * size + x) as usize;

                    for n_neighbour in neighbours {
                        let s = 1.0 - p.dot(n_neighbour);
                        let d = s * half - 0.5;
                        if d >= width {
                            continue;
                        }
                        let mirror = mirror_texel(p, s, n_face, n_neighbour, size);
                        let other = snapshot[mirror.0.index()][mirror.1];
                        let t = 0.5 * (1.0 - d.max(0.0) / width);
                        let current = faces[face.index()][index];
                        faces[face.index()][index] = current.lerp(other, t);
                    }
                }
            }
        }
    }
}

/// Texel on the neighbouring face at the same distance from the shared edge.
fn mirror_texel(p: Vec3, s: f32, n_face: Vec3, n_neighbour: Vec3, size: u32) -> (CubeFace, usize) {
    let unfolded = p + s * (n_neighbour - n_face);
    let (face, u, v) = CubeFace::project(unfolded);
    let (x, y) = texel_at(u, v, size);
    let row = size - 1 - y;
    (face, (row * size + x) as usize)
}
