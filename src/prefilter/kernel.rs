//! Convolution kernels evaluated on the CPU.
//!
//! These are the host-side twins of the WGSL programs in
//! `renderer/shaders/`. The software device evaluates them per texel, and
//! tests use them as the reference a rendered surface is compared against.
//!
//! Both convolutions use importance sampling with a Hammersley sequence and
//! pick the source LOD from the sample's solid angle (filtered importance
//! sampling), so few samples still give smooth results.

use std::f32::consts::PI;

use glam::{Vec2, Vec3, Vec4};

/// Sample count used by the software device unless overridden.
pub const DEFAULT_SAMPLE_COUNT: u32 = 64;

/// A cube environment that can be sampled by direction at a fractional LOD.
pub trait RadianceSource {
    /// Linear radiance in direction `dir` (need not be normalized).
    fn sample(&self, dir: Vec3, lod: f32) -> Vec4;

    /// Edge length of the base level.
    fn base_size(&self) -> u32;
}

#[inline]
#[must_use]
pub fn radical_inverse_vdc(mut bits: u32) -> f32 {
    bits = bits.rotate_right(16);
    bits = ((bits & 0x5555_5555) << 1) | ((bits & 0xAAAA_AAAA) >> 1);
    bits = ((bits & 0x3333_3333) << 2) | ((bits & 0xCCCC_CCCC) >> 2);
    bits = ((bits & 0x0F0F_0F0F) << 4) | ((bits & 0xF0F0_F0F0) >> 4);
    bits = ((bits & 0x00FF_00FF) << 8) | ((bits & 0xFF00_FF00) >> 8);
    bits as f32 * 2.328_306_4e-10
}

#[inline]
#[must_use]
pub fn hammersley(i: u32, n: u32) -> Vec2 {
    Vec2::new(i as f32 / n as f32, radical_inverse_vdc(i))
}

/// Orthonormal tangent and bitangent around `n`.
#[must_use]
pub fn tangent_frame(n: Vec3) -> (Vec3, Vec3) {
    let up = if n.z.abs() < 0.999 { Vec3::Z } else { Vec3::X };
    let tangent = up.cross(n).normalize();
    let bitangent = n.cross(tangent);
    (tangent, bitangent)
}

#[inline]
fn to_world(local: Vec3, n: Vec3) -> Vec3 {
    let (t, b) = tangent_frame(n);
    (t * local.x + b * local.y + n * local.z).normalize()
}

/// GGX half vector around `n`; `roughness` is perceptual (alpha = roughness²).
#[must_use]
pub fn importance_sample_ggx(xi: Vec2, n: Vec3, roughness: f32) -> Vec3 {
    let a = roughness * roughness;
    let phi = 2.0 * PI * xi.x;
    let cos_theta = ((1.0 - xi.y) / (1.0 + (a * a - 1.0) * xi.y)).sqrt();
    let sin_theta = (1.0 - cos_theta * cos_theta).max(0.0).sqrt();
    let local = Vec3::new(phi.cos() * sin_theta, phi.sin() * sin_theta, cos_theta);
    to_world(local, n)
}

/// GGX normal distribution.
#[must_use]
pub fn d_ggx(n_dot_h: f32, roughness: f32) -> f32 {
    let a = roughness * roughness;
    let a2 = a * a;
    let d = n_dot_h * n_dot_h * (a2 - 1.0) + 1.0;
    a2 / (PI * d * d).max(1e-7)
}

/// Direction around the reflection vector `r` distributed by a normalized
/// Phong lobe of specular power `power`.
#[must_use]
pub fn importance_sample_phong(xi: Vec2, r: Vec3, power: f32) -> Vec3 {
    let phi = 2.0 * PI * xi.x;
    let cos_theta = xi.y.max(1e-7).powf(1.0 / (power + 1.0));
    let sin_theta = (1.0 - cos_theta * cos_theta).max(0.0).sqrt();
    let local = Vec3::new(phi.cos() * sin_theta, phi.sin() * sin_theta, cos_theta);
    to_world(local, r)
}

/// Source LOD whose texel footprint matches a sample of density `pdf`.
#[inline]
fn source_lod(pdf: f32, sample_count: u32, base_size: u32) -> f32 {
    let size = base_size as f32;
    let sa_texel = 4.0 * PI / (6.0 * size * size);
    let sa_sample = 1.0 / (sample_count as f32 * pdf + 1e-4);
    (0.5 * (sa_sample / sa_texel).log2()).max(0.0)
}

/// GGX prefiltered radiance around `n` (with `n = v = r`).
#[must_use]
pub fn prefilter_ggx(source: &impl RadianceSource, n: Vec3, roughness: f32, sample_count: u32) -> Vec4 {
    let n = n.normalize();
    if roughness <= 0.0 {
        let c = source.sample(n, 0.0);
        return Vec4::new(c.x, c.y, c.z, 1.0);
    }

    let mut color = Vec3::ZERO;
    let mut weight = 0.0;
    for i in 0..sample_count {
        let h = importance_sample_ggx(hammersley(i, sample_count), n, roughness);
        let v_dot_h = n.dot(h);
        let l = 2.0 * v_dot_h * h - n;
        let n_dot_l = n.dot(l);
        if n_dot_l > 0.0 {
            let n_dot_h = v_dot_h.max(0.0);
            let pdf = d_ggx(n_dot_h, roughness) * 0.25;
            let lod = source_lod(pdf, sample_count, source.base_size());
            color += source.sample(l, lod).truncate() * n_dot_l;
            weight += n_dot_l;
        }
    }

    let c = if weight > 0.0 { color / weight } else { source.sample(n, 0.0).truncate() };
    c.extend(1.0)
}

/// Phong prefiltered radiance around the reflection vector `r`.
#[must_use]
pub fn prefilter_phong(source: &impl RadianceSource, r: Vec3, power: f32, sample_count: u32) -> Vec4 {
    let r = r.normalize();
    let power = power.max(0.0);

    let mut color = Vec3::ZERO;
    for i in 0..sample_count {
        let l = importance_sample_phong(hammersley(i, sample_count), r, power);
        let cos_theta = r.dot(l).max(0.0);
        let pdf = (power + 1.0) / (2.0 * PI) * cos_theta.powf(power);
        let lod = source_lod(pdf, sample_count, source.base_size());
        color += source.sample(l, lod).truncate();
    }
    (color / sample_count.max(1) as f32).extend(1.0)
}

#[inline]
fn g_schlick_ggx(n_dot_x: f32, k: f32) -> f32 {
    n_dot_x / (n_dot_x * (1.0 - k) + k)
}

/// Split-sum BRDF term: returns `(scale, bias)` applied to F0.
#[must_use]
pub fn integrate_brdf(n_dot_v: f32, roughness: f32, sample_count: u32) -> Vec2 {
    let n_dot_v = n_dot_v.max(1e-4);
    let v = Vec3::new((1.0 - n_dot_v * n_dot_v).max(0.0).sqrt(), 0.0, n_dot_v);
    let n = Vec3::Z;
    let a = roughness * roughness;
    let k = a * 0.5;

    let mut scale = 0.0;
    let mut bias = 0.0;
    for i in 0..sample_count {
        let h = importance_sample_ggx(hammersley(i, sample_count), n, roughness);
        let l = 2.0 * v.dot(h) * h - v;

        let n_dot_l = l.z.clamp(0.0, 1.0);
        let n_dot_h = h.z.clamp(0.0, 1.0);
        let v_dot_h = v.dot(h).clamp(0.0, 1.0);

        if n_dot_l > 0.0 {
            let g = g_schlick_ggx(n_dot_v, k) * g_schlick_ggx(n_dot_l, k);
            let g_vis = g * v_dot_h / (n_dot_h * n_dot_v).max(1e-6);
            let fc = (1.0 - v_dot_h).powi(5);
            scale += (1.0 - fc) * g_vis;
            bias += fc * g_vis;
        }
    }

    let n = sample_count.max(1) as f32;
    Vec2::new(scale / n, bias / n)
}
