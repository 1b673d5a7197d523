//! Software Render Device
//!
//! A CPU implementation of [`RenderDevice`]. It runs the host-side kernels in
//! [`crate::prefilter::kernel`] for every texel of the render target, using
//! the same face bases and GPU row order as the WGSL programs.
//!
//! Surfaces store texels in the render format's memory layout, so readbacks
//! are byte-compatible with the wgpu device. Formats without a storage
//! equivalent (packed 10/11-bit formats) cannot be rasterized here.
//!
//! Besides serving as a fallback backend, the device is instrumented for
//! tests: it counts submissions and copies and can be told to fail a copy or a
//! program resolution.

use glam::{Vec2, Vec4};
use rustc_hash::FxHashMap;

use crate::errors::{PrefilterError, Result};
use crate::prefilter::kernel::{DEFAULT_SAMPLE_COUNT, integrate_brdf, prefilter_ggx, prefilter_phong};
use crate::prefilter::schedule::Brdf;
use crate::renderer::shader::ProgramLibrary;
use crate::renderer::{
    Command, CommandBatch, GlobalState, ProgramId, ProgramPass, RenderDevice, SurfaceDesc,
    SurfaceId, SurfaceKind, TextureId,
};
use crate::resources::cube::{CubeFace, mip_size};
use crate::resources::format::{StorageFormat, convert_storage_format};
use crate::resources::source::{EnvironmentSampler, SourceEnvironment};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kernel {
    Convolution(Brdf),
    BrdfIntegration,
}

#[derive(Debug)]
struct SoftSurface {
    desc: SurfaceDesc,
    storage: StorageFormat,
    /// `[layer][mip]` texel bytes, GPU rows.
    layers: Vec<Vec<Vec<u8>>>,
}

impl SoftSurface {
    fn new(desc: SurfaceDesc, storage: StorageFormat) -> Self {
        let bpp = storage.bytes_per_pixel();
        let layers = (0..desc.layer_count())
            .map(|_| {
                (0..desc.mip_count)
                    .map(|mip| {
                        let s = mip_size(desc.size, mip) as usize;
                        vec![0u8; s * s * bpp]
                    })
                    .collect()
            })
            .collect();
        Self {
            desc,
            storage,
            layers,
        }
    }
}

/// CPU reference implementation of [`RenderDevice`].
#[derive(Debug)]
pub struct SoftwareDevice {
    sample_count: u32,
    kernels: Vec<(String, ProgramPass, Kernel)>,
    textures: FxHashMap<TextureId, EnvironmentSampler>,
    surfaces: FxHashMap<SurfaceId, SoftSurface>,
    submissions: usize,
    copies: usize,
    fail_copy_at: Option<usize>,
    fail_next_resolve: bool,
}

impl Default for SoftwareDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl SoftwareDevice {
    #[must_use]
    pub fn new() -> Self {
        Self::with_sample_count(DEFAULT_SAMPLE_COUNT)
    }

    /// A device whose kernels take `sample_count` samples per texel.
    #[must_use]
    pub fn with_sample_count(sample_count: u32) -> Self {
        Self {
            sample_count: sample_count.max(1),
            kernels: Vec::new(),
            textures: FxHashMap::default(),
            surfaces: FxHashMap::default(),
            submissions: 0,
            copies: 0,
            fail_copy_at: None,
            fail_next_resolve: false,
        }
    }

    #[must_use]
    pub fn sample_count(&self) -> u32 {
        self.sample_count
    }

    /// Makes the `n`-th subresource copy from now on (0-based) fail.
    pub fn inject_copy_failure(&mut self, n: usize) {
        self.fail_copy_at = Some(self.copies + n);
    }

    /// Makes the next program resolution fail, cached or not.
    pub fn inject_resolve_failure(&mut self) {
        self.fail_next_resolve = true;
    }

    /// Number of batches submitted so far.
    #[must_use]
    pub fn submission_count(&self) -> usize {
        self.submissions
    }

    /// Number of subresource copies attempted so far.
    #[must_use]
    pub fn copy_count(&self) -> usize {
        self.copies
    }

    /// Number of live surfaces.
    #[must_use]
    pub fn surface_count(&self) -> usize {
        self.surfaces.len()
    }

    /// Number of live input textures.
    #[must_use]
    pub fn texture_count(&self) -> usize {
        self.textures.len()
    }

    /// Raw bytes of one subresource, GPU rows.
    pub fn subresource(&self, surface: SurfaceId, layer: u32, mip: u32) -> Result<&[u8]> {
        self.surfaces
            .get(&surface)
            .and_then(|s| s.layers.get(layer as usize))
            .and_then(|mips| mips.get(mip as usize))
            .map(Vec::as_slice)
            .ok_or(PrefilterError::ResourceNotFound(surface.raw()))
    }

    fn draw(
        &mut self,
        kernel: Kernel,
        input: Option<TextureId>,
        target: (SurfaceId, u32, Option<CubeFace>),
        state: GlobalState,
    ) -> Result<()> {
        let (surface_id, mip, face) = target;
        let sample_count = self.sample_count;
        let surface = self
            .surfaces
            .get_mut(&surface_id)
            .ok_or(PrefilterError::ResourceNotFound(surface_id.raw()))?;
        let size = mip_size(surface.desc.size, mip);
        let srgb = surface.desc.srgb;
        let storage = surface.storage;
        let bpp = storage.bytes_per_pixel();
        let layer = face.map_or(0, CubeFace::index);
        let texels = &mut surface.layers[layer][mip as usize];

        let shade: Box<dyn Fn(u32, u32) -> Vec4 + '_> = match kernel {
            Kernel::Convolution(brdf) => {
                let texture = input.ok_or_else(|| {
                    PrefilterError::Configuration("convolution draw without an input".to_string())
                })?;
                let sampler = self
                    .textures
                    .get(&texture)
                    .ok_or(PrefilterError::ResourceNotFound(texture.raw()))?;
                let face = face.ok_or_else(|| {
                    PrefilterError::Configuration("convolution draw into a flat surface".to_string())
                })?;
                let alpha = state.alpha;
                Box::new(move |x, y| {
                    let dir = face.texel_direction(x, y, size);
                    match brdf {
                        Brdf::Ggx => prefilter_ggx(sampler, dir, alpha, sample_count),
                        Brdf::Phong => prefilter_phong(sampler, dir, alpha, sample_count),
                    }
                })
            }
            Kernel::BrdfIntegration => Box::new(move |x, y| {
                let s = size as f32;
                let uv = Vec2::new((x as f32 + 0.5) / s, (y as f32 + 0.5) / s);
                let term = integrate_brdf(uv.x, uv.y, sample_count);
                Vec4::new(term.x, term.y, 0.0, 1.0)
            }),
        };

        for y in 0..size {
            for x in 0..size {
                let offset = ((y * size + x) as usize) * bpp;
                storage.encode_color(shade(x, y), srgb, &mut texels[offset..offset + bpp]);
            }
        }
        Ok(())
    }
}

impl RenderDevice for SoftwareDevice {
    fn backend_name(&self) -> &'static str {
        "software"
    }

    fn resolve_program(&mut self, name: &str, pass: ProgramPass) -> Result<ProgramId> {
        if std::mem::take(&mut self.fail_next_resolve) {
            return Err(PrefilterError::ShaderResolution {
                program: name.to_string(),
                entry_point: pass.entry_point().to_string(),
            });
        }

        if let Some(index) = self
            .kernels
            .iter()
            .position(|(n, p, _)| n == name && *p == pass)
        {
            return Ok(ProgramId(index as u32));
        }

        let resolved = ProgramLibrary::resolve(name, pass)?;
        let kernel = match (resolved.name.as_str(), pass) {
            ("prefilter_ggx", ProgramPass::Convolution) => Kernel::Convolution(Brdf::Ggx),
            ("prefilter_phong", ProgramPass::Convolution) => Kernel::Convolution(Brdf::Phong),
            ("prefilter_ggx", ProgramPass::BrdfIntegration) => Kernel::BrdfIntegration,
            _ => {
                return Err(PrefilterError::ShaderResolution {
                    program: name.to_string(),
                    entry_point: pass.entry_point().to_string(),
                });
            }
        };

        self.kernels.push((name.to_string(), pass, kernel));
        Ok(ProgramId((self.kernels.len() - 1) as u32))
    }

    fn upload_environment(&mut self, source: &SourceEnvironment) -> Result<TextureId> {
        let id = TextureId::next();
        self.textures.insert(id, EnvironmentSampler::new(source));
        Ok(id)
    }

    fn release_texture(&mut self, texture: TextureId) {
        self.textures.remove(&texture);
    }

    fn create_surface(&mut self, desc: &SurfaceDesc) -> Result<SurfaceId> {
        if desc.size == 0 {
            return Err(PrefilterError::Configuration(
                "surface size must be non-zero".to_string(),
            ));
        }
        let storage = convert_storage_format(desc.format)?;
        let id = SurfaceId::next();
        self.surfaces.insert(id, SoftSurface::new(*desc, storage));
        Ok(id)
    }

    fn release_surface(&mut self, surface: SurfaceId) {
        self.surfaces.remove(&surface);
    }

    fn submit(&mut self, batch: CommandBatch) -> Result<()> {
        self.submissions += 1;

        let mut state = GlobalState::default();
        let mut target = None;
        for command in batch.commands() {
            match *command {
                Command::SetGlobal { param, value } => state.apply(param, value),
                Command::SetRenderTarget { surface, mip, face } => {
                    let desc = self
                        .surfaces
                        .get(&surface)
                        .ok_or(PrefilterError::ResourceNotFound(surface.raw()))?
                        .desc;
                    let addressable = match desc.kind {
                        SurfaceKind::Cube => face.is_some(),
                        SurfaceKind::Flat => face.is_none(),
                    };
                    if !addressable || mip >= desc.mip_count {
                        return Err(PrefilterError::Configuration(format!(
                            "render target {face:?} mip {mip} does not address {desc:?}"
                        )));
                    }
                    target = Some((surface, mip, face));
                }
                Command::DrawFullscreenTriangle { program, input } => {
                    let kernel = self
                        .kernels
                        .get(program.0 as usize)
                        .ok_or(PrefilterError::ResourceNotFound(u64::from(program.0)))?
                        .2;
                    let target = target.ok_or_else(|| {
                        PrefilterError::Configuration("draw without a render target".to_string())
                    })?;
                    self.draw(kernel, input, target, state)?;
                }
            }
        }

        log::debug!(
            "Software batch {}: {} commands, {} draws",
            self.submissions,
            batch.len(),
            batch.draw_count()
        );
        Ok(())
    }

    fn copy_subresource(
        &mut self,
        src: SurfaceId,
        face: CubeFace,
        mip: u32,
        dst: SurfaceId,
    ) -> Result<()> {
        let attempt = self.copies;
        self.copies += 1;
        if self.fail_copy_at == Some(attempt) {
            return Err(PrefilterError::SubresourceCopy(format!(
                "injected failure on copy {attempt} ({face:?}, mip {mip})"
            )));
        }

        let src_surface = self
            .surfaces
            .get(&src)
            .ok_or_else(|| PrefilterError::SubresourceCopy(format!("unknown source surface {}", src.raw())))?;
        let dst_surface = self.surfaces.get(&dst).ok_or_else(|| {
            PrefilterError::SubresourceCopy(format!("unknown destination surface {}", dst.raw()))
        })?;

        if src_surface.desc.kind != SurfaceKind::Cube
            || dst_surface.desc.kind != SurfaceKind::Flat
            || mip >= src_surface.desc.mip_count
            || dst_surface.desc.size != mip_size(src_surface.desc.size, mip)
            || src_surface.desc.format != dst_surface.desc.format
            || src_surface.desc.srgb != dst_surface.desc.srgb
        {
            return Err(PrefilterError::SubresourceCopy(format!(
                "cannot copy {face:?} mip {mip} of {:?} into {:?}",
                src_surface.desc, dst_surface.desc
            )));
        }

        let data = src_surface.layers[face.index()][mip as usize].clone();
        if let Some(dst_surface) = self.surfaces.get_mut(&dst) {
            dst_surface.layers[0][0] = data;
        }
        Ok(())
    }

    fn read_pixels(&mut self, surface: SurfaceId) -> Result<Vec<u8>> {
        let soft = self.surfaces.get(&surface).ok_or_else(|| {
            PrefilterError::SubresourceCopy(format!("unknown surface {}", surface.raw()))
        })?;
        if soft.desc.kind != SurfaceKind::Flat {
            return Err(PrefilterError::SubresourceCopy(
                "only flat surfaces can be read back".to_string(),
            ));
        }
        Ok(soft.layers[0][0].clone())
    }
}
