//! Rendering Module
//!
//! The prefilter pipeline talks to a GPU through the [`RenderDevice`] trait.
//! Work is described as a [`CommandBatch`], an ordered list of [`Command`]s
//! that a device executes as one submission.
//!
//! Two devices implement the trait:
//!
//! - [`gpu_device::GpuDevice`]: wgpu, headless
//! - [`software::SoftwareDevice`]: a CPU reference rasterizer running the
//!   same programs with the same face and row conventions
//!
//! Surfaces are addressed by opaque [`SurfaceId`]s. Pixels read back from a
//! surface are tightly packed in GPU row order (row 0 at the top).

pub mod context;
pub mod gpu_device;
pub mod mipmap;
pub mod shader;
pub mod software;

use std::sync::atomic::{AtomicU64, Ordering};

use crate::errors::Result;
use crate::resources::cube::CubeFace;
use crate::resources::format::RenderFormat;
use crate::resources::source::SourceEnvironment;

pub use context::{DeviceSettings, GpuContext};
pub use gpu_device::GpuDevice;
pub use software::SoftwareDevice;

static NEXT_RESOURCE_ID: AtomicU64 = AtomicU64::new(1);

fn next_resource_id() -> u64 {
    NEXT_RESOURCE_ID.fetch_add(1, Ordering::Relaxed)
}

/// A render target owned by a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SurfaceId(u64);

impl SurfaceId {
    pub(crate) fn next() -> Self {
        Self(next_resource_id())
    }

    #[must_use]
    pub fn raw(self) -> u64 {
        self.0
    }
}

/// A sampled input texture owned by a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureId(u64);

impl TextureId {
    pub(crate) fn next() -> Self {
        Self(next_resource_id())
    }

    #[must_use]
    pub fn raw(self) -> u64 {
        self.0
    }
}

/// A resolved program; only meaningful to the device that resolved it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgramId(pub(crate) u32);

/// Which entry point of a program to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProgramPass {
    /// Pass 0: the environment convolution kernel.
    Convolution,
    /// Pass 1: the split-sum BRDF integral (GGX only).
    BrdfIntegration,
}

impl ProgramPass {
    #[must_use]
    pub const fn entry_point(self) -> &'static str {
        match self {
            Self::Convolution => "fs_prefilter",
            Self::BrdfIntegration => "fs_integrate_brdf",
        }
    }

    #[must_use]
    pub const fn index(self) -> u32 {
        match self {
            Self::Convolution => 0,
            Self::BrdfIntegration => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SurfaceKind {
    /// Six layers with a mip chain.
    Cube,
    /// One 2D layer, one mip.
    Flat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SurfaceDesc {
    pub size: u32,
    pub mip_count: u32,
    pub format: RenderFormat,
    pub srgb: bool,
    pub kind: SurfaceKind,
}

impl SurfaceDesc {
    #[must_use]
    pub fn cube(size: u32, mip_count: u32, format: RenderFormat, srgb: bool) -> Self {
        Self {
            size,
            mip_count: mip_count.max(1),
            format,
            srgb,
            kind: SurfaceKind::Cube,
        }
    }

    #[must_use]
    pub fn flat(size: u32, format: RenderFormat, srgb: bool) -> Self {
        Self {
            size,
            mip_count: 1,
            format,
            srgb,
            kind: SurfaceKind::Flat,
        }
    }

    #[inline]
    #[must_use]
    pub fn layer_count(&self) -> u32 {
        match self.kind {
            SurfaceKind::Cube => 6,
            SurfaceKind::Flat => 1,
        }
    }
}

/// Program-global parameters, named after the uniforms they feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GlobalParam {
    /// `_Lod`: mip level being rendered.
    MipLevel,
    /// `alpha`: roughness (GGX) or specular power (Phong).
    Alpha,
    /// `face`: cube face index of the render target.
    Face,
    /// `_CubeSize`: edge length of the source environment.
    CubeSize,
    /// `numLod`: mip count of the source environment.
    LodCount,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    SetGlobal {
        param: GlobalParam,
        value: f32,
    },
    /// Selects one subresource as the render target. `face` is `None` for
    /// flat surfaces.
    SetRenderTarget {
        surface: SurfaceId,
        mip: u32,
        face: Option<CubeFace>,
    },
    DrawFullscreenTriangle {
        program: ProgramId,
        input: Option<TextureId>,
    },
}

/// Commands submitted to a device as one unit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandBatch {
    commands: Vec<Command>,
}

impl CommandBatch {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_global(&mut self, param: GlobalParam, value: f32) -> &mut Self {
        self.commands.push(Command::SetGlobal { param, value });
        self
    }

    pub fn set_render_target(
        &mut self,
        surface: SurfaceId,
        mip: u32,
        face: Option<CubeFace>,
    ) -> &mut Self {
        self.commands.push(Command::SetRenderTarget { surface, mip, face });
        self
    }

    pub fn draw_fullscreen_triangle(
        &mut self,
        program: ProgramId,
        input: Option<TextureId>,
    ) -> &mut Self {
        self.commands
            .push(Command::DrawFullscreenTriangle { program, input });
        self
    }

    #[must_use]
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    #[must_use]
    pub fn draw_count(&self) -> usize {
        self.commands
            .iter()
            .filter(|c| matches!(c, Command::DrawFullscreenTriangle { .. }))
            .count()
    }
}

/// Snapshot of the global parameters at the time of a draw.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GlobalState {
    pub mip_level: f32,
    pub alpha: f32,
    pub face: u32,
    pub cube_size: f32,
    pub lod_count: f32,
}

impl GlobalState {
    pub fn apply(&mut self, param: GlobalParam, value: f32) {
        match param {
            GlobalParam::MipLevel => self.mip_level = value,
            GlobalParam::Alpha => self.alpha = value,
            GlobalParam::Face => self.face = value as u32,
            GlobalParam::CubeSize => self.cube_size = value,
            GlobalParam::LodCount => self.lod_count = value,
        }
    }
}

/// The operations the prefilter pipeline needs from a GPU.
///
/// Calls run to completion on the calling thread. `submit` may return before
/// the GPU has finished; `copy_subresource` and `read_pixels` wait for all
/// previously submitted work.
pub trait RenderDevice {
    /// Short name for logs.
    fn backend_name(&self) -> &'static str;

    /// Resolves `pass` of the named program.
    ///
    /// Fails with [`PrefilterError::ShaderResolution`](crate::errors::PrefilterError::ShaderResolution)
    /// when the program or its entry point does not exist.
    fn resolve_program(&mut self, name: &str, pass: ProgramPass) -> Result<ProgramId>;

    /// Uploads a source environment as a trilinear, clamp-to-edge cube.
    fn upload_environment(&mut self, source: &SourceEnvironment) -> Result<TextureId>;

    fn release_texture(&mut self, texture: TextureId);

    fn create_surface(&mut self, desc: &SurfaceDesc) -> Result<SurfaceId>;

    fn release_surface(&mut self, surface: SurfaceId);

    /// Executes a batch as a single submission.
    fn submit(&mut self, batch: CommandBatch) -> Result<()>;

    /// Copies one face of one mip of a cube surface into a flat surface of
    /// the same size and format.
    fn copy_subresource(
        &mut self,
        src: SurfaceId,
        face: CubeFace,
        mip: u32,
        dst: SurfaceId,
    ) -> Result<()>;

    /// Reads mip 0 of a flat surface, tightly packed, GPU rows.
    fn read_pixels(&mut self, surface: SurfaceId) -> Result<Vec<u8>>;
}

impl<D: RenderDevice + ?Sized> RenderDevice for Box<D> {
    fn backend_name(&self) -> &'static str {
        (**self).backend_name()
    }

    fn resolve_program(&mut self, name: &str, pass: ProgramPass) -> Result<ProgramId> {
        (**self).resolve_program(name, pass)
    }

    fn upload_environment(&mut self, source: &SourceEnvironment) -> Result<TextureId> {
        (**self).upload_environment(source)
    }

    fn release_texture(&mut self, texture: TextureId) {
        (**self).release_texture(texture);
    }

    fn create_surface(&mut self, desc: &SurfaceDesc) -> Result<SurfaceId> {
        (**self).create_surface(desc)
    }

    fn release_surface(&mut self, surface: SurfaceId) {
        (**self).release_surface(surface);
    }

    fn submit(&mut self, batch: CommandBatch) -> Result<()> {
        (**self).submit(batch)
    }

    fn copy_subresource(
        &mut self,
        src: SurfaceId,
        face: CubeFace,
        mip: u32,
        dst: SurfaceId,
    ) -> Result<()> {
        (**self).copy_subresource(src, face, mip, dst)
    }

    fn read_pixels(&mut self, surface: SurfaceId) -> Result<Vec<u8>> {
        (**self).read_pixels(surface)
    }
}
