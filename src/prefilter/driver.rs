//! Convolution Kernel Driver
//!
//! Renders every mip of every face of the working surface with the selected
//! reflectance-model program.
//!
//! ```text
//! Idle ──► Allocating ──► Rendering ──► Complete
//!   │          │              │
//!   └──────────┴──────────────┴───────► Failed
//! ```
//!
//! Program resolution happens before anything is allocated or submitted, so
//! a missing program leaves no device state behind. All draws of one
//! invocation go to the device as a single [`CommandBatch`].

use crate::config::PrefilterConfig;
use crate::errors::Result;
use crate::prefilter::schedule::{Brdf, MipLevelDescriptor};
use crate::renderer::{
    CommandBatch, GlobalParam, ProgramId, ProgramPass, RenderDevice, SurfaceDesc, SurfaceId,
    TextureId,
};
use crate::resources::cube::{CubeFace, full_mip_count};
use crate::resources::format::RenderFormat;
use crate::resources::source::SourceEnvironment;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DriverState {
    #[default]
    Idle,
    Allocating,
    Rendering,
    Complete,
    Failed,
}

/// The rendered, device-resident cube produced by one invocation.
///
/// Carries everything the assembler needs, so later configuration edits do
/// not affect how it is read back.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkingSurface {
    pub id: SurfaceId,
    pub size: u32,
    pub mip_count: u32,
    pub format: RenderFormat,
    pub srgb: bool,
    pub brdf: Brdf,
    pub schedule: Vec<MipLevelDescriptor>,
}

/// Source dimensions fed to the programs as `_CubeSize` and `numLod`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SourceInfo {
    pub texture: TextureId,
    pub size: u32,
    pub lod_count: u32,
}

/// Builds the convolution batch: per mip, the mip-level and parameter
/// globals; per face, render target, face index and one draw.
#[must_use]
pub fn record_convolution(
    program: ProgramId,
    source: SourceInfo,
    surface: SurfaceId,
    schedule: &[MipLevelDescriptor],
) -> CommandBatch {
    let mut batch = CommandBatch::new();
    batch
        .set_global(GlobalParam::CubeSize, source.size as f32)
        .set_global(GlobalParam::LodCount, source.lod_count as f32);

    for level in schedule {
        batch
            .set_global(GlobalParam::MipLevel, level.index as f32)
            .set_global(GlobalParam::Alpha, level.param);

        for face in CubeFace::ALL {
            batch
                .set_render_target(surface, level.index, Some(face))
                .set_global(GlobalParam::Face, face.index() as f32)
                .draw_fullscreen_triangle(program, Some(source.texture));
        }
    }
    batch
}

#[derive(Debug, Default)]
pub struct ConvolutionDriver {
    state: DriverState,
}

impl ConvolutionDriver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn state(&self) -> DriverState {
        self.state
    }

    fn fail<T>(&mut self, err: crate::errors::PrefilterError) -> Result<T> {
        log::error!("Convolution failed in state {:?}: {err}", self.state);
        self.state = DriverState::Failed;
        Err(err)
    }

    /// Renders the prefiltered chain for `config` from `source`.
    pub fn run<D: RenderDevice + ?Sized>(
        &mut self,
        device: &mut D,
        config: &PrefilterConfig,
        source: &SourceEnvironment,
    ) -> Result<WorkingSurface> {
        self.state = DriverState::Idle;

        let program = match device.resolve_program(config.brdf.program_name(), ProgramPass::Convolution) {
            Ok(program) => program,
            Err(err) => return self.fail(err),
        };

        self.state = DriverState::Allocating;
        let schedule = config.schedule();
        let size = config.resolution();
        let mip_count = schedule.len() as u32;
        // Only formats with an sRGB variant carry the flag, on every backend
        let srgb = config.output_srgb && config.output_format.supports_srgb();
        let desc = SurfaceDesc::cube(size, mip_count, config.output_format, srgb);
        let surface = match device.create_surface(&desc) {
            Ok(surface) => surface,
            Err(err) => return self.fail(err),
        };
        let texture = match device.upload_environment(source) {
            Ok(texture) => texture,
            Err(err) => {
                device.release_surface(surface);
                return self.fail(err);
            }
        };

        self.state = DriverState::Rendering;
        let info = SourceInfo {
            texture,
            size: source.size(),
            lod_count: full_mip_count(source.size()),
        };
        let batch = record_convolution(program, info, surface, &schedule);
        log::debug!(
            "Convolution batch: {} mips, {} draws",
            schedule.len(),
            batch.draw_count()
        );
        let submitted = device.submit(batch);
        device.release_texture(texture);
        if let Err(err) = submitted {
            device.release_surface(surface);
            return self.fail(err);
        }

        self.state = DriverState::Complete;
        log::info!(
            "Prefiltered {size}px {:?} cube with {} ({mip_count} mips)",
            config.brdf,
            device.backend_name()
        );
        Ok(WorkingSurface {
            id: surface,
            size,
            mip_count,
            format: config.output_format,
            srgb,
            brdf: config.brdf,
            schedule,
        })
    }
}
