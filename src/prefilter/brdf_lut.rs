//! BRDF LUT Generator
//!
//! One draw of the GGX program's integration pass into a flat
//! `BRDF_LUT_SIZE`² RGBA32F surface. The result is read back as is: it is
//! a plain 2D table, so no row flip is applied.

use crate::errors::Result;
use crate::prefilter::schedule::Brdf;
use crate::renderer::{CommandBatch, ProgramId, ProgramPass, RenderDevice, SurfaceDesc, SurfaceId};
use crate::resources::asset::{BRDF_LUT_SIZE, BrdfLut};
use crate::resources::format::RenderFormat;

#[must_use]
pub fn record_brdf_integration(program: ProgramId, surface: SurfaceId) -> CommandBatch {
    let mut batch = CommandBatch::new();
    batch
        .set_render_target(surface, 0, None)
        .draw_fullscreen_triangle(program, None);
    batch
}

/// Renders and reads back the split-sum BRDF table.
pub fn generate_brdf_lut<D: RenderDevice + ?Sized>(device: &mut D) -> Result<BrdfLut> {
    let program = device.resolve_program(Brdf::Ggx.program_name(), ProgramPass::BrdfIntegration)?;
    let surface = device.create_surface(&SurfaceDesc::flat(
        BRDF_LUT_SIZE,
        RenderFormat::Rgba32Float,
        false,
    ))?;

    let pixels = device
        .submit(record_brdf_integration(program, surface))
        .and_then(|()| device.read_pixels(surface));
    device.release_surface(surface);

    let lut = BrdfLut::from_rgba32f_bytes(BRDF_LUT_SIZE, &pixels?)?;
    log::info!("Generated {BRDF_LUT_SIZE}x{BRDF_LUT_SIZE} BRDF LUT");
    Ok(lut)
}
