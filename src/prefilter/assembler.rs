//! Cubemap Assembler
//!
//! Reads a completed working surface back into a [`PrefilteredAsset`].
//!
//! For each mip, one flat scratch surface of that mip's size is created.
//! Each face is copied into it and read back. Readbacks arrive in GPU row
//! order and are flipped into source row order before they are stored. The
//! storage format is negotiated before any device work, and the first failed
//! copy or readback aborts the whole assembly.

use crate::errors::Result;
use crate::prefilter::driver::WorkingSurface;
use crate::prefilter::schedule::MipLevelDescriptor;
use crate::prefilter::seam::SeamSmoother;
use crate::renderer::{RenderDevice, SurfaceDesc, SurfaceId};
use crate::resources::asset::{AssetBuilder, AssetHeader, PrefilteredAsset};
use crate::resources::cube::{CubeFace, flip_rows};
use crate::resources::format::convert_storage_format;

/// Reads every face of every mip, without seam smoothing.
pub fn read_back<D: RenderDevice + ?Sized>(
    device: &mut D,
    working: &WorkingSurface,
) -> Result<AssetBuilder> {
    let format = convert_storage_format(working.format)?;
    let header = AssetHeader {
        format,
        size: working.size,
        mip_count: working.mip_count,
        srgb: working.srgb,
        brdf: working.brdf,
        params: working.schedule.iter().map(|level| level.param).collect(),
    };
    let mut builder = AssetBuilder::new(header);

    for level in &working.schedule {
        let scratch = device.create_surface(&SurfaceDesc::flat(
            level.resolution,
            working.format,
            working.srgb,
        ))?;
        let result = read_level(device, working, level, scratch, &mut builder);
        device.release_surface(scratch);
        result?;
    }

    Ok(builder)
}

fn read_level<D: RenderDevice + ?Sized>(
    device: &mut D,
    working: &WorkingSurface,
    level: &MipLevelDescriptor,
    scratch: SurfaceId,
    builder: &mut AssetBuilder,
) -> Result<()> {
    let row_bytes = level.resolution as usize * builder.header().format.bytes_per_pixel();
    for face in CubeFace::ALL {
        device.copy_subresource(working.id, face, level.index, scratch)?;
        let pixels = device.read_pixels(scratch)?;
        builder.write_face(face, level.index, flip_rows(&pixels, row_bytes))?;
    }
    log::debug!("Read back mip {} ({}px)", level.index, level.resolution);
    Ok(())
}

/// Reads back, smooths seams and finalizes the asset.
pub fn assemble<D: RenderDevice + ?Sized>(
    device: &mut D,
    working: &WorkingSurface,
    smoother: &dyn SeamSmoother,
) -> Result<PrefilteredAsset> {
    let asset = read_back(device, working)?.finalize(smoother);
    log::info!(
        "Assembled {}px cube, {} mips, {:?}",
        asset.size(),
        asset.mip_count(),
        asset.format()
    );
    Ok(asset)
}
