//! Preview Controller
//!
//! The ambient-lighting preview is owned by the host application. The core
//! only tells it which cube and mip to show.

use crate::renderer::SurfaceId;
use crate::resources::asset::PrefilteredAsset;

/// What a preview should display.
#[derive(Debug, Clone, Copy)]
pub enum PreviewTarget<'a> {
    /// The device-resident working surface of a session.
    Working { surface: SurfaceId, mip_count: u32 },
    /// A finalized asset.
    Asset(&'a PrefilteredAsset),
}

impl PreviewTarget<'_> {
    #[must_use]
    pub fn mip_count(&self) -> u32 {
        match self {
            Self::Working { mip_count, .. } => *mip_count,
            Self::Asset(asset) => asset.mip_count(),
        }
    }
}

/// Receives preview requests. `mip` lies in `[0, mip_count]`.
pub trait PreviewController {
    fn set_preview(&mut self, target: PreviewTarget<'_>, mip: u32);
}

/// Clamps a requested mip into `[0, mip_count]`.
#[must_use]
pub fn clamp_preview_mip(mip: u32, mip_count: u32) -> u32 {
    if mip > mip_count {
        log::warn!("Preview mip {mip} clamped to {mip_count}");
    }
    mip.min(mip_count)
}

/// Forwards `target` to `controller` with a clamped mip; returns the mip used.
pub fn show_preview(
    controller: &mut dyn PreviewController,
    target: PreviewTarget<'_>,
    mip: u32,
) -> u32 {
    let mip = clamp_preview_mip(mip, target.mip_count());
    controller.set_preview(target, mip);
    mip
}

/// A controller that only logs what it was asked to show.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogPreview;

impl PreviewController for LogPreview {
    fn set_preview(&mut self, target: PreviewTarget<'_>, mip: u32) {
        match target {
            PreviewTarget::Working { surface, mip_count } => {
                log::info!("Preview: working surface {} at mip {mip}/{mip_count}", surface.raw());
            }
            PreviewTarget::Asset(asset) => log::info!(
                "Preview: {}px {:?} asset at mip {mip}/{}",
                asset.size(),
                asset.header().brdf,
                asset.mip_count()
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mip_index_is_clamped_inclusive() {
        assert_eq!(clamp_preview_mip(0, 6), 0);
        assert_eq!(clamp_preview_mip(6, 6), 6);
        assert_eq!(clamp_preview_mip(9, 6), 6);
    }
}
