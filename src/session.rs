//! Prefilter Session
//!
//! [`PrefilterSession`] is the explicit state of one tool session: the
//! render device, the configuration, the source environment and at most one
//! working surface. Each user action is a method that runs to completion;
//! each has a `can_*` predicate a presentation layer uses to disable it up
//! front.
//!
//! ```rust,ignore
//! let mut session = PrefilterSession::new(SoftwareDevice::new(), config);
//! session.load_source()?;
//! session.prefilter()?;
//! session.save("studio.pfcube")?;
//! ```
//!
//! The session owns its working surface and releases it on [`delete`],
//! before the next [`prefilter`], and on drop.
//!
//! [`delete`]: PrefilterSession::delete
//! [`prefilter`]: PrefilterSession::prefilter

use std::path::{Path, PathBuf};

use crate::config::PrefilterConfig;
use crate::errors::{PrefilterError, Result};
use crate::prefilter::assembler::assemble;
use crate::prefilter::brdf_lut::generate_brdf_lut;
use crate::prefilter::driver::{ConvolutionDriver, DriverState, WorkingSurface};
use crate::prefilter::schedule::Brdf;
use crate::prefilter::seam::{EdgeBlend, SOURCE_SEAM_WIDTH, SeamSmoother};
use crate::preview::{PreviewController, PreviewTarget, show_preview};
use crate::renderer::RenderDevice;
use crate::resources::asset::{BRDF_LUT_FILE_NAME, PrefilteredAsset};
use crate::resources::source::SourceEnvironment;

pub struct PrefilterSession<D: RenderDevice> {
    device: D,
    config: PrefilterConfig,
    source: Option<SourceEnvironment>,
    driver: ConvolutionDriver,
    working: Option<WorkingSurface>,
    view_mip: u32,
    asset_root: PathBuf,
    seam_smoother: Box<dyn SeamSmoother>,
}

impl<D: RenderDevice> PrefilterSession<D> {
    #[must_use]
    pub fn new(device: D, config: PrefilterConfig) -> Self {
        Self {
            device,
            config,
            source: None,
            driver: ConvolutionDriver::new(),
            working: None,
            view_mip: 0,
            asset_root: PathBuf::from("."),
            seam_smoother: Box::new(EdgeBlend::default()),
        }
    }

    /// Directory that save paths and the BRDF LUT are resolved against.
    #[must_use]
    pub fn with_asset_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.asset_root = root.into();
        self
    }

    /// Replaces the seam smoothing applied when saving.
    #[must_use]
    pub fn with_seam_smoother(mut self, smoother: Box<dyn SeamSmoother>) -> Self {
        self.seam_smoother = smoother;
        self
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    #[must_use]
    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    #[must_use]
    pub fn config(&self) -> &PrefilterConfig {
        &self.config
    }

    /// Replaces the configuration. An existing working surface keeps the
    /// parameters it was rendered with.
    pub fn set_config(&mut self, config: PrefilterConfig) -> Result<()> {
        config.validate()?;
        self.config = config;
        Ok(())
    }

    #[must_use]
    pub fn source(&self) -> Option<&SourceEnvironment> {
        self.source.as_ref()
    }

    /// Sets a prepared source environment.
    pub fn set_source(&mut self, source: Option<SourceEnvironment>) {
        self.source = source;
    }

    /// Loads `config.input_cubemap` with one-texel edge smoothing.
    pub fn load_source(&mut self) -> Result<()> {
        let input = self.config.input_cubemap.as_ref().ok_or_else(|| {
            PrefilterError::Configuration("no input cubemap selected".to_string())
        })?;
        let source = SourceEnvironment::load(input, &EdgeBlend::new(SOURCE_SEAM_WIDTH))?;
        self.source = Some(source);
        Ok(())
    }

    #[must_use]
    pub fn working_surface(&self) -> Option<&WorkingSurface> {
        self.working.as_ref()
    }

    #[must_use]
    pub fn driver_state(&self) -> DriverState {
        self.driver.state()
    }

    #[must_use]
    pub fn view_mip(&self) -> u32 {
        self.view_mip
    }

    #[must_use]
    pub fn asset_root(&self) -> &Path {
        &self.asset_root
    }

    // ========================================================================
    // Predicates
    // ========================================================================

    #[must_use]
    pub fn can_prefilter(&self) -> bool {
        self.source.is_some()
    }

    #[must_use]
    pub fn can_save(&self, name: &str) -> bool {
        !name.trim().is_empty() && self.working.is_some()
    }

    #[must_use]
    pub fn can_save_brdf_lut(&self) -> bool {
        self.config.brdf == Brdf::Ggx
    }

    #[must_use]
    pub fn can_view(&self) -> bool {
        self.working.is_some()
    }

    // ========================================================================
    // Actions
    // ========================================================================

    /// Renders a new working surface, replacing any previous one.
    pub fn prefilter(&mut self) -> Result<&WorkingSurface> {
        self.config.validate()?;
        let source = self.source.as_ref().ok_or_else(|| {
            PrefilterError::Configuration("no source environment selected".to_string())
        })?;

        if let Some(previous) = self.working.take() {
            self.device.release_surface(previous.id);
        }
        log::info!(
            "Prefilter: {}px {:?}, {:?}",
            self.config.resolution(),
            self.config.brdf,
            self.config.output_format
        );

        let working = self.driver.run(&mut self.device, &self.config, source)?;
        self.view_mip = 0;
        Ok(self.working.insert(working))
    }

    /// Assembles the working surface and writes it to `name` under the asset
    /// root. Nothing is written if either precondition fails.
    pub fn save(&mut self, name: &str) -> Result<PathBuf> {
        if name.trim().is_empty() {
            return Err(PrefilterError::EmptyName);
        }
        let working = self.working.as_ref().ok_or(PrefilterError::NoWorkingSurface)?;

        let asset = assemble(&mut self.device, working, self.seam_smoother.as_ref())?;
        let path = self.asset_root.join(name);
        asset.save(&path)?;
        log::info!("Saved prefiltered cubemap to {}", path.display());
        Ok(path)
    }

    /// Assembles the working surface without writing it.
    pub fn assemble(&mut self) -> Result<PrefilteredAsset> {
        let working = self.working.as_ref().ok_or(PrefilterError::NoWorkingSurface)?;
        assemble(&mut self.device, working, self.seam_smoother.as_ref())
    }

    /// Renders the BRDF lookup table and writes it to its well-known path.
    pub fn save_brdf_lut(&mut self) -> Result<PathBuf> {
        if !self.can_save_brdf_lut() {
            return Err(PrefilterError::Configuration(
                "the BRDF LUT is only available for GGX".to_string(),
            ));
        }
        let lut = generate_brdf_lut(&mut self.device)?;
        let path = self.asset_root.join(BRDF_LUT_FILE_NAME);
        lut.save(&path)?;
        log::info!("Saved BRDF LUT to {}", path.display());
        Ok(path)
    }

    /// Releases the working surface.
    pub fn delete(&mut self) {
        if let Some(working) = self.working.take() {
            self.device.release_surface(working.id);
            log::info!("Released working surface {}", working.id.raw());
        }
        self.view_mip = 0;
    }

    /// Shows the working surface at `mip` (clamped into `[0, mip_count]`).
    pub fn view(&mut self, preview: &mut dyn PreviewController, mip: u32) -> Result<u32> {
        let working = self.working.as_ref().ok_or(PrefilterError::NoWorkingSurface)?;
        let target = PreviewTarget::Working {
            surface: working.id,
            mip_count: working.mip_count,
        };
        self.view_mip = show_preview(preview, target, mip);
        Ok(self.view_mip)
    }
}

impl<D: RenderDevice> Drop for PrefilterSession<D> {
    fn drop(&mut self) {
        if let Some(working) = self.working.take() {
            self.device.release_surface(working.id);
        }
    }
}
