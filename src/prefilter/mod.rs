//! Prefilter Pipeline
//!
//! ```text
//! PrefilterConfig ─► schedule ─► driver ─► WorkingSurface ─► assembler ─► PrefilteredAsset
//!                                                                  ▲
//!                                                               seam
//! brdf_lut ─► BrdfLut
//! ```
//!
//! - [`schedule`]: mip count and per-mip convolution parameter
//! - [`kernel`]: CPU twins of the convolution programs
//! - [`driver`]: records and submits the convolution batch
//! - [`assembler`]: reads the working surface back into an asset
//! - [`seam`]: seam smoothing across cube edges
//! - [`brdf_lut`]: the split-sum BRDF lookup table

pub mod assembler;
pub mod brdf_lut;
pub mod driver;
pub mod kernel;
pub mod schedule;
pub mod seam;

pub use assembler::{assemble, read_back};
pub use brdf_lut::generate_brdf_lut;
pub use driver::{ConvolutionDriver, DriverState, WorkingSurface};
pub use schedule::{Brdf, MipLevelDescriptor, OutputSize, compute_mip_count, compute_param, plan_mip_schedule};
pub use seam::{EdgeBlend, SeamSmoother};
