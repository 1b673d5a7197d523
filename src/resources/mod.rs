//! Resource Module
//!
//! Data that flows through the prefilter pipeline:
//!
//! - [`format`]: render and storage pixel formats and the mapping between them
//! - [`cube`]: cube-face geometry and the row-order conventions
//! - [`source`]: the source environment and its CPU sampler
//! - [`asset`]: the persisted prefiltered cubemap and BRDF lookup texture

pub mod asset;
pub mod cube;
pub mod format;
pub mod source;

pub use asset::{AssetBuilder, AssetHeader, BrdfLut, PrefilteredAsset};
pub use cube::CubeFace;
pub use format::{RenderFormat, StorageFormat, convert_storage_format};
pub use source::{EnvironmentSampler, SourceEnvironment};
