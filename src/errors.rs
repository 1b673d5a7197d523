//! Error Types
//!
//! This module defines the error types used throughout the prefiltering pipeline.
//!
//! # Overview
//!
//! The main error type [`PrefilterError`] covers all failure modes including:
//! - Configuration and precondition failures (no source, empty save name)
//! - Format negotiation failures
//! - Program (shader) resolution failures
//! - GPU subresource copy and readback failures
//! - Asset I/O and decoding errors
//!
//! Every failure is local to the action that raised it. Nothing is retried,
//! and no partially assembled asset is ever written to disk.
//!
//! # Usage
//!
//! All public APIs return [`Result<T>`] which is an alias for
//! `std::result::Result<T, PrefilterError>`.
//!
//! ```rust,ignore
//! use envmap_prefilter::errors::{PrefilterError, Result};
//!
//! fn save() -> Result<()> {
//!     Err(PrefilterError::EmptyName)
//! }
//! ```

use thiserror::Error;

use crate::resources::format::RenderFormat;

/// The main error type for the prefiltering pipeline.
#[derive(Error, Debug)]
pub enum PrefilterError {
    // ========================================================================
    // Action Preconditions
    // ========================================================================
    /// The action cannot run with the current configuration
    /// (e.g. no source environment selected).
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Save was invoked with an empty destination name.
    #[error("Destination name is empty")]
    EmptyName,

    /// Save or View was invoked without a completed working surface.
    #[error("No completed working surface; run prefilter first")]
    NoWorkingSurface,

    // ========================================================================
    // Pipeline Errors
    // ========================================================================
    /// The render-surface format has no storage-format equivalent.
    #[error("Unsupported format: {0:?} has no storage equivalent")]
    UnsupportedFormat(RenderFormat),

    /// A reflectance-model program (or one of its entry points) was not found.
    #[error("Shader program not found: {program} (entry point `{entry_point}`)")]
    ShaderResolution {
        /// Program name, e.g. `prefilter_ggx`
        program: String,
        /// Requested entry point
        entry_point: String,
    },

    /// Copying or reading back a GPU subresource failed.
    #[error("Subresource copy failed: {0}")]
    SubresourceCopy(String),

    /// A device resource id does not refer to a live resource.
    #[error("Resource not found: {0}")]
    ResourceNotFound(u64),

    // ========================================================================
    // GPU Initialization Errors
    // ========================================================================
    /// Failed to request a compatible GPU adapter.
    #[error("Failed to request WGPU adapter: {0}")]
    AdapterRequestFailed(String),

    /// Failed to create the GPU device.
    #[error("Failed to create WGPU device: {0}")]
    DeviceCreateFailed(#[from] wgpu::RequestDeviceError),

    // ========================================================================
    // I/O & Asset Errors
    // ========================================================================
    /// File I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Image decoding or encoding error.
    #[error("Image error: {0}")]
    ImageDecode(String),

    /// JSON parsing error.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// Cube map validation error (mismatched faces, non-square images, ...).
    #[error("Cube map error: {0}")]
    CubeMap(String),

    /// A persisted asset container is malformed.
    #[error("Invalid asset: {0}")]
    InvalidAsset(String),
}

impl From<image::ImageError> for PrefilterError {
    fn from(err: image::ImageError) -> Self {
        PrefilterError::ImageDecode(err.to_string())
    }
}

/// Alias for `Result<T, PrefilterError>`.
pub type Result<T> = std::result::Result<T, PrefilterError>;
