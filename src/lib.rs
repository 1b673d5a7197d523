#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::too_many_arguments)]

pub mod config;
pub mod errors;
pub mod prefilter;
pub mod preview;
pub mod renderer;
pub mod resources;
pub mod session;

pub use config::{CubemapInput, PrefilterConfig};
pub use errors::{PrefilterError, Result};
pub use prefilter::{Brdf, ConvolutionDriver, DriverState, EdgeBlend, OutputSize, SeamSmoother, WorkingSurface};
pub use preview::{LogPreview, PreviewController, PreviewTarget};
pub use renderer::{DeviceSettings, GpuDevice, RenderDevice, SoftwareDevice};
pub use resources::{BrdfLut, CubeFace, PrefilteredAsset, RenderFormat, SourceEnvironment, StorageFormat};
pub use session::PrefilterSession;
