//! envmap-prefilter - Split-sum IBL baker
//!
//! # Commands
//!
//! - `envmap-prefilter prefilter` - Prefilter an environment and save the cubemap asset
//! - `envmap-prefilter brdf-lut` - Write the GGX BRDF lookup texture
//! - `envmap-prefilter info` - Print the header of a saved cubemap asset
//!
//! # Usage
//!
//! ```bash
//! # Six faces in +X, -X, +Y, -Y, +Z, -Z order
//! envmap-prefilter prefilter --faces px.hdr nx.hdr py.hdr ny.hdr pz.hdr nz.hdr \
//!     --size 256 --output studio.pfcube
//!
//! # Everything from a JSON configuration
//! envmap-prefilter prefilter --config studio.json --output studio.pfcube
//!
//! # No GPU available
//! envmap-prefilter --backend software brdf-lut --asset-root assets/
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::de::DeserializeOwned;

use envmap_prefilter::preview::{LogPreview, PreviewTarget, show_preview};
use envmap_prefilter::renderer::RenderDevice;
use envmap_prefilter::{
    Brdf, CubemapInput, DeviceSettings, GpuDevice, OutputSize, PrefilterConfig, PrefilterSession,
    PrefilteredAsset, RenderFormat, SoftwareDevice,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Backend {
    /// wgpu on the best available adapter
    Gpu,
    /// CPU reference rasterizer
    Software,
}

/// Split-sum IBL baker: prefiltered environment cubemaps and the GGX BRDF LUT
#[derive(Parser)]
#[command(name = "envmap-prefilter")]
#[command(version)]
struct Cli {
    /// Render backend
    #[arg(long, value_enum, default_value_t = Backend::Gpu, global = true)]
    backend: Backend,

    /// Samples per texel for the software backend
    #[arg(long, default_value_t = 64, global = true)]
    samples: u32,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Prefilter an environment and save the cubemap asset
    Prefilter(PrefilterArgs),

    /// Write the GGX BRDF lookup texture (ggx_brdf.exr)
    BrdfLut {
        /// Directory to write into
        #[arg(long, default_value = ".")]
        asset_root: PathBuf,
    },

    /// Print the header of a saved cubemap asset
    Info {
        asset: PathBuf,

        /// Also send a preview request for this mip
        #[arg(long)]
        preview_mip: Option<u32>,
    },
}

#[derive(clap::Args)]
struct PrefilterArgs {
    /// JSON configuration; command-line options override its fields
    #[arg(long)]
    config: Option<PathBuf>,

    /// Six face images: +X -X +Y -Y +Z -Z
    #[arg(long, num_args = 6, value_names = ["PX", "NX", "PY", "NY", "PZ", "NZ"])]
    faces: Option<Vec<PathBuf>>,

    /// A previously saved cubemap asset to use as source
    #[arg(long, conflicts_with = "faces")]
    source_asset: Option<PathBuf>,

    /// Output edge length (16..4096, power of two)
    #[arg(long, value_parser = parse_output_size)]
    size: Option<OutputSize>,

    /// Output render format, e.g. rgba16_float
    #[arg(long, value_parser = parse_named::<RenderFormat>)]
    format: Option<RenderFormat>,

    /// Reflectance model: ggx or phong
    #[arg(long, value_parser = parse_named::<Brdf>)]
    brdf: Option<Brdf>,

    /// Store 8-bit output linearly instead of sRGB-encoded
    #[arg(long)]
    linear: bool,

    /// Phong specular power at mip 0
    #[arg(long)]
    start_alpha: Option<f32>,

    /// Phong specular power decay per mip
    #[arg(long)]
    alpha_mip_drop: Option<f32>,

    /// Destination name, relative to the asset root
    #[arg(long, short)]
    output: String,

    /// Directory the output name is resolved against
    #[arg(long, default_value = ".")]
    asset_root: PathBuf,

    /// Also write the BRDF LUT next to the asset (GGX only)
    #[arg(long)]
    with_brdf_lut: bool,

    /// Send a preview request for this mip after prefiltering
    #[arg(long)]
    preview_mip: Option<u32>,
}

fn parse_named<T: DeserializeOwned>(value: &str) -> std::result::Result<T, String> {
    serde_json::from_value(serde_json::Value::String(value.to_string())).map_err(|e| e.to_string())
}

fn parse_output_size(value: &str) -> std::result::Result<OutputSize, String> {
    let pixels: u32 = value.parse().map_err(|e| format!("{e}"))?;
    OutputSize::try_from(pixels).map_err(|e| e.to_string())
}

fn build_config(args: &PrefilterArgs) -> Result<PrefilterConfig> {
    let mut config = match &args.config {
        Some(path) => PrefilterConfig::from_json_file(path)
            .with_context(|| format!("reading {}", path.display()))?,
        None => PrefilterConfig::default(),
    };

    if let Some(faces) = &args.faces {
        let faces: [PathBuf; 6] = faces
            .clone()
            .try_into()
            .map_err(|_| anyhow::anyhow!("--faces takes exactly six paths"))?;
        config.input_cubemap = Some(CubemapInput::Faces(faces));
    }
    if let Some(asset) = &args.source_asset {
        config.input_cubemap = Some(CubemapInput::Asset(asset.clone()));
    }
    if let Some(size) = args.size {
        config.output_size = size;
    }
    if let Some(format) = args.format {
        config.output_format = format;
    }
    if let Some(brdf) = args.brdf {
        config.brdf = brdf;
    }
    if args.linear {
        config.output_srgb = false;
    }
    if let Some(start) = args.start_alpha {
        config.start_alpha = start;
    }
    if let Some(decay) = args.alpha_mip_drop {
        config.alpha_mip_drop = decay;
    }

    config.validate()?;
    Ok(config)
}

fn create_device(backend: Backend, samples: u32) -> Result<Box<dyn RenderDevice>> {
    let device: Box<dyn RenderDevice> = match backend {
        Backend::Gpu => Box::new(GpuDevice::new(&DeviceSettings::default())?),
        Backend::Software => Box::new(SoftwareDevice::with_sample_count(samples)),
    };
    Ok(device)
}

fn run_prefilter(device: Box<dyn RenderDevice>, args: &PrefilterArgs) -> Result<()> {
    let config = build_config(args)?;
    let mut session = PrefilterSession::new(device, config).with_asset_root(&args.asset_root);

    session.load_source().context("loading source environment")?;
    session.prefilter()?;

    if let Some(mip) = args.preview_mip {
        session.view(&mut LogPreview, mip)?;
    }

    let path = session.save(&args.output)?;
    println!("{}", path.display());

    if args.with_brdf_lut {
        if session.can_save_brdf_lut() {
            println!("{}", session.save_brdf_lut()?.display());
        } else {
            log::warn!("--with-brdf-lut ignored: the BRDF LUT is only available for GGX");
        }
    }

    session.delete();
    Ok(())
}

fn run_info(asset: &Path, preview_mip: Option<u32>) -> Result<()> {
    let asset = PrefilteredAsset::load(asset).with_context(|| format!("reading {}", asset.display()))?;
    println!("{}", serde_json::to_string_pretty(asset.header())?);
    if let Some(mip) = preview_mip {
        show_preview(&mut LogPreview, PreviewTarget::Asset(&asset), mip);
    }
    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Prefilter(args) => {
            let device = create_device(cli.backend, cli.samples)?;
            run_prefilter(device, &args)
        }
        Commands::BrdfLut { asset_root } => {
            let device = create_device(cli.backend, cli.samples)?;
            let mut session =
                PrefilterSession::new(device, PrefilterConfig::default()).with_asset_root(asset_root);
            println!("{}", session.save_brdf_lut()?.display());
            Ok(())
        }
        Commands::Info { asset, preview_mip } => run_info(&asset, preview_mip),
    }
}
