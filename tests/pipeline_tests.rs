//! Prefilter Session Tests
//!
//! End-to-end tests on the software device:
//! - Prefilter, save and reload
//! - Action preconditions (no source, no working surface, empty name)
//! - Kernel output per mip
//! - Surface lifetime (delete, re-prefilter)
//! - BRDF LUT generation
//! - Preview mip clamping

use std::path::Path;

use envmap_prefilter::config::{CubemapInput, PrefilterConfig};
use envmap_prefilter::errors::PrefilterError;
use envmap_prefilter::prefilter::kernel::{prefilter_ggx, prefilter_phong};
use envmap_prefilter::prefilter::{Brdf, DriverState, EdgeBlend, OutputSize};
use envmap_prefilter::preview::{PreviewController, PreviewTarget};
use envmap_prefilter::renderer::SoftwareDevice;
use envmap_prefilter::resources::cube::mip_size;
use envmap_prefilter::resources::{
    BrdfLut, CubeFace, EnvironmentSampler, PrefilteredAsset, RenderFormat, SourceEnvironment,
    StorageFormat,
};
use envmap_prefilter::session::PrefilterSession;
use glam::{Vec3, Vec4};

const SAMPLES: u32 = 8;
const EPSILON: f32 = 1e-4;

fn approx_vec4(a: Vec4, b: Vec4) -> bool {
    (a - b).abs().max_element() < EPSILON
}

/// A sky: bright above the horizon, dark below, tinted along X.
fn sky(dir: Vec3) -> Vec4 {
    let up = dir.y.max(0.0);
    Vec4::new(0.2 + 0.8 * up, 0.3 + 0.5 * up, 0.4 + 0.1 * dir.x.abs(), 1.0)
}

fn config(size: OutputSize, format: RenderFormat, brdf: Brdf) -> PrefilterConfig {
    PrefilterConfig {
        output_size: size,
        output_format: format,
        output_srgb: false,
        brdf,
        ..PrefilterConfig::default()
    }
}

fn session_in(root: &Path, config: PrefilterConfig) -> PrefilterSession<SoftwareDevice> {
    let mut session = PrefilterSession::new(SoftwareDevice::with_sample_count(SAMPLES), config)
        .with_asset_root(root);
    session.set_source(Some(SourceEnvironment::from_fn(16, sky)));
    session
}

fn entries(dir: &Path) -> usize {
    std::fs::read_dir(dir).map(|d| d.count()).unwrap_or(0)
}

#[derive(Default)]
struct RecordingPreview {
    shown: Vec<(Option<u64>, u32)>,
}

impl PreviewController for RecordingPreview {
    fn set_preview(&mut self, target: PreviewTarget<'_>, mip: u32) {
        let surface = match target {
            PreviewTarget::Working { surface, .. } => Some(surface.raw()),
            PreviewTarget::Asset(_) => None,
        };
        self.shown.push((surface, mip));
    }
}

// ============================================================================
// Prefilter and Save
// ============================================================================

#[test]
fn prefilter_then_save_writes_a_loadable_asset() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = session_in(
        dir.path(),
        config(OutputSize::S16, RenderFormat::Rgba16Float, Brdf::Ggx),
    );

    assert!(session.can_prefilter());
    session.prefilter().unwrap();
    assert_eq!(session.driver_state(), DriverState::Complete);
    assert_eq!(session.device().submission_count(), 1);
    assert!(session.can_save("env/sky.pfcube"));

    let path = session.save("env/sky.pfcube").unwrap();
    assert_eq!(path, dir.path().join("env/sky.pfcube"));

    let asset = PrefilteredAsset::load(&path).unwrap();
    assert_eq!(asset.size(), 16);
    assert_eq!(asset.mip_count(), 5);
    assert_eq!(asset.format(), StorageFormat::Rgba16Float);
    assert_eq!(asset.header().brdf, Brdf::Ggx);
}

#[test]
fn ggx_at_256_renders_six_mips_in_one_submission() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = session_in(
        dir.path(),
        config(OutputSize::S256, RenderFormat::Rgba32Float, Brdf::Ggx),
    )
    .with_seam_smoother(Box::new(EdgeBlend::new(0)));
    let sampler = EnvironmentSampler::new(session.source().unwrap());

    let working = session.prefilter().unwrap();
    assert_eq!(working.mip_count, 6);
    let params: Vec<f32> = working.schedule.iter().map(|l| l.param).collect();
    assert_eq!(params, vec![0.0, 0.2, 0.4, 0.6, 0.8, 1.0]);
    let sizes: Vec<u32> = working.schedule.iter().map(|l| l.resolution).collect();
    assert_eq!(sizes, vec![256, 128, 64, 32, 16, 8]);
    assert_eq!(session.device().submission_count(), 1);

    let path = session.save("studio.pfcube").unwrap();
    let asset = PrefilteredAsset::load(&path).unwrap();
    assert_eq!(asset.size(), 256);
    assert_eq!(asset.mip_count(), 6);
    assert_eq!(asset.header().params, params);

    // Mirror-like base (every 17th texel) and the fully rough 8px tail
    let face = CubeFace::PositiveX;
    for (mip, roughness, stride) in [(0, 0.0, 17), (5, 1.0, 1)] {
        let size = mip_size(256, mip);
        let level = asset.decode_linear_level(mip).unwrap();
        for row in (0..size).step_by(stride) {
            let y = size - 1 - row;
            for x in (0..size).step_by(stride) {
                let expected =
                    prefilter_ggx(&sampler, face.texel_direction(x, y, size), roughness, SAMPLES);
                let got = level[face.index()][(row * size + x) as usize];
                assert!(
                    approx_vec4(got, expected),
                    "mip {mip} ({x}, {row}): {got} != {expected}"
                );
            }
        }
    }
}

#[test]
fn working_surface_keeps_the_parameters_it_was_rendered_with() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = session_in(
        dir.path(),
        config(OutputSize::S16, RenderFormat::Rgba8Unorm, Brdf::Ggx),
    );
    session.prefilter().unwrap();

    session
        .set_config(config(OutputSize::S64, RenderFormat::Rgba32Float, Brdf::Phong))
        .unwrap();
    let asset = session.assemble().unwrap();
    assert_eq!(asset.size(), 16);
    assert_eq!(asset.format(), StorageFormat::Rgba8Unorm);
    assert_eq!(asset.header().brdf, Brdf::Ggx);
}

// ============================================================================
// Kernel Output
// ============================================================================

#[test]
fn every_mip_matches_the_host_kernel() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = session_in(
        dir.path(),
        config(OutputSize::S16, RenderFormat::Rgba32Float, Brdf::Ggx),
    )
    .with_seam_smoother(Box::new(EdgeBlend::new(0)));
    let sampler = EnvironmentSampler::new(session.source().unwrap());

    let working = session.prefilter().unwrap().clone();
    let asset = session.assemble().unwrap();

    for level in &working.schedule {
        let size = mip_size(16, level.index);
        let faces = asset.decode_linear_level(level.index).unwrap();
        for face in CubeFace::ALL {
            for row in 0..size {
                let y = size - 1 - row;
                for x in 0..size {
                    let dir = face.texel_direction(x, y, size);
                    let expected = prefilter_ggx(&sampler, dir, level.param, SAMPLES);
                    let got = faces[face.index()][(row * size + x) as usize];
                    assert!(
                        approx_vec4(got, expected),
                        "mip {} {face:?} ({x}, {row}): {got} != {expected}",
                        level.index
                    );
                }
            }
        }
    }
}

#[test]
fn phong_uses_decaying_specular_power() {
    let dir = tempfile::tempdir().unwrap();
    let mut phong = config(OutputSize::S16, RenderFormat::Rgba32Float, Brdf::Phong);
    phong.start_alpha = 64.0;
    phong.alpha_mip_drop = 0.5;
    let mut session =
        session_in(dir.path(), phong).with_seam_smoother(Box::new(EdgeBlend::new(0)));
    let sampler = EnvironmentSampler::new(session.source().unwrap());

    let working = session.prefilter().unwrap().clone();
    let params: Vec<f32> = working.schedule.iter().map(|l| l.param).collect();
    assert_eq!(params, vec![64.0, 32.0, 16.0, 8.0, 4.0]);

    let asset = session.assemble().unwrap();
    let top = asset.decode_linear_level(4).unwrap();
    let expected = prefilter_phong(
        &sampler,
        CubeFace::PositiveY.texel_direction(0, 0, 1),
        4.0,
        SAMPLES,
    );
    assert!(approx_vec4(top[CubeFace::PositiveY.index()][0], expected));
}

// ============================================================================
// Preconditions
// ============================================================================

#[test]
fn prefilter_without_source_is_a_configuration_error() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = PrefilterSession::new(
        SoftwareDevice::new(),
        config(OutputSize::S16, RenderFormat::Rgba8Unorm, Brdf::Ggx),
    )
    .with_asset_root(dir.path());

    assert!(!session.can_prefilter());
    assert!(matches!(session.prefilter(), Err(PrefilterError::Configuration(_))));
    assert_eq!(session.driver_state(), DriverState::Idle);
    assert_eq!(session.device().surface_count(), 0);
    assert_eq!(session.device().submission_count(), 0);
}

#[test]
fn load_source_without_input_is_a_configuration_error() {
    let mut session = PrefilterSession::new(SoftwareDevice::new(), PrefilterConfig::default());
    assert!(matches!(session.load_source(), Err(PrefilterError::Configuration(_))));
    assert!(session.source().is_none());
}

#[test]
fn save_without_working_surface_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = session_in(
        dir.path(),
        config(OutputSize::S16, RenderFormat::Rgba8Unorm, Brdf::Ggx),
    );

    assert!(!session.can_save("sky.pfcube"));
    assert!(matches!(session.save("sky.pfcube"), Err(PrefilterError::NoWorkingSurface)));
    assert_eq!(entries(dir.path()), 0);
}

#[test]
fn save_with_empty_name_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = session_in(
        dir.path(),
        config(OutputSize::S16, RenderFormat::Rgba8Unorm, Brdf::Ggx),
    );
    session.prefilter().unwrap();

    assert!(!session.can_save(""));
    assert!(matches!(session.save(""), Err(PrefilterError::EmptyName)));
    assert!(matches!(session.save("   "), Err(PrefilterError::EmptyName)));
    assert_eq!(entries(dir.path()), 0);
    assert_eq!(session.device().copy_count(), 0);
}

#[test]
fn failed_copy_during_save_leaves_no_file() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = session_in(
        dir.path(),
        config(OutputSize::S16, RenderFormat::Rgba16Float, Brdf::Ggx),
    );
    session.prefilter().unwrap();

    session.device_mut().inject_copy_failure(20);
    assert!(matches!(
        session.save("sky.pfcube"),
        Err(PrefilterError::SubresourceCopy(_))
    ));
    assert_eq!(entries(dir.path()), 0);
    assert_eq!(session.device().surface_count(), 1);

    // The working surface survives; a retry succeeds.
    assert!(session.save("sky.pfcube").unwrap().exists());
}

#[test]
fn unresolvable_program_fails_the_driver_before_allocating() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = session_in(
        dir.path(),
        config(OutputSize::S16, RenderFormat::Rgba16Float, Brdf::Ggx),
    );

    session.device_mut().inject_resolve_failure();
    assert!(matches!(
        session.prefilter(),
        Err(PrefilterError::ShaderResolution { .. })
    ));
    assert_eq!(session.driver_state(), DriverState::Failed);
    assert!(session.working_surface().is_none());
    assert_eq!(session.device().submission_count(), 0);
    assert_eq!(session.device().surface_count(), 0);
    assert_eq!(session.device().texture_count(), 0);

    // The failure is one-shot; the next attempt completes.
    session.prefilter().unwrap();
    assert_eq!(session.driver_state(), DriverState::Complete);
}

#[test]
fn failed_re_prefilter_drops_the_previous_surface() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = session_in(
        dir.path(),
        config(OutputSize::S16, RenderFormat::Rgba16Float, Brdf::Ggx),
    );
    session.prefilter().unwrap();

    session.device_mut().inject_resolve_failure();
    assert!(session.prefilter().is_err());
    assert_eq!(session.driver_state(), DriverState::Failed);
    assert!(!session.can_save("sky.pfcube"));
    assert_eq!(session.device().submission_count(), 1);
    assert_eq!(session.device().surface_count(), 0);
}

// ============================================================================
// Surface Lifetime
// ============================================================================

#[test]
fn delete_releases_the_working_surface() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = session_in(
        dir.path(),
        config(OutputSize::S16, RenderFormat::Rgba8Unorm, Brdf::Ggx),
    );
    session.prefilter().unwrap();
    assert_eq!(session.device().surface_count(), 1);
    assert_eq!(session.device().texture_count(), 0);

    session.delete();
    assert_eq!(session.device().surface_count(), 0);
    assert!(session.working_surface().is_none());
    assert!(!session.can_view());
    assert!(matches!(session.save("sky.pfcube"), Err(PrefilterError::NoWorkingSurface)));

    // Deleting twice is harmless.
    session.delete();
}

#[test]
fn prefiltering_again_replaces_the_working_surface() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = session_in(
        dir.path(),
        config(OutputSize::S16, RenderFormat::Rgba8Unorm, Brdf::Ggx),
    );
    let first = session.prefilter().unwrap().id;
    let second = session.prefilter().unwrap().id;

    assert_ne!(first, second);
    assert_eq!(session.device().surface_count(), 1);
    assert_eq!(session.device().submission_count(), 2);
}

// ============================================================================
// Sources
// ============================================================================

#[test]
fn face_images_load_as_source() {
    let dir = tempfile::tempdir().unwrap();
    let paths: [std::path::PathBuf; 6] = CubeFace::ALL.map(|face| {
        let path = dir.path().join(format!("face{}.png", face.index()));
        image::RgbaImage::from_pixel(4, 4, image::Rgba([255, 0, 0, 255]))
            .save(&path)
            .unwrap();
        path
    });

    let mut input = config(OutputSize::S16, RenderFormat::Rgba8Unorm, Brdf::Ggx);
    input.input_cubemap = Some(CubemapInput::Faces(paths));
    let mut session = PrefilterSession::new(SoftwareDevice::with_sample_count(SAMPLES), input);

    session.load_source().unwrap();
    let source = session.source().unwrap();
    assert_eq!(source.size(), 4);
    assert!(approx_vec4(source.texel(CubeFace::NegativeZ, 1, 2), Vec4::new(1.0, 0.0, 0.0, 1.0)));
}

#[test]
fn mismatched_face_sizes_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let paths: [std::path::PathBuf; 6] = CubeFace::ALL.map(|face| {
        let size = if face == CubeFace::NegativeY { 8 } else { 4 };
        let path = dir.path().join(format!("face{}.png", face.index()));
        image::RgbaImage::new(size, size).save(&path).unwrap();
        path
    });

    assert!(matches!(
        SourceEnvironment::load_face_images(&paths),
        Err(PrefilterError::CubeMap(_))
    ));
}

#[test]
fn saved_asset_can_be_prefiltered_again() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = session_in(
        dir.path(),
        config(OutputSize::S16, RenderFormat::Rgba16Float, Brdf::Ggx),
    );
    session.prefilter().unwrap();
    let path = session.save("first.pfcube").unwrap();

    let mut input = config(OutputSize::S32, RenderFormat::Rgba16Float, Brdf::Ggx);
    input.input_cubemap = Some(CubemapInput::Asset(path));
    let mut second = PrefilterSession::new(SoftwareDevice::with_sample_count(SAMPLES), input)
        .with_asset_root(dir.path());
    second.load_source().unwrap();
    assert_eq!(second.source().unwrap().size(), 16);

    second.prefilter().unwrap();
    let asset = second.assemble().unwrap();
    assert_eq!(asset.size(), 32);
    assert_eq!(asset.mip_count(), 6);
}

// ============================================================================
// BRDF LUT
// ============================================================================

#[test]
fn brdf_lut_is_written_to_its_well_known_name() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = session_in(
        dir.path(),
        config(OutputSize::S16, RenderFormat::Rgba8Unorm, Brdf::Ggx),
    );

    assert!(session.can_save_brdf_lut());
    let path = session.save_brdf_lut().unwrap();
    assert_eq!(path, dir.path().join("ggx_brdf.exr"));
    assert_eq!(session.device().surface_count(), 0);

    let lut = BrdfLut::load(&path).unwrap();
    assert_eq!(lut.size(), 512);
    for (x, y) in [(0, 0), (511, 0), (256, 256), (511, 511)] {
        let t = lut.texel(x, y).unwrap();
        assert!((0.0..=1.0).contains(&t.x), "scale {t}");
        assert!((0.0..=1.0).contains(&t.y), "bias {t}");
        assert_eq!(t.w, 1.0);
    }
}

#[test]
fn phong_has_no_brdf_lut() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = session_in(
        dir.path(),
        config(OutputSize::S16, RenderFormat::Rgba8Unorm, Brdf::Phong),
    );

    assert!(!session.can_save_brdf_lut());
    assert!(matches!(session.save_brdf_lut(), Err(PrefilterError::Configuration(_))));
    assert_eq!(entries(dir.path()), 0);
    assert_eq!(session.device().submission_count(), 0);
}

// ============================================================================
// Preview
// ============================================================================

#[test]
fn view_clamps_the_mip_into_range() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = session_in(
        dir.path(),
        config(OutputSize::S16, RenderFormat::Rgba8Unorm, Brdf::Ggx),
    );
    let mut preview = RecordingPreview::default();
    assert!(matches!(
        session.view(&mut preview, 0),
        Err(PrefilterError::NoWorkingSurface)
    ));

    let id = session.prefilter().unwrap().id.raw();
    assert_eq!(session.view(&mut preview, 2).unwrap(), 2);
    assert_eq!(session.view(&mut preview, 5).unwrap(), 5);
    assert_eq!(session.view(&mut preview, 40).unwrap(), 5);
    assert_eq!(session.view_mip(), 5);
    assert_eq!(preview.shown, vec![(Some(id), 2), (Some(id), 5), (Some(id), 5)]);
}
