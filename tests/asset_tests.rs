//! Asset Container Tests
//!
//! Tests for:
//! - Save / load of prefiltered cubemaps
//! - Rejection of malformed containers
//! - Atomic writes (no partial files left behind)
//! - Linear decoding of stored formats
//! - The BRDF lookup texture

use envmap_prefilter::errors::PrefilterError;
use envmap_prefilter::prefilter::Brdf;
use envmap_prefilter::resources::asset::ASSET_MAGIC;
use envmap_prefilter::resources::{AssetBuilder, AssetHeader, BrdfLut, CubeFace, PrefilteredAsset, StorageFormat};
use glam::Vec4;

fn header(format: StorageFormat, size: u32, mip_count: u32, srgb: bool) -> AssetHeader {
    AssetHeader {
        format,
        size,
        mip_count,
        srgb,
        brdf: Brdf::Ggx,
        params: (0..mip_count).map(|m| m as f32 / (mip_count - 1).max(1) as f32).collect(),
    }
}

/// An asset whose bytes encode face and mip, so misordered payloads show up.
fn patterned_asset() -> PrefilteredAsset {
    let header = header(StorageFormat::Rgba8Unorm, 4, 3, false);
    let mut builder = AssetBuilder::new(header.clone());
    for mip in 0..header.mip_count {
        for face in CubeFace::ALL {
            let len = header.face_bytes(mip);
            let data = (0..len).map(|i| (face.index() * 40 + mip as usize * 7 + i) as u8).collect();
            builder.write_face(face, mip, data).unwrap();
        }
    }
    builder.finalize_unsmoothed()
}

// ============================================================================
// Round Trip
// ============================================================================

#[test]
fn saved_asset_loads_identically() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("studio.pfcube");
    let asset = patterned_asset();

    asset.save(&path).unwrap();
    let loaded = PrefilteredAsset::load(&path).unwrap();
    assert_eq!(loaded, asset);
    assert_eq!(loaded.face_data(CubeFace::NegativeZ, 2), asset.face_data(CubeFace::NegativeZ, 2));
}

#[test]
fn save_creates_missing_directories_and_leaves_no_partial_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("env").join("sky.pfcube");

    patterned_asset().save(&path).unwrap();
    assert!(path.exists());
    let leftovers: Vec<_> = std::fs::read_dir(path.parent().unwrap())
        .unwrap()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_name().to_string_lossy().ends_with(".partial"))
        .collect();
    assert!(leftovers.is_empty());
}

#[test]
fn save_replaces_an_existing_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sky.pfcube");
    std::fs::write(&path, b"stale").unwrap();

    let asset = patterned_asset();
    asset.save(&path).unwrap();
    assert_eq!(PrefilteredAsset::load(&path).unwrap(), asset);
}

// ============================================================================
// Malformed Containers
// ============================================================================

#[test]
fn rejects_missing_magic() {
    let mut bytes = patterned_asset().to_bytes().unwrap();
    bytes[0] = b'X';
    assert!(matches!(
        PrefilteredAsset::from_bytes(&bytes),
        Err(PrefilterError::InvalidAsset(_))
    ));
}

#[test]
fn rejects_truncated_payload() {
    let bytes = patterned_asset().to_bytes().unwrap();
    assert!(matches!(
        PrefilteredAsset::from_bytes(&bytes[..bytes.len() - 1]),
        Err(PrefilterError::InvalidAsset(_))
    ));
}

#[test]
fn rejects_truncated_header() {
    let bytes = patterned_asset().to_bytes().unwrap();
    assert!(matches!(
        PrefilteredAsset::from_bytes(&bytes[..16]),
        Err(PrefilterError::InvalidAsset(_))
    ));
}

/// A container holding only `header`, with no texel data behind it.
fn header_only(header: &AssetHeader) -> Vec<u8> {
    let json = serde_json::to_vec(header).unwrap();
    let mut bytes = ASSET_MAGIC.to_vec();
    bytes.extend_from_slice(&(json.len() as u32).to_le_bytes());
    bytes.extend_from_slice(&json);
    bytes
}

fn assert_invalid(header: &AssetHeader) {
    assert!(
        matches!(
            PrefilteredAsset::from_bytes(&header_only(header)),
            Err(PrefilterError::InvalidAsset(_))
        ),
        "accepted {header:?}"
    );
}

#[test]
fn rejects_empty_cube() {
    assert_invalid(&header(StorageFormat::Rgba8Unorm, 0, 1, false));
}

#[test]
fn rejects_sizes_that_overflow_the_payload() {
    assert_invalid(&header(StorageFormat::Rgba32Float, u32::MAX, 1, false));
    assert_invalid(&header(StorageFormat::Rgba32Float, 1 << 31, 1, false));
}

#[test]
fn rejects_size_that_is_not_a_power_of_two() {
    assert_invalid(&header(StorageFormat::Rgba8Unorm, 24, 1, false));
}

#[test]
fn rejects_size_above_4096() {
    assert_invalid(&header(StorageFormat::Rgba8Unorm, 8192, 1, false));
}

#[test]
fn rejects_more_mips_than_the_cube_has() {
    // 16px has five levels down to 1x1
    assert_invalid(&header(StorageFormat::Rgba8Unorm, 16, 6, false));
    assert_invalid(&header(StorageFormat::Rgba8Unorm, 16, 40, false));
}

#[test]
fn rejects_param_count_that_differs_from_mip_count() {
    let mut short = header(StorageFormat::Rgba8Unorm, 16, 3, false);
    short.params.pop();
    assert_invalid(&short);

    let mut long = header(StorageFormat::Rgba8Unorm, 16, 3, false);
    long.params.push(1.0);
    assert_invalid(&long);
}

#[test]
fn header_validation_accepts_a_full_chain() {
    assert!(header(StorageFormat::Rgba8Unorm, 16, 5, false).validate().is_ok());
    assert!(header(StorageFormat::Rgba8Unorm, 4096, 6, false).validate().is_ok());
}

#[test]
fn write_face_rejects_wrong_length_and_mip() {
    let mut builder = AssetBuilder::new(header(StorageFormat::Rgba16Float, 8, 2, false));
    assert!(builder.write_face(CubeFace::PositiveY, 0, vec![0; 3]).is_err());
    assert!(builder.write_face(CubeFace::PositiveY, 2, vec![0; 8]).is_err());
    assert!(builder.write_face(CubeFace::PositiveY, 1, vec![0; 4 * 4 * 8]).is_ok());
}

// ============================================================================
// Linear Decoding
// ============================================================================

#[test]
fn srgb_bytes_decode_to_linear() {
    let mut builder = AssetBuilder::new(header(StorageFormat::Rgba8Unorm, 1, 1, true));
    for face in CubeFace::ALL {
        builder.write_face(face, 0, vec![255, 188, 0, 255]).unwrap();
    }
    let level = builder.finalize_unsmoothed().decode_linear_level(0).unwrap();
    let c = level[0][0];
    assert!((c.x - 1.0).abs() < 1e-6);
    assert!((c.y - 0.5).abs() < 0.01);
    assert_eq!(c.z, 0.0);
    assert_eq!(c.w, 1.0);
}

#[test]
fn bgra_is_swizzled_and_missing_alpha_is_one() {
    let mut bgra = AssetBuilder::new(header(StorageFormat::Bgra8Unorm, 1, 1, false));
    let mut rg = AssetBuilder::new(header(StorageFormat::Rg8Unorm, 1, 1, false));
    for face in CubeFace::ALL {
        bgra.write_face(face, 0, vec![0, 0, 255, 255]).unwrap();
        rg.write_face(face, 0, vec![255, 0]).unwrap();
    }

    let red = bgra.finalize_unsmoothed().decode_linear_level(0).unwrap()[3][0];
    assert_eq!(red, Vec4::new(1.0, 0.0, 0.0, 1.0));
    let red = rg.finalize_unsmoothed().decode_linear_level(0).unwrap()[3][0];
    assert_eq!(red, Vec4::new(1.0, 0.0, 0.0, 1.0));
}

// ============================================================================
// BRDF LUT
// ============================================================================

#[test]
fn brdf_lut_round_trips_through_exr() {
    let size = 4;
    let floats: Vec<f32> = (0..size * size)
        .flat_map(|i| [i as f32 / 16.0, 1.0 - i as f32 / 16.0, 0.0, 1.0])
        .collect();
    let lut = BrdfLut::from_rgba32f_bytes(size, bytemuck::cast_slice(&floats)).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ggx_brdf.exr");
    lut.save(&path).unwrap();

    let loaded = BrdfLut::load(&path).unwrap();
    assert_eq!(loaded.size(), size);
    assert_eq!(loaded.texel(3, 2), lut.texel(3, 2));
    assert_eq!(loaded.texel(3, 2), Some(Vec4::new(11.0 / 16.0, 5.0 / 16.0, 0.0, 1.0)));
}

#[test]
fn brdf_lut_texel_outside_the_texture_is_none() {
    let lut = BrdfLut::from_rgba32f_bytes(2, &[0; 2 * 2 * 16]).unwrap();
    assert!(lut.texel(1, 1).is_some());
    assert_eq!(lut.texel(2, 0), None);
    assert_eq!(lut.texel(0, 2), None);
    // would alias (0, 1) with a flat index
    assert_eq!(lut.texel(3, 0), None);
}

#[test]
fn brdf_lut_rejects_short_readback() {
    assert!(matches!(
        BrdfLut::from_rgba32f_bytes(2, &[0; 16]),
        Err(PrefilterError::InvalidAsset(_))
    ));
}
