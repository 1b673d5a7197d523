//! Format Negotiation Tests
//!
//! Tests for:
//! - convert_storage_format over every render format
//! - Canonical-name equivalence between the two enumerations
//! - Texel encoding used when rasterizing into storage layouts

use glam::Vec4;

use envmap_prefilter::errors::PrefilterError;
use envmap_prefilter::resources::format::{
    ComponentType, RenderFormat, StorageFormat, convert_storage_format,
};

// ============================================================================
// Canonical Mappings
// ============================================================================

#[test]
fn canonical_four_channel_formats_map_directly() {
    assert_eq!(
        convert_storage_format(RenderFormat::Rgba8Unorm).unwrap(),
        StorageFormat::Rgba8Unorm
    );
    assert_eq!(
        convert_storage_format(RenderFormat::Rgba16Float).unwrap(),
        StorageFormat::Rgba16Float
    );
    assert_eq!(
        convert_storage_format(RenderFormat::Rgba32Float).unwrap(),
        StorageFormat::Rgba32Float
    );
}

// ============================================================================
// Totality
// ============================================================================

#[test]
fn every_render_format_maps_or_fails_explicitly() {
    for format in RenderFormat::ALL {
        match convert_storage_format(format) {
            Ok(storage) => {
                assert_eq!(storage.name(), format.name(), "{format:?}");
                assert_eq!(
                    storage.bytes_per_pixel(),
                    format.bytes_per_pixel() as usize,
                    "{format:?}"
                );
            }
            Err(PrefilterError::UnsupportedFormat(rejected)) => {
                assert_eq!(rejected, format);
                assert!(
                    StorageFormat::ALL.iter().all(|s| s.name() != format.name()),
                    "{format:?} has a storage equivalent but was rejected"
                );
            }
            Err(other) => panic!("{format:?}: unexpected error {other}"),
        }
    }
}

#[test]
fn packed_formats_are_unsupported() {
    for format in [RenderFormat::Rgb10a2Unorm, RenderFormat::Rg11b10Ufloat] {
        assert!(matches!(
            convert_storage_format(format),
            Err(PrefilterError::UnsupportedFormat(f)) if f == format
        ));
    }
}

#[test]
fn every_storage_format_is_reachable() {
    for storage in StorageFormat::ALL {
        assert!(
            RenderFormat::ALL
                .iter()
                .any(|f| convert_storage_format(*f).ok() == Some(storage)),
            "{storage:?} is not produced by any render format"
        );
    }
}

#[test]
fn conversion_is_deterministic() {
    for format in RenderFormat::ALL {
        let a = convert_storage_format(format).ok();
        let b = convert_storage_format(format).ok();
        assert_eq!(a, b);
    }
}

// ============================================================================
// Texel Encoding
// ============================================================================

#[test]
fn srgb_encoding_only_applies_to_8bit_formats() {
    let color = Vec4::new(0.5, 0.5, 0.5, 1.0);

    let mut linear = [0u8; 4];
    StorageFormat::Rgba8Unorm.encode_color(color, false, &mut linear);
    let mut srgb = [0u8; 4];
    StorageFormat::Rgba8Unorm.encode_color(color, true, &mut srgb);
    assert_eq!(linear[0], 128);
    assert_eq!(srgb[0], 188);
    assert_eq!(srgb[3], 255);

    let mut a = [0u8; 16];
    let mut b = [0u8; 16];
    StorageFormat::Rgba32Float.encode_color(color, false, &mut a);
    StorageFormat::Rgba32Float.encode_color(color, true, &mut b);
    assert_eq!(a, b);
}

#[test]
fn narrow_formats_keep_leading_channels() {
    let color = Vec4::new(0.25, 0.75, 1.0, 1.0);
    let mut bytes = [0u8; 4];
    StorageFormat::Rg16Float.encode_color(color, false, &mut bytes);
    let decoded = StorageFormat::Rg16Float.decode_texel(&bytes);
    assert_eq!(decoded, Vec4::new(0.25, 0.75, 0.0, 0.0));
    assert_eq!(StorageFormat::Rg16Float.component_type(), ComponentType::Float16);
    assert_eq!(StorageFormat::Rg16Float.channel_count(), 2);
}

#[test]
fn render_formats_deserialize_by_canonical_name() {
    for format in RenderFormat::ALL {
        let json = format!("\"{}\"", format.name());
        let parsed: RenderFormat = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, format);
    }
}
