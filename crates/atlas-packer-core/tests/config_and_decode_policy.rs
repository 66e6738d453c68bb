use atlas_packer_core::prelude::*;
use image::{Rgba, RgbaImage};

fn ok_source(key: &str) -> SourceImage {
    SourceImage::from_rgba(key, RgbaImage::from_pixel(4, 4, Rgba([3, 3, 3, 255])))
}

fn broken_source(key: &str) -> SourceImage {
    let k = key.to_string();
    SourceImage::deferred(key, 4, 4, move || {
        Err(AtlasError::Decode {
            key: k,
            reason: "truncated".into(),
        })
    })
}

#[test]
fn defaults_match_documented_values() {
    let cfg = PackerConfig::default();
    assert_eq!((cfg.max_width, cfg.max_height), (1024, 1024));
    assert!(cfg.allow_rotation);
    assert!(cfg.bleed);
    assert_eq!(cfg.bleed_iterations, 2);
    assert_eq!(cfg.extrude, 0);
    assert!(!cfg.trim);
    assert_eq!(cfg.heuristic, MaxRectsHeuristic::BestShortSideFit);
    assert_eq!(cfg.sort_order, SortOrder::AreaDesc);
    assert_eq!(cfg.on_decode_error, DecodeErrorPolicy::Skip);

    let rt = RuntimeConfig::default();
    assert!(!rt.bleed);
    assert_eq!((rt.initial_width, rt.max_width), (256, 2048));
    assert!(rt.validate().is_ok());
}

#[test]
fn validate_rejects_degenerate_configs() {
    let zero = PackerConfig::builder().with_max_dimensions(0, 64).build();
    assert!(matches!(
        zero.validate(),
        Err(AtlasError::InvalidDimensions { width: 0, height: 64 })
    ));
    let border = PackerConfig::builder()
        .with_max_dimensions(16, 16)
        .border_padding(8)
        .build();
    assert!(matches!(border.validate(), Err(AtlasError::InvalidConfig(m)) if m.contains("border_padding")));
    assert!(pack_layout(vec![("a", 1, 1)], border).is_err());
}

#[test]
fn enums_parse_short_and_long_names() {
    assert_eq!("baf".parse::<MaxRectsHeuristic>(), Ok(MaxRectsHeuristic::BestAreaFit));
    assert_eq!("CP".parse::<MaxRectsHeuristic>(), Ok(MaxRectsHeuristic::ContactPoint));
    assert_eq!("best_long_side_fit".parse::<MaxRectsHeuristic>(), Ok(MaxRectsHeuristic::BestLongSideFit));
    assert!("skyline".parse::<MaxRectsHeuristic>().is_err());
    assert_eq!("name_asc".parse::<SortOrder>(), Ok(SortOrder::NameAsc));
    assert_eq!("abort".parse::<DecodeErrorPolicy>(), Ok(DecodeErrorPolicy::Abort));
}

#[test]
fn config_round_trips_through_serde_with_defaults() {
    let cfg: PackerConfig =
        serde_json::from_str(r#"{"max_width": 512, "heuristic": "best_area_fit"}"#).unwrap();
    assert_eq!(cfg.max_width, 512);
    assert_eq!(cfg.max_height, 1024);
    assert_eq!(cfg.heuristic, MaxRectsHeuristic::BestAreaFit);
    let back: PackerConfig = serde_json::from_value(serde_json::to_value(&cfg).unwrap()).unwrap();
    assert_eq!(back, cfg);
}

#[test]
fn skip_policy_drops_unreadable_sources() {
    let inputs = vec![ok_source("a"), broken_source("bad"), ok_source("b")];
    let out = pack_images(inputs, PackerConfig::default()).unwrap();
    assert_eq!(out.skipped, vec!["bad"]);
    assert_eq!(out.pages[0].page.regions.len(), 2);
    assert!(out.region("bad").is_none());
}

#[test]
fn abort_policy_fails_the_run() {
    let cfg = PackerConfig::builder()
        .on_decode_error(DecodeErrorPolicy::Abort)
        .build();
    let inputs = vec![ok_source("a"), broken_source("bad")];
    match pack_images(inputs, cfg) {
        Err(AtlasError::Decode { key, reason }) => {
            assert_eq!(key, "bad");
            assert_eq!(reason, "truncated");
        }
        _ => panic!("expected a decode error"),
    }
}

#[test]
fn size_mismatch_is_treated_like_a_decode_failure() {
    let lying = SourceImage::deferred("liar", 8, 8, || {
        Ok(RgbaImage::from_pixel(4, 4, Rgba([0, 0, 0, 255])))
    });
    let cfg = PackerConfig::builder()
        .on_decode_error(DecodeErrorPolicy::Abort)
        .build();
    assert!(matches!(
        pack_images(vec![lying], cfg),
        Err(AtlasError::DimensionMismatch { expected: (8, 8), actual: (4, 4), .. })
    ));
}

#[test]
fn all_sources_skipped_means_nothing_to_pack() {
    let out = pack_images(vec![broken_source("x")], PackerConfig::default());
    assert!(matches!(out, Err(AtlasError::Empty)));
}

#[test]
fn deferred_sources_decode_lazily() {
    let src = SourceImage::deferred("lazy", 2, 2, || {
        Ok(RgbaImage::from_pixel(2, 2, Rgba([1, 2, 3, 4])))
    });
    assert!(!src.is_loaded());
    assert_eq!((src.width, src.height), (2, 2));
    let loaded = src.load().unwrap();
    assert_eq!(loaded.rgba.get_pixel(1, 1), &Rgba([1, 2, 3, 4]));
    assert!(ok_source("eager").is_loaded());
}
