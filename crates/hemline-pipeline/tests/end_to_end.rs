//! Integration test: synthetic garment photographs through the full pipeline.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use hemline_pipeline::{
    AnalysisResult, ErrorKind, PipelineConfig, PipelineError, ReferenceTables, RgbImage, analyze,
    analyze_tagged,
};

/// Canonical size equal to the synthetic inputs, so resizing is a copy.
fn config() -> PipelineConfig {
    PipelineConfig {
        canonical_width: 120,
        canonical_height: 140,
        ..PipelineConfig::default()
    }
}

#[test]
fn solid_red_is_named_red() {
    let tables = ReferenceTables::builtin().unwrap();
    let image = RgbImage::from_pixel(120, 140, image::Rgb([255, 0, 0]));
    // A zero margin makes the prior rectangle cover the whole canvas.
    let config = PipelineConfig {
        rect_margin: 0,
        ..config()
    };

    let AnalysisResult {
        dominant_rgb,
        color_name,
        family_name,
    } = analyze(image, &tables, &config).expect("pipeline should succeed");
    eprintln!("solid red -> {dominant_rgb} {color_name:?} ({family_name})");

    assert!(dominant_rgb.r >= 250, "{dominant_rgb}");
    assert!(dominant_rgb.g < 40 && dominant_rgb.b < 40, "{dominant_rgb}");
    assert_eq!(color_name, "red 1 (red*)");
    assert_eq!(family_name, "red");
}

#[test]
fn nearly_black_image_is_empty_sample() {
    let tables = ReferenceTables::builtin().unwrap();
    let image = RgbImage::from_pixel(120, 140, image::Rgb([0, 0, 0]));
    // One tile over the whole canvas keeps equalized black at value 1.
    let config = PipelineConfig {
        tile_columns: 1,
        tile_rows: 1,
        ..config()
    };

    let result = analyze(image, &tables, &config);
    assert!(
        matches!(result, Err(PipelineError::EmptySample)),
        "expected EmptySample, got {result:?}"
    );
}

#[test]
fn image_smaller_than_margin_does_not_crash() {
    let tables = ReferenceTables::builtin().unwrap();
    let image = RgbImage::from_fn(5, 7, |x, y| {
        image::Rgb([200, 40 + 10 * x as u8, 30 + 5 * y as u8])
    });
    let config = PipelineConfig {
        canonical_width: 16,
        canonical_height: 16,
        rect_margin: 10,
        ..PipelineConfig::default()
    };

    let result = analyze(image, &tables, &config).expect("clamped rectangle should succeed");
    assert!(!result.color_name.is_empty());
    assert_eq!(
        tables.families().family_of(&result.color_name).unwrap(),
        result.family_name
    );
}

#[test]
fn garment_color_wins_over_backdrop() {
    let tables = ReferenceTables::builtin().unwrap();
    // A navy garment filling most of the frame on a light gray backdrop.
    let image = RgbImage::from_fn(120, 140, |x, y| {
        if (20..100).contains(&x) && (20..125).contains(&y) {
            image::Rgb([25, 35, 110])
        } else {
            image::Rgb([215, 215, 210])
        }
    });

    let result = analyze(image, &tables, &config()).expect("pipeline should succeed");
    eprintln!(
        "navy garment -> {} {:?} ({})",
        result.dominant_rgb, result.color_name, result.family_name
    );
    let rgb = result.dominant_rgb;
    assert!(u16::from(rgb.b) > u16::from(rgb.r) + 40, "{rgb}");
    assert!(rgb.b > rgb.g, "{rgb}");
}

#[test]
fn analysis_is_deterministic() {
    let tables = ReferenceTables::builtin().unwrap();
    let image = RgbImage::from_fn(120, 140, |x, y| {
        image::Rgb([(x * 2) as u8, 90, (y + 60) as u8])
    });
    let first = analyze(image.clone(), &tables, &config()).unwrap();
    let second = analyze(image, &tables, &config()).unwrap();
    assert_eq!(first, second);
}

#[test]
fn failures_are_isolated_per_image() {
    let tables = ReferenceTables::builtin().unwrap();
    let config = PipelineConfig {
        rect_margin: 0,
        ..config()
    };
    let inputs = vec![
        ("red.png", RgbImage::from_pixel(120, 140, image::Rgb([255, 0, 0]))),
        ("empty.png", RgbImage::new(0, 0)),
        ("green.png", RgbImage::from_pixel(120, 140, image::Rgb([0, 160, 0]))),
    ];

    // The tables are shared read-only across threads.
    let results: Vec<_> = std::thread::scope(|scope| {
        let handles: Vec<_> = inputs
            .into_iter()
            .map(|(id, image)| {
                let tables = &tables;
                let config = &config;
                scope.spawn(move || analyze_tagged(id, image, tables, config))
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(results[0].as_ref().unwrap().family_name, "red");
    let failure = results[1].as_ref().unwrap_err();
    assert_eq!(failure.image_id, "empty.png");
    assert_eq!(failure.error.kind(), ErrorKind::InvalidImage);
    assert!(results[2].is_ok());
}
