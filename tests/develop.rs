use rawdev::demosaic::BORDER;
use rawdev::extract::extract;
use rawdev::frame::RawFrame;
use rawdev::pipeline::Pipeline;
use rawdev::{develop, DevelopError, DevelopedImage, ErrorKind, PipelineOptions, Tags};

fn frame_tags(width: u32, height: u32) -> Tags {
    Tags::new()
        .with("ImageWidth", width)
        .with("ImageLength", height)
        .with("BitsPerSample", 16u32)
        .with("CFAPattern", "RGGB")
        .with("BlackLevel", 0u32)
        .with("WhiteLevel", 1000u32)
        .with("ColorMatrix1", vec![0.8198, -0.2505, -0.0554, -0.4488, 1.1849, 0.2949, -0.0694, 0.1612, 0.7455])
        .with("ColorMatrix2", vec![1.0405, -0.3755, -0.1270, -0.5461, 1.3787, 0.1793, -0.1040, 0.2015, 0.6785])
        .with("CalibrationIlluminant1", 17u32)
        .with("CalibrationIlluminant2", 21u32)
}

fn noise(len: usize) -> Vec<u16> {
    let mut state = 0x9e3779b9u32;
    (0..len)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            (state % 1000) as u16
        })
        .collect()
}

/// Runs everything up to and including demosaicing.
fn demosaiced(tags: &Tags, data: &[u16]) -> DevelopedImage {
    let frame = RawFrame::from_tags(tags, data).unwrap();
    let mut pipeline = Pipeline::new(tags, frame.bits_per_sample, &PipelineOptions::default()).unwrap();
    pipeline.image_modules.clear();
    pipeline.run(extract(&frame).unwrap()).unwrap()
}

#[test]
fn test_uniform_mosaic_demosaics_to_uniform_image() {
    let tags = frame_tags(8, 8);
    let image = demosaiced(&tags, &vec![500u16; 64]);
    assert_eq!(image.data.dim(), (3, 8, 8));
    for c in 0..3 {
        for x in BORDER..8 - BORDER {
            for y in BORDER..8 - BORDER {
                assert_eq!(image.data[[c, x, y]], 0.5);
            }
        }
    }
}

#[test]
fn test_rotated_frame_matches_rotated_output() {
    let (w, h) = (16usize, 12usize);
    let data = noise(w * h);
    let straight = demosaiced(&frame_tags(w as u32, h as u32), &data);
    let rotated = demosaiced(&frame_tags(w as u32, h as u32).with("Orientation", 3u32), &data);

    for c in 0..3 {
        for x in BORDER..w - BORDER {
            for y in BORDER..h - BORDER {
                let a = straight.data[[c, x, y]];
                let b = rotated.data[[c, w - 1 - x, h - 1 - y]];
                assert!((a - b).abs() < 1e-5, "plane {} at ({}, {}): {} vs {}", c, x, y, a, b);
            }
        }
    }
}

#[test]
fn test_unsupported_orientation_passes_through() {
    let (w, h) = (10usize, 10usize);
    let data = noise(w * h);
    let straight = demosaiced(&frame_tags(w as u32, h as u32), &data);
    let sideways = demosaiced(&frame_tags(w as u32, h as u32).with("Orientation", 6u32), &data);
    assert_eq!(straight, sideways);
}

#[test]
fn test_full_develop() {
    let (w, h) = (16u32, 16u32);
    let data = noise((w * h) as usize);
    let options = PipelineOptions {
        wavelet_denoise_enabled: true,
        sharpen_enabled: true,
        color_enhancement_enabled: true,
        hist_eq_enabled: true,
        auto_white_balance_enabled: true,
        ..Default::default()
    };
    for options in [PipelineOptions::default(), options] {
        let image = develop(&frame_tags(w, h), &data, &options).unwrap();
        assert_eq!(image.data.dim(), (3, 16, 16));
        assert!(image.data.iter().all(|v| v.is_finite() && *v >= 0.0 && *v <= 1.0 + 1e-6));
        assert_eq!(image.to_rgb8().len(), 16 * 16 * 3);
    }
}

#[test]
fn test_active_area_crop() {
    let tags = frame_tags(12, 10).with("ActiveArea", vec![1u32, 1, 9, 11]);
    let image = demosaiced(&tags, &noise(120));
    assert_eq!((image.width(), image.height()), (10, 8));

    let outside = frame_tags(12, 10).with("ActiveArea", vec![0u32, 0, 11, 12]);
    let err = develop(&outside, &noise(120), &PipelineOptions::default()).unwrap_err();
    assert!(matches!(err, DevelopError::InvalidActiveArea { .. }));
}

#[test]
fn test_fatal_configuration_errors() {
    let options = PipelineOptions::default();
    let data = vec![0u16; 64];

    let cases = [
        frame_tags(8, 8).with("BlackLevelRepeatDim", vec![3u32, 3]),
        frame_tags(8, 8).with("WhiteLevel", "bright"),
        frame_tags(8, 8).with("SamplesPerPixel", 3u32),
        frame_tags(8, 8).with("CFAPattern", "RGBE"),
        frame_tags(8, 8).with("ColorMatrix1", vec![1.0; 6]),
    ];
    for tags in cases {
        let err = develop(&tags, &data, &options).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FatalConfig, "{}", err);
    }

    let err = develop(&frame_tags(8, 8), &data[..10], &options).unwrap_err();
    assert!(matches!(err, DevelopError::BufferSize { actual: 10, .. }));

    let invalid = PipelineOptions {
        gain_map_percent: 2.0,
        ..Default::default()
    };
    let err = develop(&frame_tags(8, 8), &data, &invalid).unwrap_err();
    assert!(matches!(err, DevelopError::InvalidOption { .. }));
}

#[test]
fn test_zero_range_is_numeric_error() {
    let tags = frame_tags(8, 8).with("BlackLevel", 1000u32);
    let err = develop(&tags, &vec![0u16; 64], &PipelineOptions::default()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Numeric);
}
