//! Integration tests against real files under Cargo's per-target
//! scratch directory.

#![allow(clippy::unwrap_used)]

use std::fs;
use std::path::PathBuf;

use lanesight_io::{CsvLogSink, FrameDirectory, GroundTruthFile, IoError, load_config};
use lanesight_pipeline::{
    GroundTruthSource, LaneConfig, LanePipeline, RgbaImage, TickOutcome, ValidationRecord,
    ValidationSink,
};

fn scratch(name: &str) -> PathBuf {
    let dir = PathBuf::from(env!("CARGO_TARGET_TMPDIR")).join(name);
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).unwrap();
    dir
}

fn solid(shade: u8) -> RgbaImage {
    RgbaImage::from_pixel(8, 6, image::Rgba([shade, shade, shade, 255]))
}

#[test]
fn frame_directory_replays_in_name_order() {
    let dir = scratch("frames_order");
    solid(30).save(dir.join("frame_002.png")).unwrap();
    solid(10).save(dir.join("frame_000.png")).unwrap();
    solid(20).save(dir.join("frame_001.png")).unwrap();
    fs::write(dir.join("README.txt"), "not a frame").unwrap();

    let frames = FrameDirectory::open(&dir, 20.0).unwrap();
    assert_eq!(frames.len(), 3);
    let loaded: Vec<_> = frames.frames().map(Result::unwrap).collect();
    let ids: Vec<u64> = loaded.iter().map(|f| f.frame_id).collect();
    assert_eq!(ids, vec![0, 1, 2]);
    let shades: Vec<u8> = loaded.iter().map(|f| f.image.get_pixel(0, 0).0[0]).collect();
    assert_eq!(shades, vec![10, 20, 30]);
    assert!((loaded[2].timestamp - 0.1).abs() < 1e-12);
    assert!(frames.load(3).is_none());
}

#[test]
fn directory_without_images_is_rejected() {
    let dir = scratch("frames_empty");
    fs::write(dir.join("notes.txt"), "nothing").unwrap();
    assert!(matches!(
        FrameDirectory::open(&dir, 20.0),
        Err(IoError::NoFrames(_))
    ));
}

#[test]
fn corrupt_frame_surfaces_an_image_error() {
    let dir = scratch("frames_corrupt");
    fs::write(dir.join("frame_000.png"), [0xFF, 0x00, 0x12]).unwrap();
    let frames = FrameDirectory::open(&dir, 20.0).unwrap();
    assert!(matches!(frames.load(0), Some(Err(IoError::Image { .. }))));
}

#[test]
fn csv_sink_writes_header_rows_and_summary() {
    let dir = scratch("csv_sink").join("nested");
    let mut sink = CsvLogSink::create(&dir).unwrap();
    let record = ValidationRecord {
        frame_id: 12,
        timestamp: 0.6,
        pixel_error: 2.5,
        threshold: 30.0,
        passed: true,
    };
    sink.append(&record).unwrap();
    sink.append(&ValidationRecord {
        frame_id: 13,
        passed: false,
        pixel_error: 31.0,
        ..record
    })
    .unwrap();
    sink.finalize().unwrap();
    assert_eq!(sink.rows(), 2);

    let text = fs::read_to_string(sink.path()).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines[0], lanesight_export::header());
    assert_eq!(lanesight_export::parse_row(lines[1]).unwrap(), record);
    assert!(lines[2].ends_with("false"));
    assert_eq!(lines.len(), 3);
}

#[test]
fn empty_run_still_leaves_a_header() {
    let dir = scratch("csv_empty");
    let mut sink = CsvLogSink::create(&dir).unwrap();
    sink.finalize().unwrap();
    let text = fs::read_to_string(dir.join(lanesight_io::sink::LOG_FILE_NAME)).unwrap();
    assert_eq!(text, format!("{}\n", lanesight_export::header()));
}

#[test]
fn config_file_round_trip() {
    let dir = scratch("config_file");
    let path = dir.join("lanesight.json");
    let mut config = LaneConfig::default();
    config.tracking.alpha = 0.5;
    config.bev.enabled = true;
    fs::write(&path, serde_json::to_string_pretty(&config).unwrap()).unwrap();

    let loaded = load_config(&path).unwrap();
    assert_eq!(loaded.into_inner(), config);
}

#[test]
fn ground_truth_file_drives_validation_into_csv() {
    let dir = scratch("end_to_end");
    let truth_path = dir.join("truth.json");
    fs::write(
        &truth_path,
        r#"[{ "frame_id": 3,
              "left":  { "line": { "slope": -1.0, "intercept": 700.0 } },
              "right": { "line": { "slope": 1.0, "intercept": 500.0 } } }]"#,
    )
    .unwrap();
    let truth = GroundTruthFile::load(&truth_path).unwrap();
    assert!(truth.sample(3).is_some());

    let mut edges = lanesight_pipeline::GrayImage::new(1280, 720);
    for y in 440..=700_u32 {
        edges.put_pixel(700 - y, y, image::Luma([255]));
        edges.put_pixel(y + 500, y, image::Luma([255]));
    }

    let mut config = LaneConfig::default();
    config.validation.output_dir = dir.join("validation");
    config.validation.num_captures = 2;
    let mut pipeline = LanePipeline::new(config.validate().unwrap());
    let mut engine = pipeline.validation_engine();
    let mut sink = CsvLogSink::create(&pipeline.config().validation.output_dir).unwrap();

    // Frame 3 has ground truth, frame 4 does not.
    pipeline.process_edges(&edges, 3, 5.0).unwrap();
    let first = engine.poll(5.0, pipeline.state(), &truth, &mut sink).unwrap();
    assert!(matches!(first, Some(TickOutcome::Recorded(_))));
    pipeline.process_edges(&edges, 4, 15.0).unwrap();
    let second = engine.poll(15.0, pipeline.state(), &truth, &mut sink).unwrap();
    assert!(matches!(second, Some(TickOutcome::Skipped { frame_id: 4 })));
    assert!(engine.is_finished());
    sink.write_summary(&engine.summary()).unwrap();

    let text = fs::read_to_string(dir.join("validation").join("validation_log.csv")).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 3);
    let row = lanesight_export::parse_row(lines[1]).unwrap();
    assert_eq!(row.frame_id, 3);
    assert!(row.passed);
    assert!(lines[2].starts_with("# captures=2 passed=1 failed=0 skipped=1"));
}

#[test]
fn debug_stages_are_written_as_png() {
    let dir = scratch("debug_stages");
    let mut config = LaneConfig::default();
    config.image.width = 64;
    config.image.height = 36;
    let mut pipeline = LanePipeline::new(config.validate().unwrap());
    let frame = lanesight_pipeline::Frame::new(solid(100), 5, 0.25);
    let staged = pipeline.process_staged(&frame).unwrap();

    let paths = lanesight_io::debug::write_stages(&dir, &staged).unwrap();
    assert_eq!(paths.len(), 3);
    for path in &paths {
        let img = image::open(path).unwrap();
        assert_eq!((img.width(), img.height()), (64, 36));
    }
    assert!(paths[1].ends_with("000005_edges.png"));
}
