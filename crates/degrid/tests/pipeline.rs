use std::fs;
use std::path::Path;

use degrid::cli::parse_cli_from;
use degrid::run::{ExecutionPlan, execute};
use degrid::settings::resolve_settings;
use degrid::sink::CONCAT_LIST;
use image::{Luma, Rgb, RgbImage, Rgba, RgbaImage};

const SIZE: u32 = 64;
const VERTICAL: [u32; 2] = [14, 41];
const HORIZONTAL: [u32; 2] = [19, 50];

fn on_grid(x: u32, y: u32) -> bool {
    VERTICAL.contains(&x) || HORIZONTAL.contains(&y)
}

fn write_templates(dir: &Path) {
    fs::create_dir_all(dir).unwrap();
    let grid = RgbaImage::from_fn(SIZE, SIZE, |x, y| {
        if on_grid(x, y) {
            Rgba([0, 0, 0, 255])
        } else {
            Rgba([0, 0, 0, 0])
        }
    });
    grid.save(dir.join("mask.5N.png")).unwrap();

    let square = image::GrayImage::from_fn(SIZE, SIZE, |x, y| {
        if (30..36).contains(&x) && (30..36).contains(&y) {
            Luma([255])
        } else {
            Luma([0])
        }
    });
    square.save(dir.join("mask.0N.png")).unwrap();
}

/// Grid burned into a dark scan, displaced by `(dx, dy)`.
fn write_frame(dir: &Path, time: &str, dx: u32, dy: u32, text: Option<&str>) {
    let image = RgbImage::from_fn(SIZE, SIZE, |x, y| {
        let shifted = x >= dx && y >= dy && on_grid(x - dx, y - dy);
        if shifted {
            Rgb([230, 230, 230])
        } else {
            Rgb([40, 40, 40])
        }
    });
    let stem = format!("32A.1977.001.{time}.VS");
    image.save(dir.join(format!("{stem}.png"))).unwrap();
    if let Some(text) = text {
        let sidecar = format!(
            r#"{{"readResult": {{"blocks": [{{"lines": [{{"text": "{text}", "boundingBox": [0, 0, 1, 1]}}]}}]}}}}"#
        );
        fs::write(dir.join(format!("{stem}.json")), sidecar).unwrap();
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn heals_a_directory_of_frames_in_capture_order() {
    let root = tempfile::tempdir().unwrap();
    let templates = root.path().join("templates");
    let frames = root.path().join("frames");
    let output = root.path().join("out");
    let config = root.path().join("degrid.toml");
    write_templates(&templates);
    fs::create_dir_all(frames.join("nested")).unwrap();
    fs::write(&config, "").unwrap();

    write_frame(&frames, "120000", 3, 2, Some("5n 1977"));
    write_frame(&frames.join("nested"), "110000", 1, 1, Some("5N"));
    write_frame(&frames, "130000", 2, 2, None);
    fs::write(frames.join("notes.txt"), "not a frame").unwrap();

    let path = |p: &Path| p.to_string_lossy().into_owned();
    let (cli, sources) = parse_cli_from([
        "degrid".to_string(),
        "--config".into(),
        path(&config),
        "--templates".into(),
        path(&templates),
        "--output".into(),
        path(&output),
        "--max-angle".into(),
        "0".into(),
        "--min-score".into(),
        "1".into(),
        "--inpaint".into(),
        "neighbor-fill".into(),
        "--workers".into(),
        "2".into(),
        path(&frames),
    ]);
    let settings = resolve_settings(&cli, &sources).unwrap().settings;

    let summary = execute(ExecutionPlan {
        settings,
        input: frames.clone(),
        interactive: false,
    })
    .await
    .unwrap();

    assert_eq!(summary.processed, 2);
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.low_confidence, 0);
    assert!(!summary.cancelled);

    let first = output.join("32A.1977.001.110000.VS");
    for name in [
        "aligned_with_grid.png",
        "artifact_marked.png",
        "filled_neighbor-fill.png",
        "alignment.json",
    ] {
        assert!(first.join(name).is_file(), "missing {name}");
    }
    let record: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(first.join("alignment.json")).unwrap()).unwrap();
    assert_eq!(record["label"], "5N");
    assert!((record["dx"].as_f64().unwrap() - 1.0).abs() < 0.5);
    assert!((record["dy"].as_f64().unwrap() - 1.0).abs() < 0.5);

    let second: serde_json::Value = serde_json::from_str(
        &fs::read_to_string(output.join("32A.1977.001.120000.VS").join("alignment.json")).unwrap(),
    )
    .unwrap();
    assert!((second["dx"].as_f64().unwrap() - 3.0).abs() < 0.5);
    assert!((second["dy"].as_f64().unwrap() - 2.0).abs() < 0.5);
    assert!(!output.join("32A.1977.001.130000.VS").exists());

    let filled = image::open(first.join("filled_neighbor-fill.png"))
        .unwrap()
        .to_rgb8();
    let on_line = filled.get_pixel(VERTICAL[0], 30).0[0];
    assert!(on_line < 60, "grid line survived with level {on_line}");

    let sequence = output.join("sequence");
    let list = fs::read_to_string(sequence.join(CONCAT_LIST)).unwrap();
    assert_eq!(
        list,
        "ffconcat version 1.0\nfile 'frame_000001.png'\nfile 'frame_000002.png'\n"
    );
    let sequence_first = image::open(sequence.join("frame_000001.png"))
        .unwrap()
        .to_rgb8();
    assert_eq!(&sequence_first, &filled);
}

#[tokio::test]
async fn missing_templates_abort_before_any_frame() {
    let root = tempfile::tempdir().unwrap();
    let frames = root.path().join("frames");
    fs::create_dir_all(&frames).unwrap();
    write_frame(&frames, "120000", 0, 0, Some("5N"));
    let config = root.path().join("degrid.toml");
    fs::write(&config, "").unwrap();
    let output = root.path().join("out");

    let (cli, sources) = parse_cli_from([
        "degrid".to_string(),
        "--config".into(),
        config.to_string_lossy().into_owned(),
        "--templates".into(),
        root.path().join("absent").to_string_lossy().into_owned(),
        "--output".into(),
        output.to_string_lossy().into_owned(),
    ]);
    let settings = resolve_settings(&cli, &sources).unwrap().settings;

    let result = execute(ExecutionPlan {
        settings,
        input: frames,
        interactive: false,
    })
    .await;
    assert!(result.is_err());
    assert!(!output.join("sequence").exists());
}
