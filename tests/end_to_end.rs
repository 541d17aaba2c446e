use std::io::Write;

use roi_occupancy::{
    load_tracking_table, regions, CancelToken, FrameRange, GeometryStore, NoProgress, Policy,
    Segment, SegmentAggregator, Size, SpaceMapping, TrackingMode, VideoFile,
};
use tempfile::NamedTempFile;

/// Ten frames: `nose` at x=25 for frames 0-4, x=75 for 5-9. `tail` is never
/// detected.
fn tracking_file() -> NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(".csv")
        .tempfile()
        .expect("temp tracking file");
    let mut csv = String::from(
        "scorer,net,net,net,net,net,net\n\
         bodyparts,nose,nose,nose,tail,tail,tail\n\
         coords,x,y,likelihood,x,y,likelihood\n",
    );
    for frame in 0..10 {
        let x = if frame < 5 { 25.0 } else { 75.0 };
        csv.push_str(&format!("{frame},{x},50.0,0.999,,,\n"));
    }
    file.write_all(csv.as_bytes()).expect("write tracking file");
    file
}

fn left_half() -> GeometryStore {
    let mut store = GeometryStore::new();
    regions::load_into(
        &mut store,
        r#"{"left_half": [[0, 0], [50, 0], [50, 100], [0, 100]]}"#,
    )
    .expect("regions");
    store
}

fn run(mode: TrackingMode, video: &str, canvas: Size) -> roi_occupancy::RegionTimes {
    let tracking = tracking_file();
    let table = load_tracking_table(tracking.path()).expect("load table");
    let meta = VideoFile::open(video).expect("open video").metadata();
    let policy = Policy::new(mode);
    let segment = Segment {
        range: FrameRange::new(0, 9).unwrap(),
        policy: &policy,
        mapping: SpaceMapping::new(meta.size(), canvas).unwrap(),
        frame_duration: meta.frame_duration(),
    };
    SegmentAggregator::new()
        .run(&table, &left_half(), &segment, &mut NoProgress, &CancelToken::new())
        .expect("run")
}

const VIDEO: &str = "stub://arena?fps=10&frames=10&width=100&height=100";

#[test]
fn majority_at_full_share_counts_first_half() {
    let times = run(
        TrackingMode::majority_from_percentage(100.0).unwrap(),
        VIDEO,
        Size::new(100.0, 100.0),
    );
    // the undetected tail still counts toward the denominator
    assert_eq!(times.seconds("left_half"), Some(0.0));

    let tracking = tracking_file();
    let table = load_tracking_table(tracking.path()).unwrap();
    let policy = Policy::new(TrackingMode::Majority { percent: 0.5 });
    let segment = Segment {
        range: FrameRange::new(0, 9).unwrap(),
        policy: &policy,
        mapping: SpaceMapping::identity(),
        frame_duration: 0.1,
    };
    let times = SegmentAggregator::new()
        .run(&table, &left_half(), &segment, &mut NoProgress, &CancelToken::new())
        .unwrap();
    assert!((times.seconds("left_half").unwrap() - 0.5).abs() < 1e-9);
}

#[test]
fn single_tracked_part_majority_is_half_a_second() {
    let tracking = tracking_file();
    let full = load_tracking_table(tracking.path()).unwrap();

    // Same data with the nose as the only tracked part.
    let mut table = roi_occupancy::KeypointTable::new(&["nose"]).unwrap();
    for &frame in full.frames() {
        use roi_occupancy::FrameSource;
        table
            .push_frame(frame, vec![full.sample(frame, "nose").unwrap()])
            .unwrap();
    }
    let policy = Policy::new(TrackingMode::Majority { percent: 1.0 });
    let segment = Segment {
        range: FrameRange::new(0, 9).unwrap(),
        policy: &policy,
        mapping: SpaceMapping::identity(),
        frame_duration: 1.0 / 10.0,
    };
    let times = SegmentAggregator::new()
        .run(&table, &left_half(), &segment, &mut NoProgress, &CancelToken::new())
        .unwrap();
    assert!((times.seconds("left_half").unwrap() - 0.5).abs() < 1e-9);
    assert_eq!(times.frames("left_half"), Some(5));
}

#[test]
fn specific_part_never_detected_gives_zero_without_error() {
    let times = run(
        TrackingMode::Specific {
            body_part: "tail".to_string(),
        },
        VIDEO,
        Size::new(100.0, 100.0),
    );
    assert_eq!(times.seconds("left_half"), Some(0.0));

    let times = run(
        TrackingMode::Specific {
            body_part: "whisker".to_string(),
        },
        VIDEO,
        Size::new(100.0, 100.0),
    );
    assert_eq!(times.seconds("left_half"), Some(0.0));
}

#[test]
fn any_part_uses_confident_samples() {
    let times = run(TrackingMode::AnyPart, VIDEO, Size::new(100.0, 100.0));
    assert!((times.seconds("left_half").unwrap() - 0.5).abs() < 1e-9);
}

#[test]
fn keypoints_are_mapped_into_canvas_space() {
    // Keypoints are in a 100x100 video; regions drawn on a 200x200 canvas
    // cover x in [0, 50) of canvas space, which is x in [0, 25) of video space.
    let times = run(TrackingMode::AnyPart, VIDEO, Size::new(200.0, 200.0));
    assert_eq!(times.seconds("left_half"), Some(0.0));
}

#[test]
fn every_region_is_reported_when_nothing_is_occupied() {
    let tracking = tracking_file();
    let table = load_tracking_table(tracking.path()).unwrap();
    let mut store = left_half();
    regions::load_into(
        &mut store,
        r#"{"far": [[500, 500], [600, 500], [600, 600]], "left_half": [[0, 0], [50, 0], [50, 100]]}"#,
    )
    .unwrap();
    let policy = Policy::new(TrackingMode::Specific {
        body_part: "tail".to_string(),
    });
    let segment = Segment {
        range: FrameRange::new(0, 9).unwrap(),
        policy: &policy,
        mapping: SpaceMapping::identity(),
        frame_duration: 0.1,
    };
    let times = SegmentAggregator::new()
        .run(&table, &store, &segment, &mut NoProgress, &CancelToken::new())
        .unwrap();
    let names: Vec<&str> = times.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, ["left_half", "far"]);
    assert!(times.iter().all(|t| t.seconds == 0.0));
}
