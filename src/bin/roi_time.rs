//! roi_time - time spent in each region for one video segment

use anyhow::{anyhow, Result};
use clap::{Parser, ValueEnum};
use std::io::IsTerminal;
use std::path::PathBuf;

use roi_occupancy::config::RoiConfig;
use roi_occupancy::keypoints::verify_frames;
use roi_occupancy::{
    load_tracking_table, movement, regions, CancelToken, ExclusionSet, FrameRange, FrameSource,
    GeometryStore, Policy, Segment, SpaceMapping, TrackingMode, VideoFile,
};

#[path = "../ui.rs"]
mod ui;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ModeArg {
    Majority,
    Specific,
    #[value(name = "any_part", alias = "any-part")]
    AnyPart,
}

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Video file (or stub://name?fps=..&frames=..&width=..&height=..).
    #[arg(long)]
    video: String,
    /// Tracking table (.csv or .h5).
    #[arg(long)]
    tracking: PathBuf,
    /// Region JSON file. Repeat to merge several files; shared names are unioned.
    #[arg(long, required = true)]
    regions: Vec<PathBuf>,
    /// First frame of the segment (default 0).
    #[arg(long)]
    start: Option<usize>,
    /// Last frame of the segment, inclusive (default last frame of the video).
    #[arg(long)]
    end: Option<usize>,
    /// Occupancy policy.
    #[arg(long, value_enum, default_value = "majority")]
    mode: ModeArg,
    /// Majority share in percent, 0-100 (default from config).
    #[arg(long)]
    percent: Option<f64>,
    /// Designated body part for specific mode.
    #[arg(long)]
    body_part: Option<String>,
    /// Body part to ignore. Repeatable.
    #[arg(long)]
    exclude: Vec<String>,
    /// Also print a movement summary for this body part.
    #[arg(long, value_name = "PART")]
    movement: Option<String>,
    /// UI mode for stderr progress (auto|plain|pretty)
    #[arg(long, default_value = "auto", value_name = "MODE")]
    ui: String,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let is_tty = std::io::stderr().is_terminal();
    let stdout_is_tty = std::io::stdout().is_terminal();
    let ui = ui::Ui::from_args(Some(&args.ui), is_tty, !stdout_is_tty);
    let cfg = RoiConfig::load()?;

    let mode = match args.mode {
        ModeArg::Majority => TrackingMode::majority_from_percentage(
            args.percent.unwrap_or(cfg.tracking.percent),
        )?,
        ModeArg::Specific => TrackingMode::Specific {
            body_part: args
                .body_part
                .clone()
                .ok_or_else(|| anyhow!("--body-part is required in specific mode"))?,
        },
        ModeArg::AnyPart => TrackingMode::AnyPart,
    };

    let video = {
        let _stage = ui.stage("Open video");
        VideoFile::open(&args.video)?
    };
    let meta = video.metadata();
    let table = {
        let _stage = ui.stage("Load tracking table");
        load_tracking_table(&args.tracking)?
    };
    verify_frames(&table, meta.total_frames);

    let mut store = GeometryStore::new();
    {
        let _stage = ui.stage("Load regions");
        for path in &args.regions {
            regions::load_file(&mut store, path)?;
        }
    }

    let excluded: ExclusionSet = args.exclude.iter().cloned().collect();
    for part in excluded.iter() {
        if !table.body_parts().iter().any(|p| p == part) {
            log::warn!("excluded body part '{}' is not in the tracking table", part);
        }
    }
    let policy = Policy::new(mode)
        .with_exclusions(excluded)
        .with_any_part_confidence(cfg.tracking.any_part_confidence);

    let last_frame = meta.total_frames.saturating_sub(1);
    let range = FrameRange::new(args.start.unwrap_or(0), args.end.unwrap_or(last_frame))?;
    range.check_within(meta.total_frames)?;
    let segment = Segment {
        range,
        policy: &policy,
        mapping: SpaceMapping::new(meta.size(), cfg.canvas)?,
        frame_duration: meta.frame_duration(),
    };

    let cancel = CancelToken::new();
    let handler_token = cancel.clone();
    ctrlc::set_handler(move || {
        handler_token.cancel();
    })
    .expect("error setting Ctrl-C handler");

    let mut progress = ui.progress("Classify frames");
    let times = cfg
        .aggregator()
        .run(&table, &store, &segment, &mut progress, &cancel)?;
    store.record_times(times.pairs());

    println!("mode: {}", policy.mode.name());
    for (name, seconds) in store.time_counters() {
        println!("{}: {:.2} seconds", name, seconds);
    }

    if let Some(part) = &args.movement {
        let summary =
            movement::summarize(&table, part, range, cfg.tracking.movement_confidence)?;
        println!("movement of '{}': {} samples", part, summary.points.len());
        if let Some(bounds) = summary.bounds {
            println!(
                "  bounding box: x {:.1}..{:.1}, y {:.1}..{:.1} (area {:.1})",
                bounds.x_min,
                bounds.x_max,
                bounds.y_min,
                bounds.y_max,
                bounds.area()
            );
        }
        println!("  path length: {:.1}", summary.path_length);
        println!("  area under curve: {:.1}", summary.auc);
    }

    Ok(())
}
