//! roi_batch - manage saved jobs and process them all at once

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::io::IsTerminal;
use std::path::PathBuf;

use roi_occupancy::config::RoiConfig;
use roi_occupancy::{
    export, regions, BatchRunner, CancelToken, ExclusionSet, FileTableLoader, FileVideoProbe,
    FrameRange, GeometryStore, JobDescriptor, JobStore, RoiError, SqliteJobStore, TrackingMode,
    VideoProbe,
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
    /// Saved-job database (default from config).
    #[arg(long)]
    db_path: Option<String>,
    /// UI mode for stderr progress (auto|plain|pretty)
    #[arg(long, default_value = "auto", value_name = "MODE")]
    ui: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Save a job for later processing.
    Add {
        /// Name shown in listings and in the results file.
        #[arg(long)]
        name: String,
        #[arg(long)]
        video: String,
        #[arg(long)]
        tracking: PathBuf,
        /// Region JSON file. Repeatable; shared names are unioned.
        #[arg(long, required = true)]
        regions: Vec<PathBuf>,
        #[arg(long)]
        start: Option<usize>,
        #[arg(long)]
        end: Option<usize>,
        #[arg(long, value_enum, default_value = "majority")]
        mode: ModeArg,
        /// Majority share in percent, 0-100 (default from config).
        #[arg(long)]
        percent: Option<f64>,
        #[arg(long)]
        body_part: Option<String>,
        #[arg(long)]
        exclude: Vec<String>,
    },
    /// List saved jobs in processing order.
    List,
    /// Delete a saved job by its position in `list`.
    Delete { position: usize },
    /// Process every saved job and write one results CSV.
    Run {
        #[arg(long, default_value = "results.csv")]
        output: PathBuf,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let is_tty = std::io::stderr().is_terminal();
    let stdout_is_tty = std::io::stdout().is_terminal();
    let ui = ui::Ui::from_args(Some(&args.ui), is_tty, !stdout_is_tty);
    let cfg = RoiConfig::load()?;

    let db_path = args.db_path.clone().unwrap_or_else(|| cfg.jobs_db_path.clone());
    let mut store = {
        let _stage = ui.stage("Open job store");
        SqliteJobStore::open(&db_path)?
    };

    match args.command {
        Command::Add {
            name,
            video,
            tracking,
            regions: region_files,
            start,
            end,
            mode,
            percent,
            body_part,
            exclude,
        } => {
            let mode = match mode {
                ModeArg::Majority => {
                    TrackingMode::majority_from_percentage(percent.unwrap_or(cfg.tracking.percent))?
                }
                ModeArg::Specific => TrackingMode::Specific {
                    body_part: body_part
                        .ok_or_else(|| anyhow!("--body-part is required in specific mode"))?,
                },
                ModeArg::AnyPart => TrackingMode::AnyPart,
            };
            let total_frames = FileVideoProbe.probe(&video)?.total_frames;
            let end = end.unwrap_or(total_frames.saturating_sub(1));
            let range = FrameRange::new(start.unwrap_or(0), end)?;
            range.check_within(total_frames)?;
            let mut geometry = GeometryStore::new();
            for path in &region_files {
                regions::load_file(&mut geometry, path)?;
            }
            let excluded: ExclusionSet = exclude.into_iter().collect();
            let job = JobDescriptor::capture(
                &name, &video, &tracking, range, &geometry, excluded, mode,
            )?;
            store.append(&job)?;
            println!("saved job {}: {}", store.len()?, job.summary(None));
        }
        Command::List => {
            let jobs = store.list()?;
            if jobs.is_empty() {
                println!("no saved jobs");
            }
            for (i, job) in jobs.iter().enumerate() {
                let fps = FileVideoProbe.probe(&job.video_path).ok().map(|m| m.fps);
                println!("{}.) {}", i + 1, job.summary(fps));
            }
        }
        Command::Delete { position } => {
            let index = position
                .checked_sub(1)
                .ok_or_else(|| anyhow!("positions start at 1"))?;
            let removed = store.delete(index)?;
            println!("deleted '{}'", removed.name);
        }
        Command::Run { output } => {
            let jobs = store.list()?;
            if jobs.is_empty() {
                return Err(anyhow!("no saved jobs to process"));
            }

            let cancel = CancelToken::new();
            let handler_token = cancel.clone();
            ctrlc::set_handler(move || {
                handler_token.cancel();
            })
            .expect("error setting Ctrl-C handler");

            let runner = BatchRunner::new(&FileTableLoader, &FileVideoProbe, cfg.canvas)
                .with_aggregator(cfg.aggregator())
                .with_any_part_confidence(cfg.tracking.any_part_confidence);
            let mut progress = ui.progress("Process saved jobs");
            let report = match runner.run(&jobs, &mut progress, &cancel) {
                Err(RoiError::Cancelled) => return Err(anyhow!("batch cancelled, nothing written")),
                other => other?,
            };

            for skipped in &report.skipped {
                eprintln!(
                    "skipped {}.) {}: {}",
                    skipped.index + 1,
                    skipped.name,
                    skipped.reason
                );
            }
            if report.rows.is_empty() {
                return Err(anyhow!("no job could be processed"));
            }
            {
                let _stage = ui.stage("Write results");
                export::write_file(&output, &report.rows)?;
            }
            println!(
                "{} of {} jobs written to {}",
                report.rows.len(),
                jobs.len(),
                output.display()
            );
        }
    }

    Ok(())
}
