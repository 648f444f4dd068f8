//! Burn-in, trim and convert: render-capture jobs on the ffmpeg host.

use std::io::Write;
use std::path::{Path, PathBuf};

use clipforge_common::cancel::CancelFlag;
use clipforge_common::config::EncodingDefaults;
use clipforge_common::error::ClipforgeError;
use clipforge_media_model::{CaptionStyle, CueTrack};
use clipforge_render_engine::ffmpeg::{FfmpegAudioGraph, FfmpegCapability, FfmpegEncoder, FfmpegSource};
use clipforge_render_engine::raster::RgbaSurface;
use clipforge_render_engine::scheduler::IntervalScheduler;
use clipforge_render_engine::{EncodingJob, JobHost, JobOptions, JobState, Operation};

use super::{default_output, ensure_exists, read_text, write_output};

pub async fn burn(
    input: PathBuf,
    cues: PathBuf,
    style: Option<PathBuf>,
    output: Option<PathBuf>,
    monitor: bool,
    defaults: &EncodingDefaults,
) -> anyhow::Result<()> {
    let cues = CueTrack::from_json(&read_text(&cues)?)
        .map_err(|e| ClipforgeError::config(format!("cue list: {e}")))?;
    let style = match style {
        Some(path) => CaptionStyle::from_json(&read_text(&path)?)
            .map_err(|e| ClipforgeError::config(format!("caption style: {e}")))?,
        None => CaptionStyle::default(),
    };
    for (a, b) in cues.overlaps() {
        tracing::warn!(first = a, second = b, "Cues overlap; the earlier cue is shown");
    }

    println!("Burning {} captions into: {}", cues.len(), input.display());
    let options = JobOptions {
        monitor_audio: monitor,
        ..JobOptions::from(defaults)
    };
    run_job(&input, Operation::BurnIn { cues, style }, output, "captioned", options).await
}

pub async fn trim(
    input: PathBuf,
    start: f64,
    end: f64,
    output: Option<PathBuf>,
    defaults: &EncodingDefaults,
) -> anyhow::Result<()> {
    println!("Trimming {} to [{start:.3}s, {end:.3}s]", input.display());
    let op = Operation::Trim {
        start_secs: start,
        end_secs: end,
    };
    run_job(&input, op, output, "trimmed", JobOptions::from(defaults)).await
}

pub async fn convert(
    input: PathBuf,
    to: String,
    range: Option<(f64, f64)>,
    output: Option<PathBuf>,
    defaults: &EncodingDefaults,
) -> anyhow::Result<()> {
    let target_ext = to.trim_start_matches('.').to_ascii_lowercase();
    println!("Converting {} to .{target_ext}", input.display());
    let op = Operation::Convert { target_ext, range };
    run_job(&input, op, output, "converted", JobOptions::from(defaults)).await
}

async fn run_job(
    input: &Path,
    operation: Operation,
    output: Option<PathBuf>,
    suffix: &str,
    options: JobOptions,
) -> anyhow::Result<()> {
    ensure_exists(input)?;

    let audio_offset = operation.range().map_or(0.0, |(start, _)| start);
    let surface = if matches!(operation, Operation::BurnIn { .. }) {
        RgbaSurface::new(0, 0)
    } else {
        RgbaSurface::without_fonts(0, 0)
    };
    let host = JobHost {
        source: Box::new(FfmpegSource::new(input, options.fps)),
        surface: Box::new(surface),
        encoder: Box::new(FfmpegEncoder::new()),
        audio: Box::new(FfmpegAudioGraph::new(input, audio_offset)),
        capability: Box::new(FfmpegCapability::probe()),
        scheduler: Box::new(IntervalScheduler::new()),
    };

    let cancel = CancelFlag::new();
    let job = EncodingJob::new(operation, host, options).with_cancel_flag(cancel.clone());

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupt received, cancelling");
            cancel.cancel();
        }
    });

    let (mut progress, handle) = job.start();
    while progress.changed().await.is_ok() {
        let p = *progress.borrow_and_update();
        if p.state == JobState::Recording || p.state == JobState::Stopping {
            print!(
                "\r  Progress: {:>3.0}% ({:?}, ~{:.0}s left)   ",
                p.percent, p.state, p.eta_secs
            );
            let _ = std::io::stdout().flush();
        }
    }
    println!();

    let artifact = handle
        .await
        .map_err(|e| anyhow::anyhow!("encoding task failed: {e}"))??;

    let output_path =
        output.unwrap_or_else(|| default_output(input, suffix, artifact.file_extension()));
    write_output(&output_path, &artifact.bytes)?;

    println!(
        "Wrote {} ({}, {} bytes)",
        output_path.display(),
        artifact.mime_type,
        artifact.bytes.len()
    );
    Ok(())
}
