//! Clipforge CLI: caption burn-in, trimming, conversion and audio tools.
//!
//! Usage:
//!   clipforge burn <INPUT> --cues <JSON>     Burn captions into a video
//!   clipforge trim <INPUT> --start --end     Keep a time range of a video
//!   clipforge convert <INPUT> --to <EXT>     Re-encode into another container
//!   clipforge wav <INPUT>                    Decode audio into a WAV file
//!   clipforge mp3 <INPUT>                    Encode audio as MP3
//!   clipforge concat <INPUTS>...             Join audio files end to end
//!   clipforge peaks <INPUT>                  Waveform peak envelope as JSON
//!   clipforge check                          Check encoder capabilities

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use clipforge_common::config::AppConfig;
use clipforge_common::error::ClipforgeError;

mod commands;

#[derive(Parser)]
#[command(
    name = "clipforge",
    about = "Caption burn-in, trimming, conversion and audio processing",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Burn captions permanently into a video
    Burn {
        /// Source video
        input: PathBuf,

        /// Cue list (JSON array of {id, startTime, endTime, text})
        #[arg(long)]
        cues: PathBuf,

        /// Caption style (JSON); defaults apply to missing fields
        #[arg(long)]
        style: Option<PathBuf>,

        /// Output file path
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Keep audio audible while rendering
        #[arg(long)]
        monitor: bool,
    },

    /// Keep only a time range of a video
    Trim {
        /// Source video
        input: PathBuf,

        /// Range start (seconds)
        #[arg(long)]
        start: f64,

        /// Range end (seconds)
        #[arg(long)]
        end: f64,

        /// Output file path
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Re-encode into the container family of a file extension
    Convert {
        /// Source media
        input: PathBuf,

        /// Target extension (mp4, webm, mkv, weba, ogg, m4a, ...)
        #[arg(long)]
        to: String,

        /// Optional range start (seconds)
        #[arg(long, requires = "end")]
        start: Option<f64>,

        /// Optional range end (seconds)
        #[arg(long, requires = "start")]
        end: Option<f64>,

        /// Output file path
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Decode audio into a 16-bit WAV file
    Wav {
        /// Source media
        input: PathBuf,

        /// Optional range start (seconds)
        #[arg(long, requires = "end")]
        start: Option<f64>,

        /// Optional range end (seconds)
        #[arg(long, requires = "start")]
        end: Option<f64>,

        /// Output file path
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Encode audio as MP3
    Mp3 {
        /// Source media
        input: PathBuf,

        /// Bitrate in kbps (defaults to the configured audio bitrate)
        #[arg(long)]
        bitrate: Option<u32>,

        /// Output file path
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Join audio files end to end into one stereo WAV
    Concat {
        /// Source files, in playback order
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Output file path
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Compute a waveform peak envelope
    Peaks {
        /// Source media
        input: PathBuf,

        /// Number of buckets (defaults to the configured resolution)
        #[arg(long)]
        buckets: Option<usize>,

        /// Channel index
        #[arg(long, default_value = "0")]
        channel: usize,

        /// Write JSON here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Check encoder capabilities
    Check,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let mut config = AppConfig::load();

    if cli.verbose {
        config.logging.level = "debug".to_string();
    }
    if cli.json_logs {
        config.logging.json = true;
    }
    clipforge_common::logging::init_logging(&config.logging);

    let defaults = config.encoding;
    let result = match cli.command {
        Commands::Burn {
            input,
            cues,
            style,
            output,
            monitor,
        } => commands::encode::burn(input, cues, style, output, monitor, &defaults).await,
        Commands::Trim {
            input,
            start,
            end,
            output,
        } => commands::encode::trim(input, start, end, output, &defaults).await,
        Commands::Convert {
            input,
            to,
            start,
            end,
            output,
        } => {
            let range = start.zip(end);
            commands::encode::convert(input, to, range, output, &defaults).await
        }
        Commands::Wav {
            input,
            start,
            end,
            output,
        } => commands::audio::wav(input, start.zip(end), output),
        Commands::Mp3 {
            input,
            bitrate,
            output,
        } => commands::audio::mp3(input, bitrate, output, &defaults),
        Commands::Concat { inputs, output } => commands::audio::concat(inputs, output, &defaults),
        Commands::Peaks {
            input,
            buckets,
            channel,
            output,
        } => commands::audio::peaks(input, buckets, channel, output, &defaults),
        Commands::Check => commands::check::run(),
    };

    if let Err(e) = result {
        match e.downcast_ref::<ClipforgeError>() {
            Some(err) => {
                tracing::error!(error = %err, "Command failed");
                eprintln!("Error: {}", err.user_message());
            }
            None => eprintln!("Error: {e:#}"),
        }
        std::process::exit(1);
    }
}
