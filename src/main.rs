//! Streamer - supervised RTSP to HLS transcoding.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use streamer::config::ConfigLoader;
use streamer::display;
use streamer::stream::{self, StreamOutcome, StreamSpec};

#[derive(Parser)]
#[command(
    name = "streamer",
    about = "Supervised RTSP to HLS transcoding with ffmpeg",
    version
)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Transcode a source into a segmented HLS directory.
    Run {
        /// RTSP URI or local file to transcode.
        source: String,
        /// Directory for the playlist and segment files.
        #[arg(short, long)]
        output: PathBuf,
        /// Keep segment files after the stream stops.
        #[arg(long)]
        keep_files: bool,
        /// Drop the audio track.
        #[arg(long)]
        no_audio: bool,
        /// Seconds to wait for the stream to start serving.
        #[arg(long)]
        startup_timeout: Option<u64>,
        /// Path to a configuration file.
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

fn init_tracing(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Run {
            source,
            output,
            keep_files,
            no_audio,
            startup_timeout,
            config,
        } => {
            let loader = config.map_or_else(ConfigLoader::new, ConfigLoader::with_path);
            let config = match loader.load() {
                Ok(config) => config,
                Err(err) => {
                    display::print_error(&err.to_string());
                    std::process::exit(2);
                }
            };

            let timeout = startup_timeout.unwrap_or(config.stream.startup_timeout_secs);
            let spec = StreamSpec::new(&source, output)
                .keep_files(keep_files || config.stream.keep_files)
                .audio(!no_audio && config.stream.audio)
                .startup_timeout(Duration::from_secs(timeout))
                .logging(config.logging);

            display::print_stream_starting(&source);
            let handle = match stream::start(spec).await {
                Ok(handle) => handle,
                Err(err) => {
                    display::print_error(&err.to_string());
                    std::process::exit(1);
                }
            };
            display::print_stream_ready(handle.id(), &handle.output_dir().join(stream::PLAYLIST_NAME));

            let result = tokio::select! {
                result = handle.wait() => result,
                _ = tokio::signal::ctrl_c() => handle.stop().await,
            };
            display::print_stream_end(handle.id(), &result);

            if matches!(result.outcome, StreamOutcome::Crashed(_)) {
                std::process::exit(1);
            }
        }
    }
}
