//! audio-relay: record the microphone to a file, a TCP peer, or both.

mod commands;
mod delegate;

use std::process::ExitCode;

use clap::{Parser, Subcommand};

use commands::RecordArgs;

#[derive(Parser)]
#[command(name = "audio-relay")]
#[command(version, about = "Capture microphone audio to a local file and/or a remote socket")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record until the duration elapses or Enter is pressed
    Record(RecordArgs),

    /// List input devices
    Devices {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Record(args) => commands::record(args),
        Commands::Devices { json } => commands::devices(json),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}
