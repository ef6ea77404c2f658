//! Print a container's parameters and count its frames by reading to the end.

use std::path::PathBuf;
use std::process;

use clap::Parser;
use clipmotifs::{Container, FrameSource};
use tracing_subscriber::EnvFilter;

/// Frames read per block while counting
const BLOCK_FRAMES: u64 = 65536;

#[derive(Parser, Debug)]
#[command(name = "wav64_info")]
#[command(about = "Show the format of a Wave64 or RIFF/WAVE file", long_about = None)]
struct Cli {
    #[arg(value_name = "FILE")]
    file: PathBuf,
}

fn run(cli: &Cli) -> clipmotifs::Result<()> {
    let mut container = Container::open(&cli.file)?;
    let params = container.params();

    println!("File:             {}", cli.file.display());
    println!("Container:        {}", container.kind());
    println!("Channels:         {}", params.channels);
    println!("Bytes per sample: {}", params.bytes_per_sample);
    println!("Sample rate:      {} Hz", params.sample_rate);
    println!("Declared frames:  {}", params.frame_count);

    let mut counted = 0u64;
    let bytes_per_frame = params.bytes_per_frame().max(1);
    loop {
        let block = container.read_frames(BLOCK_FRAMES)?;
        if block.is_empty() {
            break;
        }
        counted += (block.len() / bytes_per_frame) as u64;
    }

    let seconds = counted as f64 / params.sample_rate.max(1) as f64;
    println!("Frames read:      {} ({:.3} s)", counted, seconds);
    Ok(())
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(&cli) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}
