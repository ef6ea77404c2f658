//! Cut a motif take into named clips.
//!
//! Reads `<BASENAME>.log` and the segment containers `<BASENAME>.wav`,
//! `<BASENAME>1.wav`, ..., writes one WAV per clip under `<BASENAME>_wav/`
//! plus an encode script and a JSON manifest for the encoding step.

use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use clap::Parser;
use clipmotifs::{
    generate_encode_script, read_log, write_encode_script, write_manifest, ClipSettings, Config, Orchestrator,
    RunMode, TagStep,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "clipmotifs")]
#[command(about = "Extract marker-synchronized clips from a recorded take", long_about = None)]
struct Cli {
    /// Take name; reads <BASENAME>.log and <BASENAME>.wav, <BASENAME>1.wav, ...
    #[arg(value_name = "BASENAME")]
    basename: PathBuf,

    /// Score onset alignment instead of writing clips
    #[arg(long)]
    verify: bool,

    /// Marker detection threshold (absolute sample amplitude)
    #[arg(short, long, value_name = "N")]
    threshold: Option<u32>,

    /// Disable gain normalization
    #[arg(long)]
    raw: bool,

    /// Disable the fade-out taper
    #[arg(long)]
    no_taper: bool,

    /// Group clips into subdirectories by the first N name parts
    #[arg(long, value_name = "N")]
    subdirs: Option<usize>,

    /// Read defaults from FILE instead of ~/.state/clipmotifs/defaults.toml
    #[arg(long, value_name = "FILE", env = "CLIPMOTIFS_CONFIG")]
    config: Option<PathBuf>,

    /// Save the given options as defaults and exit
    #[arg(long)]
    save_defaults: bool,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    /// Options that were set explicitly on the command line
    fn overrides(&self) -> Config {
        Config {
            threshold: self.threshold,
            agc: self.raw.then_some(false),
            taper: self.no_taper.then_some(false),
            subdirs: self.subdirs,
            ..Config::default()
        }
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

/// `<base><suffix>` next to the take
fn sibling(base: &Path, suffix: &str) -> PathBuf {
    let mut name = base.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

fn load_config(cli: &Cli) -> clipmotifs::Result<Config> {
    let saved = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    Ok(saved)
}

fn run(cli: &Cli) -> clipmotifs::Result<()> {
    let mut config = load_config(cli)?;
    let overrides = cli.overrides();

    if cli.save_defaults {
        config.merge(&overrides);
        let path = match &cli.config {
            Some(path) => {
                config.save_to(path)?;
                path.clone()
            }
            None => config.save()?,
        };
        println!("Defaults saved to {:?}", path);
        println!();
        config.print("Saved configuration");
        return Ok(());
    }

    config.merge(&overrides);
    let settings = ClipSettings::from_config(&config)?;

    let base = &cli.basename;
    let log_path = sibling(base, ".log");
    let descriptors = read_log(&log_path)?;
    info!("Read {} records from {}", descriptors.len(), log_path.display());

    let wav_dir = sibling(base, "_wav");
    let mode = if cli.verify {
        RunMode::Verify
    } else {
        fs::create_dir_all(&wav_dir)?;
        RunMode::Extract {
            wav_dir: wav_dir.clone(),
        }
    };

    let encoder = settings.encoder.clone();
    let tagger = settings.tagger.clone();
    let subdirs = settings.subdirs;
    let summary = Orchestrator::new(base, settings, mode).run(descriptors)?;

    if cli.verify {
        let missing = summary
            .records
            .iter()
            .filter(|r| r.onset_score.map_or(false, |s| s < clipmotifs::clip::MISSING_ONSET_SCORE))
            .count();
        info!("Verified {} clips, {} missing starts", summary.records.len(), missing);
    } else {
        let mp3_dir = sibling(base, "_mp3");
        let script_path = sibling(base, "_mp3.sh");
        let tag = TagStep {
            command: &tagger,
            subdirs,
            base: base.as_path(),
        };
        let script = generate_encode_script(&log_path, &wav_dir, &mp3_dir, &encoder, Some(&tag), &summary.records);
        write_encode_script(&script_path, &script)?;

        let manifest_path = sibling(base, "_clips.json");
        write_manifest(&manifest_path, &summary.records)?;
        info!(
            "Wrote {} clips from {} segments; encode with {}",
            summary.records.len(),
            summary.segments,
            script_path.display()
        );
    }

    if summary.warnings > 0 {
        warn!("{} warnings, check the log above", summary.warnings);
    }
    Ok(())
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = run(&cli) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}
