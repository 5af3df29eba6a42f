//! leap_tree: interactive entry point.
//!
//! ```text
//! leap_tree --quick
//! leap_tree --config scene.json --seed 7 --gesture
//! leap_tree --quick --foliage 4000 --log-level debug
//! ```

use std::path::PathBuf;

use clap::Parser;
use tracing::{error, info};

use leap_tree::app::{run, AppConfig, DetectorKind};
use leap_tree::detector::SimFailure;
use leap_tree::{AppError, SceneConfig};

#[derive(Parser, Debug)]
#[command(name = "leap_tree", version, about = "Gesture-driven chaos/tree formation viewer")]
struct Args {
    /// JSON scene config.  Missing fields take their defaults.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Skip the config file and use built-in defaults.
    #[arg(long, default_value_t = false)]
    quick: bool,

    /// Seed for the chaos scatter (overrides the config).
    #[arg(short, long)]
    seed: Option<u64>,

    /// Number of foliage points (overrides the config).
    #[arg(long)]
    foliage: Option<usize>,

    /// Start with gesture control on.
    #[arg(long, default_value_t = false)]
    gesture: bool,

    /// Make the simulated detector fail at this phase.
    #[arg(long, value_enum)]
    sim_fail: Option<SimFailure>,

    /// trace | debug | info | warn | error
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() {
    let args = Args::parse();

    let log_level_filter = args
        .log_level
        .parse::<tracing_subscriber::filter::LevelFilter>()
        .unwrap_or(tracing_subscriber::filter::LevelFilter::INFO);

    tracing_subscriber::fmt()
        .with_max_level(log_level_filter)
        .with_target(false)
        .init();

    #[cfg(feature = "leap")]
    info!("mode: LeapMotion hardware");
    #[cfg(not(feature = "leap"))]
    info!("mode: keyboard-simulated hand (build with --features leap for hardware)");

    if let Err(e) = build_config(&args).and_then(run) {
        error!("{}", e);
        std::process::exit(1);
    }
}

fn build_config(args: &Args) -> Result<AppConfig, AppError> {
    let mut scene = match (&args.config, args.quick) {
        (Some(path), false) => SceneConfig::from_json_file(path)?,
        _                   => SceneConfig::default(),
    };
    if args.seed.is_some() {
        scene.seed = args.seed;
    }
    if let Some(n) = args.foliage {
        scene.formation.foliage_count = n;
    }

    let detector = match args.sim_fail {
        Some(fail) => DetectorKind::Simulated { fail_at: Some(fail) },
        None       => DetectorKind::default(),
    };

    info!(
        foliage   = scene.formation.foliage_count,
        ornaments = scene.formation.ornament_count,
        polaroids = scene.formation.polaroid_images,
        "opening viewer"
    );

    Ok(AppConfig { scene, detector, start_gesture: args.gesture })
}
