//! Print a freshly built population as JSON.
//!
//! ```text
//! formation_dump foliage --count 10 --seed 7 --pretty
//! formation_dump ornaments --count 20
//! formation_dump polaroids --count 5      # count = number of images
//! ```

use clap::{Parser, ValueEnum};
use dual_formation::{build_ornaments, build_polaroids, DualStateSet, FormationSpec};
use tree_formation::formation_rng;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Population {
    Foliage,
    Ornaments,
    Polaroids,
}

#[derive(Parser, Debug)]
#[command(name = "formation_dump", version, about = "Dump chaos/formed positions as JSON")]
struct Args {
    /// Which population to build.
    #[arg(value_enum)]
    population: Population,

    /// Entity count (image count for polaroids).
    #[arg(short, long, default_value_t = 10)]
    count: usize,

    /// Seed for the chaos positions; omit for a fresh random scatter.
    #[arg(short, long)]
    seed: Option<u64>,

    /// Indent the output.
    #[arg(long, default_value_t = false)]
    pretty: bool,
}

fn main() {
    let args = Args::parse();
    let spec = FormationSpec::default();
    let mut rng = formation_rng(args.seed);

    let value = match args.population {
        Population::Foliage => {
            serde_json::to_value(DualStateSet::build(args.count, &mut rng))
        }
        Population::Ornaments => {
            serde_json::to_value(build_ornaments(args.count, spec.ornament_chaos_radius, &mut rng))
        }
        Population::Polaroids => {
            serde_json::to_value(build_polaroids(args.count, spec.polaroid_chaos_radius, &mut rng))
        }
    };

    let text = value.and_then(|v| {
        if args.pretty { serde_json::to_string_pretty(&v) } else { serde_json::to_string(&v) }
    });

    match text {
        Ok(t)  => println!("{}", t),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}
