use std::error::Error;
use std::path::PathBuf;
use std::process;

use clap::Parser;
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use terrain_generator::classify::{self, ClassificationOptions, DensityMode};
use terrain_generator::export;
use terrain_generator::field;
use terrain_generator::mesh;
use terrain_generator::params::GenerationParams;

#[derive(Parser, Debug)]
#[command(name = "terrain_generator")]
#[command(about = "Generate obstacle terrain meshes from coherent noise")]
struct Args {
    /// Side length of the square map in cells
    #[arg(long, default_value = "600")]
    size: usize,

    /// Seed of the first noise channel (random 1-1000 if not specified)
    #[arg(long)]
    seed1: Option<i64>,

    /// Seed of the second, transposed noise channel (random 1001-2000 if not specified)
    #[arg(long)]
    seed2: Option<i64>,

    /// Octave count of the first channel
    #[arg(long, default_value = "20")]
    oct1: u32,

    /// Octave count of the second channel
    #[arg(long, default_value = "20")]
    oct2: u32,

    /// Obstacle density: sparse, medium, dense, or a custom offset in (0,1)
    #[arg(long, default_value = "medium")]
    density: String,

    /// Produce continuous ground elevation instead of a flat binary map
    #[arg(long)]
    topography: bool,

    /// Cluster obstacles with a coarse disparity filter
    #[arg(long)]
    disparity: bool,

    /// Seed of the disparity filter (random 2001-3000 if not specified)
    #[arg(long)]
    filter_seed: Option<i64>,

    /// Map height in cell units
    #[arg(long, default_value = "20")]
    height: u32,

    /// Terrain footprint side length in meters
    #[arg(long, default_value = "60")]
    length: f64,

    /// Output directory root
    #[arg(long, default_value = ".")]
    out: PathBuf,

    /// Write a grayscale PNG preview of the classified map
    #[arg(long)]
    preview: Option<String>,

    /// Read size, seeds and octaves from a `key: value` parameter file
    /// instead of the flags above
    #[arg(long)]
    params: Option<PathBuf>,
}

fn main() {
    let args = Args::parse();
    if let Err(e) = run(args) {
        eprintln!("Generation failed: {e}");
        process::exit(1);
    }
}

fn run(args: Args) -> Result<(), Box<dyn Error>> {
    let density = parse_density(&args.density)?;

    // Seeds for unseeded runs are drawn here, at the boundary; the library
    // core only ever sees explicit seeds.
    let mut rng = ChaCha8Rng::from_entropy();
    let params = match &args.params {
        Some(path) => GenerationParams::from_file(path)?,
        None => GenerationParams {
            size: args.size,
            seed1: args.seed1.unwrap_or_else(|| rng.gen_range(1..=1000)),
            seed2: args.seed2.unwrap_or_else(|| rng.gen_range(1001..=2000)),
            oct1: args.oct1,
            oct2: args.oct2,
        },
    };

    let field = field::generate(&params)?;
    println!(
        "Noise field of size {} generated with seed {}.",
        params.size,
        field.label()
    );

    let options = ClassificationOptions {
        density,
        topography: args.topography,
        disparity: args
            .disparity
            .then(|| args.filter_seed.unwrap_or_else(|| rng.gen_range(2001..=3000))),
    };
    let map = classify::classify(&field, &options)?;
    if let Some(label) = map.filter_label() {
        println!("Density filter map generated with seed {label}.");
    }
    let kind = if args.topography { "Topographic" } else { "Binary" };
    println!("{kind} map generated with density set on: {}.", args.density);

    if let Some(path) = &args.preview {
        export::export_map_png(map.values(), path)?;
        println!("Preview image written to {path}.");
    }

    let stem = export::artifact_stem(field.label(), &map.label_suffix(), args.height);
    println!("Generating mesh with name {stem}...");
    let mut mesh = mesh::build(map.values(), args.height as f64);

    let report = mesh.repair()?;
    println!(
        "Repair pass: merged {} vertices, dropped {} faces, patched {} boundary faces.",
        report.welded, report.dropped, report.patched
    );
    println!("Mesh volume: {}", mesh.volume());
    println!("Mesh convex hull volume: {}", mesh.convex_hull_volume());
    println!("Mesh bounding box volume: {}", mesh.bounding_box_volume());

    let zrat = args.height as f64 / params.size as f64;
    let (mesh_path, descriptor_path) = export::export(
        &mesh,
        &stem,
        args.length,
        (zrat * args.length).floor(),
        &args.out,
    )?;
    println!("Mesh exported to {}", mesh_path.display());
    println!("Descriptor written to {}", descriptor_path.display());

    Ok(())
}

fn parse_density(raw: &str) -> Result<DensityMode, Box<dyn Error>> {
    match raw.to_ascii_lowercase().as_str() {
        "sparse" => Ok(DensityMode::Sparse),
        "medium" => Ok(DensityMode::Medium),
        "dense" => Ok(DensityMode::Dense),
        other => match other.parse::<f64>() {
            Ok(x) => Ok(DensityMode::Custom(x)),
            Err(_) => Err(format!(
                "unknown density `{raw}`: expected sparse, medium, dense or an offset in (0,1)"
            )
            .into()),
        },
    }
}
