use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use aeolus_io::{
    AeolusConfig, BoxGenerator, DirectoryFetch, DirectoryStorage, HttpWindAnalysis, format_of,
    load_config,
};
use aeolus_mesh::{LoadOptions, UpAxis, load_mesh_with};
use aeolus_raster::{DEFAULT_CELL_SIZE, RasterSettings, Rasterizer, crop};
use aeolus_runtime::{
    Collaborators, GeometryCache, GeometryGenerationService, GeometryParams, Orchestrator,
    RunReport,
};
use clap::{ArgAction, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "aeolus", version, about = "Rank building massings by pedestrian wind comfort")]
struct Args {
    /// Raise log verbosity (-v debug, -vv trace). RUST_LOG overrides.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Evaluate every design option in a config file and store the ranking.
    Run {
        #[arg(long, default_value = "aeolus.toml")]
        config: PathBuf,
        /// Override `[run] workers`.
        #[arg(long)]
        workers: Option<usize>,
        /// Override `[analysis] window`.
        #[arg(long)]
        window: Option<usize>,
        /// Override `[output] dir`.
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Rasterize a mesh against its own bounds and write a depth preview.
    Raster {
        mesh: PathBuf,
        #[arg(long, default_value = "depth.png")]
        out: PathBuf,
        #[arg(long, default_value_t = DEFAULT_CELL_SIZE)]
        cell_size: f32,
        /// Crop a centred square window of this many cells.
        #[arg(long)]
        window: Option<usize>,
        /// The mesh was authored Y-up (glTF convention).
        #[arg(long)]
        y_up: bool,
    },
    /// Write the block the local generator produces for one parameter set.
    Generate {
        #[arg(long)]
        width: f64,
        #[arg(long)]
        depth: f64,
        #[arg(long)]
        height: f64,
        #[arg(long, default_value = "block.stl")]
        out: PathBuf,
    },
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => log::LevelFilter::Info,
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .format_timestamp_millis()
        .init();
}

fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    init_logging(args.verbose);
    match args.command {
        Command::Run {
            config,
            workers,
            window,
            output,
        } => {
            let mut cfg = load_config(&config)?;
            if workers.is_some() {
                cfg.run.workers = workers;
            }
            if let Some(window) = window {
                cfg.analysis.window = window;
            }
            if let Some(output) = output {
                cfg.output.dir = output;
            }
            cfg.validate()?;
            run(&cfg)
        }
        Command::Raster {
            mesh,
            out,
            cell_size,
            window,
            y_up,
        } => raster(&mesh, &out, cell_size, window, y_up),
        Command::Generate {
            width,
            depth,
            height,
            out,
        } => generate(
            GeometryParams {
                width,
                depth,
                height,
            },
            &out,
        ),
    }
}

fn run(cfg: &AeolusConfig) -> Result<(), Box<dyn Error>> {
    let storage = Arc::new(DirectoryStorage::new(&cfg.output.dir));
    let services = Collaborators {
        fetch: Arc::new(DirectoryFetch::new(
            &cfg.assets.terrain,
            &cfg.assets.surroundings,
        )),
        analysis: Arc::new(HttpWindAnalysis::from_config(&cfg.analysis)?),
        top_sink: storage.clone(),
        results_sink: storage,
    };
    let cache = Arc::new(GeometryCache::new(Arc::new(BoxGenerator)));
    let orchestrator = Orchestrator::new(cfg.run_settings(), services, cache);
    let report = orchestrator.run(&cfg.options)?;
    print_report(&report);
    Ok(())
}

fn print_report(report: &RunReport) {
    println!("rank  option  geometry              score  cells");
    for (rank, r) in report.ranked.iter().enumerate() {
        println!(
            "{rank:>4}  {:>6}  {:<18}  {:>9.4}  {:>5}",
            r.index,
            r.key.to_string(),
            r.score,
            r.scored_cells
        );
    }
    for failure in &report.failed {
        println!("failed: {failure}");
    }
    let stats = report.cache_stats;
    println!(
        "{} scored, {} failed, {} geometries generated ({} cache hits) in {:.1}s",
        report.ranked.len(),
        report.failed.len(),
        stats.generations,
        stats.hits,
        report.elapsed.as_secs_f64()
    );
}

fn raster(
    mesh: &Path,
    out: &Path,
    cell_size: f32,
    window: Option<usize>,
    y_up: bool,
) -> Result<(), Box<dyn Error>> {
    let format = format_of(mesh)
        .ok_or_else(|| format!("cannot tell the mesh format of {}", mesh.display()))?;
    let bytes = fs::read(mesh)?;
    let opts = LoadOptions {
        up_axis: if y_up { UpAxis::Y } else { UpAxis::Z },
    };
    let mesh = load_mesh_with(&bytes, format, &opts)?;
    let rasterizer = Rasterizer::new(RasterSettings {
        cell_size,
        ..RasterSettings::default()
    });
    let mut map = rasterizer.rasterize(&mesh, None)?;
    if let Some(size) = window {
        map = crop(&map, size)?;
    }
    aeolus_io::image::write_depth_png(&map, out)?;
    let mean = map
        .mean()
        .map_or_else(|| "-".to_string(), |m| format!("{m:.1}"));
    println!(
        "{}x{} cells, {} hit, mean depth {mean}, written to {}",
        map.width(),
        map.height(),
        map.hit_count(),
        out.display()
    );
    Ok(())
}

fn generate(params: GeometryParams, out: &Path) -> Result<(), Box<dyn Error>> {
    let blob = BoxGenerator.generate(&params)?;
    fs::write(out, &blob.bytes)?;
    log::info!("wrote {} ({} bytes)", out.display(), blob.len());
    Ok(())
}
