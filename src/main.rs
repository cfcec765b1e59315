use clap::{Parser, Subcommand};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tile_stitching::analysis::position_errors;
use tile_stitching::logging::{init_logging, set_correlation_id, LoggingConfig};
use tile_stitching::synthetic::Scene;
use tile_stitching::visualization::{print_outcome, print_performance, print_position_errors};
use tile_stitching::*;

#[derive(Parser)]
#[command(name = "stitch")]
#[command(about = "Stitch overlapping image tiles into one mosaic")]
#[command(version = "0.1.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (TOML or JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// -v info, -vv debug, -vvv trace registration and write JSON logs to ./logs
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(clap::Args)]
struct OutputArgs {
    /// Fusion method, overrides the configuration
    #[arg(short, long, value_enum)]
    fusion: Option<FusionMethod>,

    /// Estimate sub-pixel shifts and interpolate linearly during fusion
    #[arg(long)]
    subpixel: bool,

    /// Fused image file
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// JSON file for positions and pair results
    #[arg(short, long)]
    result: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Register and fuse two images
    Pairwise {
        /// First image, anchors the result
        first: PathBuf,

        /// Second image
        second: PathBuf,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Stitch tiles acquired on a regular grid
    Grid {
        /// Tile images in acquisition order
        #[arg(required = true, num_args = 1..)]
        tiles: Vec<PathBuf>,

        #[arg(long)]
        columns: usize,

        #[arg(long)]
        rows: usize,

        /// Overlap between horizontal neighbours as a fraction of the tile width
        #[arg(long, default_value = "0.2")]
        overlap_x: f64,

        /// Overlap between vertical neighbours as a fraction of the tile height
        #[arg(long, default_value = "0.2")]
        overlap_y: f64,

        #[arg(long, value_enum, default_value = "row-by-row")]
        order: GridOrder,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Cut an image (or a synthetic scene) into jittered tiles, stitch them
    /// and report how far the positions are from the truth
    Test {
        /// Source image; a synthetic scene is used when omitted
        #[arg(short, long)]
        source: Option<PathBuf>,

        #[arg(long, default_value = "3")]
        columns: usize,

        #[arg(long, default_value = "2")]
        rows: usize,

        #[arg(long, default_value = "128")]
        tile_width: usize,

        #[arg(long, default_value = "96")]
        tile_height: usize,

        #[arg(long, default_value = "0.2")]
        overlap: f64,

        /// Maximum random deviation from the grid position, in pixels
        #[arg(long, default_value = "3.0")]
        jitter: f64,

        #[arg(long, default_value = "42")]
        seed: u64,

        /// Largest error counted as a correct placement, in pixels
        #[arg(long, default_value = "1.0")]
        tolerance: f64,

        #[command(flatten)]
        output: OutputArgs,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = load_config_or_default(cli.config.as_deref().and_then(Path::to_str));
    match cli.verbose {
        0 => {}
        1 => config.logging.global_level = "info".to_string(),
        2 => config.logging.global_level = "debug".to_string(),
        _ => config.logging = LoggingConfig::development(),
    }
    let _guard = init_logging(&config.logging)?;

    match cli.command {
        Commands::Pairwise { first, second, output } => {
            handle_pairwise(config.stitching, first, second, output)?;
        }
        Commands::Grid {
            tiles,
            columns,
            rows,
            overlap_x,
            overlap_y,
            order,
            output,
        } => {
            handle_grid(config.stitching, tiles, columns, rows, (overlap_x, overlap_y), order, output)?;
        }
        Commands::Test {
            source,
            columns,
            rows,
            tile_width,
            tile_height,
            overlap,
            jitter,
            seed,
            tolerance,
            output,
        } => {
            let layout = TestLayout {
                columns,
                rows,
                tile_size: [tile_width, tile_height],
                overlap,
                jitter,
                seed,
            };
            handle_test(config.stitching, source, layout, tolerance, output)?;
        }
    }

    Ok(())
}

fn apply_overrides(mut params: StitchingParameters, output: &OutputArgs) -> StitchingParameters {
    if let Some(method) = output.fusion {
        params.fusion_method = method;
    }
    if output.subpixel {
        params.subpixel_accuracy = true;
    }
    params
}

fn write_outputs(outcome: &StitchingOutcome, output: &OutputArgs) -> anyhow::Result<()> {
    if let (Some(path), Some(fused)) = (&output.output, &outcome.fused) {
        save_image(&fused.data, 1, 1, path)?;
        println!("Fused image saved to {:?}", path);
    }
    if let Some(path) = &output.result {
        let json = serde_json::to_string_pretty(outcome)?;
        std::fs::write(path, json)?;
        println!("Results saved to {:?}", path);
    }
    Ok(())
}

fn handle_pairwise(
    params: StitchingParameters,
    first_path: PathBuf,
    second_path: PathBuf,
    output: OutputArgs,
) -> anyhow::Result<()> {
    let params = apply_overrides(params, &output);
    println!("Loading images...");
    let first: Arc<dyn PixelBlockAccess> = Arc::new(load_image(&first_path)?);
    let second: Arc<dyn PixelBlockAccess> = Arc::new(load_image(&second_path)?);
    println!("First: {:?}, second: {:?}", first.dimensions(), second.dimensions());

    let stitcher = Stitcher::new(params)?;
    set_correlation_id(stitcher.correlation_id());
    let outcome = stitcher.stitch_two(first, second, None, None)?;

    print_outcome(&outcome);
    print_performance(stitcher.metrics());
    write_outputs(&outcome, &output)
}

fn handle_grid(
    params: StitchingParameters,
    paths: Vec<PathBuf>,
    columns: usize,
    rows: usize,
    (overlap_x, overlap_y): (f64, f64),
    order: GridOrder,
    output: OutputArgs,
) -> anyhow::Result<()> {
    let params = apply_overrides(params, &output);
    println!("Loading {} tiles...", paths.len());
    let images = paths
        .iter()
        .map(|path| load_image(path).map(|image| Arc::new(image) as Arc<dyn PixelBlockAccess>))
        .collect::<anyhow::Result<Vec<_>>>()?;

    let dimensions: Vec<Vec<usize>> = images.iter().map(|image| image.dimensions().to_vec()).collect();
    let positions = grid_layout(&dimensions, columns, rows, overlap_x, overlap_y, order)?;
    let tiles: Vec<Tile> = images
        .into_iter()
        .zip(&positions)
        .enumerate()
        .map(|(i, (image, position))| Tile::new(i + 1, 1, image).at_position(position))
        .collect();

    let stitcher = Stitcher::new(params)?;
    set_correlation_id(stitcher.correlation_id());
    let outcome = stitcher.stitch_collection(tiles)?;

    print_outcome(&outcome);
    print_performance(stitcher.metrics());
    write_outputs(&outcome, &output)
}

struct TestLayout {
    columns: usize,
    rows: usize,
    tile_size: [usize; 2],
    overlap: f64,
    jitter: f64,
    seed: u64,
}

fn handle_test(
    params: StitchingParameters,
    source: Option<PathBuf>,
    layout: TestLayout,
    tolerance: f64,
    output: OutputArgs,
) -> anyhow::Result<()> {
    let params = apply_overrides(params, &output);
    let num_tiles = layout.columns * layout.rows;
    let dimensions = vec![layout.tile_size.to_vec(); num_tiles];
    let grid = grid_layout(
        &dimensions,
        layout.columns,
        layout.rows,
        layout.overlap,
        layout.overlap,
        GridOrder::RowByRow,
    )?;

    let mut rng = StdRng::seed_from_u64(layout.seed);
    let margin = layout.jitter.ceil();
    let mut truth: Vec<Vec<f64>> = grid
        .iter()
        .map(|position| {
            position
                .iter()
                .map(|&p| p + margin + jitter(&mut rng, layout.jitter))
                .collect()
        })
        .collect();

    let extent: Vec<usize> = (0..2)
        .map(|d| {
            let far = truth.iter().map(|t| t[d]).fold(0.0, f64::max);
            (far + margin).ceil() as usize + layout.tile_size[d]
        })
        .collect();

    let images: Vec<ImageData> = match source {
        Some(path) => {
            println!("Cutting {} tiles from {:?}", num_tiles, path);
            for origin in truth.iter_mut() {
                origin.iter_mut().for_each(|p| *p = p.round());
            }
            cut_from_image(&load_image(&path)?, &truth, &layout.tile_size)?
        }
        None => {
            println!("Cutting {} tiles from a synthetic {:?} scene", num_tiles, extent);
            let scene = Scene::random(&extent, extent[0] * extent[1] / 60, layout.seed)?;
            scene.cut_tiles(&truth, &layout.tile_size)?
        }
    };

    let tiles: Vec<Tile> = images
        .into_iter()
        .zip(&grid)
        .enumerate()
        .map(|(i, (image, position))| Tile::new(i + 1, 1, Arc::new(image)).at_position(position))
        .collect();

    let stitcher = Stitcher::new(params)?;
    set_correlation_id(stitcher.correlation_id());
    let outcome = stitcher.stitch_collection(tiles)?;

    print_outcome(&outcome);
    let summary = position_errors(&outcome.placements, &truth, tolerance);
    print_position_errors(&summary, tolerance);
    print_performance(stitcher.metrics());
    write_outputs(&outcome, &output)
}

fn jitter(rng: &mut StdRng, max: f64) -> f64 {
    if max > 0.0 {
        rng.gen_range(-max..=max)
    } else {
        0.0
    }
}

fn cut_from_image(source: &ImageData, origins: &[Vec<f64>], size: &[usize; 2]) -> anyhow::Result<Vec<ImageData>> {
    origins
        .iter()
        .map(|origin| {
            let rect = Rect::new(origin[0] as usize, origin[1] as usize, size[0], size[1]);
            let block = source.block(0, 1, Some(&rect))?;
            Ok(ImageData::from(ImageStack::from_plane(block.into_owned())?))
        })
        .collect()
}
